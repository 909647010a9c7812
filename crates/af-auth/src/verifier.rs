//! Token signature verification: one trait with a symmetric dev/test
//! implementation and an OIDC/JWKS production implementation.

use af_types::{AfError, AfResult, TokenClaims};
use async_trait::async_trait;
use dashmap::DashMap;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Signs and verifies tokens. `sign` is only meaningful for a verifier that
/// holds a private/symmetric key this process controls; a pure JWKS
/// verifier only ever validates tokens minted by the external issuer.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn sign(&self, claims: &TokenClaims) -> AfResult<String>;
    async fn verify(&self, token: &str) -> AfResult<TokenClaims>;
}

/// HS256 symmetric verifier, for development and test environments
/// (`AF_JWT_SECRET`).
pub struct HsVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl HsVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl TokenVerifier for HsVerifier {
    async fn sign(&self, claims: &TokenClaims) -> AfResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AfError::Serialization(e.to_string()))
    }

    async fn verify(&self, token: &str) -> AfResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        // `TokenClaims` doesn't carry numeric `exp`/`iat` fields; expiry is
        // checked explicitly by the caller against `expires_at` instead.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

/// OIDC/JWKS RS256 verifier, for production (`AF_OIDC_ISSUER` +
/// `AF_OIDC_JWKS_URL`). Caches decoding keys by `kid`, refreshing on a
/// cache miss rather than on a fixed schedule.
pub struct JwksVerifier {
    jwks_url: String,
    client: reqwest::Client,
    cache: DashMap<String, DecodingKey>,
}

impl JwksVerifier {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with default TLS backend");
        Self {
            jwks_url: jwks_url.into(),
            client,
            cache: DashMap::new(),
        }
    }

    async fn decoding_key_for(&self, kid: &str) -> AfResult<DecodingKey> {
        if let Some(key) = self.cache.get(kid) {
            return Ok(key.clone());
        }
        self.refresh().await?;
        self.cache
            .get(kid)
            .map(|k| k.clone())
            .ok_or_else(|| AfError::TokenMalformed(format!("no JWKS key for kid {kid}")))
    }

    async fn refresh(&self) -> AfResult<()> {
        let response = self.client.get(&self.jwks_url).send().await.map_err(|e| {
            warn!(error = %e, url = %self.jwks_url, "jwks fetch failed");
            if e.is_timeout() {
                AfError::DeadlineExceeded
            } else {
                AfError::TokenMalformed(format!("jwks fetch failed: {e}"))
            }
        })?;
        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AfError::TokenMalformed(format!("jwks parse failed: {e}")))?;
        for jwk in jwks.keys {
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|e| AfError::TokenMalformed(format!("invalid jwk: {e}")))?;
            self.cache.insert(jwk.kid, key);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn sign(&self, _claims: &TokenClaims) -> AfResult<String> {
        Err(AfError::TokenMalformed(
            "token issuance is not supported by the JWKS verifier; tokens are minted by the external OIDC issuer".into(),
        ))
    }

    async fn verify(&self, token: &str) -> AfResult<TokenClaims> {
        let header = jsonwebtoken::decode_header(token).map_err(map_jwt_error)?;
        let kid = header
            .kid
            .ok_or_else(|| AfError::TokenMalformed("token header missing kid".into()))?;
        let decoding_key = self.decoding_key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<TokenClaims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AfError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::InvalidSignature => AfError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AfError::TokenExpired,
        _ => AfError::TokenMalformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn claims() -> TokenClaims {
        let now = chrono::Utc::now();
        TokenClaims {
            tenant_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            roles: vec!["operator".into()],
            permissions: vec!["workflow:write".into()],
            issued_at: now,
            expires_at: now + chrono::Duration::hours(1),
            jti: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn hs_verifier_round_trips_claims() {
        let verifier = HsVerifier::new("test-secret");
        let original = claims();
        let token = verifier.sign(&original).await.unwrap();
        let parsed = verifier.verify(&token).await.unwrap();
        assert_eq!(parsed.tenant_id, original.tenant_id);
        assert_eq!(parsed.jti, original.jti);
    }

    #[tokio::test]
    async fn hs_verifier_rejects_token_signed_with_a_different_secret() {
        let signer = HsVerifier::new("secret-a");
        let verifier = HsVerifier::new("secret-b");
        let token = signer.sign(&claims()).await.unwrap();
        let err = verifier.verify(&token).await.unwrap_err();
        assert!(matches!(err, AfError::SignatureInvalid));
    }
}

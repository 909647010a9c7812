//! Closed-struct configuration loaded from environment variables.
//!
//! Per the platform's "no dynamic config map" design rule: every option the
//! process understands has a named field here. Unknown `AF_*` variables are
//! silently ignored (the struct just never looks at them); a required
//! variable that is absent or malformed fails the load outright rather than
//! falling back to a guessed default.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// How incoming bearer tokens are verified.
#[derive(Debug, Clone)]
pub enum AuthMode {
    /// Shared-secret HS256, selected by `AF_JWT_SECRET`. Intended for
    /// single-process/dev deployments.
    Symmetric { secret: String },
    /// RS256 against a remote JWKS endpoint, selected by `AF_OIDC_ISSUER` +
    /// `AF_OIDC_JWKS_URL` together.
    Jwks { issuer: String, jwks_url: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite DSN (path or `:memory:`) for the storage port.
    pub database_url: String,
    /// Reserved for a future out-of-process bus; the in-process broadcast
    /// bus is used when unset.
    pub bus_url: Option<String>,
    /// Reserved for a future out-of-process KV store; the storage port's
    /// own KV table is used when unset.
    pub kv_url: Option<String>,
    pub auth_mode: AuthMode,
    /// OTLP collector endpoint. Tracing stays stderr-only when unset.
    pub tracing_endpoint: Option<String>,
    /// Per-endpoint admission overrides, keyed by request path
    /// (`AF_RATE_LIMIT_AUDIT_VERIFY` -> `/audit/verify`).
    pub rate_limit_overrides: HashMap<String, u32>,
    /// Wall-clock budget for a single `audit verify` invocation.
    pub audit_verify_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("environment variable {var} has an invalid value: {message}")]
    InvalidValue { var: &'static str, message: String },
    #[error(
        "no auth mode configured: set AF_JWT_SECRET, or both AF_OIDC_ISSUER and AF_OIDC_JWKS_URL"
    )]
    MissingAuthMode,
}

impl AppConfig {
    /// Reads every recognized `AF_*` variable from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require_var("AF_DATABASE_URL")?;
        let bus_url = optional_var("AF_BUS_URL");
        let kv_url = optional_var("AF_KV_URL");
        let auth_mode = load_auth_mode()?;
        let tracing_endpoint = optional_var("AF_TRACING_ENDPOINT");
        let rate_limit_overrides = load_rate_limit_overrides();
        let audit_verify_timeout = load_audit_verify_timeout()?;

        Ok(Self {
            database_url,
            bus_url,
            kv_url,
            auth_mode,
            tracing_endpoint,
            rate_limit_overrides,
            audit_verify_timeout,
        })
    }
}

fn require_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn load_auth_mode() -> Result<AuthMode, ConfigError> {
    if let Some(secret) = optional_var("AF_JWT_SECRET") {
        return Ok(AuthMode::Symmetric { secret });
    }
    let issuer = optional_var("AF_OIDC_ISSUER");
    let jwks_url = optional_var("AF_OIDC_JWKS_URL");
    match (issuer, jwks_url) {
        (Some(issuer), Some(jwks_url)) => Ok(AuthMode::Jwks { issuer, jwks_url }),
        _ => Err(ConfigError::MissingAuthMode),
    }
}

/// `AF_RATE_LIMIT_<ENDPOINT>` -> `/<endpoint with underscores as slashes>`,
/// lowercased. A deliberately simple convention: it cannot reconstruct a
/// path containing a literal underscore, but none of this platform's
/// documented endpoints do.
fn load_rate_limit_overrides() -> HashMap<String, u32> {
    const PREFIX: &str = "AF_RATE_LIMIT_";
    let mut overrides = HashMap::new();
    for (key, value) in env::vars() {
        let Some(suffix) = key.strip_prefix(PREFIX) else {
            continue;
        };
        if suffix.is_empty() {
            continue;
        }
        let Ok(limit) = value.parse::<u32>() else {
            tracing::warn!(var = %key, value = %value, "ignoring rate limit override with non-numeric value");
            continue;
        };
        let path = format!("/{}", suffix.to_lowercase().replace('_', "/"));
        overrides.insert(path, limit);
    }
    overrides
}

fn load_audit_verify_timeout() -> Result<Duration, ConfigError> {
    match optional_var("AF_AUDIT_VERIFY_TIMEOUT") {
        None => Ok(Duration::from_secs(5)),
        Some(raw) => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                var: "AF_AUDIT_VERIFY_TIMEOUT",
                message: format!("expected an integer number of seconds, got {raw:?}"),
            })?;
            Ok(Duration::from_secs(secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variable tests run serially against the real process
    // environment, so each test scopes its own prefix-free keys and removes
    // them at the end rather than sharing fixtures.

    #[test]
    fn rate_limit_overrides_are_parsed_from_prefixed_vars() {
        env::set_var("AF_RATE_LIMIT_AUDIT_VERIFY", "30");
        let overrides = load_rate_limit_overrides();
        assert_eq!(overrides.get("/audit/verify"), Some(&30));
        env::remove_var("AF_RATE_LIMIT_AUDIT_VERIFY");
    }

    #[test]
    fn missing_auth_mode_is_an_error() {
        env::remove_var("AF_JWT_SECRET");
        env::remove_var("AF_OIDC_ISSUER");
        env::remove_var("AF_OIDC_JWKS_URL");
        assert!(matches!(load_auth_mode(), Err(ConfigError::MissingAuthMode)));
    }

    #[test]
    fn symmetric_secret_takes_precedence_over_jwks_vars() {
        env::set_var("AF_JWT_SECRET", "dev-secret");
        env::set_var("AF_OIDC_ISSUER", "https://issuer.example");
        env::set_var("AF_OIDC_JWKS_URL", "https://issuer.example/jwks.json");
        assert!(matches!(load_auth_mode(), Ok(AuthMode::Symmetric { .. })));
        env::remove_var("AF_JWT_SECRET");
        env::remove_var("AF_OIDC_ISSUER");
        env::remove_var("AF_OIDC_JWKS_URL");
    }
}

//! Shared error taxonomy for the AgentFlow execution substrate.
//!
//! One variant per error *kind* from the correctness contracts (integrity,
//! auth, resource, infrastructure, input), not per call site — callers match
//! on the kind to decide retry/surface behavior.

use thiserror::Error;

/// Top-level error type shared by every `af-*` crate.
#[derive(Error, Debug)]
pub enum AfError {
    // ── Integrity — fatal, always audited, never swallowed ────────────────
    /// A stored hash did not match the recomputed hash.
    #[error("hash mismatch for {what}")]
    HashMismatch {
        /// What was being verified (e.g. "audit record", "envelope").
        what: String,
    },
    /// A tenant's audit chain has a broken link.
    #[error("audit chain broken at index {index}")]
    ChainBroken {
        /// Index of the first tampered record.
        index: usize,
    },
    /// A received envelope's hash did not match its recomputed value.
    #[error("envelope hash invalid for envelope {envelope_id}")]
    EnvelopeHashInvalid {
        /// The envelope id that failed verification.
        envelope_id: uuid::Uuid,
    },

    // ── Auth — surfaced as 401/403, always audited ─────────────────────────
    /// The token could not be parsed.
    #[error("token malformed: {0}")]
    TokenMalformed(String),
    /// The token's `expires_at` is at or before now.
    #[error("token expired")]
    TokenExpired,
    /// The token's `jti` is in the revocation set.
    #[error("token revoked")]
    TokenRevoked,
    /// Signature verification failed.
    #[error("signature invalid")]
    SignatureInvalid,
    /// Request body tenant id differs from the validated token's tenant id.
    #[error("tenant mismatch: token={token_tenant} body={body_tenant}")]
    TenantMismatch {
        /// Tenant id carried by the validated token.
        token_tenant: String,
        /// Tenant id present in the request body.
        body_tenant: String,
    },
    /// RBAC evaluation denied the requested permission.
    #[error("permission denied: {permission}")]
    PermissionDenied {
        /// The permission string that was required.
        permission: String,
    },

    // ── Resource — retryable at caller's discretion ────────────────────────
    /// The requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A concurrent writer won the race on a versioned row (tail hash, etc).
    #[error("conflict: {0}")]
    Conflict(String),
    /// The bus rejected a publish (queue full) past the configured deadline.
    #[error("backpressure: publish deadline exceeded")]
    Backpressure,
    /// The rate/quota limiter denied the request.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the caller may retry.
        retry_after_secs: u64,
    },

    // ── Infrastructure — retried with backoff, then surfaced ───────────────
    /// The relational store is unreachable or returned a non-retriable error.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The durable bus is unreachable.
    #[error("bus unavailable: {0}")]
    BusUnavailable(String),
    /// The KV store is unreachable.
    #[error("kv store unavailable: {0}")]
    KvUnavailable(String),
    /// The operation's deadline elapsed before completion.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    // ── Input — never retried ───────────────────────────────────────────────
    /// `details`/record fields could not be canonicalized.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Requested token TTL exceeds the configured maximum, or is non-positive.
    #[error("invalid ttl: {0}")]
    InvalidTtl(String),
    /// The tenant id referenced does not exist.
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),
}

/// Result alias used throughout the `af-*` crates.
pub type AfResult<T> = Result<T, AfError>;

impl AfError {
    /// True for the Infrastructure kind, which callers retry with backoff.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AfError::StorageUnavailable(_)
                | AfError::BusUnavailable(_)
                | AfError::KvUnavailable(_)
                | AfError::DeadlineExceeded
        )
    }

    /// True for Integrity kind errors, which are never retried or swallowed.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            AfError::HashMismatch { .. } | AfError::ChainBroken { .. } | AfError::EnvelopeHashInvalid { .. }
        )
    }
}

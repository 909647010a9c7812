//! Tenant-Scoped Control-Plane Authority: JWT/OIDC
//! token issuance and validation, RBAC evaluation, and tenant isolation
//! enforcement.

#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod gate;
pub mod verifier;

pub use cache::RbacCache;
pub use config::AuthConfig;
pub use gate::{AuthGate, IssuedToken};
pub use verifier::{HsVerifier, JwksVerifier, TokenVerifier};

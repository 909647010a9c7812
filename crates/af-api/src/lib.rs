//! HTTP ingress for the AgentFlow execution substrate: the `/api/v1`
//! surface, wired through bearer auth and the
//! rate/quota limiter.

#![forbid(unsafe_code)]

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::AppState;

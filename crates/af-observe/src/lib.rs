//! Ambient stack shared by every binary in the workspace: environment-backed
//! configuration and process-wide tracing/OTel initialization.

#![forbid(unsafe_code)]

pub mod config;
pub mod tracing_init;

pub use config::{AppConfig, AuthMode, ConfigError};
pub use tracing_init::{init as init_tracing, shutdown as shutdown_tracing, TracingInitError};

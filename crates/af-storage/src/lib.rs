//! The Storage Port collaborator contract and a concrete SQLite
//! implementation backing it.

#![forbid(unsafe_code)]

pub mod port;
pub mod schema;
pub mod sqlite;

pub use port::{AuditTail, StoragePort};
pub use sqlite::SqliteStorage;

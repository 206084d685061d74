//! Storage Layer - local SQLite cache and shared PostgreSQL store
//!
//! Both backends hold one table:
//! - moves(repo_id, revision, source, destination, kind)

pub mod dialect;
pub mod session;
pub mod schema;
pub mod connection;
pub mod records;

pub use connection::{BackendKind, Connection, ConnectionManager, PostgresDialer, RemoteDialer};
pub use records::RecordStore;
pub use session::{DbError, Session};

//! # Movetrace - rename/copy provenance cache
//!
//! Records, per revision, which files were moved or copied and where from.
//!
//! Movetrace provides:
//! - A per-clone SQLite cache backed by a shared remote PostgreSQL store
//! - Lazy creation of the `moves` table on either backend
//! - Bounded connect retry against the remote backend
//! - Read-through lookups that pull missing revisions from a peer at most once

pub mod revision;
pub mod record;
pub mod config;
pub mod storage;
pub mod fetch;
pub mod cache;

// Re-exports for convenient access
pub use revision::Revision;
pub use record::{MoveKind, MoveRecord, RawBatch, RawMove, RenameMap};
pub use config::{MovetraceConfig, RemoteConfig, RepoHandle, StoreSettings};
pub use storage::{BackendKind, ConnectionManager, DbError, RecordStore};
pub use fetch::{FetchError, MovesPuller, RemoteFetchClient, StorePuller};
pub use cache::MoveCache;

/// Result type alias for Movetrace operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Movetrace operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not reach the {backend} moves database ({target}): {source}")]
    Connection {
        backend: BackendKind,
        target: String,
        #[source]
        source: DbError,
    },

    #[error("could not create the {backend} moves table: {source}")]
    Schema {
        backend: BackendKind,
        #[source]
        source: DbError,
    },

    #[error("could not {op} in the {backend} moves database: {source}")]
    Write {
        backend: BackendKind,
        op: &'static str,
        #[source]
        source: DbError,
    },

    #[error("could not {op} from the {backend} moves database: {source}")]
    Read {
        backend: BackendKind,
        op: &'static str,
        #[source]
        source: DbError,
    },

    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    #[error("Invalid move kind: {0}")]
    InvalidKind(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Backend the failure happened on, if it came from a database
    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Error::Connection { backend, .. }
            | Error::Schema { backend, .. }
            | Error::Write { backend, .. }
            | Error::Read { backend, .. } => Some(*backend),
            _ => None,
        }
    }
}

//! Best-effort hydration of the local cache from a peer
//!
//! Missing provenance degrades rename tracing but must never break the
//! command that asked for it, so every pull failure is absorbed here. Callers
//! re-read the local store afterwards to see whatever arrived.

use crate::config::RepoHandle;
use crate::revision::Revision;
use crate::storage::{BackendKind, RecordStore};
use crate::Error;

/// Why a pull did not happen
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network failure, peer refusal, protocol mismatch
    #[error("transport failure: {0}")]
    Transport(String),

    /// Anything that is not the transport's fault
    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<Error> for FetchError {
    fn from(e: Error) -> Self {
        // anything a backend reported is the transport's problem
        match e.backend() {
            Some(_) => FetchError::Transport(e.to_string()),
            None => FetchError::Internal(e.to_string()),
        }
    }
}

/// The transport primitive: ask a peer to send move/copy data for
/// `revisions` into the local cache of `repo`.
pub trait MovesPuller {
    fn pull_moves(&self, repo: &RepoHandle, revisions: &[Revision]) -> Result<(), FetchError>;
}

/// Fire-and-forget wrapper around a [`MovesPuller`]
pub struct RemoteFetchClient<P> {
    repo: RepoHandle,
    puller: P,
}

impl<P: MovesPuller> RemoteFetchClient<P> {
    pub fn new(repo: RepoHandle, puller: P) -> Self {
        Self { repo, puller }
    }

    pub fn puller(&self) -> &P {
        &self.puller
    }

    /// Request data for `revisions`. May or may not have helped.
    pub fn request_data(&self, revisions: &[Revision]) {
        if revisions.is_empty() {
            return;
        }
        tracing::info!("Requesting move data for {} revision(s)", revisions.len());
        match self.puller.pull_moves(&self.repo, revisions) {
            Ok(()) => {}
            Err(FetchError::Transport(msg)) => {
                tracing::warn!("Could not pull move data: {}", msg);
            }
            Err(FetchError::Internal(msg)) => {
                tracing::error!("Pulling move data failed unexpectedly: {}", msg);
            }
        }
    }
}

/// Pulls from the shared remote store straight into the local cache
#[derive(Clone)]
pub struct StorePuller {
    store: RecordStore,
}

impl StorePuller {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Upload local rows of `revisions` to the remote store.
    ///
    /// Returns the number of revisions that had local data to send.
    pub fn push(&self, revisions: &[Revision]) -> crate::Result<usize> {
        let batch = self.store.retrieve_raw(BackendKind::Local, revisions)?;
        self.store.insert_raw(BackendKind::Remote, &batch)?;
        tracing::debug!("Pushed move data for {} revision(s)", batch.len());
        Ok(batch.len())
    }
}

impl MovesPuller for StorePuller {
    fn pull_moves(&self, repo: &RepoHandle, revisions: &[Revision]) -> Result<(), FetchError> {
        if repo != self.store.connections().repo() {
            return Err(FetchError::Internal(format!(
                "puller bound to {} asked to fill {}",
                self.store.connections().repo().root.display(),
                repo.root.display()
            )));
        }
        let batch = self.store.retrieve_raw(BackendKind::Remote, revisions)?;
        self.store.insert_raw(BackendKind::Local, &batch)?;
        tracing::debug!("Pulled move data for {}/{} revision(s)", batch.len(), revisions.len());
        Ok(())
    }
}

//! Read-through lookups over the local cache
//!
//! Lookups are two-phase: read the local cache, and if revisions are missing
//! (and fetching is allowed) ask the peer once, then read the local cache once
//! more for just those revisions. There is never a second remote round trip.

use crate::fetch::{MovesPuller, RemoteFetchClient};
use crate::record::{MoveKind, RawBatch, RenameMap};
use crate::revision::Revision;
use crate::storage::{BackendKind, RecordStore};
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Local cache plus the peer that can fill it
pub struct MoveCache<P> {
    store: RecordStore,
    fetcher: RemoteFetchClient<P>,
}

/// Requested revisions not covered by `found`, in request order, deduplicated
fn missing_from<'a>(requested: &'a [Revision], found: impl Fn(&Revision) -> bool) -> Vec<Revision> {
    let mut seen = BTreeSet::new();
    requested
        .iter()
        .filter(|r| !found(*r) && seen.insert(*r))
        .cloned()
        .collect()
}

impl<P: MovesPuller> MoveCache<P> {
    pub fn new(store: RecordStore, puller: P) -> Self {
        let repo = store.connections().repo().clone();
        Self {
            store,
            fetcher: RemoteFetchClient::new(repo, puller),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn fetcher(&self) -> &RemoteFetchClient<P> {
        &self.fetcher
    }

    /// `{revision: {destination: source}}` for `kind`, pulling missing
    /// revisions from the peer at most once when `allow_fetch` is set.
    ///
    /// Revisions the peer could not supply are absent from the result.
    pub fn retrieve(
        &self,
        revisions: &[Revision],
        kind: MoveKind,
        allow_fetch: bool,
    ) -> Result<BTreeMap<Revision, RenameMap>> {
        let mut found = self.store.retrieve_structured(BackendKind::Local, revisions, kind)?;
        let missing = missing_from(revisions, |r| found.contains_key(r));
        if !allow_fetch || missing.is_empty() {
            return Ok(found);
        }

        self.fetcher.request_data(&missing);
        let fetched = self.store.retrieve_structured(BackendKind::Local, &missing, kind)?;
        tracing::debug!("Peer supplied {}/{} missing revision(s)", fetched.len(), missing.len());
        found.extend(fetched);
        Ok(found)
    }

    /// Raw rows of both kinds, with the same single-fetch fallback
    pub fn retrieve_raw(&self, revisions: &[Revision], allow_fetch: bool) -> Result<RawBatch> {
        let mut found = self.store.retrieve_raw(BackendKind::Local, revisions)?;
        let missing = missing_from(revisions, |r| found.contains_key(r));
        if !allow_fetch || missing.is_empty() {
            return Ok(found);
        }

        self.fetcher.request_data(&missing);
        found.extend(self.store.retrieve_raw(BackendKind::Local, &missing)?);
        Ok(found)
    }

    /// Warm the cache: request every revision with no local rows.
    ///
    /// Does not read the cache again; callers look up data later.
    pub fn check_presence(&self, revisions: &[Revision]) -> Result<()> {
        let present = self.store.hashes_present(BackendKind::Local, revisions)?;
        let missing = missing_from(revisions, |r| present.contains(r));
        self.fetcher.request_data(&missing);
        Ok(())
    }

    /// Record a freshly computed diff in the local cache
    pub fn record(&self, revision: &Revision, moves: &RenameMap, copies: &RenameMap) -> Result<()> {
        self.store.insert_revision(BackendKind::Local, revision, moves, copies)
    }

    /// Evict a revision from the local cache, e.g. before re-recording it
    pub fn forget(&self, revision: &Revision) -> Result<u64> {
        self.store.delete(BackendKind::Local, revision)
    }
}

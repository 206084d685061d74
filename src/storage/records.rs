//! Reads and writes of rename/copy rows

use super::connection::{BackendKind, Connection, ConnectionManager};
use super::session::{DbError, Row};
use crate::record::{MoveKind, MoveRecord, RawBatch, RawMove, RenameMap};
use crate::revision::Revision;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Most revisions bound into a single `IN (...)` list
const MAX_REVISIONS_PER_QUERY: usize = 500;

/// CRUD over the `moves` table of either backend, for one repository.
///
/// Every call opens its own connection and closes it before returning.
/// Operations either fully succeed or return an error; no partial results.
#[derive(Clone)]
pub struct RecordStore {
    connections: ConnectionManager,
}

impl RecordStore {
    pub fn new(connections: ConnectionManager) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    fn repo_id(&self) -> String {
        self.connections.repo().repo_id()
    }

    // ========== Writes ==========

    /// Store one revision's rename map of the given kind.
    ///
    /// An empty map stores the null marker, recording that the revision was
    /// checked and had nothing of this kind.
    pub fn insert(&self, backend: BackendKind, revision: &Revision, renames: &RenameMap, kind: MoveKind) -> Result<()> {
        let rows = MoveRecord::from_map(&self.repo_id(), revision, renames, kind);
        self.write_rows(backend, "insert moves", &rows)
    }

    /// Store both kinds for one revision in a single commit
    pub fn insert_revision(
        &self,
        backend: BackendKind,
        revision: &Revision,
        moves: &RenameMap,
        copies: &RenameMap,
    ) -> Result<()> {
        let repo_id = self.repo_id();
        let mut rows = MoveRecord::from_map(&repo_id, revision, moves, MoveKind::Move);
        rows.extend(MoveRecord::from_map(&repo_id, revision, copies, MoveKind::Copy));
        self.write_rows(backend, "insert moves", &rows)
    }

    /// Bulk insert rows in transport form, e.g. a payload pulled from a peer
    pub fn insert_raw(&self, backend: BackendKind, batch: &RawBatch) -> Result<()> {
        let repo_id = self.repo_id();
        let rows: Vec<MoveRecord> = batch
            .iter()
            .flat_map(|(revision, raws)| raws.iter().map(|raw| MoveRecord::from_raw(&repo_id, revision, raw)))
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.write_rows(backend, "insert raw moves", &rows)
    }

    /// Remove every row of `revision` for this repository
    pub fn delete(&self, backend: BackendKind, revision: &Revision) -> Result<u64> {
        let repo_id = self.repo_id();
        self.connections.with_connection(backend, |conn| {
            let sql = conn.session().dialect().delete();
            let deleted = conn
                .session()
                .execute(&sql, &[Some(repo_id.as_str()), Some(revision.as_str())])
                .map_err(|source| Error::Write {
                    backend,
                    op: "delete revision",
                    source,
                })?;
            tracing::debug!("Deleted {} {} row(s) for {}", deleted, backend, revision);
            Ok(deleted)
        })
    }

    fn write_rows(&self, backend: BackendKind, op: &'static str, rows: &[MoveRecord]) -> Result<()> {
        self.connections.with_connection(backend, |conn| {
            let sql = conn.session().dialect().insert();
            let params: Vec<[Option<&str>; 5]> = rows.iter().map(MoveRecord::params).collect();
            conn.session()
                .execute_many(&sql, &params)
                .map_err(|source| Error::Write { backend, op, source })?;
            tracing::debug!("Inserted {} row(s) into the {} moves table", rows.len(), backend);
            Ok(())
        })
    }

    // ========== Reads ==========

    /// `{revision: {destination: source}}` for the requested kind.
    ///
    /// A revision holding only the null marker maps to an empty map; a
    /// revision with no rows at all is absent from the result.
    pub fn retrieve_structured(
        &self,
        backend: BackendKind,
        revisions: &[Revision],
        kind: MoveKind,
    ) -> Result<BTreeMap<Revision, RenameMap>> {
        let mut out: BTreeMap<Revision, RenameMap> = BTreeMap::new();
        if revisions.is_empty() {
            return Ok(out);
        }

        let repo_id = self.repo_id();
        let rows = self.connections.with_connection(backend, |conn| {
            select_chunked(conn, revisions, "retrieve moves", |dialect, count| {
                (dialect.select_by_revisions(count), vec![Some(repo_id.as_str()), Some(kind.as_flag())])
            })
        })?;

        for row in rows {
            let mut cols = row.into_iter();
            let (Some(Some(revision)), Some(source), Some(destination)) = (cols.next(), cols.next(), cols.next())
            else {
                continue;
            };
            let entry = out.entry(Revision::from_stored(revision)).or_default();
            if let (Some(source), Some(destination)) = (source, destination) {
                entry.insert(destination, source);
            }
        }
        Ok(out)
    }

    /// Every row of the requested revisions in transport form, both kinds.
    ///
    /// Rows are not deduplicated here: the payload mirrors what is stored.
    pub fn retrieve_raw(&self, backend: BackendKind, revisions: &[Revision]) -> Result<RawBatch> {
        let mut out = RawBatch::new();
        if revisions.is_empty() {
            return Ok(out);
        }

        const OP: &str = "retrieve raw moves";
        let repo_id = self.repo_id();
        let rows = self.connections.with_connection(backend, |conn| {
            select_chunked(conn, revisions, OP, |dialect, count| {
                (dialect.select_raw(count), vec![Some(repo_id.as_str())])
            })
        })?;

        for row in rows {
            let mut cols = row.into_iter();
            let (Some(Some(revision)), Some(source), Some(destination), Some(Some(flag))) =
                (cols.next(), cols.next(), cols.next(), cols.next())
            else {
                continue;
            };
            let kind = MoveKind::from_flag(&flag).map_err(|e| Error::Read {
                backend,
                op: OP,
                source: DbError::Decode(e.to_string()),
            })?;
            let raw = match (source, destination) {
                (Some(source), Some(destination)) => RawMove::new(source, destination, kind),
                _ => RawMove::marker(kind),
            };
            out.entry(Revision::from_stored(revision)).or_default().push(raw);
        }
        Ok(out)
    }

    /// The requested revisions that have at least one row, of any kind
    pub fn hashes_present(&self, backend: BackendKind, revisions: &[Revision]) -> Result<BTreeSet<Revision>> {
        if revisions.is_empty() {
            return Ok(BTreeSet::new());
        }

        let repo_id = self.repo_id();
        let rows = self.connections.with_connection(backend, |conn| {
            select_chunked(conn, revisions, "check revision presence", |dialect, count| {
                (dialect.select_presence(count), vec![Some(repo_id.as_str())])
            })
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .map(Revision::from_stored)
            .collect())
    }
}

/// Run a revision-list query in chunks and concatenate the rows.
///
/// `build` returns the SQL for a chunk of `count` revisions and the leading
/// parameters; the chunk's revisions are bound after them.
fn select_chunked<'a>(
    conn: &mut Connection,
    revisions: &'a [Revision],
    op: &'static str,
    build: impl Fn(&dyn super::dialect::Dialect, usize) -> (String, Vec<Option<&'a str>>),
) -> Result<Vec<Row>> {
    let backend = conn.backend();
    let read_err = |source: DbError| Error::Read { backend, op, source };

    let mut rows = Vec::new();
    for chunk in revisions.chunks(MAX_REVISIONS_PER_QUERY) {
        let (sql, mut params) = build(conn.session().dialect(), chunk.len());
        params.extend(chunk.iter().map(|r| Some(r.as_str())));
        rows.extend(conn.session().query(&sql, &params).map_err(read_err)?);
    }
    Ok(rows)
}

//! Lazy creation of the `moves` table

use super::connection::BackendKind;
use super::session::Session;
use crate::{Error, Result};

/// Make sure the `moves` table exists on this session, creating it if needed.
///
/// There is no partial-schema recovery: any failure aborts the operation that
/// opened the connection.
pub fn ensure_schema(session: &mut dyn Session, backend: BackendKind) -> Result<()> {
    let dialect = session.dialect();
    let schema_err = |source| Error::Schema { backend, source };

    let found = session.query(dialect.exists_table(), &[]).map_err(schema_err)?;
    if !found.is_empty() {
        return Ok(());
    }

    tracing::debug!("Creating {} moves table ({})", backend, dialect.name());
    for stmt in dialect.create_table() {
        session.execute(stmt, &[]).map_err(schema_err)?;
    }
    Ok(())
}

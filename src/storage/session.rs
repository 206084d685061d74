//! Open sessions on either backend
//!
//! Every column of the `moves` table is text, so sessions only ever bind
//! `Option<&str>` parameters and hand rows back as `Vec<Option<String>>`.

use super::dialect::{Dialect, PostgresDialect, SqliteDialect};
use postgres::types::ToSql;
use rusqlite::params_from_iter;
use std::path::Path;
use std::time::Duration;

/// A fetched row, one entry per selected column
pub type Row = Vec<Option<String>>;

/// Driver-level failure from either backend
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Postgres(#[from] postgres::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored value the driver read fine but the row cannot be decoded from
    #[error("undecodable row: {0}")]
    Decode(String),
}

/// An open connection to one backend
pub trait Session {
    /// SQL dialect this session speaks
    fn dialect(&self) -> &'static dyn Dialect;

    fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError>;

    fn execute(&mut self, sql: &str, params: &[Option<&str>]) -> Result<u64, DbError>;

    /// Run `sql` once per parameter row inside one transaction, then commit.
    ///
    /// On error nothing is committed.
    fn execute_many(&mut self, sql: &str, rows: &[[Option<&str>; 5]]) -> Result<(), DbError>;

    /// Ask the server to drop this session after `timeout` of inactivity
    fn set_idle_timeout(&mut self, timeout: Duration) -> Result<(), DbError>;

    /// Release the connection
    fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Session on a local SQLite file
pub struct SqliteSession {
    conn: rusqlite::Connection,
}

impl SqliteSession {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = rusqlite::Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }
}

impl Session for SqliteSession {
    fn dialect(&self) -> &'static dyn Dialect {
        &SqliteDialect
    }

    fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..columns)
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect::<rusqlite::Result<Row>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn execute(&mut self, sql: &str, params: &[Option<&str>]) -> Result<u64, DbError> {
        let changed = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(changed as u64)
    }

    fn execute_many(&mut self, sql: &str, rows: &[[Option<&str>; 5]]) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn set_idle_timeout(&mut self, _timeout: Duration) -> Result<(), DbError> {
        // embedded, no server session to expire
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))
    }
}

/// Session on the shared PostgreSQL store
pub struct PostgresSession {
    client: postgres::Client,
}

impl PostgresSession {
    pub fn new(client: postgres::Client) -> Self {
        Self { client }
    }
}

fn pg_params<'a>(params: &'a [Option<&'a str>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl Session for PostgresSession {
    fn dialect(&self) -> &'static dyn Dialect {
        &PostgresDialect
    }

    fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
        let rows = self.client.query(sql, &pg_params(params))?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let values = (0..row.len())
                .map(|i| row.try_get::<_, Option<String>>(i))
                .collect::<Result<Row, _>>()?;
            out.push(values);
        }
        Ok(out)
    }

    fn execute(&mut self, sql: &str, params: &[Option<&str>]) -> Result<u64, DbError> {
        Ok(self.client.execute(sql, &pg_params(params))?)
    }

    fn execute_many(&mut self, sql: &str, rows: &[[Option<&str>; 5]]) -> Result<(), DbError> {
        let mut tx = self.client.transaction()?;
        let stmt = tx.prepare(sql)?;
        for row in rows {
            tx.execute(&stmt, &pg_params(row))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn set_idle_timeout(&mut self, timeout: Duration) -> Result<(), DbError> {
        // SET takes no bind parameters; the value is an integer we formatted
        let sql = format!("SET idle_session_timeout = '{}s'", timeout.as_secs());
        self.client.batch_execute(&sql)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DbError> {
        Ok(self.client.close()?)
    }
}

//! SQL text per backend
//!
//! Both backends share one logical schema; only the placeholder syntax, the
//! catalog probe, and column types differ. Statement builders take the number
//! of revisions bound into an `IN (...)` list and always bind parameters in
//! the order documented on each method.

/// Name of the tracking table
pub const TABLE: &str = "moves";

/// Statement builders for one backend dialect
pub trait Dialect: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Placeholder for the 1-based parameter `index`
    fn placeholder(&self, index: usize) -> String;

    /// Query returning a row iff the table exists
    fn exists_table(&self) -> &'static str;

    /// Statements creating the table and its index
    fn create_table(&self) -> &'static [&'static str];

    /// Comma-separated placeholders `start..start + count`
    fn placeholders(&self, start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Params: repo_id, revision, source, destination, kind
    fn insert(&self) -> String {
        format!(
            "INSERT INTO {} (repo_id, revision, source, destination, kind) VALUES ({})",
            TABLE,
            self.placeholders(1, 5)
        )
    }

    /// Returns revision, source, destination.
    /// Params: repo_id, kind, revisions...
    fn select_by_revisions(&self, count: usize) -> String {
        format!(
            "SELECT DISTINCT revision, source, destination FROM {} \
             WHERE repo_id = {} AND kind = {} AND revision IN ({})",
            TABLE,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholders(3, count)
        )
    }

    /// Returns revision, source, destination, kind; duplicates are kept.
    /// Rows come back in a stable order on every backend.
    /// Params: repo_id, revisions...
    fn select_raw(&self, count: usize) -> String {
        format!(
            "SELECT revision, source, destination, kind FROM {} \
             WHERE repo_id = {} AND revision IN ({}) \
             ORDER BY revision, kind, destination, source",
            TABLE,
            self.placeholder(1),
            self.placeholders(2, count)
        )
    }

    /// Params: repo_id, revision
    fn delete(&self) -> String {
        format!(
            "DELETE FROM {} WHERE repo_id = {} AND revision = {}",
            TABLE,
            self.placeholder(1),
            self.placeholder(2)
        )
    }

    /// Returns revision.
    /// Params: repo_id, revisions...
    fn select_presence(&self, count: usize) -> String {
        format!(
            "SELECT DISTINCT revision FROM {} WHERE repo_id = {} AND revision IN ({})",
            TABLE,
            self.placeholder(1),
            self.placeholders(2, count)
        )
    }
}

/// Embedded SQLite cache
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn exists_table(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'moves'"
    }

    fn create_table(&self) -> &'static [&'static str] {
        &[
            r#"
            CREATE TABLE IF NOT EXISTS moves (
                repo_id TEXT NOT NULL,
                revision TEXT NOT NULL,
                source TEXT,
                destination TEXT,
                kind CHAR(1) NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_moves_repo_revision ON moves(repo_id, revision)",
        ]
    }
}

/// Shared PostgreSQL store
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn exists_table(&self) -> &'static str {
        "SELECT tablename FROM pg_catalog.pg_tables \
         WHERE schemaname = current_schema() AND tablename = 'moves'"
    }

    fn create_table(&self) -> &'static [&'static str] {
        &[
            r#"
            CREATE TABLE IF NOT EXISTS moves (
                repo_id TEXT NOT NULL,
                revision VARCHAR(40) NOT NULL,
                source TEXT,
                destination TEXT,
                kind CHAR(1) NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_moves_repo_revision ON moves(repo_id, revision)",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_placeholders() {
        let sql = SqliteDialect.select_by_revisions(3);
        assert!(sql.contains("repo_id = ? AND kind = ? AND revision IN (?, ?, ?)"));
        assert!(sql.starts_with("SELECT DISTINCT"));
        assert_eq!(
            SqliteDialect.insert(),
            "INSERT INTO moves (repo_id, revision, source, destination, kind) VALUES (?, ?, ?, ?, ?)"
        );
    }

    #[test]
    fn test_postgres_placeholders() {
        let sql = PostgresDialect.select_raw(2);
        assert!(sql.contains("repo_id = $1 AND revision IN ($2, $3)"));
        assert!(!sql.contains("DISTINCT"));
        assert!(sql.ends_with("ORDER BY revision, kind, destination, source"));
        assert!(PostgresDialect.delete().ends_with("repo_id = $1 AND revision = $2"));
        assert!(PostgresDialect.select_presence(1).contains("IN ($2)"));
    }

    #[test]
    fn test_create_tolerates_existing_table() {
        for dialect in [&SqliteDialect as &dyn Dialect, &PostgresDialect] {
            assert!(dialect.create_table().iter().all(|stmt| stmt.contains("IF NOT EXISTS")));
        }
    }
}

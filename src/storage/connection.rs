//! Opening connections to the local cache and the remote store

use super::schema::ensure_schema;
use super::session::{DbError, PostgresSession, Session, SqliteSession};
use crate::config::{ensure_db_dir, RemoteConfig, RepoHandle, StoreSettings};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Which of the two stores an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Per-clone SQLite cache
    Local,
    /// Shared authoritative store
    Remote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opens sessions on the remote store.
///
/// Split out so the retry loop can be driven without a live server.
pub trait RemoteDialer: Send + Sync {
    fn dial(&self, config: &RemoteConfig) -> std::result::Result<Box<dyn Session>, DbError>;
}

/// Dials PostgreSQL over plain TCP
pub struct PostgresDialer;

impl RemoteDialer for PostgresDialer {
    fn dial(&self, config: &RemoteConfig) -> std::result::Result<Box<dyn Session>, DbError> {
        let mut pg = postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .dbname(&config.database);
        if let Some(password) = &config.password {
            pg.password(password);
        }
        let client = pg.connect(postgres::NoTls)?;
        Ok(Box::new(PostgresSession::new(client)))
    }
}

/// An open, schema-checked session on one backend
pub struct Connection {
    backend: BackendKind,
    session: Box<dyn Session>,
}

impl Connection {
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn session(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    /// Release the connection. Close failures are only logged; the work
    /// done on the connection has already succeeded or failed by now.
    pub fn close(self) {
        let backend = self.backend;
        if let Err(e) = self.session.close() {
            tracing::debug!("Closing {} connection failed: {}", backend, e);
        }
    }
}

/// Connections successfully opened, shared by a manager and its clones
#[derive(Debug, Default)]
struct OpenCounts {
    local: AtomicUsize,
    remote: AtomicUsize,
}

impl OpenCounts {
    fn slot(&self, backend: BackendKind) -> &AtomicUsize {
        match backend {
            BackendKind::Local => &self.local,
            BackendKind::Remote => &self.remote,
        }
    }
}

/// Hands out connections for one repository.
#[derive(Clone)]
pub struct ConnectionManager {
    repo: RepoHandle,
    settings: StoreSettings,
    remote: Option<RemoteConfig>,
    dialer: Arc<dyn RemoteDialer>,
    opened: Arc<OpenCounts>,
}

impl ConnectionManager {
    /// Manager with the PostgreSQL dialer for the remote backend
    pub fn new(repo: RepoHandle, settings: StoreSettings, remote: Option<RemoteConfig>) -> Self {
        Self::with_dialer(repo, settings, remote, Arc::new(PostgresDialer))
    }

    pub fn with_dialer(
        repo: RepoHandle,
        settings: StoreSettings,
        remote: Option<RemoteConfig>,
        dialer: Arc<dyn RemoteDialer>,
    ) -> Self {
        Self {
            repo,
            settings,
            remote,
            dialer,
            opened: Arc::default(),
        }
    }

    pub fn repo(&self) -> &RepoHandle {
        &self.repo
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Path of the local cache file
    pub fn local_path(&self) -> PathBuf {
        self.repo.state_dir.join(&self.settings.db_name)
    }

    /// Connections opened on `backend` so far, across all clones of this manager
    pub fn opened(&self, backend: BackendKind) -> usize {
        self.opened.slot(backend).load(Ordering::Relaxed)
    }

    /// Open a connection and make sure the table exists
    pub fn connect(&self, backend: BackendKind) -> Result<Connection> {
        let mut session = match backend {
            BackendKind::Local => self.open_local()?,
            BackendKind::Remote => self.open_remote()?,
        };
        ensure_schema(session.as_mut(), backend)?;
        self.opened.slot(backend).fetch_add(1, Ordering::Relaxed);
        Ok(Connection { backend, session })
    }

    /// Run `f` on a fresh connection, closing it whatever `f` returns
    pub fn with_connection<T>(
        &self,
        backend: BackendKind,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.connect(backend)?;
        let result = f(&mut conn);
        conn.close();
        result
    }

    fn open_local(&self) -> Result<Box<dyn Session>> {
        let path = self.local_path();
        let connection_err = |source| Error::Connection {
            backend: BackendKind::Local,
            target: path.display().to_string(),
            source,
        };

        ensure_db_dir(&path).map_err(|e| connection_err(DbError::Io(e)))?;
        tracing::debug!("Opening local moves database {}", path.display());
        let session = SqliteSession::open(&path).map_err(connection_err)?;
        Ok(Box::new(session))
    }

    fn open_remote(&self) -> Result<Box<dyn Session>> {
        let config = self
            .remote
            .as_ref()
            .ok_or_else(|| Error::Config("remote moves database is not configured".to_string()))?;
        let retry = self.settings.retry;
        let attempts = retry.attempts.max(1);

        let mut attempt = 1;
        let mut session = loop {
            match self.dialer.dial(config) {
                Ok(session) => break session,
                Err(e) if attempt < attempts => {
                    // the remote store is occasionally flaky, so retry a little
                    tracing::warn!(
                        "Connecting to {} failed (attempt {}/{}): {}",
                        config.target(),
                        attempt,
                        attempts,
                        e
                    );
                    attempt += 1;
                    std::thread::sleep(retry.delay());
                }
                Err(e) => {
                    return Err(Error::Connection {
                        backend: BackendKind::Remote,
                        target: config.target(),
                        source: e,
                    });
                }
            }
        };
        tracing::debug!("Connected to {} after {} attempt(s)", config.target(), attempt);

        let timeout = std::time::Duration::from_secs(u64::from(self.settings.idle_timeout_secs));
        session.set_idle_timeout(timeout).map_err(|source| Error::Connection {
            backend: BackendKind::Remote,
            target: config.target(),
            source,
        })?;
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RetrySettings;
    use std::path::Path;

    /// Stands in for the remote server: a SQLite file shared by every
    /// manager pointed at it, failing the first `failures` dials.
    pub(crate) struct SqliteDialer {
        pub path: PathBuf,
        pub failures: usize,
        pub calls: AtomicUsize,
    }

    impl SqliteDialer {
        pub(crate) fn new(path: &Path, failures: usize) -> Self {
            Self {
                path: path.to_path_buf(),
                failures,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteDialer for SqliteDialer {
        fn dial(&self, _config: &RemoteConfig) -> std::result::Result<Box<dyn Session>, DbError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                // a path under a missing directory cannot be opened
                let bad = self.path.with_extension("missing").join("nope.db");
                return SqliteSession::open(&bad).map(|s| Box::new(s) as Box<dyn Session>);
            }
            Ok(Box::new(SqliteSession::open(&self.path)?))
        }
    }

    pub(crate) fn remote_config() -> RemoteConfig {
        RemoteConfig {
            host: "db.test".to_string(),
            database: "copytrace".to_string(),
            user: "tester".to_string(),
            port: 5432,
            password: None,
        }
    }

    pub(crate) fn fast_settings() -> StoreSettings {
        StoreSettings {
            retry: RetrySettings {
                attempts: 3,
                delay_ms: 1,
            },
            ..StoreSettings::default()
        }
    }

    /// Manager for a repo under `root`, remote served by `dialer`
    pub(crate) fn test_manager(root: &Path, dialer: Arc<SqliteDialer>) -> ConnectionManager {
        ConnectionManager::with_dialer(
            RepoHandle::at(root.join("repo")),
            fast_settings(),
            Some(remote_config()),
            dialer,
        )
    }

    #[test]
    fn test_local_connect_creates_file_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let dialer = Arc::new(SqliteDialer::new(&dir.path().join("remote.db"), 0));
        let manager = test_manager(dir.path(), dialer);

        let mut conn = manager.connect(BackendKind::Local).unwrap();
        assert_eq!(conn.backend(), BackendKind::Local);
        let rows = conn
            .session()
            .query("SELECT name FROM sqlite_master WHERE name = 'moves'", &[])
            .unwrap();
        assert_eq!(rows.len(), 1);
        conn.close();

        assert!(manager.local_path().ends_with(".hg/moves.db"));
        assert!(manager.local_path().exists());
    }

    #[test]
    fn test_local_connect_failure_names_store() {
        let dir = tempfile::tempdir().unwrap();
        // the state dir is a file, so the database cannot be created inside it
        let state = dir.path().join("state");
        std::fs::write(&state, b"not a directory").unwrap();
        let manager = ConnectionManager::new(
            RepoHandle::new(dir.path(), state.join("sub")),
            StoreSettings::default(),
            None,
        );

        let err = match manager.connect(BackendKind::Local) {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("local"));
    }

    #[test]
    fn test_remote_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let dialer = Arc::new(SqliteDialer::new(&dir.path().join("remote.db"), 2));
        let manager = test_manager(dir.path(), dialer.clone());

        let conn = manager.connect(BackendKind::Remote).unwrap();
        assert_eq!(conn.backend(), BackendKind::Remote);
        conn.close();
        assert_eq!(dialer.calls(), 3);
        // failed dials are not counted as opened connections
        assert_eq!(manager.opened(BackendKind::Remote), 1);
        assert_eq!(manager.opened(BackendKind::Local), 0);
    }

    #[test]
    fn test_remote_gives_up_after_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let dialer = Arc::new(SqliteDialer::new(&dir.path().join("remote.db"), 3));
        let manager = test_manager(dir.path(), dialer.clone());

        let err = match manager.connect(BackendKind::Remote) {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Connection { backend: BackendKind::Remote, .. }));
        assert_eq!(dialer.calls(), 3);
    }

    #[test]
    fn test_remote_requires_config() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectionManager::new(RepoHandle::at(dir.path()), StoreSettings::default(), None);
        assert!(!manager.has_remote());
        assert!(matches!(manager.connect(BackendKind::Remote), Err(Error::Config(_))));
    }

    #[test]
    fn test_with_connection_propagates_result() {
        let dir = tempfile::tempdir().unwrap();
        let dialer = Arc::new(SqliteDialer::new(&dir.path().join("remote.db"), 0));
        let manager = test_manager(dir.path(), dialer);

        let out = manager
            .with_connection(BackendKind::Local, |conn| Ok(conn.backend()))
            .unwrap();
        assert_eq!(out, BackendKind::Local);

        let err = manager
            .with_connection(BackendKind::Local, |_| -> Result<()> {
                Err(Error::Config("boom".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `remote.password`
pub const PASSWORD_ENV: &str = "MOVETRACE_REMOTE_PASSWORD";

/// Private state directory of a clone, relative to its root
pub const DEFAULT_STATE_DIR: &str = ".hg";

/// File name of the local cache inside the state directory
pub const DEFAULT_DB_NAME: &str = "moves.db";

/// The repository clone a cache belongs to.
///
/// The root path doubles as the repository id stored with every row, which is
/// what keeps many repositories apart inside the shared remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub root: PathBuf,
    pub state_dir: PathBuf,
}

impl RepoHandle {
    pub fn new(root: impl Into<PathBuf>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state_dir: state_dir.into(),
        }
    }

    /// Repository at `root` with the default state directory
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state_dir = root.join(DEFAULT_STATE_DIR);
        Self { root, state_dir }
    }

    pub fn repo_id(&self) -> String {
        self.root.to_string_lossy().to_string()
    }
}

/// Connection parameters for the shared remote store
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub host: String,
    pub database: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    5432
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RemoteConfig {
    /// `user@host:port/database`, for messages
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total connect attempts, including the first
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 200,
        }
    }
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalSettings {
    pub db_name: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
        }
    }
}

/// Tunables of the connection layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub db_name: String,
    pub retry: RetrySettings,
    /// Server-side idle timeout for remote sessions, in seconds
    pub idle_timeout_secs: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            retry: RetrySettings::default(),
            idle_timeout_secs: 300,
        }
    }
}

/// Contents of `movetrace.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MovetraceConfig {
    #[serde(default)]
    pub local: LocalSettings,
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub retry: RetrySettings,
    pub idle_timeout_secs: Option<u32>,
}

impl MovetraceConfig {
    pub fn settings(&self) -> StoreSettings {
        let defaults = StoreSettings::default();
        StoreSettings {
            db_name: self.local.db_name.clone(),
            retry: self.retry,
            idle_timeout_secs: self.idle_timeout_secs.unwrap_or(defaults.idle_timeout_secs),
        }
    }

    /// Fill the remote password from the environment when set there
    pub fn apply_env(&mut self) {
        if let (Some(remote), Ok(password)) = (self.remote.as_mut(), std::env::var(PASSWORD_ENV)) {
            remote.password = Some(password);
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("movetrace.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<MovetraceConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let mut config: MovetraceConfig = toml::from_str(&contents)?;
    config.apply_env();
    Ok(Some(config))
}

pub fn ensure_db_dir(db_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: MovetraceConfig = toml::from_str("").unwrap();
        let settings = config.settings();
        assert_eq!(settings, StoreSettings::default());
        assert_eq!(settings.retry.attempts, 3);
        assert_eq!(settings.retry.delay(), Duration::from_millis(200));
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_parse_full() {
        let config: MovetraceConfig = toml::from_str(
            r#"
            idle_timeout_secs = 60

            [local]
            db_name = "cache.db"

            [remote]
            host = "db.internal"
            database = "copytrace"
            user = "svc"
            password = "hunter2"

            [retry]
            attempts = 5
            "#,
        )
        .unwrap();
        let remote = config.remote.clone().unwrap();
        assert_eq!(remote.port, 5432);
        assert_eq!(remote.target(), "svc@db.internal:5432/copytrace");
        assert!(!format!("{:?}", remote).contains("hunter2"));

        let settings = config.settings();
        assert_eq!(settings.db_name, "cache.db");
        assert_eq!(settings.retry.attempts, 5);
        assert_eq!(settings.retry.delay_ms, 200);
        assert_eq!(settings.idle_timeout_secs, 60);
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_repo_handle() {
        let repo = RepoHandle::at("/src/project");
        assert_eq!(repo.state_dir, PathBuf::from("/src/project/.hg"));
        assert_eq!(repo.repo_id(), "/src/project");
    }
}

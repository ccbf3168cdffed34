//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "GARAGE_LEDGER_CONFIG_PATH";

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// HTTP server and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".garage-ledger/ledger.db")
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:3001".to_string(),
        "http://localhost:4000".to_string(),
    ]
}

/// Shared secret for destructive admin actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// When unset, every admin action is refused.
    #[serde(default)]
    pub password: Option<String>,
}

impl AdminConfig {
    /// Exact match against the configured secret.
    pub fn verify(&self, candidate: Option<&str>) -> bool {
        match (self.password.as_deref(), candidate) {
            (Some(expected), Some(given)) => !expected.is_empty() && expected == given,
            _ => false,
        }
    }
}

/// Realtime fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// When false, `/ws` accepts and immediately closes connections.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Events buffered per subscriber before it starts skipping.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            capacity: default_capacity(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_capacity() -> usize {
    256
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files, most specific first.
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("garage-ledger.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".garage-ledger").join("config.yaml"));
        }
        paths
    }

    /// Load the first config file found, falling back to defaults, then
    /// apply environment overrides.
    ///
    /// An explicitly named file must exist; discovered ones are optional.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::first_existing(&Self::search_paths(None))?,
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn first_existing(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates {
            if path.exists() {
                debug!(path = %path.display(), "Loading config");
                return Self::load(path);
            }
        }
        Ok(Self::default())
    }

    /// Apply `GARAGE_LEDGER_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db_path) = lookup("GARAGE_LEDGER_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(host) = lookup("GARAGE_LEDGER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("GARAGE_LEDGER_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid GARAGE_LEDGER_PORT"),
            }
        }

        if let Some(password) = lookup("GARAGE_LEDGER_ADMIN_PASSWORD") {
            self.admin.password = Some(password).filter(|p| !p.is_empty());
        }

        if let Some(origins) = lookup("GARAGE_LEDGER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.allowed_origins.len(), 3);
        assert_eq!(config.realtime.capacity, 256);
        assert!(config.realtime.enabled);
        assert!(config.admin.password.is_none());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "server:\n  port: 8080\nadmin:\n  password: secret\n",
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.db_path, PathBuf::from(".garage-ledger/ledger.db"));
        assert_eq!(config.admin.password.as_deref(), Some("secret"));
    }

    #[test]
    fn overrides_win_over_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GARAGE_LEDGER_PORT", "4100"),
            ("GARAGE_LEDGER_DB_PATH", "/tmp/other.db"),
            ("GARAGE_LEDGER_ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
            ("GARAGE_LEDGER_ADMIN_PASSWORD", "hunter2"),
        ]);
        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 4100);
        assert_eq!(config.server.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.server.allowed_origins, ["http://a.test", "http://b.test"]);
        assert_eq!(config.admin.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "GARAGE_LEDGER_PORT").then(|| "nope".to_string()));
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn admin_verify_requires_configured_secret() {
        let unset = AdminConfig::default();
        assert!(!unset.verify(Some("anything")));

        let set = AdminConfig {
            password: Some("s3cret".to_string()),
        };
        assert!(set.verify(Some("s3cret")));
        assert!(!set.verify(Some("S3cret")));
        assert!(!set.verify(None));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "realtime:\n  enabled: false\n  capacity: 8\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.realtime.capacity, 8);
        assert!(!config.realtime.enabled);
    }

    #[test]
    fn ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.server.db_path = dir.path().join("nested").join("ledger.db");

        config.ensure_db_dir().unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_STORE_FILE: &str = "persgest_master.xlsx";

/// Settings for one store handle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub lock_timeout_secs: u64,
    pub lock_poll_ms: u64,
    pub backup_keep_last: usize,
    pub cache_ttl_secs: u64,
    /// Files smaller than this are treated as corrupt.
    pub min_store_bytes: u64,
    /// Where exports go when no destination is given; `<store dir>/exports` if unset.
    pub export_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: default_store_path(),
            lock_timeout_secs: 120,
            lock_poll_ms: 100,
            backup_keep_last: 200,
            cache_ttl_secs: 5,
            min_store_bytes: 4096,
            export_dir: None,
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("data"))
        .join("PersGest")
        .join(DEFAULT_STORE_FILE)
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `PERSGEST_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = StoreConfig::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(path) = get("PERSGEST_DB_PATH").filter(|p| !p.trim().is_empty()) {
            self.path = PathBuf::from(path.trim());
        }
        if let Some(secs) = get("PERSGEST_LOCK_TIMEOUT_SECS").and_then(|v| v.trim().parse().ok()) {
            self.lock_timeout_secs = secs;
        }
        if let Some(keep) = get("PERSGEST_BACKUP_KEEP").and_then(|v| v.trim().parse().ok()) {
            self.backup_keep_last = keep;
        }
        if let Some(ttl) = get("PERSGEST_CACHE_TTL_SECS").and_then(|v| v.trim().parse().ok()) {
            self.cache_ttl_secs = ttl;
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.export_dir.clone().unwrap_or_else(|| {
            self.path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
                .join("exports")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("/srv/persgest/db.xlsx");
        assert_eq!(config.lock_timeout(), Duration::from_secs(120));
        assert_eq!(config.lock_poll(), Duration::from_millis(100));
        assert_eq!(config.backup_keep_last, 200);
        assert_eq!(config.export_dir(), PathBuf::from("/srv/persgest/exports"));
        assert!(StoreConfig::default().path.ends_with("PersGest/persgest_master.xlsx"));
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("PERSGEST_DB_PATH", "/tmp/x.xlsx"),
            ("PERSGEST_LOCK_TIMEOUT_SECS", "30"),
            ("PERSGEST_BACKUP_KEEP", "many"),
        ]
        .into_iter()
        .collect();

        let mut config = StoreConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.path, PathBuf::from("/tmp/x.xlsx"));
        assert_eq!(config.lock_timeout_secs, 30);
        assert_eq!(config.backup_keep_last, 200);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"path": "db.xlsx", "cache_ttl_secs": 0}"#).unwrap();
        assert_eq!(config.path, PathBuf::from("db.xlsx"));
        assert_eq!(config.cache_ttl(), Duration::ZERO);
        assert_eq!(config.min_store_bytes, 4096);
        assert_eq!(config.export_dir(), PathBuf::from("exports"));
    }
}

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::atomic::atomic_write_bytes;
use super::DbError;

pub const META_FILE: &str = "db_meta.json";

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Contents of the `db_meta.json` sidecar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub db_version: u64,
    pub last_write_ts: Option<NaiveDateTime>,
    /// Keys written by other tools, carried through bumps.
    #[serde(skip)]
    pub extra: Map<String, Value>,
}

impl VersionMeta {
    fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return VersionMeta::default();
        };

        let db_version = map
            .remove("db_version")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
            .unwrap_or(0);
        let last_write_ts = map
            .remove("last_write_ts")
            .and_then(|v| v.as_str().map(str::to_string))
            .and_then(|s| parse_ts(&s));

        VersionMeta {
            db_version,
            last_write_ts,
            extra: map,
        }
    }

    fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert("db_version".into(), Value::from(self.db_version));
        map.insert(
            "last_write_ts".into(),
            self.last_write_ts
                .map(|ts| Value::from(ts.format(TS_FORMAT).to_string()))
                .unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}

fn parse_ts(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

pub fn meta_path_for(store: &Path) -> PathBuf {
    store
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(META_FILE)
}

/// Current metadata; zero version when the sidecar is missing or garbled.
pub fn read_meta(store: &Path) -> VersionMeta {
    let path = meta_path_for(store);
    let Ok(raw) = fs::read_to_string(&path) else {
        return VersionMeta::default();
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => VersionMeta::from_value(value),
        Err(e) => {
            debug!(path = %path.display(), "Unreadable metadata sidecar: {}", e);
            VersionMeta::default()
        }
    }
}

fn try_bump(store: &Path) -> Result<VersionMeta, DbError> {
    let mut meta = read_meta(store);
    meta.db_version += 1;
    meta.last_write_ts = parse_ts(&Local::now().format(TS_FORMAT).to_string());

    let bytes = serde_json::to_vec_pretty(&meta.to_value())?;
    atomic_write_bytes(&meta_path_for(store), &bytes)?;
    Ok(meta)
}

/// Increment the store version after a commit.
///
/// Must run while the write lock is held. A failed bump is logged and
/// reported as `None`; the commit itself stands.
pub fn bump_version(store: &Path) -> Option<VersionMeta> {
    match try_bump(store) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(store = %store.display(), "Failed to bump store version: {}", e);
            None
        }
    }
}

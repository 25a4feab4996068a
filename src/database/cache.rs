use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::Table;

struct CachedTable {
    table: Table,
    loaded_at: Instant,
    version: u64,
}

/// Per-table read cache.
///
/// An entry is served only while it is younger than the TTL and the store
/// version still matches the one seen when it was loaded.
pub struct TableCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedTable>>,
}

impl TableCache {
    pub fn new(ttl: Duration) -> Self {
        TableCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str, version: u64) -> Option<Table> {
        let entries = self.entries.lock().ok()?;
        let entry = entries.get(name)?;
        (entry.version == version && entry.loaded_at.elapsed() < self.ttl).then(|| entry.table.clone())
    }

    pub fn put(&self, name: &str, version: u64, table: &Table) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                name.to_string(),
                CachedTable {
                    table: table.clone(),
                    loaded_at: Instant::now(),
                    version,
                },
            );
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec!["UO".into()])
    }

    #[test]
    fn test_hit_requires_matching_version() {
        let cache = TableCache::new(Duration::from_secs(60));
        cache.put("tbl_UO", 3, &table());

        assert!(cache.get("tbl_UO", 3).is_some());
        assert!(cache.get("tbl_UO", 4).is_none());
        assert!(cache.get("Personale", 3).is_none());
    }

    #[test]
    fn test_entries_expire_and_can_be_cleared() {
        let cache = TableCache::new(Duration::from_millis(20));
        cache.put("tbl_UO", 1, &table());
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("tbl_UO", 1).is_none());

        cache.put("tbl_UO", 1, &table());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let cache = TableCache::new(Duration::ZERO);
        cache.put("tbl_UO", 1, &table());
        assert!(cache.is_empty());
    }
}

//! Durable key/value tier backed by a single JSON file per namespace.
//!
//! Values are opaque strings: serialized [`CacheEntry`](super::CacheEntry)
//! blobs for the response cache, integer strings for usage counters. The
//! file holds one flat JSON object and is rewritten atomically (tmp file +
//! rename) on every mutation.
//!
//! Failure policy: a write that cannot reach disk is logged and otherwise
//! ignored — the in-memory view stays authoritative for this process's
//! lifetime. A file that cannot be parsed is logged, removed, and treated
//! as empty.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

/// String-keyed durable store, mirrored in memory and persisted as JSON.
pub struct DiskStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl DiskStore {
    /// Open (or create) the store at `path`, loading any existing entries.
    pub fn open(path: PathBuf) -> Self {
        let entries = load(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("disk store poisoned")
            .get(key)
            .cloned()
    }

    /// Write a value and persist. Persistence failure is logged, not raised.
    pub fn insert(&self, key: &str, value: String) {
        let mut entries = self.entries.lock().expect("disk store poisoned");
        entries.insert(key.to_string(), value);
        self.flush(&entries);
    }

    /// Remove a value and persist. No-op for absent keys.
    pub fn remove(&self, key: &str) {
        let mut entries = self.entries.lock().expect("disk store poisoned");
        if entries.remove(key).is_some() {
            self.flush(&entries);
        }
    }

    /// Keep only entries for which `keep` returns true. Persists when
    /// anything was dropped, and returns the number of dropped entries.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str, &str) -> bool,
    {
        let mut entries = self.entries.lock().expect("disk store poisoned");
        let before = entries.len();
        entries.retain(|k, v| keep(k, v));
        let dropped = before - entries.len();
        if dropped > 0 {
            self.flush(&entries);
        }
        dropped
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("disk store poisoned").len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomic write via tmp + rename. Write failures are logged and
    /// swallowed; the caller's in-memory state is already updated.
    fn flush(&self, entries: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "failed to create store dir");
                return;
            }
        }
        let json = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to serialize store");
                return;
            }
        };
        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(e) = std::fs::write(&tmp_path, &json) {
            warn!(path = %tmp_path.display(), error = %e, "failed to write store file");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to rename store file");
        }
    }
}

/// Load entries from disk. Missing file → empty; corrupt file → warn,
/// remove, empty.
fn load(path: &PathBuf) -> HashMap<String, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read store file");
            return HashMap::new();
        }
    };
    match serde_json::from_str(&content) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt store file, discarding");
            let _ = std::fs::remove_file(path);
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> DiskStore {
        DiskStore::open(dir.path().join("test.json"))
    }

    #[test]
    fn insert_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.insert("k", "v".to_string());
        assert_eq!(store.get("k"), Some("v".to_string()));
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");

        DiskStore::open(path.clone()).insert("k", "v".to_string());

        let reopened = DiskStore::open(path);
        assert_eq!(reopened.get("k"), Some("v".to_string()));
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");

        let store = DiskStore::open(path.clone());
        store.insert("k", "v".to_string());
        store.remove("k");

        assert!(DiskStore::open(path).is_empty());
    }

    #[test]
    fn corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.json");
        std::fs::write(&path, "this is not valid json").unwrap();

        let store = DiskStore::open(path.clone());
        assert!(store.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn retain_drops_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.insert("keep", "1".to_string());
        store.insert("drop", "2".to_string());

        let dropped = store.retain(|k, _| k == "keep");
        assert_eq!(dropped, 1);
        assert_eq!(store.get("keep"), Some("1".to_string()));
        assert_eq!(store.get("drop"), None);
    }
}

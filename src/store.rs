//! Key/value settings storage.
//!
//! Every record (the profile registry, each profile, the per-user UI state)
//! is stored whole under a single key. Reads and writes go through one serde
//! mapping per record type via [`load_record`] and [`save_record`]; there is
//! no per-field access.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// A backing store for whole settings records.
///
/// Writes replace the full record (last writer wins). Implementations must
/// never let a reader observe a half-written record.
pub trait SettingsStore: Send + Sync {
    /// Read the record stored under `key`, or `None` if it was never written.
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>>;
    /// Replace the record stored under `key`.
    fn write(&self, key: &str, value: &serde_json::Value) -> Result<()>;
    /// Remove the record stored under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Load a typed record, falling back to `T::default()` if the key is unset.
pub fn load_record<T>(store: &dyn SettingsStore, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match store.read(key)? {
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("Failed to decode settings record '{key}'")),
        None => Ok(T::default()),
    }
}

/// Serialize and write a typed record.
pub fn save_record<T: Serialize>(store: &dyn SettingsStore, key: &str, record: &T) -> Result<()> {
    let value = serde_json::to_value(record)
        .with_context(|| format!("Failed to encode settings record '{key}'"))?;
    store.write(key, &value)
}

/// A store keeping one pretty-printed JSON file per key under a root directory.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create settings directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", escape_key(key)))
    }
}

impl SettingsStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(value))
    }

    fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.path_for(key);
        let contents = serde_json::to_string_pretty(value).context("Failed to serialize record")?;
        write_atomic(&path, contents.as_bytes())?;
        log::debug!("Stored '{key}' at {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("Removed '{key}'");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// Write `bytes` to a uniquely named temp file beside `path`, then rename it
/// over `path`. Concurrent writers never share a temp file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {}", parent.display()))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to flush {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

/// Map an arbitrary key onto a portable file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`. The mapping is injective, so distinct profile names never collide.
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// An in-process store, for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SettingsStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("settings store lock poisoned"))?;
        Ok(records.get(key).cloned())
    }

    fn write(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("settings store lock poisoned"))?;
        records.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("settings store lock poisoned"))?;
        records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: Option<u32>,
    }

    // ── escape_key ───────────────────────────────────────────────────

    #[test]
    fn escape_key_passthrough() {
        assert_eq!(escape_key("phototag_ai_list"), "phototag_ai_list");
    }

    #[test]
    fn escape_key_special_chars() {
        assert_eq!(escape_key("phototag_ai/My Set"), "phototag_ai%2FMy%20Set");
        assert_ne!(escape_key("a/b"), escape_key("a%2Fb"));
    }

    // ── JsonFileStore ────────────────────────────────────────────────

    #[test]
    fn file_store_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(store.read("nothing").unwrap().is_none());
    }

    #[test]
    fn file_store_write_read_remove() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested")).unwrap();

        store.write("k", &json!({"a": 1})).unwrap();
        assert_eq!(store.read("k").unwrap(), Some(json!({"a": 1})));

        store.write("k", &json!({"a": 2})).unwrap();
        assert_eq!(store.read("k").unwrap(), Some(json!({"a": 2})));

        store.remove("k").unwrap();
        assert!(store.read("k").unwrap().is_none());
        // Removing twice is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn file_store_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.write("k", &json!([1, 2, 3])).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    #[test]
    fn file_store_concurrent_writers_never_expose_partial_records() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
        store.write("k", &json!({"writer": 0, "pad": "x".repeat(4096)})).unwrap();

        let writers: Vec<_> = (1..=4)
            .map(|id| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .write("k", &json!({"writer": id, "pad": "x".repeat(4096)}))
                            .unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let value = store.read("k").unwrap().unwrap();
                    assert_eq!(value["pad"].as_str().unwrap().len(), 4096);
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    // ── typed records ────────────────────────────────────────────────

    #[test]
    fn load_record_defaults_when_unset() {
        let store = MemoryStore::new();
        let sample: Sample = load_record(&store, "s").unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn save_then_load_record() {
        let store = MemoryStore::new();
        let sample = Sample {
            name: "x".into(),
            count: Some(3),
        };
        save_record(&store, "s", &sample).unwrap();
        let loaded: Sample = load_record(&store, "s").unwrap();
        assert_eq!(loaded, sample);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn load_record_rejects_wrong_shape() {
        let store = MemoryStore::new();
        store.write("s", &json!({"name": 5})).unwrap();
        assert!(load_record::<Sample>(&store, "s").is_err());
    }
}

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// String key-value persistence shared by the filter snapshot and the session
/// credential.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// The current listing location, expressed as a query string.
pub trait Location: Send + Sync {
    fn query(&self) -> Result<String>;
    fn replace_query(&self, query: &str) -> Result<()>;
}

// --- File-backed implementations ---

/// One JSON object on disk; every call re-reads the file so separate
/// invocations of the CLI observe each other's writes.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "storage file is not a JSON object, starting fresh");
                Ok(Map::new())
            }
        }
    }

    fn save(&self, map: &Map<String, Value>) -> Result<()> {
        let raw = serde_json::to_string_pretty(map)?;
        write_atomic(&self.path, &raw)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .load()?
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.load()?;
        map.insert(key.to_string(), Value::String(value.to_string()));
        self.save(&map)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }
}

pub struct FileLocation {
    path: PathBuf,
}

impl FileLocation {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(Self { path })
    }
}

impl Location for FileLocation {
    fn query(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        Ok(raw.trim().to_string())
    }

    fn replace_query(&self, query: &str) -> Result<()> {
        write_atomic(&self.path, query)
    }
}

/// Writes through a sibling temp file and renames it over `path`, so readers
/// see either the old contents or the new ones.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

// --- In-memory implementations ---

#[cfg(test)]
pub use memory::{MemoryLocation, MemoryStore};


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trips_between_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/storage.json");

        let first = FileStore::open(&path).unwrap();
        first.set("token", "abc").unwrap();
        first.set("filterState", "{\"order\":1}").unwrap();

        let second = FileStore::open(&path).unwrap();
        assert_eq!(second.get("token").unwrap().as_deref(), Some("abc"));
        second.remove("token").unwrap();

        assert_eq!(first.get("token").unwrap(), None);
        assert_eq!(
            first.get("filterState").unwrap().as_deref(),
            Some("{\"order\":1}")
        );
    }

    #[test]
    fn test_file_store_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("token").unwrap(), None);
        store.set("token", "t").unwrap();
        assert_eq!(store.get("token").unwrap().as_deref(), Some("t"));
    }

    #[test]
    fn test_file_store_replaces_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        let store = FileStore::open(&path).unwrap();
        store.set("token", "one").unwrap();
        store.set("token", "two").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("storage.json")]);

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["token"], "two");
    }

    #[test]
    fn test_file_location_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let location = FileLocation::open(dir.path().join("location")).unwrap();
        assert_eq!(location.query().unwrap(), "");
        location.replace_query("order=1&page=0").unwrap();
        assert_eq!(location.query().unwrap(), "order=1&page=0");
    }

    #[test]
    fn test_memory_location_counts_writes() {
        let location = MemoryLocation::new("page=2");
        assert_eq!(location.writes(), 0);
        location.replace_query("page=0").unwrap();
        assert_eq!(location.writes(), 1);
        assert_eq!(location.query().unwrap(), "page=0");
    }
}

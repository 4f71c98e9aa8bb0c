// Keyed stores for serialized sequence records

use super::PersistenceError;
use crate::sequencer::sequence::SequenceKey;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A keyed store of raw record text
pub trait SequenceStore {
    /// Read the record for `key`; `Ok(None)` when nothing was saved
    fn load(&self, key: &SequenceKey) -> Result<Option<String>, PersistenceError>;

    fn save(&mut self, key: &SequenceKey, data: &str) -> Result<(), PersistenceError>;

    /// Delete the record for `key`; deleting a missing record is not an error
    fn remove(&mut self, key: &SequenceKey) -> Result<(), PersistenceError>;
}

/// In-process store, lost when dropped
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: HashMap<SequenceKey, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SequenceStore for MemoryStore {
    fn load(&self, key: &SequenceKey) -> Result<Option<String>, PersistenceError> {
        Ok(self.records.get(key).cloned())
    }

    fn save(&mut self, key: &SequenceKey, data: &str) -> Result<(), PersistenceError> {
        self.records.insert(*key, data.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &SequenceKey) -> Result<(), PersistenceError> {
        self.records.remove(key);
        Ok(())
    }
}

/// One JSON file per sequence inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Use `root` as the record directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store records under the platform data directory
    pub fn in_data_dir() -> Result<Self, PersistenceError> {
        let root = dirs::data_dir()
            .ok_or(PersistenceError::NoDataDir)?
            .join("stepseq")
            .join("sequences");
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &SequenceKey) -> PathBuf {
        self.root
            .join(format!("seq_{}_{}.json", key.pattern, key.instrument))
    }
}

impl SequenceStore for FileStore {
    fn load(&self, key: &SequenceKey) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &SequenceKey, data: &str) -> Result<(), PersistenceError> {
        // Write then rename so a crash never leaves a half-written record
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &SequenceKey) -> Result<(), PersistenceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        let key = SequenceKey::new(1, 2);

        assert_eq!(store.load(&key).unwrap(), None);
        store.save(&key, "{}").unwrap();
        assert_eq!(store.load(&key).unwrap().as_deref(), Some("{}"));
        assert_eq!(store.len(), 1);

        store.remove(&key).unwrap();
        store.remove(&key).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("records")).unwrap();
        let key = SequenceKey::new(10, 20);
        let other = SequenceKey::new(102, 0);

        assert_eq!(store.load(&key).unwrap(), None);
        store.save(&key, "{\"length\":8}").unwrap();
        assert_eq!(
            store.load(&key).unwrap().as_deref(),
            Some("{\"length\":8}")
        );
        assert_eq!(store.load(&other).unwrap(), None);
        assert!(store.root().join("seq_10_20.json").exists());

        store.remove(&key).unwrap();
        assert_eq!(store.load(&key).unwrap(), None);
        store.remove(&key).unwrap();
    }
}

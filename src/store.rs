//! The `Store` contract and its concrete single-file JSON implementation.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::value::{ChangeSet, State, Value};

/// The external collaborator the engine applies and reverses change-sets
/// against. Implementations own their own persistence.
pub trait Store {
    /// Current value for `key`, or `None` if absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// Apply a change-set forward: for each `(key, (old, new))`, verify the
    /// current value equals `old`, then set it to `new`. Persists on
    /// success. Fails with `Error::StoreOutOfSync` on the first mismatch,
    /// leaving already-applied keys changed (the caller is responsible for
    /// calling `rollback` to undo the partial effect).
    fn apply(&mut self, changes: &ChangeSet) -> Result<()>;

    /// Reverse a change-set: for each `(key, (old, new))`, if the current
    /// value equals `new`, set it back to `old`; if it already equals
    /// `old`, leave it alone (already rolled back). Fails with
    /// `Error::StoreOutOfSync` if the current value matches neither.
    fn rollback(&mut self, changes: &ChangeSet) -> Result<()>;
}

/// A store backed by a single JSON-serialized mapping file, rewritten
/// atomically (write to a sibling temp file, then rename over the target).
pub struct FileStore {
    path: PathBuf,
    state: State,
}

impl FileStore {
    /// Open (or create, if absent) a store file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<FileStore> {
        let path = path.into();
        let state = if path.exists() {
            let file = File::open(&path)?;
            serde_json::from_reader(file)?
        } else {
            State::new()
        };
        Ok(FileStore { path, state })
    }

    fn save(&self) -> Result<()> {
        let temp_path = temp_path_for(&self.path);
        let file = File::create(&temp_path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.state)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn mismatch(key: &str, expected: &Value, found: Option<&Value>) -> Error {
        Error::StoreOutOfSync(format!(
            "key '{}': expected {}, found {}",
            key,
            expected,
            found.map(|v| v.to_string()).unwrap_or_else(|| "<absent>".to_string()),
        ))
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        // A key holding `Value::Null` reads the same as an absent key, so
        // `apply`/`rollback`'s own absent-key sentinel round-trips through
        // `get` without ever observing `Some(Value::Null)`.
        match self.state.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        for (key, (old, new)) in changes {
            let current = self.state.get(key);
            // A never-set key reads as `Value::Null` on both sides: `Transaction`
            // captures `old` the same way when a key is first touched.
            if current.unwrap_or(&Value::Null) != old {
                return Err(Self::mismatch(key, old, current));
            }
            self.state.insert(key.clone(), new.clone());
        }
        self.save()
    }

    fn rollback(&mut self, changes: &ChangeSet) -> Result<()> {
        for (key, (old, new)) in changes {
            let current = self.state.get(key);
            if current.unwrap_or(&Value::Null) == new {
                self.state.insert(key.clone(), old.clone());
            } else if current.unwrap_or(&Value::Null) != old {
                return Err(Self::mismatch(key, new, current));
            }
        }
        self.save()
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn change(old: Value, new: Value) -> (Value, Value) {
        (old, new)
    }

    #[test]
    fn apply_persists_and_is_visible_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");

        let mut store = FileStore::open(&path).unwrap();
        let mut changes = ChangeSet::new();
        changes.insert("foo".to_string(), change(Value::Null, Value::from("A")));
        store.apply(&changes).unwrap();
        assert_eq!(store.get("foo"), Some(Value::from("A")));

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("foo"), Some(Value::from("A")));
    }

    #[test]
    fn apply_rejects_mismatched_old_value() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("store")).unwrap();
        let mut changes = ChangeSet::new();
        changes.insert(
            "foo".to_string(),
            change(Value::from("wrong-old"), Value::from("A")),
        );
        let err = store.apply(&changes).unwrap_err();
        assert!(matches!(err, Error::StoreOutOfSync(_)));
    }

    #[test]
    fn rollback_swaps_new_back_to_old() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("store")).unwrap();
        let mut changes = ChangeSet::new();
        changes.insert("foo".to_string(), change(Value::Null, Value::from("A")));
        store.apply(&changes).unwrap();

        store.rollback(&changes).unwrap();
        assert_eq!(store.get("foo"), None);
    }

    #[test]
    fn rollback_is_idempotent_when_already_reverted() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("store")).unwrap();
        let mut changes = ChangeSet::new();
        changes.insert("foo".to_string(), change(Value::Null, Value::from("A")));
        store.apply(&changes).unwrap();
        store.rollback(&changes).unwrap();

        // Rolling back again, from the already-old state, is a no-op.
        store.rollback(&changes).unwrap();
        assert_eq!(store.get("foo"), None);
    }
}

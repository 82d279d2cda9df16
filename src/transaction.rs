//! A transaction collects one action's intended changes before the engine
//! commits them in a single two-phase write.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::value::{ChangeSet, State, Value};

/// Builder handed to a transaction body. The body calls `set_store` and
/// `set_state` to describe the action; the engine reads back `changes` and
/// `new_state` once the body returns.
pub struct Transaction<'s, S: Store> {
    store: &'s S,
    changes: ChangeSet,
    new_state: State,
}

impl<'s, S: Store> Transaction<'s, S> {
    pub(crate) fn new(store: &'s S, state: State) -> Self {
        Transaction {
            store,
            changes: ChangeSet::new(),
            new_state: state,
        }
    }

    /// Record an intended store mutation. The *old* value is taken from the
    /// store the first time `key` is touched in this transaction; repeated
    /// writes to the same key collapse into one `(old, last_new)` pair.
    pub fn set_store(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let old = match self.changes.get(&key) {
            Some((old, _)) => old.clone(),
            None => self.store.get(&key).unwrap_or(Value::Null),
        };
        self.changes.insert(key, (old, value));
    }

    /// Overlay an engine-state change. Does not touch the store.
    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.new_state.insert(key.into(), value);
    }

    /// Signal that this action should be abandoned: the engine writes
    /// nothing to the log or the store. Returns the distinguished
    /// cancellation error so the body can propagate it with `?`.
    pub fn cancel(&self) -> Error {
        Error::Cancelled
    }

    pub(crate) fn into_parts(self) -> (ChangeSet, State) {
        (self.changes, self.new_state)
    }
}

/// A transaction body: stages changes on `txn`, returning `Ok(())` to
/// commit or `Err(txn.cancel())` (or any other error) to abandon.
pub type TxnBody<'a, S> = dyn FnOnce(&mut Transaction<S>) -> Result<()> + 'a;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use tempfile::tempdir;

    #[test]
    fn repeated_writes_to_same_key_collapse_to_one_change() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store")).unwrap();
        let mut txn = Transaction::new(&store, State::new());

        txn.set_store("k", Value::from(1));
        txn.set_store("k", Value::from(2));
        txn.set_store("k", Value::from(3));

        let (changes, _) = txn.into_parts();
        assert_eq!(changes.len(), 1);
        let (old, new) = &changes["k"];
        assert_eq!(*old, Value::Null);
        assert_eq!(*new, Value::from(3));
    }

    #[test]
    fn old_value_is_read_from_store_on_first_touch() {
        let dir = tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("store")).unwrap();
        let mut seed = ChangeSet::new();
        seed.insert("k".to_string(), (Value::Null, Value::from("seed")));
        store.apply(&seed).unwrap();

        let mut txn = Transaction::new(&store, State::new());
        txn.set_store("k", Value::from("updated"));
        let (changes, _) = txn.into_parts();
        assert_eq!(changes["k"], (Value::from("seed"), Value::from("updated")));
    }

    #[test]
    fn cancel_returns_cancelled_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store")).unwrap();
        let txn = Transaction::new(&store, State::new());
        assert!(matches!(txn.cancel(), Error::Cancelled));
    }
}

//! An in-memory walkthrough of the engine, exercised by the `example` CLI
//! command. `MemLog`/`MemStore` are scratch collaborators — a `Vec` and a
//! `BTreeMap` — good enough to demonstrate `do`/`undo`/`redo`/`compact`
//! without touching the filesystem.

use crate::engine::OpLog;
use crate::error::Result;
use crate::wal::Log;
use crate::record::Operation;
use crate::store::Store;
use crate::value::{ChangeSet, Idx, State, Value};

struct MemLog {
    entries: Vec<Operation>,
}

impl MemLog {
    fn new() -> Self {
        MemLog { entries: Vec::new() }
    }
}

impl Log for MemLog {
    fn append(&mut self, op: &Operation) -> Result<Idx> {
        let idx = self.entries.len() as Idx;
        self.entries.push(op.clone());
        Ok(idx)
    }

    fn get(&self, idx: Idx) -> Result<Operation> {
        Ok(self.entries[idx as usize].clone())
    }

    fn top(&self) -> Result<(Idx, Operation)> {
        let idx = (self.entries.len() - 1) as Idx;
        Ok((idx, self.entries[idx as usize].clone()))
    }

    fn next_idx(&self) -> Result<Idx> {
        Ok(self.entries.len() as Idx)
    }

    fn entries(&self) -> Result<Vec<(Idx, Operation)>> {
        Ok(self
            .entries
            .iter()
            .enumerate()
            .map(|(i, op)| (i as Idx, op.clone()))
            .collect())
    }
}

struct MemStore {
    state: State,
}

impl MemStore {
    fn new() -> Self {
        MemStore { state: State::new() }
    }
}

impl Store for MemStore {
    fn get(&self, key: &str) -> Option<Value> {
        match self.state.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn apply(&mut self, changes: &ChangeSet) -> Result<()> {
        for (key, (old, new)) in changes {
            let current = self.state.get(key);
            if current.unwrap_or(&Value::Null) != old {
                return Err(crate::error::Error::StoreOutOfSync(key.clone()));
            }
            self.state.insert(key.clone(), new.clone());
        }
        Ok(())
    }

    fn rollback(&mut self, changes: &ChangeSet) -> Result<()> {
        for (key, (old, new)) in changes {
            let current = self.state.get(key);
            if current.unwrap_or(&Value::Null) == new {
                self.state.insert(key.clone(), old.clone());
            } else if current.unwrap_or(&Value::Null) != old {
                return Err(crate::error::Error::StoreOutOfSync(key.clone()));
            }
        }
        Ok(())
    }
}

/// Runs a short do/undo/redo/compact walkthrough against in-memory
/// collaborators and prints each step, mirroring the shape of a
/// first-run demo.
pub fn run() {
    let log = MemLog::new();
    let store = MemStore::new();
    let mut engine = OpLog::init(log, store, State::new()).expect("init never fails in memory");

    engine
        .do_action("A", "t0", |txn| {
            txn.set_store("foo", Value::from("A"));
            Ok(())
        })
        .expect("do A");
    engine
        .do_action("B", "t1", |txn| {
            txn.set_store("bar", Value::from("B"));
            Ok(())
        })
        .expect("do B");
    engine
        .do_action("C", "t2", |txn| {
            txn.set_store("foo", Value::from("C"));
            Ok(())
        })
        .expect("do C");

    println!("changes so far:");
    for (description, date, _) in engine.linear_history().expect("linear history") {
        println!("  {} {}", date, description);
    }

    engine.undo("t3").expect("undo C");
    println!("after undo, redoable:");
    for (i, (date, description)) in engine.redos().expect("redos").into_iter().enumerate() {
        println!("  {} {} {}", i, date, description);
    }

    engine.redo(-1, "t4").expect("redo C");
    println!("foo = {:?}", engine.store().get("foo"));

    let new_log = MemLog::new();
    engine.compact(new_log, "t5").expect("compact");
    println!("after compact, linear history:");
    for (description, date, _) in engine.linear_history().expect("linear history") {
        println!("  {} {}", date, description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_store_apply_and_rollback_round_trip() {
        let mut store = MemStore::new();
        let mut changes = ChangeSet::new();
        changes.insert("k".to_string(), (Value::Null, Value::from(1)));
        store.apply(&changes).unwrap();
        assert_eq!(store.get("k"), Some(Value::from(1)));
        store.rollback(&changes).unwrap();
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn mem_log_append_and_top() {
        let mut log = MemLog::new();
        log.append(&Operation::init()).unwrap();
        let (idx, op) = log.top().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(op.kind, crate::record::OpKind::CommitInit);
    }

    #[test]
    fn run_does_not_panic() {
        run();
    }
}

//! Shared type aliases for the opaque values the engine carries.
//!
//! The engine never interprets user data; it only stores, copies, and swaps
//! it. `serde_json::Value` is used directly as that opaque payload rather
//! than inventing a typed value enum, since every value just round-trips
//! through the log and the store's JSON file.

use std::collections::BTreeMap;

/// An opaque value. The engine reads and writes these but never inspects
/// their contents.
pub type Value = serde_json::Value;

/// Log index: an opaque, monotonically increasing identifier minted by a
/// `Log` implementation. The concrete file-backed log uses byte offsets.
pub type Idx = u64;

/// A single action's store mutations: `key -> (old, new)`. Undo swaps each
/// pair; redo reuses it verbatim. `BTreeMap` keeps iteration order
/// deterministic, which matters for serialized byte-stability and for
/// tests that assert on serialized output.
pub type ChangeSet = BTreeMap<String, (Value, Value)>;

/// Engine-owned world state carried on every record, distinct from the
/// external store. Also `BTreeMap`-backed for the same determinism reason.
pub type State = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_set_iterates_in_key_order() {
        let mut changes: ChangeSet = ChangeSet::new();
        changes.insert("b".to_string(), (Value::Null, Value::from(1)));
        changes.insert("a".to_string(), (Value::Null, Value::from(2)));
        let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}

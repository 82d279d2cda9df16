//! The uniform record type written to the log.
//!
//! Every record is one `Operation`. `kind` distinguishes the eleven record
//! shapes described in the data model; fields that don't apply to a given
//! kind are simply left at their default (`None`/empty).

use serde::{Deserialize, Serialize};

use crate::value::{ChangeSet, Idx, State};

/// The kind of a log record. Serialized in kebab-case to match the on-disk
/// vocabulary (`commit-do`, `prepare-undo`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpKind {
    CommitInit,
    PrepareDo,
    CommitDo,
    RollbackDo,
    PrepareUndo,
    CommitUndo,
    RollbackUndo,
    PrepareRedo,
    CommitRedo,
    RollbackRedo,
    CommitClose,
}

impl OpKind {
    /// True for the three `prepare-*` kinds: a log whose tip has one of
    /// these needs recovery before any new action can be appended.
    pub fn is_prepare(self) -> bool {
        matches!(
            self,
            OpKind::PrepareDo | OpKind::PrepareUndo | OpKind::PrepareRedo
        )
    }

    /// The matching `rollback-*` kind for a `prepare-*` kind.
    pub fn rollback_kind(self) -> OpKind {
        match self {
            OpKind::PrepareDo => OpKind::RollbackDo,
            OpKind::PrepareUndo => OpKind::RollbackUndo,
            OpKind::PrepareRedo => OpKind::RollbackRedo,
            other => other,
        }
    }

    /// The matching `commit-*` kind for a `prepare-*` kind.
    pub fn commit_kind(self) -> OpKind {
        match self {
            OpKind::PrepareDo => OpKind::CommitDo,
            OpKind::PrepareUndo => OpKind::CommitUndo,
            OpKind::PrepareRedo => OpKind::CommitRedo,
            other => other,
        }
    }
}

/// A single log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: String,

    /// Position in the linear history. 0 at the initial record.
    pub n: u64,
    /// Index of the linear predecessor (the record this tip impersonates
    /// or extends). `None` only at the initial record.
    #[serde(default)]
    pub prev_idx: Option<Idx>,
    /// Index of the original `commit-do` that introduced this action.
    /// 0 at the initial record.
    #[serde(default)]
    pub linear_idx: Idx,

    /// Engine-owned state as of this record.
    #[serde(default)]
    pub state: State,
    /// Actions undone at this tip and still redoable:
    /// `(original commit-do index, last undo/redo tip index)`.
    #[serde(default)]
    pub redos: Vec<(Idx, Idx)>,

    /// Present only on `prepare-*` records: the change-set to apply.
    #[serde(default)]
    pub changes: Option<ChangeSet>,
    /// Present only on `commit-*`/`rollback-*` records: the index of the
    /// matching `prepare-*`.
    #[serde(default)]
    pub prepare_idx: Option<Idx>,

    /// Present only on `prepare-*` records: the index of the tip that was
    /// actually on top of the log when this action began. For `prepare-do`
    /// this is the same value as `prev_idx`, but for `prepare-undo`/
    /// `prepare-redo` it is *not* — those impersonate an ancestor's
    /// `prev_idx` for the linear-history walk, so recovery needs a
    /// separate, un-impersonated pointer back to the record it must
    /// restore as tip (invariant I7).
    #[serde(default)]
    pub started_from: Option<Idx>,
}

impl Operation {
    /// The initial record every log begins with (invariant I1).
    pub fn init() -> Operation {
        Operation {
            kind: OpKind::CommitInit,
            description: "init".to_string(),
            date: String::new(),
            n: 0,
            prev_idx: None,
            linear_idx: 0,
            state: State::new(),
            redos: Vec::new(),
            changes: None,
            prepare_idx: None,
            started_from: None,
        }
    }

    /// Clone this record's linear-position fields (n, linear_idx, prev_idx,
    /// state) into a fresh record of `kind` — the "impersonation" pattern
    /// used by `commit-undo` and every `rollback-*` record.
    pub fn impersonate(&self, kind: OpKind, description: impl Into<String>, date: impl Into<String>) -> Operation {
        Operation {
            kind,
            description: description.into(),
            date: date.into(),
            n: self.n,
            prev_idx: self.prev_idx,
            linear_idx: self.linear_idx,
            state: self.state.clone(),
            redos: self.redos.clone(),
            changes: None,
            prepare_idx: None,
            started_from: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_record_satisfies_invariant_i1() {
        let init = Operation::init();
        assert_eq!(init.kind, OpKind::CommitInit);
        assert_eq!(init.n, 0);
        assert_eq!(init.linear_idx, 0);
        assert_eq!(init.prev_idx, None);
        assert!(init.redos.is_empty());
    }

    #[test]
    fn impersonate_clones_linear_fields_not_kind() {
        let mut top = Operation::init();
        top.n = 3;
        top.linear_idx = 42;
        top.prev_idx = Some(41);
        top.redos.push((1, 2));

        let clone = top.impersonate(OpKind::RollbackUndo, "undo B", "2024-01-01");
        assert_eq!(clone.kind, OpKind::RollbackUndo);
        assert_eq!(clone.n, 3);
        assert_eq!(clone.linear_idx, 42);
        assert_eq!(clone.prev_idx, Some(41));
        assert_eq!(clone.redos, vec![(1, 2)]);
        assert!(clone.changes.is_none());
    }

    #[test]
    fn kind_round_trips_kebab_case_json() {
        let json = serde_json::to_string(&OpKind::PrepareUndo).unwrap();
        assert_eq!(json, "\"prepare-undo\"");
        let back: OpKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OpKind::PrepareUndo);
    }

    #[test]
    fn is_prepare_classifies_correctly() {
        assert!(OpKind::PrepareDo.is_prepare());
        assert!(OpKind::PrepareUndo.is_prepare());
        assert!(OpKind::PrepareRedo.is_prepare());
        assert!(!OpKind::CommitDo.is_prepare());
        assert!(!OpKind::CommitClose.is_prepare());
    }
}

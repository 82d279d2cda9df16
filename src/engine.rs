//! The undo/redo engine: orchestrates two-phase writes against a `Log` and
//! a `Store`, and the `undo`/`redo`/`recover`/`compact` algorithms that
//! operate on the linear history those writes build up.

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::wal::Log;
use crate::record::{Operation, OpKind};
use crate::store::Store;
use crate::transaction::Transaction;
use crate::value::{ChangeSet, Idx, State};

/// One entry in `linear_history`: the action's description, its original
/// timestamp, and the engine state as of that position in the current tip.
pub type HistoryEntry = (String, String, State);

/// Orchestrates a `Log` and a `Store` under the two-phase prepare/commit
/// discipline described by the data model.
pub struct OpLog<L: Log, S: Store> {
    log: L,
    store: S,
}

impl<L: Log, S: Store> OpLog<L, S> {
    /// Open an engine over an existing log/store pair, writing the initial
    /// `commit-init` record (carrying `initial_state`) if the log is
    /// empty. Opening an already-initialized log ignores `initial_state`.
    pub fn init(mut log: L, store: S, initial_state: State) -> Result<OpLog<L, S>> {
        if log.next_idx()? == 0 {
            let mut init = Operation::init();
            init.state = initial_state;
            log.append(&init)?;
            info!("initialized new log");
        }
        Ok(OpLog { log, store })
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Engine-owned state as of the current tip.
    pub fn state(&self) -> Result<State> {
        Ok(self.log.top()?.1.state)
    }

    /// Run `recover` if the tip is mid-prepare; otherwise a no-op. Safe to
    /// call unconditionally on every startup.
    pub fn recover(&mut self, date: impl Into<String>) -> Result<()> {
        let date = date.into();
        let (top_idx, top) = self.log.top()?;
        if !top.kind.is_prepare() {
            debug!("recover: tip already settled, nothing to do");
            return Ok(());
        }
        info!("recovering from crash mid-{:?}", top.kind);

        // `started_from`, not `prev_idx`: `prev_idx` on a `prepare-undo`/
        // `prepare-redo` is impersonated from an ancestor for the linear
        // walk and does not point at the tip this action actually started
        // from (see `Operation::started_from`).
        let started_from = top
            .started_from
            .ok_or_else(|| Error::Corruption("prepare record missing started_from".to_string()))?;
        let prev = self.log.get(started_from)?;

        if let Some(changes) = &top.changes {
            // Best-effort: the store may never have moved if the crash
            // landed before `apply` ran.
            let _ = self.store.rollback(changes);
        }

        let mut rollback = prev.impersonate(
            top.kind.rollback_kind(),
            format!("recover {}", top.description),
            date,
        );
        rollback.prepare_idx = Some(top_idx);
        self.log.append(&rollback)?;
        info!("recovery complete, tip rolled back");
        Ok(())
    }

    /// Run a transaction body and record its effect as a new action.
    /// Returns `Ok(None)` if the body cancelled; the index of the new
    /// `commit-do` on success.
    pub fn do_action(
        &mut self,
        description: impl Into<String>,
        date: impl Into<String>,
        body: impl FnOnce(&mut Transaction<S>) -> Result<()>,
    ) -> Result<Option<Idx>> {
        let description = description.into();
        let date = date.into();
        let (top_idx, top) = self.log.top()?;
        if top.kind == OpKind::CommitClose {
            return Err(Error::UserError(
                "log is sealed; cannot record new actions".to_string(),
            ));
        }

        let mut txn = Transaction::new(&self.store, top.state.clone());
        match body(&mut txn) {
            Ok(()) => {}
            Err(Error::Cancelled) => {
                debug!("do '{}' cancelled", description);
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        let (changes, state) = txn.into_parts();

        let prepare = Operation {
            kind: OpKind::PrepareDo,
            description: description.clone(),
            date: date.clone(),
            n: top.n + 1,
            prev_idx: Some(top_idx),
            linear_idx: 0,
            state: state.clone(),
            redos: Vec::new(),
            changes: Some(changes.clone()),
            prepare_idx: None,
            started_from: Some(top_idx),
        };
        let prepare_idx = self.log.append(&prepare)?;

        let commit_idx = self.log.next_idx()?;
        let commit = Operation {
            kind: OpKind::CommitDo,
            description: description.clone(),
            date: date.clone(),
            n: top.n + 1,
            prev_idx: Some(top_idx),
            linear_idx: commit_idx,
            state,
            redos: Vec::new(),
            changes: None,
            prepare_idx: Some(prepare_idx),
            started_from: None,
        };

        match self.store.apply(&changes) {
            Ok(()) => {
                let idx = self.log.append(&commit)?;
                debug_assert_eq!(idx, commit_idx);
                debug!("do '{}' committed at {}", description, idx);
                Ok(Some(idx))
            }
            Err(e) => {
                let _ = self.store.rollback(&changes);
                let mut rollback = top.impersonate(OpKind::RollbackDo, description.clone(), date);
                rollback.prepare_idx = Some(prepare_idx);
                self.log.append(&rollback)?;
                warn!("do '{}' rolled back: {}", description, e);
                Err(e)
            }
        }
    }

    /// Reverse the most recent action in the linear history.
    pub fn undo(&mut self, date: impl Into<String>) -> Result<Idx> {
        let date = date.into();
        let (top_idx, top) = self.log.top()?;
        if top.kind == OpKind::CommitClose {
            return Err(Error::UserError("log is sealed; nothing to undo".to_string()));
        }
        if top.linear_idx == 0 {
            return Err(Error::UserError("nothing to undo".to_string()));
        }

        let to_undo = self.log.get(top.linear_idx)?;
        let prepare_idx = to_undo
            .prepare_idx
            .ok_or_else(|| Error::Corruption("commit-do missing prepare_idx".to_string()))?;
        let prepare = self.log.get(prepare_idx)?;
        let changes = prepare
            .changes
            .ok_or_else(|| Error::Corruption("prepare-do missing changes".to_string()))?;
        let undo_changes: ChangeSet = changes
            .into_iter()
            .map(|(k, (old, new))| (k, (new, old)))
            .collect();

        let prev_idx = top
            .prev_idx
            .ok_or_else(|| Error::Corruption("tip missing prev_idx".to_string()))?;
        let old_prev = self.log.get(prev_idx)?;

        // The tip impersonates `old_prev`'s linear position; its redo set
        // drops any stale entry for this same action and gains this undo.
        let mut new_redos: Vec<(Idx, Idx)> = old_prev
            .redos
            .iter()
            .cloned()
            .filter(|(linear, _)| *linear != top.linear_idx)
            .collect();
        new_redos.push((top.linear_idx, top_idx));

        let description = format!("undo {}", to_undo.description);
        let mut prepare_undo = old_prev.impersonate(OpKind::PrepareUndo, description.clone(), date.clone());
        prepare_undo.changes = Some(undo_changes.clone());
        prepare_undo.started_from = Some(top_idx);
        let prepare_undo_idx = self.log.append(&prepare_undo)?;

        let mut commit_undo = old_prev.impersonate(OpKind::CommitUndo, description.clone(), date.clone());
        commit_undo.redos = new_redos;
        commit_undo.prepare_idx = Some(prepare_undo_idx);

        match self.store.apply(&undo_changes) {
            Ok(()) => {
                let idx = self.log.append(&commit_undo)?;
                debug!("undo '{}' committed at {}", description, idx);
                Ok(idx)
            }
            Err(e) => {
                let _ = self.store.rollback(&undo_changes);
                let mut rollback_undo = top.impersonate(OpKind::RollbackUndo, description.clone(), date);
                rollback_undo.prepare_idx = Some(prepare_undo_idx);
                self.log.append(&rollback_undo)?;
                warn!("undo '{}' rolled back: {}", description, e);
                Err(e)
            }
        }
    }

    /// Reapply a previously undone action. `n` indexes `top.redos` with
    /// Python-style negative indexing; `-1` (the default a caller should
    /// pass) redoes the most recently undone action.
    pub fn redo(&mut self, n: i64, date: impl Into<String>) -> Result<Idx> {
        let date = date.into();
        let (top_idx, top) = self.log.top()?;
        if top.kind == OpKind::CommitClose {
            return Err(Error::UserError("log is sealed; nothing to redo".to_string()));
        }
        if top.redos.is_empty() {
            return Err(Error::UserError("nothing to redo".to_string()));
        }
        let len = top.redos.len() as i64;
        let index = if n < 0 { len + n } else { n };
        if index < 0 || index >= len {
            return Err(Error::UserError(format!(
                "redo index {} out of range (have {})",
                n, len
            )));
        }
        let (redo_linear_idx, redo_idx) = top.redos[index as usize];

        let redo_of = self.log.get(redo_linear_idx)?;
        let forward_prepare_idx = redo_of
            .prepare_idx
            .ok_or_else(|| Error::Corruption("commit-do missing prepare_idx".to_string()))?;
        let forward_prepare = self.log.get(forward_prepare_idx)?;
        let changes = forward_prepare
            .changes
            .ok_or_else(|| Error::Corruption("prepare-do missing changes".to_string()))?;
        let redo_entry = self.log.get(redo_idx)?;

        let description = format!("redo {}", redo_of.description);
        let prepare_redo = Operation {
            kind: OpKind::PrepareRedo,
            description: description.clone(),
            date: date.clone(),
            n: top.n + 1,
            prev_idx: Some(top_idx),
            linear_idx: redo_linear_idx,
            state: redo_entry.state.clone(),
            redos: Vec::new(),
            changes: Some(changes.clone()),
            prepare_idx: None,
            started_from: Some(top_idx),
        };
        let prepare_redo_idx = self.log.append(&prepare_redo)?;

        let commit_redo = Operation {
            kind: OpKind::CommitRedo,
            description: description.clone(),
            date: date.clone(),
            n: top.n + 1,
            prev_idx: Some(top_idx),
            linear_idx: redo_linear_idx,
            state: redo_entry.state,
            redos: redo_entry.redos,
            changes: None,
            prepare_idx: Some(prepare_redo_idx),
            started_from: None,
        };

        match self.store.apply(&changes) {
            Ok(()) => {
                let idx = self.log.append(&commit_redo)?;
                debug!("redo '{}' committed at {}", description, idx);
                Ok(idx)
            }
            Err(e) => {
                let _ = self.store.rollback(&changes);
                let mut rollback_redo = top.impersonate(OpKind::RollbackRedo, description.clone(), date);
                rollback_redo.prepare_idx = Some(prepare_redo_idx);
                self.log.append(&rollback_redo)?;
                warn!("redo '{}' rolled back: {}", description, e);
                Err(e)
            }
        }
    }

    /// The user-visible stack of committed actions reachable from the tip,
    /// oldest first.
    pub fn linear_history(&self) -> Result<Vec<HistoryEntry>> {
        let (_, tip) = self.log.top()?;
        let mut out = Vec::new();
        let mut cursor = tip;
        while cursor.linear_idx != 0 {
            let commit_do = self.log.get(cursor.linear_idx)?;
            out.push((commit_do.description, commit_do.date, cursor.state.clone()));
            let prev_idx = cursor
                .prev_idx
                .ok_or_else(|| Error::Corruption("linear entry missing prev_idx".to_string()))?;
            cursor = self.log.get(prev_idx)?;
        }
        out.reverse();
        Ok(out)
    }

    /// Every record ever written, in append order — unlike
    /// `linear_history`, this includes undo/redo/rollback noise. Intended
    /// for debugging and the CLI's `history` command.
    pub fn history(&self) -> Result<Vec<(Idx, Operation)>> {
        self.log.entries()
    }

    /// Actions undone at the current tip and still redoable, most
    /// recently undone first (matching `top.redos` order).
    pub fn redos(&self) -> Result<Vec<(String, String)>> {
        let (_, top) = self.log.top()?;
        let mut out = Vec::with_capacity(top.redos.len());
        for (linear_idx, last_idx) in &top.redos {
            let redo_of = self.log.get(*linear_idx)?;
            let last = self.log.get(*last_idx)?;
            out.push((last.date, redo_of.description));
        }
        Ok(out)
    }

    /// Rewrite the log to contain only the current linear history,
    /// discarding undo/redo capability for everything behind the tip, and
    /// seal the old log with a `commit-close` record. `new_log` must be a
    /// fresh, empty log the caller has prepared (e.g. at a temporary path
    /// to be renamed into place).
    pub fn compact(&mut self, mut new_log: L, date: impl Into<String>) -> Result<()> {
        let date = date.into();
        let (_, tip) = self.log.top()?;
        if tip.kind == OpKind::CommitClose {
            return Err(Error::UserError("log is already sealed".to_string()));
        }

        // Capture the tip's own linear position before walking backward —
        // the walk below reassigns `cursor`, never `tip`, precisely so this
        // snapshot can't be clobbered by the time we reach the close record.
        let tip_n = tip.n;
        let tip_state = tip.state.clone();

        let mut entries = Vec::with_capacity(tip_n as usize);
        let mut cursor = tip.clone();
        while cursor.linear_idx != 0 {
            entries.push(self.log.get(cursor.linear_idx)?);
            let prev_idx = cursor
                .prev_idx
                .ok_or_else(|| Error::Corruption("linear entry missing prev_idx".to_string()))?;
            cursor = self.log.get(prev_idx)?;
        }
        entries.reverse();

        new_log.append(&Operation::init())?;
        let mut prev_new_idx = 0u64;
        for (position, commit_do) in entries.into_iter().enumerate() {
            let new_n = (position + 1) as u64;
            let old_prepare_idx = commit_do
                .prepare_idx
                .ok_or_else(|| Error::Corruption("commit-do missing prepare_idx".to_string()))?;
            let old_prepare = self.log.get(old_prepare_idx)?;

            let mut fresh_prepare = old_prepare;
            fresh_prepare.kind = OpKind::PrepareDo;
            fresh_prepare.n = new_n;
            fresh_prepare.prev_idx = Some(prev_new_idx);
            fresh_prepare.redos = Vec::new();
            fresh_prepare.prepare_idx = None;
            fresh_prepare.started_from = Some(prev_new_idx);
            let fresh_prepare_idx = new_log.append(&fresh_prepare)?;

            let commit_new_idx = new_log.next_idx()?;
            let mut fresh_commit = commit_do;
            fresh_commit.n = new_n;
            fresh_commit.prev_idx = Some(prev_new_idx);
            fresh_commit.linear_idx = commit_new_idx;
            fresh_commit.redos = Vec::new();
            fresh_commit.prepare_idx = Some(fresh_prepare_idx);
            let appended = new_log.append(&fresh_commit)?;
            debug_assert_eq!(appended, commit_new_idx);
            prev_new_idx = appended;
        }

        let mut close = tip.impersonate(OpKind::CommitClose, "compact", date);
        close.n = tip_n;
        close.state = tip_state;
        self.log.append(&close)?;

        info!("compacted log: {} linear actions retained", tip_n);
        self.log = new_log;
        Ok(())
    }
}

//! Bounded snapshot undo/redo over scatter session state.
//!
//! Snapshots are full copies, not deltas; applying one rebuilds the preview
//! registry from scratch. The stack holds at most [`HISTORY_CAP`] entries;
//! pushing past the cap evicts the oldest entry and shifts the cursor.
use std::sync::Arc;

use crate::group::{GroupMeta, PreviewGroupRegistry, ScatterInstance};

/// Maximum retained snapshots.
pub const HISTORY_CAP: usize = 30;

/// Immutable copy of the full scatter session state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySnapshot {
    pub instances: Vec<ScatterInstance>,
    pub groups: Vec<GroupMeta>,
    pub session_active: bool,
}

impl HistorySnapshot {
    /// Captures the current registry state.
    pub fn capture(registry: &PreviewGroupRegistry, session_active: bool) -> Self {
        Self {
            instances: registry.snapshot_instances(),
            groups: registry.snapshot_meta(),
            session_active,
        }
    }

    /// Rebuilds the registry from this snapshot (no incremental
    /// reconciliation).
    pub fn apply(&self, registry: &mut PreviewGroupRegistry) {
        registry.rebuild_all(&self.groups, &self.instances);
    }
}

/// Linear undo/redo stack with a bounded capacity.
#[derive(Debug)]
pub struct ScatterHistory {
    snapshots: Vec<Arc<HistorySnapshot>>,
    /// Index of the current snapshot; `-1` means empty history.
    cursor: isize,
    dirty: bool,
}

impl Default for ScatterHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ScatterHistory {
    pub fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            cursor: -1,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    /// Flags that content changed since the last recorded snapshot.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Pushes a snapshot if content changed or `force` is set.
    ///
    /// Truncates any redoable entries beyond the cursor first (linear undo),
    /// then enforces the cap by evicting from the front. Returns whether a
    /// snapshot was pushed.
    pub fn record(&mut self, snapshot: HistorySnapshot, force: bool) -> bool {
        if !force && !self.dirty {
            return false;
        }
        self.snapshots.truncate((self.cursor + 1) as usize);
        self.snapshots.push(Arc::new(snapshot));
        if self.snapshots.len() > HISTORY_CAP {
            self.snapshots.remove(0);
        }
        self.cursor = self.snapshots.len() as isize - 1;
        self.dirty = false;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor >= 0 && self.cursor < self.snapshots.len() as isize - 1
    }

    pub fn undo(&mut self) -> Option<Arc<HistorySnapshot>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.current()
    }

    pub fn redo(&mut self) -> Option<Arc<HistorySnapshot>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.current()
    }

    pub fn current(&self) -> Option<Arc<HistorySnapshot>> {
        if self.cursor < 0 {
            return None;
        }
        self.snapshots.get(self.cursor as usize).cloned()
    }

    /// Clears the stack and seeds it with one baseline snapshot.
    pub fn reset_with_baseline(&mut self, baseline: HistorySnapshot) {
        self.snapshots.clear();
        self.snapshots.push(Arc::new(baseline));
        self.cursor = 0;
        self.dirty = false;
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = -1;
        self.dirty = false;
    }
}

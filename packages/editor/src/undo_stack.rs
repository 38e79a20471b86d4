//! # Undo/Redo History
//!
//! Two bounded stacks of [`Action`]s.
//!
//! ## Design
//!
//! - Recording pushes onto the undo stack and clears the redo stack
//! - Undo and redo are two-phase: callers peek the next action, apply its
//!   inverse elsewhere, and only then complete the move between stacks, so a
//!   failed write leaves both stacks untouched
//! - The undo stack drops its oldest entries past `max_levels`
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = History::new();
//! history.record(action);
//!
//! if let Some(next) = history.peek_undo().cloned() {
//!     let inverse = next.inverse_against(&snapshot);
//!     coordinator.apply(inverse.operation()).await?;
//!     history.complete_undo(&next, inverse);
//! }
//! ```

use crate::actions::Action;
use manuscript_tree::NodeId;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug)]
pub struct History {
    /// Applied actions (most recent last)
    undo_stack: Vec<Action>,

    /// Inverses of undone actions (most recent last)
    redo_stack: Vec<Action>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl History {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
        }
    }

    /// Record a completed edit.
    pub fn record(&mut self, action: Action) {
        self.push_undo(action);
        self.redo_stack.clear();
    }

    pub fn peek_undo(&self) -> Option<&Action> {
        self.undo_stack.last()
    }

    pub fn peek_redo(&self) -> Option<&Action> {
        self.redo_stack.last()
    }

    /// Move `undone` off the undo stack and park `inverse` for redo.
    ///
    /// Returns false when `undone` is no longer in history (cleared while
    /// its inverse was being written); nothing changes then. When a newer
    /// edit was recorded in the meantime the inverse is dropped.
    pub fn complete_undo(&mut self, undone: &Action, inverse: Action) -> bool {
        let Some(pos) = self.undo_stack.iter().rposition(|a| a == undone) else {
            return false;
        };
        let was_latest = pos + 1 == self.undo_stack.len();
        self.undo_stack.remove(pos);
        if was_latest {
            self.redo_stack.push(inverse);
        }
        true
    }

    /// Move `redone` off the redo stack and put `inverse` back on the undo stack.
    pub fn complete_redo(&mut self, redone: &Action, inverse: Action) -> bool {
        let Some(pos) = self.redo_stack.iter().rposition(|a| a == redone) else {
            return false;
        };
        self.redo_stack.remove(pos);
        self.push_undo(inverse);
        true
    }

    fn push_undo(&mut self, action: Action) {
        self.undo_stack.push(action);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            let excess = self.undo_stack.len() - self.max_levels;
            self.undo_stack.drain(..excess);
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Get description of the next undo operation
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|a| a.description.as_str())
    }

    /// Get description of the next redo operation
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|a| a.description.as_str())
    }

    /// Follow an id the store replaced through every recorded action.
    pub fn remap_id(&mut self, from: &NodeId, to: &NodeId) {
        for action in self.undo_stack.iter_mut().chain(self.redo_stack.iter_mut()) {
            action.remap_id(from, to);
        }
    }

    pub fn undo_actions(&self) -> &[Action] {
        &self.undo_stack
    }

    pub fn redo_actions(&self) -> &[Action] {
        &self.redo_stack
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manuscript_tree::NodeKind;
    use serde_json::json;

    fn edit(n: usize) -> Action {
        Action::field_update(
            NodeKind::Leaf,
            "l1".into(),
            "body",
            json!(format!("v{n}")),
            json!(format!("v{}", n + 1)),
        )
    }

    #[test]
    fn test_history_creation() {
        let history = History::new();
        assert_eq!(history.undo_levels(), 0);
        assert_eq!(history.redo_levels(), 0);
        assert_eq!(history.max_levels(), DEFAULT_HISTORY_LIMIT);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_then_redo_moves_between_stacks() {
        let mut history = History::new();
        history.record(edit(0));

        let next = history.peek_undo().cloned().unwrap();
        assert!(history.complete_undo(&next, next.inverse()));
        assert_eq!(history.undo_levels(), 0);
        assert_eq!(history.redo_levels(), 1);

        let redo = history.peek_redo().cloned().unwrap();
        assert!(history.complete_redo(&redo, redo.inverse()));
        assert_eq!(history.undo_levels(), 1);
        assert_eq!(history.redo_levels(), 0);
    }

    #[test]
    fn test_new_record_clears_redo() {
        let mut history = History::new();
        history.record(edit(0));
        let next = history.peek_undo().cloned().unwrap();
        history.complete_undo(&next, next.inverse());
        assert_eq!(history.redo_levels(), 1);

        history.record(edit(1));
        assert_eq!(history.redo_levels(), 0);
    }

    #[test]
    fn test_max_levels_enforced() {
        let mut history = History::with_max_levels(2);
        for i in 0..3 {
            history.record(edit(i));
        }

        assert_eq!(history.undo_levels(), 2);
        match &history.undo_actions()[0].kind {
            crate::actions::ActionKind::FieldUpdate { old_value, .. } => {
                assert_eq!(old_value, &json!("v1"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_complete_after_clear_is_noop() {
        let mut history = History::new();
        history.record(edit(0));
        let next = history.peek_undo().cloned().unwrap();
        history.clear();

        assert!(!history.complete_undo(&next, next.inverse()));
        assert_eq!(history.redo_levels(), 0);
    }

    #[test]
    fn test_complete_undo_after_newer_record_skips_redo() {
        let mut history = History::new();
        history.record(edit(0));
        let next = history.peek_undo().cloned().unwrap();

        // Another edit lands while the undo is still being written.
        history.record(edit(1));

        assert!(history.complete_undo(&next, next.inverse()));
        assert_eq!(history.undo_levels(), 1);
        assert_eq!(history.redo_levels(), 0);
        assert_eq!(history.peek_undo().unwrap().kind, edit(1).kind);
    }

    #[test]
    fn test_descriptions() {
        let mut history = History::new();
        assert_eq!(history.undo_description(), None);
        history.record(edit(0));
        assert_eq!(history.undo_description(), Some("Edit leaf body"));
    }
}

//! # Manuscript Editor
//!
//! Optimistic editing engine for manuscript documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ UI intent: drag, keystrokes, commands       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ drag / text_edit: one intent per gesture    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: records Actions, undo/redo          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ coordinator: install locally, then write    │
//! │  - manuscript-tree computes the snapshot    │
//! │  - PersistenceAdapter confirms the rows     │
//! │  - any failed write restores the snapshot   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Local first**: the snapshot changes before the store answers
//! 2. **All or nothing**: a failed write puts back the whole saved snapshot
//! 3. **Record on confirm**: history only holds edits the store accepted
//! 4. **Invertible**: every recorded action undoes without a re-fetch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use manuscript_editor::{Editor, MemoryStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::seeded(&snapshot));
//! let editor = Editor::new(store, snapshot);
//!
//! editor.update_field(&"n42".into(), "title", json!("Draft")).await?;
//! editor.undo().await?;
//! ```

mod actions;
mod config;
mod coordinator;
mod drag;
mod editor;
mod errors;
mod hooks;
mod memory;
mod persistence;
mod text_edit;
mod undo_stack;

pub use actions::{Action, ActionKind, Position};
pub use config::EditorConfig;
pub use coordinator::{Applied, Coordinator};
pub use drag::{Direction, DragMachine, DragSource, DragState, DropIntent};
pub use editor::{Editor, HistoryOutcome};
pub use errors::{EditorError, EditorResult};
pub use hooks::{EditorHooks, NoopHooks, Notification, NotificationKind};
pub use memory::{MemoryStore, WriteKind, WriteRecord};
pub use persistence::{insert_fields, PersistResult, PersistenceAdapter, PersistenceError};
pub use text_edit::TextEditSessions;
pub use undo_stack::{History, DEFAULT_HISTORY_LIMIT};

// Re-export the tree model for convenience
pub use manuscript_tree as tree;
pub use manuscript_tree::{Fields, Node, NodeId, NodeKind, Snapshot, StructureOp, Subtree};

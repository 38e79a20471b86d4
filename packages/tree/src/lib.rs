//! # Manuscript Tree
//!
//! In-memory model of a manuscript and the pure operations that reshape it.
//!
//! ## Structure
//!
//! ```text
//! Container            (document root level, parent = none)
//!   └─ Section
//!        └─ Unit
//!             └─ SubUnit
//!                  └─ Leaf   (content items)
//! ```
//!
//! Every node carries a 1-based `order` that is unique and contiguous among
//! its siblings. A [`Snapshot`] is the full keyed copy of the tree at one point
//! in time; the structure operations in [`mutations`] never touch their input
//! and either return a new snapshot or a [`MutationError`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use manuscript_tree::{IdGenerator, NodeKind, Snapshot, StructureOp};
//!
//! let mut ids = IdGenerator::new("session");
//! let snapshot = Snapshot::new();
//!
//! let op = StructureOp::Insert {
//!     parent_id: None,
//!     kind: NodeKind::Container,
//!     fields: Default::default(),
//!     at_index: None,
//! };
//! let mutated = op.apply(&snapshot, &mut ids)?;
//! assert_eq!(mutated.snapshot.len(), 1);
//! ```

pub mod error;
pub mod id_generator;
pub mod mutations;
pub mod node;
pub mod snapshot;

pub use error::{MutationError, MutationResult};
pub use id_generator::{IdGenerator, TEMP_ID_PREFIX};
pub use mutations::{
    insert, move_node, remove, reorder, restore, set_field, Mutated, StructureOp,
};
pub use node::{Fields, Node, NodeId, NodeKind, Subtree, RESERVED_FIELDS};
pub use snapshot::{RowChange, Snapshot};

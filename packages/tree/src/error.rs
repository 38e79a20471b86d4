use crate::node::{NodeId, NodeKind};
use thiserror::Error;

pub type MutationResult<T> = Result<T, MutationError>;

/// Validation failures raised before a snapshot is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Parent not found: {0}")]
    ParentNotFound(NodeId),

    #[error("A {kind} cannot be placed under {}", describe_parent(.parent))]
    InvalidParent {
        kind: NodeKind,
        parent: Option<NodeKind>,
    },

    #[error("Stale child set for {}: expected {expected} children, got {found}", describe_parent_id(.parent_id))]
    StaleChildren {
        parent_id: Option<NodeId>,
        expected: usize,
        found: usize,
    },

    #[error("Node id already present: {0}")]
    DuplicateId(NodeId),

    #[error("Field `{0}` is structural and cannot be edited")]
    ReservedField(String),

    #[error("Snapshot integrity violated: {0}")]
    Integrity(String),
}

impl MutationError {
    pub fn invalid_parent(kind: NodeKind, parent: Option<NodeKind>) -> Self {
        Self::InvalidParent { kind, parent }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Whether the error stems from the caller working against an outdated tree.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            Self::StaleChildren { .. } | Self::NodeNotFound(_) | Self::ParentNotFound(_)
        )
    }
}

fn describe_parent(parent: &Option<NodeKind>) -> String {
    match parent {
        Some(kind) => format!("a {kind}"),
        None => "the document root".to_string(),
    }
}

fn describe_parent_id(parent_id: &Option<NodeId>) -> String {
    match parent_id {
        Some(id) => id.to_string(),
        None => "the document root".to_string(),
    }
}

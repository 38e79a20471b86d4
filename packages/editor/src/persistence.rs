//! # Persistence Adapter
//!
//! Row-level access to the remote store. The coordinator only ever talks to
//! the store through [`PersistenceAdapter`]; cascading deletes are the
//! adapter's job.

use async_trait::async_trait;
use manuscript_tree::{Fields, Node, NodeId};
use serde_json::Value;
use thiserror::Error;

pub type PersistResult<T> = Result<T, PersistenceError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("Write to `{table}` rejected: {message}")]
    Rejected { table: String, message: String },

    #[error("Row {id} not found in `{table}`")]
    NotFound { table: String, id: NodeId },

    #[error("Write timed out after {0} ms")]
    Timeout(u64),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    pub fn rejected(table: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            table: table.to_string(),
            message: message.into(),
        }
    }

    /// Failures that say nothing about the write itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Remote store holding one table per node kind.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Insert a row and return its durable id. When `fields` carries an `id`
    /// the store must keep it.
    async fn insert_row(&self, table: &str, fields: &Fields) -> PersistResult<NodeId>;

    /// Overwrite the given columns of one row.
    async fn update_row(&self, table: &str, id: &NodeId, fields: &Fields) -> PersistResult<()>;

    /// Delete a row together with every row that descends from it.
    async fn delete_row(&self, table: &str, id: &NodeId) -> PersistResult<()>;
}

/// Columns written when a node is inserted.
///
/// Temporary ids stay local; any other id is sent so re-inserts keep it.
pub fn insert_fields(node: &Node) -> Fields {
    let mut fields = node.fields.clone();
    if !node.id.is_temporary() {
        fields.insert("id".to_string(), Value::String(node.id.to_string()));
    }
    let parent = node
        .parent_id
        .as_ref()
        .map_or(Value::Null, |id| Value::String(id.to_string()));
    fields.insert("parent_id".to_string(), parent);
    fields.insert("order".to_string(), Value::from(node.order));
    fields
}

//! Error types for the editor

use crate::persistence::PersistenceError;
use manuscript_tree::MutationError;
use thiserror::Error;

pub type EditorResult<T> = Result<T, EditorError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    /// Rejected before the snapshot was touched
    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    /// The store refused a write; the snapshot has been rolled back
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl EditorError {
    /// Whether retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EditorError::Persistence(err) => err.is_transient(),
            _ => false,
        }
    }
}

//! Collapses a burst of keystrokes on one field into a single recorded edit.

use crate::actions::Action;
use manuscript_tree::{NodeId, NodeKind};
use serde_json::Value;
use std::collections::HashMap;

/// Open text-edit sessions keyed by (node, field), each holding the value
/// the field had when editing started.
#[derive(Debug, Default)]
pub struct TextEditSessions {
    baselines: HashMap<(NodeId, String), Value>,
}

impl TextEditSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session. Returns false if one is already open for the key; the
    /// original baseline is kept.
    pub fn start(&mut self, node_id: &NodeId, field: &str, value: Value) -> bool {
        let key = (node_id.clone(), field.to_string());
        if self.baselines.contains_key(&key) {
            return false;
        }
        self.baselines.insert(key, value);
        true
    }

    /// Close the session, yielding one field update if the value changed.
    pub fn end(
        &mut self,
        node_id: &NodeId,
        field: &str,
        final_value: Value,
        entity: NodeKind,
    ) -> Option<Action> {
        let baseline = self.baselines.remove(&(node_id.clone(), field.to_string()))?;
        if baseline == final_value {
            return None;
        }
        Some(Action::field_update(
            entity,
            node_id.clone(),
            field,
            baseline,
            final_value,
        ))
    }

    pub fn is_open(&self, node_id: &NodeId, field: &str) -> bool {
        self.baselines
            .contains_key(&(node_id.clone(), field.to_string()))
    }

    pub fn open_count(&self) -> usize {
        self.baselines.len()
    }

    pub fn discard(&mut self, node_id: &NodeId, field: &str) {
        self.baselines.remove(&(node_id.clone(), field.to_string()));
    }

    pub fn discard_all(&mut self) {
        self.baselines.clear();
    }

    /// Carry open sessions over to an id the store replaced.
    pub fn remap_id(&mut self, from: &NodeId, to: &NodeId) {
        let moved: Vec<(NodeId, String)> = self
            .baselines
            .keys()
            .filter(|(id, _)| id == from)
            .cloned()
            .collect();
        for key in moved {
            if let Some(value) = self.baselines.remove(&key) {
                self.baselines.insert((to.clone(), key.1), value);
            }
        }
    }
}

//! Node types for the manuscript tree.

use crate::id_generator::TEMP_ID_PREFIX;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Content fields of a node, stored as a JSON object.
pub type Fields = serde_json::Map<String, Value>;

/// Field names owned by the tree structure itself.
pub const RESERVED_FIELDS: [&str; 3] = ["id", "parent_id", "order"];

/// Identifier of a node. Temporary ids are minted locally and replaced by the
/// store's durable id once an insert is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids that have not been confirmed by the store yet.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The five levels of the manuscript hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Container,
    Section,
    Unit,
    SubUnit,
    Leaf,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Container,
        NodeKind::Section,
        NodeKind::Unit,
        NodeKind::SubUnit,
        NodeKind::Leaf,
    ];

    /// Kind a node of this kind must hang off. `None` means the document root.
    pub const fn parent_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Container => None,
            NodeKind::Section => Some(NodeKind::Container),
            NodeKind::Unit => Some(NodeKind::Section),
            NodeKind::SubUnit => Some(NodeKind::Unit),
            NodeKind::Leaf => Some(NodeKind::SubUnit),
        }
    }

    pub const fn child_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Container => Some(NodeKind::Section),
            NodeKind::Section => Some(NodeKind::Unit),
            NodeKind::Unit => Some(NodeKind::SubUnit),
            NodeKind::SubUnit => Some(NodeKind::Leaf),
            NodeKind::Leaf => None,
        }
    }

    /// Distance from the document root (containers are depth 0).
    pub const fn depth(self) -> usize {
        match self {
            NodeKind::Container => 0,
            NodeKind::Section => 1,
            NodeKind::Unit => 2,
            NodeKind::SubUnit => 3,
            NodeKind::Leaf => 4,
        }
    }

    /// Storage table holding rows of this kind.
    pub const fn table(self) -> &'static str {
        match self {
            NodeKind::Container => "containers",
            NodeKind::Section => "sections",
            NodeKind::Unit => "units",
            NodeKind::SubUnit => "sub_units",
            NodeKind::Leaf => "leaves",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            NodeKind::Container => "container",
            NodeKind::Section => "section",
            NodeKind::Unit => "unit",
            NodeKind::SubUnit => "sub-unit",
            NodeKind::Leaf => "leaf",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One element of the manuscript tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub order: u32,
    #[serde(default)]
    pub fields: Fields,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind, parent_id: Option<NodeId>, order: u32) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id,
            order,
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Current value of a content field; absent fields read as `null`.
    pub fn field(&self, name: &str) -> Value {
        self.fields.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }
}

/// A node together with all of its descendants, parents listed before children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtree {
    pub root: Node,
    #[serde(default)]
    pub descendants: Vec<Node>,
}

impl Subtree {
    pub fn leaf(root: Node) -> Self {
        Self {
            root,
            descendants: Vec::new(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.root.id
    }

    pub fn parent_id(&self) -> Option<&NodeId> {
        self.root.parent_id.as_ref()
    }

    pub fn kind(&self) -> NodeKind {
        self.root.kind
    }

    pub fn node_count(&self) -> usize {
        1 + self.descendants.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        std::iter::once(&self.root).chain(self.descendants.iter())
    }

    /// Replaces an id wherever it appears, as a node id or a parent reference.
    pub fn rename(&mut self, from: &NodeId, to: &NodeId) {
        for node in std::iter::once(&mut self.root).chain(self.descendants.iter_mut()) {
            if &node.id == from {
                node.id = to.clone();
            }
            if node.parent_id.as_ref() == Some(from) {
                node.parent_id = Some(to.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_hierarchy_is_consistent() {
        for kind in NodeKind::ALL {
            if let Some(child) = kind.child_kind() {
                assert_eq!(child.parent_kind(), Some(kind));
                assert_eq!(child.depth(), kind.depth() + 1);
            }
        }
        assert_eq!(NodeKind::Container.parent_kind(), None);
        assert_eq!(NodeKind::Leaf.child_kind(), None);
    }

    #[test]
    fn test_temporary_ids() {
        assert!(NodeId::from("tmp-local-1").is_temporary());
        assert!(!NodeId::from("n42").is_temporary());
    }

    #[test]
    fn test_node_serialization() {
        let node = Node::new("n1", NodeKind::SubUnit, Some("u1".into()), 2)
            .with_field("title", "Opening");

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "n1",
                "kind": "sub_unit",
                "parent_id": "u1",
                "order": 2,
                "fields": { "title": "Opening" }
            })
        );

        let back: Node = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_subtree_rename_updates_parent_links() {
        let mut subtree = Subtree {
            root: Node::new("tmp-a-1", NodeKind::Unit, Some("s1".into()), 1),
            descendants: vec![Node::new("p1", NodeKind::SubUnit, Some("tmp-a-1".into()), 1)],
        };

        subtree.rename(&"tmp-a-1".into(), &"u9".into());

        assert_eq!(subtree.node_id().as_str(), "u9");
        assert_eq!(subtree.descendants[0].parent_id, Some("u9".into()));
    }
}

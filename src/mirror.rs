use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element(String),
    Text,
    Comment,
}

impl NodeKind {
    pub fn is_comment(&self) -> bool {
        matches!(self, NodeKind::Comment)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub text: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Default)]
pub struct NodeMirror {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
}

impl NodeMirror {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn create_element(&mut self, kind: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Element(kind.into()), None)
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text, Some(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Comment, Some(text.into()))
    }

    fn alloc(&mut self, kind: NodeKind, text: Option<String>) -> NodeId {
        let id = NodeId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                text,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&id).map(|node| &node.kind)
    }

    pub fn is_comment(&self, id: NodeId) -> bool {
        self.kind(id).is_some_and(NodeKind::is_comment)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(&id).and_then(|node| node.text.as_deref())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_node(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent_node(id)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|sibling| *sibling == id)?;
        siblings.get(index + 1).copied()
    }

    /// Returns false when either node is unknown or `child` is `parent` or
    /// one of its ancestors; the tree is left untouched.
    pub fn insert(&mut self, child: NodeId, parent: NodeId, anchor: Option<NodeId>) -> bool {
        if !self.contains(child)
            || !self.contains(parent)
            || self.is_ancestor_or_self(child, parent)
        {
            return false;
        }

        self.unlink(child);

        let Some(parent_node) = self.nodes.get_mut(&parent) else {
            return false;
        };
        let position = anchor.and_then(|anchor| {
            parent_node
                .children
                .iter()
                .position(|sibling| *sibling == anchor)
        });
        match position {
            Some(index) => parent_node.children.insert(index, child),
            None => parent_node.children.push(child),
        }

        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
        }
        true
    }

    pub fn remove(&mut self, child: NodeId) -> Option<NodeId> {
        self.unlink(child)
    }

    /// Unlinks `id` and drops it together with its subtree. Returns every
    /// dropped id, `id` first; empty when `id` is unknown.
    pub fn destroy(&mut self, id: NodeId) -> Vec<NodeId> {
        self.unlink(id);

        let mut dropped = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children.into_iter().rev());
                dropped.push(next);
            }
        }
        dropped
    }

    fn is_ancestor_or_self(&self, candidate: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == candidate {
                return true;
            }
            match self.parent_node(node) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.text = Some(text.into());
                true
            }
            None => false,
        }
    }

    pub fn set_element_text(&mut self, id: NodeId, text: impl Into<String>) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let children = std::mem::take(&mut node.children);
        node.text = Some(text.into());

        for child in children {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                child_node.parent = None;
            }
        }
        true
    }

    /// The node the host should insert before when the mirror anchor is
    /// `anchor`: the anchor itself, or the first non-comment sibling after it.
    /// `None` means append.
    pub fn host_anchor(&self, parent: NodeId, anchor: Option<NodeId>) -> Option<NodeId> {
        let anchor = anchor?;
        let siblings = self.children(parent);
        let start = siblings.iter().position(|sibling| *sibling == anchor)?;

        siblings[start..]
            .iter()
            .copied()
            .find(|sibling| !self.is_comment(*sibling))
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&child)?.parent.take()?;
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.retain(|sibling| *sibling != child);
        }
        Some(parent)
    }
}

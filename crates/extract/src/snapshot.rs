use crate::{PageDocument, PageNode, Result, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Serialized element tree of a captured page, the on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotNode {
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug)]
struct ArenaNode {
    tag: String,
    classes: Vec<String>,
    own_text: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena-backed [`PageDocument`] parsed from a JSON page snapshot.
///
/// Node ids are pre-order indices, stable for the lifetime of the parsed
/// document (re-parsing an unchanged snapshot yields the same ids).
#[derive(Debug, Clone)]
pub struct SnapshotDocument {
    arena: Arc<Vec<ArenaNode>>,
}

impl SnapshotDocument {
    pub fn from_json(raw: &str) -> Result<Self> {
        let root: SnapshotNode = serde_json::from_str(raw)?;
        Ok(Self::from_root(&root))
    }

    #[must_use]
    pub fn from_root(root: &SnapshotNode) -> Self {
        let mut arena = Vec::new();
        build_arena(root, None, &mut arena);
        Self {
            arena: Arc::new(arena),
        }
    }

    #[must_use]
    pub fn root(&self) -> SnapshotHandle {
        self.handle(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    fn handle(&self, index: usize) -> SnapshotHandle {
        SnapshotHandle {
            arena: Arc::clone(&self.arena),
            index,
        }
    }
}

fn build_arena(node: &SnapshotNode, parent: Option<usize>, arena: &mut Vec<ArenaNode>) -> usize {
    let index = arena.len();
    arena.push(ArenaNode {
        tag: node.tag.clone(),
        classes: node.classes.clone(),
        own_text: node.text.clone(),
        parent,
        children: Vec::new(),
    });
    for child in &node.children {
        let child_index = build_arena(child, Some(index), arena);
        arena[index].children.push(child_index);
    }
    index
}

/// Cheap handle to one snapshot element.
#[derive(Clone)]
pub struct SnapshotHandle {
    arena: Arc<Vec<ArenaNode>>,
    index: usize,
}

impl SnapshotHandle {
    fn node(&self) -> &ArenaNode {
        &self.arena[self.index]
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        &self.node().tag
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.node().classes
    }

    fn collect_text(&self, parts: &mut Vec<String>) {
        let own = self.node().own_text.trim();
        if !own.is_empty() {
            parts.push(own.to_string());
        }
        for child in self.children() {
            child.collect_text(parts);
        }
    }
}

impl PageNode for SnapshotHandle {
    fn node_id(&self) -> u64 {
        self.index as u64
    }

    fn text(&self) -> String {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        parts.join(" ")
    }

    fn parent(&self) -> Option<Self> {
        self.node().parent.map(|index| Self {
            arena: Arc::clone(&self.arena),
            index,
        })
    }

    fn matches(&self, selector: &Selector) -> bool {
        selector.matches_classes(&self.node().classes)
    }

    fn children(&self) -> Vec<Self> {
        self.node()
            .children
            .iter()
            .map(|&index| Self {
                arena: Arc::clone(&self.arena),
                index,
            })
            .collect()
    }
}

impl PageDocument for SnapshotDocument {
    type Node = SnapshotHandle;

    fn select(&self, selector: &Selector) -> Vec<Self::Node> {
        // Arena order is pre-order, so index order is document order.
        (0..self.arena.len())
            .filter(|&index| selector.matches_classes(&self.arena[index].classes))
            .map(|index| self.handle(index))
            .collect()
    }
}

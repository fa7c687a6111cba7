use crate::Selector;
use std::collections::HashSet;

/// Opaque handle to one element of a live document.
///
/// The scanner only needs identity, subtree text, upward navigation, and
/// selector matching, so any markup backend can implement this without the
/// scanner knowing about its node representation.
pub trait PageNode: Clone {
    /// Stable identity of the element for the lifetime of the document.
    fn node_id(&self) -> u64;

    /// Concatenated text content of the element's subtree.
    fn text(&self) -> String;

    fn parent(&self) -> Option<Self>;

    fn matches(&self, selector: &Selector) -> bool;

    fn children(&self) -> Vec<Self>;
}

/// A scannable document: selector-based lookup in document order.
pub trait PageDocument {
    type Node: PageNode;

    fn select(&self, selector: &Selector) -> Vec<Self::Node>;
}

/// Matching descendants of `node` in document order, excluding `node`
/// itself.
pub fn select_descendants<N: PageNode>(node: &N, selector: &Selector) -> Vec<N> {
    let mut found = Vec::new();
    let mut stack: Vec<N> = node.children();
    stack.reverse();
    while let Some(current) = stack.pop() {
        if current.matches(selector) {
            found.push(current.clone());
        }
        let mut children = current.children();
        children.reverse();
        stack.extend(children);
    }
    found
}

/// Records which elements have already been queued so repeated scans of an
/// unchanged document stay idempotent. Marks are never cleared.
pub trait ExtractionMark<N: PageNode> {
    fn is_marked(&self, node: &N) -> bool;

    fn mark(&mut self, node: &N);
}

/// Default mark store keyed by [`PageNode::node_id`].
#[derive(Debug, Default)]
pub struct SeenSet {
    seen: HashSet<u64>,
}

impl SeenSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl<N: PageNode> ExtractionMark<N> for SeenSet {
    fn is_marked(&self, node: &N) -> bool {
        self.seen.contains(&node.node_id())
    }

    fn mark(&mut self, node: &N) {
        self.seen.insert(node.node_id());
    }
}

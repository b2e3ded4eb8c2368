use std::collections::HashMap;

const ROOT: usize = 0;

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, usize>,
    /// Index into the path list when some line ends exactly at this node
    path: Option<usize>,
}

/// Arena-backed prefix tree over path segments.
///
/// A path is a leaf iff its node has no children, which is the same as
/// "no other path starts with this path followed by the separator",
/// regardless of the order lines appear in.
#[derive(Debug)]
pub(crate) struct PrefixTree {
    nodes: Vec<Node>,
}

impl PrefixTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![Node::default()],
        }
    }

    /// Insert a path and return the index previously registered for the same
    /// segments, if any.
    pub(crate) fn insert(&mut self, segments: &[String], path_index: usize) -> Option<usize> {
        let mut current = ROOT;
        for segment in segments {
            current = match self.nodes[current].children.get(segment) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::default());
                    self.nodes[current].children.insert(segment.clone(), child);
                    child
                }
            };
        }

        match self.nodes[current].path {
            Some(existing) => Some(existing),
            None => {
                self.nodes[current].path = Some(path_index);
                None
            }
        }
    }

    /// Leaf flags indexed by path index
    pub(crate) fn leaf_flags(&self, path_count: usize) -> Vec<bool> {
        let mut flags = vec![false; path_count];
        for node in &self.nodes {
            if let Some(idx) = node.path {
                flags[idx] = node.children.is_empty();
            }
        }
        flags
    }
}

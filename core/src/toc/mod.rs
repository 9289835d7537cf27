//! Table-of-contents tree flattened into the rows a list view displays.

use serde::{Deserialize, Serialize};

/// One outline entry. Serializable so it can be handed between screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocNode {
    pub name: String,
    /// Zero-based page the entry points at.
    pub page: u32,
    #[serde(default)]
    pub expanded: bool,
    /// Nesting depth starting at 1 for top-level entries.
    pub level: u32,
    #[serde(default)]
    pub children: Vec<TocNode>,
}

impl TocNode {
    pub fn new(name: impl Into<String>, page: u32, level: u32) -> Self {
        Self { name: name.into(), page, expanded: false, level, children: Vec::new() }
    }

    pub fn with_children(mut self, children: Vec<TocNode>) -> Self {
        self.children = children;
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// A visible row of the flattened outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocRow {
    pub name: String,
    pub page: u32,
    pub level: u32,
    pub expanded: bool,
    pub has_children: bool,
    /// Child indices from the root list down to this node, usable with [`toggle`].
    pub path: Vec<usize>,
}

impl TocRow {
    /// Indentation steps: top level is flush left.
    pub fn indent(&self) -> u32 {
        self.level.saturating_sub(1)
    }
}

/// List every node in display order, descending only into expanded nodes.
pub fn flatten(nodes: &[TocNode]) -> Vec<TocRow> {
    let mut rows = Vec::new();
    let mut path = Vec::new();
    push_rows(nodes, &mut path, &mut rows);
    rows
}

fn push_rows(nodes: &[TocNode], path: &mut Vec<usize>, rows: &mut Vec<TocRow>) {
    for (index, node) in nodes.iter().enumerate() {
        path.push(index);
        rows.push(TocRow {
            name: node.name.clone(),
            page: node.page,
            level: node.level,
            expanded: node.expanded,
            has_children: node.has_children(),
            path: path.clone(),
        });
        if node.expanded {
            push_rows(&node.children, path, rows);
        }
        path.pop();
    }
}

/// Flip the expand state of the node at `path`. Returns the new state, or `None` when the
/// path does not name a node.
pub fn toggle(nodes: &mut [TocNode], path: &[usize]) -> Option<bool> {
    let (first, rest) = path.split_first()?;
    let mut node = nodes.get_mut(*first)?;
    for index in rest {
        node = node.children.get_mut(*index)?;
    }
    node.expanded = !node.expanded;
    Some(node.expanded)
}

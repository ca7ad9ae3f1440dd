//! Directory Hierarchy Builder
//!
//! Projects the values of the "directory" tag name (path strings using `/` or
//! `\`) into a tree rooted at an unnamed Root:
//!
//! ```text
//!   "a/b", "a/c", "a\d"   ──►   Root
//!                                └── a
//!                                    ├── b
//!                                    ├── c
//!                                    └── d
//! ```
//!
//! Each child is owned by its parent. A node's [`DirectoryNode::path`] is the
//! `/`-joined titles from the first level down to the node and serves as its
//! stable key in [`DirectoryTreeState`].

use std::collections::HashSet;

use crate::models::TagView;

const SEPARATOR: char = '/';
const ROOT_TITLE: &str = "Root";

/// One path segment in the directory tree
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryNode {
    pub title: String,
    pub children: Vec<DirectoryNode>,
    /// Tag whose path ends at this node, if any
    pub tag: Option<TagView>,
    /// Parent path plus separator; empty on the first level
    pub prefix: String,
}

impl DirectoryNode {
    fn new(title: &str, prefix: String) -> Self {
        Self {
            title: title.to_string(),
            children: Vec::new(),
            tag: None,
            prefix,
        }
    }

    /// Full path used as the node key
    pub fn path(&self) -> String {
        format!("{}{}", self.prefix, self.title)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn child_prefix(&self, is_root: bool) -> String {
        if is_root {
            String::new()
        } else {
            format!("{}{}", self.path(), SEPARATOR)
        }
    }

    fn visit<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a DirectoryNode)>) {
        for child in &self.children {
            out.push((depth, child));
            child.visit(depth + 1, out);
        }
    }
}

/// Tree built from directory tag values
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryTree {
    root: DirectoryNode,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self {
            root: DirectoryNode::new(ROOT_TITLE, String::new()),
        }
    }
}

impl DirectoryTree {
    /// Build the tree from tag values
    ///
    /// Separators are normalized to `/` and empty segments skipped. When two
    /// tags resolve to the same path the later one is kept on the node.
    pub fn from_tags(tags: &[TagView]) -> Self {
        let mut tree = Self::default();
        for tag in tags {
            tree.insert(tag);
        }
        tree
    }

    fn insert(&mut self, tag: &TagView) {
        let normalized = tag.value.replace('\\', "/");
        let segments: Vec<&str> = normalized
            .split(SEPARATOR)
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() {
            log::debug!("directory tag {} has no path segments", tag.id);
            return;
        }

        let mut current = &mut self.root;
        let mut is_root = true;
        for segment in segments {
            let index = match current.children.iter().position(|c| c.title == segment) {
                Some(index) => index,
                None => {
                    let prefix = current.child_prefix(is_root);
                    current.children.push(DirectoryNode::new(segment, prefix));
                    current.children.len() - 1
                }
            };
            current = &mut current.children[index];
            is_root = false;
        }

        if let Some(previous) = &current.tag {
            log::debug!(
                "directory {} claimed by tag {} and tag {}, keeping {}",
                current.path(),
                previous.id,
                tag.id,
                tag.id
            );
        }
        current.tag = Some(tag.clone());
    }

    /// Top-level nodes
    pub fn roots(&self) -> &[DirectoryNode] {
        &self.root.children
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Number of nodes, Root excluded
    pub fn len(&self) -> usize {
        self.walk().len()
    }

    /// Depth-first, pre-order listing with depth (first level is 0)
    pub fn walk(&self) -> Vec<(usize, &DirectoryNode)> {
        let mut out = Vec::new();
        self.root.visit(0, &mut out);
        out
    }

    /// Look a node up by its path
    pub fn find(&self, path: &str) -> Option<&DirectoryNode> {
        self.walk()
            .into_iter()
            .map(|(_, node)| node)
            .find(|node| node.path() == path)
    }

    /// Collapse a chain of single-child levels from the top
    ///
    /// Presentation helper: `Root → music → {a, b}` becomes `music → {a, b}`
    /// shown as the first level. Paths are unchanged. Never collapses onto a
    /// leaf.
    pub fn normalize(mut self) -> Self {
        while self.root.children.len() == 1 && !self.root.children[0].is_leaf() {
            let Some(only) = self.root.children.pop() else {
                break;
            };
            self.root = only;
        }
        self
    }

    /// Title of the node currently acting as the root
    pub fn root_title(&self) -> &str {
        &self.root.title
    }
}

// ============================================================================
// View state
// ============================================================================

/// Expansion and selection keyed by node path
///
/// Selection is ordered: it is what the filter sends as its directory list.
#[derive(Debug, Clone, Default)]
pub struct DirectoryTreeState {
    pub expanded: HashSet<String>,
    pub selected: Vec<String>,
}

impl DirectoryTreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle_expanded(&mut self, path: &str) {
        if !self.expanded.remove(path) {
            self.expanded.insert(path.to_string());
        }
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    /// Add or remove a path from the selection; returns the new state
    pub fn toggle_selected(&mut self, path: &str) -> bool {
        match self.selected.iter().position(|p| p == path) {
            Some(index) => {
                self.selected.remove(index);
                false
            }
            None => {
                self.selected.push(path.to_string());
                true
            }
        }
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.selected.iter().any(|p| p == path)
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Forget paths that no longer exist after a rebuild
    ///
    /// Returns true when the selection changed.
    pub fn retain_existing(&mut self, tree: &DirectoryTree) -> bool {
        self.expanded.retain(|path| tree.find(path).is_some());
        let before = self.selected.len();
        self.selected.retain(|path| tree.find(path).is_some());
        self.selected.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: i64, value: &str) -> TagView {
        TagView {
            id,
            value: value.to_string(),
            name_id: 2,
        }
    }

    fn titles(nodes: &[DirectoryNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn test_mixed_separators_share_one_parent() {
        let tree = DirectoryTree::from_tags(&[tag(1, "a/b"), tag(2, "a/c"), tag(3, "a\\d")]);

        assert_eq!(titles(tree.roots()), vec!["a"]);
        let a = &tree.roots()[0];
        assert_eq!(titles(&a.children), vec!["b", "c", "d"]);
        assert_eq!(a.children[2].path(), "a/d");
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_tag_attached_to_terminal_node_only() {
        let tree = DirectoryTree::from_tags(&[tag(1, "music/house")]);
        assert!(tree.find("music").unwrap().tag.is_none());
        assert_eq!(tree.find("music/house").unwrap().tag.as_ref().map(|t| t.id), Some(1));
    }

    #[test]
    fn test_duplicate_path_last_write_wins() {
        let tree = DirectoryTree::from_tags(&[tag(1, "a/b"), tag(2, "a\\b")]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.find("a/b").unwrap().tag.as_ref().map(|t| t.id), Some(2));
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let tree = DirectoryTree::from_tags(&[tag(1, "/music//techno/"), tag(2, "")]);
        assert_eq!(tree.len(), 2);
        assert!(tree.find("music/techno").is_some());
    }

    #[test]
    fn test_walk_is_depth_first() {
        let tree = DirectoryTree::from_tags(&[tag(1, "x/y"), tag(2, "z"), tag(3, "x/w")]);
        let order: Vec<(usize, String)> = tree.walk().into_iter().map(|(d, n)| (d, n.path())).collect();
        assert_eq!(
            order,
            vec![
                (0, "x".to_string()),
                (1, "x/y".to_string()),
                (1, "x/w".to_string()),
                (0, "z".to_string()),
            ]
        );
    }

    #[test]
    fn test_normalize_collapses_single_child_chain() {
        let tree =
            DirectoryTree::from_tags(&[tag(1, "home/me/music/a"), tag(2, "home/me/music/b")]).normalize();
        assert_eq!(tree.root_title(), "music");
        assert_eq!(titles(tree.roots()), vec!["a", "b"]);
        assert_eq!(tree.roots()[0].path(), "home/me/music/a");

        let single = DirectoryTree::from_tags(&[tag(1, "only")]).normalize();
        assert_eq!(titles(single.roots()), vec!["only"]);
    }

    #[test]
    fn test_state_drops_vanished_paths() {
        let tree = DirectoryTree::from_tags(&[tag(1, "a/b")]);
        let mut state = DirectoryTreeState::new();
        state.toggle_expanded("a");
        assert!(state.toggle_selected("a/b"));
        assert!(state.toggle_selected("gone"));

        assert!(state.retain_existing(&tree));
        assert_eq!(state.selected, vec!["a/b".to_string()]);
        assert!(state.is_expanded("a"));

        assert!(!state.toggle_selected("a/b"));
        assert!(!state.is_selected("a/b"));
    }
}

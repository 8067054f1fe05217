//! `PathTree`: the page hierarchy implied by a set of markdown paths.
//!
//! Nodes live in an arena; children are held as segment-keyed indices and
//! the parent as a plain index, so the structure has no shared ownership.
//! Looking up a path walks one segment per level.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use junction_core::types::{parent_of, title_for_path, title_key};
use junction_core::{NetChange, PageIdentityMap, PageKind};

use crate::error::PlanningConflictError;

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNode {
    pub path: PathBuf,
    pub title: String,
    pub kind: PageKind,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
}

impl PathNode {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTree {
    nodes: Vec<PathNode>,
}

impl Default for PathTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PathTree {
    /// A tree holding only the space root.
    pub fn new() -> Self {
        Self {
            nodes: vec![PathNode {
                path: PathBuf::new(),
                title: String::new(),
                kind: PageKind::Container,
                parent: None,
                children: BTreeMap::new(),
            }],
        }
    }

    /// Build a tree from leaf (markdown file) paths, synthesising the
    /// directories between them and the root.
    pub fn build<I, P>(leaves: I) -> Result<Self, PlanningConflictError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut tree = Self::new();
        let mut sorted: Vec<PathBuf> = leaves.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        sorted.sort();
        sorted.dedup();
        for leaf in &sorted {
            tree.insert_leaf(leaf)?;
        }
        Ok(tree)
    }

    /// The tree of content pages currently tracked in `identity`.
    pub fn from_identity(identity: &PageIdentityMap) -> Result<Self, PlanningConflictError> {
        Self::build(identity.leaf_paths())
    }

    /// Apply net changes and return the resulting tree.
    ///
    /// Titles are validated here so that naming conflicts surface before
    /// any remote call.
    pub fn reconcile(&self, changes: &[NetChange]) -> Result<Self, PlanningConflictError> {
        let mut leaves: BTreeSet<PathBuf> = self.leaves().map(Path::to_path_buf).collect();
        // Removals first, so a move may take a path another change vacates.
        for change in changes {
            match change {
                NetChange::Delete { path } => {
                    leaves.remove(path);
                }
                NetChange::Move { from, .. } => {
                    leaves.remove(from);
                }
                NetChange::Create { .. } | NetChange::Update { .. } => {}
            }
        }
        for change in changes {
            match change {
                NetChange::Delete { .. } => {}
                NetChange::Move { to: path, .. }
                | NetChange::Create { path, .. }
                | NetChange::Update { path, .. } => {
                    leaves.insert(path.clone());
                }
            }
        }
        Self::build(leaves)
    }

    pub fn root(&self) -> &PathNode {
        &self.nodes[ROOT]
    }

    /// Node at `path`, walking one segment per level.
    pub fn get(&self, path: &Path) -> Option<&PathNode> {
        self.find(path).map(|id| &self.nodes[id])
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    /// Parent node (the root for top-level pages).
    pub fn parent(&self, path: &Path) -> Option<&PathNode> {
        let id = self.find(path)?;
        self.nodes[id].parent.map(|p| &self.nodes[p])
    }

    /// Children of `path` in segment order.
    pub fn children(&self, path: &Path) -> Vec<&PathNode> {
        match self.find(path) {
            Some(id) => self.nodes[id]
                .children
                .values()
                .map(|&c| &self.nodes[c])
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn leaves(&self) -> impl Iterator<Item = &Path> {
        self.nodes
            .iter()
            .filter(|n| n.kind == PageKind::Leaf)
            .map(|n| n.path.as_path())
    }

    /// Directory nodes, excluding the root.
    pub fn containers(&self) -> impl Iterator<Item = &Path> {
        self.nodes
            .iter()
            .filter(|n| n.kind == PageKind::Container && !n.is_root())
            .map(|n| n.path.as_path())
    }

    /// Number of nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, path: &Path) -> Option<NodeId> {
        let mut current = ROOT;
        for segment in path.iter() {
            let segment = segment.to_string_lossy();
            current = *self.nodes[current].children.get(segment.as_ref())?;
        }
        Some(current)
    }

    fn insert_leaf(&mut self, leaf: &Path) -> Result<(), PlanningConflictError> {
        let mut current = ROOT;
        let segments: Vec<String> = leaf
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        let mut path = PathBuf::new();
        for (i, segment) in segments.iter().enumerate() {
            path.push(segment);
            let kind = if i + 1 == segments.len() {
                PageKind::Leaf
            } else {
                PageKind::Container
            };
            current = match self.nodes[current].children.get(segment) {
                Some(&existing) => existing,
                None => self.add_child(current, segment, &path, kind)?,
            };
        }
        Ok(())
    }

    fn add_child(
        &mut self,
        parent: NodeId,
        segment: &str,
        path: &Path,
        kind: PageKind,
    ) -> Result<NodeId, PlanningConflictError> {
        let title = title_for_path(path).ok_or_else(|| PlanningConflictError::EmptyTitle {
            path: path.to_path_buf(),
        })?;
        let key = title_key(&title);
        if let Some(sibling) = self.nodes[parent]
            .children
            .values()
            .map(|&c| &self.nodes[c])
            .find(|n| title_key(&n.title) == key)
        {
            return Err(PlanningConflictError::DuplicateTitle {
                parent: parent_of(path),
                title,
                first: sibling.path.clone(),
                second: path.to_path_buf(),
            });
        }
        let id = self.nodes.len();
        self.nodes.push(PathNode {
            path: path.to_path_buf(),
            title,
            kind,
            parent: Some(parent),
            children: BTreeMap::new(),
        });
        self.nodes[parent].children.insert(segment.to_string(), id);
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_containers_between_leaves() {
        let tree = PathTree::build(["docs/guide/Setup.md", "docs/Welcome.md", "Top.md"]).unwrap();
        assert_eq!(tree.len(), 5);
        let guide = tree.get(Path::new("docs/guide")).unwrap();
        assert_eq!(guide.kind, PageKind::Container);
        assert_eq!(guide.title, "guide");
        let setup = tree.get(Path::new("docs/guide/Setup.md")).unwrap();
        assert_eq!(setup.title, "Setup");
        assert_eq!(tree.parent(Path::new("docs/guide/Setup.md")).unwrap().path, Path::new("docs/guide"));
        assert!(tree.parent(Path::new("Top.md")).unwrap().is_root());
    }

    #[test]
    fn children_are_in_segment_order() {
        let tree = PathTree::build(["d/b.md", "d/a.md", "d/c/x.md"]).unwrap();
        let names: Vec<_> = tree
            .children(Path::new("d"))
            .iter()
            .map(|n| n.title.clone())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn case_insensitive_sibling_titles_conflict() {
        let err = PathTree::build(["docs/Plan.md", "docs/plan.md"]).unwrap_err();
        assert!(
            matches!(&err, PlanningConflictError::DuplicateTitle { parent: Some(p), .. } if p == Path::new("docs")),
            "got: {err:?}"
        );
    }

    #[test]
    fn file_and_directory_with_same_title_conflict() {
        let err = PathTree::build(["docs.md", "docs/a.md"]).unwrap_err();
        assert!(matches!(err, PlanningConflictError::DuplicateTitle { parent: None, .. }));
    }

    #[test]
    fn empty_title_is_rejected() {
        let err = PathTree::build(["docs/ .md"]).unwrap_err();
        assert!(matches!(err, PlanningConflictError::EmptyTitle { .. }));
    }

    #[test]
    fn reconcile_applies_moves_and_drops_empty_directories() {
        let tree = PathTree::build(["old/a.md", "keep.md"]).unwrap();
        let next = tree
            .reconcile(&[NetChange::Move {
                from: "old/a.md".into(),
                to: "new/a.md".into(),
                content: None,
            }])
            .unwrap();
        assert!(next.contains(Path::new("new/a.md")));
        assert!(!next.contains(Path::new("old")));
        assert!(next.contains(Path::new("keep.md")));
    }

    #[test]
    fn reconcile_rejects_a_create_clashing_with_an_existing_page() {
        let tree = PathTree::build(["docs/Plan.md"]).unwrap();
        let err = tree
            .reconcile(&[NetChange::Create {
                path: "docs/PLAN.md".into(),
                content: String::new(),
            }])
            .unwrap_err();
        assert!(matches!(err, PlanningConflictError::DuplicateTitle { .. }));
    }
}

//! `Delta::plan`: turn net changes into an ordered [`OperationPlan`].
//!
//! ## Ordering
//!
//! 1. Creates (synthesised containers included), by depth then path.
//! 2. Moves, topologically: after the move that vacates their title and
//!    after their new parent exists.
//! 3. Updates, by path.
//! 4. Deletes, deepest first, then by path.
//!
//! Planning is pure: it reads the identity snapshot and never talks to the
//! remote space.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use junction_core::types::{ancestors_of, fingerprint, parent_of, path_depth, title_for_path, title_key};
use junction_core::{NetChange, PageId, PageIdentityMap, PageKind};

use crate::error::{DeltaError, PlanningConflictError};
use crate::path_tree::PathTree;

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// One remote mutation. `parent` is a repository path; `None` means the
/// space root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreatePage {
        path: PathBuf,
        title: String,
        parent: Option<PathBuf>,
        kind: PageKind,
        /// Markdown source; `None` for containers.
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    UpdatePage {
        path: PathBuf,
        title: String,
        content: String,
    },
    MovePage {
        from: PathBuf,
        to: PathBuf,
        title: String,
        parent: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    DeletePage {
        path: PathBuf,
        title: String,
        remote_id: PageId,
    },
}

impl Operation {
    /// The path the page has once the operation is applied (the removed
    /// path for deletes).
    pub fn path(&self) -> &Path {
        match self {
            Operation::CreatePage { path, .. }
            | Operation::UpdatePage { path, .. }
            | Operation::DeletePage { path, .. } => path,
            Operation::MovePage { to, .. } => to,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Operation::CreatePage { title, .. }
            | Operation::UpdatePage { title, .. }
            | Operation::MovePage { title, .. }
            | Operation::DeletePage { title, .. } => title,
        }
    }

    /// Markdown this operation publishes, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Operation::CreatePage { content, .. } | Operation::MovePage { content, .. } => {
                content.as_deref()
            }
            Operation::UpdatePage { content, .. } => Some(content),
            Operation::DeletePage { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreatePage { .. } => "create",
            Operation::UpdatePage { .. } => "update",
            Operation::MovePage { .. } => "move",
            Operation::DeletePage { .. } => "delete",
        }
    }

    fn phase(&self) -> u8 {
        match self {
            Operation::CreatePage { .. } => 0,
            Operation::MovePage { .. } => 1,
            Operation::UpdatePage { .. } => 2,
            Operation::DeletePage { .. } => 3,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::MovePage { from, to, .. } => {
                write!(f, "move {} -> {}", from.display(), to.display())
            }
            other => write!(f, "{} {}", other.name(), other.path().display()),
        }
    }
}

/// An ordered, conflict-free sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationPlan {
    operations: Vec<Operation>,
}

impl OperationPlan {
    pub fn from_operations(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Check the ordering rules without touching anything remote.
    ///
    /// - phases run creates, moves, updates, deletes
    /// - a page is created before anything is created, moved or updated
    ///   below it
    /// - a page is deleted after everything below it
    pub fn validate(&self) -> Result<(), DeltaError> {
        let mut created_at: BTreeMap<&Path, usize> = BTreeMap::new();
        for (i, op) in self.operations.iter().enumerate() {
            if let Operation::CreatePage { path, .. } = op {
                if created_at.insert(path.as_path(), i).is_some() {
                    return Err(DeltaError::invalid_plan(i, format!("{} is created twice", path.display())));
                }
            }
        }

        let mut last_phase = 0;
        for (i, op) in self.operations.iter().enumerate() {
            let phase = op.phase();
            if phase < last_phase {
                return Err(DeltaError::invalid_plan(i, format!("{op} is out of phase order")));
            }
            last_phase = phase;

            if matches!(op, Operation::DeletePage { .. }) {
                continue;
            }
            for ancestor in ancestors_of(op.path()) {
                if let Some(&at) = created_at.get(ancestor.as_path()) {
                    if at > i {
                        return Err(DeltaError::invalid_plan(
                            i,
                            format!("{op} runs before its ancestor {} is created", ancestor.display()),
                        ));
                    }
                }
            }
        }

        let deletes: Vec<(usize, &Path)> = self
            .operations
            .iter()
            .enumerate()
            .filter_map(|(i, op)| match op {
                Operation::DeletePage { path, .. } => Some((i, path.as_path())),
                _ => None,
            })
            .collect();
        for &(i, path) in &deletes {
            if let Some(&(_, child)) = deletes.iter().find(|&&(j, other)| j > i && other.starts_with(path) && other != path) {
                return Err(DeltaError::invalid_plan(
                    i,
                    format!("{} is deleted before its descendant {}", path.display(), child.display()),
                ));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a OperationPlan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

fn tracked(identity: &PageIdentityMap, path: &Path) -> bool {
    identity.remote_id(path).is_some()
}

fn unchanged(identity: &PageIdentityMap, path: &Path, content: &str) -> bool {
    identity
        .get(path)
        .and_then(|r| r.content_fingerprint.as_deref())
        .is_some_and(|fp| fp == fingerprint(content))
}

/// Rewrite changes so that replaying a delta against a snapshot that
/// already reflects part of it does only the remaining work.
pub fn normalize(changes: &[NetChange], identity: &PageIdentityMap) -> Vec<NetChange> {
    let mut out = Vec::with_capacity(changes.len());
    for change in changes {
        match change {
            NetChange::Create { path, content } | NetChange::Update { path, content } => {
                if !tracked(identity, path) {
                    if matches!(change, NetChange::Update { .. }) {
                        tracing::warn!(path = %path.display(), "update of an untracked page, creating it");
                    }
                    out.push(NetChange::Create {
                        path: path.clone(),
                        content: content.clone(),
                    });
                } else if unchanged(identity, path, content) {
                    tracing::debug!(path = %path.display(), "content unchanged, skipping");
                } else {
                    out.push(NetChange::Update {
                        path: path.clone(),
                        content: content.clone(),
                    });
                }
            }
            NetChange::Move { from, to, content } => {
                if tracked(identity, from) {
                    out.push(change.clone());
                } else if tracked(identity, to) {
                    tracing::warn!(from = %from.display(), to = %to.display(), "move already applied");
                    if let Some(content) = content.as_ref().filter(|c| !unchanged(identity, to, c)) {
                        out.push(NetChange::Update {
                            path: to.clone(),
                            content: content.clone(),
                        });
                    }
                } else {
                    tracing::warn!(from = %from.display(), "move source is untracked, creating target");
                    out.push(NetChange::Create {
                        path: to.clone(),
                        content: content.clone().unwrap_or_default(),
                    });
                }
            }
            NetChange::Delete { path } => {
                if tracked(identity, path) {
                    out.push(change.clone());
                } else {
                    tracing::warn!(path = %path.display(), "delete of an untracked page, skipping");
                }
            }
        }
    }
    out
}

fn title_of(path: &Path) -> Result<String, PlanningConflictError> {
    title_for_path(path).ok_or_else(|| PlanningConflictError::EmptyTitle {
        path: path.to_path_buf(),
    })
}

/// Sibling slot a page occupies: parent path plus case-folded title.
fn slot(path: &Path) -> Option<(Option<PathBuf>, String)> {
    Some((parent_of(path), title_key(&title_for_path(path)?)))
}

/// Compute the operation plan for `changes` against the current tree and
/// identity snapshot.
pub fn plan(
    changes: &[NetChange],
    tree: &PathTree,
    identity: &PageIdentityMap,
) -> Result<OperationPlan, PlanningConflictError> {
    let changes = normalize(changes, identity);

    // At most one change may claim a final path.
    let mut claimed: BTreeMap<&Path, &Path> = BTreeMap::new();
    for change in &changes {
        let (target, source) = match change {
            NetChange::Delete { .. } => continue,
            NetChange::Move { from, to, .. } => (to.as_path(), from.as_path()),
            other => (other.final_path(), other.final_path()),
        };
        if let Some(first) = claimed.insert(target, source) {
            return Err(PlanningConflictError::TargetCollision {
                target: target.to_path_buf(),
                first: first.to_path_buf(),
                second: source.to_path_buf(),
            });
        }
    }

    // A move or create may not land on a tracked page that stays put.
    let vacated: BTreeSet<&Path> = changes
        .iter()
        .filter_map(|c| match c {
            NetChange::Delete { path } => Some(path.as_path()),
            NetChange::Move { from, .. } => Some(from.as_path()),
            _ => None,
        })
        .collect();
    for change in &changes {
        let (target, source) = match change {
            NetChange::Move { from, to, .. } => (to, from),
            NetChange::Create { path, .. } => (path, path),
            _ => continue,
        };
        if tracked(identity, target) && !vacated.contains(target.as_path()) {
            return Err(PlanningConflictError::TargetCollision {
                target: target.clone(),
                first: target.clone(),
                second: source.clone(),
            });
        }
    }

    let next = tree.reconcile(&changes)?;

    let mut creates: BTreeMap<PathBuf, Operation> = BTreeMap::new();
    let mut moves: Vec<Operation> = Vec::new();
    let mut updates: Vec<Operation> = Vec::new();
    let mut deletes: Vec<Operation> = Vec::new();

    for change in &changes {
        match change {
            NetChange::Create { path, content } => {
                creates.insert(
                    path.clone(),
                    Operation::CreatePage {
                        path: path.clone(),
                        title: title_of(path)?,
                        parent: parent_of(path),
                        kind: PageKind::Leaf,
                        content: Some(content.clone()),
                    },
                );
            }
            NetChange::Update { path, content } => updates.push(Operation::UpdatePage {
                path: path.clone(),
                title: title_of(path)?,
                content: content.clone(),
            }),
            NetChange::Move { from, to, content } => moves.push(Operation::MovePage {
                from: from.clone(),
                to: to.clone(),
                title: title_of(to)?,
                parent: parent_of(to),
                content: content.clone(),
            }),
            NetChange::Delete { path } => {
                if let Some(id) = identity.remote_id(path) {
                    deletes.push(Operation::DeletePage {
                        path: path.clone(),
                        title: title_of(path)?,
                        remote_id: id.clone(),
                    });
                }
            }
        }
    }

    // Containers every new or moved page needs.
    let targets: Vec<PathBuf> = creates
        .keys()
        .cloned()
        .chain(moves.iter().map(|m| m.path().to_path_buf()))
        .collect();
    for target in &targets {
        for ancestor in ancestors_of(target) {
            if tracked(identity, &ancestor) || creates.contains_key(&ancestor) {
                continue;
            }
            tracing::debug!(path = %ancestor.display(), "synthesising container page");
            creates.insert(
                ancestor.clone(),
                Operation::CreatePage {
                    title: title_of(&ancestor)?,
                    parent: parent_of(&ancestor),
                    path: ancestor,
                    kind: PageKind::Container,
                    content: None,
                },
            );
        }
    }

    // Containers left without children.
    for record in identity.records() {
        if record.kind != PageKind::Container || next.contains(&record.path) {
            continue;
        }
        if let Some(id) = record.remote_id.as_ref() {
            tracing::debug!(path = %record.path.display(), "container is empty, deleting");
            deletes.push(Operation::DeletePage {
                path: record.path.clone(),
                title: title_of(&record.path)?,
                remote_id: id.clone(),
            });
        }
    }

    check_titles_released(&creates, &moves, &deletes)?;

    let mut creates: Vec<Operation> = creates.into_values().collect();
    creates.sort_by(|a, b| {
        path_depth(a.path())
            .cmp(&path_depth(b.path()))
            .then_with(|| a.path().cmp(b.path()))
    });
    let moves = order_moves(moves)?;
    updates.sort_by(|a, b| a.path().cmp(b.path()));
    deletes.sort_by(|a, b| {
        path_depth(b.path())
            .cmp(&path_depth(a.path()))
            .then_with(|| a.path().cmp(b.path()))
    });

    let mut operations = creates;
    operations.extend(moves);
    operations.extend(updates);
    operations.extend(deletes);
    tracing::debug!(operations = operations.len(), "planned delta");
    Ok(OperationPlan { operations })
}

/// Creates run first and moves before deletes, so a create may not take a
/// title that a moving or deleted page still holds at that point, and a
/// move may not take a title a deleted page still holds.
fn check_titles_released(
    creates: &BTreeMap<PathBuf, Operation>,
    moves: &[Operation],
    deletes: &[Operation],
) -> Result<(), PlanningConflictError> {
    let mut deleted_slots = BTreeMap::new();
    for op in deletes {
        if let Some(s) = slot(op.path()) {
            deleted_slots.insert(s, op.path().to_path_buf());
        }
    }
    let mut move_sources = BTreeMap::new();
    for op in moves {
        if let Operation::MovePage { from, .. } = op {
            if let Some(s) = slot(from) {
                move_sources.insert(s, from.clone());
            }
        }
    }

    for path in creates.keys() {
        let Some(s) = slot(path) else { continue };
        if let Some(deleted) = deleted_slots.get(&s) {
            return Err(PlanningConflictError::TitleHeldByDelete {
                path: path.clone(),
                deleted: deleted.clone(),
            });
        }
        if let Some(moving) = move_sources.get(&s) {
            return Err(PlanningConflictError::TitleHeldByMove {
                path: path.clone(),
                moving: moving.clone(),
            });
        }
    }
    for op in moves {
        let Some(s) = slot(op.path()) else { continue };
        if let Some(deleted) = deleted_slots.get(&s) {
            return Err(PlanningConflictError::TitleHeldByDelete {
                path: op.path().to_path_buf(),
                deleted: deleted.clone(),
            });
        }
    }
    Ok(())
}

/// Kahn's algorithm over two dependencies: a move waits for the move that
/// vacates its target title, and for the move that brings in its new
/// parent. Ties are broken by target path.
fn order_moves(moves: Vec<Operation>) -> Result<Vec<Operation>, PlanningConflictError> {
    let n = moves.len();
    let mut source_slot: BTreeMap<(Option<PathBuf>, String), usize> = BTreeMap::new();
    let mut target_index: BTreeMap<PathBuf, usize> = BTreeMap::new();
    for (i, op) in moves.iter().enumerate() {
        if let Operation::MovePage { from, to, .. } = op {
            if let Some(s) = slot(from) {
                source_slot.insert(s, i);
            }
            target_index.insert(to.clone(), i);
        }
    }

    let mut blocked_by: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (i, op) in moves.iter().enumerate() {
        if let Some(&j) = slot(op.path()).and_then(|s| source_slot.get(&s)) {
            if j != i {
                blocked_by[i].insert(j);
            }
        }
        if let Some(&j) = parent_of(op.path()).and_then(|p| target_index.get(&p)) {
            if j != i {
                blocked_by[i].insert(j);
            }
        }
    }

    let mut ready: BTreeSet<(PathBuf, usize)> = (0..n)
        .filter(|&i| blocked_by[i].is_empty())
        .map(|i| (moves[i].path().to_path_buf(), i))
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        let done = next.1;
        order.push(done);
        for (i, deps) in blocked_by.iter_mut().enumerate() {
            if deps.remove(&done) && deps.is_empty() {
                ready.insert((moves[i].path().to_path_buf(), i));
            }
        }
    }

    if order.len() < n {
        let mut paths: Vec<PathBuf> = (0..n)
            .filter(|i| !order.contains(i))
            .map(|i| moves[i].path().to_path_buf())
            .collect();
        paths.sort();
        return Err(PlanningConflictError::MoveCycle { paths });
    }

    let mut slots: Vec<Option<Operation>> = moves.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_with(leaves: &[&str]) -> PageIdentityMap {
        let mut identity = PageIdentityMap::new("DOCS").with_root("1");
        let mut next = 10;
        for leaf in leaves {
            let leaf = Path::new(leaf);
            for ancestor in ancestors_of(leaf) {
                if !identity.contains(&ancestor) {
                    next += 1;
                    identity.record_created(&ancestor, PageKind::Container, PageId(next.to_string()), None, None);
                }
            }
            next += 1;
            identity.record_created(leaf, PageKind::Leaf, PageId(next.to_string()), None, Some(fingerprint("old")));
        }
        identity
    }

    fn plan_for(changes: &[NetChange], identity: &PageIdentityMap) -> Result<OperationPlan, PlanningConflictError> {
        let tree = PathTree::from_identity(identity).unwrap();
        plan(changes, &tree, identity)
    }

    fn summary(plan: &OperationPlan) -> Vec<String> {
        plan.iter().map(|op| op.to_string()).collect()
    }

    #[test]
    fn new_leaf_creates_its_container_first() {
        let identity = identity_with(&[]);
        let plan = plan_for(
            &[NetChange::Create { path: "docs/Welcome.md".into(), content: "# Hi".into() }],
            &identity,
        )
        .unwrap();
        assert_eq!(summary(&plan), ["create docs", "create docs/Welcome.md"]);
        assert!(matches!(
            &plan.operations()[0],
            Operation::CreatePage { title, parent: None, kind: PageKind::Container, .. } if title == "docs"
        ));
        plan.validate().unwrap();
    }

    #[test]
    fn shared_ancestor_is_planned_once() {
        let identity = identity_with(&[]);
        let plan = plan_for(
            &[
                NetChange::Create { path: "a/b/x.md".into(), content: "x".into() },
                NetChange::Create { path: "a/b/y.md".into(), content: "y".into() },
                NetChange::Create { path: "a/z.md".into(), content: "z".into() },
            ],
            &identity,
        )
        .unwrap();
        assert_eq!(
            summary(&plan),
            ["create a", "create a/b", "create a/z.md", "create a/b/x.md", "create a/b/y.md"]
        );
    }

    #[test]
    fn replayed_create_with_same_content_is_dropped() {
        let identity = identity_with(&["a.md"]);
        let plan = plan_for(&[NetChange::Create { path: "a.md".into(), content: "old".into() }], &identity).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn emptied_container_is_deleted_after_its_children() {
        let identity = identity_with(&["docs/a.md", "docs/sub/b.md"]);
        let plan = plan_for(
            &[
                NetChange::Delete { path: "docs/a.md".into() },
                NetChange::Delete { path: "docs/sub/b.md".into() },
            ],
            &identity,
        )
        .unwrap();
        assert_eq!(
            summary(&plan),
            ["delete docs/sub/b.md", "delete docs/a.md", "delete docs/sub", "delete docs"]
        );
        plan.validate().unwrap();
    }

    #[test]
    fn swapping_two_pages_is_a_cycle() {
        let identity = identity_with(&["d/a.md", "d/b.md"]);
        let err = plan_for(
            &[
                NetChange::Move { from: "d/a.md".into(), to: "d/b.md".into(), content: None },
                NetChange::Move { from: "d/b.md".into(), to: "d/a.md".into(), content: None },
            ],
            &identity,
        )
        .unwrap_err();
        assert!(matches!(err, PlanningConflictError::MoveCycle { .. }), "got: {err:?}");
    }

    #[test]
    fn chained_moves_vacate_before_occupying() {
        let identity = identity_with(&["d/a.md", "d/b.md"]);
        let plan = plan_for(
            &[
                NetChange::Move { from: "d/a.md".into(), to: "d/b.md".into(), content: None },
                NetChange::Move { from: "d/b.md".into(), to: "d/c.md".into(), content: None },
            ],
            &identity,
        )
        .unwrap();
        assert_eq!(summary(&plan), ["move d/b.md -> d/c.md", "move d/a.md -> d/b.md"]);
    }

    #[test]
    fn move_onto_a_page_that_stays_is_a_collision() {
        let identity = identity_with(&["a.md", "b.md"]);
        let err = plan_for(
            &[NetChange::Move { from: "a.md".into(), to: "b.md".into(), content: None }],
            &identity,
        )
        .unwrap_err();
        assert!(matches!(err, PlanningConflictError::TargetCollision { .. }), "got: {err:?}");
    }

    #[test]
    fn create_taking_a_deleted_title_is_rejected() {
        let identity = identity_with(&["d/plan.md"]);
        let err = plan_for(
            &[
                NetChange::Delete { path: "d/plan.md".into() },
                NetChange::Create { path: "d/Plan.md".into(), content: "x".into() },
            ],
            &identity,
        )
        .unwrap_err();
        assert!(matches!(err, PlanningConflictError::TitleHeldByDelete { .. }), "got: {err:?}");
    }

    #[test]
    fn validate_rejects_child_created_before_parent() {
        let plan = OperationPlan::from_operations(vec![
            Operation::CreatePage {
                path: "d/a.md".into(),
                title: "a".into(),
                parent: Some("d".into()),
                kind: PageKind::Leaf,
                content: Some(String::new()),
            },
            Operation::CreatePage {
                path: "d".into(),
                title: "d".into(),
                parent: None,
                kind: PageKind::Container,
                content: None,
            },
        ]);
        assert!(matches!(plan.validate(), Err(DeltaError::InvalidPlan { index: 0, .. })));
    }

    #[test]
    fn validate_rejects_parent_deleted_first() {
        let plan = OperationPlan::from_operations(vec![
            Operation::DeletePage { path: "d".into(), title: "d".into(), remote_id: PageId::from("1") },
            Operation::DeletePage { path: "d/a.md".into(), title: "a".into(), remote_id: PageId::from("2") },
        ]);
        assert!(matches!(plan.validate(), Err(DeltaError::InvalidPlan { index: 0, .. })));
    }
}

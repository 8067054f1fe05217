//! The version-control collaborator and path filtering.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use junction_core::types::is_markdown;
use junction_core::{Modification, ModificationKind};

use crate::error::DeltaError;

/// An opaque commit identifier (a hash for git).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitRef(pub String);

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitRef {
    fn from(s: &str) -> Self {
        CommitRef(s.to_string())
    }
}

/// Where modifications come from.
///
/// Implementations must list commits oldest first and report each commit's
/// modifications in a deterministic order.
pub trait VersionControlSource {
    /// Commits after `start` up to and including `end`.
    fn commits_between(&self, start: &str, end: &str) -> Result<Vec<CommitRef>, DeltaError>;

    /// Modifications made by `commit` under `root`, with paths relative to
    /// `root`.
    fn modifications(&self, commit: &CommitRef, root: &Path) -> Result<Vec<Modification>, DeltaError>;
}

/// Path relative to `root` when it is a markdown file below it.
fn in_scope(path: &Path, root: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() || !is_markdown(relative) {
        return None;
    }
    Some(relative.to_path_buf())
}

/// Keep modifications of markdown files below `root`, rewriting their paths
/// relative to it.
///
/// A rename that crosses the boundary becomes a delete (moved out) or an
/// add (moved in).
pub fn filter_to_root(modifications: Vec<Modification>, root: &Path) -> Vec<Modification> {
    let mut out = Vec::with_capacity(modifications.len());
    for m in modifications {
        let old = m.old_path.as_deref().and_then(|p| in_scope(p, root));
        let new = m.new_path.as_deref().and_then(|p| in_scope(p, root));
        let filtered = match (m.kind, old, new) {
            (ModificationKind::Added | ModificationKind::Modified, _, Some(new)) => Modification {
                new_path: Some(new),
                ..m
            },
            (ModificationKind::Deleted, Some(old), _) => Modification {
                old_path: Some(old),
                ..m
            },
            (ModificationKind::Renamed, Some(old), Some(new)) => Modification::renamed(old, new, m.content),
            (ModificationKind::Renamed, Some(old), None) => Modification::deleted(old),
            (ModificationKind::Renamed, None, Some(new)) => {
                Modification::added(new, m.content.unwrap_or_default())
            }
            _ => continue,
        };
        out.push(filtered);
    }
    out
}

//! Page identity map: repository path → remote page identity.
//!
//! # Storage layout
//!
//! ```text
//! ~/.junction/
//!   spaces/
//!     <space_key>.json   (one snapshot per remote space)
//! ```
//!
//! The snapshot is the injected "current space state" for planning: the
//! delta engine reads it, the executor updates it as operations apply, and
//! the CLI persists it after every run (including failed ones) so the next
//! delta can resume from a partially-applied plan.
//!
//! # API pattern
//!
//! Persistence functions come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::types::{parent_of, title_key, PageId, PageKind, PageRecord, SpaceKey};

/// Current on-disk schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Versioned snapshot of every page this tool manages in one space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIdentityMap {
    #[serde(default = "default_version")]
    pub version: u32,
    pub space: SpaceKey,
    /// Incremented each time the snapshot is marked synced.
    #[serde(default)]
    pub revision: u64,
    /// Space homepage; parent of every top-level page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<PageId>,
    /// Last commit whose modifications were fully applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    records: BTreeMap<PathBuf, PageRecord>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl PageIdentityMap {
    pub fn new(space: impl Into<SpaceKey>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            space: space.into(),
            revision: 0,
            root_id: None,
            synced_commit: None,
            synced_at: None,
            records: BTreeMap::new(),
        }
    }

    pub fn with_root(mut self, root_id: impl Into<PageId>) -> Self {
        self.root_id = Some(root_id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&PageRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Remote id of a tracked page, if it has been created.
    pub fn remote_id(&self, path: &Path) -> Option<&PageId> {
        self.records.get(path).and_then(|r| r.remote_id.as_ref())
    }

    /// Remote id of the page a page at `path` should live under: the parent
    /// container's id, or the space homepage for top-level pages.
    pub fn parent_remote_id(&self, path: &Path) -> Option<&PageId> {
        match parent_of(path) {
            Some(parent) => self.remote_id(&parent),
            None => self.root_id.as_ref(),
        }
    }

    /// All records in path order.
    pub fn records(&self) -> impl Iterator<Item = &PageRecord> {
        self.records.values()
    }

    /// Paths of tracked content (leaf) pages, in path order.
    pub fn leaf_paths(&self) -> impl Iterator<Item = &Path> {
        self.records
            .values()
            .filter(|r| r.kind == PageKind::Leaf)
            .map(|r| r.path.as_path())
    }

    pub fn insert(&mut self, record: PageRecord) -> Option<PageRecord> {
        self.records.insert(record.path.clone(), record)
    }

    pub fn remove(&mut self, path: &Path) -> Option<PageRecord> {
        self.records.remove(path)
    }

    /// Record a page that was just created remotely.
    pub fn record_created(
        &mut self,
        path: &Path,
        kind: PageKind,
        remote_id: PageId,
        parent_remote_id: Option<PageId>,
        content_fingerprint: Option<String>,
    ) {
        self.records.insert(
            path.to_path_buf(),
            PageRecord {
                path: path.to_path_buf(),
                kind,
                remote_id: Some(remote_id),
                parent_remote_id,
                content_fingerprint,
            },
        );
    }

    pub fn set_fingerprint(&mut self, path: &Path, fingerprint: Option<String>) {
        if let Some(record) = self.records.get_mut(path) {
            record.content_fingerprint = fingerprint;
        }
    }

    /// Re-key a record after a move. The remote id is preserved.
    ///
    /// Returns `false` when `from` is not tracked.
    pub fn rename(&mut self, from: &Path, to: &Path, parent_remote_id: Option<PageId>) -> bool {
        let Some(mut record) = self.records.remove(from) else {
            return false;
        };
        record.path = to.to_path_buf();
        record.parent_remote_id = parent_remote_id;
        self.records.insert(to.to_path_buf(), record);
        true
    }

    /// Look up a page's remote id by title (case-insensitive).
    ///
    /// When several tracked pages share a title the first in path order wins.
    pub fn resolve_title(&self, title: &str) -> Option<&PageId> {
        let wanted = title_key(title);
        self.records
            .values()
            .filter(|r| r.remote_id.is_some())
            .find(|r| r.title().is_some_and(|t| title_key(&t) == wanted))
            .and_then(|r| r.remote_id.as_ref())
    }

    /// Advance the sync cursor after a run.
    pub fn mark_synced(&mut self, commit: Option<String>) {
        self.revision += 1;
        if commit.is_some() {
            self.synced_commit = commit;
        }
        self.synced_at = Some(Utc::now());
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// `<home>/.junction/spaces/<space>.json`. Pure, no I/O.
pub fn store_path_at(home: &Path, space: &SpaceKey) -> PathBuf {
    home.join(".junction")
        .join("spaces")
        .join(format!("{}.json", space.0))
}

/// Load the identity snapshot for `space`.
///
/// Returns an empty map if the snapshot does not yet exist.
pub fn load_at(home: &Path, space: &SpaceKey) -> Result<PageIdentityMap, CoreError> {
    let path = store_path_at(home, space);
    if !path.exists() {
        return Ok(PageIdentityMap::new(space.clone()));
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_json::from_str(&contents).map_err(|source| CoreError::IdentityParse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load(space: &SpaceKey) -> Result<PageIdentityMap, CoreError> {
    load_at(&home()?, space)
}

/// Save the identity snapshot atomically.
///
/// Writes to `<path>.tmp` then renames to `<path>`.
pub fn save_at(home: &Path, identity: &PageIdentityMap) -> Result<(), CoreError> {
    let path = store_path_at(home, &identity.space);
    let Some(dir) = path.parent() else {
        return Err(io_err(
            path,
            std::io::Error::other("invalid identity snapshot path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(identity)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(identity: &PageIdentityMap) -> Result<(), CoreError> {
    save_at(&home()?, identity)
}

fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(path: &str, kind: PageKind, id: &str) -> PageRecord {
        PageRecord {
            path: PathBuf::from(path),
            kind,
            remote_id: Some(PageId::from(id)),
            parent_remote_id: None,
            content_fingerprint: None,
        }
    }

    #[test]
    fn rename_keeps_remote_id() {
        let mut map = PageIdentityMap::new("DOCS");
        map.insert(tracked("docs/Old.md", PageKind::Leaf, "42"));
        assert!(map.rename(Path::new("docs/Old.md"), Path::new("docs/New.md"), None));
        assert!(!map.contains(Path::new("docs/Old.md")));
        assert_eq!(
            map.remote_id(Path::new("docs/New.md")),
            Some(&PageId::from("42"))
        );
        assert_eq!(
            map.get(Path::new("docs/New.md")).map(|r| r.path.clone()),
            Some(PathBuf::from("docs/New.md"))
        );
    }

    #[test]
    fn rename_of_untracked_path_is_rejected() {
        let mut map = PageIdentityMap::new("DOCS");
        assert!(!map.rename(Path::new("a.md"), Path::new("b.md"), None));
    }

    #[test]
    fn resolve_title_is_case_insensitive() {
        let mut map = PageIdentityMap::new("DOCS");
        map.insert(tracked("docs/Other Page.md", PageKind::Leaf, "7"));
        assert_eq!(map.resolve_title("other page"), Some(&PageId::from("7")));
        assert_eq!(map.resolve_title("missing"), None);
    }

    #[test]
    fn resolve_title_skips_pages_without_remote_id() {
        let mut map = PageIdentityMap::new("DOCS");
        map.insert(PageRecord::new("Draft.md", PageKind::Leaf));
        assert_eq!(map.resolve_title("Draft"), None);
    }

    #[test]
    fn parent_remote_id_falls_back_to_root() {
        let mut map = PageIdentityMap::new("DOCS").with_root("1");
        map.insert(tracked("docs", PageKind::Container, "2"));
        assert_eq!(map.parent_remote_id(Path::new("top.md")), Some(&PageId::from("1")));
        assert_eq!(
            map.parent_remote_id(Path::new("docs/a.md")),
            Some(&PageId::from("2"))
        );
        assert_eq!(map.parent_remote_id(Path::new("other/a.md")), None);
    }

    #[test]
    fn leaf_paths_exclude_containers() {
        let mut map = PageIdentityMap::new("DOCS");
        map.insert(tracked("docs", PageKind::Container, "2"));
        map.insert(tracked("docs/a.md", PageKind::Leaf, "3"));
        let leaves: Vec<_> = map.leaf_paths().collect();
        assert_eq!(leaves, vec![Path::new("docs/a.md")]);
    }

    #[test]
    fn mark_synced_advances_revision_and_keeps_cursor_on_none() {
        let mut map = PageIdentityMap::new("DOCS");
        map.mark_synced(Some("abc".to_string()));
        map.mark_synced(None);
        assert_eq!(map.revision, 2);
        assert_eq!(map.synced_commit.as_deref(), Some("abc"));
        assert!(map.synced_at.is_some());
    }
}

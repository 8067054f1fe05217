//! Domain types shared by the delta engine, the markup converter and the CLI.
//!
//! All path fields use `PathBuf` relative to the content root; never `&str`
//! or `String` for repository paths.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// File extension of content (leaf) pages.
pub const MARKDOWN_EXTENSION: &str = "md";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identity of a page in the remote space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub String);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Key of a remote space (e.g. `DOCS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceKey(pub String);

impl fmt::Display for SpaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SpaceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SpaceKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Modifications (produced per commit by the version-control collaborator)
// ---------------------------------------------------------------------------

/// What happened to a file in a single commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModificationKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for ModificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModificationKind::Added => write!(f, "added"),
            ModificationKind::Modified => write!(f, "modified"),
            ModificationKind::Deleted => write!(f, "deleted"),
            ModificationKind::Renamed => write!(f, "renamed"),
        }
    }
}

/// A raw per-commit file modification.
///
/// `Renamed` carries both paths; `content` is present for added, modified
/// and the new side of renamed files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub kind: ModificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Modification {
    pub fn added(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: ModificationKind::Added,
            old_path: None,
            new_path: Some(path.into()),
            content: Some(content.into()),
        }
    }

    pub fn modified(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            kind: ModificationKind::Modified,
            old_path: None,
            new_path: Some(path.into()),
            content: Some(content.into()),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ModificationKind::Deleted,
            old_path: Some(path.into()),
            new_path: None,
            content: None,
        }
    }

    pub fn renamed(
        old_path: impl Into<PathBuf>,
        new_path: impl Into<PathBuf>,
        content: Option<String>,
    ) -> Self {
        Self {
            kind: ModificationKind::Renamed,
            old_path: Some(old_path.into()),
            new_path: Some(new_path.into()),
            content,
        }
    }

    /// The path the file lives at after this modification (or the removed
    /// path for deletes).
    pub fn path(&self) -> Option<&Path> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Net changes (folded outcome of a commit range)
// ---------------------------------------------------------------------------

/// The folded, per-path outcome of replaying a commit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum NetChange {
    Create { path: PathBuf, content: String },
    Update { path: PathBuf, content: String },
    /// Identity-preserving move; `content` is set when the body changed too.
    Move {
        from: PathBuf,
        to: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Delete { path: PathBuf },
}

impl NetChange {
    /// The path this change leaves behind (the removed path for deletes).
    pub fn final_path(&self) -> &Path {
        match self {
            NetChange::Create { path, .. }
            | NetChange::Update { path, .. }
            | NetChange::Delete { path } => path,
            NetChange::Move { to, .. } => to,
        }
    }

    /// Express this change as a single modification so that net change sets
    /// can be folded again.
    pub fn to_modification(&self) -> Modification {
        match self {
            NetChange::Create { path, content } => Modification::added(path.clone(), content.clone()),
            NetChange::Update { path, content } => {
                Modification::modified(path.clone(), content.clone())
            }
            NetChange::Move { from, to, content } => {
                Modification::renamed(from.clone(), to.clone(), content.clone())
            }
            NetChange::Delete { path } => Modification::deleted(path.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Directory-derived container page vs. file-derived content page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Container,
    #[default]
    Leaf,
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageKind::Container => write!(f, "container"),
            PageKind::Leaf => write!(f, "leaf"),
        }
    }
}

/// One tracked page in the identity map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub path: PathBuf,
    #[serde(default)]
    pub kind: PageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<PageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_remote_id: Option<PageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_fingerprint: Option<String>,
}

impl PageRecord {
    pub fn new(path: impl Into<PathBuf>, kind: PageKind) -> Self {
        Self {
            path: path.into(),
            kind,
            remote_id: None,
            parent_remote_id: None,
            content_fingerprint: None,
        }
    }

    pub fn title(&self) -> Option<String> {
        title_for_path(&self.path)
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Page title for a repository path: the file stem of a `.md` file, or the
/// directory name of a container.
///
/// Returns `None` when the title would be empty.
pub fn title_for_path(path: &Path) -> Option<String> {
    let title = match markdown_stem(path) {
        Some(stem) => stem,
        None => path.file_name()?.to_string_lossy().into_owned(),
    };
    let title = title.trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Case-insensitive comparison key for titles.
pub fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

/// A bare `.md` counts too: it is a markdown file with an empty title.
pub fn is_markdown(path: &Path) -> bool {
    markdown_stem(path).is_some()
}

/// File name without the markdown extension, `None` for other files.
fn markdown_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    let stem = name.strip_suffix(MARKDOWN_EXTENSION)?.strip_suffix('.')?;
    Some(stem.to_string())
}

/// Number of components in a relative path (`docs/a.md` → 2).
pub fn path_depth(path: &Path) -> usize {
    path.components().count()
}

/// Proper ancestors of `path`, nearest root first, excluding the root itself.
///
/// `docs/guide/a.md` → `[docs, docs/guide]`.
pub fn ancestors_of(path: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = path
        .ancestors()
        .skip(1)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();
    out.reverse();
    out
}

/// Parent container path, `None` for pages directly under the space root.
pub fn parent_of(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Normalise line endings to LF; content is hashed and rendered in this form.
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

/// SHA-256 hex digest of the LF-normalised content.
pub fn fingerprint(content: &str) -> String {
    let normalized = normalize_line_endings(content);
    let mut h = Sha256::new();
    h.update(normalized.as_bytes());
    hex::encode(h.finalize())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

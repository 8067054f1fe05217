//! Error types for junction-delta.

use std::path::PathBuf;

use thiserror::Error;

use junction_core::CoreError;
use junction_markup::MarkupError;

use crate::remote::TransportError;

/// Conflicts detected while planning. Always raised before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningConflictError {
    /// Two siblings would end up with the same (case-insensitive) title.
    #[error("duplicate title '{title}' under {}: {first} and {second}", display_parent(.parent))]
    DuplicateTitle {
        parent: Option<PathBuf>,
        title: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A path that cannot be given a title (empty stem, bare extension).
    #[error("cannot derive a page title from {path}")]
    EmptyTitle { path: PathBuf },

    /// Two changes claim the same final path.
    #[error("{target} is the target of more than one change ({first} and {second})")]
    TargetCollision {
        target: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// Moves that can only be ordered by passing through an invalid state.
    #[error("move cycle between: {}", format_paths(.paths))]
    MoveCycle { paths: Vec<PathBuf> },

    /// A new or moved page takes a title that a page deleted in the same
    /// plan still holds when the page is created or moved.
    #[error("{path} takes the title of {deleted}, which is only deleted later in the plan")]
    TitleHeldByDelete { path: PathBuf, deleted: PathBuf },

    /// A new page takes the title of a page that only moves away later in
    /// the plan.
    #[error("{path} takes the title of {moving}, which only moves away later in the plan")]
    TitleHeldByMove { path: PathBuf, moving: PathBuf },

    /// The remote already has an untracked page with the title we want.
    #[error("page '{title}' for {path} already exists remotely but is not managed by junction")]
    UnmanagedPage { path: PathBuf, title: String },
}

/// A page whose cross-page references still point nowhere after the second
/// pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: unresolved page reference(s): {}", .titles.join(", "))]
pub struct UnresolvedReferenceError {
    pub path: PathBuf,
    pub titles: Vec<String>,
}

/// A transport failure, tagged with the plan position it happened at.
#[derive(Debug, Error)]
#[error("operation #{index} ({operation} {path}) failed: {source}")]
pub struct RemoteOperationError {
    pub index: usize,
    pub operation: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: TransportError,
}

/// All errors that can arise from planning and executing a delta.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("planning conflict: {0}")]
    PlanningConflict(#[from] PlanningConflictError),

    #[error("markup error: {0}")]
    Markup(#[from] MarkupError),

    #[error(transparent)]
    UnresolvedReference(#[from] UnresolvedReferenceError),

    #[error("remote operation failed: {0}")]
    RemoteOperation(#[from] RemoteOperationError),

    /// Identity snapshot or config failure.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// An operation plan that violates the ordering rules.
    #[error("invalid plan at operation #{index}: {reason}")]
    InvalidPlan { index: usize, reason: String },

    /// A non-dry-run apply was requested without a remote client.
    #[error("a remote client is required to apply a plan")]
    Offline,

    /// Version control collaborator failure.
    #[error("version control error: {message}")]
    Source {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DeltaError {
    pub(crate) fn invalid_plan(index: usize, reason: impl Into<String>) -> Self {
        DeltaError::InvalidPlan {
            index,
            reason: reason.into(),
        }
    }
}

fn display_parent(parent: &Option<PathBuf>) -> String {
    match parent {
        Some(p) => p.display().to_string(),
        None => "the space root".to_string(),
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

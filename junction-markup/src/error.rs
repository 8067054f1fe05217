//! Error types for junction-markup.

use std::path::PathBuf;

use thiserror::Error;

use crate::extensions::PanelKind;

/// Markdown that cannot be expressed in storage markup.
///
/// Every variant names the source document and the 1-based line of the
/// offending construct.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("{path}:{line}: unknown status color '{color}'")]
    UnknownStatusColor {
        path: PathBuf,
        line: usize,
        color: String,
    },

    #[error("{path}:{line}: malformed status macro: {reason}")]
    MalformedStatus {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A block macro token appearing inside other text.
    #[error("{path}:{line}: '{token}' must be on a line of its own")]
    MisplacedMacro {
        path: PathBuf,
        line: usize,
        token: String,
    },

    #[error("{path}:{line}: {kind} panel spans more than one paragraph")]
    MultiParagraphPanel {
        path: PathBuf,
        line: usize,
        kind: PanelKind,
    },

    #[error("{path}:{line}: {kind} panel has no body")]
    EmptyPanel {
        path: PathBuf,
        line: usize,
        kind: PanelKind,
    },
}

impl MarkupError {
    /// Source document the error was raised for.
    pub fn path(&self) -> &std::path::Path {
        match self {
            MarkupError::UnknownStatusColor { path, .. }
            | MarkupError::MalformedStatus { path, .. }
            | MarkupError::MisplacedMacro { path, .. }
            | MarkupError::MultiParagraphPanel { path, .. }
            | MarkupError::EmptyPanel { path, .. } => path,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            MarkupError::UnknownStatusColor { line, .. }
            | MarkupError::MalformedStatus { line, .. }
            | MarkupError::MisplacedMacro { line, .. }
            | MarkupError::MultiParagraphPanel { line, .. }
            | MarkupError::EmptyPanel { line, .. } => *line,
        }
    }
}

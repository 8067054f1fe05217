//! Error types for junction-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from identity persistence and config loading.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, with the path that was being accessed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (identity snapshot save path).
    #[error("identity JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Identity snapshot could not be parsed on load.
    #[error("failed to parse identity snapshot at {path}: {source}")]
    IdentityParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// `.junction.yaml` could not be parsed.
    #[error("failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`, so `~/.junction/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}

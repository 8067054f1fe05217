//! Repository-level configuration (`.junction.yaml` at the git root).
//!
//! Every field is optional; command-line flags override whatever the file
//! provides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

pub const CONFIG_FILE_NAME: &str = ".junction.yaml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JunctionConfig {
    /// Key of the remote space to publish into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space: Option<String>,
    /// Base URL of the remote REST API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Directory (relative to the repository root) holding the markdown tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// `<repo_root>/.junction.yaml`. Pure, no I/O.
pub fn config_path_at(repo_root: &Path) -> PathBuf {
    repo_root.join(CONFIG_FILE_NAME)
}

/// Load `.junction.yaml`, or defaults when the file does not exist.
pub fn load_at(repo_root: &Path) -> Result<JunctionConfig, CoreError> {
    let path = config_path_at(repo_root);
    if !path.exists() {
        return Ok(JunctionConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(JunctionConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| CoreError::ConfigParse { path, source })
}

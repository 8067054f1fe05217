//! `VersionControlSource` backed by the `git` command line.

use std::path::{Path, PathBuf};
use std::process::Command;

use junction_core::types::{is_markdown, normalize_line_endings};
use junction_core::Modification;
use junction_delta::{filter_to_root, order_for_replay, CommitRef, DeltaError, VersionControlSource};

pub struct GitHistory {
    toplevel: PathBuf,
}

fn source_err(message: impl Into<String>) -> DeltaError {
    DeltaError::Source {
        message: message.into(),
        source: None,
    }
}

impl GitHistory {
    /// Open the repository containing `dir`.
    pub fn discover(dir: &Path) -> Result<Self, DeltaError> {
        let out = run_git(dir, &["rev-parse", "--show-toplevel"])?;
        let toplevel = String::from_utf8_lossy(&out).trim().to_string();
        if toplevel.is_empty() {
            return Err(source_err(format!("{} is not inside a git repository", dir.display())));
        }
        Ok(Self {
            toplevel: PathBuf::from(toplevel),
        })
    }

    pub fn toplevel(&self) -> &Path {
        &self.toplevel
    }

    /// Full hash of `rev`, which must name a commit.
    pub fn resolve(&self, rev: &str) -> Result<String, DeltaError> {
        let spec = format!("{rev}^{{commit}}");
        let out = self.git(&["rev-parse", "--verify", "--quiet", &spec])?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn git(&self, args: &[&str]) -> Result<Vec<u8>, DeltaError> {
        run_git(&self.toplevel, args)
    }

    fn first_parent(&self, commit: &CommitRef) -> Result<Option<String>, DeltaError> {
        let out = self.git(&["rev-list", "--parents", "-n", "1", &commit.0])?;
        let line = String::from_utf8_lossy(&out);
        Ok(line.split_whitespace().nth(1).map(str::to_string))
    }

    fn show(&self, commit: &CommitRef, path: &Path) -> Result<String, DeltaError> {
        let object = format!("{}:{}", commit.0, git_path(path));
        let out = self.git(&["show", &object])?;
        let text = String::from_utf8(out)
            .map_err(|_| source_err(format!("{} at {commit} is not valid UTF-8", path.display())))?;
        Ok(normalize_line_endings(&text))
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<Vec<u8>, DeltaError> {
    tracing::debug!(?args, "git");
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "core.quotePath=false"])
        .args(args)
        .output()
        .map_err(|e| DeltaError::Source {
            message: "failed to run git".to_string(),
            source: Some(Box::new(e)),
        })?;
    if !output.status.success() {
        return Err(source_err(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

fn git_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

// ---------------------------------------------------------------------------
// diff-tree parsing
// ---------------------------------------------------------------------------

/// One entry of `git diff-tree --name-status -z`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RawChange {
    Added(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed {
        from: PathBuf,
        to: PathBuf,
        similarity: u8,
    },
}

fn parse_name_status(out: &[u8]) -> Result<Vec<RawChange>, DeltaError> {
    let mut fields = out
        .split(|b| *b == 0)
        .filter(|f| !f.is_empty())
        .map(|f| String::from_utf8_lossy(f).into_owned());
    let mut changes = Vec::new();
    while let Some(status) = fields.next() {
        let mut path = || {
            fields
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| source_err(format!("truncated diff-tree entry '{status}'")))
        };
        let change = match status.chars().next() {
            Some('A') => RawChange::Added(path()?),
            Some('M') | Some('T') => RawChange::Modified(path()?),
            Some('D') => RawChange::Deleted(path()?),
            Some('R') => RawChange::Renamed {
                from: path()?,
                to: path()?,
                similarity: status[1..].parse().unwrap_or(0),
            },
            // A copy leaves the source in place.
            Some('C') => {
                let _source = path()?;
                RawChange::Added(path()?)
            }
            _ => {
                tracing::warn!(status = %status, "skipping unsupported diff-tree status");
                path()?;
                continue;
            }
        };
        changes.push(change);
    }
    Ok(changes)
}

impl VersionControlSource for GitHistory {
    fn commits_between(&self, start: &str, end: &str) -> Result<Vec<CommitRef>, DeltaError> {
        let range = if start.is_empty() {
            end.to_string()
        } else {
            format!("{start}..{end}")
        };
        let out = self.git(&["rev-list", "--reverse", "--first-parent", &range])?;
        Ok(String::from_utf8_lossy(&out)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| CommitRef(l.trim().to_string()))
            .collect())
    }

    fn modifications(&self, commit: &CommitRef, root: &Path) -> Result<Vec<Modification>, DeltaError> {
        let mut args = vec!["diff-tree", "-r", "-M", "--name-status", "--no-commit-id", "-z"];
        let parent = self.first_parent(commit)?;
        match parent.as_deref() {
            Some(parent) => args.push(parent),
            None => args.push("--root"),
        }
        args.push(&commit.0);
        let raw = parse_name_status(&self.git(&args)?)?;

        let wanted = |p: &Path| p.starts_with(root) && is_markdown(p);
        let mut modifications = Vec::with_capacity(raw.len());
        for change in raw {
            let m = match change {
                RawChange::Added(p) if wanted(&p) => {
                    let content = self.show(commit, &p)?;
                    Modification::added(p, content)
                }
                RawChange::Modified(p) if wanted(&p) => {
                    let content = self.show(commit, &p)?;
                    Modification::modified(p, content)
                }
                RawChange::Deleted(p) if wanted(&p) => Modification::deleted(p),
                RawChange::Renamed { from, to, similarity } if wanted(&from) || wanted(&to) => {
                    // An identical rename inside the tree needs no body.
                    let content = if wanted(&to) && (similarity < 100 || !wanted(&from)) {
                        Some(self.show(commit, &to)?)
                    } else {
                        None
                    };
                    Modification::renamed(from, to, content)
                }
                _ => continue,
            };
            modifications.push(m);
        }

        let modifications = order_for_replay(filter_to_root(modifications, root));
        tracing::debug!(commit = %commit, count = modifications.len(), "read modifications");
        Ok(modifications)
    }
}

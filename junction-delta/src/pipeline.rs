//! Shared delta pipeline entrypoint: history → fold → plan → execute.

use std::path::Path;

use junction_core::{Modification, NetChange, PageIdentityMap};

use crate::executor::{ExecutionReport, Executor};
use crate::fold::fold;
use crate::path_tree::PathTree;
use crate::plan::{plan, OperationPlan};
use crate::remote::RemoteSpaceClient;
use crate::source::{CommitRef, VersionControlSource};
use crate::DeltaError;

/// Which part of the history to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRange {
    pub since: String,
    pub until: String,
}

/// Everything one run produced.
#[derive(Debug)]
pub struct DeltaRun {
    pub commits: Vec<CommitRef>,
    pub changes: Vec<NetChange>,
    pub plan: OperationPlan,
    pub report: ExecutionReport,
}

impl DeltaRun {
    pub fn last_commit(&self) -> Option<&CommitRef> {
        self.commits.last()
    }
}

/// Collect the modifications of every commit in `range`, oldest first.
pub fn collect_modifications(
    source: &dyn VersionControlSource,
    range: &DeltaRange,
    root: &Path,
) -> Result<(Vec<CommitRef>, Vec<Modification>), DeltaError> {
    let commits = source.commits_between(&range.since, &range.until)?;
    let mut modifications = Vec::new();
    for commit in &commits {
        let mods = source.modifications(commit, root)?;
        tracing::debug!(commit = %commit, modifications = mods.len(), "read commit");
        modifications.extend(mods);
    }
    Ok((commits, modifications))
}

/// Fold and plan without any remote effect.
pub fn plan_changes(changes: &[NetChange], identity: &PageIdentityMap) -> Result<OperationPlan, DeltaError> {
    let tree = PathTree::from_identity(identity)?;
    Ok(plan(changes, &tree, identity)?)
}

/// Run the whole pipeline for `range`.
///
/// With `client == None` only a dry run is possible. After a real run the
/// identity map's sync cursor advances to the last commit unless the plan
/// was aborted or a page failed to convert, so the next run replays the
/// same range. The caller persists the map either way; completed operations
/// are recognised and not repeated.
pub fn run(
    source: &dyn VersionControlSource,
    range: &DeltaRange,
    root: &Path,
    identity: &mut PageIdentityMap,
    client: Option<&mut dyn RemoteSpaceClient>,
    dry_run: bool,
) -> Result<DeltaRun, DeltaError> {
    let (commits, modifications) = collect_modifications(source, range, root)?;
    let changes = fold(&modifications);
    tracing::info!(
        commits = commits.len(),
        changes = changes.len(),
        "computed delta {}..{}",
        range.since,
        range.until
    );
    let plan = plan_changes(&changes, identity)?;

    let report = match client {
        Some(client) => Executor::new(identity, client).apply(&plan, dry_run)?,
        None => Executor::offline(identity).apply(&plan, dry_run)?,
    };

    if !dry_run && report.abort.is_none() && report.markup_errors.is_empty() {
        identity.mark_synced(commits.last().map(|c| c.0.clone()));
    }

    Ok(DeltaRun {
        commits,
        changes,
        plan,
        report,
    })
}

//! `junction delta`: replay a commit range onto the wiki.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use junction_core::types::{ancestors_of, title_for_path};
use junction_core::{config, identity, PageId, SpaceKey};
use junction_delta::pipeline::{self, DeltaRange, DeltaRun};
use junction_delta::{ExecutionReport, Operation, OperationOutcome, OperationReport, RemoteSpaceClient};

use crate::confluence::{ConfluenceClient, ConfluenceSettings};
use crate::git::GitHistory;

/// Arguments for `junction delta`.
#[derive(Args, Debug)]
pub struct DeltaArgs {
    /// Commit after which to start. Defaults to the last synced commit, or
    /// `HEAD^` for a space that was never synced.
    pub since: Option<String>,

    /// Last commit to apply. Defaults to `branch` from `.junction.yaml`, or
    /// `HEAD`.
    pub until: Option<String>,

    /// Key of the space to update.
    #[arg(long, short = 's')]
    pub space: Option<String>,

    /// Any path inside the git repository.
    #[arg(long, env = "GIT_DIR", default_value = ".")]
    pub git_dir: PathBuf,

    /// Directory (relative to the repository root) holding the markdown tree.
    #[arg(long)]
    pub content_path: Option<PathBuf>,

    /// Id of the page under which top-level pages are created.
    #[arg(long, value_name = "PAGE_ID")]
    pub parent_page: Option<String>,

    /// REST API base, e.g. https://<account>.atlassian.net/wiki/rest/api
    #[arg(long, short = 'c', env = "CONFLUENCE_API")]
    pub confluence_api: Option<String>,

    /// Login name for the API, usually the account e-mail.
    #[arg(long, short = 'u', env = "CONFLUENCE_API_USER")]
    pub user: Option<String>,

    /// API token.
    #[arg(long, short = 'p', env = "CONFLUENCE_API_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Print what would be done without calling the wiki.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl DeltaArgs {
    pub fn run(self) -> Result<()> {
        let history = GitHistory::discover(&self.git_dir)
            .context("junction must be run inside a git repository (see --git-dir)")?;
        let repo_config = config::load_at(history.toplevel())?;

        let space = self
            .space
            .clone()
            .or(repo_config.space.clone())
            .context("no space given; pass --space or set `space` in .junction.yaml")?;
        let space = SpaceKey::from(space);
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let mut pages = identity::load_at(&home, &space)
            .with_context(|| format!("failed to load page identities for space {space}"))?;
        if let Some(parent) = &self.parent_page {
            pages.root_id = Some(PageId::from(parent.as_str()));
        }

        let since = match self.since.clone().or(pages.synced_commit.clone()) {
            Some(rev) => rev,
            None => "HEAD^".to_string(),
        };
        let until = self
            .until
            .clone()
            .or(repo_config.branch.clone())
            .unwrap_or_else(|| "HEAD".to_string());
        let range = DeltaRange {
            since: history
                .resolve(&since)
                .with_context(|| format!("'{since}' is not a valid commit"))?,
            until: history
                .resolve(&until)
                .with_context(|| format!("'{until}' is not a valid commit"))?,
        };
        let content_root = self
            .content_path
            .clone()
            .or(repo_config.content_path.clone())
            .unwrap_or_default();

        let result = if self.dry_run {
            pipeline::run(&history, &range, &content_root, &mut pages, None, true)
        } else {
            let settings = self.settings(&space, &repo_config)?;
            let mut client = ConfluenceClient::new(settings);
            let result = pipeline::run(
                &history,
                &range,
                &content_root,
                &mut pages,
                Some(&mut client as &mut dyn RemoteSpaceClient),
                false,
            );
            // Completed operations must be remembered even when the plan
            // stopped part way.
            identity::save_at(&home, &pages)
                .with_context(|| format!("failed to save page identities for space {space}"))?;
            result
        };
        let run = result.with_context(|| format!("delta {since}..{until} failed"))?;

        if self.json {
            print_json(&run, &since, &until)?;
        } else {
            print_run(&run, &since, &until);
        }
        run.report.ensure_success()?;
        Ok(())
    }

    fn settings(&self, space: &SpaceKey, repo_config: &config::JunctionConfig) -> Result<ConfluenceSettings> {
        let Some(api_url) = self.confluence_api.clone().or(repo_config.api_url.clone()) else {
            bail!("no API URL; pass --confluence-api or set CONFLUENCE_API");
        };
        let Some(user) = self.user.clone().or(repo_config.user.clone()) else {
            bail!("no API user; pass --user or set CONFLUENCE_API_USER");
        };
        let key = self
            .key
            .clone()
            .context("no API key; pass --key or set CONFLUENCE_API_KEY")?;
        Ok(ConfluenceSettings {
            api_url,
            user,
            key,
            space: space.0.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// `docs / guide / Setup` for `docs/guide/Setup.md`.
fn title_chain(path: &Path, title: &str) -> String {
    let mut titles: Vec<String> = ancestors_of(path)
        .iter()
        .filter_map(|p| title_for_path(p))
        .collect();
    titles.push(title.to_string());
    titles.join(" / ")
}

/// Label and description of one planned operation.
fn describe(op: &Operation) -> (&'static str, String) {
    match op {
        Operation::CreatePage { path, title, .. } => ("CREATE", title_chain(path, title)),
        Operation::UpdatePage { path, title, .. } => ("UPDATE", title_chain(path, title)),
        Operation::MovePage { from, to, title, .. } => {
            let old = title_for_path(from).unwrap_or_default();
            ("MOVE", format!("{} -> {}", title_chain(from, &old), title_chain(to, title)))
        }
        Operation::DeletePage { path, title, .. } => ("DELETE", title_chain(path, title)),
    }
}

fn colored_label(label: &str) -> String {
    match label {
        "CREATE" => label.green().to_string(),
        "UPDATE" => label.yellow().to_string(),
        "MOVE" => label.blue().to_string(),
        "DELETE" => label.red().to_string(),
        other => other.magenta().to_string(),
    }
}

fn outcome_marker(outcome: &OperationOutcome) -> String {
    match outcome {
        OperationOutcome::Applied => "✓".green().to_string(),
        OperationOutcome::WouldApply => "~".cyan().to_string(),
        OperationOutcome::Failed(_) => "✗".red().to_string(),
        OperationOutcome::Skipped => "·".bright_black().to_string(),
    }
}

fn print_run(run: &DeltaRun, since: &str, until: &str) {
    let report = &run.report;
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}{since}..{until}: {} commits ({} changes)",
        run.commits.len(),
        run.plan.len().to_string().cyan()
    );
    if run.plan.is_empty() {
        println!("{prefix}✓ nothing to do");
    }
    for item in &report.operations {
        print_operation(item);
    }
    print_problems(report);

    if !report.dry_run {
        println!(
            "{} applied, {} failed, {} skipped, {} pages re-linked",
            report.applied(),
            report.failed(),
            report.skipped(),
            report.links_patched
        );
    }
}

fn print_operation(item: &OperationReport) {
    let (label, text) = describe(&item.operation);
    println!("  {} {} {}", outcome_marker(&item.outcome), colored_label(label), text);
    if let OperationOutcome::Failed(reason) = &item.outcome {
        println!("      {}", reason.red());
    }
}

fn print_problems(report: &ExecutionReport) {
    for err in &report.markup_errors {
        println!("  {} {err}", "markup:".red().bold());
    }
    for err in &report.unresolved {
        println!("  {} {err}", "link:".yellow().bold());
    }
    if let Some(abort) = &report.abort {
        println!("  {} {abort}", "aborted:".red().bold());
    }
}

#[derive(Serialize)]
struct DeltaJson<'a> {
    since: &'a str,
    until: &'a str,
    commits: Vec<&'a str>,
    dry_run: bool,
    operations: &'a [OperationReport],
    markup_errors: Vec<String>,
    unresolved: Vec<String>,
    links_patched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    aborted: Option<String>,
}

fn print_json(run: &DeltaRun, since: &str, until: &str) -> Result<()> {
    let report = &run.report;
    let payload = DeltaJson {
        since,
        until,
        commits: run.commits.iter().map(|c| c.0.as_str()).collect(),
        dry_run: report.dry_run,
        operations: &report.operations,
        markup_errors: report.markup_errors.iter().map(ToString::to_string).collect(),
        unresolved: report.unresolved.iter().map(ToString::to_string).collect(),
        links_patched: report.links_patched,
        aborted: report.abort.as_ref().map(ToString::to_string),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize delta JSON")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use junction_core::PageKind;

    #[test]
    fn create_is_described_with_its_title_chain() {
        let op = Operation::CreatePage {
            path: "docs/guide/Setup.md".into(),
            title: "Setup".into(),
            parent: Some("docs/guide".into()),
            kind: PageKind::Leaf,
            content: Some("# Setup".into()),
        };
        assert_eq!(describe(&op), ("CREATE", "docs / guide / Setup".to_string()));
    }

    #[test]
    fn move_shows_both_ends() {
        let op = Operation::MovePage {
            from: "docs/Old.md".into(),
            to: "archive/New.md".into(),
            title: "New".into(),
            parent: Some("archive".into()),
            content: None,
        };
        assert_eq!(describe(&op), ("MOVE", "docs / Old -> archive / New".to_string()));
    }
}

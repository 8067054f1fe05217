//! `junction status`: what junction tracks for a space.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use junction_core::{config, identity, PageIdentityMap, PageKind, PageRecord, SpaceKey};

/// Arguments for `junction status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Key of the space; defaults to `space` in `.junction.yaml`.
    #[arg(long, short = 's')]
    pub space: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let space = match self.space {
            Some(space) => space,
            None => {
                let cwd = std::env::current_dir().context("could not determine current directory")?;
                config::load_at(&cwd)?
                    .space
                    .context("no space given; pass --space or set `space` in .junction.yaml")?
            }
        };
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let pages = identity::load_at(&home, &SpaceKey::from(space.clone()))
            .with_context(|| format!("failed to load page identities for space {space}"))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&StatusJson::from(&pages))
                    .context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&pages);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    space: &'a str,
    revision: u64,
    root_id: Option<&'a str>,
    synced_commit: Option<&'a str>,
    synced_at: Option<String>,
    pages: Vec<&'a PageRecord>,
}

impl<'a> From<&'a PageIdentityMap> for StatusJson<'a> {
    fn from(pages: &'a PageIdentityMap) -> Self {
        Self {
            space: &pages.space.0,
            revision: pages.revision,
            root_id: pages.root_id.as_ref().map(|id| id.0.as_str()),
            synced_commit: pages.synced_commit.as_deref(),
            synced_at: pages.synced_at.map(|t| t.to_rfc3339()),
            pages: pages.records().collect(),
        }
    }
}

#[derive(Tabled)]
struct PageRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "kind")]
    kind: &'static str,
    #[tabled(rename = "page id")]
    remote_id: String,
    #[tabled(rename = "fingerprint")]
    fingerprint: String,
}

impl From<&PageRecord> for PageRow {
    fn from(record: &PageRecord) -> Self {
        Self {
            path: record.path.display().to_string(),
            kind: match record.kind {
                PageKind::Container => "dir",
                PageKind::Leaf => "page",
            },
            remote_id: record
                .remote_id
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string),
            fingerprint: record
                .content_fingerprint
                .as_deref()
                .map_or_else(|| "-".to_string(), |fp| fp.chars().take(12).collect()),
        }
    }
}

fn print_table(pages: &PageIdentityMap) {
    let last_sync = match (&pages.synced_commit, pages.synced_at) {
        (Some(commit), Some(at)) => format!("{} ({})", short(commit), format_age(at, Utc::now())),
        (Some(commit), None) => short(commit).to_string(),
        _ => "never".to_string(),
    };
    println!(
        "Junction v{} | space {} | {} pages | last sync {}",
        env!("CARGO_PKG_VERSION"),
        pages.space.to_string().bold(),
        pages.len(),
        last_sync,
    );
    if pages.is_empty() {
        println!("No pages tracked yet. Run 'junction delta' to publish.");
        return;
    }
    let rows: Vec<PageRow> = pages.records().map(PageRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn short(commit: &str) -> &str {
    commit.get(..10).unwrap_or(commit)
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

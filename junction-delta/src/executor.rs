//! Executor: apply an [`OperationPlan`] to the remote space.
//!
//! ## Protocol
//!
//! 1. Validate the plan's ordering.
//! 2. Render every page body up front; a markup failure drops that page
//!    only.
//! 3. Dry run stops here and echoes the plan.
//! 4. Preflight: no planned page may collide with an unmanaged remote page.
//! 5. Apply operations in order, updating the identity map after each one.
//!    The first transport failure aborts the rest.
//! 6. Second pass: patch cross-page placeholders now that every page of
//!    the plan has a remote id.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

use junction_core::types::fingerprint;
use junction_core::{PageId, PageIdentityMap, PageKind};
use junction_markup::{container_body, patch_links, MarkupConverter, MarkupError, RenderedPage};

use crate::error::{DeltaError, PlanningConflictError, RemoteOperationError, UnresolvedReferenceError};
use crate::plan::{Operation, OperationPlan};
use crate::remote::{RemoteSpaceClient, TransportError};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum OperationOutcome {
    Applied,
    /// Dry run: the operation would have been applied.
    WouldApply,
    Failed(String),
    /// Not attempted because an earlier operation failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub index: usize,
    pub operation: Operation,
    #[serde(flatten)]
    pub outcome: OperationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<PageId>,
}

/// Per-operation outcome of one [`Executor::apply`] call.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub dry_run: bool,
    pub operations: Vec<OperationReport>,
    /// Pages whose markdown could not be converted.
    pub markup_errors: Vec<MarkupError>,
    /// Pages whose references still point nowhere after the second pass.
    pub unresolved: Vec<UnresolvedReferenceError>,
    /// Number of pages patched by the second pass.
    pub links_patched: usize,
    /// The failure that stopped the plan, if any.
    pub abort: Option<RemoteOperationError>,
}

impl ExecutionReport {
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Applied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, OperationOutcome::Failed(_)))
    }

    fn count(&self, f: impl Fn(&OperationOutcome) -> bool) -> usize {
        self.operations.iter().filter(|r| f(&r.outcome)).count()
    }

    pub fn is_clean(&self) -> bool {
        self.abort.is_none() && self.markup_errors.is_empty() && self.unresolved.is_empty()
    }

    /// Turn the first recorded failure into an error: a remote abort first,
    /// then markup failures, then unresolved references.
    pub fn ensure_success(self) -> Result<Self, DeltaError> {
        let mut report = self;
        if let Some(abort) = report.abort.take() {
            return Err(abort.into());
        }
        if !report.markup_errors.is_empty() {
            return Err(report.markup_errors.swap_remove(0).into());
        }
        if !report.unresolved.is_empty() {
            return Err(report.unresolved.swap_remove(0).into());
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// A page body waiting for the second pass.
struct PendingLinks {
    index: usize,
    path: PathBuf,
    remote_id: PageId,
    title: String,
    page: RenderedPage,
    /// Recorded once every placeholder on the page is resolved.
    fingerprint: String,
}

pub struct Executor<'a> {
    identity: &'a mut PageIdentityMap,
    client: Option<&'a mut dyn RemoteSpaceClient>,
}

impl<'a> Executor<'a> {
    pub fn new(identity: &'a mut PageIdentityMap, client: &'a mut dyn RemoteSpaceClient) -> Self {
        Self {
            identity,
            client: Some(client),
        }
    }

    /// An executor that can only dry-run.
    pub fn offline(identity: &'a mut PageIdentityMap) -> Self {
        Self {
            identity,
            client: None,
        }
    }

    pub fn apply(&mut self, plan: &OperationPlan, dry_run: bool) -> Result<ExecutionReport, DeltaError> {
        plan.validate()?;

        let mut report = ExecutionReport {
            dry_run,
            ..ExecutionReport::default()
        };
        let rendered = self.render(plan, &mut report);

        if dry_run {
            for (index, operation) in plan.iter().enumerate() {
                let outcome = match rendered.get(&index) {
                    Some(Err(e)) => OperationOutcome::Failed(e.to_string()),
                    _ => OperationOutcome::WouldApply,
                };
                report.operations.push(OperationReport {
                    index,
                    operation: operation.clone(),
                    outcome,
                    remote_id: None,
                });
            }
            tracing::info!(operations = plan.len(), "dry run, nothing applied");
            return Ok(report);
        }

        let Some(client) = self.client.as_deref_mut() else {
            return Err(DeltaError::Offline);
        };
        preflight(plan, self.identity, client)?;

        let mut pending: Vec<PendingLinks> = Vec::new();
        let mut rendered = rendered;
        for (index, operation) in plan.iter().enumerate() {
            if report.abort.is_some() {
                report.operations.push(OperationReport {
                    index,
                    operation: operation.clone(),
                    outcome: OperationOutcome::Skipped,
                    remote_id: None,
                });
                continue;
            }
            let body = rendered.remove(&index);
            let (outcome, remote_id) =
                match apply_one(self.identity, client, index, operation, body, &mut pending) {
                    Ok(Step::Applied(id)) => (OperationOutcome::Applied, id),
                    Ok(Step::MarkupFailed(reason)) => (OperationOutcome::Failed(reason), None),
                    Err(e) => {
                        tracing::error!(index, op = operation.name(), path = %operation.path().display(), "{}", e.source);
                        let outcome = OperationOutcome::Failed(e.source.to_string());
                        report.abort = Some(e);
                        (outcome, None)
                    }
                };
            report.operations.push(OperationReport {
                index,
                operation: operation.clone(),
                outcome,
                remote_id,
            });
        }

        if report.abort.is_none() {
            second_pass(self.identity, client, pending, &mut report);
        }
        Ok(report)
    }

    /// Convert every page body against the identity snapshot minus the
    /// pages this plan deletes or moves away. References to those become
    /// placeholders and are settled by the second pass.
    fn render(
        &self,
        plan: &OperationPlan,
        report: &mut ExecutionReport,
    ) -> BTreeMap<usize, Result<RenderedPage, MarkupError>> {
        let mut settled = self.identity.clone();
        for operation in plan.iter() {
            match operation {
                Operation::DeletePage { path, .. } => {
                    settled.remove(path);
                }
                Operation::MovePage { from, .. } => {
                    settled.remove(from);
                }
                _ => {}
            }
        }
        let converter = MarkupConverter::new(&settled);
        let mut out = BTreeMap::new();
        for (index, operation) in plan.iter().enumerate() {
            let Some(markdown) = operation.content() else {
                continue;
            };
            let result = converter.convert(markdown, operation.path());
            if let Err(e) = &result {
                tracing::warn!(path = %operation.path().display(), "{e}");
                report.markup_errors.push(e.clone());
            }
            out.insert(index, result);
        }
        out
    }
}

/// Refuse to create a page whose title an unmanaged remote page already
/// holds under the same parent.
fn preflight(
    plan: &OperationPlan,
    identity: &PageIdentityMap,
    client: &mut dyn RemoteSpaceClient,
) -> Result<(), DeltaError> {
    for (index, operation) in plan.iter().enumerate() {
        let Operation::CreatePage { path, title, parent, .. } = operation else {
            continue;
        };
        let parent_id = match parent {
            Some(p) => match identity.remote_id(p) {
                Some(id) => Some(id),
                // Parent is created by this plan, so it has no children yet.
                None => continue,
            },
            None => identity.root_id.as_ref(),
        };
        let found = client
            .find_page_by_title(title, parent_id)
            .map_err(|source| RemoteOperationError {
                index,
                operation: "find",
                path: path.clone(),
                source,
            })?;
        if let Some(id) = found {
            if !identity.records().any(|r| r.remote_id.as_ref() == Some(&id)) {
                return Err(PlanningConflictError::UnmanagedPage {
                    path: path.clone(),
                    title: title.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

enum Step {
    Applied(Option<PageId>),
    MarkupFailed(String),
}

fn remote_err(index: usize, operation: &Operation, source: TransportError) -> RemoteOperationError {
    RemoteOperationError {
        index,
        operation: operation.name(),
        path: operation.path().to_path_buf(),
        source,
    }
}

fn missing(what: &str, path: &std::path::Path) -> TransportError {
    TransportError::Status {
        code: 404,
        message: format!("{what} {} has no remote id", path.display()),
    }
}

fn apply_one(
    identity: &mut PageIdentityMap,
    client: &mut dyn RemoteSpaceClient,
    index: usize,
    operation: &Operation,
    body: Option<Result<RenderedPage, MarkupError>>,
    pending: &mut Vec<PendingLinks>,
) -> Result<Step, RemoteOperationError> {
    let fail = |source: TransportError| remote_err(index, operation, source);
    match operation {
        Operation::CreatePage { path, title, parent, kind, content } => {
            let page = match (kind, body) {
                (PageKind::Container, _) => None,
                (PageKind::Leaf, Some(Ok(page))) => Some(page),
                (PageKind::Leaf, Some(Err(e))) => return Ok(Step::MarkupFailed(e.to_string())),
                (PageKind::Leaf, None) => None,
            };
            let parent_id = match parent {
                Some(p) => Some(identity.remote_id(p).cloned().ok_or_else(|| fail(missing("parent", p)))?),
                None => identity.root_id.clone(),
            };
            let storage = match &page {
                Some(page) => page.storage.clone(),
                None => container_body(),
            };
            let id = client
                .create_page(title, parent_id.as_ref(), &storage)
                .map_err(fail)?;
            tracing::info!(path = %path.display(), id = %id, "created page");
            let complete = page.as_ref().map_or(true, RenderedPage::is_complete);
            let settled = content.as_deref().filter(|_| complete).map(fingerprint);
            identity.record_created(path, *kind, id.clone(), parent_id, settled);
            if let (Some(page), Some(content)) = (page.filter(|p| !p.is_complete()), content) {
                pending.push(PendingLinks {
                    index,
                    path: path.clone(),
                    remote_id: id.clone(),
                    title: title.clone(),
                    page,
                    fingerprint: fingerprint(content),
                });
            }
            Ok(Step::Applied(Some(id)))
        }
        Operation::UpdatePage { path, title, content } => {
            let page = match body {
                Some(Ok(page)) => page,
                Some(Err(e)) => return Ok(Step::MarkupFailed(e.to_string())),
                None => return Ok(Step::MarkupFailed("page body was not rendered".to_string())),
            };
            let id = identity.remote_id(path).cloned().ok_or_else(|| fail(missing("page", path)))?;
            client.update_page(&id, title, &page.storage).map_err(fail)?;
            tracing::info!(path = %path.display(), id = %id, "updated page");
            if page.is_complete() {
                identity.set_fingerprint(path, Some(fingerprint(content)));
            } else {
                identity.set_fingerprint(path, None);
                pending.push(PendingLinks {
                    index,
                    path: path.clone(),
                    remote_id: id.clone(),
                    title: title.clone(),
                    page,
                    fingerprint: fingerprint(content),
                });
            }
            Ok(Step::Applied(Some(id)))
        }
        Operation::MovePage { from, to, title, parent, content } => {
            let id = identity.remote_id(from).cloned().ok_or_else(|| fail(missing("page", from)))?;
            let parent_id = match parent {
                Some(p) => Some(identity.remote_id(p).cloned().ok_or_else(|| fail(missing("parent", p)))?),
                None => identity.root_id.clone(),
            };
            client.move_page(&id, parent_id.as_ref(), title).map_err(fail)?;
            tracing::info!(from = %from.display(), to = %to.display(), id = %id, "moved page");
            identity.rename(from, to, parent_id);

            let Some(content) = content else {
                return Ok(Step::Applied(Some(id)));
            };
            match body {
                Some(Ok(page)) => {
                    client.update_page(&id, title, &page.storage).map_err(fail)?;
                    if page.is_complete() {
                        identity.set_fingerprint(to, Some(fingerprint(content)));
                    } else {
                        identity.set_fingerprint(to, None);
                        pending.push(PendingLinks {
                            index,
                            path: to.clone(),
                            remote_id: id.clone(),
                            title: title.clone(),
                            page,
                            fingerprint: fingerprint(content),
                        });
                    }
                    Ok(Step::Applied(Some(id)))
                }
                // The move stands; the stale fingerprint makes the next run
                // retry the body.
                Some(Err(e)) => {
                    identity.set_fingerprint(to, None);
                    Ok(Step::MarkupFailed(e.to_string()))
                }
                None => Ok(Step::Applied(Some(id))),
            }
        }
        Operation::DeletePage { path, remote_id, .. } => {
            match client.delete_page(remote_id) {
                Ok(()) => tracing::info!(path = %path.display(), id = %remote_id, "deleted page"),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(path = %path.display(), id = %remote_id, "page already gone");
                }
                Err(e) => return Err(fail(e)),
            }
            identity.remove(path);
            Ok(Step::Applied(None))
        }
    }
}

/// Re-resolve placeholders against the now-complete identity map and patch
/// the pages that changed.
///
/// A page keeps no fingerprint until its last placeholder is gone, so the
/// next run rewrites it.
fn second_pass(
    identity: &mut PageIdentityMap,
    client: &mut dyn RemoteSpaceClient,
    pending: Vec<PendingLinks>,
    report: &mut ExecutionReport,
) {
    for item in pending {
        let path = item.path;
        let patch = patch_links(&item.page.storage, &item.page.unresolved, &*identity);
        if patch.changed() {
            if let Err(source) = client.update_page(&item.remote_id, &item.title, &patch.storage) {
                tracing::error!(path = %path.display(), "patching links failed: {source}");
                report.abort = Some(RemoteOperationError {
                    index: item.index,
                    operation: "patch-links",
                    path,
                    source,
                });
                return;
            }
            tracing::info!(path = %path.display(), resolved = patch.resolved, "patched cross-page links");
            report.links_patched += 1;
        }
        if patch.unresolved.is_empty() {
            identity.set_fingerprint(&path, Some(item.fingerprint));
        } else {
            let titles: Vec<String> = patch
                .unresolved
                .iter()
                .map(|l| l.target_title.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            tracing::warn!(path = %path.display(), ?titles, "unresolved page references");
            report.unresolved.push(UnresolvedReferenceError { path, titles });
        }
    }
}

//! End-to-end delta runs against a scripted history and an in-memory space.

use std::path::{Path, PathBuf};

use junction_core::types::fingerprint;
use junction_core::{Modification, NetChange, PageId, PageIdentityMap, PageKind};
use junction_delta::pipeline::{self, DeltaRange};
use junction_delta::remote::RemoteCall;
use junction_delta::{
    fold, to_modifications, CommitRef, DeltaError, InMemorySpace, Operation, OperationOutcome,
    PlanningConflictError, VersionControlSource,
};
use rstest::rstest;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A linear history held in memory. `since` of `""` means "from the first
/// commit".
#[derive(Default)]
struct ScriptedHistory {
    commits: Vec<(CommitRef, Vec<Modification>)>,
}

impl ScriptedHistory {
    fn commit(mut self, id: &str, modifications: Vec<Modification>) -> Self {
        self.commits.push((CommitRef::from(id), modifications));
        self
    }

    fn range(since: &str, until: &str) -> DeltaRange {
        DeltaRange {
            since: since.to_string(),
            until: until.to_string(),
        }
    }
}

impl VersionControlSource for ScriptedHistory {
    fn commits_between(&self, start: &str, end: &str) -> Result<Vec<CommitRef>, DeltaError> {
        let position = |id: &str| self.commits.iter().position(|(c, _)| c.0 == id);
        let from = match start {
            "" => 0,
            id => position(id).map(|i| i + 1).ok_or_else(|| DeltaError::Source {
                message: format!("unknown commit {id}"),
                source: None,
            })?,
        };
        let to = position(end).ok_or_else(|| DeltaError::Source {
            message: format!("unknown commit {end}"),
            source: None,
        })?;
        Ok(self.commits[from..=to].iter().map(|(c, _)| c.clone()).collect())
    }

    fn modifications(&self, commit: &CommitRef, _root: &Path) -> Result<Vec<Modification>, DeltaError> {
        Ok(self
            .commits
            .iter()
            .find(|(c, _)| c == commit)
            .map(|(_, m)| m.clone())
            .unwrap_or_default())
    }
}

fn space_with_home() -> (InMemorySpace, PageIdentityMap) {
    let mut space = InMemorySpace::new();
    let home = space.seed("Docs Home", None, "");
    let identity = PageIdentityMap::new("DOCS").with_root(home);
    (space, identity)
}

fn titles(space: &InMemorySpace, identity: &PageIdentityMap, path: &str) -> Vec<String> {
    let id = identity.remote_id(Path::new(path)).expect("tracked");
    space.title_path(id)
}

fn summary(run: &pipeline::DeltaRun) -> Vec<String> {
    run.plan.iter().map(|op| op.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn new_page_in_new_directory_creates_container_then_leaf() {
    let history = ScriptedHistory::default().commit("c1", vec![Modification::added("docs/Welcome.md", "# Hi")]);
    let (mut space, mut identity) = space_with_home();

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert!(matches!(
        &run.plan.operations()[0],
        Operation::CreatePage { title, parent: None, kind: PageKind::Container, .. } if title == "docs"
    ));
    assert!(matches!(
        &run.plan.operations()[1],
        Operation::CreatePage { title, parent: Some(p), kind: PageKind::Leaf, .. }
            if title == "Welcome" && p == Path::new("docs")
    ));
    assert_eq!(run.plan.len(), 2);
    assert!(run.report.is_clean());
    assert_eq!(titles(&space, &identity, "docs/Welcome.md"), ["Docs Home", "docs", "Welcome"]);
    assert_eq!(identity.synced_commit.as_deref(), Some("c1"));
}

#[test]
fn page_added_and_deleted_within_one_delta_plans_nothing() {
    let history = ScriptedHistory::default()
        .commit("c1", vec![Modification::added("docs/A.md", "draft")])
        .commit("c2", vec![Modification::deleted("docs/A.md")]);
    let (mut space, mut identity) = space_with_home();

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c2"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert!(run.changes.is_empty());
    assert!(run.plan.is_empty());
    assert_eq!(space.mutation_count(), 0);
    assert_eq!(identity.synced_commit.as_deref(), Some("c2"));
}

#[test]
fn rename_moves_the_page_and_keeps_its_id() {
    let history = ScriptedHistory::default()
        .commit("c1", vec![Modification::added("docs/Old.md", "body")])
        .commit("c2", vec![Modification::renamed("docs/Old.md", "docs/New.md", None)]);
    let (mut space, mut identity) = space_with_home();
    pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();
    let id = identity.remote_id(Path::new("docs/Old.md")).cloned().unwrap();

    let run = pipeline::run(&history, &ScriptedHistory::range("c1", "c2"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert_eq!(summary(&run), ["move docs/Old.md -> docs/New.md"]);
    assert!(!identity.contains(Path::new("docs/Old.md")));
    assert_eq!(identity.remote_id(Path::new("docs/New.md")), Some(&id));
    assert_eq!(space.page(&id).unwrap().title, "New");
}

#[test]
fn link_to_a_page_created_in_the_same_delta_resolves() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![
            Modification::added("docs/Index.md", "Start here, &[see](Other Page).\n"),
            Modification::added("docs/Other Page.md", "# Other\n"),
        ],
    );
    let (mut space, mut identity) = space_with_home();

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert!(run.report.is_clean(), "{:?}", run.report.unresolved);
    assert_eq!(run.report.links_patched, 1);
    let index = identity.remote_id(Path::new("docs/Index.md")).unwrap();
    let other = identity.remote_id(Path::new("docs/Other Page.md")).unwrap();
    let body = &space.page(index).unwrap().body;
    assert!(body.contains(&format!("ri:content-id=\"{other}\"")), "{body}");
    assert!(!junction_markup::has_placeholders(body));
}

#[test]
fn case_insensitive_title_collision_fails_before_any_remote_call() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![Modification::added("docs/Plan.md", "a"), Modification::added("docs/plan.md", "b")],
    );
    let (mut space, mut identity) = space_with_home();

    let err = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap_err();

    assert!(
        matches!(err, DeltaError::PlanningConflict(PlanningConflictError::DuplicateTitle { .. })),
        "got: {err}"
    );
    assert!(space.calls().is_empty());
    assert!(identity.is_empty());
    assert_eq!(identity.synced_commit, None);
}

// ---------------------------------------------------------------------------
// Execution behaviour
// ---------------------------------------------------------------------------

#[test]
fn dry_run_makes_no_remote_calls() {
    let history = ScriptedHistory::default().commit("c1", vec![Modification::added("docs/Welcome.md", "# Hi")]);
    let (mut space, mut identity) = space_with_home();

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), true)
        .unwrap();

    assert!(run.report.dry_run);
    assert!(run.report.operations.iter().all(|r| r.outcome == OperationOutcome::WouldApply));
    assert!(space.calls().is_empty());
    assert!(identity.is_empty());
    assert_eq!(identity.synced_commit, None);
}

#[test]
fn offline_apply_is_refused() {
    let history = ScriptedHistory::default().commit("c1", vec![Modification::added("a.md", "x")]);
    let (_, mut identity) = space_with_home();

    let err = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, None, false)
        .unwrap_err();
    assert!(matches!(err, DeltaError::Offline));
}

#[test]
fn replaying_a_synced_delta_plans_nothing() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![Modification::added("docs/a.md", "one"), Modification::added("docs/sub/b.md", "two")],
    );
    let (mut space, mut identity) = space_with_home();
    let first = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();
    assert_eq!(first.plan.len(), 4);

    let replay = pipeline::plan_changes(&first.changes, &identity).unwrap();
    assert!(replay.is_empty(), "{replay:?}");
}

#[test]
fn transport_failure_aborts_and_a_rerun_converges() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![Modification::added("docs/a.md", "one"), Modification::added("docs/b.md", "two")],
    );
    let (space, mut identity) = space_with_home();
    let mut space = space.fail_mutation_at(1);

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    let outcomes: Vec<_> = run.report.operations.iter().map(|r| r.outcome.clone()).collect();
    assert_eq!(outcomes[0], OperationOutcome::Applied);
    assert!(matches!(outcomes[1], OperationOutcome::Failed(_)));
    assert_eq!(outcomes[2], OperationOutcome::Skipped);
    let abort = run.report.abort.as_ref().unwrap();
    assert_eq!(abort.index, 1);
    assert_eq!(abort.path, PathBuf::from("docs/a.md"));
    assert!(identity.contains(Path::new("docs")));
    assert_eq!(identity.synced_commit, None);

    let rerun = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();
    assert_eq!(
        rerun.plan.iter().map(|op| op.to_string()).collect::<Vec<_>>(),
        ["create docs/a.md", "create docs/b.md"]
    );
    assert!(rerun.report.is_clean());
    assert_eq!(identity.synced_commit.as_deref(), Some("c1"));
}

#[test]
fn unmanaged_remote_page_blocks_the_plan() {
    let history = ScriptedHistory::default().commit("c1", vec![Modification::added("Guide.md", "x")]);
    let (mut space, mut identity) = space_with_home();
    let home = identity.root_id.clone().unwrap();
    space.seed("guide", Some(&home), "hand written");

    let err = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap_err();

    assert!(matches!(
        err,
        DeltaError::PlanningConflict(PlanningConflictError::UnmanagedPage { .. })
    ));
    assert_eq!(space.mutation_count(), 0);
    assert!(space.calls().iter().all(|c| matches!(c, RemoteCall::Find { .. })));
}

#[test]
fn markup_error_skips_only_that_page() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![
            Modification::added("docs/Bad.md", "&status-orange:X;\n"),
            Modification::added("docs/Good.md", "fine\n"),
        ],
    );
    let (mut space, mut identity) = space_with_home();

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert_eq!(run.report.markup_errors.len(), 1);
    assert_eq!(run.report.markup_errors[0].path(), Path::new("docs/Bad.md"));
    assert!(!identity.contains(Path::new("docs/Bad.md")));
    assert!(identity.contains(Path::new("docs/Good.md")));
    assert_eq!(identity.synced_commit, None);
    assert!(matches!(
        run.report.ensure_success(),
        Err(DeltaError::Markup(_))
    ));
}

#[test]
fn markdown_file_without_a_name_is_rejected_before_any_remote_call() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![Modification::added("docs/.md", "orphan"), Modification::added("docs/a.md", "x")],
    );
    let (mut space, mut identity) = space_with_home();

    let err = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap_err();

    assert!(
        matches!(&err, DeltaError::PlanningConflict(PlanningConflictError::EmptyTitle { path }) if path == Path::new("docs/.md")),
        "got: {err}"
    );
    assert!(space.calls().is_empty());
}

#[test]
fn failed_link_patch_leaves_the_page_for_the_next_run() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![Modification::added("A.md", "&[b](B)\n"), Modification::added("B.md", "# B\n")],
    );
    let (space, mut identity) = space_with_home();
    // Create A, create B, then the link patch of A fails.
    let mut space = space.fail_mutation_at(2);

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    let abort = run.report.abort.as_ref().unwrap();
    assert_eq!(abort.operation, "patch-links");
    assert_eq!(abort.path, PathBuf::from("A.md"));
    assert_eq!(identity.get(Path::new("A.md")).unwrap().content_fingerprint, None);
    assert!(identity.get(Path::new("B.md")).unwrap().content_fingerprint.is_some());
    assert_eq!(identity.synced_commit, None);

    let rerun = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert_eq!(summary(&rerun), ["update A.md"]);
    assert!(rerun.report.is_clean(), "{:?}", rerun.report.abort);
    assert_eq!(identity.synced_commit.as_deref(), Some("c1"));
    let a = identity.remote_id(Path::new("A.md")).unwrap();
    let b = identity.remote_id(Path::new("B.md")).unwrap();
    let body = &space.page(a).unwrap().body;
    assert!(body.contains(&format!("ri:content-id=\"{b}\"")), "{body}");
    assert!(!junction_markup::has_placeholders(body));
    assert_eq!(
        identity.get(Path::new("A.md")).unwrap().content_fingerprint,
        Some(fingerprint("&[b](B)\n"))
    );
}

#[test]
fn reference_outside_the_tree_is_reported_for_that_page_only() {
    let history = ScriptedHistory::default().commit(
        "c1",
        vec![
            Modification::added("docs/Index.md", "See &[a](Nowhere), &[b](Elsewhere) and &[c](Nowhere).\n"),
            Modification::added("docs/Other.md", "fine\n"),
        ],
    );
    let (mut space, mut identity) = space_with_home();

    let run = pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert!(run.report.abort.is_none());
    assert_eq!(run.report.applied(), run.plan.len());
    assert_eq!(run.report.unresolved.len(), 1);
    let unresolved = &run.report.unresolved[0];
    assert_eq!(unresolved.path, PathBuf::from("docs/Index.md"));
    assert_eq!(unresolved.titles, ["Elsewhere", "Nowhere"]);
    assert!(identity.contains(Path::new("docs/Other.md")));
    // No fingerprint, so the page is rewritten once the targets exist.
    assert_eq!(identity.get(Path::new("docs/Index.md")).unwrap().content_fingerprint, None);
    assert!(matches!(
        run.report.ensure_success(),
        Err(DeltaError::UnresolvedReference(_))
    ));
}

#[test]
fn reference_to_a_page_deleted_in_the_same_delta_is_reported() {
    let history = ScriptedHistory::default()
        .commit(
            "c1",
            vec![Modification::added("Target.md", "gone soon\n"), Modification::added("Keep.md", "stays\n")],
        )
        .commit(
            "c2",
            vec![Modification::deleted("Target.md"), Modification::added("Src.md", "&[go](Target)\n")],
        );
    let (mut space, mut identity) = space_with_home();
    pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();
    let target = identity.remote_id(Path::new("Target.md")).cloned().unwrap();

    let run = pipeline::run(&history, &ScriptedHistory::range("c1", "c2"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert_eq!(summary(&run), ["create Src.md", "delete Target.md"]);
    assert!(run.report.abort.is_none());
    assert_eq!(run.report.unresolved.len(), 1);
    assert_eq!(run.report.unresolved[0].path, PathBuf::from("Src.md"));
    assert_eq!(run.report.unresolved[0].titles, ["Target"]);
    assert!(space.page(&target).is_none());
    assert!(identity.contains(Path::new("Keep.md")));

    let src = identity.remote_id(Path::new("Src.md")).unwrap();
    let body = &space.page(src).unwrap().body;
    assert!(!body.contains(&format!("ri:content-id=\"{target}\"")), "{body}");
    assert!(junction_markup::has_placeholders(body));
}

#[test]
fn deleting_the_last_page_removes_its_directory() {
    let history = ScriptedHistory::default()
        .commit("c1", vec![Modification::added("old/deep/a.md", "x"), Modification::added("keep.md", "y")])
        .commit("c2", vec![Modification::deleted("old/deep/a.md")]);
    let (mut space, mut identity) = space_with_home();
    pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    let run = pipeline::run(&history, &ScriptedHistory::range("c1", "c2"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert_eq!(summary(&run), ["delete old/deep/a.md", "delete old/deep", "delete old"]);
    assert!(run.report.is_clean());
    assert_eq!(identity.len(), 1);
    // Home plus keep.md.
    assert_eq!(space.len(), 2);
}

#[test]
fn mixed_delta_respects_phase_and_depth_order() {
    let history = ScriptedHistory::default()
        .commit(
            "c1",
            vec![
                Modification::added("a/one.md", "1"),
                Modification::added("a/two.md", "2"),
                Modification::added("b/three.md", "3"),
            ],
        )
        .commit(
            "c2",
            vec![
                Modification::renamed("a/one.md", "c/d/one.md", None),
                Modification::modified("a/two.md", "2b"),
                Modification::deleted("b/three.md"),
                Modification::added("e/four.md", "4"),
            ],
        );
    let (mut space, mut identity) = space_with_home();
    pipeline::run(&history, &ScriptedHistory::range("", "c1"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    let run = pipeline::run(&history, &ScriptedHistory::range("c1", "c2"), Path::new(""), &mut identity, Some(&mut space), false)
        .unwrap();

    assert_eq!(
        summary(&run),
        [
            "create c",
            "create e",
            "create c/d",
            "create e/four.md",
            "move a/one.md -> c/d/one.md",
            "update a/two.md",
            "delete b/three.md",
            "delete b",
        ]
    );
    run.plan.validate().unwrap();
    assert!(run.report.is_clean());
    assert_eq!(titles(&space, &identity, "c/d/one.md"), ["Docs Home", "c", "d", "one"]);
}

// ---------------------------------------------------------------------------
// Folding
// ---------------------------------------------------------------------------

fn m(spec: &str) -> Modification {
    let parts: Vec<&str> = spec.split_whitespace().collect();
    match parts.as_slice() {
        ["A", p] => Modification::added(*p, format!("{p} v1")),
        ["M", p] => Modification::modified(*p, format!("{p} v2")),
        ["D", p] => Modification::deleted(*p),
        ["R", from, to] => Modification::renamed(*from, *to, None),
        _ => panic!("bad modification spec: {spec}"),
    }
}

#[rstest]
#[case(&["A x.md", "M x.md"], &["R x.md y.md"])]
#[case(&["R a.md b.md"], &["R b.md c.md", "M c.md"])]
#[case(&["M a.md", "D a.md"], &["A a.md"])]
#[case(&["R a.md b.md", "A a.md"], &["D b.md"])]
#[case(&["A n.md", "R n.md m.md"], &["D m.md"])]
fn folding_in_steps_matches_folding_at_once(#[case] first: &[&str], #[case] second: &[&str]) {
    let a: Vec<Modification> = first.iter().map(|s| m(s)).collect();
    let b: Vec<Modification> = second.iter().map(|s| m(s)).collect();

    let at_once = fold(&[a.clone(), b.clone()].concat());
    let mut stepped = to_modifications(&fold(&a));
    stepped.extend(b);
    assert_eq!(fold(&stepped), at_once);
}

#[test]
fn fold_of_a_rename_chain_is_a_single_move() {
    let changes = fold(&[m("R a.md b.md"), m("R b.md c.md")]);
    assert_eq!(
        changes,
        [NetChange::Move {
            from: "a.md".into(),
            to: "c.md".into(),
            content: None,
        }]
    );
}

#[test]
fn plan_serialises_with_operation_tags() {
    let identity = PageIdentityMap::new("DOCS").with_root(PageId::from("1"));
    let plan = pipeline::plan_changes(&fold(&[m("A top.md")]), &identity).unwrap();
    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["operations"][0]["op"], "create_page");
    assert_eq!(json["operations"][0]["title"], "top");
}

//! End-to-end conversion tests: dialect extensions, errors with line numbers,
//! and two-pass link resolution against an identity map.

use std::path::Path;

use junction_core::{PageId, PageIdentityMap, PageKind, SpaceKey};
use junction_markup::{
    has_placeholders, patch_links, MarkupConverter, MarkupError, PanelKind, PageResolver,
};
use rstest::rstest;

const FIXTURE: &str = "\
# Release notes

:include-toc:

Info: Read &[the setup guide](Setup Guide) first.

| Component | State |
|-----------|-------|
| parser    | &status-green:Done; |
| exporter  | &status-yellow:In progress; |

- [x] write docs
- [ ] link to &[FAQ](faq)

Water is H~2~O --- everyone knows that.

```rust
fn main() {}
```
";

fn identity_with(pages: &[(&str, &str)]) -> PageIdentityMap {
    let mut map = PageIdentityMap::new(SpaceKey::from("DOCS")).with_root("1");
    for (path, id) in pages {
        map.record_created(
            Path::new(path),
            PageKind::Leaf,
            PageId::from(*id),
            Some(PageId::from("1")),
            None,
        );
    }
    map
}

fn convert(markdown: &str, identity: &PageIdentityMap) -> Result<junction_markup::RenderedPage, MarkupError> {
    MarkupConverter::new(identity).convert(markdown, Path::new("notes/Release.md"))
}

// ---------------------------------------------------------------------------
// 1. Rendering
// ---------------------------------------------------------------------------

#[test]
fn fixture_renders_every_extension() {
    let identity = identity_with(&[]);
    let page = convert(FIXTURE, &identity).expect("convert");
    let s = &page.storage;

    assert!(s.starts_with("<h1>Release notes</h1>"), "{s}");
    assert!(s.contains(r#"ac:name="toc""#));
    assert!(s.contains(r#"<ac:structured-macro ac:name="info""#));
    assert!(s.contains(r#"<ac:parameter ac:name="colour">Green</ac:parameter>"#));
    assert!(s.contains(r#"<ac:parameter ac:name="title">In progress</ac:parameter>"#));
    assert!(s.contains("<ac:task-status>complete</ac:task-status>"));
    assert!(s.contains("H<sub>2</sub>O \u{2014} everyone"));
    assert!(s.contains(r#"<ac:parameter ac:name="language">rust</ac:parameter>"#));
    assert_eq!(page.unresolved.len(), 2);
}

#[test]
fn unresolved_links_are_recorded_in_document_order() {
    let identity = identity_with(&[]);
    let page = convert(FIXTURE, &identity).expect("convert");
    let targets: Vec<_> = page.unresolved.iter().map(|l| l.target_title.as_str()).collect();
    assert_eq!(targets, ["Setup Guide", "faq"]);
    assert!(page
        .unresolved
        .iter()
        .all(|l| l.source_path == Path::new("notes/Release.md")));
    assert!(page.unresolved[0].insertion_point < page.unresolved[1].insertion_point);
}

// ---------------------------------------------------------------------------
// 2. Errors
// ---------------------------------------------------------------------------

#[test]
fn unknown_status_color_fails_conversion() {
    let identity = identity_with(&[]);
    let err = convert("Status: &status-orange:X;\n", &identity).unwrap_err();
    match err {
        MarkupError::UnknownStatusColor { color, line, path } => {
            assert_eq!(color, "orange");
            assert_eq!(line, 1);
            assert_eq!(path, Path::new("notes/Release.md"));
        }
        other => panic!("expected UnknownStatusColor, got {other:?}"),
    }
}

#[rstest]
#[case::status_line("intro\n\nsecond\nthird &status-red:oops\n", 4)]
#[case::macro_inline("one\n\ntwo :include-children: three\n", 3)]
#[case::panel_blank_line("Warning: first\n\n   more\n", 3)]
fn errors_point_at_the_offending_line(#[case] markdown: &str, #[case] line: usize) {
    let identity = identity_with(&[]);
    let err = convert(markdown, &identity).unwrap_err();
    assert_eq!(err.line(), line, "{err}");
    assert!(err.to_string().starts_with("notes/Release.md:"), "{err}");
}

#[test]
fn multi_paragraph_panel_names_the_kind() {
    let identity = identity_with(&[]);
    let err = convert("Error: broken\n\n  continued\n", &identity).unwrap_err();
    assert!(matches!(
        err,
        MarkupError::MultiParagraphPanel { kind: PanelKind::Error, .. }
    ));
}

// ---------------------------------------------------------------------------
// 3. Link resolution
// ---------------------------------------------------------------------------

#[test]
fn round_trip_with_existing_targets_leaves_no_placeholders() {
    let identity = identity_with(&[("Setup Guide.md", "10"), ("guides/FAQ.md", "11")]);
    let page = convert(FIXTURE, &identity).expect("convert");
    assert!(page.is_complete());
    assert!(!has_placeholders(&page.storage));
    assert!(page.storage.contains(r#"ri:content-id="10""#));
    // Title lookup ignores case.
    assert!(page.storage.contains(r#"ri:content-id="11""#));
}

#[test]
fn second_pass_resolves_pages_created_later() {
    let before = identity_with(&[]);
    let page = convert(FIXTURE, &before).expect("convert");
    assert!(has_placeholders(&page.storage));

    let after = identity_with(&[("Setup Guide.md", "10"), ("FAQ.md", "11")]);
    let patch = patch_links(&page.storage, &page.unresolved, &after);
    assert!(patch.changed());
    assert!(patch.unresolved.is_empty());
    assert!(!has_placeholders(&patch.storage));
    assert!(patch
        .storage
        .contains(r#"<ac:link-body>the setup guide</ac:link-body>"#));
}

#[test]
fn second_pass_reports_targets_outside_the_corpus() {
    let before = identity_with(&[]);
    let page = convert(FIXTURE, &before).expect("convert");
    let after = identity_with(&[("Setup Guide.md", "10")]);
    let patch = patch_links(&page.storage, &page.unresolved, &after);
    assert_eq!(patch.resolved, 1);
    assert_eq!(patch.unresolved.len(), 1);
    assert_eq!(patch.unresolved[0].target_title, "faq");
    assert!(has_placeholders(&patch.storage));
}

#[test]
fn identity_map_is_a_resolver() {
    let identity = identity_with(&[("Team/Roadmap.md", "77")]);
    assert_eq!(identity.lookup_page("roadmap"), Some(PageId::from("77")));
    assert_eq!(identity.lookup_page("Team"), None);
}

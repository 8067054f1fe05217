//! [`MarkupConverter`] and the second-pass link patcher.

use std::path::{Path, PathBuf};

use junction_core::{PageId, PageIdentityMap};
use serde::Serialize;

use crate::error::MarkupError;
use crate::extensions;
use crate::parser;
use crate::storage::{self, StorageWriter};

/// Title → remote id lookup used for cross-page references.
pub trait PageResolver {
    fn lookup_page(&self, title: &str) -> Option<PageId>;
}

impl PageResolver for PageIdentityMap {
    fn lookup_page(&self, title: &str) -> Option<PageId> {
        self.resolve_title(title).cloned()
    }
}

/// A cross-page reference whose target had no remote id at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedLink {
    pub source_path: PathBuf,
    pub target_title: String,
    pub display_text: String,
    /// Byte offset of `token` in the rendered storage.
    pub insertion_point: usize,
    pub token: String,
}

/// Output of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub storage: String,
    pub unresolved: Vec<UnresolvedLink>,
}

impl RenderedPage {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Compiles markdown into storage markup.
///
/// Conversion reads the resolver and nothing else, so independent files can
/// be converted in any order (or concurrently) against the same snapshot.
pub struct MarkupConverter<'a> {
    resolver: &'a dyn PageResolver,
}

impl<'a> MarkupConverter<'a> {
    pub fn new(resolver: &'a dyn PageResolver) -> Self {
        Self { resolver }
    }

    pub fn convert(&self, markdown: &str, source_path: &Path) -> Result<RenderedPage, MarkupError> {
        let blocks = extensions::apply(parser::parse(markdown), source_path)?;
        let mut writer = StorageWriter::new(source_path, self.resolver);
        writer.blocks(&blocks)?;
        let (storage, unresolved) = writer.finish();
        tracing::debug!(
            path = %source_path.display(),
            bytes = storage.len(),
            unresolved = unresolved.len(),
            "converted page"
        );
        Ok(RenderedPage {
            storage,
            unresolved,
        })
    }
}

/// Body for pages synthesised from directories.
pub fn container_body() -> String {
    format!("<p>{}</p>", storage::children_macro())
}

/// Result of re-resolving a page's placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPatch {
    pub storage: String,
    pub resolved: usize,
    pub unresolved: Vec<UnresolvedLink>,
}

impl LinkPatch {
    pub fn changed(&self) -> bool {
        self.resolved > 0
    }
}

/// Replace every placeholder whose target now resolves with a direct link.
///
/// Links are applied from the highest insertion point down so earlier
/// offsets stay valid while the text grows.
pub fn patch_links(storage: &str, links: &[UnresolvedLink], resolver: &dyn PageResolver) -> LinkPatch {
    let mut out = storage.to_string();
    let mut resolved = 0;
    let mut unresolved: Vec<UnresolvedLink> = Vec::new();

    let mut ordered: Vec<&UnresolvedLink> = links.iter().collect();
    ordered.sort_by(|a, b| b.insertion_point.cmp(&a.insertion_point));

    for link in ordered {
        let end = link.insertion_point + link.token.len();
        let in_place = out
            .get(link.insertion_point..end)
            .is_some_and(|s| s == link.token);
        match resolver.lookup_page(&link.target_title) {
            Some(id) if in_place => {
                let replacement = storage::page_link(&id.0, &link.display_text);
                // Offsets of links already kept (all further right) shift with the text.
                let grown = replacement.len() as isize - link.token.len() as isize;
                for kept in &mut unresolved {
                    kept.insertion_point = kept.insertion_point.saturating_add_signed(grown);
                }
                out.replace_range(link.insertion_point..end, &replacement);
                resolved += 1;
            }
            _ => unresolved.push(link.clone()),
        }
    }
    unresolved.reverse();
    LinkPatch {
        storage: out,
        resolved,
        unresolved,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

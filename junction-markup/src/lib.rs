//! # junction-markup
//!
//! Compiles the markdown dialect used in documentation repositories into
//! Confluence storage markup.
//!
//! On top of ordinary markdown the dialect understands:
//!
//! - `:include-children:` and `:include-toc:` on a line of their own
//! - `Info:` / `Warning:` / `Error:` / `Success:` panels
//! - `&status-<color>:label;` status pills
//! - `&[text](Page Title)` cross-page references
//! - `~sub~`, `^sup^`, task lists and ` --- ` em dashes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use junction_core::{PageIdentityMap, SpaceKey};
//! use junction_markup::{patch_links, MarkupConverter};
//!
//! let identity = PageIdentityMap::new(SpaceKey::from("DOCS"));
//! let page = MarkupConverter::new(&identity)
//!     .convert("See &[setup](Setup).\n", Path::new("Intro.md"))
//!     .unwrap();
//! // Later, once "Setup" has been created:
//! let patched = patch_links(&page.storage, &page.unresolved, &identity);
//! println!("{} links still open", patched.unresolved.len());
//! ```

pub mod converter;
pub mod error;
pub mod extensions;
mod inline;
mod parser;
mod storage;

pub use converter::{
    container_body, patch_links, LinkPatch, MarkupConverter, PageResolver, RenderedPage,
    UnresolvedLink,
};
pub use error::MarkupError;
pub use extensions::{PanelKind, StatusColor};
pub use storage::has_placeholders;

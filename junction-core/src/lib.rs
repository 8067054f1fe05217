//! Junction core library: domain types, page identity persistence and config.
//!
//! - [`types`]: modifications, net changes, page records and path helpers
//! - [`identity`]: [`PageIdentityMap`] and its on-disk snapshot
//! - [`config`]: `.junction.yaml` loading
//! - [`error`]: [`CoreError`]

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::JunctionConfig;
pub use error::CoreError;
pub use identity::PageIdentityMap;
pub use types::{
    Modification, ModificationKind, NetChange, PageId, PageKind, PageRecord, SpaceKey,
};

//! # junction-delta
//!
//! Turns a commit range of markdown changes into remote page operations.
//!
//! - [`fold`] collapses per-commit modifications into net changes
//! - [`PathTree`] is the page hierarchy those changes produce
//! - [`plan`] orders creates, moves, updates and deletes
//! - [`Executor`] applies the plan and resolves cross-page links
//! - [`pipeline::run`] wires them to a [`VersionControlSource`] and a
//!   [`RemoteSpaceClient`]

pub mod error;
pub mod executor;
pub mod fold;
pub mod path_tree;
pub mod pipeline;
pub mod plan;
pub mod remote;
pub mod source;

pub use error::{
    DeltaError, PlanningConflictError, RemoteOperationError, UnresolvedReferenceError,
};
pub use executor::{ExecutionReport, Executor, OperationOutcome, OperationReport};
pub use fold::{fold, order_for_replay, to_modifications};
pub use path_tree::{PathNode, PathTree};
pub use pipeline::{DeltaRange, DeltaRun};
pub use plan::{plan, Operation, OperationPlan};
pub use remote::{InMemorySpace, RemoteSpaceClient, TransportError};
pub use source::{filter_to_root, CommitRef, VersionControlSource};

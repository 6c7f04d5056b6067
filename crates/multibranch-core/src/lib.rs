pub mod branch;
pub mod config;
pub mod container;
pub mod criteria;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod io;
pub mod lifecycle;
pub mod mangle;
pub mod organization;
pub mod orphan;
pub mod paths;
pub mod poll;
pub mod priority;
pub mod progress;
pub mod project;
pub mod property;
pub mod reconcile;
pub mod report;
pub mod scheduler;
pub mod source;
pub mod sources;
pub mod store;
pub mod strategy;
pub mod types;

pub use branch::Branch;
pub use container::MultiBranchProject;
pub use error::{ReconcileError, Result, SourceError};
pub use event::{EventKind, HeadEvent, ScmEvent, SourceEvent, SourceMatch};
pub use mangle::mangle;
pub use reconcile::Cancellation;
pub use report::{BuildOutcome, Change, ReconcileReport};
pub use source::{BranchSource, ScmSource};
pub use types::{Action, BuildCause, Head, Revision, ScmRef};

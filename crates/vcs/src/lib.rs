//! Shared state model for the workspace integration: file states,
//! changelists and the statuses a status refresh can report.
//!
//! This crate is deliberately free of any process or async machinery so
//! both the command layer and its tests can depend on it cheaply.

pub mod changelist;
pub mod state;

pub use changelist::{ChangelistId, ChangelistState, ShelvedFile, DEFAULT_CHANGELIST};
pub use state::{FileRevision, FileState, LockInfo, WorkspaceStatus};

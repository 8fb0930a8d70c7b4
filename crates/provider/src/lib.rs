//! Asynchronous bridge between an editor frontend and a changelist-based
//! version-control command-line tool.
//!
//! Commands are submitted to a [`Provider`] and executed by a bounded pool
//! of background tasks; each operation's worker then folds its parsed
//! results into the provider-owned state cache on the caller's context,
//! strictly in completion order. The two-phase worker contract lives in
//! [`workers`]; the tool seam in [`tool`] lets tests script the external
//! binary away.

pub mod cache;
pub mod cm;
pub mod command;
pub mod config;
pub mod error;
pub mod provider;
pub mod records;
mod runner;
pub mod tool;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::StateCache;
pub use cm::CmCli;
pub use command::{Command, CommandId, CommandKind};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use provider::{CommandState, CompletedCommand, Provider};
pub use records::{ParseError, WorkspaceInfo};
pub use tool::{ToolError, ToolOutput, VcsTool};

use thiserror::Error;

use crate::records::ParseError;
use crate::tool::ToolError;

/// Everything that can go wrong between submitting a command and applying
/// its results.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The command was rejected before dispatch.
    #[error("invalid command: {0}")]
    InvalidArgument(String),

    /// The tool could not be run, timed out, or exited non-zero where the
    /// operation required success.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The tool ran but produced output we could not interpret.
    #[error(transparent)]
    Output(#[from] ParseError),

    /// No workspace is established: either discovery found none, or a
    /// workspace-requiring command was submitted while disconnected.
    #[error("no workspace found (connect first)")]
    WorkspaceNotFound,

    /// The command was cancelled while still queued; it never executed.
    #[error("command cancelled before execution")]
    Cancelled,

    /// The background pool is gone; no further commands can run.
    #[error("provider is shutting down")]
    ShuttingDown,
}

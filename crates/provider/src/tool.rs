use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Captured output of one tool invocation.
///
/// A non-zero exit code is not an error by itself: some operations report
/// per-path outcomes on stdout even when they fail overall, and each worker
/// decides what a failure means for it.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_text(&self) -> String {
        self.stderr_lines.join("\n")
    }

    /// The [`ToolError::Failed`] this output stands for.
    pub fn failure(&self, operation: &str) -> ToolError {
        ToolError::Failed {
            operation: operation.to_string(),
            code: self.exit_code,
            stderr: self.stderr_text(),
        }
    }

    /// Require a zero exit code, turning anything else into
    /// [`ToolError::Failed`].
    pub fn require_success(self, operation: &str) -> Result<Self, ToolError> {
        if self.success() {
            Ok(self)
        } else {
            Err(self.failure(operation))
        }
    }
}

/// Failure of a tool invocation itself, before any output is interpreted.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("version control tool not found (is it on PATH?)")]
    NotFound,
    #[error("failed to spawn tool for `{operation}`")]
    Spawn {
        operation: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{operation}` did not finish within {timeout:?}")]
    TimedOut { operation: String, timeout: Duration },
    #[error("`{operation}` exited with code {code}: {stderr}")]
    Failed {
        operation: String,
        code: i32,
        stderr: String,
    },
}

/// The seam between workers and the outside world.
///
/// Workers never spawn processes themselves: they name an operation, pass
/// arguments and get captured output back. The production implementation is
/// [`CmCli`](crate::cm::CmCli); tests substitute a scripted one.
#[async_trait]
pub trait VcsTool: Send + Sync {
    async fn invoke(&self, operation: &str, args: &[String]) -> Result<ToolOutput, ToolError>;
}

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{trace, warn};

use crate::config::ProviderConfig;
use crate::tool::{ToolError, ToolOutput, VcsTool};

/// Async wrapper around the `cm` command-line client.
///
/// One invocation is one child process: arguments in, captured stdout and
/// stderr out, bounded by the configured timeout. On expiry the child is
/// killed best-effort and the invocation reported as [`ToolError::TimedOut`].
pub struct CmCli {
    binary: PathBuf,
    working_dir: PathBuf,
    timeout: Duration,
}

impl CmCli {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            working_dir: config.working_dir.clone(),
            timeout: config.timeout,
        }
    }

    /// Cheap startup check: can the binary be run at all?
    pub async fn is_available(&self) -> bool {
        match self.invoke("version", &[]).await {
            Ok(output) => output.success(),
            Err(err) => {
                warn!(%err, "cm availability check failed");
                false
            }
        }
    }
}

#[async_trait]
impl VcsTool for CmCli {
    async fn invoke(&self, operation: &str, args: &[String]) -> Result<ToolOutput, ToolError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(operation)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        trace!(%operation, ?args, "invoking cm");

        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound
            } else {
                ToolError::Spawn {
                    operation: operation.to_string(),
                    source,
                }
            }
        })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        // Drain both pipes while waiting so neither can fill up and stall
        // the child.
        let wait = async {
            let (status, out, err) = tokio::try_join!(
                child.wait(),
                drain(stdout.as_mut()),
                drain(stderr.as_mut()),
            )?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(Ok((status, out, err))) => {
                let output = ToolOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout_lines: split_lines(&out),
                    stderr_lines: split_lines(&err),
                };
                if !output.success() {
                    warn!(%operation, code = output.exit_code, "cm exited non-zero");
                }
                Ok(output)
            }
            Ok(Err(source)) => Err(ToolError::Spawn {
                operation: operation.to_string(),
                source,
            }),
            Err(_) => {
                if let Err(err) = child.start_kill() {
                    warn!(%operation, %err, "could not kill timed-out cm process");
                }
                Err(ToolError::TimedOut {
                    operation: operation.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn drain<R>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn split_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .lines()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_handles_crlf_and_trailing_newline() {
        let lines = split_lines(b"one\r\ntwo\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn split_lines_of_empty_output_is_empty() {
        assert!(split_lines(b"").is_empty());
    }
}

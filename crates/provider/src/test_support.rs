use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::tool::{ToolError, ToolOutput, VcsTool};

/// A [`VcsTool`] that replays scripted outputs instead of spawning anything.
///
/// Responses are keyed by operation. Scripting the same operation twice
/// queues the outputs, and the last one sticks and keeps being replayed;
/// operations never scripted succeed with empty output. An optional delay
/// makes invocations take virtual time so tests can observe overlap.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTool {
    responses: Mutex<HashMap<String, VecDeque<ToolOutput>>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    delay: Option<Duration>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(self, operation: &str, output: ToolOutput) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(output);
        self
    }

    pub fn respond_lines(self, operation: &str, stdout: &[&str]) -> Self {
        self.respond(
            operation,
            ToolOutput {
                exit_code: 0,
                stdout_lines: to_strings(stdout),
                stderr_lines: Vec::new(),
            },
        )
    }

    pub fn respond_error(self, operation: &str, code: i32, stderr: &str) -> Self {
        self.respond(
            operation,
            ToolOutput {
                exit_code: code,
                stdout_lines: Vec::new(),
                stderr_lines: vec![stderr.to_string()],
            },
        )
    }

    pub fn respond_output(
        self,
        operation: &str,
        code: i32,
        stdout: &[&str],
        stderr: &[&str],
    ) -> Self {
        self.respond(
            operation,
            ToolOutput {
                exit_code: code,
                stdout_lines: to_strings(stdout),
                stderr_lines: to_strings(stderr),
            },
        )
    }

    /// Every invocation so far, in order: (operation, args).
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of invocations that were in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn to_strings(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

#[async_trait]
impl VcsTool for ScriptedTool {
    async fn invoke(&self, operation: &str, args: &[String]) -> Result<ToolOutput, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((operation.to_string(), args.to_vec()));

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let output = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(operation) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        Ok(output.unwrap_or_default())
    }
}

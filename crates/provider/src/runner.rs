use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::command::{Command, CommandId};
use crate::error::ProviderError;
use crate::tool::VcsTool;
use crate::workers::Worker;

/// One queued command together with its worker and cancellation flag.
pub(crate) struct Job {
    pub id: CommandId,
    pub command: Command,
    pub worker: Box<dyn Worker>,
    pub cancelled: Arc<AtomicBool>,
}

/// What the pool reports back to the provider.
pub(crate) enum RunnerEvent {
    Started {
        id: CommandId,
    },
    /// Execution is over (successfully, failed, or skipped by
    /// cancellation); the worker travels back so its update phase can run
    /// on the provider's context.
    Finished {
        id: CommandId,
        command: Command,
        worker: Box<dyn Worker>,
        result: Result<(), ProviderError>,
    },
}

/// A fixed set of long-lived tasks pulling jobs off one shared queue.
///
/// The pool size bounds how many commands execute concurrently; everything
/// else waits its turn in the queue. Events come back over a single channel
/// so the provider applies results strictly in completion order.
pub(crate) struct CommandRunner {
    jobs: mpsc::UnboundedSender<Job>,
    events: mpsc::UnboundedReceiver<RunnerEvent>,
}

impl CommandRunner {
    pub fn new(pool_size: usize, tool: Arc<dyn VcsTool>) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(job_rx));
        for index in 0..pool_size.max(1) {
            tokio::spawn(run_loop(
                index,
                queue.clone(),
                event_tx.clone(),
                tool.clone(),
            ));
        }
        Self {
            jobs: job_tx,
            events: event_rx,
        }
    }

    pub fn dispatch(&self, job: Job) -> Result<(), ProviderError> {
        self.jobs.send(job).map_err(|_| ProviderError::ShuttingDown)
    }

    pub fn try_next_event(&mut self) -> Option<RunnerEvent> {
        self.events.try_recv().ok()
    }

    pub async fn next_event(&mut self) -> Option<RunnerEvent> {
        self.events.recv().await
    }
}

async fn run_loop(
    index: usize,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    events: mpsc::UnboundedSender<RunnerEvent>,
    tool: Arc<dyn VcsTool>,
) {
    loop {
        // The lock is held only while waiting for the next job, never while
        // executing one, so the other pool tasks keep draining the queue.
        let job = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some(mut job) = job else {
            // Queue closed and drained: the provider is gone.
            break;
        };

        if job.cancelled.load(Ordering::SeqCst) {
            debug!(id = %job.id, worker = job.worker.name(), "skipping cancelled command");
            let _ = events.send(RunnerEvent::Finished {
                id: job.id,
                command: job.command,
                worker: job.worker,
                result: Err(ProviderError::Cancelled),
            });
            continue;
        }

        if events.send(RunnerEvent::Started { id: job.id }).is_err() {
            break;
        }
        debug!(task = index, id = %job.id, worker = job.worker.name(), "executing");

        let result = job.worker.execute(&job.command, tool.as_ref()).await;
        if let Err(err) = &result {
            warn!(worker = job.worker.name(), %err, "command execution failed");
        }

        if events
            .send(RunnerEvent::Finished {
                id: job.id,
                command: job.command,
                worker: job.worker,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}

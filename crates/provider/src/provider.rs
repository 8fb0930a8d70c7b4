use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;
use vcs::{ChangelistId, ChangelistState, FileState, WorkspaceStatus};

use crate::cache::StateCache;
use crate::cm::CmCli;
use crate::command::{Command, CommandId, CommandKind};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::records::WorkspaceInfo;
use crate::runner::{CommandRunner, Job, RunnerEvent};
use crate::tool::VcsTool;
use crate::workers;

/// Where a submitted command currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Waiting for a pool task.
    Queued,
    /// A worker is driving the tool.
    Executing,
    /// Execution is over; results are being folded into the cache.
    ApplyingResults,
    /// Done. Terminal: a command is never re-dispatched.
    Completed { success: bool },
}

/// Final record of one command.
#[derive(Debug)]
pub struct CompletedCommand {
    pub id: CommandId,
    pub kind: CommandKind,
    pub success: bool,
    /// Whether applying the results changed any cache entry. Drives the
    /// caller's refresh decisions.
    pub changed_cache: bool,
    pub error: Option<ProviderError>,
}

type CompletionCallback = Box<dyn FnOnce(&CompletedCommand) + Send>;

struct PendingEntry {
    state: CommandState,
    cancelled: Arc<AtomicBool>,
    callback: Option<CompletionCallback>,
}

/// The single owner of the state cache and the command queue.
///
/// Execution happens on the background pool, but every cache mutation runs
/// inside [`tick`](Provider::tick), [`wait`](Provider::wait) or
/// [`wait_idle`](Provider::wait_idle), through `&mut self`, on whichever
/// context owns the provider. That exclusive borrow is the whole
/// synchronization story: results are applied one at a time, in completion
/// order, and nothing else ever writes the cache.
///
/// Completion records live only until delivered: a submit callback consumes
/// the record as it completes, [`wait`](Provider::wait) collects it on
/// return, and pollers release it with [`take_outcome`](Provider::take_outcome).
pub struct Provider {
    cache: StateCache,
    runner: CommandRunner,
    pending: HashMap<CommandId, PendingEntry>,
    completed: HashMap<CommandId, CompletedCommand>,
}

impl Provider {
    /// Build a provider talking to the real `cm` binary.
    ///
    /// Must be called from within a tokio runtime; the background pool is
    /// spawned immediately.
    pub fn new(config: ProviderConfig) -> Self {
        let tool: Arc<dyn VcsTool> = Arc::new(CmCli::new(&config));
        Self::with_tool(config, tool)
    }

    /// Build a provider around any tool implementation.
    pub fn with_tool(config: ProviderConfig, tool: Arc<dyn VcsTool>) -> Self {
        Self {
            cache: StateCache::new(),
            runner: CommandRunner::new(config.workers, tool),
            pending: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    /// Validate and enqueue a command. Never blocks; completion is observed
    /// through [`tick`](Self::tick), [`wait`](Self::wait) or a callback.
    pub fn submit(&mut self, command: Command) -> Result<CommandId, ProviderError> {
        self.submit_inner(command, None)
    }

    /// Like [`submit`](Self::submit), with a callback invoked while the
    /// completion is applied, on the context that pumps events.
    pub fn submit_with_callback(
        &mut self,
        command: Command,
        callback: impl FnOnce(&CompletedCommand) + Send + 'static,
    ) -> Result<CommandId, ProviderError> {
        self.submit_inner(command, Some(Box::new(callback)))
    }

    fn submit_inner(
        &mut self,
        command: Command,
        callback: Option<CompletionCallback>,
    ) -> Result<CommandId, ProviderError> {
        command.validate()?;
        if command.kind().requires_workspace() && !self.cache.is_connected() {
            return Err(ProviderError::WorkspaceNotFound);
        }
        if command.kind() == CommandKind::Resolve {
            // Resolution only makes sense for conflicts we know about.
            for path in command.targets() {
                let conflicted = self
                    .cache
                    .file(path)
                    .map_or(false, |state| state.status == WorkspaceStatus::Conflicted);
                if !conflicted {
                    return Err(ProviderError::InvalidArgument(format!(
                        "{path} has no known conflict to resolve"
                    )));
                }
            }
        }

        let id = CommandId::new();
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker = workers::create(command.kind());
        debug!(%id, command = %command.kind(), "submitting");
        self.runner.dispatch(Job {
            id,
            command,
            worker,
            cancelled: cancelled.clone(),
        })?;
        self.pending.insert(
            id,
            PendingEntry {
                state: CommandState::Queued,
                cancelled,
                callback,
            },
        );
        Ok(id)
    }

    /// Apply whatever completions have arrived, without blocking. Returns
    /// how many commands finished.
    pub fn tick(&mut self) -> usize {
        let mut finished = 0;
        while let Some(event) = self.runner.try_next_event() {
            finished += self.handle_event(event);
        }
        finished
    }

    /// Pump completions until `id` finishes, applying every intermediate
    /// result in completion order, and collect its record.
    ///
    /// Collection is one-shot: waiting again on the same id fails with
    /// `InvalidArgument`.
    pub async fn wait(&mut self, id: CommandId) -> Result<CompletedCommand, ProviderError> {
        loop {
            if let Some(completed) = self.completed.remove(&id) {
                return Ok(completed);
            }
            if !self.pending.contains_key(&id) {
                return Err(ProviderError::InvalidArgument(format!(
                    "unknown command {id}"
                )));
            }
            match self.runner.next_event().await {
                Some(event) => {
                    self.handle_event(event);
                }
                None => return Err(ProviderError::ShuttingDown),
            }
        }
    }

    /// Pump completions until nothing is pending. Returns how many commands
    /// finished.
    pub async fn wait_idle(&mut self) -> usize {
        let mut finished = 0;
        while !self.pending.is_empty() {
            match self.runner.next_event().await {
                Some(event) => finished += self.handle_event(event),
                None => break,
            }
        }
        finished
    }

    /// Request cancellation. Effective only while the command is still
    /// queued; once executing it runs to completion and unwanted effects
    /// need a compensating command.
    pub fn cancel(&mut self, id: CommandId) -> bool {
        match self.pending.get(&id) {
            Some(entry) if entry.state == CommandState::Queued => {
                entry.cancelled.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    pub fn command_state(&self, id: CommandId) -> Option<CommandState> {
        if let Some(entry) = self.pending.get(&id) {
            return Some(entry.state);
        }
        self.completed.get(&id).map(|completed| CommandState::Completed {
            success: completed.success,
        })
    }

    /// Peek at an uncollected record without releasing it.
    pub fn outcome(&self, id: CommandId) -> Option<&CompletedCommand> {
        self.completed.get(&id)
    }

    /// Collect a completed command's record, releasing it.
    pub fn take_outcome(&mut self, id: CommandId) -> Option<CompletedCommand> {
        self.completed.remove(&id)
    }

    // Cached-state queries. These serve whatever the workers last reported,
    // connected or not.

    pub fn is_connected(&self) -> bool {
        self.cache.is_connected()
    }

    pub fn workspace(&self) -> Option<&WorkspaceInfo> {
        self.cache.workspace()
    }

    pub fn file_state(&self, path: &str) -> Option<&FileState> {
        self.cache.file(path)
    }

    /// Every tracked file, ordered by path.
    pub fn file_states(&self) -> impl Iterator<Item = &FileState> {
        self.cache.files()
    }

    pub fn changelist_state(&self, id: &ChangelistId) -> Option<&ChangelistState> {
        self.cache.changelist(id)
    }

    pub fn changelists(&self) -> impl Iterator<Item = &ChangelistState> {
        self.cache.changelists()
    }

    fn handle_event(&mut self, event: RunnerEvent) -> usize {
        match event {
            RunnerEvent::Started { id } => {
                if let Some(entry) = self.pending.get_mut(&id) {
                    entry.state = CommandState::Executing;
                }
                0
            }
            RunnerEvent::Finished {
                id,
                command,
                mut worker,
                result,
            } => {
                let Some(mut entry) = self.pending.remove(&id) else {
                    return 1;
                };
                entry.state = CommandState::ApplyingResults;

                // The update phase runs even after a failed execution so
                // partial results land; a cancelled command never executed
                // and has nothing to apply.
                let changed_cache = if matches!(result, Err(ProviderError::Cancelled)) {
                    false
                } else {
                    worker.update_states(&mut self.cache)
                };

                let completed = CompletedCommand {
                    id,
                    kind: command.kind(),
                    success: result.is_ok(),
                    changed_cache,
                    error: result.err(),
                };
                debug!(
                    %id,
                    command = %completed.kind,
                    success = completed.success,
                    changed_cache,
                    "completed"
                );
                match entry.callback.take() {
                    // The callback is the delivery; nothing retains the record.
                    Some(callback) => callback(&completed),
                    None => {
                        self.completed.insert(id, completed);
                    }
                }
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTool;
    use std::time::Duration;

    fn config(workers: usize) -> ProviderConfig {
        ProviderConfig {
            workers,
            ..ProviderConfig::default()
        }
    }

    fn connected_tool() -> ScriptedTool {
        ScriptedTool::new().respond_lines("workspace", &["WK;game;/work/game;srv:8087"])
    }

    async fn connect(provider: &mut Provider) {
        let id = provider.submit(Command::connect()).unwrap();
        let completed = provider.wait(id).await.unwrap();
        assert!(completed.success, "connect failed: {:?}", completed.error);
    }

    #[tokio::test]
    async fn connect_establishes_the_workspace() {
        let tool = Arc::new(connected_tool());
        let mut provider = Provider::with_tool(config(1), tool);

        let id = provider.submit(Command::connect()).unwrap();
        let completed = provider.wait(id).await.unwrap();

        assert!(completed.success);
        assert!(completed.changed_cache);
        assert!(provider.is_connected());
        assert_eq!(provider.workspace().unwrap().name, "game");
    }

    #[tokio::test]
    async fn failed_connect_leaves_a_usable_disconnected_provider() {
        let tool = Arc::new(ScriptedTool::new().respond_error("workspace", 4, "not a workspace"));
        let mut provider = Provider::with_tool(config(1), tool.clone());

        let id = provider.submit(Command::connect()).unwrap();
        let completed = provider.wait(id).await.unwrap();
        assert!(!completed.success);
        assert!(matches!(
            completed.error,
            Some(ProviderError::WorkspaceNotFound)
        ));
        assert!(!provider.is_connected());

        // Workspace-requiring commands are rejected before dispatch...
        let calls_before = tool.calls().len();
        let err = provider.submit(Command::check_out(["a.txt"])).unwrap_err();
        assert!(matches!(err, ProviderError::WorkspaceNotFound));
        assert_eq!(tool.calls().len(), calls_before);

        // ...but cached queries still serve, and reconnecting stays possible.
        assert_eq!(provider.changelists().count(), 1);
        assert!(provider.submit(Command::connect()).is_ok());
    }

    #[tokio::test]
    async fn invalid_commands_never_reach_the_queue() {
        let tool = Arc::new(connected_tool());
        let mut provider = Provider::with_tool(config(1), tool.clone());
        connect(&mut provider).await;

        let calls_before = tool.calls().len();
        let err = provider
            .submit(Command::new(CommandKind::CheckOut))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
        assert_eq!(tool.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn checkout_updates_states_and_changelists() {
        let tool = Arc::new(
            connected_tool().respond_lines("checkout", &["ST;CO;a.txt;cl=feature", "ST;CO;b.txt"]),
        );
        let mut provider = Provider::with_tool(config(1), tool);
        connect(&mut provider).await;

        let id = provider
            .submit(Command::check_out(["a.txt", "b.txt"]))
            .unwrap();
        let completed = provider.wait(id).await.unwrap();

        assert!(completed.success);
        assert!(completed.changed_cache);
        assert_eq!(
            provider.file_state("a.txt").unwrap().status,
            WorkspaceStatus::CheckedOut
        );
        assert!(provider
            .changelist_state(&ChangelistId::new("feature"))
            .unwrap()
            .contains("a.txt"));
        assert!(provider
            .changelist_state(&ChangelistId::default_changelist())
            .unwrap()
            .contains("b.txt"));
    }

    #[tokio::test(start_paused = true)]
    async fn command_states_progress_to_completed() {
        let tool = Arc::new(connected_tool().with_delay(Duration::from_millis(20)));
        let mut provider = Provider::with_tool(config(1), tool);
        connect(&mut provider).await;

        let id = provider
            .submit(Command::update_status(Vec::<String>::new()))
            .unwrap();
        assert_eq!(provider.command_state(id), Some(CommandState::Queued));

        // Let the pool task pick the job up and park in the tool call.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        provider.tick();
        assert_eq!(provider.command_state(id), Some(CommandState::Executing));

        let completed = provider.wait(id).await.unwrap();
        assert!(completed.success);
        // Collected on wait: the provider no longer tracks the id.
        assert!(provider.command_state(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_before_execution_skips_the_tool() {
        let tool = Arc::new(connected_tool().with_delay(Duration::from_millis(50)));
        let mut provider = Provider::with_tool(config(1), tool.clone());
        connect(&mut provider).await;

        // The single pool task is busy with the first command; the second
        // sits in the queue where cancellation can still reach it.
        let slow = provider
            .submit(Command::update_status(Vec::<String>::new()))
            .unwrap();
        let doomed = provider.submit(Command::sync()).unwrap();
        assert!(provider.cancel(doomed));

        provider.wait_idle().await;

        assert!(provider.outcome(slow).unwrap().success);
        let outcome = provider.outcome(doomed).unwrap();
        assert!(!outcome.success);
        assert!(matches!(outcome.error, Some(ProviderError::Cancelled)));
        assert!(!outcome.changed_cache);

        let operations: Vec<String> = tool
            .calls()
            .into_iter()
            .map(|(operation, _)| operation)
            .collect();
        assert!(!operations.contains(&"update".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_commands_on_disjoint_paths_do_not_interfere() {
        let tool = Arc::new(
            connected_tool()
                .with_delay(Duration::from_millis(20))
                .respond_lines("checkout", &["ST;CO;a.txt"])
                .respond_lines("add", &["ST;AD;b.txt"]),
        );
        let mut provider = Provider::with_tool(config(2), tool);
        connect(&mut provider).await;

        // Both execute at once on the two pool tasks; whichever finishes
        // first is applied first, and neither clobbers the other.
        provider.submit(Command::check_out(["a.txt"])).unwrap();
        provider.submit(Command::mark_for_add(["b.txt"])).unwrap();
        assert_eq!(provider.wait_idle().await, 2);

        assert_eq!(
            provider.file_state("a.txt").unwrap().status,
            WorkspaceStatus::CheckedOut
        );
        assert_eq!(
            provider.file_state("b.txt").unwrap().status,
            WorkspaceStatus::Added
        );
        let paths: Vec<&str> = provider
            .file_states()
            .map(|state| state.path.as_str())
            .collect();
        assert_eq!(paths, ["a.txt", "b.txt"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_size_caps_concurrent_executions() {
        let tool = Arc::new(connected_tool().with_delay(Duration::from_millis(20)));
        let mut provider = Provider::with_tool(config(2), tool.clone());
        connect(&mut provider).await;

        for _ in 0..4 {
            provider
                .submit(Command::update_status(Vec::<String>::new()))
                .unwrap();
        }
        let finished = provider.wait_idle().await;

        assert_eq!(finished, 4);
        assert_eq!(tool.peak_concurrency(), 2);
    }

    #[tokio::test]
    async fn callbacks_fire_while_results_are_applied() {
        let tool = Arc::new(connected_tool());
        let mut provider = Provider::with_tool(config(1), tool);

        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let id = provider
            .submit_with_callback(Command::connect(), move |completed| {
                flag.store(completed.success, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(provider.wait_idle().await, 1);
        assert!(fired.load(Ordering::SeqCst));
        // The callback consumed the record; nothing is left to collect.
        assert!(provider.outcome(id).is_none());
    }

    #[tokio::test]
    async fn delivered_records_are_released() {
        let tool = Arc::new(connected_tool().respond_lines("status", &["ST;UC;a.txt"]));
        let mut provider = Provider::with_tool(config(1), tool);
        connect(&mut provider).await;

        // Collected by wait: gone afterwards.
        let first = provider.submit(Command::update_status(["a.txt"])).unwrap();
        assert!(provider.wait(first).await.unwrap().success);
        assert!(provider.outcome(first).is_none());
        assert!(provider.command_state(first).is_none());

        // Not yet collected: held for polling until taken.
        let second = provider.submit(Command::update_status(["a.txt"])).unwrap();
        provider.wait_idle().await;
        assert_eq!(
            provider.command_state(second),
            Some(CommandState::Completed { success: true })
        );
        let taken = provider.take_outcome(second).unwrap();
        assert!(taken.success);
        assert!(provider.take_outcome(second).is_none());
        assert!(provider.command_state(second).is_none());
    }

    #[tokio::test]
    async fn failed_checkin_still_applies_partial_results() {
        let tool = Arc::new(
            connected_tool()
                .respond_lines("checkout", &["ST;CO;a.txt;cl=hotfix", "ST;CO;b.txt;cl=hotfix"])
                .respond_output("checkin", 1, &["CI;a.txt"], &["b.txt is locked"]),
        );
        let mut provider = Provider::with_tool(config(1), tool);
        connect(&mut provider).await;

        let id = provider
            .submit(Command::check_out(["a.txt", "b.txt"]))
            .unwrap();
        provider.wait(id).await.unwrap();

        let mut hotfix = ChangelistId::new("hotfix");
        hotfix.set_initialized();
        let id = provider
            .submit(Command::check_in(["a.txt", "b.txt"], "ship it").with_changelist(hotfix))
            .unwrap();
        let completed = provider.wait(id).await.unwrap();

        assert!(!completed.success);
        assert!(matches!(completed.error, Some(ProviderError::Tool(_))));
        // The path the tool managed to check in is clean again; the other
        // keeps its pending change.
        assert!(completed.changed_cache);
        assert_eq!(
            provider.file_state("a.txt").unwrap().status,
            WorkspaceStatus::Controlled
        );
        assert_eq!(
            provider.file_state("b.txt").unwrap().status,
            WorkspaceStatus::CheckedOut
        );
    }

    #[tokio::test]
    async fn resolve_is_rejected_without_a_known_conflict() {
        let tool = Arc::new(
            connected_tool()
                .respond_lines("status", &["ST;CF;merge.txt", "ST;CO;plain.txt"])
                .respond_lines("resolve", &["RS;merge.txt"]),
        );
        let mut provider = Provider::with_tool(config(1), tool);
        connect(&mut provider).await;

        let id = provider
            .submit(Command::update_status(["merge.txt", "plain.txt"]))
            .unwrap();
        provider.wait(id).await.unwrap();

        let err = provider
            .submit(Command::resolve(["plain.txt"]))
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));

        let id = provider.submit(Command::resolve(["merge.txt"])).unwrap();
        assert!(provider.wait(id).await.unwrap().success);
        assert_eq!(
            provider.file_state("merge.txt").unwrap().status,
            WorkspaceStatus::CheckedOut
        );
    }

    #[tokio::test]
    async fn waiting_on_an_unknown_command_fails_fast() {
        let tool = Arc::new(connected_tool());
        let mut provider = Provider::with_tool(config(1), tool);

        let unknown = CommandId::new();
        let err = provider.wait(unknown).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
        assert!(provider.command_state(unknown).is_none());
    }
}

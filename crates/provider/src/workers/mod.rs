//! One worker per operation kind.
//!
//! Workers obey a two-phase contract. `execute` runs on a background task:
//! it drives the tool and parses the output into plain values stashed on the
//! worker itself; it never touches the cache. `update_states` runs later on
//! the context that owns the provider and folds the stashed values into the
//! cache, returning whether anything actually changed. The update phase runs
//! even when `execute` failed, so per-path results captured before the
//! failure still land; it must stay idempotent, which the cache's
//! merge-by-value operations give for free.

use async_trait::async_trait;
use vcs::FileState;

use crate::cache::StateCache;
use crate::command::{Command, CommandKind};
use crate::error::ProviderError;
use crate::records::{self, Record};
use crate::tool::{ToolOutput, VcsTool};

mod changelists;
mod checkin;
mod connect;
mod files;
mod revert;
mod status;
mod sync;

pub use changelists::{
    DeleteChangelistWorker, EditChangelistWorker, GetPendingChangelistsWorker,
    NewChangelistWorker, ReopenWorker,
};
pub use checkin::CheckInWorker;
pub use connect::{ConnectWorker, MakeWorkspaceWorker};
pub use files::{CheckOutWorker, CopyWorker, DeleteWorker, MarkForAddWorker};
pub use revert::{RevertAllWorker, RevertUnchangedWorker, RevertWorker};
pub use status::UpdateStatusWorker;
pub use sync::{ResolveWorker, SyncWorker};

/// Two-phase operation: background execute, foreground state application.
#[async_trait]
pub trait Worker: Send {
    fn name(&self) -> &'static str;

    /// Drive the tool and stash parsed results on `self`.
    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError>;

    /// Fold the stashed results into the cache; `true` if anything changed.
    fn update_states(&mut self, cache: &mut StateCache) -> bool;
}

pub(crate) fn create(kind: CommandKind) -> Box<dyn Worker> {
    match kind {
        CommandKind::Connect => Box::new(ConnectWorker::default()),
        CommandKind::MakeWorkspace => Box::new(MakeWorkspaceWorker::default()),
        CommandKind::UpdateStatus => Box::new(UpdateStatusWorker::default()),
        CommandKind::CheckOut => Box::new(CheckOutWorker::default()),
        CommandKind::CheckIn => Box::new(CheckInWorker::default()),
        CommandKind::MarkForAdd => Box::new(MarkForAddWorker::default()),
        CommandKind::Delete => Box::new(DeleteWorker::default()),
        CommandKind::Copy => Box::new(CopyWorker::default()),
        CommandKind::Revert => Box::new(RevertWorker::default()),
        CommandKind::RevertUnchanged => Box::new(RevertUnchangedWorker::default()),
        CommandKind::RevertAll => Box::new(RevertAllWorker::default()),
        CommandKind::Sync => Box::new(SyncWorker::default()),
        CommandKind::Resolve => Box::new(ResolveWorker::default()),
        CommandKind::GetPendingChangelists => Box::new(GetPendingChangelistsWorker::default()),
        CommandKind::NewChangelist => Box::new(NewChangelistWorker::default()),
        CommandKind::DeleteChangelist => Box::new(DeleteChangelistWorker::default()),
        CommandKind::EditChangelist => Box::new(EditChangelistWorker::default()),
        CommandKind::Reopen => Box::new(ReopenWorker::default()),
    }
}

/// Flag appended to every invocation whose output we parse.
const MACHINE_FLAG: &str = "--machinereadable";

/// Run a path-oriented operation and collect the `ST` records it prints.
///
/// On a failed run the output is parsed lossily and the failure returned, so
/// whatever the tool managed to do before giving up still reaches the cache.
async fn invoke_for_states(
    tool: &dyn VcsTool,
    operation: &str,
    args: Vec<String>,
) -> (Vec<FileState>, Result<(), ProviderError>) {
    let output = match tool.invoke(operation, &args).await {
        Ok(output) => output,
        Err(err) => return (Vec::new(), Err(err.into())),
    };
    let (records, result) = records_from(&output, operation);
    let states = records
        .into_iter()
        .filter_map(|record| match record {
            Record::Status(status) => Some(status.into_file_state()),
            _ => None,
        })
        .collect();
    (states, result)
}

/// Strict parse on success, lossy parse plus the tool's failure otherwise.
fn records_from(
    output: &ToolOutput,
    operation: &str,
) -> (Vec<Record>, Result<(), ProviderError>) {
    if output.success() {
        match records::parse_lines(&output.stdout_lines) {
            Ok(records) => (records, Ok(())),
            Err(err) => (Vec::new(), Err(err.into())),
        }
    } else {
        let records = records::parse_lines_lossy(&output.stdout_lines);
        (records, Err(output.failure(operation).into()))
    }
}

/// Apply a batch of parsed file states to the cache.
fn apply_states(cache: &mut StateCache, states: &mut Vec<FileState>) -> bool {
    let mut changed = false;
    for state in states.drain(..) {
        changed |= cache.apply_file_state(state);
    }
    changed
}

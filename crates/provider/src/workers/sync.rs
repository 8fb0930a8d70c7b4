use async_trait::async_trait;
use vcs::{FileState, WorkspaceStatus};

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::records::{Record, RevisionRecord};
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::{records_from, MACHINE_FLAG};

/// Brings the whole workspace up to the latest changeset. The tool prints
/// one `UP` record per file it touched, each carrying the new head revision.
#[derive(Debug, Default)]
pub struct SyncWorker {
    updated: Vec<RevisionRecord>,
}

#[async_trait]
impl Worker for SyncWorker {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn execute(
        &mut self,
        _command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let output = tool.invoke("update", &[MACHINE_FLAG.to_string()]).await?;
        let (records, result) = records_from(&output, "update");
        self.updated = records
            .into_iter()
            .filter_map(|record| match record {
                Record::Updated(updated) => Some(updated),
                _ => None,
            })
            .collect();
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        let mut changed = false;
        for updated in self.updated.drain(..) {
            changed |= cache.apply_file_state(FileState {
                status: WorkspaceStatus::Controlled,
                ..FileState::new(updated.path.clone())
            });
            changed |= cache.add_revisions(&updated.path, [updated.revision]);
        }
        changed
    }
}

/// Marks conflicted paths as merged. A resolved file is left checked out,
/// carrying the merge result as a pending change.
#[derive(Debug, Default)]
pub struct ResolveWorker {
    resolved: Vec<String>,
}

#[async_trait]
impl Worker for ResolveWorker {
    fn name(&self) -> &'static str {
        "resolve"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut args = command.targets().to_vec();
        args.push(MACHINE_FLAG.to_string());
        let output = tool.invoke("resolve", &args).await?;
        let (records, result) = records_from(&output, "resolve");
        self.resolved = records
            .into_iter()
            .filter_map(|record| match record {
                Record::Resolved(path) => Some(path),
                _ => None,
            })
            .collect();
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        let mut changed = false;
        for path in self.resolved.drain(..) {
            changed |= cache.set_status(&path, WorkspaceStatus::CheckedOut);
        }
        changed
    }
}

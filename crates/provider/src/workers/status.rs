use async_trait::async_trait;
use vcs::FileState;

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::records::{Record, RevisionRecord};
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::{apply_states, invoke_for_states, records_from, MACHINE_FLAG};

/// Refreshes the cached state of the given paths, or of the whole workspace
/// when none are given. Optionally also fetches per-file history.
#[derive(Debug, Default)]
pub struct UpdateStatusWorker {
    states: Vec<FileState>,
    history: Vec<RevisionRecord>,
}

#[async_trait]
impl Worker for UpdateStatusWorker {
    fn name(&self) -> &'static str {
        "update-status"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut args = command.targets().to_vec();
        args.push(MACHINE_FLAG.to_string());
        let (states, result) = invoke_for_states(tool, "status", args).await;
        self.states = states;
        result?;

        if command.update_history() {
            let mut args = command.targets().to_vec();
            args.push(MACHINE_FLAG.to_string());
            let output = tool.invoke("history", &args).await?;
            let (records, result) = records_from(&output, "history");
            self.history = records
                .into_iter()
                .filter_map(|record| match record {
                    Record::Revision(revision) => Some(revision),
                    _ => None,
                })
                .collect();
            result?;
        }
        Ok(())
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        let mut changed = apply_states(cache, &mut self.states);
        for record in self.history.drain(..) {
            changed |= cache.add_revisions(&record.path, [record.revision]);
        }
        changed
    }
}

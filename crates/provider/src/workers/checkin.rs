use async_trait::async_trait;
use tracing::debug;
use vcs::{ChangelistId, FileState, WorkspaceStatus};

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::records::Record;
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::{records_from, MACHINE_FLAG};

/// Submits pending changes. The tool prints one `CI` record per path it
/// actually checked in; on a partial failure only those paths are cleared.
#[derive(Debug, Default)]
pub struct CheckInWorker {
    checked_in: Vec<String>,
    source: Option<ChangelistId>,
}

#[async_trait]
impl Worker for CheckInWorker {
    fn name(&self) -> &'static str {
        "checkin"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        self.source = command.changelist().cloned();

        let mut args = vec![
            "-m".to_string(),
            command.description().unwrap_or_default().to_string(),
        ];
        if command.targets().is_empty() {
            // Whole-changelist checkin: the tool picks the paths.
            if let Some(source) = &self.source {
                args.push("--changelist".to_string());
                args.push(source.name().to_string());
            }
        } else {
            args.extend(command.targets().iter().cloned());
        }
        args.push(MACHINE_FLAG.to_string());

        let output = tool.invoke("checkin", &args).await?;
        let (records, result) = records_from(&output, "checkin");
        self.checked_in = records
            .into_iter()
            .filter_map(|record| match record {
                Record::CheckedIn(path) => Some(path),
                _ => None,
            })
            .collect();
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        if let Some(source) = &self.source {
            debug!(changelist = %source, paths = self.checked_in.len(), "checkin applied");
        }
        let mut changed = false;
        for path in self.checked_in.drain(..) {
            // Checked-in files are clean again and leave whatever changelist
            // they were opened under.
            changed |= cache.apply_file_state(FileState {
                status: WorkspaceStatus::Controlled,
                ..FileState::new(path)
            });
        }
        changed
    }
}

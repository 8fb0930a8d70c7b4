use async_trait::async_trait;
use vcs::FileState;

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::{apply_states, invoke_for_states, MACHINE_FLAG};

fn target_args(command: &Command) -> Vec<String> {
    let mut args = command.targets().to_vec();
    args.push(MACHINE_FLAG.to_string());
    args
}

/// Opens files for edit.
#[derive(Debug, Default)]
pub struct CheckOutWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for CheckOutWorker {
    fn name(&self) -> &'static str {
        "checkout"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let (states, result) = invoke_for_states(tool, "checkout", target_args(command)).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

/// Schedules files to be added on the next checkin.
#[derive(Debug, Default)]
pub struct MarkForAddWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for MarkForAddWorker {
    fn name(&self) -> &'static str {
        "mark-for-add"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let (states, result) = invoke_for_states(tool, "add", target_args(command)).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

/// Schedules files for deletion.
#[derive(Debug, Default)]
pub struct DeleteWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for DeleteWorker {
    fn name(&self) -> &'static str {
        "delete"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let (states, result) = invoke_for_states(tool, "remove", target_args(command)).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

/// Copies a controlled file to a new path, keeping its lineage.
#[derive(Debug, Default)]
pub struct CopyWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for CopyWorker {
    fn name(&self) -> &'static str {
        "copy"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut args = command.targets().to_vec();
        if let Some(destination) = command.destination_path() {
            args.push(destination.to_string());
        }
        args.push(MACHINE_FLAG.to_string());
        let (states, result) = invoke_for_states(tool, "copy", args).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

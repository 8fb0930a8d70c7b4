use async_trait::async_trait;
use vcs::FileState;

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::{apply_states, invoke_for_states, MACHINE_FLAG};

/// Undoes pending changes on explicit paths. The tool reports each path's
/// restored status; any changelist association is gone with the change.
#[derive(Debug, Default)]
pub struct RevertWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for RevertWorker {
    fn name(&self) -> &'static str {
        "revert"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut args = command.targets().to_vec();
        args.push(MACHINE_FLAG.to_string());
        let (states, result) = invoke_for_states(tool, "undochange", args).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

/// Reverts only the paths that are checked out but carry no actual edit.
/// The tool decides which those are; output lists just the reverted ones.
#[derive(Debug, Default)]
pub struct RevertUnchangedWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for RevertUnchangedWorker {
    fn name(&self) -> &'static str {
        "revert-unchanged"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut args = command.targets().to_vec();
        args.push(MACHINE_FLAG.to_string());
        let (states, result) = invoke_for_states(tool, "undounchanged", args).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

/// Undoes every pending change in the workspace. Targets are discovered by
/// the tool at execution time, not taken from the command.
#[derive(Debug, Default)]
pub struct RevertAllWorker {
    states: Vec<FileState>,
}

#[async_trait]
impl Worker for RevertAllWorker {
    fn name(&self) -> &'static str {
        "revert-all"
    }

    async fn execute(
        &mut self,
        _command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let args = vec!["--all".to_string(), MACHINE_FLAG.to_string()];
        let (states, result) = invoke_for_states(tool, "undochange", args).await;
        self.states = states;
        result
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        apply_states(cache, &mut self.states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTool;
    use vcs::{ChangelistId, WorkspaceStatus};

    fn checked_out(path: &str, changelist: &str) -> FileState {
        let mut id = ChangelistId::new(changelist);
        id.set_initialized();
        FileState {
            changelist: id,
            ..FileState::with_status(path, WorkspaceStatus::CheckedOut)
        }
    }

    #[tokio::test]
    async fn revert_restores_status_and_clears_changelist() {
        let mut cache = StateCache::new();
        cache.apply_file_state(checked_out("a.txt", "feature"));

        let tool = ScriptedTool::new().respond_lines("undochange", &["ST;UC;a.txt"]);
        let mut worker = RevertWorker::default();
        worker
            .execute(&Command::revert(["a.txt"]), &tool)
            .await
            .unwrap();

        assert!(worker.update_states(&mut cache));
        let file = cache.file("a.txt").unwrap();
        assert_eq!(file.status, WorkspaceStatus::Controlled);
        assert!(file.changelist.is_default());
        assert!(!cache
            .changelist(&ChangelistId::new("feature"))
            .unwrap()
            .contains("a.txt"));
    }

    #[tokio::test]
    async fn revert_all_reverts_whatever_the_tool_reports() {
        let mut cache = StateCache::new();
        cache.apply_file_state(checked_out("a.txt", "feature"));
        cache.apply_file_state(FileState::with_status("new.txt", WorkspaceStatus::Added));

        let tool = ScriptedTool::new()
            .respond_lines("undochange", &["ST;UC;a.txt", "ST;PV;new.txt"]);
        let mut worker = RevertAllWorker::default();
        worker.execute(&Command::revert_all(), &tool).await.unwrap();

        assert!(worker.update_states(&mut cache));
        assert_eq!(
            cache.file("a.txt").unwrap().status,
            WorkspaceStatus::Controlled
        );
        // A reverted add goes back to being a private file.
        assert_eq!(
            cache.file("new.txt").unwrap().status,
            WorkspaceStatus::Private
        );

        let (_, args) = &tool.calls()[0];
        assert_eq!(args[0], "--all");
    }

    #[tokio::test]
    async fn revert_unchanged_touches_only_reported_paths() {
        let mut cache = StateCache::new();
        cache.apply_file_state(checked_out("dirty.txt", "feature"));
        cache.apply_file_state(checked_out("clean.txt", "feature"));

        let tool = ScriptedTool::new().respond_lines("undounchanged", &["ST;UC;clean.txt"]);
        let mut worker = RevertUnchangedWorker::default();
        worker
            .execute(&Command::revert_unchanged(["dirty.txt", "clean.txt"]), &tool)
            .await
            .unwrap();

        assert!(worker.update_states(&mut cache));
        assert_eq!(
            cache.file("dirty.txt").unwrap().status,
            WorkspaceStatus::CheckedOut
        );
        assert_eq!(
            cache.file("clean.txt").unwrap().status,
            WorkspaceStatus::Controlled
        );
    }
}

use async_trait::async_trait;
use tracing::info;

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::records::{self, Record, WorkspaceInfo};
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::MACHINE_FLAG;

/// Workspace discovery. Probes that the tool runs at all, then asks it for
/// the workspace enclosing the working directory.
#[derive(Debug, Default)]
pub struct ConnectWorker {
    info: Option<WorkspaceInfo>,
}

#[async_trait]
impl Worker for ConnectWorker {
    fn name(&self) -> &'static str {
        "connect"
    }

    async fn execute(
        &mut self,
        _command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        tool.invoke("version", &[])
            .await?
            .require_success("version")?;

        let output = tool
            .invoke("workspace", &["info".to_string(), MACHINE_FLAG.to_string()])
            .await?;
        if !output.success() {
            return Err(ProviderError::WorkspaceNotFound);
        }
        self.info = records::parse_lines(&output.stdout_lines)?
            .into_iter()
            .find_map(|record| match record {
                Record::Workspace(info) => Some(info),
                _ => None,
            });
        match &self.info {
            Some(info) => {
                info!(workspace = %info.name, server = %info.server, "connected");
                Ok(())
            }
            None => Err(ProviderError::WorkspaceNotFound),
        }
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        // A failed discovery leaves the provider disconnected but usable.
        match self.info.take() {
            Some(info) => cache.set_workspace(info),
            None => cache.clear_workspace(),
        }
    }
}

/// Creates a repository and a workspace bound to it. Re-running against an
/// existing name surfaces the tool's own conflict error; this layer adds no
/// idempotency.
#[derive(Debug, Default)]
pub struct MakeWorkspaceWorker;

#[async_trait]
impl Worker for MakeWorkspaceWorker {
    fn name(&self) -> &'static str {
        "make-workspace"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let workspace = command.workspace_name().unwrap_or_default();
        let repository = command.repository_name().unwrap_or_default();
        let server = command.server_url().unwrap_or_default();

        tool.invoke(
            "mkrep",
            &[repository.to_string(), "--server".to_string(), server.to_string()],
        )
        .await?
        .require_success("mkrep")?;

        tool.invoke(
            "mkwk",
            &[
                workspace.to_string(),
                "--repo".to_string(),
                format!("{repository}@{server}"),
            ],
        )
        .await?
        .require_success("mkwk")?;

        info!(workspace, repository, server, "workspace created");
        Ok(())
    }

    fn update_states(&mut self, _cache: &mut StateCache) -> bool {
        // Creation reports nothing about file states; a follow-up connect
        // establishes the new workspace.
        false
    }
}

use std::fmt;

use uuid::Uuid;
use vcs::ChangelistId;

use crate::error::ProviderError;

/// Ticket handed back by `submit`, used to poll, wait or cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(Uuid);

impl CommandId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Every operation the provider can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Connect,
    MakeWorkspace,
    UpdateStatus,
    CheckOut,
    CheckIn,
    MarkForAdd,
    Delete,
    Copy,
    Revert,
    RevertUnchanged,
    RevertAll,
    Sync,
    Resolve,
    GetPendingChangelists,
    NewChangelist,
    DeleteChangelist,
    EditChangelist,
    Reopen,
}

impl CommandKind {
    /// Whether the operation is meaningless without explicit target paths.
    ///
    /// `RevertAll` and `UpdateStatus` run workspace-wide when given none;
    /// `CheckIn` may name a source changelist instead of paths.
    pub fn requires_targets(self) -> bool {
        matches!(
            self,
            Self::CheckOut
                | Self::MarkForAdd
                | Self::Delete
                | Self::Copy
                | Self::Revert
                | Self::RevertUnchanged
                | Self::Resolve
                | Self::Reopen
        )
    }

    /// Whether the operation needs an established workspace. Connection and
    /// workspace creation are how one gets established in the first place.
    pub fn requires_workspace(self) -> bool {
        !matches!(self, Self::Connect | Self::MakeWorkspace)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::MakeWorkspace => "make-workspace",
            Self::UpdateStatus => "update-status",
            Self::CheckOut => "checkout",
            Self::CheckIn => "checkin",
            Self::MarkForAdd => "mark-for-add",
            Self::Delete => "delete",
            Self::Copy => "copy",
            Self::Revert => "revert",
            Self::RevertUnchanged => "revert-unchanged",
            Self::RevertAll => "revert-all",
            Self::Sync => "sync",
            Self::Resolve => "resolve",
            Self::GetPendingChangelists => "get-pending-changelists",
            Self::NewChangelist => "new-changelist",
            Self::DeleteChangelist => "delete-changelist",
            Self::EditChangelist => "edit-changelist",
            Self::Reopen => "reopen",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable request: built by the caller, validated at submission,
/// consumed exactly once by a worker.
#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandKind,
    targets: Vec<String>,
    changelist: Option<ChangelistId>,
    description: Option<String>,
    destination_path: Option<String>,
    workspace_name: Option<String>,
    repository_name: Option<String>,
    server_url: Option<String>,
    update_history: bool,
    cleanup_cache: bool,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            targets: Vec::new(),
            changelist: None,
            description: None,
            destination_path: None,
            workspace_name: None,
            repository_name: None,
            server_url: None,
            update_history: false,
            cleanup_cache: false,
        }
    }

    // Shorthand constructors, one per operation.

    pub fn connect() -> Self {
        Self::new(CommandKind::Connect)
    }

    pub fn make_workspace(
        workspace: impl Into<String>,
        repository: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        let mut command = Self::new(CommandKind::MakeWorkspace);
        command.workspace_name = Some(workspace.into());
        command.repository_name = Some(repository.into());
        command.server_url = Some(server.into());
        command
    }

    pub fn update_status(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::UpdateStatus).with_targets(targets)
    }

    pub fn check_out(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::CheckOut).with_targets(targets)
    }

    pub fn check_in(
        targets: impl IntoIterator<Item = impl Into<String>>,
        description: impl Into<String>,
    ) -> Self {
        Self::new(CommandKind::CheckIn)
            .with_targets(targets)
            .with_description(description)
    }

    /// Check in everything pending under one changelist.
    pub fn check_in_changelist(id: ChangelistId, description: impl Into<String>) -> Self {
        Self::new(CommandKind::CheckIn)
            .with_changelist(id)
            .with_description(description)
    }

    pub fn mark_for_add(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::MarkForAdd).with_targets(targets)
    }

    pub fn delete(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::Delete).with_targets(targets)
    }

    pub fn copy(source: impl Into<String>, destination: impl Into<String>) -> Self {
        let mut command = Self::new(CommandKind::Copy).with_targets([source.into()]);
        command.destination_path = Some(destination.into());
        command
    }

    pub fn revert(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::Revert).with_targets(targets)
    }

    pub fn revert_unchanged(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::RevertUnchanged).with_targets(targets)
    }

    pub fn revert_all() -> Self {
        Self::new(CommandKind::RevertAll)
    }

    pub fn sync() -> Self {
        Self::new(CommandKind::Sync)
    }

    pub fn resolve(targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(CommandKind::Resolve).with_targets(targets)
    }

    pub fn pending_changelists(cleanup_cache: bool) -> Self {
        let mut command = Self::new(CommandKind::GetPendingChangelists);
        command.cleanup_cache = cleanup_cache;
        command
    }

    pub fn new_changelist(id: ChangelistId, description: impl Into<String>) -> Self {
        Self::new(CommandKind::NewChangelist)
            .with_changelist(id)
            .with_description(description)
    }

    pub fn delete_changelist(id: ChangelistId) -> Self {
        Self::new(CommandKind::DeleteChangelist).with_changelist(id)
    }

    pub fn edit_changelist(id: ChangelistId, description: impl Into<String>) -> Self {
        Self::new(CommandKind::EditChangelist)
            .with_changelist(id)
            .with_description(description)
    }

    pub fn reopen(
        targets: impl IntoIterator<Item = impl Into<String>>,
        destination: ChangelistId,
    ) -> Self {
        Self::new(CommandKind::Reopen)
            .with_targets(targets)
            .with_changelist(destination)
    }

    // Optional pieces.

    pub fn with_targets(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_changelist(mut self, id: ChangelistId) -> Self {
        self.changelist = Some(id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Also fetch per-file history (status refresh only).
    pub fn with_history(mut self) -> Self {
        self.update_history = true;
        self
    }

    // Accessors.

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn changelist(&self) -> Option<&ChangelistId> {
        self.changelist.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn destination_path(&self) -> Option<&str> {
        self.destination_path.as_deref()
    }

    pub fn workspace_name(&self) -> Option<&str> {
        self.workspace_name.as_deref()
    }

    pub fn repository_name(&self) -> Option<&str> {
        self.repository_name.as_deref()
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }

    pub fn update_history(&self) -> bool {
        self.update_history
    }

    pub fn cleanup_cache(&self) -> bool {
        self.cleanup_cache
    }

    /// Reject obviously unusable commands before they reach the queue.
    pub(crate) fn validate(&self) -> Result<(), ProviderError> {
        if self.kind.requires_targets() && self.targets.is_empty() {
            return Err(invalid(format!("{} requires target paths", self.kind)));
        }
        if self.targets.iter().any(|path| path.is_empty()) {
            return Err(invalid("target paths must not be empty".to_string()));
        }
        match self.kind {
            CommandKind::CheckIn => {
                if self.description.as_deref().map_or(true, str::is_empty) {
                    return Err(invalid("checkin requires a description".to_string()));
                }
                let has_changelist = self
                    .changelist
                    .as_ref()
                    .is_some_and(|id| !id.name().is_empty());
                if self.targets.is_empty() && !has_changelist {
                    return Err(invalid(
                        "checkin requires target paths or a changelist".to_string(),
                    ));
                }
            }
            CommandKind::MakeWorkspace => {
                let complete = [
                    self.workspace_name.as_deref(),
                    self.repository_name.as_deref(),
                    self.server_url.as_deref(),
                ]
                .iter()
                .all(|field| field.is_some_and(|value| !value.is_empty()));
                if !complete {
                    return Err(invalid(
                        "make-workspace requires workspace, repository and server names"
                            .to_string(),
                    ));
                }
            }
            CommandKind::Copy => {
                if self.destination_path.as_deref().map_or(true, str::is_empty) {
                    return Err(invalid("copy requires a destination path".to_string()));
                }
            }
            CommandKind::NewChangelist
            | CommandKind::DeleteChangelist
            | CommandKind::EditChangelist
            | CommandKind::Reopen => {
                let named = self
                    .changelist
                    .as_ref()
                    .is_some_and(|id| !id.name().is_empty());
                if !named {
                    return Err(invalid(format!("{} requires a changelist name", self.kind)));
                }
                if self.kind == CommandKind::DeleteChangelist
                    && self.changelist.as_ref().is_some_and(ChangelistId::is_default)
                {
                    return Err(invalid(
                        "the default changelist cannot be deleted".to_string(),
                    ));
                }
                if matches!(
                    self.kind,
                    CommandKind::NewChangelist | CommandKind::EditChangelist
                ) && self.description.is_none()
                {
                    return Err(invalid(format!("{} requires a description", self.kind)));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn invalid(message: String) -> ProviderError {
    ProviderError::InvalidArgument(message)
}

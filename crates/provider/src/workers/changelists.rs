use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::debug;
use vcs::{ChangelistId, FileState, ShelvedFile};

use crate::cache::StateCache;
use crate::command::Command;
use crate::error::ProviderError;
use crate::records::{self, PendingChangelist};
use crate::tool::VcsTool;
use crate::workers::Worker;

use super::MACHINE_FLAG;

fn required_changelist(command: &Command) -> Result<ChangelistId, ProviderError> {
    command.changelist().cloned().ok_or_else(|| {
        ProviderError::InvalidArgument(format!("{} requires a changelist name", command.kind()))
    })
}

/// Full refresh of the pending-changelists picture.
///
/// The result is authoritative for every changelist it names; with the
/// cleanup flag set it is authoritative for the whole cache, and changelists
/// it does not name are dropped as deleted or submitted elsewhere.
#[derive(Debug, Default)]
pub struct GetPendingChangelistsWorker {
    lists: Vec<PendingChangelist>,
    cleanup: bool,
    fetched: bool,
}

#[async_trait]
impl Worker for GetPendingChangelistsWorker {
    fn name(&self) -> &'static str {
        "get-pending-changelists"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        self.cleanup = command.cleanup_cache();
        let output = tool
            .invoke("changelists", &[MACHINE_FLAG.to_string()])
            .await?
            .require_success("changelists")?;
        self.lists = records::parse_changelists(&output.stdout_lines)?;
        self.fetched = true;
        Ok(())
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        // A failed listing is not authoritative; leave the cache alone.
        if !self.fetched {
            return false;
        }
        let mut changed = false;
        let mut reported = BTreeSet::new();
        for list in self.lists.drain(..) {
            let mut id = ChangelistId::new(list.name);
            id.set_initialized();
            reported.insert(id.clone());

            changed |= cache.upsert_changelist(id.clone(), &list.description);

            let mut members = BTreeSet::new();
            for file in list.files {
                members.insert(file.path.clone());
                changed |= cache.apply_file_state(FileState {
                    status: file.status,
                    changelist: id.clone(),
                    ..FileState::new(file.path)
                });
            }
            changed |= cache.set_changelist_files(&id, members);

            let shelved: BTreeMap<String, ShelvedFile> = list
                .shelved
                .into_iter()
                .map(|entry| {
                    (
                        entry.path,
                        ShelvedFile {
                            status: entry.status,
                            shelf: entry.shelf,
                        },
                    )
                })
                .collect();
            changed |= cache.set_shelved(&id, shelved);
        }
        if self.cleanup {
            changed |= cache.retain_changelists(&reported);
        }
        changed
    }
}

/// Creates a changelist, optionally moving files into it right away.
#[derive(Debug, Default)]
pub struct NewChangelistWorker {
    created: Option<(ChangelistId, String)>,
    moved: Vec<String>,
}

#[async_trait]
impl Worker for NewChangelistWorker {
    fn name(&self) -> &'static str {
        "new-changelist"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut id = required_changelist(command)?;
        let description = command.description().unwrap_or_default().to_string();

        tool.invoke(
            "changelist",
            &[
                "create".to_string(),
                id.name().to_string(),
                "-m".to_string(),
                description.clone(),
            ],
        )
        .await?
        .require_success("changelist create")?;

        // The changelist exists from here on, whatever the move below does.
        id.set_initialized();
        self.created = Some((id.clone(), description));

        if !command.targets().is_empty() {
            let mut args = vec!["move".to_string(), id.name().to_string()];
            args.extend(command.targets().iter().cloned());
            tool.invoke("changelist", &args)
                .await?
                .require_success("changelist move")?;
            self.moved = command.targets().to_vec();
        }
        Ok(())
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        let Some((id, description)) = self.created.take() else {
            return false;
        };
        let mut changed = cache.upsert_changelist(id.clone(), &description);
        for path in self.moved.drain(..) {
            changed |= cache.move_file_to_changelist(&path, &id);
        }
        changed
    }
}

/// Deletes a changelist; its files fall back to the default one.
#[derive(Debug, Default)]
pub struct DeleteChangelistWorker {
    deleted: Option<ChangelistId>,
}

#[async_trait]
impl Worker for DeleteChangelistWorker {
    fn name(&self) -> &'static str {
        "delete-changelist"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let id = required_changelist(command)?;
        tool.invoke(
            "changelist",
            &["delete".to_string(), id.name().to_string()],
        )
        .await?
        .require_success("changelist delete")?;
        self.deleted = Some(id);
        Ok(())
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        match self.deleted.take() {
            Some(id) => {
                debug!(changelist = %id, "changelist deleted");
                cache.remove_changelist(&id)
            }
            None => false,
        }
    }
}

/// Rewrites a changelist's description.
#[derive(Debug, Default)]
pub struct EditChangelistWorker {
    edited: Option<(ChangelistId, String)>,
}

#[async_trait]
impl Worker for EditChangelistWorker {
    fn name(&self) -> &'static str {
        "edit-changelist"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut id = required_changelist(command)?;
        let description = command.description().unwrap_or_default().to_string();
        tool.invoke(
            "changelist",
            &[
                "edit".to_string(),
                id.name().to_string(),
                "-m".to_string(),
                description.clone(),
            ],
        )
        .await?
        .require_success("changelist edit")?;
        id.set_initialized();
        self.edited = Some((id, description));
        Ok(())
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        match self.edited.take() {
            Some((id, description)) => cache.upsert_changelist(id, &description),
            None => false,
        }
    }
}

/// Moves files into another changelist. Moving into the default changelist
/// clears their association.
#[derive(Debug, Default)]
pub struct ReopenWorker {
    destination: Option<ChangelistId>,
    moved: Vec<String>,
}

#[async_trait]
impl Worker for ReopenWorker {
    fn name(&self) -> &'static str {
        "reopen"
    }

    async fn execute(
        &mut self,
        command: &Command,
        tool: &dyn VcsTool,
    ) -> Result<(), ProviderError> {
        let mut id = required_changelist(command)?;
        let mut args = vec!["move".to_string(), id.name().to_string()];
        args.extend(command.targets().iter().cloned());
        tool.invoke("changelist", &args)
            .await?
            .require_success("changelist move")?;
        id.set_initialized();
        self.destination = Some(id);
        self.moved = command.targets().to_vec();
        Ok(())
    }

    fn update_states(&mut self, cache: &mut StateCache) -> bool {
        let Some(destination) = self.destination.take() else {
            return false;
        };
        let mut changed = false;
        for path in self.moved.drain(..) {
            changed |= cache.move_file_to_changelist(&path, &destination);
        }
        changed
    }
}

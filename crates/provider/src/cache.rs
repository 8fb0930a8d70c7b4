use std::collections::{BTreeMap, BTreeSet};

use vcs::{ChangelistId, ChangelistState, FileRevision, FileState, ShelvedFile, WorkspaceStatus};

use crate::records::WorkspaceInfo;

/// In-memory picture of everything the tool has reported so far.
///
/// Owned by the provider and mutated only through `&mut self`, from the
/// single context that runs workers' update phases. The per-path map is the
/// authority for each file; changelists hold a membership index kept in sync
/// by [`sync_membership`](StateCache::sync_membership).
#[derive(Debug)]
pub struct StateCache {
    workspace: Option<WorkspaceInfo>,
    files: BTreeMap<String, FileState>,
    changelists: BTreeMap<ChangelistId, ChangelistState>,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    /// An empty cache; only the default changelist exists.
    pub fn new() -> Self {
        let default = ChangelistState::new(ChangelistId::default_changelist());
        let mut changelists = BTreeMap::new();
        changelists.insert(default.id.clone(), default);
        Self {
            workspace: None,
            files: BTreeMap::new(),
            changelists,
        }
    }

    pub fn workspace(&self) -> Option<&WorkspaceInfo> {
        self.workspace.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.workspace.is_some()
    }

    pub fn file(&self, path: &str) -> Option<&FileState> {
        self.files.get(path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileState> {
        self.files.values()
    }

    pub fn changelist(&self, id: &ChangelistId) -> Option<&ChangelistState> {
        self.changelists.get(id)
    }

    pub fn changelists(&self) -> impl Iterator<Item = &ChangelistState> {
        self.changelists.values()
    }

    pub(crate) fn set_workspace(&mut self, info: WorkspaceInfo) -> bool {
        if self.workspace.as_ref() == Some(&info) {
            return false;
        }
        self.workspace = Some(info);
        true
    }

    pub(crate) fn clear_workspace(&mut self) -> bool {
        self.workspace.take().is_some()
    }

    /// Fold one freshly parsed per-path state into the cache, keeping
    /// changelist membership in step. Returns whether anything changed.
    pub(crate) fn apply_file_state(&mut self, incoming: FileState) -> bool {
        let path = incoming.path.clone();
        let existed = self.files.contains_key(&path);
        let entry = self
            .files
            .entry(path.clone())
            .or_insert_with(|| FileState::new(path.clone()));
        let mut changed = entry.merge(incoming);
        changed |= !existed;
        changed |= self.sync_membership(&path);
        changed
    }

    /// Append history entries for a path, creating its state if the path is
    /// new. Revisions already known (by id) are skipped.
    pub(crate) fn add_revisions(
        &mut self,
        path: &str,
        revisions: impl IntoIterator<Item = FileRevision>,
    ) -> bool {
        let entry = self
            .files
            .entry(path.to_string())
            .or_insert_with(|| FileState::new(path.to_string()));
        let mut changed = false;
        for revision in revisions {
            changed |= entry.add_revision(revision);
        }
        changed
    }

    /// Change just the status of a path, leaving its changelist, lock and
    /// history alone.
    pub(crate) fn set_status(&mut self, path: &str, status: WorkspaceStatus) -> bool {
        let entry = self
            .files
            .entry(path.to_string())
            .or_insert_with(|| FileState::new(path.to_string()));
        let mut changed = entry.status != status;
        entry.status = status;
        changed |= self.sync_membership(path);
        changed
    }

    /// Point a path at another changelist. Pointing at the default
    /// changelist is how an association is cleared.
    pub(crate) fn move_file_to_changelist(
        &mut self,
        path: &str,
        destination: &ChangelistId,
    ) -> bool {
        let entry = self
            .files
            .entry(path.to_string())
            .or_insert_with(|| FileState::new(path.to_string()));
        let mut changed = entry.changelist != *destination;
        entry.changelist = destination.clone();
        changed |= self.sync_membership(path);
        changed
    }

    /// Create a changelist or update its description.
    pub(crate) fn upsert_changelist(&mut self, id: ChangelistId, description: &str) -> bool {
        match self.changelists.get_mut(&id) {
            Some(state) => {
                if state.description == description {
                    false
                } else {
                    state.description = description.to_string();
                    true
                }
            }
            None => {
                self.changelists
                    .insert(id.clone(), ChangelistState::with_description(id, description));
                true
            }
        }
    }

    /// Drop a changelist, sending its files back to the default one. The
    /// default changelist itself is never removed.
    pub(crate) fn remove_changelist(&mut self, id: &ChangelistId) -> bool {
        if id.is_default() {
            return false;
        }
        let Some(state) = self.changelists.remove(id) else {
            return false;
        };
        let default = ChangelistId::default_changelist();
        for path in state.files {
            self.move_file_to_changelist(&path, &default);
        }
        true
    }

    /// Replace a changelist's membership wholesale (full refresh). Paths no
    /// longer listed fall back to the default changelist.
    pub(crate) fn set_changelist_files(
        &mut self,
        id: &ChangelistId,
        files: BTreeSet<String>,
    ) -> bool {
        let current = match self.changelists.get(id) {
            Some(state) => state.files.clone(),
            None => BTreeSet::new(),
        };
        if current == files {
            return false;
        }
        let default = ChangelistId::default_changelist();
        for stale in current.difference(&files) {
            let owned = self
                .files
                .get(stale)
                .map_or(false, |state| state.changelist == *id);
            if owned {
                self.move_file_to_changelist(stale, &default);
            }
        }
        for path in &files {
            self.move_file_to_changelist(path, id);
        }
        true
    }

    /// Replace a changelist's shelved entries.
    pub(crate) fn set_shelved(
        &mut self,
        id: &ChangelistId,
        shelved: BTreeMap<String, ShelvedFile>,
    ) -> bool {
        let entry = self
            .changelists
            .entry(id.clone())
            .or_insert_with(|| ChangelistState::new(id.clone()));
        if entry.shelved == shelved {
            return false;
        }
        entry.shelved = shelved;
        true
    }

    /// Drop every changelist a full refresh did not report (it was deleted
    /// or submitted elsewhere). The default changelist always survives.
    pub(crate) fn retain_changelists(&mut self, reported: &BTreeSet<ChangelistId>) -> bool {
        let stale: Vec<ChangelistId> = self
            .changelists
            .keys()
            .filter(|id| !id.is_default() && !reported.contains(*id))
            .cloned()
            .collect();
        let mut changed = false;
        for id in stale {
            changed |= self.remove_changelist(&id);
        }
        changed
    }

    /// Make `path` a member of exactly the changelist its FileState names,
    /// and only while it carries a pending change.
    fn sync_membership(&mut self, path: &str) -> bool {
        let owner = match self.files.get(path) {
            Some(state) if has_pending_change(state.status) => Some(state.changelist.clone()),
            _ => None,
        };
        let mut changed = false;
        if let Some(id) = &owner {
            if !self.changelists.contains_key(id) {
                self.changelists
                    .insert(id.clone(), ChangelistState::new(id.clone()));
                changed = true;
            }
        }
        for (id, state) in self.changelists.iter_mut() {
            if owner.as_ref() == Some(id) {
                changed |= state.files.insert(path.to_string());
            } else {
                changed |= state.files.remove(path);
            }
        }
        changed
    }
}

/// Statuses that count as pending local work, i.e. that place a file in a
/// changelist.
fn has_pending_change(status: WorkspaceStatus) -> bool {
    matches!(
        status,
        WorkspaceStatus::CheckedOut
            | WorkspaceStatus::Added
            | WorkspaceStatus::Moved
            | WorkspaceStatus::Copied
            | WorkspaceStatus::Deleted
            | WorkspaceStatus::Changed
            | WorkspaceStatus::Conflicted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(path: &str, changelist: &str) -> FileState {
        let mut id = ChangelistId::new(changelist);
        id.set_initialized();
        FileState {
            changelist: id,
            ..FileState::with_status(path, WorkspaceStatus::CheckedOut)
        }
    }

    #[test]
    fn fresh_cache_has_only_the_default_changelist() {
        let cache = StateCache::new();
        assert!(!cache.is_connected());
        assert_eq!(cache.changelists().count(), 1);
        assert!(cache
            .changelist(&ChangelistId::default_changelist())
            .is_some());
    }

    #[test]
    fn applying_a_pending_file_indexes_it_under_its_changelist() {
        let mut cache = StateCache::new();
        assert!(cache.apply_file_state(pending("a.txt", "feature")));

        let feature = cache.changelist(&ChangelistId::new("feature")).unwrap();
        assert!(feature.contains("a.txt"));

        // Re-applying the identical snapshot changes nothing.
        assert!(!cache.apply_file_state(pending("a.txt", "feature")));
    }

    #[test]
    fn moving_between_changelists_updates_both_indexes() {
        let mut cache = StateCache::new();
        cache.apply_file_state(pending("a.txt", "feature"));
        cache.apply_file_state(pending("a.txt", "bugfix"));

        assert!(!cache
            .changelist(&ChangelistId::new("feature"))
            .unwrap()
            .contains("a.txt"));
        assert!(cache
            .changelist(&ChangelistId::new("bugfix"))
            .unwrap()
            .contains("a.txt"));
    }

    #[test]
    fn non_pending_statuses_leave_changelists() {
        let mut cache = StateCache::new();
        cache.apply_file_state(pending("a.txt", "feature"));
        cache.set_status("a.txt", WorkspaceStatus::Controlled);

        assert!(!cache
            .changelist(&ChangelistId::new("feature"))
            .unwrap()
            .contains("a.txt"));
    }

    #[test]
    fn removing_a_changelist_reassigns_files_to_default() {
        let mut cache = StateCache::new();
        cache.apply_file_state(pending("a.txt", "feature"));

        assert!(cache.remove_changelist(&ChangelistId::new("feature")));
        assert!(cache.changelist(&ChangelistId::new("feature")).is_none());
        assert!(cache.file("a.txt").unwrap().changelist.is_default());
        assert!(cache
            .changelist(&ChangelistId::default_changelist())
            .unwrap()
            .contains("a.txt"));
    }

    #[test]
    fn the_default_changelist_cannot_be_removed() {
        let mut cache = StateCache::new();
        assert!(!cache.remove_changelist(&ChangelistId::default_changelist()));
        assert!(cache
            .changelist(&ChangelistId::default_changelist())
            .is_some());
    }

    #[test]
    fn retain_drops_unreported_changelists_but_keeps_default() {
        let mut cache = StateCache::new();
        cache.upsert_changelist(ChangelistId::new("keep"), "");
        cache.upsert_changelist(ChangelistId::new("stale"), "");

        let reported = BTreeSet::from([ChangelistId::new("keep")]);
        assert!(cache.retain_changelists(&reported));

        assert!(cache.changelist(&ChangelistId::new("keep")).is_some());
        assert!(cache.changelist(&ChangelistId::new("stale")).is_none());
        assert!(cache
            .changelist(&ChangelistId::default_changelist())
            .is_some());
    }

    #[test]
    fn set_changelist_files_sends_stale_members_back_to_default() {
        let mut cache = StateCache::new();
        cache.apply_file_state(pending("a.txt", "feature"));
        cache.apply_file_state(pending("b.txt", "feature"));

        let id = ChangelistId::new("feature");
        cache.set_changelist_files(&id, BTreeSet::from(["b.txt".to_string()]));

        assert!(cache.file("a.txt").unwrap().changelist.is_default());
        let feature = cache.changelist(&id).unwrap();
        assert!(!feature.contains("a.txt"));
        assert!(feature.contains("b.txt"));
    }

    #[test]
    fn status_change_keeps_history_and_lock() {
        let mut cache = StateCache::new();
        let mut state = pending("a.txt", "feature");
        state.lock = Some(vcs::LockInfo {
            owner: "sam".to_string(),
            workspace: "other".to_string(),
        });
        cache.apply_file_state(state);

        cache.set_status("a.txt", WorkspaceStatus::Conflicted);
        let file = cache.file("a.txt").unwrap();
        assert_eq!(file.status, WorkspaceStatus::Conflicted);
        assert!(file.lock.is_some());
        assert_eq!(file.changelist, ChangelistId::new("feature"));
    }
}

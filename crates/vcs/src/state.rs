use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changelist::ChangelistId;

/// Workspace status of a controlled (or not yet controlled) file.
///
/// Exactly one status applies to a file at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceStatus {
    /// Never seen by a status refresh yet.
    Unknown,
    /// Matched by an ignore rule.
    Ignored,
    /// On disk but not under source control.
    Private,
    /// Under source control, unchanged locally.
    Controlled,
    /// Opened for edit in the workspace.
    CheckedOut,
    /// Scheduled to be added on next checkin.
    Added,
    /// Moved or renamed locally.
    Moved,
    /// Copied from another controlled file.
    Copied,
    /// Scheduled for deletion.
    Deleted,
    /// Modified on disk without a checkout.
    Changed,
    /// Carries an unresolved merge conflict.
    Conflicted,
    /// Exclusively locked by someone else.
    LockedByOther,
}

/// Who holds an exclusive lock on a file, and from which workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub owner: String,
    pub workspace: String,
}

/// One known revision of a file, oldest revisions first in
/// [`FileState::history`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRevision {
    pub id: String,
    pub changeset: i64,
    pub author: String,
    pub date: DateTime<Utc>,
    pub description: String,
    /// Server-side reference used to fetch this revision's content.
    pub reference: String,
}

/// Latest known source-control state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub status: WorkspaceStatus,
    /// Owning changelist. A file with no pending changelist association
    /// implicitly belongs to the default changelist.
    pub changelist: ChangelistId,
    pub lock: Option<LockInfo>,
    pub history: Vec<FileRevision>,
}

impl FileState {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: WorkspaceStatus::Unknown,
            changelist: ChangelistId::default_changelist(),
            lock: None,
            history: Vec::new(),
        }
    }

    pub fn with_status(path: impl Into<String>, status: WorkspaceStatus) -> Self {
        Self {
            status,
            ..Self::new(path)
        }
    }

    /// Fold a freshly parsed snapshot of the same path into this state.
    ///
    /// Status, owning changelist and lock are replaced; history entries are
    /// appended, deduplicated by revision id so that re-applying the same
    /// snapshot is a no-op. Returns whether anything changed.
    pub fn merge(&mut self, incoming: FileState) -> bool {
        let mut changed = false;
        if self.status != incoming.status {
            self.status = incoming.status;
            changed = true;
        }
        if self.changelist != incoming.changelist {
            self.changelist = incoming.changelist;
            changed = true;
        }
        if self.lock != incoming.lock {
            self.lock = incoming.lock;
            changed = true;
        }
        for revision in incoming.history {
            changed |= self.add_revision(revision);
        }
        changed
    }

    /// Append a revision unless one with the same id is already known.
    pub fn add_revision(&mut self, revision: FileRevision) -> bool {
        if self.history.iter().any(|known| known.id == revision.id) {
            return false;
        }
        self.history.push(revision);
        true
    }
}

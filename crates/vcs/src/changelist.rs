use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::state::WorkspaceStatus;

/// Name of the implicit changelist every controlled file belongs to unless
/// it has been reopened into a named one.
pub const DEFAULT_CHANGELIST: &str = "default";

/// Identifier of a changelist: a name, plus a transient marker recording
/// whether the changelist is known to exist server-side.
///
/// Two ids are equal iff their names are equal; the `initialized` marker never
/// participates in equality, ordering, hashing or serialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangelistId {
    name: String,
    #[serde(skip)]
    initialized: bool,
}

impl ChangelistId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialized: false,
        }
    }

    /// The well-known default changelist. It always exists, so the id is
    /// created pre-initialized.
    pub fn default_changelist() -> Self {
        Self {
            name: DEFAULT_CHANGELIST.to_string(),
            initialized: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this id names the default changelist. Decided by name
    /// equality, not by any separate flag.
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CHANGELIST
    }

    /// Mark the changelist as confirmed to exist server-side.
    pub fn set_initialized(&mut self) {
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Clear the name and the initialized marker.
    pub fn reset(&mut self) {
        self.name.clear();
        self.initialized = false;
    }
}

impl PartialEq for ChangelistId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ChangelistId {}

impl Hash for ChangelistId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for ChangelistId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChangelistId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for ChangelistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A change stashed on a shelf without being checked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShelvedFile {
    /// Status the file had when it was shelved.
    pub status: WorkspaceStatus,
    /// Reference used to retrieve the shelved content from the server.
    pub shelf: String,
}

/// Snapshot of one changelist: its description, the paths currently opened
/// under it, and any shelved entries.
///
/// The authoritative [`FileState`](crate::FileState) for each member path
/// lives in the per-path cache; `files` is the membership index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelistState {
    pub id: ChangelistId,
    pub description: String,
    pub files: BTreeSet<String>,
    pub shelved: BTreeMap<String, ShelvedFile>,
}

impl ChangelistState {
    pub fn new(id: ChangelistId) -> Self {
        Self {
            id,
            description: String::new(),
            files: BTreeSet::new(),
            shelved: BTreeMap::new(),
        }
    }

    pub fn with_description(id: ChangelistId, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::new(id)
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn equality_ignores_initialized_flag() {
        let mut a = ChangelistId::new("feature-ui");
        let b = ChangelistId::new("feature-ui");
        assert_eq!(a, b);

        a.set_initialized();
        assert_eq!(a, b);
        assert_ne!(a, ChangelistId::new("feature-audio"));
    }

    #[test]
    fn hash_follows_name_only() {
        let mut states = HashMap::new();
        states.insert(ChangelistId::new("bugfix"), 1);

        let mut lookup = ChangelistId::new("bugfix");
        lookup.set_initialized();
        assert_eq!(states.get(&lookup), Some(&1));
    }

    #[test]
    fn default_changelist_is_default_by_name() {
        let default = ChangelistId::default_changelist();
        assert!(default.is_default());
        assert!(default.is_initialized());

        // Any id with the same name is the default changelist too.
        assert!(ChangelistId::new(DEFAULT_CHANGELIST).is_default());
        assert_eq!(default, ChangelistId::new(DEFAULT_CHANGELIST));
    }

    #[test]
    fn default_constructed_id_is_empty_and_uninitialized() {
        let id = ChangelistId::default();
        assert_eq!(id.name(), "");
        assert!(!id.is_initialized());
        assert!(!id.is_default());
    }

    #[test]
    fn reset_clears_name_and_flag() {
        let mut id = ChangelistId::new("temp");
        id.set_initialized();
        id.reset();
        assert_eq!(id.name(), "");
        assert!(!id.is_initialized());
    }

    #[test]
    fn initialized_flag_is_not_serialized() {
        let mut id = ChangelistId::new("feature");
        id.set_initialized();

        let json = serde_json::to_string(&id).unwrap();
        let back: ChangelistId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(!back.is_initialized());
    }
}

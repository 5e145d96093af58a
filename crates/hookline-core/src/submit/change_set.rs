//! Change sets: ordered units of pending writes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What a data modification does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityAction {
    Insert,
    Update,
    Remove,
}

impl fmt::Display for EntityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityAction::Insert => write!(f, "insert"),
            EntityAction::Update => write!(f, "update"),
            EntityAction::Remove => write!(f, "remove"),
        }
    }
}

/// Insert, update or removal of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataModificationEntry {
    pub entity_set: String,
    pub action: EntityAction,
    /// Key properties identifying the entity (empty for inserts).
    #[serde(default)]
    pub key: Map<String, Value>,
    /// Property values to write.
    #[serde(default)]
    pub values: Map<String, Value>,
}

/// Invocation of a side-effecting action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocationEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeSetEntry {
    DataModification(DataModificationEntry),
    ActionInvocation(ActionInvocationEntry),
}

impl ChangeSetEntry {
    pub fn insert(entity_set: impl Into<String>, values: Map<String, Value>) -> Self {
        ChangeSetEntry::DataModification(DataModificationEntry {
            entity_set: entity_set.into(),
            action: EntityAction::Insert,
            key: Map::new(),
            values,
        })
    }

    pub fn update(
        entity_set: impl Into<String>,
        key: Map<String, Value>,
        values: Map<String, Value>,
    ) -> Self {
        ChangeSetEntry::DataModification(DataModificationEntry {
            entity_set: entity_set.into(),
            action: EntityAction::Update,
            key,
            values,
        })
    }

    pub fn remove(entity_set: impl Into<String>, key: Map<String, Value>) -> Self {
        ChangeSetEntry::DataModification(DataModificationEntry {
            entity_set: entity_set.into(),
            action: EntityAction::Remove,
            key,
            values: Map::new(),
        })
    }

    pub fn action(
        namespace: Option<&str>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        ChangeSetEntry::ActionInvocation(ActionInvocationEntry {
            namespace: namespace.map(str::to_string),
            name: name.into(),
            arguments,
        })
    }

    /// Entity set touched by a data modification.
    pub fn entity_set(&self) -> Option<&str> {
        match self {
            ChangeSetEntry::DataModification(entry) => Some(&entry.entity_set),
            ChangeSetEntry::ActionInvocation(_) => None,
        }
    }

    pub fn entity_action(&self) -> Option<EntityAction> {
        match self {
            ChangeSetEntry::DataModification(entry) => Some(entry.action),
            ChangeSetEntry::ActionInvocation(_) => None,
        }
    }

    pub fn as_data_modification(&self) -> Option<&DataModificationEntry> {
        match self {
            ChangeSetEntry::DataModification(entry) => Some(entry),
            ChangeSetEntry::ActionInvocation(_) => None,
        }
    }

    pub fn as_data_modification_mut(&mut self) -> Option<&mut DataModificationEntry> {
        match self {
            ChangeSetEntry::DataModification(entry) => Some(entry),
            ChangeSetEntry::ActionInvocation(_) => None,
        }
    }
}

/// Ordered entries submitted together.
///
/// `any_entity_changed` is never inferred from the entries; hooks that change
/// data set it explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    entries: Vec<ChangeSetEntry>,
    #[serde(default)]
    pub any_entity_changed: bool,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, entry: ChangeSetEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn push(&mut self, entry: ChangeSetEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ChangeSetEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ChangeSetEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ChangeSetEntry> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = ChangeSetEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            any_entity_changed: false,
        }
    }
}

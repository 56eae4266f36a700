use crate::context::Item;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;

/// Structured result of interpreting one model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(default, alias = "response")]
    pub reply: String,
    #[serde(default, alias = "action_items", alias = "actionItems", alias = "new_items")]
    pub new_items: Vec<ActionItem>,
    #[serde(default, alias = "deleteTasks", alias = "delete_tasks", alias = "delete_ids")]
    pub delete_ids: Vec<String>,
    #[serde(default, alias = "updateTasks", alias = "update_tasks", alias = "update_items")]
    pub update_items: Vec<ItemUpdate>,
}

/// A task the model wants created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Changes to an existing task. Only the fields present carry a change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdate {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// "pending", "completed" or "cancelled" by convention; not enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, alias = "due_date", skip_serializing_if = "Patch::is_unset")]
    pub due_date: Patch<DateTime<Utc>>,
    /// approved | declined | undecided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, alias = "follow_up_due_at", skip_serializing_if = "Patch::is_unset")]
    pub follow_up_due_at: Patch<DateTime<Utc>>,
    #[serde(default, alias = "followed_up", skip_serializing_if = "Option::is_none")]
    pub followed_up: Option<bool>,
}

impl ItemUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

// ── Tri-state field ─────────────────────────────────────────────────────────

/// An update to a nullable field: leave it, clear it, or set it.
///
/// Use with `#[serde(default)]` so a missing key decodes as [`Patch::Unset`]
/// while an explicit `null` decodes as [`Patch::Clear`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Unset,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Patch::Set(v) => serializer.serialize_some(v),
            Patch::Unset | Patch::Clear => serializer.serialize_none(),
        }
    }
}

// ── Caller-side helpers ─────────────────────────────────────────────────────

impl Command {
    pub fn has_actions(&self) -> bool {
        !self.new_items.is_empty() || !self.delete_ids.is_empty() || !self.update_items.is_empty()
    }

    /// Replace raw item ids in the reply with the item titles.
    pub fn humanize_reply(&mut self, items: &[Item]) {
        for item in items {
            if !item.id.is_empty() && !item.title.is_empty() {
                self.reply = self.reply.replace(&item.id, &item.title);
            }
        }
    }

    /// Drop deletes and updates aimed at ids the caller doesn't own.
    /// Returns how many entries were removed.
    pub fn retain_known<S: AsRef<str>>(&mut self, known_ids: &[S]) -> usize {
        let known: HashSet<&str> = known_ids.iter().map(|s| s.as_ref()).collect();
        let before = self.delete_ids.len() + self.update_items.len();
        self.delete_ids.retain(|id| known.contains(id.as_str()));
        self.update_items.retain(|u| known.contains(u.id.as_str()));
        before - self.delete_ids.len() - self.update_items.len()
    }

    /// Remove entries that would fail validation, keeping the rest. Used on
    /// degraded parses where a single bad item shouldn't sink the others.
    pub fn drop_invalid_entries(&mut self) -> usize {
        let before = self.new_items.len() + self.delete_ids.len() + self.update_items.len();
        self.new_items
            .retain(|i| !i.title.trim().is_empty() && !i.description.trim().is_empty());
        self.delete_ids.retain(|id| !id.trim().is_empty());
        self.update_items.retain(|u| !u.id.trim().is_empty());
        before - self.new_items.len() - self.delete_ids.len() - self.update_items.len()
    }
}

use crate::config::ContextConfig;
use crate::budget::truncate_with_ellipsis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A task from the caller's store, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_status() -> String {
    "pending".into()
}

impl Item {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: default_status(),
            due_date: None,
            created_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status.eq_ignore_ascii_case("pending")
    }
}

/// Most important first: pending before anything else, then the earliest due
/// date (undated last), then the most recently created.
pub fn priority_order(a: &Item, b: &Item) -> Ordering {
    fn nones_last<T: Ord>(a: &Option<T>, b: &Option<T>, cmp: fn(&T, &T) -> Ordering) -> Ordering {
        match (a, b) {
            (Some(x), Some(y)) => cmp(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    b.is_pending()
        .cmp(&a.is_pending())
        .then_with(|| nones_last(&a.due_date, &b.due_date, |x, y| x.cmp(y)))
        .then_with(|| nones_last(&a.created_at, &b.created_at, |x, y| y.cmp(x)))
}

/// Everything the model sees about the conversation besides the new message.
///
/// Built fresh for every turn. Trimming only ever removes or shortens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default)]
    pub summary: String,
    /// Oldest first.
    #[serde(default)]
    pub recent_messages: Vec<Message>,
    /// Most important first.
    #[serde(default)]
    pub key_items: Vec<Item>,
    #[serde(default)]
    pub priority_signals: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    #[serde(default)]
    pub dominant_mood: Option<String>,
    #[serde(default)]
    pub tasks_created: u32,
    #[serde(default)]
    pub tasks_completed: u32,
}

/// Raw material for one turn's context, straight from the caller's store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSources {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub metrics: Option<SessionMetrics>,
}

// ── Assembly ────────────────────────────────────────────────────────────────

impl ConversationContext {
    /// Bound the caller's raw data to the configured sizes.
    pub fn assemble(sources: ContextSources, config: &ContextConfig) -> Self {
        let mut messages = sources.messages;
        messages.sort_by_key(|m| m.created_at);

        let mut items = sources.items;
        items.sort_by(priority_order);
        items.truncate(config.max_key_items);

        Self {
            summary: truncate_with_ellipsis(&sources.summary, config.summary_max_length),
            recent_messages: prioritize_messages(messages, config.max_recent_messages),
            key_items: items,
            priority_signals: sources.metrics.as_ref().map(priority_signals).unwrap_or_default(),
        }
    }
}

/// Keep the `limit` most useful messages, in chronological order.
///
/// Recency dominates; long user messages, user questions and assistant
/// messages about tasks get a small boost, and the three newest a large one.
pub fn prioritize_messages(messages: Vec<Message>, limit: usize) -> Vec<Message> {
    if messages.len() <= limit {
        return messages;
    }

    let n = messages.len();
    let mut scored: Vec<(usize, i64)> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| (i, message_score(m, n - 1 - i, n)))
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let mut keep: Vec<usize> = scored.into_iter().take(limit).map(|(i, _)| i).collect();
    keep.sort_unstable();

    let mut messages: Vec<Option<Message>> = messages.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|i| messages[i].take()).collect()
}

/// `age` is 0 for the newest of `n` messages.
fn message_score(message: &Message, age: usize, n: usize) -> i64 {
    let mut score = ((n - age) * 10) as i64;
    match message.sender {
        Sender::User => {
            if message.content.chars().count() > 80 {
                score += 5;
            }
            if message.content.contains('?') {
                score += 3;
            }
        }
        Sender::Assistant => {
            if message.content.to_lowercase().contains("task") {
                score += 5;
            }
        }
    }
    if age < 3 {
        score += 20;
    }
    score
}

pub fn priority_signals(metrics: &SessionMetrics) -> Vec<String> {
    let mut signals = Vec::new();
    if let Some(mood) = metrics.dominant_mood.as_deref().filter(|m| !m.is_empty()) {
        signals.push(format!("User's dominant mood: {}", mood));
    }
    if metrics.tasks_created > 0 && metrics.tasks_completed == 0 {
        signals.push("User creates tasks but may need help with execution".into());
    }
    signals
}

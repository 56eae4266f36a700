use crate::command::{ActionItem, Command, ItemUpdate, Patch};
use crate::extract::StrategyChain;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

// ── Patterns ────────────────────────────────────────────────────────────────

/// A JSON string body: anything but an unescaped quote.
const STR: &str = r#""((?:[^"\\]|\\.)*)""#;

fn array_pattern(keys: &[&str]) -> Regex {
    // The closing bracket is optional so truncated arrays still yield their
    // complete objects.
    let pattern = format!(r#""(?:{})"\s*:\s*\[([^\]]*)"#, keys.join("|"));
    Regex::new(&pattern).expect("array pattern is valid")
}

fn field_pattern(key: &str) -> Regex {
    Regex::new(&format!(r#""{}"\s*:\s*{}"#, key, STR)).expect("field pattern is valid")
}

static NEW_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| array_pattern(&["newItems", "new_items", "action_items", "actionItems"]));
static DELETE_IDS: LazyLock<Regex> =
    LazyLock::new(|| array_pattern(&["deleteIds", "delete_ids", "deleteTasks", "delete_tasks"]));
static UPDATE_ITEMS: LazyLock<Regex> =
    LazyLock::new(|| array_pattern(&["updateItems", "update_items", "updateTasks", "update_tasks"]));

static FLAT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}").expect("object pattern is valid"));
static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STR).expect("string pattern is valid"));

static TITLE: LazyLock<Regex> = LazyLock::new(|| field_pattern("title"));
static DESCRIPTION: LazyLock<Regex> = LazyLock::new(|| field_pattern("description"));
static ID: LazyLock<Regex> = LazyLock::new(|| field_pattern("id"));
static STATUS: LazyLock<Regex> = LazyLock::new(|| field_pattern("status"));
static DECISION: LazyLock<Regex> = LazyLock::new(|| field_pattern("decision"));

/// A nullable date field: group 1 is absent for `null`.
fn date_pattern(keys: &[&str]) -> Regex {
    let pattern = format!(r#""(?:{})"\s*:\s*(?:null|{})"#, keys.join("|"), STR);
    Regex::new(&pattern).expect("date pattern is valid")
}

static DUE_DATE: LazyLock<Regex> = LazyLock::new(|| date_pattern(&["dueDate", "due_date"]));
static FOLLOW_UP_DUE_AT: LazyLock<Regex> =
    LazyLock::new(|| date_pattern(&["followUpDueAt", "follow_up_due_at"]));
static FOLLOWED_UP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:followedUp|followed_up)"\s*:\s*(true|false)"#)
        .expect("followed up pattern is valid")
});

// ── Extraction ──────────────────────────────────────────────────────────────

/// Scavenge whatever task operations survive in a response that no strategy
/// could turn into a valid command.
///
/// First tries a lenient parse: any fragment that decodes as a command with a
/// reply or an operation, with invalid entries then dropped. If that leaves
/// no operations, falls back to pattern matching over the raw text. The
/// reply is whatever the lenient parse found, possibly empty, and survives
/// the fallback; the caller decides what to show when it is empty.
/// Never panics and never invents values: anything it cannot read cleanly
/// is left out.
pub fn salvage(text: &str, chain: &StrategyChain) -> Command {
    let mut reply = String::new();
    let lenient = |c: &Command| {
        if c.has_actions() || !c.reply.trim().is_empty() {
            Ok(())
        } else {
            Err("nothing to salvage")
        }
    };
    if let Some(found) = chain.extract_as(text, lenient) {
        let mut command = found.value;
        let dropped = command.drop_invalid_entries();
        if command.has_actions() {
            debug!(strategy = found.strategy, dropped, "salvaged from lenient parse");
            return command;
        }
        if !command.reply.trim().is_empty() {
            debug!(strategy = found.strategy, dropped, "kept reply from lenient parse");
            reply = command.reply;
        }
    }

    let command = Command {
        reply,
        new_items: scavenge_new_items(text),
        delete_ids: scavenge_delete_ids(text),
        update_items: scavenge_updates(text),
    };
    debug!(
        new = command.new_items.len(),
        delete = command.delete_ids.len(),
        update = command.update_items.len(),
        "salvaged by pattern"
    );
    command
}

fn array_bodies<'a>(pattern: &Regex, text: &'a str) -> Vec<&'a str> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Decode the body of a JSON string literal. `None` if the escapes are bad.
fn unescape(body: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{}\"", body)).ok()
}

fn string_field(pattern: &Regex, object: &str) -> Option<String> {
    let body = pattern.captures(object)?.get(1)?.as_str();
    unescape(body).filter(|s| !s.trim().is_empty())
}

fn scavenge_new_items(text: &str) -> Vec<ActionItem> {
    let mut items = Vec::new();
    for body in array_bodies(&NEW_ITEMS, text) {
        for object in FLAT_OBJECT.find_iter(body) {
            let object = object.as_str();
            if let (Some(title), Some(description)) =
                (string_field(&TITLE, object), string_field(&DESCRIPTION, object))
            {
                items.push(ActionItem { title, description });
            }
        }
    }
    items
}

fn scavenge_delete_ids(text: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for body in array_bodies(&DELETE_IDS, text) {
        for caps in STRING_LITERAL.captures_iter(body) {
            if let Some(id) = caps.get(1).and_then(|m| unescape(m.as_str())) {
                if !id.trim().is_empty() {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

fn scavenge_updates(text: &str) -> Vec<ItemUpdate> {
    let mut updates = Vec::new();
    for body in array_bodies(&UPDATE_ITEMS, text) {
        for object in FLAT_OBJECT.find_iter(body) {
            let object = object.as_str();
            let Some(id) = string_field(&ID, object) else {
                continue;
            };
            updates.push(ItemUpdate {
                id,
                title: string_field(&TITLE, object),
                description: string_field(&DESCRIPTION, object),
                status: string_field(&STATUS, object),
                due_date: date_field(&DUE_DATE, object),
                decision: string_field(&DECISION, object),
                follow_up_due_at: date_field(&FOLLOW_UP_DUE_AT, object),
                followed_up: FOLLOWED_UP
                    .captures(object)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str() == "true"),
            });
        }
    }
    updates
}

/// An explicit `null` clears the date; an unreadable date is no change.
fn date_field(pattern: &Regex, object: &str) -> Patch<DateTime<Utc>> {
    let Some(caps) = pattern.captures(object) else {
        return Patch::Unset;
    };
    match caps.get(1) {
        None => Patch::Clear,
        Some(m) => DateTime::parse_from_rfc3339(m.as_str())
            .map(|d| Patch::Set(d.with_timezone(&Utc)))
            .unwrap_or(Patch::Unset),
    }
}

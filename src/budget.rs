use crate::config::ContextConfig;
use crate::context::{priority_order, ConversationContext};
use crate::prompt;
use serde::Serialize;
use tracing::{debug, warn};

pub const ELLIPSIS: &str = "...";

/// Rough token count: one unit per four bytes.
pub fn estimate_units(text: &str) -> usize {
    text.len() / 4
}

/// Keep the first `max_chars` characters, marking the cut with [`ELLIPSIS`].
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push_str(ELLIPSIS);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimStep {
    DroppedMessage,
    DroppedItem,
    TruncatedSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trimmed {
    pub context: ConversationContext,
    /// Measured size of the returned context
    pub units: usize,
    pub steps: Vec<TrimStep>,
    pub within_budget: bool,
}

/// Shrinks a context until its rendered prompt fits `max_units`.
///
/// Greedy and fixed-order: old messages go first, then low-priority items,
/// then the summary is cut down. Never goes below the floors, so the result
/// may still be over budget.
#[derive(Debug, Clone)]
pub struct ContextBudgeter {
    pub max_units: usize,
    pub min_recent_messages: usize,
    pub min_key_items: usize,
    pub summary_floor_chars: usize,
}

impl ContextBudgeter {
    pub fn new(max_units: usize) -> Self {
        Self {
            max_units,
            min_recent_messages: 3,
            min_key_items: 2,
            summary_floor_chars: 200,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            max_units: config.max_units,
            min_recent_messages: config.min_recent_messages,
            min_key_items: config.min_key_items,
            summary_floor_chars: config.summary_floor_chars,
        }
    }

    /// Size of the prompt this context renders to, for an empty user message.
    pub fn measure(&self, ctx: &ConversationContext) -> usize {
        estimate_units(prompt::INSTRUCTIONS) + estimate_units(&prompt::render_body(ctx))
    }

    /// Apply the first reduction that is still possible. `None` at the floor.
    pub fn reduce(&self, ctx: &mut ConversationContext) -> Option<TrimStep> {
        if ctx.recent_messages.len() > self.min_recent_messages {
            let oldest = ctx
                .recent_messages
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| m.created_at)
                .map(|(i, _)| i)?;
            ctx.recent_messages.remove(oldest);
            return Some(TrimStep::DroppedMessage);
        }

        if ctx.key_items.len() > self.min_key_items {
            let least = ctx
                .key_items
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| priority_order(a, b))
                .map(|(i, _)| i)?;
            ctx.key_items.remove(least);
            return Some(TrimStep::DroppedItem);
        }

        let truncated = truncate_with_ellipsis(&ctx.summary, self.summary_floor_chars);
        if truncated.len() < ctx.summary.len() {
            ctx.summary = truncated;
            return Some(TrimStep::TruncatedSummary);
        }

        None
    }

    pub fn trim(&self, mut ctx: ConversationContext) -> Trimmed {
        let mut steps = Vec::new();
        loop {
            let units = self.measure(&ctx);
            if units <= self.max_units {
                debug!(units, steps = steps.len(), "context within budget");
                return Trimmed { context: ctx, units, steps, within_budget: true };
            }
            match self.reduce(&mut ctx) {
                Some(step) => steps.push(step),
                None => {
                    warn!(
                        units,
                        max_units = self.max_units,
                        "context cannot be reduced further, sending it over budget"
                    );
                    return Trimmed { context: ctx, units, steps, within_budget: false };
                }
            }
        }
    }
}

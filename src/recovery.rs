use crate::command::Command;
use crate::config::RecoveryConfig;
use crate::context::Item;
use crate::extract::{BraceScan, FencedBlock, StrategyChain, WholeText};
use crate::salvage::salvage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What the caller knows about the turn being answered.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub user_message: Option<String>,
    /// Items shown to the model; their ids are replaced by titles in the reply.
    #[serde(default)]
    pub key_items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "strategy", rename_all = "snake_case")]
pub enum Source {
    /// A strategy produced a valid command
    Strategy(&'static str),
    /// Partial recovery found a reply or at least one operation
    Salvaged,
    /// Nothing structured was recovered; the reply was filled in
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub command: Command,
    pub source: Source,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub title: String,
}

/// Turns raw model output into something the caller can always use.
pub struct Recovery {
    config: RecoveryConfig,
    chain: StrategyChain,
    summary_chain: StrategyChain,
}

impl Recovery {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            chain: StrategyChain::standard(),
            summary_chain: StrategyChain::new(vec![
                Box::new(BraceScan),
                Box::new(FencedBlock),
                Box::new(WholeText),
            ]),
        }
    }

    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    /// Never fails: a response nothing can be made of still yields a reply.
    pub fn interpret(&self, raw: &str, turn: &Turn) -> Outcome {
        if let Some(found) = self.chain.extract_command(raw) {
            let mut command = found.value;
            command.humanize_reply(&turn.key_items);
            return Outcome { command, source: Source::Strategy(found.strategy) };
        }

        warn!(bytes = raw.len(), "no valid command in model output, salvaging");
        let mut command = salvage(raw, &self.chain);
        let source = if command.has_actions() || !command.reply.trim().is_empty() {
            Source::Salvaged
        } else {
            Source::Fallback
        };

        if command.reply.trim().is_empty() {
            command.reply = self.fill_reply(raw, turn);
        }
        command.humanize_reply(&turn.key_items);

        info!(
            source = ?source,
            new = command.new_items.len(),
            delete = command.delete_ids.len(),
            update = command.update_items.len(),
            "recovered command"
        );
        Outcome { command, source }
    }

    fn fill_reply(&self, raw: &str, turn: &Turn) -> String {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
        let about_code = turn
            .user_message
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains("code"));
        if about_code {
            self.config.code_fallback_reply.clone()
        } else {
            self.config.fallback_reply.clone()
        }
    }

    /// Pull a `{summary, title}` object out of a summarisation response.
    pub fn recover_summary(&self, raw: &str) -> Option<SessionSummary> {
        let found = self.summary_chain.extract_as(raw, |s: &SessionSummary| {
            if s.summary.trim().is_empty() {
                Err("summary is empty")
            } else if s.title.trim().is_empty() {
                Err("title is empty")
            } else {
                Ok(())
            }
        });

        match found {
            Some(found) => Some(SessionSummary {
                summary: found.value.summary.trim().to_string(),
                title: found.value.title.trim().to_string(),
            }),
            None => {
                warn!("no summary in model output");
                None
            }
        }
    }
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new(RecoveryConfig::default())
    }
}

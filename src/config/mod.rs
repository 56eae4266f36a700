use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Top-level config. Every section and field has a default, so a partial
/// `config.toml` (or none at all) is fine.
///
/// ```toml
/// [recovery]
/// fallback_reply = "Sorry, could you say that again?"
///
/// [context]
/// max_units = 6000
/// max_recent_messages = 10
///
/// [server]
/// port = 8430
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Reply used when nothing at all can be recovered from the model output
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
    /// Used instead of `fallback_reply` when the user was asking about code
    #[serde(default = "default_code_fallback_reply")]
    pub code_fallback_reply: String,
}

fn default_fallback_reply() -> String {
    "I'm sorry, I couldn't generate a response. Could you clarify what you're trying to do or what specific help you need?".into()
}
fn default_code_fallback_reply() -> String {
    "It looks like you're asking about code, but I couldn't generate one. Could you specify the language and what it should do?".into()
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            fallback_reply: default_fallback_reply(),
            code_fallback_reply: default_code_fallback_reply(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Budget for the rendered prompt, in estimated units (bytes / 4)
    #[serde(default = "default_max_units")]
    pub max_units: usize,
    /// Messages kept by assembly before any budgeting
    #[serde(default = "default_max_recent_messages")]
    pub max_recent_messages: usize,
    #[serde(default = "default_max_key_items")]
    pub max_key_items: usize,
    /// Characters of summary kept by assembly
    #[serde(default = "default_summary_max_length")]
    pub summary_max_length: usize,
    /// Budgeting never drops below this many messages
    #[serde(default = "default_min_recent_messages")]
    pub min_recent_messages: usize,
    /// Budgeting never drops below this many key items
    #[serde(default = "default_min_key_items")]
    pub min_key_items: usize,
    /// Characters of summary left when budgeting truncates it
    #[serde(default = "default_summary_floor_chars")]
    pub summary_floor_chars: usize,
}

fn default_max_units() -> usize { 6000 }
fn default_max_recent_messages() -> usize { 10 }
fn default_max_key_items() -> usize { 5 }
fn default_summary_max_length() -> usize { 500 }
fn default_min_recent_messages() -> usize { 3 }
fn default_min_key_items() -> usize { 2 }
fn default_summary_floor_chars() -> usize { 200 }

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_units: default_max_units(),
            max_recent_messages: default_max_recent_messages(),
            max_key_items: default_max_key_items(),
            summary_max_length: default_summary_max_length(),
            min_recent_messages: default_min_recent_messages(),
            min_key_items: default_min_key_items(),
            summary_floor_chars: default_summary_floor_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8430 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("Config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

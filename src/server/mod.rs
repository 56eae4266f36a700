use crate::budget::{ContextBudgeter, Trimmed};
use crate::config::Config;
use crate::context::{ContextSources, ConversationContext, Item};
use crate::prompt;
use crate::recovery::{Recovery, Turn};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub recovery: Arc<Recovery>,
    pub started: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            recovery: Arc::new(Recovery::new(config.recovery.clone())),
            config: Arc::new(config),
            started: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct R { ok: bool, data: Option<serde_json::Value>, error: Option<String> }
impl R {
    fn ok<T: Serialize>(d: T) -> Json<R> { Json(R { ok: true, data: Some(serde_json::to_value(d).unwrap_or_default()), error: None }) }
    fn err(m: &str) -> Json<R> { Json(R { ok: false, data: None, error: Some(m.into()) }) }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        // Model output → command
        .route("/recover", post(recover))
        .route("/summary", post(summary))
        // Context → prompt
        .route("/context/trim", post(trim_context))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---- Status ----

async fn status(State(s): State<AppState>) -> Json<R> {
    R::ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "strategies": s.recovery.chain().names(),
        "max_units": s.config.context.max_units,
        "uptime_secs": (Utc::now() - s.started).num_seconds(),
    }))
}

// ---- Recovery ----

#[derive(Deserialize)]
struct RecoverBody {
    text: String,
    #[serde(default)]
    user_message: Option<String>,
    #[serde(default)]
    key_items: Vec<Item>,
    /// Ids the caller owns; deletes and updates for any other id are dropped
    #[serde(default)]
    known_ids: Option<Vec<String>>,
}

async fn recover(State(s): State<AppState>, Json(b): Json<RecoverBody>) -> Json<R> {
    let turn = Turn { user_message: b.user_message, key_items: b.key_items };
    let mut outcome = s.recovery.interpret(&b.text, &turn);
    if let Some(known) = &b.known_ids {
        let dropped = outcome.command.retain_known(known.as_slice());
        if dropped > 0 {
            warn!(dropped, "dropped operations on unknown ids");
        }
    }
    info!(source = ?outcome.source, "POST /recover");
    R::ok(outcome)
}

#[derive(Deserialize)]
struct SummaryBody { text: String }

async fn summary(State(s): State<AppState>, Json(b): Json<SummaryBody>) -> Json<R> {
    match s.recovery.recover_summary(&b.text) {
        Some(summary) => R::ok(summary),
        None => R::err("no summary found in text"),
    }
}

// ---- Context ----

/// Either raw sources to assemble, or an already assembled context.
#[derive(Deserialize)]
struct TrimBody {
    #[serde(default)]
    sources: Option<ContextSources>,
    #[serde(default)]
    context: Option<ConversationContext>,
    #[serde(default)]
    max_units: Option<usize>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct TrimReply {
    #[serde(flatten)]
    trimmed: Trimmed,
    prompt: String,
}

async fn trim_context(State(s): State<AppState>, Json(b): Json<TrimBody>) -> Json<R> {
    let ctx = match (b.sources, b.context) {
        (Some(sources), None) => ConversationContext::assemble(sources, &s.config.context),
        (None, Some(ctx)) => ctx,
        (None, None) => return R::err("either sources or context is required"),
        (Some(_), Some(_)) => return R::err("send sources or context, not both"),
    };

    let mut budgeter = ContextBudgeter::from_config(&s.config.context);
    if let Some(max) = b.max_units {
        budgeter.max_units = max;
    }
    let trimmed = budgeter.trim(ctx);
    let prompt = prompt::render(
        &trimmed.context,
        b.message.as_deref().unwrap_or_default(),
        Utc::now().date_naive(),
    );
    R::ok(TrimReply { trimmed, prompt })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State<AppState> {
        State(AppState::new(Config::default()))
    }

    #[tokio::test]
    async fn test_status() {
        let Json(r) = status(state()).await;
        assert!(r.ok);
        let data = r.data.unwrap();
        assert_eq!(data["max_units"], 6000);
        assert_eq!(data["strategies"][0], "whole_text");
    }

    #[tokio::test]
    async fn test_recover_never_errors() {
        let body = RecoverBody { text: String::new(), user_message: None, key_items: Vec::new(), known_ids: None };
        let Json(r) = recover(state(), Json(body)).await;
        assert!(r.ok);
        let data = r.data.unwrap();
        assert_eq!(data["source"]["kind"], "fallback");
        assert!(!data["command"]["reply"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_drops_unknown_ids() {
        let body = RecoverBody {
            text: r#"{"reply":"Done","deleteIds":["t1","ghost"]}"#.into(),
            user_message: None,
            key_items: Vec::new(),
            known_ids: Some(vec!["t1".into()]),
        };
        let Json(r) = recover(state(), Json(body)).await;
        let data = r.data.unwrap();
        assert_eq!(data["command"]["deleteIds"], serde_json::json!(["t1"]));
        assert_eq!(data["source"]["strategy"], "whole_text");
    }

    #[tokio::test]
    async fn test_summary_missing_is_error() {
        let Json(r) = summary(state(), Json(SummaryBody { text: "nothing".into() })).await;
        assert!(!r.ok);
        assert!(r.error.is_some());
    }

    #[tokio::test]
    async fn test_trim_requires_one_input() {
        let body = TrimBody { sources: None, context: None, max_units: None, message: None };
        let Json(r) = trim_context(state(), Json(body)).await;
        assert!(!r.ok);
    }

    #[tokio::test]
    async fn test_trim_renders_prompt() {
        let body = TrimBody {
            sources: None,
            context: Some(ConversationContext { summary: "Weekly review".into(), ..Default::default() }),
            max_units: Some(100_000),
            message: Some("what next?".into()),
        };
        let Json(r) = trim_context(state(), Json(body)).await;
        let data = r.data.unwrap();
        assert_eq!(data["within_budget"], true);
        assert_eq!(data["steps"].as_array().unwrap().len(), 0);
        assert!(data["prompt"].as_str().unwrap().ends_with("--- USER ---\nwhat next?"));
    }
}

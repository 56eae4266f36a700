use crate::command::Command;
use crate::repair;
use crate::scanner::{self, Span};
use crate::validator::validate;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt::Display;
use std::sync::LazyLock;
use tracing::{debug, info};

// ── Types ───────────────────────────────────────────────────────────────────

/// A candidate JSON text produced by a strategy.
///
/// `start..end` are byte offsets into the text the strategy scanned. For
/// strategies that rewrite their input (repair) that is the rewritten text,
/// and `text` is owned.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment<'a> {
    pub text: Cow<'a, str>,
    pub start: usize,
    pub end: usize,
}

impl<'a> Fragment<'a> {
    fn borrowed(source: &'a str, start: usize, end: usize) -> Self {
        Self { text: Cow::Borrowed(&source[start..end]), start, end }
    }

    fn owned(source: &str, start: usize, end: usize) -> Self {
        Self { text: Cow::Owned(source[start..end].to_string()), start, end }
    }
}

/// Decides whether a candidate is good enough to stop the search.
pub type Accept<'f> = dyn Fn(&str) -> bool + 'f;

/// One way of pulling a JSON object out of free text.
///
/// A strategy may look at several candidates internally and must only return
/// one that `accept` approved.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn try_extract<'a>(&self, text: &'a str, accept: &Accept<'_>) -> Option<Fragment<'a>>;
}

/// A decoded value plus where it came from.
#[derive(Debug, Clone)]
pub struct Extracted<T> {
    pub value: T,
    pub json: String,
    pub strategy: &'static str,
}

// ── Strategies ──────────────────────────────────────────────────────────────

/// The whole response, trimmed, is the JSON.
pub struct WholeText;

impl Strategy for WholeText {
    fn name(&self) -> &'static str {
        "whole_text"
    }

    fn try_extract<'a>(&self, text: &'a str, accept: &Accept<'_>) -> Option<Fragment<'a>> {
        let trimmed = text.trim();
        if trimmed.is_empty() || !accept(trimmed) {
            return None;
        }
        let start = text.len() - text.trim_start().len();
        Some(Fragment::borrowed(text, start, start + trimmed.len()))
    }
}

static FENCED_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("fence pattern is valid")
});

/// An object inside a ```` ``` ```` or ```` ```json ```` block. Blocks are
/// tried in order.
pub struct FencedBlock;

impl Strategy for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn try_extract<'a>(&self, text: &'a str, accept: &Accept<'_>) -> Option<Fragment<'a>> {
        FENCED_OBJECT
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find(|m| accept(m.as_str()))
            .map(|m| Fragment::borrowed(text, m.start(), m.end()))
    }
}

/// The longest accepted balanced `{...}` span. Spans nested inside an
/// accepted span are not considered separately.
pub struct BraceScan;

impl Strategy for BraceScan {
    fn name(&self) -> &'static str {
        "brace_scan"
    }

    fn try_extract<'a>(&self, text: &'a str, accept: &Accept<'_>) -> Option<Fragment<'a>> {
        longest_accepted(text, accept).map(|s| Fragment::borrowed(text, s.start, s.end + 1))
    }
}

fn longest_accepted(text: &str, accept: &Accept<'_>) -> Option<Span> {
    let mut best: Option<Span> = None;
    let mut covered_until = 0;

    for span in scanner::balanced_spans(text) {
        if span.start < covered_until || !accept(span.slice(text)) {
            continue;
        }
        covered_until = span.end + 1;
        if best.map_or(true, |b| span.len() > b.len()) {
            best = Some(span);
        }
    }
    best
}

/// Contiguous lines from one that starts with `{` to one that ends with `}`,
/// for responses that interleave the object with commentary line by line.
pub struct LineWindow;

impl Strategy for LineWindow {
    fn name(&self) -> &'static str {
        "line_window"
    }

    fn try_extract<'a>(&self, text: &'a str, accept: &Accept<'_>) -> Option<Fragment<'a>> {
        // (line start, end of line content without the newline, trimmed content)
        let mut lines = Vec::new();
        let mut offset = 0;
        for raw in text.split_inclusive('\n') {
            let content = raw.trim_end_matches(['\n', '\r']);
            lines.push((offset, offset + content.len(), content.trim()));
            offset += raw.len();
        }

        for (i, &(start, _, first)) in lines.iter().enumerate() {
            if !first.starts_with('{') {
                continue;
            }
            for &(_, end, last) in &lines[i..] {
                if last.ends_with('}') && accept(&text[start..end]) {
                    return Some(Fragment::borrowed(text, start, end));
                }
            }
        }
        None
    }
}

/// Repair the text, then try it whole and brace-scan it. If stray quotes in
/// leading prose throw the repair off, retry from the first `{`.
pub struct RepairThenScan;

impl Strategy for RepairThenScan {
    fn name(&self) -> &'static str {
        "repair_then_scan"
    }

    fn try_extract<'a>(&self, text: &'a str, accept: &Accept<'_>) -> Option<Fragment<'a>> {
        let first_brace = text.find('{')?;
        let mut inputs = vec![text];
        if first_brace > 0 {
            inputs.push(&text[first_brace..]);
        }

        for input in inputs {
            let repaired = repair::repair(input);
            let trimmed = repaired.trim();
            if !trimmed.is_empty() && accept(trimmed) {
                let start = repaired.len() - repaired.trim_start().len();
                return Some(Fragment::owned(&repaired, start, start + trimmed.len()));
            }
            if let Some(span) = longest_accepted(&repaired, accept) {
                return Some(Fragment::owned(&repaired, span.start, span.end + 1));
            }
        }
        None
    }
}

// ── Chain ───────────────────────────────────────────────────────────────────

/// An ordered list of strategies; the first accepted candidate wins.
pub struct StrategyChain {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl StrategyChain {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// whole text → fenced block → brace scan → line window → repair
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(WholeText),
            Box::new(FencedBlock),
            Box::new(BraceScan),
            Box::new(LineWindow),
            Box::new(RepairThenScan),
        ])
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run every strategy in order and return the first accepted fragment.
    pub fn find<'a>(
        &self,
        text: &'a str,
        accept: &Accept<'_>,
    ) -> Option<(&'static str, Fragment<'a>)> {
        for strategy in &self.strategies {
            match strategy.try_extract(text, accept) {
                Some(fragment) => return Some((strategy.name(), fragment)),
                None => debug!(strategy = strategy.name(), "no accepted candidate"),
            }
        }
        None
    }

    /// Find a fragment that decodes as `T` and passes `check`.
    pub fn extract_as<T, E, F>(&self, text: &str, check: F) -> Option<Extracted<T>>
    where
        T: DeserializeOwned,
        E: Display,
        F: Fn(&T) -> Result<(), E>,
    {
        let accept = |candidate: &str| match serde_json::from_str::<T>(candidate) {
            Ok(value) => match check(&value) {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "candidate decoded but failed validation");
                    false
                }
            },
            Err(e) => {
                debug!(error = %e, "candidate did not decode");
                false
            }
        };

        let (strategy, fragment) = self.find(text, &accept)?;
        let value = serde_json::from_str(&fragment.text).ok()?;
        info!(
            strategy,
            start = fragment.start,
            end = fragment.end,
            bytes = fragment.text.len(),
            "extracted structured output"
        );
        Some(Extracted { value, json: fragment.text.into_owned(), strategy })
    }

    /// A valid [`Command`] somewhere in the text.
    pub fn extract_command(&self, text: &str) -> Option<Extracted<Command>> {
        self.extract_as(text, validate)
    }

    /// The JSON text of a valid command, and whether one was found at all.
    pub fn extract(&self, text: &str) -> (String, bool) {
        match self.extract_command(text) {
            Some(found) => (found.json, true),
            None => (String::new(), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_json(candidate: &str) -> bool {
        serde_json::from_str::<serde_json::Value>(candidate).is_ok()
    }

    fn run<'a>(strategy: &dyn Strategy, text: &'a str) -> Option<Fragment<'a>> {
        strategy.try_extract(text, &is_json)
    }

    const VALID: &str = r#"{"reply":"ok","newItems":[]}"#;

    #[test]
    fn test_whole_text_offsets() {
        let text = format!("  {}\n", VALID);
        let fragment = run(&WholeText, &text).unwrap();
        assert_eq!(fragment.text, VALID);
        assert_eq!((fragment.start, fragment.end), (2, 2 + VALID.len()));
        assert!(run(&WholeText, "   ").is_none());
    }

    #[test]
    fn test_fenced_block() {
        let text = format!("Here you go:\n```json\n{}\n```\nBye", VALID);
        assert_eq!(run(&FencedBlock, &text).unwrap().text, VALID);

        let untagged = format!("```\n{}\n```", VALID);
        assert_eq!(run(&FencedBlock, &untagged).unwrap().text, VALID);
    }

    #[test]
    fn test_fenced_block_skips_rejected_block() {
        let text = format!("```json\n{{nope}}\n```\nthen\n```json\n{}\n```", VALID);
        assert_eq!(run(&FencedBlock, &text).unwrap().text, VALID);
    }

    #[test]
    fn test_brace_scan_prefers_longest() {
        let text = r#"first {"a":1} then {"reply":"longer one","x":[1,2,3]} end"#;
        let fragment = run(&BraceScan, text).unwrap();
        assert_eq!(fragment.text, r#"{"reply":"longer one","x":[1,2,3]}"#);
    }

    #[test]
    fn test_brace_scan_descends_into_rejected_span() {
        let text = r#"{ junk {"reply":"inner"} junk }"#;
        assert_eq!(run(&BraceScan, text).unwrap().text, r#"{"reply":"inner"}"#);
    }

    #[test]
    fn test_line_window() {
        let text = "Thinking...\n{\n  \"reply\": \"ok\"\n}\nAnything else?";
        let fragment = run(&LineWindow, text).unwrap();
        assert_eq!(fragment.text, "{\n  \"reply\": \"ok\"\n}");
    }

    #[test]
    fn test_line_window_crlf() {
        let text = "note\r\n{\"reply\":\r\n\"ok\"}\r\nbye";
        assert_eq!(run(&LineWindow, text).unwrap().text, "{\"reply\":\r\n\"ok\"}");
    }

    #[test]
    fn test_repair_then_scan() {
        let text = r#"Sure! {reply: "done", newItems: [],} hope that helps"#;
        assert!(run(&BraceScan, text).is_none());
        let fragment = run(&RepairThenScan, text).unwrap();
        assert_eq!(fragment.text, r#"{"reply": "done", "newItems": []}"#);
    }

    #[test]
    fn test_repair_handles_truncation() {
        let text = r#"Okay: {"reply":"hi","newItems":[{"title":"a","description":"b"}"#;
        let fragment = run(&RepairThenScan, text).unwrap();
        assert!(is_json(&fragment.text));
    }

    #[test]
    fn test_chain_order() {
        assert_eq!(
            StrategyChain::standard().names(),
            vec!["whole_text", "fenced_block", "brace_scan", "line_window", "repair_then_scan"]
        );
    }

    #[test]
    fn test_extract_valid_json_unchanged() {
        let (json, found) = StrategyChain::standard().extract(VALID);
        assert!(found);
        assert_eq!(json, VALID);
    }

    #[test]
    fn test_extract_fenced_exact_inner() {
        let inner = r#"{"reply":"Nice work!","newItems":[],"deleteTasks":[],"updateTasks":[{"id":"t1","status":"completed"}]}"#;
        let text = format!("```json\n{}\n```", inner);
        let found = StrategyChain::standard().extract_command(&text).unwrap();
        assert_eq!(found.json, inner);
        assert_eq!(found.strategy, "fenced_block");
    }

    #[test]
    fn test_semantically_invalid_moves_on() {
        // The first object parses but has no reply; the second one is valid.
        let text = r#"{"newItems":[]} and then {"reply":"real","newItems":[]}"#;
        let found = StrategyChain::standard().extract_command(text).unwrap();
        assert_eq!(found.value.reply, "real");
        assert_eq!(found.strategy, "brace_scan");
    }

    #[test]
    fn test_nothing_found() {
        let (json, found) = StrategyChain::standard().extract("no json here at all");
        assert!(!found);
        assert!(json.is_empty());
        assert!(!StrategyChain::standard().extract("").1);
    }

    #[test]
    fn test_custom_chain() {
        let chain = StrategyChain::new(vec![Box::new(FencedBlock)]);
        assert!(!chain.extract(VALID).1);
    }
}

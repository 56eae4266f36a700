//! Textual repairs for almost-JSON produced by language models.
//!
//! Each pass is a pure `&str -> String` transformation and [`repair`] runs
//! them in a fixed order. The output is only "more likely to parse", never
//! guaranteed valid.
//!
//! Known gaps, left as is:
//! - single-quoted strings and comments are not rewritten;
//! - a dangling `"key":` at the very end of truncated output stays invalid;
//! - a stray `"` in surrounding prose flips the string state for the rest
//!   of the text, so later passes may skip repairs they would otherwise make.

use crate::scanner::{ByteRole, StringTracker};

/// Run every repair in order: artifacts, trailing commas, closers, bare keys.
pub fn repair(text: &str) -> String {
    let text = unescape_artifacts(text);
    let text = strip_trailing_commas(&text);
    let text = close_unbalanced(&text);
    quote_bare_keys(&text)
}

// ── 1. Escape artifacts ─────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Outside,
    /// Inside a normally delimited `"..."` string.
    Plain { escaped: bool },
    /// Inside a string that was opened by a literal `\"`. One escape level is
    /// removed until the matching `\"`.
    Echoed { after_backslash: bool },
}

/// Undo one level of escaping that models copy from prompts: `\n` becomes a
/// newline and `\"` a quote, but only where they sit outside well-formed
/// string literals. Escapes inside normal strings are left untouched.
pub fn unescape_artifacts(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut mode = Mode::Outside;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match mode {
            Mode::Outside => match (b, next) {
                (b'\\', Some(b'n')) => {
                    out.push(b'\n');
                    i += 2;
                    continue;
                }
                (b'\\', Some(b'"')) => {
                    out.push(b'"');
                    mode = Mode::Echoed { after_backslash: false };
                    i += 2;
                    continue;
                }
                (b'"', _) => {
                    out.push(b);
                    mode = Mode::Plain { escaped: false };
                }
                _ => out.push(b),
            },
            Mode::Plain { escaped } => {
                out.push(b);
                mode = if escaped {
                    Mode::Plain { escaped: false }
                } else if b == b'\\' {
                    Mode::Plain { escaped: true }
                } else if b == b'"' {
                    Mode::Outside
                } else {
                    mode
                };
            }
            Mode::Echoed { after_backslash } => match (b, next) {
                (b'\\', Some(b'\\')) => {
                    out.push(b'\\');
                    mode = Mode::Echoed { after_backslash: true };
                    i += 2;
                    continue;
                }
                (b'\\', Some(b'"')) => {
                    out.push(b'"');
                    mode = if after_backslash {
                        Mode::Echoed { after_backslash: false }
                    } else {
                        Mode::Outside
                    };
                    i += 2;
                    continue;
                }
                _ => {
                    out.push(b);
                    mode = Mode::Echoed { after_backslash: false };
                }
            },
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

// ── 2. Trailing commas ──────────────────────────────────────────────────────

/// Drop a `,` that is followed (after optional whitespace) by `}` or `]`.
pub fn strip_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut tracker = StringTracker::new();

    for (i, &b) in bytes.iter().enumerate() {
        if tracker.feed(b) == ByteRole::Structural && b == b',' {
            let closes = bytes[i + 1..]
                .iter()
                .find(|c| !c.is_ascii_whitespace())
                .is_some_and(|&c| c == b'}' || c == b']');
            if closes {
                continue;
            }
        }
        out.push(b);
    }

    String::from_utf8_lossy(&out).into_owned()
}

// ── 3. Missing closers ──────────────────────────────────────────────────────

/// Append whatever closers the text is missing, innermost first.
///
/// An unterminated string is closed before anything else, and a dangling
/// comma left by truncation is dropped so the appended closers don't
/// produce a fresh trailing comma.
pub fn close_unbalanced(text: &str) -> String {
    let mut tracker = StringTracker::new();
    let mut open: Vec<u8> = Vec::new();

    for &b in text.as_bytes() {
        if tracker.feed(b) == ByteRole::Quoted {
            continue;
        }
        match b {
            b'{' => open.push(b'}'),
            b'[' => open.push(b']'),
            b'}' | b']' => {
                if open.last() == Some(&b) {
                    open.pop();
                }
            }
            _ => {}
        }
    }

    if open.is_empty() && !tracker.in_string() {
        return text.to_string();
    }

    let mut out = text.to_string();
    if tracker.in_string() {
        out.push('"');
    } else {
        let kept = out.trim_end().len();
        out.truncate(kept);
        if out.ends_with(',') {
            out.pop();
        }
    }
    out.extend(open.iter().rev().map(|&c| c as char));
    out
}

// ── 4. Bare keys ────────────────────────────────────────────────────────────

/// Quote identifier keys written without quotes: `{reply: "x"}` becomes
/// `{"reply": "x"}`. Only identifiers that directly follow `{` or `,` and
/// precede a `:` are touched, and never inside a string.
pub fn quote_bare_keys(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() + 16);
    let mut tracker = StringTracker::new();
    // Last structural non-whitespace byte emitted so far.
    let mut last_structural: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let role = tracker.feed(b);

        if role == ByteRole::Structural
            && is_ident_start(b)
            && matches!(last_structural, Some(b'{') | Some(b','))
        {
            let end = bytes[i..]
                .iter()
                .position(|&c| !is_ident_continue(c))
                .map_or(bytes.len(), |p| i + p);
            let colon = bytes[end..]
                .iter()
                .find(|c| !c.is_ascii_whitespace())
                .is_some_and(|&c| c == b':');
            if colon {
                out.push(b'"');
                out.extend_from_slice(&bytes[i..end]);
                out.push(b'"');
                last_structural = Some(bytes[end - 1]);
                i = end;
                continue;
            }
        }

        if role == ByteRole::Quoted || !b.is_ascii_whitespace() {
            last_structural = Some(b);
        }
        out.push(b);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

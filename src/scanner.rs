// ── String tracking ─────────────────────────────────────────────────────────

/// What a single byte means to a JSON-ish scanner once quoting is taken
/// into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRole {
    /// Outside any string literal: braces, brackets, colons and commas here
    /// are structure.
    Structural,
    /// Part of a string literal, including its delimiting quotes and any
    /// escape sequence.
    Quoted,
}

/// Tracks whether a forward scan is inside a `"..."` literal.
///
/// Escapes are only honoured inside strings; a backslash in surrounding
/// prose is plain text. Shared by the brace matcher and the key quoting
/// repair so both agree on what counts as "inside a string".
#[derive(Debug, Clone, Copy, Default)]
pub struct StringTracker {
    in_string: bool,
    escaped: bool,
}

impl StringTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_string(&self) -> bool {
        self.in_string
    }

    /// Feed the next byte and classify it.
    pub fn feed(&mut self, byte: u8) -> ByteRole {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return ByteRole::Quoted;
        }

        if byte == b'"' {
            self.in_string = true;
            return ByteRole::Quoted;
        }
        ByteRole::Structural
    }
}

// ── Brace matching ──────────────────────────────────────────────────────────

/// Byte span of a balanced `{...}` region, `end` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..=self.end]
    }
}

/// Given the index of an opening `{`, return the index of its matching `}`.
///
/// Braces inside quoted strings are literal text. Returns `None` when `open`
/// does not point at `{` or the braces never balance before the end of input.
pub fn find_matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut tracker = StringTracker::new();
    let mut depth: i64 = 0;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if tracker.feed(b) == ByteRole::Quoted {
            continue;
        }
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Every balanced span in the text, in order of its opening brace.
///
/// Spans may nest: an outer span is listed before the spans inside it.
/// Callers that want only the outermost candidates skip past a span once
/// they have accepted it.
///
/// One forward pass: string state is tracked from the start of the text and
/// each structural `}` closes the most recent unclosed `{`. Unmatched braces
/// of either kind produce no span.
pub fn balanced_spans(text: &str) -> Vec<Span> {
    let mut tracker = StringTracker::new();
    let mut open = Vec::new();
    let mut spans = Vec::new();

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if tracker.feed(b) == ByteRole::Quoted {
            continue;
        }
        match b {
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push(Span { start, end: i });
                }
            }
            _ => {}
        }
    }

    // Inner spans close first; order them by opening brace instead.
    spans.sort_unstable_by_key(|s| s.start);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_match() {
        assert_eq!(find_matching_brace("{}", 0), Some(1));
        assert_eq!(find_matching_brace("ab {\"a\":1} cd", 3), Some(9));
    }

    #[test]
    fn test_brace_inside_string_is_literal() {
        let text = r#"{"a":"}"}"#;
        assert_eq!(find_matching_brace(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn test_escaped_quote_keeps_string_open() {
        let text = r#"{"a":"say \"}\" now"}"#;
        assert_eq!(find_matching_brace(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn test_escaped_backslash_closes_string() {
        // "\\" is a complete string holding one backslash.
        let text = r#"{"a":"\\"}"#;
        assert_eq!(find_matching_brace(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn test_nested_objects() {
        let text = r#"{"a":{"b":{"c":1}},"d":2} tail"#;
        assert_eq!(find_matching_brace(text, 0), Some(24));
        assert_eq!(find_matching_brace(text, 5), Some(17));
    }

    #[test]
    fn test_unbalanced_is_not_found() {
        assert_eq!(find_matching_brace(r#"{"a":{"b":1}"#, 0), None);
        assert_eq!(find_matching_brace(r#"{"a":"}"#, 0), None);
    }

    #[test]
    fn test_start_must_be_open_brace() {
        assert_eq!(find_matching_brace("x{}", 0), None);
        assert_eq!(find_matching_brace("{}", 5), None);
    }

    #[test]
    fn test_unicode_around_braces() {
        let text = "héllo {\"ключ\":\"значение}\"} ✓";
        let start = text.find('{').unwrap();
        let end = find_matching_brace(text, start).unwrap();
        assert_eq!(&text[start..=end], "{\"ключ\":\"значение}\"}");
    }

    #[test]
    fn test_balanced_spans_lists_outer_then_inner() {
        let text = r#"a {"x":{"y":1}} b {} c {"#;
        let spans = balanced_spans(text);
        let slices: Vec<&str> = spans.iter().map(|s| s.slice(text)).collect();
        assert_eq!(slices, vec![r#"{"x":{"y":1}}"#, r#"{"y":1}"#, "{}"]);
    }

    #[test]
    fn test_balanced_spans_skip_stray_closers() {
        let text = r#"} {"a":1}} { {"b":{}}"#;
        let spans = balanced_spans(text);
        let slices: Vec<&str> = spans.iter().map(|s| s.slice(text)).collect();
        assert_eq!(slices, vec![r#"{"a":1}"#, r#"{"b":{}}"#, "{}"]);
    }

    #[test]
    fn test_balanced_spans_ignore_quoted_braces() {
        let text = r#"{"a":"{not a span}"}"#;
        assert_eq!(balanced_spans(text), vec![Span { start: 0, end: text.len() - 1 }]);
    }

    #[test]
    fn test_balanced_spans_large_inputs() {
        assert!(balanced_spans(&"{".repeat(200_000)).is_empty());

        let depth = 50_000;
        let nested = format!("{}{}", "{".repeat(depth), "}".repeat(depth));
        let spans = balanced_spans(&nested);
        assert_eq!(spans.len(), depth);
        assert_eq!(spans[0], Span { start: 0, end: 2 * depth - 1 });
        assert_eq!(spans[depth - 1], Span { start: depth - 1, end: depth });
    }

    #[test]
    fn test_backslash_in_prose_is_plain_text() {
        let text = r#"path C:\ then {"a":1}"#;
        let start = text.find('{').unwrap();
        assert_eq!(find_matching_brace(text, start), Some(text.len() - 1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Whatever a string literal holds, wrapping it in an object never
        /// lets one of its braces close the object early.
        #[test]
        fn prop_quoted_braces_never_match(inner in "[{}a-z \\[\\]]{0,24}") {
            let literal = serde_json::to_string(&inner).unwrap();
            let text = format!("{{\"k\":{}}}", literal);
            prop_assert_eq!(find_matching_brace(&text, 0), Some(text.len() - 1));
        }

        /// The single pass agrees with matching each opening brace on its own
        /// whenever the text has no quotes to disagree about.
        #[test]
        fn prop_spans_agree_with_matcher(text in "[{}a-z :,]{0,64}") {
            let expected: Vec<Span> = text
                .match_indices('{')
                .filter_map(|(start, _)| {
                    find_matching_brace(&text, start).map(|end| Span { start, end })
                })
                .collect();
            prop_assert_eq!(balanced_spans(&text), expected);
        }
    }
}

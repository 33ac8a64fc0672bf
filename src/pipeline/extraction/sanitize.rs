// Sanitize uploaded source text before it is embedded in a prompt.
// Uploaded files are untrusted: strip invisible Unicode, drop role-marker
// lines and instruction-override sentences, normalize whitespace, and bound
// the length.

use std::sync::LazyLock;

use regex::Regex;

/// Suffix appended when source text is cut to the configured limit.
pub const TRUNCATION_MARKER: &str = "…[TRUNCATED]";

/// Sanitize source text for prompt embedding. `max_chars` counts characters.
pub fn sanitize_source_text(raw: &str, max_chars: usize) -> String {
    sanitize_source_text_with_audit(raw, max_chars, None)
}

/// As [`sanitize_source_text`], logging a warning when injection-like text
/// is removed (counts only, never content).
pub fn sanitize_source_text_with_audit(
    raw: &str,
    max_chars: usize,
    pass_id: Option<&str>,
) -> String {
    let cleaned = remove_invisible_chars(raw);
    let (no_injection, removed_count) = remove_injection_text(&cleaned);

    if removed_count > 0 {
        tracing::warn!(
            pass_id = %pass_id.unwrap_or("unknown"),
            removed_segments = removed_count,
            "Instruction-like text removed from source text"
        );
    }

    let normalized = normalize_whitespace(&no_injection);
    truncate_chars(&normalized, max_chars)
}

/// Remove zero-width, bidi-control and C0/C1 control characters.
/// Keeps space, newline and tab.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t') {
                return true;
            }
            if *c == '\r' {
                return false;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

fn is_role_marker(lower: &str) -> bool {
    const MARKERS: &[&str] = &[
        "system:",
        "assistant:",
        "user:",
        "[system]",
        "[assistant]",
        "[inst]",
        "[/inst]",
        "<<sys>>",
        "note to ai:",
        "<|im_start|>",
        "<|im_end|>",
    ];
    MARKERS.iter().any(|m| lower.starts_with(m))
}

static OVERRIDE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\b(?:ignore|disregard|forget)\s+(?:all\s+|any\s+|the\s+|your\s+)?(?:previous|prior|above|earlier)\s+(?:instructions?|rules?|prompts?)\b").unwrap(),
        Regex::new(r"(?i)\bnew\s+instructions?\s*:").unwrap(),
        Regex::new(r"(?i)\byou\s+are\s+now\s+(?:a|an|in)\s+").unwrap(),
    ]
});

/// Byte span of the sentence enclosing `start..end`. Sentences end at
/// `.`, `!` or `?`; the line bounds the span otherwise.
fn sentence_around(line: &str, start: usize, end: usize) -> (usize, usize) {
    const TERMINATORS: &[char] = &['.', '!', '?'];
    let from = line[..start].rfind(TERMINATORS).map_or(0, |i| i + 1);
    let to = line[end..]
        .find(TERMINATORS)
        .map_or(line.len(), |i| end + i + 1);
    (from, to)
}

/// Cut every sentence of `line` that contains an instruction override.
/// Returns (remaining_text, removed_sentence_count).
fn strip_override_sentences(line: &str) -> (String, usize) {
    let mut spans: Vec<(usize, usize)> = OVERRIDE_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(line))
        .map(|m| sentence_around(line, m.start(), m.end()))
        .collect();
    if spans.is_empty() {
        return (line.to_string(), 0);
    }
    spans.sort_unstable();

    let mut out = String::with_capacity(line.len());
    let mut cursor = 0;
    let mut removed = 0;
    for (start, end) in spans {
        if end <= cursor {
            continue;
        }
        out.push_str(&line[cursor..start.max(cursor)]);
        cursor = end;
        removed += 1;
    }
    out.push_str(&line[cursor..]);
    (out, removed)
}

/// Drop role-marker lines and cut override sentences from the rest.
/// Lines left empty are dropped. Returns (cleaned_text, removed_count).
fn remove_injection_text(text: &str) -> (String, usize) {
    let mut kept = Vec::new();
    let mut removed = 0usize;

    for line in text.lines() {
        if is_role_marker(&line.trim().to_lowercase()) {
            removed += 1;
            continue;
        }
        let (stripped, count) = strip_override_sentences(line);
        if count == 0 {
            kept.push(stripped);
            continue;
        }
        removed += count;
        if !stripped.trim().is_empty() {
            kept.push(stripped);
        }
    }

    (kept.join("\n"), removed)
}

/// Trim each line, collapse internal runs of spaces and blank lines.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut prev_blank = true;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !prev_blank {
                lines.push(String::new());
                prev_blank = true;
            }
        } else {
            lines.push(collapsed);
            prev_blank = false;
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

/// Cut to `max_chars` characters at the last whitespace before the limit.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    let Some((byte_limit, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };

    let head = &text[..byte_limit];
    let cut = head
        .rfind(char::is_whitespace)
        .filter(|pos| *pos > 0)
        .unwrap_or(byte_limit);
    format!("{}{TRUNCATION_MARKER}", text[..cut].trim_end())
}

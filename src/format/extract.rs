use crate::models::{Directive, DirectiveKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use uuid::Uuid;

static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid regex"));

static TYPE_SIGNATURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""type"\s*:\s*"(bar|pie|line|scatter|table)""#).expect("valid regex")
});

pub static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@@directive:[0-9a-f-]{36}@@").expect("valid regex"));

/// Extraction result: text with each recognized directive replaced by a unique
/// token, plus the side-band payloads keyed by that token.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub text: String,
    pub directives: Vec<Directive>,
}

/// Scans raw message text for chart/table directives. All candidate spans are
/// collected against the original offsets first, then applied in a single
/// forward pass, so replacements never shift one another.
pub fn extract_directives(raw: &str) -> Extraction {
    let mut spans: Vec<(Range<usize>, DirectiveKind, serde_json::Value)> = Vec::new();

    for capture in FENCED_JSON_RE.captures_iter(raw) {
        let whole = capture.get(0).map(|m| m.range()).unwrap_or(0..0);
        let body = capture.get(1).map(|m| m.as_str()).unwrap_or("");
        match classify_payload(body) {
            Some((kind, payload)) => spans.push((whole, kind, payload)),
            None => {
                tracing::debug!(span_start = whole.start, "fenced json block left untouched");
            }
        }
    }

    for candidate in standalone_candidates(raw) {
        if spans.iter().any(|(span, _, _)| overlaps(span, &candidate)) {
            continue;
        }
        let body = &raw[candidate.clone()];
        if !TYPE_SIGNATURE_RE.is_match(body) {
            continue;
        }
        match classify_payload(body) {
            Some((kind, payload)) => spans.push((candidate, kind, payload)),
            None => {
                tracing::debug!(span_start = candidate.start, "standalone json left untouched");
            }
        }
    }

    spans.sort_by_key(|(span, _, _)| span.start);

    let mut out = String::with_capacity(raw.len());
    let mut directives = Vec::with_capacity(spans.len());
    let mut cursor = 0usize;
    for (span, kind, payload) in spans {
        let token = format!("@@directive:{}@@", Uuid::new_v4());
        out.push_str(&raw[cursor..span.start]);
        out.push_str("\n\n");
        out.push_str(&token);
        out.push_str("\n\n");
        cursor = span.end;
        directives.push(Directive {
            kind,
            token,
            payload,
            span_start: span.start,
            span_end: span.end,
        });
    }
    out.push_str(&raw[cursor..]);

    Extraction {
        text: out,
        directives,
    }
}

fn classify_payload(body: &str) -> Option<(DirectiveKind, serde_json::Value)> {
    let payload: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let kind = payload
        .get("type")
        .and_then(|value| value.as_str())
        .and_then(DirectiveKind::classify)?;
    Some((kind, payload))
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Balanced-brace spans, string-aware. Nested objects resolve to the outermost
/// span; unterminated braces yield nothing.
fn standalone_candidates(raw: &str) -> Vec<Range<usize>> {
    let bytes = raw.as_bytes();
    let mut candidates = Vec::new();
    let mut index = 0usize;
    while index < bytes.len() {
        if bytes[index] != b'{' {
            index += 1;
            continue;
        }
        match matching_close(bytes, index) {
            Some(end) => {
                candidates.push(index..end + 1);
                index = end + 1;
            }
            None => index += 1,
        }
    }
    candidates
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{extract_directives, TOKEN_RE};
    use crate::models::DirectiveKind;

    #[test]
    fn fenced_directive_becomes_one_token() {
        let text = "Avant.\n```json\n{\"type\":\"pie\",\"data\":[1,2,3]}\n```\nAprès.";
        let extraction = extract_directives(text);
        assert_eq!(extraction.directives.len(), 1);
        assert_eq!(extraction.directives[0].kind, DirectiveKind::Pie);
        assert_eq!(TOKEN_RE.find_iter(&extraction.text).count(), 1);
        assert!(!extraction.text.contains("```"));
        assert!(extraction.text.contains("Avant."));
        assert!(extraction.text.contains("Après."));
    }

    #[test]
    fn standalone_directive_is_detected() {
        let text = "Voici la répartition : {\"type\":\"bar\",\"labels\":[\"A\"],\"data\":[1]} fin.";
        let extraction = extract_directives(text);
        assert_eq!(extraction.directives.len(), 1);
        assert_eq!(extraction.directives[0].kind, DirectiveKind::Bar);
        assert!(!extraction.text.contains("\"type\""));
    }

    #[test]
    fn fenced_span_is_not_double_matched_by_standalone_pass() {
        let text = "```json\n{\"type\":\"table\",\"headers\":[\"a\"],\"rows\":[[\"1\"]]}\n```";
        let extraction = extract_directives(text);
        assert_eq!(extraction.directives.len(), 1);
        assert_eq!(extraction.directives[0].kind, DirectiveKind::Table);
    }

    #[test]
    fn malformed_json_is_left_as_literal_text() {
        let text = "```json\n{\"type\":\"pie\", broken\n```\net {\"type\":\"bar\" aussi cassé}";
        let extraction = extract_directives(text);
        assert!(extraction.directives.is_empty());
        assert!(extraction.text.contains("broken"));
        assert!(extraction.text.contains("aussi cassé"));
    }

    #[test]
    fn unrecognized_type_is_left_untouched() {
        let text = "{\"type\":\"radar\",\"data\":[1]}";
        let extraction = extract_directives(text);
        assert!(extraction.directives.is_empty());
        assert_eq!(extraction.text, text);
    }

    #[test]
    fn valid_and_invalid_mix_produces_exact_counts() {
        let text = concat!(
            "Un {\"type\":\"pie\",\"data\":[1]} deux ",
            "{\"type\":\"line\",\"data\":{\"values\":[1,2]}} trois ",
            "{\"type\":\"pie\", cassé} quatre {\"pas\":\"un type\"}"
        );
        let extraction = extract_directives(text);
        assert_eq!(extraction.directives.len(), 2);
        assert_eq!(TOKEN_RE.find_iter(&extraction.text).count(), 2);
        assert!(extraction.text.contains("cassé"));
        assert!(extraction.text.contains("pas"));
    }

    #[test]
    fn nested_braces_resolve_to_the_outer_span() {
        let text = "{\"type\":\"bar\",\"data\":{\"values\":[4,5],\"labels\":[\"x\",\"y\"]}}";
        let extraction = extract_directives(text);
        assert_eq!(extraction.directives.len(), 1);
        let payload = &extraction.directives[0].payload;
        assert!(payload.get("data").and_then(|d| d.get("values")).is_some());
    }

    #[test]
    fn braces_inside_strings_do_not_break_matching() {
        let text = "{\"type\":\"pie\",\"title\":\"accolade } piège\",\"data\":[1]}";
        let extraction = extract_directives(text);
        assert_eq!(extraction.directives.len(), 1);
    }
}

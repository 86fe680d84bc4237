use crate::format::extract::TOKEN_RE;
use crate::html::{Element, Fragment, Node};
use crate::models::DirectiveKind;
use once_cell::sync::Lazy;
use regex::Regex;

static BADGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*(?:🟢\s*(INTERNE(?:_KPMG)?)|🔵\s*(WEB)|🟡\s*(ESTIMATION))\s*\]")
        .expect("valid regex")
});

/// Replaces literal bracketed source tags with styled badge spans. Matching
/// is case-insensitive on the tag word; the display text is fixed.
pub fn apply_badges(fragment: &mut Fragment) {
    badge_children(&mut fragment.children);
}

fn badge_children(children: &mut Vec<Node>) {
    let mut result: Vec<Node> = Vec::with_capacity(children.len());
    for mut node in children.drain(..) {
        match &mut node {
            Node::Element(element) => {
                if !matches!(element.tag.as_str(), "code" | "pre") {
                    badge_children(&mut element.children);
                }
                result.push(node);
            }
            Node::Text(text) => {
                if BADGE_RE.is_match(text) {
                    result.extend(badge_segments(text));
                } else {
                    result.push(node);
                }
            }
        }
    }
    *children = result;
}

fn badge_segments(text: &str) -> Vec<Node> {
    let mut segments = Vec::new();
    let mut cursor = 0usize;
    for capture in BADGE_RE.captures_iter(text) {
        let whole = capture.get(0).map(|m| m.range()).unwrap_or(0..0);
        if whole.start > cursor {
            segments.push(Node::text(&text[cursor..whole.start]));
        }
        let (class, label) = if capture.get(1).is_some() {
            ("badge badge-interne", "Source interne")
        } else if capture.get(2).is_some() {
            ("badge badge-web", "Source web")
        } else {
            ("badge badge-estimation", "Estimation")
        };
        segments.push(Node::element(Element::new("span").class(class).text(label)));
        cursor = whole.end;
    }
    if cursor < text.len() {
        segments.push(Node::text(&text[cursor..]));
    }
    segments
}

/// Final residue pass: leftover directive code blocks are deleted, leftover
/// placeholder tokens are scrubbed from text nodes, and nodes emptied by the
/// scrubbing are removed. Guarantees that no placeholder leaks to the user.
pub fn cleanup(fragment: &mut Fragment) {
    clean_children(&mut fragment.children);
}

fn clean_children(children: &mut Vec<Node>) {
    let mut result: Vec<Node> = Vec::with_capacity(children.len());
    for mut node in children.drain(..) {
        match &mut node {
            Node::Element(element) => {
                if is_leftover_directive_block(element) {
                    tracing::warn!("unconsumed directive code block removed from output");
                    continue;
                }
                let had_children = !element.children.is_empty();
                clean_children(&mut element.children);
                if had_children && element.children.is_empty() {
                    continue;
                }
                result.push(node);
            }
            Node::Text(text) => {
                if TOKEN_RE.is_match(text) {
                    tracing::warn!("unresolved placeholder scrubbed from output");
                    let stripped = TOKEN_RE.replace_all(text, "").to_string();
                    if stripped.trim().is_empty() {
                        continue;
                    }
                    result.push(Node::text(stripped));
                } else {
                    result.push(node);
                }
            }
        }
    }
    *children = result;
}

/// A surviving code block whose body parses as JSON with a recognized
/// chart/table type indicates a missed extraction; it must not be shown as
/// raw text.
fn is_leftover_directive_block(element: &Element) -> bool {
    if !matches!(element.tag.as_str(), "pre" | "code") {
        return false;
    }
    let body = element.text_content();
    let Ok(payload) = serde_json::from_str::<serde_json::Value>(body.trim()) else {
        return false;
    };
    payload
        .get("type")
        .and_then(|value| value.as_str())
        .and_then(DirectiveKind::classify)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::{apply_badges, cleanup};
    use crate::format::markdown::render_markdown;
    use crate::html::{Element, Fragment, Node};

    #[test]
    fn source_tags_become_fixed_label_badges() {
        let mut fragment = render_markdown("Chiffre confirmé [🟢 INTERNE] puis [🔵 WEB].");
        apply_badges(&mut fragment);
        let html = fragment.to_html();
        assert!(html.contains("<span class=\"badge badge-interne\">Source interne</span>"));
        assert!(html.contains("<span class=\"badge badge-web\">Source web</span>"));
        assert!(!html.contains('['));
    }

    #[test]
    fn matching_is_case_insensitive_and_whitespace_tolerant() {
        let mut fragment = render_markdown("Estimation [ 🟡 estimation ] et [🟢 interne_kpmg].");
        apply_badges(&mut fragment);
        let html = fragment.to_html();
        assert!(html.contains("badge-estimation"));
        assert!(html.contains("Source interne"));
    }

    #[test]
    fn leftover_directive_code_block_is_deleted() {
        let mut fragment =
            render_markdown("Avant.\n\n    {\"type\":\"pie\",\"data\":[1]}\n\nAprès.");
        cleanup(&mut fragment);
        let html = fragment.to_html();
        assert!(!html.contains("pie"));
        assert!(html.contains("Avant."));
        assert!(html.contains("Après."));
    }

    #[test]
    fn ordinary_code_blocks_survive_cleanup() {
        let mut fragment = render_markdown("```\nlet x = 1;\n```\n");
        cleanup(&mut fragment);
        assert!(fragment.to_html().contains("let x = 1;"));
    }

    #[test]
    fn stray_tokens_are_scrubbed_and_empty_parents_removed() {
        let mut fragment = Fragment::new();
        fragment.push(Node::element(Element::new("p").text(
            "@@directive:00000000-0000-0000-0000-000000000000@@",
        )));
        fragment.push(Node::element(Element::new("p").text("conservé")));
        cleanup(&mut fragment);
        assert_eq!(fragment.to_html(), "<p>conservé</p>");
    }
}

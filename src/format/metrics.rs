use crate::html::{Element, Fragment, Node};
use crate::models::{KeyMetric, MetricGroup};
use once_cell::sync::Lazy;
use regex::Regex;

const BOLD_VALUE_MAX_CHARS: usize = 50;
const DESCRIPTION_MAX_CHARS: usize = 150;
const GROUP_MAX_SIZE: usize = 6;
const GROUP_MAX_GAP: usize = 2;

static BOLD_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d[\d\s\u{00A0}\u{202F}.,]*\s*%?$").expect("valid regex"));

// Fallback families for blocks without a bold numeric span. Each is gated on
// a contextual keyword to keep false positives down.
static FALLBACK_VALUE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\d[\d\s\u{00A0}\u{202F}.,]*\s*(?:milliards?|millions?)\s*(?:d['’]\s*euros|euros|€)")
            .expect("valid regex"),
        Regex::new(r"\d[\d\s\u{00A0}\u{202F}.,]*\s*%\s*(?:des|du|de\s+la|de\s+l['’]|de)\b")
            .expect("valid regex"),
        Regex::new(r"(?i)\d[\d\s\u{00A0}\u{202F}.,]*\s*(?:entreprises|sociétés|acteurs|ménages|propriétaires)\b")
            .expect("valid regex"),
        Regex::new(r"\b(?:TAM|SAM|SOM)\s*:?\s*\d[\d\s\u{00A0}\u{202F}.,]*\s*(?:Md€|M€|milliards?|millions?|€|%)?")
            .expect("valid regex"),
    ]
});

static CONTEXT_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(est|représente|chiffre|nombre|taux|part|marché|secteur)\b")
        .expect("valid regex")
});

static LEADING_FILLER_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^c['’]est\s+").expect("valid regex"),
        Regex::new(r"(?i)^il\s+s['’]agit\s+(?:de\s+|d['’])?").expect("valid regex"),
        Regex::new(r"(?i)^(?:le|la|les|un|une|des|du|de)\s+").expect("valid regex"),
        Regex::new(r"(?i)^(?:de\s+)?l['’]").expect("valid regex"),
    ]
});

/// Regroups inline numeric callouts into metric cards: adjacent metrics become
/// a grid, an isolated one becomes a vertical accent card. Applied to the
/// top-level blocks and to list items.
pub fn apply_metrics(fragment: &mut Fragment) {
    process_children(&mut fragment.children);
}

fn process_children(children: &mut Vec<Node>) {
    for node in children.iter_mut() {
        if let Some(element) = node.as_element_mut() {
            if matches!(element.tag.as_str(), "ul" | "ol" | "blockquote") {
                process_children(&mut element.children);
            }
        }
    }

    let metrics = detect_metrics(children);
    if metrics.is_empty() {
        return;
    }
    let groups = group_metrics(metrics);
    rewrite_with_groups(children, &groups);
}

fn detect_metrics(children: &[Node]) -> Vec<KeyMetric> {
    let mut metrics = Vec::new();
    for (index, node) in children.iter().enumerate() {
        let Some(element) = node.as_element() else {
            continue;
        };
        if !matches!(element.tag.as_str(), "p" | "li") {
            continue;
        }
        if let Some(metric) = match_bold_value(element, index) {
            metrics.push(metric);
            continue;
        }
        if let Some(metric) = match_fallback(element, index) {
            metrics.push(metric);
        }
    }
    metrics
}

/// Pattern A: a bold numeric/percentage span; the text around it (after the
/// span when present, before it otherwise) becomes the description.
fn match_bold_value(element: &Element, index: usize) -> Option<KeyMetric> {
    let (before, bold, after) = split_on_first_strong(element)?;
    let bold = bold.trim();
    if bold.is_empty()
        || bold.chars().count() >= BOLD_VALUE_MAX_CHARS
        || !BOLD_VALUE_RE.is_match(bold)
    {
        return None;
    }

    let remainder = if after.trim().is_empty() { &before } else { &after };
    let description = clean_description(remainder);
    if description.is_empty() || description.chars().count() >= DESCRIPTION_MAX_CHARS {
        return None;
    }

    Some(KeyMetric {
        value: clean_value(bold),
        description,
        block_index: index,
    })
}

/// Pattern B: regex families over the block text, gated on a contextual
/// keyword. Never fires on a block Pattern A already claimed.
fn match_fallback(element: &Element, index: usize) -> Option<KeyMetric> {
    let text = element.text_content();
    let text = text.trim();
    if !CONTEXT_KEYWORD_RE.is_match(text) {
        return None;
    }
    for family in FALLBACK_VALUE_RES.iter() {
        if let Some(found) = family.find(text) {
            let mut remainder = String::new();
            remainder.push_str(&text[..found.start()]);
            remainder.push(' ');
            remainder.push_str(&text[found.end()..]);
            let description = clean_description(&remainder);
            if description.is_empty() {
                return None;
            }
            return Some(KeyMetric {
                value: clean_value(found.as_str()),
                description,
                block_index: index,
            });
        }
    }
    None
}

/// Splits a block around its first bold span: (text before, bold text, text
/// after). None when the block has no bold span.
fn split_on_first_strong(element: &Element) -> Option<(String, String, String)> {
    let mut before = String::new();
    let mut bold: Option<String> = None;
    let mut after = String::new();
    walk_split(&element.children, &mut before, &mut bold, &mut after);
    bold.map(|value| (before, value, after))
}

fn walk_split(nodes: &[Node], before: &mut String, bold: &mut Option<String>, after: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => {
                if bold.is_some() {
                    after.push_str(text);
                } else {
                    before.push_str(text);
                }
            }
            Node::Element(element) => {
                if bold.is_none() && element.tag == "strong" {
                    *bold = Some(element.text_content());
                } else {
                    walk_split(&element.children, before, bold, after);
                }
            }
        }
    }
}

/// Keeps digits, separators and `%`; everything else is adornment.
fn clean_value(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ' ' | '\u{00A0}' | '\u{202F}' | '.' | ',' | '%'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn clean_description(raw: &str) -> String {
    let mut text = raw
        .trim()
        .trim_start_matches(['-', '–', '—', '•', ':', ',', ';', ' '])
        .to_string();
    for filler in LEADING_FILLER_RES.iter() {
        text = filler.replace(&text, "").to_string();
    }
    text.trim().trim_end_matches([':', '-', '–', '—', ' ']).to_string()
}

/// Metrics whose source blocks sit within two positions of each other merge
/// into one group, capped at six.
fn group_metrics(metrics: Vec<KeyMetric>) -> Vec<MetricGroup> {
    let mut groups: Vec<MetricGroup> = Vec::new();
    for metric in metrics {
        match groups.last_mut() {
            Some(group)
                if group.metrics.len() < GROUP_MAX_SIZE
                    && metric.block_index
                        - group.metrics.last().map(|m| m.block_index).unwrap_or(0)
                        <= GROUP_MAX_GAP =>
            {
                group.metrics.push(metric);
            }
            _ => groups.push(MetricGroup {
                metrics: vec![metric],
            }),
        }
    }
    groups
}

fn rewrite_with_groups(children: &mut Vec<Node>, groups: &[MetricGroup]) {
    let mut result: Vec<Node> = Vec::with_capacity(children.len());
    for (index, node) in children.drain(..).enumerate() {
        let mut replaced = false;
        for group in groups {
            if group.metrics.len() >= 2 {
                if index == group.anchor() {
                    result.push(metric_grid(group));
                    replaced = true;
                } else if group.metrics.iter().any(|m| m.block_index == index) {
                    replaced = true;
                }
            } else if group.metrics[0].block_index == index {
                result.push(metric_card(&group.metrics[0], true));
                replaced = true;
            }
        }
        if !replaced {
            result.push(node);
        }
    }
    *children = result;
}

fn metric_grid(group: &MetricGroup) -> Node {
    let mut grid = Element::new("div").class("metrics-grid");
    for metric in &group.metrics {
        grid = grid.child(metric_card(metric, false));
    }
    Node::element(grid)
}

fn metric_card(metric: &KeyMetric, vertical: bool) -> Node {
    let card = Element::new("div").class(if vertical {
        "metric-card metric-card-vertical"
    } else {
        "metric-card"
    });
    Node::element(
        card.child(Node::element(
            Element::new("div").class("metric-value").text(metric.value.clone()),
        ))
        .child(Node::element(
            Element::new("div")
                .class("metric-description")
                .text(metric.description.clone()),
        )),
    )
}

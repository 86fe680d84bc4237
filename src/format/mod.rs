pub mod badges;
pub mod charts;
pub mod extract;
pub mod markdown;
pub mod metrics;
pub mod tables;

use crate::html::{Fragment, Node};
use crate::models::{Directive, DirectiveKind};
use std::collections::HashMap;

/// A message after the formatting pipeline: an explicit fragment tree,
/// serialized on demand.
#[derive(Debug, Clone)]
pub struct FormattedMessage {
    pub fragment: Fragment,
}

impl FormattedMessage {
    pub fn to_html(&self) -> String {
        self.fragment.to_html()
    }
}

/// The message-content formatting pipeline. Each pass is a pure transform
/// over the fragment tree; the order is fixed: extraction, markdown render,
/// materialization, table styling, metric detection, badges, cleanup.
#[derive(Debug, Clone, Default)]
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn format(&self, raw: &str) -> FormattedMessage {
        let extraction = extract::extract_directives(raw);
        let mut fragment = markdown::render_markdown(&extraction.text);

        let resolved = materialize(&mut fragment, &extraction.directives);
        if resolved < extraction.directives.len() {
            tracing::warn!(
                expected = extraction.directives.len(),
                resolved,
                "some directives were not materialized; cleanup will scrub them"
            );
        }
        charts::attach_charts(&mut fragment);

        tables::style_markdown_tables(&mut fragment);
        metrics::apply_metrics(&mut fragment);
        badges::apply_badges(&mut fragment);
        badges::cleanup(&mut fragment);

        FormattedMessage { fragment }
    }

    /// User-side messages skip directive and metric handling; they are
    /// rendered as plain markdown.
    pub fn format_plain(&self, raw: &str) -> FormattedMessage {
        FormattedMessage {
            fragment: markdown::render_markdown(raw),
        }
    }
}

/// Replaces each placeholder token with its concrete chart/table fragment.
/// Each directive is consumed at most once; tokens without a side-band
/// payload are left for the cleanup pass.
pub fn materialize(fragment: &mut Fragment, directives: &[Directive]) -> usize {
    let mut pending: HashMap<String, &Directive> = directives
        .iter()
        .map(|directive| (directive.token.clone(), directive))
        .collect();
    let mut resolved = 0usize;
    splice_children(&mut fragment.children, &mut pending, &mut resolved);
    resolved
}

fn splice_children(
    children: &mut Vec<Node>,
    pending: &mut HashMap<String, &Directive>,
    resolved: &mut usize,
) {
    let mut result: Vec<Node> = Vec::with_capacity(children.len());
    for mut node in children.drain(..) {
        match &mut node {
            Node::Element(element) => {
                splice_children(&mut element.children, pending, resolved);
                // A paragraph reduced to a single materialized fragment is
                // unwrapped so block components don't sit inside <p>.
                if element.tag == "p" {
                    if let Some(only) = lone_component(&element.children) {
                        result.push(element.children.remove(only));
                        continue;
                    }
                }
                result.push(node);
            }
            Node::Text(text) => {
                if extract::TOKEN_RE.is_match(text) {
                    splice_text(text.as_str(), pending, resolved, &mut result);
                } else {
                    result.push(node);
                }
            }
        }
    }
    *children = result;
}

fn splice_text(
    text: &str,
    pending: &mut HashMap<String, &Directive>,
    resolved: &mut usize,
    result: &mut Vec<Node>,
) {
    let mut cursor = 0usize;
    for found in extract::TOKEN_RE.find_iter(text) {
        if found.start() > cursor {
            result.push(Node::text(&text[cursor..found.start()]));
        }
        match pending.remove(found.as_str()) {
            Some(directive) => {
                result.push(directive_node(directive));
                *resolved += 1;
            }
            None => result.push(Node::text(found.as_str())),
        }
        cursor = found.end();
    }
    if cursor < text.len() {
        result.push(Node::text(&text[cursor..]));
    }
}

fn directive_node(directive: &Directive) -> Node {
    match directive.kind {
        DirectiveKind::Table => tables::table_node(&tables::normalize_table(&directive.payload)),
        kind => match charts::normalize_chart(kind, &directive.payload) {
            Ok(spec) => charts::chart_node(&spec),
            Err(error) => {
                tracing::warn!(kind = kind.as_str(), %error, "chart construction failed");
                charts::chart_error_node(kind)
            }
        },
    }
}

fn lone_component(children: &[Node]) -> Option<usize> {
    let mut component: Option<usize> = None;
    for (index, child) in children.iter().enumerate() {
        match child {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Element(element)
                if element.has_class("chart-container")
                    || element.has_class("table-block")
                    || element.has_class("chart-error") =>
            {
                if component.is_some() {
                    return None;
                }
                component = Some(index);
            }
            _ => return None,
        }
    }
    component
}

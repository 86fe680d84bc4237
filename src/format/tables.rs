use crate::html::{Element, Fragment, Node};
use crate::models::TableSpec;
use serde_json::Value;

pub const CELL_FILLER: &str = "—";
pub const NO_DATA_LABEL: &str = "Aucune donnée";

const TITLE_MAX_CHARS: usize = 150;
const BOLD_TITLE_MAX_CHARS: usize = 100;
const CAPTION_KEYWORDS: [&str; 5] = ["Tableau", "tableau", "récapitulatif", "comparatif", "synthèse"];

/// Resolves a table payload of unknown shape into headers and rows.
/// Fallback order: explicit `headers`/`rows`, `data` as array-of-arrays
/// (first row promoted to headers), `data` as array-of-objects (keys of the
/// first object become headers).
pub fn normalize_table(payload: &Value) -> TableSpec {
    let title = payload
        .get("title")
        .and_then(|value| value.as_str())
        .map(ToString::to_string);

    let mut headers: Vec<String> = payload
        .get("headers")
        .and_then(|value| value.as_array())
        .map(|array| array.iter().map(cell_text).collect())
        .unwrap_or_default();

    let mut rows: Vec<Vec<String>> = payload
        .get("rows")
        .and_then(|value| value.as_array())
        .map(|array| array.iter().map(row_cells).collect())
        .unwrap_or_default();

    if headers.is_empty() && rows.is_empty() {
        if let Some(data) = payload.get("data").and_then(|value| value.as_array()) {
            if data.iter().all(|entry| entry.is_array()) && !data.is_empty() {
                let mut iter = data.iter();
                headers = iter.next().map(row_cells).unwrap_or_default();
                rows = iter.map(row_cells).collect();
            } else if data.iter().all(|entry| entry.is_object()) && !data.is_empty() {
                let keys: Vec<String> = data[0]
                    .as_object()
                    .map(|object| object.keys().cloned().collect())
                    .unwrap_or_default();
                rows = data
                    .iter()
                    .map(|entry| {
                        keys.iter()
                            .map(|key| entry.get(key).map(cell_text).unwrap_or_else(|| CELL_FILLER.to_string()))
                            .collect()
                    })
                    .collect();
                headers = keys;
            }
        }
    }

    for (index, header) in headers.iter_mut().enumerate() {
        if header.trim().is_empty() {
            *header = format!("Colonne {}", index + 1);
        }
    }

    // Short rows are right-padded to the header count; long rows keep their
    // extra cells.
    for row in &mut rows {
        while row.len() < headers.len() {
            row.push(CELL_FILLER.to_string());
        }
    }

    TableSpec { title, headers, rows }
}

fn row_cells(row: &Value) -> Vec<String> {
    row.as_array()
        .map(|cells| cells.iter().map(cell_text).collect())
        .unwrap_or_else(|| vec![cell_text(row)])
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => CELL_FILLER.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// Builds the directive table fragment: a titled container around a plain
/// table, matching what the markdown post-styling pass produces.
pub fn table_node(spec: &TableSpec) -> Node {
    let mut block = Element::new("div").class("table-block");
    if let Some(title) = &spec.title {
        block = block.child(Node::element(
            Element::new("div").class("table-title").text(title.clone()),
        ));
    }

    let mut table = Element::new("table");
    if !spec.headers.is_empty() {
        let mut row = Element::new("tr");
        for header in &spec.headers {
            row = row.child(Node::element(Element::new("th").text(header.clone())));
        }
        table = table.child(Node::element(Element::new("thead").child(Node::element(row))));
    }

    let mut body = Element::new("tbody");
    if spec.rows.is_empty() && spec.headers.is_empty() {
        body = body.child(Node::element(Element::new("tr").child(Node::element(
            Element::new("td").class("table-no-data").text(NO_DATA_LABEL),
        ))));
    } else {
        for cells in &spec.rows {
            let mut row = Element::new("tr");
            for cell in cells {
                row = row.child(Node::element(Element::new("td").text(cell.clone())));
            }
            body = body.child(Node::element(row));
        }
    }
    table = table.child(Node::element(body));

    Node::element(block.child(Node::element(table)))
}

/// Wraps bare `<table>` blocks from the markdown renderer into titled
/// containers. A table already inside a container is never re-wrapped; at
/// most one title is inferred per table.
pub fn style_markdown_tables(fragment: &mut Fragment) {
    let mut result: Vec<Node> = Vec::with_capacity(fragment.children.len());
    for node in fragment.children.drain(..) {
        if !node.is_tag("table") {
            result.push(node);
            continue;
        }

        let mut title: Option<String> = None;
        if let Some(prev) = result.last() {
            match infer_title(prev) {
                TitleMatch::TakeBlock(text) => {
                    title = Some(text);
                    result.pop();
                }
                TitleMatch::BoldRun(text) => title = Some(text),
                TitleMatch::None => {}
            }
        }

        let mut block = Element::new("div").class("table-block");
        if let Some(text) = title {
            block = block.child(Node::element(
                Element::new("div").class("table-title").text(text),
            ));
        }
        result.push(Node::element(block.child(node)));
    }
    fragment.children = result;
}

enum TitleMatch {
    /// The preceding block is the title and leaves the flow.
    TakeBlock(String),
    /// A bold run inside the preceding block is the title; the block stays.
    BoldRun(String),
    None,
}

fn infer_title(prev: &Node) -> TitleMatch {
    let Some(element) = prev.as_element() else {
        return TitleMatch::None;
    };
    if !matches!(element.tag.as_str(), "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
        return TitleMatch::None;
    }

    let text = element.text_content().trim().to_string();
    if text.is_empty() {
        return TitleMatch::None;
    }

    let short = text.chars().count() < TITLE_MAX_CHARS;
    let has_keyword = CAPTION_KEYWORDS.iter().any(|keyword| text.contains(keyword));
    let terminal = text.ends_with('.') || text.ends_with('!') || text.ends_with('?');
    if short && (has_keyword || !terminal) {
        return TitleMatch::TakeBlock(text);
    }

    if let Some(bold) = first_strong_text(element) {
        if !bold.is_empty() && bold.chars().count() < BOLD_TITLE_MAX_CHARS {
            return TitleMatch::BoldRun(bold);
        }
    }
    TitleMatch::None
}

fn first_strong_text(element: &Element) -> Option<String> {
    for child in &element.children {
        if let Node::Element(inner) = child {
            if inner.tag == "strong" {
                return Some(inner.text_content().trim().to_string());
            }
            if let Some(found) = first_strong_text(inner) {
                return Some(found);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{normalize_table, style_markdown_tables, table_node, CELL_FILLER, NO_DATA_LABEL};
    use crate::format::markdown::render_markdown;
    use crate::html::Fragment;
    use serde_json::json;

    #[test]
    fn short_rows_are_padded_to_header_count() {
        let payload = json!({
            "type": "table",
            "headers": ["A", "B", "C", "D"],
            "rows": [["1", "2"]]
        });
        let spec = normalize_table(&payload);
        assert_eq!(spec.rows[0], vec!["1", "2", CELL_FILLER, CELL_FILLER]);
    }

    #[test]
    fn long_rows_keep_their_extra_cells() {
        let payload = json!({
            "type": "table",
            "headers": ["A"],
            "rows": [["1", "2", "3"]]
        });
        let spec = normalize_table(&payload);
        assert_eq!(spec.rows[0].len(), 3);
    }

    #[test]
    fn array_of_arrays_promotes_first_row_to_headers() {
        let payload = json!({
            "type": "table",
            "data": [["Segment", "Part"], ["PME", "40%"]]
        });
        let spec = normalize_table(&payload);
        assert_eq!(spec.headers, vec!["Segment", "Part"]);
        assert_eq!(spec.rows, vec![vec!["PME", "40%"]]);
    }

    #[test]
    fn array_of_objects_round_trips_with_explicit_headers() {
        let from_objects = normalize_table(&json!({
            "type": "table",
            "data": [
                {"Segment": "PME", "Part": "40%"},
                {"Segment": "ETI", "Part": "25%"}
            ]
        }));
        let explicit = normalize_table(&json!({
            "type": "table",
            "headers": ["Segment", "Part"],
            "rows": [["PME", "40%"], ["ETI", "25%"]]
        }));
        let mut a = Fragment::new();
        a.push(table_node(&from_objects));
        let mut b = Fragment::new();
        b.push(table_node(&explicit));
        assert_eq!(a.to_html(), b.to_html());
    }

    #[test]
    fn empty_payload_renders_no_data_row() {
        let spec = normalize_table(&json!({"type": "table"}));
        let mut fragment = Fragment::new();
        fragment.push(table_node(&spec));
        assert!(fragment.to_html().contains(NO_DATA_LABEL));
    }

    #[test]
    fn blank_headers_get_filler_labels_and_null_cells_get_dashes() {
        let payload = json!({
            "type": "table",
            "headers": ["", "Valeur"],
            "rows": [[null, 12]]
        });
        let spec = normalize_table(&payload);
        assert_eq!(spec.headers, vec!["Colonne 1", "Valeur"]);
        assert_eq!(spec.rows[0], vec![CELL_FILLER, "12"]);
    }

    #[test]
    fn caption_keyword_block_becomes_title_and_leaves_flow() {
        let mut fragment =
            render_markdown("Tableau récapitulatif des segments.\n\n| A | B |\n|---|---|\n| 1 | 2 |\n");
        style_markdown_tables(&mut fragment);
        let html = fragment.to_html();
        assert!(html.contains("table-title"));
        assert!(html.contains("Tableau récapitulatif des segments."));
        // the paragraph itself is consumed
        assert!(!html.contains("<p>Tableau"));
    }

    #[test]
    fn bold_run_is_used_as_title_without_removing_the_block() {
        let mut fragment = render_markdown(
            "Les chiffres ci-dessous proviennent de **Répartition 2024** et restent indicatifs, comme détaillé précédemment dans la longue note méthodologique de cette étude de marché sectorielle française.\n\n| A |\n|---|\n| 1 |\n",
        );
        style_markdown_tables(&mut fragment);
        let html = fragment.to_html();
        assert!(html.contains("<div class=\"table-title\">Répartition 2024</div>"));
        assert!(html.contains("<p>"));
    }

    #[test]
    fn styled_table_is_not_rewrapped() {
        let mut fragment = render_markdown("| A |\n|---|\n| 1 |\n");
        style_markdown_tables(&mut fragment);
        let once = fragment.to_html();
        style_markdown_tables(&mut fragment);
        assert_eq!(fragment.to_html(), once);
    }
}

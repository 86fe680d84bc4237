use crate::errors::{AppError, AppResult};
use crate::html::{Element, Fragment, Node};
use crate::models::{ChartSpec, Dataset, DirectiveKind, SeriesValue};
use serde_json::Value;

/// Fixed palette cycled by index for bar/pie series.
pub const PALETTE: [&str; 12] = [
    "#1f4e9c", "#0f8b8d", "#f2a104", "#d1495b", "#6a4c93", "#2e933c", "#e76f51", "#3d5a80",
    "#c44536", "#7b8a8b", "#9b5de5", "#00b4d8",
];

/// Line and scatter series keep one solid color instead of a cycled palette.
pub const SOLID_COLOR: &str = "#1f4e9c";

/// Resolves a chart payload of unknown shape into the one normalized form.
/// The resolution orders are a tolerance layer for inconsistent upstream
/// JSON; changing them changes which field wins for ambiguous payloads.
pub fn normalize_chart(kind: DirectiveKind, payload: &Value) -> AppResult<ChartSpec> {
    let title = payload
        .get("title")
        .and_then(|value| value.as_str())
        .map(ToString::to_string);

    if kind == DirectiveKind::Scatter {
        if let Some(points) = resolve_points(payload) {
            let labels = resolve_labels(payload, points.len());
            return Ok(ChartSpec {
                chart_type: kind,
                title,
                labels,
                datasets: vec![Dataset {
                    label: dataset_label(payload, 0),
                    values: points,
                    colors: vec![SOLID_COLOR.to_string()],
                }],
            });
        }
    }

    let datasets = if let Some(entries) = payload.get("datasets").and_then(|value| value.as_array())
    {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let values = entry
                    .get("values")
                    .or_else(|| entry.get("data"))
                    .and_then(|value| value.as_array())
                    .map(|array| numbers_from(array))
                    .unwrap_or_default();
                Dataset {
                    label: entry
                        .get("label")
                        .or_else(|| entry.get("name"))
                        .and_then(|value| value.as_str())
                        .map(ToString::to_string)
                        .unwrap_or_else(|| format!("Série {}", index + 1)),
                    colors: series_colors(kind, index, values.len()),
                    values,
                }
            })
            .collect::<Vec<_>>()
    } else {
        let values = resolve_values(payload).ok_or_else(|| {
            AppError::Chart(format!("no resolvable series for {} chart", kind.as_str()))
        })?;
        vec![Dataset {
            label: dataset_label(payload, 0),
            colors: series_colors(kind, 0, values.len()),
            values,
        }]
    };

    if datasets.iter().all(|dataset| dataset.values.is_empty()) {
        return Err(AppError::Chart(format!(
            "empty series for {} chart",
            kind.as_str()
        )));
    }

    let label_count = datasets
        .iter()
        .map(|dataset| dataset.values.len())
        .max()
        .unwrap_or(0);
    let labels = resolve_labels(payload, label_count);

    Ok(ChartSpec {
        chart_type: kind,
        title,
        labels,
        datasets,
    })
}

/// Label resolution order: `labels`, `data.labels`, array-of-objects
/// `name`/`label` fields, else synthesized `Item N`.
fn resolve_labels(payload: &Value, count: usize) -> Vec<String> {
    if let Some(labels) = payload.get("labels").and_then(|value| value.as_array()) {
        return strings_from(labels);
    }
    if let Some(labels) = payload
        .get("data")
        .and_then(|data| data.get("labels"))
        .and_then(|value| value.as_array())
    {
        return strings_from(labels);
    }
    if let Some(rows) = payload.get("data").and_then(|value| value.as_array()) {
        let named: Vec<String> = rows
            .iter()
            .filter_map(|row| {
                row.get("name")
                    .or_else(|| row.get("label"))
                    .and_then(|value| value.as_str())
                    .map(ToString::to_string)
            })
            .collect();
        if named.len() == rows.len() && !named.is_empty() {
            return named;
        }
    }
    (1..=count).map(|index| format!("Item {}", index)).collect()
}

/// Value resolution order: `data.values`, plain `data` array (unwrapping
/// `.value` objects), `data.data`, top-level `values`.
fn resolve_values(payload: &Value) -> Option<Vec<SeriesValue>> {
    if let Some(values) = payload
        .get("data")
        .and_then(|data| data.get("values"))
        .and_then(|value| value.as_array())
    {
        return Some(numbers_from(values));
    }
    if let Some(entries) = payload.get("data").and_then(|value| value.as_array()) {
        return Some(numbers_from(entries));
    }
    if let Some(values) = payload
        .get("data")
        .and_then(|data| data.get("data"))
        .and_then(|value| value.as_array())
    {
        return Some(numbers_from(values));
    }
    if let Some(values) = payload.get("values").and_then(|value| value.as_array()) {
        return Some(numbers_from(values));
    }
    None
}

/// Scatter payloads carry `{x,y}` pairs in `data.points` or directly in
/// `data`; they bypass the generic series resolution.
fn resolve_points(payload: &Value) -> Option<Vec<SeriesValue>> {
    let candidates = payload
        .get("data")
        .and_then(|data| data.get("points"))
        .and_then(|value| value.as_array())
        .or_else(|| payload.get("data").and_then(|value| value.as_array()))?;
    let points: Vec<SeriesValue> = candidates
        .iter()
        .filter_map(|entry| {
            let x = entry.get("x").and_then(coerce_number)?;
            let y = entry.get("y").and_then(coerce_number)?;
            Some(SeriesValue::Point { x, y })
        })
        .collect();
    if points.len() == candidates.len() && !points.is_empty() {
        Some(points)
    } else {
        None
    }
}

fn numbers_from(entries: &[Value]) -> Vec<SeriesValue> {
    entries
        .iter()
        .map(|entry| {
            let number = coerce_number(entry)
                .or_else(|| entry.get("value").and_then(coerce_number))
                .unwrap_or(0.0);
            SeriesValue::Number(number)
        })
        .collect()
}

fn strings_from(entries: &[Value]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| match entry {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect()
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn dataset_label(payload: &Value, index: usize) -> String {
    payload
        .get("title")
        .and_then(|value| value.as_str())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Série {}", index + 1))
}

fn series_colors(kind: DirectiveKind, dataset_index: usize, value_count: usize) -> Vec<String> {
    match kind {
        DirectiveKind::Line | DirectiveKind::Scatter => vec![SOLID_COLOR.to_string()],
        _ if value_count == 0 => Vec::new(),
        _ => (0..value_count)
            .map(|index| PALETTE[(dataset_index + index) % PALETTE.len()].to_string())
            .collect(),
    }
}

/// Builds the placeholder's replacement: a container carrying the normalized
/// config for the charting collaborator. The chart is attached (marked
/// rendered) by `attach_charts`, which the controller may re-run on a delay.
pub fn chart_node(spec: &ChartSpec) -> Node {
    let config = serde_json::to_string(spec).unwrap_or_default();
    let mut container = Element::new("figure")
        .class("chart-container")
        .attr("data-chart-type", spec.chart_type.as_str())
        .attr("data-chart-config", config);
    if let Some(title) = &spec.title {
        container = container.child(Node::element(
            Element::new("figcaption")
                .class("chart-title")
                .text(title.clone()),
        ));
    }
    container = container.child(Node::element(Element::new("canvas").class("chart-canvas")));
    Node::element(container)
}

/// Inline error fragment naming the declared type; never aborts the message.
pub fn chart_error_node(kind: DirectiveKind) -> Node {
    Node::element(
        Element::new("div")
            .class("chart-error")
            .text(format!("Impossible d'afficher le graphique ({})", kind.as_str())),
    )
}

/// Marks unattached chart containers as rendered. Attachment is idempotent
/// per node: a container already marked is never re-attached, so the delayed
/// retry passes are safe.
pub fn attach_charts(fragment: &mut Fragment) -> usize {
    let mut attached = 0usize;
    for node in &mut fragment.children {
        attach_in_node(node, &mut attached);
    }
    attached
}

fn attach_in_node(node: &mut Node, attached: &mut usize) {
    let Some(element) = node.as_element_mut() else {
        return;
    };
    if element.has_class("chart-container") {
        if element.get_attr("data-chart-rendered").is_none() {
            element.set_attr("data-chart-rendered", "true");
            *attached += 1;
        }
        return;
    }
    for child in &mut element.children {
        attach_in_node(child, attached);
    }
}

#[cfg(test)]
mod tests {
    use super::{attach_charts, chart_node, normalize_chart, PALETTE, SOLID_COLOR};
    use crate::html::Fragment;
    use crate::models::{DirectiveKind, SeriesValue};
    use serde_json::json;

    #[test]
    fn plain_data_array_synthesizes_item_labels_and_cycled_colors() {
        let spec = normalize_chart(DirectiveKind::Pie, &json!({"type":"pie","data":[1,2,3]}))
            .expect("normalized");
        assert_eq!(spec.labels, vec!["Item 1", "Item 2", "Item 3"]);
        assert_eq!(spec.datasets.len(), 1);
        assert_eq!(
            spec.datasets[0].colors,
            vec![PALETTE[0], PALETTE[1], PALETTE[2]]
        );
    }

    #[test]
    fn explicit_labels_win_over_data_labels() {
        let payload = json!({
            "type": "bar",
            "labels": ["A", "B"],
            "data": {"labels": ["X", "Y"], "values": [1, 2]}
        });
        let spec = normalize_chart(DirectiveKind::Bar, &payload).expect("normalized");
        assert_eq!(spec.labels, vec!["A", "B"]);
    }

    #[test]
    fn array_of_objects_resolves_names_and_values() {
        let payload = json!({
            "type": "bar",
            "data": [
                {"name": "PME", "value": 120},
                {"name": "ETI", "value": 45}
            ]
        });
        let spec = normalize_chart(DirectiveKind::Bar, &payload).expect("normalized");
        assert_eq!(spec.labels, vec!["PME", "ETI"]);
        assert_eq!(
            spec.datasets[0].values,
            vec![SeriesValue::Number(120.0), SeriesValue::Number(45.0)]
        );
    }

    #[test]
    fn nested_data_data_and_top_level_values_are_fallbacks() {
        let nested = json!({"type":"line","data":{"data":[3, 4]}});
        let spec = normalize_chart(DirectiveKind::Line, &nested).expect("normalized");
        assert_eq!(spec.datasets[0].values.len(), 2);

        let top = json!({"type":"line","values":[7, 8, 9]});
        let spec = normalize_chart(DirectiveKind::Line, &top).expect("normalized");
        assert_eq!(spec.datasets[0].values.len(), 3);
        assert_eq!(spec.datasets[0].colors, vec![SOLID_COLOR]);
    }

    #[test]
    fn scatter_points_bypass_generic_resolution() {
        let payload = json!({
            "type": "scatter",
            "data": {"points": [{"x": 1, "y": 2}, {"x": 3, "y": 4}]}
        });
        let spec = normalize_chart(DirectiveKind::Scatter, &payload).expect("normalized");
        assert_eq!(
            spec.datasets[0].values,
            vec![
                SeriesValue::Point { x: 1.0, y: 2.0 },
                SeriesValue::Point { x: 3.0, y: 4.0 }
            ]
        );
        assert_eq!(spec.datasets[0].colors, vec![SOLID_COLOR]);
    }

    #[test]
    fn scatter_accepts_bare_xy_array() {
        let payload = json!({"type":"scatter","data":[{"x":0,"y":1}]});
        let spec = normalize_chart(DirectiveKind::Scatter, &payload).expect("normalized");
        assert_eq!(spec.datasets[0].values.len(), 1);
    }

    #[test]
    fn explicit_datasets_yield_one_series_each() {
        let payload = json!({
            "type": "bar",
            "labels": ["2023", "2024"],
            "datasets": [
                {"label": "CA", "data": [10, 12]},
                {"label": "Marge", "values": [2, 3]}
            ]
        });
        let spec = normalize_chart(DirectiveKind::Bar, &payload).expect("normalized");
        assert_eq!(spec.datasets.len(), 2);
        assert_eq!(spec.datasets[0].label, "CA");
        assert_eq!(spec.datasets[1].label, "Marge");
    }

    #[test]
    fn unresolvable_payload_is_an_error() {
        let payload = json!({"type":"bar","title":"vide"});
        assert!(normalize_chart(DirectiveKind::Bar, &payload).is_err());
    }

    #[test]
    fn attach_is_idempotent_per_container() {
        let spec = normalize_chart(DirectiveKind::Pie, &json!({"type":"pie","data":[1]}))
            .expect("normalized");
        let mut fragment = Fragment::new();
        fragment.push(chart_node(&spec));
        assert_eq!(attach_charts(&mut fragment), 1);
        assert_eq!(attach_charts(&mut fragment), 0);
    }
}

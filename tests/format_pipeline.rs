use advisor_chat::format::charts::{attach_charts, PALETTE};
use advisor_chat::format::extract::extract_directives;
use advisor_chat::format::{materialize, MessageFormatter};
use advisor_chat::models::DirectiveKind;

#[test]
fn extraction_counts_valid_and_invalid_directives_exactly() {
    let text = concat!(
        "Deux graphiques valides et deux spans invalides.\n\n",
        "```json\n{\"type\":\"bar\",\"labels\":[\"A\",\"B\"],\"data\":[1,2]}\n```\n\n",
        "Texte intermédiaire {\"type\":\"pie\",\"data\":[5,5]} encore du texte.\n\n",
        "Invalide : {\"type\":\"pie\", pas du json}\n\n",
        "```json\n{\"type\":\"radar\",\"data\":[1]}\n```\n"
    );
    let extraction = extract_directives(text);
    assert_eq!(extraction.directives.len(), 2);
    assert_eq!(
        extraction
            .directives
            .iter()
            .filter(|d| d.kind == DirectiveKind::Bar)
            .count(),
        1
    );
    assert!(extraction.text.contains("pas du json"));
    assert!(extraction.text.contains("radar"));
}

#[test]
fn full_pipeline_produces_charts_tables_and_no_residue() {
    let formatter = MessageFormatter::new();
    let text = concat!(
        "## Analyse\n\n",
        "Le secteur est en croissance.\n\n",
        "```json\n{\"type\":\"bar\",\"title\":\"CA par segment\",\"labels\":[\"PME\",\"ETI\"],\"data\":[120,45]}\n```\n\n",
        "{\"type\":\"table\",\"title\":\"Répartition\",\"headers\":[\"Segment\",\"Part\"],\"rows\":[[\"PME\",\"55%\"]]}\n\n",
        "Source : [🟢 INTERNE]\n"
    );
    let html = formatter.format(text).to_html();

    assert!(html.contains("data-chart-type=\"bar\""));
    assert!(html.contains("data-chart-rendered=\"true\""));
    assert!(html.contains("CA par segment"));
    assert!(html.contains("<div class=\"table-title\">Répartition</div>"));
    assert!(html.contains("Source interne"));
    assert!(!html.contains("@@directive:"));
    assert!(!html.contains("\"type\""));
}

#[test]
fn pie_directive_synthesizes_labels_and_cycled_colors() {
    let formatter = MessageFormatter::new();
    let html = formatter
        .format("```json\n{\"type\":\"pie\",\"data\":[1,2,3]}\n```")
        .to_html();
    assert!(html.contains("Item 1"));
    assert!(html.contains("Item 2"));
    assert!(html.contains("Item 3"));
    for color in PALETTE.iter().take(3) {
        assert!(html.contains(color));
    }
    assert!(!html.contains(PALETTE[3]));
}

#[test]
fn table_shapes_round_trip_to_identical_html() {
    let formatter = MessageFormatter::new();
    let from_objects = formatter
        .format("{\"type\":\"table\",\"data\":[{\"Segment\":\"PME\",\"Part\":\"40%\"},{\"Segment\":\"ETI\",\"Part\":\"25%\"}]}")
        .to_html();
    let explicit = formatter
        .format("{\"type\":\"table\",\"headers\":[\"Segment\",\"Part\"],\"rows\":[[\"PME\",\"40%\"],[\"ETI\",\"25%\"]]}")
        .to_html();
    assert_eq!(from_objects, explicit);
}

#[test]
fn short_rows_render_padded_cells() {
    let formatter = MessageFormatter::new();
    let html = formatter
        .format("{\"type\":\"table\",\"headers\":[\"A\",\"B\",\"C\",\"D\"],\"rows\":[[\"1\",\"2\"]]}")
        .to_html();
    assert_eq!(html.matches("<td>").count(), 4);
    assert_eq!(html.matches("<td>—</td>").count(), 2);
}

#[test]
fn materializer_never_attaches_a_chart_twice() {
    let extraction = extract_directives("```json\n{\"type\":\"line\",\"data\":{\"values\":[1,2,3]}}\n```");
    let mut fragment =
        advisor_chat::format::markdown::render_markdown(&extraction.text);
    let resolved = materialize(&mut fragment, &extraction.directives);
    assert_eq!(resolved, 1);

    assert_eq!(attach_charts(&mut fragment), 1);
    assert_eq!(attach_charts(&mut fragment), 0);
    let html = fragment.to_html();
    assert_eq!(html.matches("data-chart-rendered").count(), 1);
}

#[test]
fn bold_metric_becomes_a_card_with_exact_value_and_description() {
    let formatter = MessageFormatter::new();
    let html = formatter
        .format("Revenue is **81 000** entreprises actives.")
        .to_html();
    assert!(html.contains("<div class=\"metric-value\">81 000</div>"));
    assert!(html.contains("<div class=\"metric-description\">entreprises actives.</div>"));
}

#[test]
fn badges_replace_tags_case_insensitively() {
    let formatter = MessageFormatter::new();
    let html = formatter
        .format("Chiffre validé [🟢 interne] et estimé [🟡 ESTIMATION].")
        .to_html();
    assert!(html.contains("<span class=\"badge badge-interne\">Source interne</span>"));
    assert!(html.contains("<span class=\"badge badge-estimation\">Estimation</span>"));
    assert!(!html.contains("[🟢"));
}

#[test]
fn directive_residue_in_rendered_html_is_scrubbed() {
    use advisor_chat::format::badges::cleanup;
    use advisor_chat::format::markdown::render_markdown;

    // A directive block that somehow escaped extraction must not be shown
    // as raw text.
    let mut fragment = render_markdown("Avant.\n\n    {\"type\":\"pie\",\"data\":[9]}\n\nAprès.");
    cleanup(&mut fragment);
    let html = fragment.to_html();
    assert!(!html.contains("pie"));
    assert!(html.contains("Avant."));
    assert!(html.contains("Après."));
}

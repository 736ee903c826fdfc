use ocr_overlay_rust::ocr::{
    BBoxPx, GapClustering, LineDetection, ParagraphAssembler, ParagraphSet, assemble,
};

fn line(text: &str, y: u32) -> LineDetection {
    LineDetection::from_bbox(text, BBoxPx { x: 12, y, w: 260, h: 16 }, 0.9)
}

fn settings_panel() -> Vec<LineDetection> {
    vec![
        line("Security testing with artificial", 10),
        line("intelligence is faster than ever.", 32),
        line("Teams adopt it quickly.", 54),
        line("Options:", 110),
        line("Enable logging", 132),
        line("Rotate files daily", 154),
        line("Details (click to expand)", 176),
    ]
}

#[test]
fn settings_panel_snapshot() {
    let paragraphs = assemble(&settings_panel(), 0.5);
    insta::assert_json_snapshot!("settings_panel", paragraphs);
}

#[test]
fn large_gap_splits_paragraphs() {
    let lines = vec![
        line("Hello", 10),
        line("world.", 32),
        line("New topic here.", 90),
    ];
    let paragraphs = assemble(&lines, 0.5);
    assert_eq!(paragraphs.paragraphs(), ["Hello world.", "New topic here."]);
    assert_eq!(paragraphs.join(), "Hello world.\n\nNew topic here.");
}

#[test]
fn colon_label_splits_despite_small_gap() {
    let lines = vec![line("Settings:", 10), line("Enable logging", 28)];
    let paragraphs = assemble(&lines, 0.5);
    assert_eq!(paragraphs.paragraphs(), ["Settings:", "Enable logging"]);
}

#[test]
fn line_after_colon_always_starts_a_paragraph() {
    let heads = ["Settings:", "Note that:", "Supported formats：", "and then:"];
    let follows = ["and more", "lowercase start", "Enable logging", "1. first", "the rest"];
    for head in heads {
        for follow in follows {
            let paragraphs = assemble(&[line(head, 10), line(follow, 26)], 0.5);
            assert_eq!(
                paragraphs.paragraphs().last().map(String::as_str),
                Some(follow),
                "{:?} -> {:?}",
                head,
                follow
            );
            assert_eq!(paragraphs.len(), 2);
        }
    }
}

#[test]
fn input_order_does_not_matter() {
    let sorted = settings_panel();
    let expected = assemble(&sorted, 0.5);

    let mut reversed = sorted.clone();
    reversed.reverse();
    assert_eq!(assemble(&reversed, 0.5), expected);

    let mut rotated = sorted.clone();
    rotated.rotate_left(3);
    assert_eq!(assemble(&rotated, 0.5), expected);

    let interleaved = sorted
        .iter()
        .step_by(2)
        .chain(sorted.iter().skip(1).step_by(2))
        .cloned()
        .collect::<Vec<_>>();
    assert_eq!(assemble(&interleaved, 0.5), expected);
}

#[test]
fn low_confidence_lines_yield_nothing() {
    let lines = settings_panel()
        .into_iter()
        .map(|mut line| {
            line.confidence = 0.3;
            line
        })
        .collect::<Vec<_>>();
    assert!(assemble(&lines, 0.5).is_empty());
    assert!(assemble(&lines, 0.3).is_empty());
    assert!(assemble(&[], 0.5).is_empty());
}

#[test]
fn single_line_is_one_paragraph() {
    let paragraphs = assemble(&[line("Just   one line", 40)], 0.5);
    assert_eq!(paragraphs, ParagraphSet::new(["Just one line"]));
}

#[test]
fn median_clustering_agrees_on_clear_layouts() {
    let assembler = ParagraphAssembler::new().with_clustering(GapClustering::Median);
    let lines = vec![
        line("Hello", 10),
        line("world.", 32),
        line("New topic here.", 90),
    ];
    assert_eq!(assembler.assemble(&lines, 0.5), assemble(&lines, 0.5));
}

//! Integration tests for the page-forge pipeline.
//!
//! These tests validate:
//! - Parsing always yields one consistent tree
//! - The cascade honours specificity, inheritance and relative sizes
//! - Line breaking and hyphenation place words where expected
//! - Relayout is byte-identical to a fresh load at the same width

use sha2::{Digest, Sha256};

use page_forge::css::parse_stylesheet;
use page_forge::dom::{Dom, NodeId};
use page_forge::fonts::FontManager;
use page_forge::html::parse_html;
use page_forge::paint::{self, PaintCommand};
use page_forge::pipeline::{Page, PipelineConfig};
use page_forge::style::style_tree;

// =====================================================================
// Helper
// =====================================================================

fn load(markup: &str, sheets: &[&str]) -> Page {
    Page::load(markup, sheets, PipelineConfig::default(), FontManager::default())
}

fn load_at(markup: &str, sheets: &[&str], width: f32) -> Page {
    let config = PipelineConfig {
        viewport_width: width,
        ..PipelineConfig::default()
    };
    Page::load(markup, sheets, config, FontManager::default())
}

/// (text, x, y, color) of every text command, in paint order.
fn words(page: &Page) -> Vec<(String, f32, f32, String)> {
    page.display_list()
        .iter()
        .filter_map(|c| match c {
            PaintCommand::DrawText {
                x, y, text, color, ..
            } => Some((text.clone(), *x, *y, color.clone())),
            _ => None,
        })
        .collect()
}

fn digest(commands: &[PaintCommand]) -> String {
    let json = paint::to_json(commands).unwrap();
    format!("{:x}", Sha256::digest(json.as_bytes()))
}

fn assert_consistent(dom: &Dom) {
    let root = dom.root();
    assert_eq!(dom.parent(root), None);
    let reachable = dom.descendants(root);
    assert_eq!(reachable.len(), dom.len(), "unreachable nodes");
    for &id in &reachable {
        for &child in dom.children(id) {
            assert_eq!(dom.parent(child), Some(id));
        }
    }
    let mut sorted: Vec<NodeId> = reachable.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), reachable.len(), "node reached twice");
}

// =====================================================================
// Parsing
// =====================================================================

#[test]
fn soup_always_parses_to_one_tree() {
    for markup in [
        "",
        "plain text",
        "</p></div></html>",
        "<p><b>unclosed <i>nesting",
        "<!doctype html><html><head><title>x</title></head><body><p>ok</p></body></html>",
        "<div><p>one<p>two</div>three",
        "<!-- a > b --><p>after</p>",
        "<script>if (a < b) { x(); }</script><p>y</p>",
        "<br/><img src=x><hr>",
        "a &amp b &lt; c &#65; &bogus;",
    ] {
        let dom = parse_html(markup);
        assert_consistent(&dom);
        assert_eq!(dom.tag(dom.root()), Some("html"), "{markup:?}");
    }
}

#[test]
fn stray_close_tags_are_ignored() {
    let dom = parse_html("</span></div><p>kept</p>");
    let p = dom.elements_by_tag(dom.root(), "p");
    assert_eq!(p.len(), 1);
    assert_eq!(dom.text_content(p[0]), "kept");
}

// =====================================================================
// Cascade
// =====================================================================

#[test]
fn class_beats_tag_in_either_order() {
    let markup = r#"<p class="x">t</p>"#;
    for sheet in ["p { color: red } .x { color: blue }", ".x { color: blue } p { color: red }"] {
        let page = load(markup, &[sheet]);
        assert_eq!(words(&page)[0].3, "blue", "{sheet}");
    }
}

#[test]
fn id_beats_class_and_descendant_sums() {
    let page = load(
        r#"<div class="box"><p id="main" class="x">t</p></div>"#,
        &["#main { color: green } .x { color: blue } div p { color: red }"],
    );
    assert_eq!(words(&page)[0].3, "green");

    // .box p (11) beats .x (10)
    let page = load(
        r#"<div class="box"><p class="x">t</p></div>"#,
        &[".box p { color: purple } .x { color: blue }"],
    );
    assert_eq!(words(&page)[0].3, "purple");
}

#[test]
fn relative_font_sizes_resolve_against_parent() {
    let page = load(
        r#"<div><p class="a">a</p><p class="b">b</p></div>"#,
        &["div { font-size: 20px } .a { font-size: 50% } .b { font-size: 2em }"],
    );
    let dom = page.dom();
    let ps = dom.elements_by_tag(dom.root(), "p");
    assert_eq!(dom.style_value(ps[0], "font-size"), Some("10px"));
    assert_eq!(dom.style_value(ps[1], "font-size"), Some("40px"));

    let sizes: Vec<f32> = page
        .display_list()
        .iter()
        .filter_map(|c| match c {
            PaintCommand::DrawText { font, .. } => Some(font.size),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![10.0, 40.0]);
}

#[test]
fn cascade_twice_is_identical() {
    let mut dom = parse_html(r#"<div class="a"><p style="color: red">x <b>y</b></p></div>"#);
    let rules = parse_stylesheet(".a { font-size: 150% } b { font-weight: bold } div p { color: blue }");
    style_tree(&mut dom, &rules);
    let first: Vec<_> = dom.descendants(dom.root()).iter().map(|&n| dom.style(n).clone()).collect();
    style_tree(&mut dom, &rules);
    let second: Vec<_> = dom.descendants(dom.root()).iter().map(|&n| dom.style(n).clone()).collect();
    assert_eq!(first, second);
}

#[test]
fn broken_rules_do_not_spoil_the_sheet() {
    let page = load(
        "<p>a</p><div>b</div>",
        &["p { color: red; } ??? { nonsense } div { color: blue }"],
    );
    let colors: Vec<String> = words(&page).into_iter().map(|w| w.3).collect();
    assert_eq!(colors, vec!["red", "blue"]);
}

// =====================================================================
// Layout
// =====================================================================

#[test]
fn paragraphs_are_separated_by_a_gap() {
    let page = load("<p>A</p><p>B</p>", &[]);
    let w = words(&page);
    let gap = PipelineConfig::default().layout.paragraph_gap;
    assert!(w[1].2 - w[0].2 >= gap, "{} vs {}", w[0].2, w[1].2);
}

#[test]
fn second_word_wraps_to_left_margin() {
    // 60 px of text width; each word plus a space takes 40.
    let page = load_at("<p>aaaa bbbb</p>", &[], 86.0);
    let w = words(&page);
    assert_eq!(w[0].1, 13.0);
    assert_eq!(w[1].1, 13.0);
    assert!(w[1].2 > w[0].2);
}

#[test]
fn soft_hyphen_breaks_with_visible_hyphen() {
    let page = load_at("<p>xxxxxx abc&shy;defgh</p>", &[], 126.0);
    let w = words(&page);
    let texts: Vec<&str> = w.iter().map(|w| w.0.as_str()).collect();
    assert_eq!(texts, vec!["xxxxxx", "abc-", "defgh"]);
    assert!(w[1].0.ends_with('-'));
    assert_eq!(w[2].1, 13.0);
    assert!(w[2].2 > w[1].2);
}

#[test]
fn backgrounds_paint_before_content() {
    let page = load("<div><p>x</p></div>", &["div { background-color: silver }"]);
    let list = page.display_list();
    assert!(matches!(&list[0], PaintCommand::FillRect { color, .. } if color == "silver"));
    assert!(matches!(&list[1], PaintCommand::DrawText { .. }));
}

#[test]
fn preformatted_text_keeps_spacing() {
    let page = load("<pre>fn main() {\n    go();\n}</pre>", &[]);
    let texts: Vec<String> = words(&page).into_iter().map(|w| w.0).collect();
    assert_eq!(texts, vec!["fn main() {", "    go();", "}"]);
    // The user-agent sheet gives <pre> a gray background.
    assert!(matches!(&page.display_list()[0], PaintCommand::FillRect { color, .. } if color == "gray"));
}

// =====================================================================
// Relayout / hit testing
// =====================================================================

#[test]
fn relayout_matches_fresh_load() {
    let markup = r#"<h1 class="title">Title</h1><p>Some <b>bold</b> and <i>italic</i> words
        that wrap over several lines at narrow widths, plus super&shy;cali&shy;fragilistic.</p>
        <ul><li>one</li><li>two</li></ul><pre>  keep   this</pre>"#;
    let sheets = ["p { color: #333 } li { font-size: 90% }"];

    let mut page = load_at(markup, &sheets, 800.0);
    let (commands, height) = page.relayout(240.0);
    let resized = digest(commands);

    let fresh = load_at(markup, &sheets, 240.0);
    assert_eq!(resized, digest(fresh.display_list()));
    assert_eq!(height, fresh.content_height());

    // And back again.
    let (commands, _) = page.relayout(800.0);
    assert_eq!(digest(commands), digest(load_at(markup, &sheets, 800.0).display_list()));
}

#[test]
fn click_on_link_reports_href() {
    let page = load(r#"<p>go <a href="/next">there</a> now</p>"#, &[]);
    let (_, x, y, _) = words(&page).into_iter().find(|w| w.0 == "there").unwrap();
    assert_eq!(page.link_at(x + 2.0, y + 2.0), Some("/next"));

    let (_, x, y, _) = words(&page).into_iter().find(|w| w.0 == "now").unwrap();
    assert_eq!(page.link_at(x + 2.0, y + 2.0), None);
    assert!(page.hit_test(x + 2.0, y + 2.0).is_some());
    assert_eq!(page.hit_test(-1.0, -1.0), None);
}

#[test]
fn paint_list_json_roundtrip() {
    let page = load("<p>hello \u{1F600}</p>", &[]);
    let json = paint::to_json(page.display_list()).unwrap();
    assert!(json.contains("draw_glyph"));
    assert_eq!(paint::from_json(&json).unwrap(), page.display_list());
}

//! Pipeline – ties together parsing, styling, layout and painting.
//!
//! A [`Page`] is the result of a document load. It owns the styled tree,
//! the rules that produced it and the font cache, so a viewport resize only
//! re-runs layout and painting.

use serde::{Deserialize, Serialize};

use crate::css::{parse_stylesheet, sort_by_priority, StyleRule};
use crate::dom::{Dom, ElementData, NodeData, NodeId};
use crate::error::Result;
use crate::fonts::FontManager;
use crate::html::parse_html;
use crate::layout::{DocumentLayout, LayoutBox, LayoutConfig};
use crate::paint::{paint_tree, PaintCommand};
use crate::style::{style_tree, USER_AGENT_STYLESHEET};

/// Configuration for loading and laying out a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Width used by the first layout (default: 800).
    pub viewport_width: f32,
    /// Apply the built-in stylesheet before author sheets (default: true).
    pub user_agent_styles: bool,
    pub layout: LayoutConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            viewport_width: 800.0,
            user_agent_styles: true,
            layout: LayoutConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Deserialise from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Loads documents and stylesheets on behalf of [`Page::load_from`].
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<String>;

    /// Turn `relative` into something [`Fetcher::fetch`] accepts.
    fn resolve(&self, base: &str, relative: &str) -> String {
        resolve_url(base, relative)
    }
}

/// Resolve a reference against a base URL or file path.
///
/// Absolute URLs and `data:` URLs pass through; `//host/x` takes the base's
/// scheme; `/x` replaces the base path; anything else is joined with the
/// base's directory, consuming leading `../` and `./`.
pub fn resolve_url(base: &str, relative: &str) -> String {
    if relative.contains("://") || relative.starts_with("data:") {
        return relative.to_string();
    }
    let (scheme, rest) = match base.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("", base),
    };
    let prefix = if scheme.is_empty() {
        String::new()
    } else {
        format!("{scheme}://")
    };
    if let Some(network) = relative.strip_prefix("//") {
        return format!("{prefix}{network}");
    }

    // Split "host/path" for URLs; plain file paths have no authority.
    let (authority, path) = if scheme.is_empty() {
        ("", rest)
    } else {
        match rest.find('/') {
            Some(i) => rest.split_at(i),
            None => (rest, "/"),
        }
    };
    if relative.starts_with('/') {
        return format!("{prefix}{authority}{relative}");
    }

    let mut dir = path.rsplit_once('/').map_or("", |(d, _)| d);
    let mut relative = relative;
    loop {
        if let Some(r) = relative.strip_prefix("./") {
            relative = r;
        } else if let Some(r) = relative.strip_prefix("../") {
            relative = r;
            dir = dir.rsplit_once('/').map_or("", |(d, _)| d);
        } else {
            break;
        }
    }
    if scheme.is_empty() && dir.is_empty() && !path.starts_with('/') {
        relative.to_string()
    } else {
        format!("{prefix}{authority}{dir}/{relative}")
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A loaded, styled and laid-out document.
pub struct Page {
    dom: Dom,
    rules: Vec<StyleRule>,
    fonts: FontManager,
    config: PipelineConfig,
    viewport_width: f32,
    layout: LayoutBox,
    display_list: Vec<PaintCommand>,
}

impl Page {
    /// Parse `markup`, cascade the stylesheets in order over it and lay it
    /// out at the configured viewport width.
    pub fn load<S: AsRef<str>>(
        markup: &str,
        stylesheets: &[S],
        config: PipelineConfig,
        fonts: FontManager,
    ) -> Self {
        Self::from_dom(parse_html(markup), stylesheets, config, fonts)
    }

    /// Fetch a document and every stylesheet it references, then load it.
    ///
    /// `<link rel="stylesheet">` targets and `<style>` contents are applied
    /// in document order. A stylesheet that cannot be fetched is skipped.
    pub fn load_from(
        fetcher: &dyn Fetcher,
        url: &str,
        config: PipelineConfig,
        fonts: FontManager,
    ) -> Result<Self> {
        let markup = fetcher.fetch(url)?;
        let dom = parse_html(&markup);

        let mut sheets = Vec::new();
        for node in dom.descendants(dom.root()) {
            let Some(element) = dom.element(node) else {
                continue;
            };
            match element.tag.as_str() {
                "link" if is_stylesheet_link(element) => {
                    let Some(href) = element.attr("href") else {
                        continue;
                    };
                    let target = fetcher.resolve(url, href);
                    match fetcher.fetch(&target) {
                        Ok(css) => sheets.push(css),
                        Err(e) => log::warn!("skipping stylesheet {target}: {e}"),
                    }
                }
                "style" => sheets.push(dom.text_content(node)),
                _ => {}
            }
        }
        log::debug!("{url}: {} stylesheet(s)", sheets.len());
        Ok(Self::from_dom(dom, &sheets, config, fonts))
    }

    /// Show `markup` itself as preformatted text, without styling it.
    pub fn view_source(markup: &str, config: PipelineConfig, fonts: FontManager) -> Self {
        let mut dom = Dom::new();
        let html = dom.alloc(NodeData::Element(ElementData::new("html")), None);
        let mut parent = html;
        for tag in ["body", "pre"] {
            let child = dom.alloc(NodeData::Element(ElementData::new(tag)), Some(parent));
            dom.append_child(parent, child);
            parent = child;
        }
        let text = dom.alloc(NodeData::Text(markup.to_string()), Some(parent));
        dom.append_child(parent, text);

        let config = PipelineConfig {
            user_agent_styles: false,
            ..config
        };
        Self::from_dom(dom, &[] as &[&str], config, fonts)
    }

    fn from_dom<S: AsRef<str>>(
        mut dom: Dom,
        stylesheets: &[S],
        config: PipelineConfig,
        mut fonts: FontManager,
    ) -> Self {
        fonts.ensure_default();

        let mut rules = Vec::new();
        if config.user_agent_styles {
            rules.extend(parse_stylesheet(USER_AGENT_STYLESHEET));
        }
        for sheet in stylesheets {
            rules.extend(parse_stylesheet(sheet.as_ref()));
        }
        sort_by_priority(&mut rules);
        style_tree(&mut dom, &rules);

        let viewport_width = config.viewport_width;
        let (layout, display_list) = lay_out(&dom, &fonts, &config.layout, viewport_width);
        Self {
            dom,
            rules,
            fonts,
            config,
            viewport_width,
            layout,
            display_list,
        }
    }

    /// Append an author stylesheet after the existing ones and restyle.
    pub fn add_stylesheet(&mut self, source: &str) {
        self.rules.extend(parse_stylesheet(source));
        sort_by_priority(&mut self.rules);
        style_tree(&mut self.dom, &self.rules);
        self.relayout(self.viewport_width);
    }

    /// Lay the existing styled tree out again at a new width.
    pub fn relayout(&mut self, viewport_width: f32) -> (&[PaintCommand], f32) {
        self.viewport_width = viewport_width;
        let (layout, display_list) = lay_out(&self.dom, &self.fonts, &self.config.layout, viewport_width);
        self.layout = layout;
        self.display_list = display_list;
        (self.display_list.as_slice(), self.content_height())
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    /// Rules in cascade order.
    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn layout_tree(&self) -> &LayoutBox {
        &self.layout
    }

    pub fn display_list(&self) -> &[PaintCommand] {
        &self.display_list
    }

    /// Height of the document including its top and bottom margins.
    pub fn content_height(&self) -> f32 {
        self.layout.height
    }

    pub fn viewport_width(&self) -> f32 {
        self.viewport_width
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The deepest node whose box contains the point.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<NodeId> {
        self.layout.hit_test(x, y)
    }

    /// The `href` of the link under the point, if any.
    pub fn link_at(&self, x: f32, y: f32) -> Option<&str> {
        let hit = self.hit_test(x, y)?;
        std::iter::once(hit)
            .chain(self.dom.ancestors(hit))
            .filter_map(|n| self.dom.element(n))
            .find(|e| e.tag == "a")
            .and_then(|a| a.attr("href"))
    }
}

fn is_stylesheet_link(element: &ElementData) -> bool {
    element
        .attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
}

fn lay_out(
    dom: &Dom,
    fonts: &FontManager,
    config: &LayoutConfig,
    viewport_width: f32,
) -> (LayoutBox, Vec<PaintCommand>) {
    let layout = DocumentLayout::new(dom, fonts, config).layout(viewport_width);
    let display_list = paint_tree(&layout, dom, config);
    (layout, display_list)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::Error;

    struct MapFetcher(HashMap<&'static str, &'static str>);

    impl Fetcher for MapFetcher {
        fn fetch(&self, url: &str) -> Result<String> {
            self.0.get(url).map(|s| s.to_string()).ok_or_else(|| Error::Fetch {
                url: url.to_string(),
                reason: "not found".to_string(),
            })
        }
    }

    fn texts(page: &Page) -> Vec<(String, String)> {
        page.display_list()
            .iter()
            .filter_map(|c| match c {
                PaintCommand::DrawText { text, color, .. } => Some((text.clone(), color.clone())),
                _ => None,
            })
            .collect()
    }

    fn load(markup: &str, sheets: &[&str]) -> Page {
        Page::load(markup, sheets, PipelineConfig::default(), FontManager::default())
    }

    #[test]
    fn load_produces_paint_list() {
        let page = load("<p>Hello world</p>", &[]);
        let words: Vec<String> = texts(&page).into_iter().map(|(t, _)| t).collect();
        assert_eq!(words, vec!["Hello", "world"]);
        assert!(page.content_height() > 36.0);
        assert_eq!(page.viewport_width(), 800.0);
    }

    #[test]
    fn user_agent_sheet_colors_links() {
        let page = load(r#"<a href="/x">go</a>"#, &[]);
        assert_eq!(texts(&page)[0].1, "blue");

        let plain = Page::load(
            r#"<a href="/x">go</a>"#,
            &[] as &[&str],
            PipelineConfig {
                user_agent_styles: false,
                ..PipelineConfig::default()
            },
            FontManager::default(),
        );
        assert_eq!(texts(&plain)[0].1, "black");
    }

    #[test]
    fn author_rules_override_user_agent_rules() {
        let page = load(r#"<a href="/x">go</a>"#, &["a { color: green }"]);
        assert_eq!(texts(&page)[0].1, "green");
    }

    #[test]
    fn relayout_rewraps() {
        let mut page = load("<p>one two three four</p>", &[]);
        let wide_height = page.content_height();
        let (_, narrow_height) = page.relayout(60.0);
        assert!(narrow_height > wide_height);
        assert_eq!(page.viewport_width(), 60.0);
    }

    #[test]
    fn link_at_finds_enclosing_anchor() {
        let page = load(r#"<p>see <a href="next.html"><b>here</b></a></p>"#, &[]);
        let (x, y) = page
            .display_list()
            .iter()
            .find_map(|c| match c {
                PaintCommand::DrawText { x, y, text, .. } if text == "here" => Some((*x, *y)),
                _ => None,
            })
            .unwrap();
        assert_eq!(page.link_at(x + 1.0, y + 1.0), Some("next.html"));
        assert_eq!(page.link_at(15.0, y + 1.0), None);
    }

    #[test]
    fn view_source_shows_markup() {
        let page = Page::view_source(
            "<p>hi</p>\n<b>x</b>",
            PipelineConfig::default(),
            FontManager::default(),
        );
        let lines: Vec<String> = texts(&page).into_iter().map(|(t, _)| t).collect();
        assert_eq!(lines, vec!["<p>hi</p>", "<b>x</b>"]);
        assert!(page.rules().is_empty());
    }

    #[test]
    fn load_from_collects_stylesheets() {
        let fetcher = MapFetcher(HashMap::from([
            (
                "http://site/dir/index.html",
                r#"<link rel="stylesheet" href="main.css"><link rel="stylesheet" href="/missing.css">
                   <style>p { color: red }</style><p>hi</p>"#,
            ),
            ("http://site/dir/main.css", "p { color: blue } b { color: teal }"),
        ]));
        let page = Page::load_from(
            &fetcher,
            "http://site/dir/index.html",
            PipelineConfig::default(),
            FontManager::default(),
        )
        .unwrap();
        // The inline sheet comes later, so it wins the tie.
        assert_eq!(texts(&page)[0], ("hi".to_string(), "red".to_string()));
        assert!(page.rules().iter().any(|r| r.selector.to_string() == "b"));
    }

    #[test]
    fn load_from_fails_without_document() {
        let fetcher = MapFetcher(HashMap::new());
        let result = Page::load_from(&fetcher, "nope", PipelineConfig::default(), FontManager::default());
        assert!(matches!(result, Err(Error::Fetch { .. })));
    }

    #[test]
    fn add_stylesheet_restyles() {
        let mut page = load("<p>hi</p>", &[]);
        page.add_stylesheet("p { color: olive }");
        assert_eq!(texts(&page)[0].1, "olive");
    }

    #[test]
    fn config_from_partial_json() {
        let config = PipelineConfig::from_json(r#"{"viewport_width": 400, "layout": {"h_step": 5}}"#).unwrap();
        assert_eq!(config.viewport_width, 400.0);
        assert!(config.user_agent_styles);
        assert_eq!(config.layout.h_step, 5.0);
        assert_eq!(config.layout.v_step, 18.0);
        assert_eq!(PipelineConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
        assert!(matches!(PipelineConfig::from_json(r#"{"viewport_width": "wide"}"#), Err(Error::Config(_))));
    }

    #[test]
    fn url_resolution() {
        assert_eq!(resolve_url("http://a.com/x/y.html", "z.css"), "http://a.com/x/z.css");
        assert_eq!(resolve_url("http://a.com/x/y.html", "../z.css"), "http://a.com/z.css");
        assert_eq!(resolve_url("http://a.com/x/y.html", "/r.css"), "http://a.com/r.css");
        assert_eq!(resolve_url("https://a.com/x", "//b.com/s.css"), "https://b.com/s.css");
        assert_eq!(resolve_url("http://a.com", "s.css"), "http://a.com/s.css");
        assert_eq!(resolve_url("/tmp/site/index.html", "./s.css"), "/tmp/site/s.css");
        assert_eq!(resolve_url("index.html", "s.css"), "s.css");
        assert_eq!(resolve_url("http://a.com/", "data:text/css,p{}"), "data:text/css,p{}");
    }
}

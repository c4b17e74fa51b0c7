//! Layout engine – walks the styled tree and builds a geometry tree of
//! document → block → line → text-run boxes with absolute positions.
//!
//! Blocks stack vertically: each one starts at its previous sibling's bottom
//! edge. A block whose children are all inline lays its content out into
//! lines with a word-by-word line breaker that understands soft hyphens and
//! the formatting tags in [`crate::inline`]. Layout is a single pass and is
//! rebuilt from scratch on every call.

use serde::{Deserialize, Serialize};

use crate::dom::{Dom, NodeData, NodeId};
use crate::fonts::{is_single_pictograph, FontManager, FontSpec, FontStyle, FontWeight};
use crate::html::HEAD_TAGS;
use crate::inline::{close_tag, open_tag, InlineState, LineAction, TagContext, Transition};
use crate::style::{font_size_px, parse_dimension, Dimension};

/// Discretionary break point, drawn as `-` only when a line breaks there.
pub const SOFT_HYPHEN: char = '\u{00AD}';

/// Tags that force their parent into block layout.
pub const BLOCK_ELEMENTS: &[&str] = &[
    "html", "body", "article", "section", "nav", "aside", "h1", "h2", "h3", "h4", "h5", "h6",
    "hgroup", "header", "footer", "address", "p", "hr", "pre", "blockquote", "ol", "ul", "menu",
    "li", "dl", "dt", "dd", "figure", "figcaption", "main", "div", "table", "form", "legend",
    "fieldset", "details", "summary",
];

/// Layout constants. Every field has a default, so a partial JSON object is
/// a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Left/right page margin in px.
    pub h_step: f32,
    /// Top/bottom page margin in px.
    pub v_step: f32,
    /// Multiplier applied to ascent and descent when stacking lines.
    pub line_spacing: f32,
    /// Extra space after a closing `</p>`.
    pub paragraph_gap: f32,
    /// Indent of list item content.
    pub list_indent: f32,
    /// Side of the square list bullet.
    pub bullet_size: f32,
    /// Size decrease inside `<small>`.
    pub small_delta: f32,
    /// Size increase inside `<big>`.
    pub big_delta: f32,
    /// Size factor inside `<h1>`.
    pub heading_scale: f32,
    /// Size factor inside `<sup>`.
    pub superscript_scale: f32,
    /// Class that centers an `<h1>`.
    pub center_class: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            h_step: 13.0,
            v_step: 18.0,
            line_spacing: 1.25,
            paragraph_gap: 18.0,
            list_indent: 20.0,
            bullet_size: 4.0,
            small_delta: 2.0,
            big_delta: 4.0,
            heading_scale: 1.5,
            superscript_scale: 0.5,
            center_class: "title".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Block,
    Inline,
}

/// A word (or preformatted line) placed on a line.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub font: FontSpec,
    pub color: String,
    /// Drawn as a glyph image because the font cannot render it.
    pub pictograph: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxKind {
    Document,
    Block {
        mode: LayoutMode,
        /// Index of the previous sibling in the parent's `children`.
        previous: Option<usize>,
    },
    /// One line of an inline-mode block; `node` is the block's node.
    Line,
    TextRun(TextRun),
}

/// A positioned box. Coordinates are absolute page pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutBox {
    pub kind: BoxKind,
    pub node: NodeId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub children: Vec<LayoutBox>,
}

impl LayoutBox {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Deepest box containing the point, reported as its source node.
    pub fn hit_test(&self, x: f32, y: f32) -> Option<NodeId> {
        if !self.contains(x, y) {
            return None;
        }
        // Later children paint on top.
        self.children
            .iter()
            .rev()
            .find_map(|c| c.hit_test(x, y))
            .or(Some(self.node))
    }

    /// This box and all descendants in pre-order.
    pub fn flatten(&self) -> Vec<&LayoutBox> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(b) = stack.pop() {
            out.push(b);
            stack.extend(b.children.iter().rev());
        }
        out
    }

    pub fn text_run(&self) -> Option<&TextRun> {
        match &self.kind {
            BoxKind::TextRun(run) => Some(run),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mode decision
// ---------------------------------------------------------------------------

/// Elements that produce no boxes.
fn is_hidden(dom: &Dom, node: NodeId) -> bool {
    match dom.tag(node) {
        Some(tag) => tag == "head" || HEAD_TAGS.contains(&tag),
        None => false,
    }
}

/// Block if any child element is block-level, inline if there are only
/// inline children, block (and empty) when there are none. Text is inline.
pub fn layout_mode(dom: &Dom, node: NodeId) -> LayoutMode {
    match &dom.node(node).data {
        NodeData::Text(_) => LayoutMode::Inline,
        NodeData::Element(_) => {
            let children = dom.children(node);
            if children
                .iter()
                .any(|&c| dom.tag(c).is_some_and(|t| BLOCK_ELEMENTS.contains(&t)))
            {
                LayoutMode::Block
            } else if !children.is_empty() {
                LayoutMode::Inline
            } else {
                LayoutMode::Block
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Block layout
// ---------------------------------------------------------------------------

/// Content area handed from a block to its children.
#[derive(Debug, Clone, Copy)]
struct Frame {
    x: f32,
    y: f32,
    width: f32,
}

/// Lays out a styled tree with a given font registry and config.
pub struct DocumentLayout<'a> {
    dom: &'a Dom,
    fonts: &'a FontManager,
    config: &'a LayoutConfig,
}

impl<'a> DocumentLayout<'a> {
    pub fn new(dom: &'a Dom, fonts: &'a FontManager, config: &'a LayoutConfig) -> Self {
        Self { dom, fonts, config }
    }

    /// Build the geometry tree for a viewport width.
    pub fn layout(&self, viewport_width: f32) -> LayoutBox {
        let root = self.dom.root();
        let frame = Frame {
            x: self.config.h_step,
            y: self.config.v_step,
            width: (viewport_width - 2.0 * self.config.h_step).max(0.0),
        };
        let child = self.layout_block(root, frame, None);
        log::debug!(
            "laid out document at width {viewport_width}: {} px tall",
            child.height
        );
        LayoutBox {
            kind: BoxKind::Document,
            node: root,
            x: 0.0,
            y: 0.0,
            width: viewport_width.max(0.0),
            height: child.height + 2.0 * self.config.v_step,
            children: vec![child],
        }
    }

    fn layout_block(
        &self,
        node: NodeId,
        parent: Frame,
        previous: Option<(usize, &LayoutBox)>,
    ) -> LayoutBox {
        let x = parent.x;
        let y = previous.map_or(parent.y, |(_, p)| p.y + p.height);
        let width = self
            .dimension(node, "width")
            .resolve(parent.width)
            .unwrap_or(parent.width)
            .max(0.0);

        let indent = if self.dom.tag(node) == Some("li") {
            self.config.list_indent.min(width)
        } else {
            0.0
        };
        let content = Frame {
            x: x + indent,
            y,
            width: width - indent,
        };

        let mode = layout_mode(self.dom, node);
        let (children, natural_height) = match mode {
            LayoutMode::Block => {
                let children = self.layout_children(node, content);
                let height = children.iter().map(|c| c.height).sum();
                (children, height)
            }
            LayoutMode::Inline => {
                let mut lines = LineBuilder::new(self, node, content);
                lines.recurse(node);
                lines.finish()
            }
        };

        let height = match self.dimension(node, "height") {
            Dimension::Px(h) => h.max(0.0),
            // No containing height to resolve a percentage against.
            Dimension::Percent(_) | Dimension::Auto => natural_height,
        };

        LayoutBox {
            kind: BoxKind::Block {
                mode,
                previous: previous.map(|(i, _)| i),
            },
            node,
            x,
            y,
            width,
            height,
            children,
        }
    }

    fn layout_children(&self, node: NodeId, frame: Frame) -> Vec<LayoutBox> {
        let mut children: Vec<LayoutBox> = Vec::new();
        for &child in self.dom.children(node) {
            if is_hidden(self.dom, child) {
                continue;
            }
            let previous = children.last().map(|p| (children.len() - 1, p));
            let laid_out = self.layout_block(child, frame, previous);
            children.push(laid_out);
        }
        children
    }

    fn dimension(&self, node: NodeId, property: &str) -> Dimension {
        self.dom
            .style_value(node, property)
            .map(parse_dimension)
            .unwrap_or(Dimension::Auto)
    }

    /// The font a text node's words use under the given inline state.
    fn font_for(&self, node: NodeId, state: &InlineState) -> FontSpec {
        let dom = self.dom;
        let style = move |p: &str| -> &'a str { dom.style_value(node, p).unwrap_or_default() };
        let family = if state.is_preformatted() {
            self.fonts.resolve_family("monospace")
        } else {
            self.fonts.resolve_family(style("font-family"))
        };
        FontSpec {
            family,
            size: state.scaled_size(font_size_px(self.dom, node)),
            weight: if state.bold {
                FontWeight::Bold
            } else {
                FontWeight::from_css(style("font-weight"))
            },
            style: if state.italic {
                FontStyle::Italic
            } else {
                FontStyle::from_css(style("font-style"))
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Inline layout
// ---------------------------------------------------------------------------

/// A word waiting for its line to be flushed. `x` is relative to the line.
#[derive(Debug, Clone)]
struct PendingWord {
    x: f32,
    width: f32,
    node: NodeId,
    run: TextRun,
    centered: bool,
    superscript: bool,
}

struct LineBuilder<'l, 'a> {
    engine: &'l DocumentLayout<'a>,
    block: NodeId,
    frame: Frame,
    cursor_x: f32,
    cursor_y: f32,
    state: InlineState,
    pending: Vec<PendingWord>,
    lines: Vec<LayoutBox>,
}

impl<'l, 'a> LineBuilder<'l, 'a> {
    fn new(engine: &'l DocumentLayout<'a>, block: NodeId, frame: Frame) -> Self {
        Self {
            engine,
            block,
            frame,
            cursor_x: 0.0,
            cursor_y: frame.y,
            state: InlineState::default(),
            pending: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Flush the last line; returns the lines and the height consumed.
    fn finish(mut self) -> (Vec<LayoutBox>, f32) {
        self.flush();
        let height = self.cursor_y - self.frame.y;
        (self.lines, height)
    }

    fn recurse(&mut self, node: NodeId) {
        let dom = self.engine.dom;
        match &dom.node(node).data {
            NodeData::Text(text) => self.text(node, text),
            NodeData::Element(element) => {
                if node != self.block && is_hidden(dom, node) {
                    return;
                }
                let ctx = TagContext {
                    element,
                    config: self.engine.config,
                };
                self.apply(open_tag(self.state, &ctx));
                for &child in dom.children(node) {
                    self.recurse(child);
                }
                self.apply(close_tag(self.state, &ctx));
            }
        }
    }

    fn apply(&mut self, transition: Transition) {
        self.state = transition.state;
        match transition.action {
            LineAction::None => {}
            LineAction::Break => self.flush(),
            LineAction::BreakWithGap => {
                self.flush();
                self.cursor_y += self.engine.config.paragraph_gap;
            }
        }
    }

    fn text(&mut self, node: NodeId, text: &str) {
        if self.state.is_preformatted() {
            self.preformatted(node, text);
            return;
        }
        // Non-breaking spaces stay inside their word.
        for word in text
            .split(|c: char| c.is_whitespace() && c != '\u{00A0}')
            .filter(|w| !w.is_empty())
        {
            if word.contains(SOFT_HYPHEN) {
                self.hyphenated(node, word);
            } else {
                self.word(node, word);
            }
        }
    }

    /// Literal whitespace; every newline ends a line and lines never wrap.
    fn preformatted(&mut self, node: NodeId, text: &str) {
        let font = self.engine.font_for(node, &self.state);
        for (i, line) in text.split('\n').enumerate() {
            if i > 0 {
                self.newline(&font);
            }
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                let width = self.engine.fonts.measure(line, &font);
                self.push(node, line.to_string(), font.clone(), width, 0.0);
            }
        }
    }

    /// End the line; an empty line still advances by one line height.
    fn newline(&mut self, font: &FontSpec) {
        if self.pending.is_empty() {
            let m = self.engine.fonts.metrics(font);
            self.cursor_y += self.engine.config.line_spacing * (m.ascent + m.descent);
        } else {
            self.flush();
        }
    }

    fn word(&mut self, node: NodeId, word: &str) {
        let font = self.engine.font_for(node, &self.state);
        let width = self.engine.fonts.measure(word, &font);
        let space = self.engine.fonts.measure(" ", &font);
        if self.cursor_x + width + space > self.frame.width {
            self.flush();
        }
        self.push(node, word.to_string(), font, width, space);
    }

    /// Place a word containing soft hyphens, breaking at the last hyphen
    /// position that still fits.
    fn hyphenated(&mut self, node: NodeId, word: &str) {
        let font = self.engine.font_for(node, &self.state);
        let fonts = self.engine.fonts;
        let segments: Vec<&str> = word.split(SOFT_HYPHEN).filter(|s| !s.is_empty()).collect();
        let space = fonts.measure(" ", &font);
        let hyphen = fonts.measure("-", &font);

        let mut start = 0;
        while start < segments.len() {
            let rest = segments[start..].concat();
            let rest_width = fonts.measure(&rest, &font);
            if self.cursor_x + rest_width + space <= self.frame.width {
                self.push(node, rest, font, rest_width, space);
                return;
            }

            // Longest prefix that fits with a hyphen, leaving at least one
            // segment for the next line.
            let mut prefix = String::new();
            let mut prefix_width = 0.0;
            let mut fitted = 0;
            for segment in &segments[start..segments.len() - 1] {
                let candidate = format!("{prefix}{segment}");
                let w = fonts.measure(&candidate, &font);
                if self.cursor_x + w + hyphen > self.frame.width {
                    break;
                }
                prefix = candidate;
                prefix_width = w;
                fitted += 1;
            }

            if fitted == 0 {
                if !self.pending.is_empty() {
                    self.flush();
                    continue;
                }
                if start == segments.len() - 1 {
                    // A lone segment wider than the line overflows.
                    self.push(node, rest, font, rest_width, space);
                    return;
                }
                prefix = segments[start].to_string();
                prefix_width = fonts.measure(&prefix, &font);
                fitted = 1;
            }

            self.push(node, format!("{prefix}-"), font.clone(), prefix_width + hyphen, 0.0);
            self.flush();
            start += fitted;
        }
    }

    /// Append a measured word at the cursor without any fit check.
    fn push(&mut self, node: NodeId, text: String, font: FontSpec, width: f32, advance_extra: f32) {
        let pictograph = is_single_pictograph(&text)
            && text
                .chars()
                .next()
                .is_some_and(|c| !self.engine.fonts.covers(&font, c));
        let color = self
            .engine
            .dom
            .style_value(node, "color")
            .unwrap_or("black")
            .to_string();
        self.pending.push(PendingWord {
            x: self.cursor_x,
            width,
            node,
            run: TextRun {
                text,
                font,
                color,
                pictograph,
            },
            centered: self.state.centered,
            superscript: self.state.is_superscript(),
        });
        self.cursor_x += width + advance_extra;
    }

    /// Position the pending words on a baseline and start a new line.
    fn flush(&mut self) {
        if self.pending.is_empty() {
            self.cursor_x = 0.0;
            return;
        }
        let fonts = self.engine.fonts;
        let spacing = self.engine.config.line_spacing;
        let words = std::mem::take(&mut self.pending);
        let metrics: Vec<_> = words.iter().map(|w| fonts.metrics(&w.run.font)).collect();

        let max_ascent = metrics.iter().map(|m| m.ascent).fold(0.0, f32::max);
        let max_descent = metrics.iter().map(|m| m.descent).fold(0.0, f32::max);
        let baseline = self.cursor_y + spacing * max_ascent;

        let offset = if words.iter().any(|w| w.centered) {
            let used = words.last().map_or(0.0, |w| w.x + w.width);
            ((self.frame.width - used) / 2.0).max(0.0)
        } else {
            0.0
        };

        let runs = words
            .into_iter()
            .zip(metrics)
            .map(|(w, m)| {
                let y = if w.superscript {
                    baseline - m.linespace
                } else {
                    baseline - m.ascent
                };
                LayoutBox {
                    kind: BoxKind::TextRun(w.run),
                    node: w.node,
                    x: self.frame.x + w.x + offset,
                    y,
                    width: w.width,
                    height: m.linespace,
                    children: Vec::new(),
                }
            })
            .collect();

        let line_y = self.cursor_y;
        self.cursor_y = baseline + spacing * max_descent;
        self.cursor_x = 0.0;
        self.lines.push(LayoutBox {
            kind: BoxKind::Line,
            node: self.block,
            x: self.frame.x,
            y: line_y,
            width: self.frame.width,
            height: self.cursor_y - line_y,
            children: runs,
        });
    }
}

//! Cascade resolver – computes every node's style map from inherited
//! defaults, author rules in ascending specificity, and inline `style`
//! attributes, then resolves relative font sizes to pixels.

use crate::css::{parse_declarations, StyleRule};
use crate::dom::{Dom, NodeData, NodeId, StyleMap};

/// Font size used by the root and whenever no absolute size can be found.
pub const DEFAULT_FONT_SIZE_PX: f32 = 16.0;

/// Properties passed from parent to child, with their root values.
pub const INHERITED_PROPERTIES: &[(&str, &str)] = &[
    ("font-family", "sans-serif"),
    ("font-size", "16px"),
    ("font-style", "normal"),
    ("font-weight", "normal"),
    ("color", "black"),
];

/// Built-in defaults parsed ahead of author sheets.
pub const USER_AGENT_STYLESHEET: &str = "
a { color: blue; }
i { font-style: italic; }
em { font-style: italic; }
b { font-weight: bold; }
strong { font-weight: bold; }
pre { background-color: gray; font-family: monospace; }
code { font-family: monospace; }
";

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Recompute the style map of every node under the root, in document order.
///
/// Existing maps are replaced, so running the cascade twice with the same
/// rules yields the same result.
pub fn style_tree(dom: &mut Dom, rules: &[StyleRule]) {
    let mut ordered: Vec<&StyleRule> = rules.iter().collect();
    ordered.sort_by_key(|r| r.selector.priority());

    let root = dom.root();
    for id in dom.descendants(root) {
        let style = resolve_style(dom, id, &ordered);
        dom.node_mut(id).style = style;
    }
}

/// Compute one node's style. The parent must already be styled.
fn resolve_style(dom: &Dom, id: NodeId, rules: &[&StyleRule]) -> StyleMap {
    let parent = dom.parent(id);
    let mut style = StyleMap::new();

    for &(property, default) in INHERITED_PROPERTIES {
        let value = parent
            .and_then(|p| dom.style_value(p, property))
            .unwrap_or(default);
        style.insert(property.to_string(), value.to_string());
    }

    if let NodeData::Element(element) = &dom.node(id).data {
        for rule in rules.iter().filter(|r| r.selector.matches(dom, id)) {
            style.extend(rule.declarations.clone());
        }
        if let Some(inline) = element.inline_style() {
            style.extend(parse_declarations(inline));
        }
    }

    let parent_size = parent
        .and_then(|p| dom.style_value(p, "font-size"))
        .and_then(parse_px)
        .unwrap_or(DEFAULT_FONT_SIZE_PX);
    resolve_font_size(&mut style, parent_size);
    style
}

/// Turn `%`, `em` and `rem` font sizes into pixels; anything unusable falls
/// back to the parent's size.
fn resolve_font_size(style: &mut StyleMap, parent_px: f32) {
    let Some(raw) = style.get("font-size").map(|v| v.trim().to_string()) else {
        return;
    };
    let px = if raw == "0" {
        Some(0.0)
    } else if let Some(pct) = raw.strip_suffix('%') {
        pct.trim().parse::<f32>().ok().map(|p| parent_px * p / 100.0)
    } else if let Some(rem) = raw.strip_suffix("rem") {
        rem.trim().parse::<f32>().ok().map(|r| DEFAULT_FONT_SIZE_PX * r)
    } else if let Some(em) = raw.strip_suffix("em") {
        em.trim().parse::<f32>().ok().map(|e| parent_px * e)
    } else {
        parse_px(&raw)
    };
    let px = match px {
        Some(v) if v.is_finite() && v >= 0.0 => v,
        _ => {
            log::debug!("unusable font-size {raw:?}; inheriting {parent_px}px");
            parent_px
        }
    };
    style.insert("font-size".to_string(), format!("{px}px"));
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

/// A `width`/`height` value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

impl Dimension {
    /// Resolve against the containing size; `None` for `auto`.
    pub fn resolve(self, containing: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Px(v) => Some(v),
            Dimension::Percent(p) => Some(containing * p / 100.0),
        }
    }
}

/// Parse `12px` or a bare number.
pub fn parse_px(s: &str) -> Option<f32> {
    let s = s.trim();
    let s = s.strip_suffix("px").unwrap_or(s);
    s.trim().parse().ok()
}

pub fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(pct) = s.strip_suffix('%') {
        pct.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

/// The node's resolved `font-size` in pixels.
pub fn font_size_px(dom: &Dom, id: NodeId) -> f32 {
    dom.style_value(id, "font-size")
        .and_then(parse_px)
        .unwrap_or(DEFAULT_FONT_SIZE_PX)
}

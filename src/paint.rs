//! Paint commands – the flat, serialisable display list produced from the
//! geometry tree. A renderer only needs these to draw a page.

use serde::{Deserialize, Serialize};

use crate::dom::{Dom, NodeId};
use crate::error::Result;
use crate::fonts::{glyph_id, FontSpec};
use crate::layout::{BoxKind, LayoutBox, LayoutConfig};

/// One drawing operation, in absolute page pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaintCommand {
    FillRect {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        color: String,
    },
    /// `y` is the top of the text.
    DrawText {
        x: f32,
        y: f32,
        text: String,
        font: FontSpec,
        color: String,
    },
    /// A pictograph the font cannot render, drawn from an image keyed by
    /// `glyph_id`.
    DrawGlyph { x: f32, y: f32, glyph_id: String },
}

/// Walk the geometry tree in pre-order and emit its display list.
pub fn paint_tree(root: &LayoutBox, dom: &Dom, config: &LayoutConfig) -> Vec<PaintCommand> {
    let mut out = Vec::new();
    paint_box(root, dom, config, &mut out);
    log::debug!("painted {} commands", out.len());
    out
}

fn paint_box(b: &LayoutBox, dom: &Dom, config: &LayoutConfig, out: &mut Vec<PaintCommand>) {
    match &b.kind {
        BoxKind::Document | BoxKind::Line => {}
        BoxKind::Block { .. } => {
            if let Some(bg) = dom.style_value(b.node, "background-color") {
                if bg != "transparent" && b.width > 0.0 && b.height > 0.0 {
                    out.push(PaintCommand::FillRect {
                        x1: b.x,
                        y1: b.y,
                        x2: b.x + b.width,
                        y2: b.y + b.height,
                        color: bg.to_string(),
                    });
                }
            }
            if is_list_item(dom, b.node) {
                let size = config.bullet_size;
                let x = b.x + ((config.list_indent - size) / 2.0).max(0.0);
                let y = b.y + ((config.v_step - size) / 2.0).max(0.0);
                out.push(PaintCommand::FillRect {
                    x1: x,
                    y1: y,
                    x2: x + size,
                    y2: y + size,
                    color: dom.style_value(b.node, "color").unwrap_or("black").to_string(),
                });
            }
        }
        BoxKind::TextRun(run) => {
            if run.pictograph {
                out.push(PaintCommand::DrawGlyph {
                    x: b.x,
                    y: b.y,
                    glyph_id: glyph_id(&run.text),
                });
            } else {
                out.push(PaintCommand::DrawText {
                    x: b.x,
                    y: b.y,
                    text: run.text.clone(),
                    font: run.font.clone(),
                    color: run.color.clone(),
                });
            }
        }
    }
    for child in &b.children {
        paint_box(child, dom, config, out);
    }
}

/// `<li>` directly under `<ul>` or `<ol>`.
fn is_list_item(dom: &Dom, node: NodeId) -> bool {
    dom.tag(node) == Some("li")
        && dom
            .parent(node)
            .and_then(|p| dom.tag(p))
            .is_some_and(|t| t == "ul" || t == "ol")
}

/// Serialise a display list to pretty JSON.
pub fn to_json(commands: &[PaintCommand]) -> Result<String> {
    Ok(serde_json::to_string_pretty(commands)?)
}

/// Deserialise a display list.
pub fn from_json(json: &str) -> Result<Vec<PaintCommand>> {
    Ok(serde_json::from_str(json)?)
}

//! Inline formatting – the state carried across words of an inline run and
//! the table of tags that change it.
//!
//! Each supported tag maps to an (open, close) pair of pure transitions over
//! [`InlineState`]. A transition may also ask the line breaker to end the
//! current line.

use crate::dom::ElementData;
use crate::layout::LayoutConfig;

/// Formatting modifiers applied on top of a text node's cascaded font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InlineState {
    pub bold: bool,
    pub italic: bool,
    /// Added to the cascaded size after scaling.
    pub size_delta: f32,
    /// Multiplies the cascaded size.
    pub size_scale: f32,
    /// Nesting depth of `<sup>`.
    pub superscript: u32,
    pub centered: bool,
    /// Nesting depth of `<pre>`; whitespace is literal while non-zero.
    pub preformatted: u32,
}

impl Default for InlineState {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            size_delta: 0.0,
            size_scale: 1.0,
            superscript: 0,
            centered: false,
            preformatted: 0,
        }
    }
}

impl InlineState {
    /// Apply the size modifiers to a cascaded pixel size.
    pub fn scaled_size(&self, cascaded: f32) -> f32 {
        (cascaded * self.size_scale + self.size_delta).max(1.0)
    }

    pub fn is_superscript(&self) -> bool {
        self.superscript > 0
    }

    pub fn is_preformatted(&self) -> bool {
        self.preformatted > 0
    }
}

/// What the line breaker must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAction {
    None,
    /// Finish the current line.
    Break,
    /// Finish the current line and add the paragraph gap.
    BreakWithGap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub state: InlineState,
    pub action: LineAction,
}

impl Transition {
    fn keep(state: InlineState) -> Self {
        Self {
            state,
            action: LineAction::None,
        }
    }

    fn then(state: InlineState, action: LineAction) -> Self {
        Self { state, action }
    }
}

/// Inputs a transition may consult besides the current state.
pub struct TagContext<'a> {
    pub element: &'a ElementData,
    pub config: &'a LayoutConfig,
}

pub type Effect = fn(InlineState, &TagContext<'_>) -> Transition;

pub struct TagEffect {
    pub tag: &'static str,
    pub open: Effect,
    pub close: Effect,
}

pub static TAG_EFFECTS: &[TagEffect] = &[
    TagEffect { tag: "i", open: italic_on, close: italic_off },
    TagEffect { tag: "em", open: italic_on, close: italic_off },
    TagEffect { tag: "b", open: bold_on, close: bold_off },
    TagEffect { tag: "strong", open: bold_on, close: bold_off },
    TagEffect { tag: "small", open: small_open, close: small_close },
    TagEffect { tag: "big", open: big_open, close: big_close },
    TagEffect { tag: "sup", open: sup_open, close: sup_close },
    TagEffect { tag: "br", open: line_break, close: nothing },
    TagEffect { tag: "p", open: nothing, close: paragraph_end },
    TagEffect { tag: "h1", open: heading_open, close: heading_close },
    TagEffect { tag: "pre", open: pre_open, close: pre_close },
];

pub fn effect_for(tag: &str) -> Option<&'static TagEffect> {
    TAG_EFFECTS.iter().find(|e| e.tag == tag)
}

/// Transition for entering an element; unknown tags change nothing.
pub fn open_tag(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    match effect_for(&ctx.element.tag) {
        Some(effect) => (effect.open)(state, ctx),
        None => Transition::keep(state),
    }
}

/// Transition for leaving an element.
pub fn close_tag(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    match effect_for(&ctx.element.tag) {
        Some(effect) => (effect.close)(state, ctx),
        None => Transition::keep(state),
    }
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

fn nothing(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::keep(state)
}

fn italic_on(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState { italic: true, ..state })
}

fn italic_off(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState { italic: false, ..state })
}

fn bold_on(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState { bold: true, ..state })
}

fn bold_off(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState { bold: false, ..state })
}

fn small_open(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState {
        size_delta: state.size_delta - ctx.config.small_delta,
        ..state
    })
}

fn small_close(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState {
        size_delta: state.size_delta + ctx.config.small_delta,
        ..state
    })
}

fn big_open(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState {
        size_delta: state.size_delta + ctx.config.big_delta,
        ..state
    })
}

fn big_close(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState {
        size_delta: state.size_delta - ctx.config.big_delta,
        ..state
    })
}

fn sup_open(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState {
        size_scale: state.size_scale * ctx.config.superscript_scale,
        superscript: state.superscript + 1,
        ..state
    })
}

fn sup_close(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::keep(InlineState {
        size_scale: state.size_scale / ctx.config.superscript_scale,
        superscript: state.superscript.saturating_sub(1),
        ..state
    })
}

fn line_break(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::then(state, LineAction::Break)
}

fn paragraph_end(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::then(state, LineAction::BreakWithGap)
}

fn heading_open(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    let centered = state.centered || ctx.element.has_class(&ctx.config.center_class);
    Transition::keep(InlineState {
        size_scale: state.size_scale * ctx.config.heading_scale,
        centered,
        ..state
    })
}

fn heading_close(state: InlineState, ctx: &TagContext<'_>) -> Transition {
    Transition::then(
        InlineState {
            size_scale: state.size_scale / ctx.config.heading_scale,
            centered: false,
            ..state
        },
        LineAction::Break,
    )
}

fn pre_open(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::then(
        InlineState {
            preformatted: state.preformatted + 1,
            ..state
        },
        LineAction::Break,
    )
}

fn pre_close(state: InlineState, _: &TagContext<'_>) -> Transition {
    Transition::then(
        InlineState {
            preformatted: state.preformatted.saturating_sub(1),
            ..state
        },
        LineAction::Break,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_tag<R>(tag: &str, class: Option<&str>, f: impl FnOnce(&TagContext<'_>) -> R) -> R {
        let mut element = ElementData::new(tag);
        if let Some(class) = class {
            element.attributes.insert("class".into(), class.into());
        }
        let config = LayoutConfig::default();
        let ctx = TagContext {
            element: &element,
            config: &config,
        };
        f(&ctx)
    }

    fn round_trip(tag: &str) -> (Transition, Transition) {
        with_tag(tag, None, |ctx| {
            let opened = open_tag(InlineState::default(), ctx);
            let closed = close_tag(opened.state, ctx);
            (opened, closed)
        })
    }

    #[test]
    fn toggles_restore_state() {
        for tag in ["i", "b", "small", "big", "sup", "pre", "em", "strong"] {
            let (opened, closed) = round_trip(tag);
            assert_ne!(opened.state, InlineState::default(), "{tag} changed nothing");
            assert_eq!(closed.state, InlineState::default(), "{tag} did not restore");
        }
    }

    #[test]
    fn size_modifiers() {
        let (small, _) = round_trip("small");
        assert_eq!(small.state.scaled_size(16.0), 14.0);
        let (big, _) = round_trip("big");
        assert_eq!(big.state.scaled_size(16.0), 20.0);
        let (sup, _) = round_trip("sup");
        assert!(sup.state.is_superscript());
        assert_eq!(sup.state.scaled_size(16.0), 8.0);
    }

    #[test]
    fn line_actions() {
        assert_eq!(round_trip("br").0.action, LineAction::Break);
        let (p_open, p_close) = round_trip("p");
        assert_eq!(p_open.action, LineAction::None);
        assert_eq!(p_close.action, LineAction::BreakWithGap);
        assert_eq!(round_trip("h1").1.action, LineAction::Break);
    }

    #[test]
    fn heading_centers_only_with_class() {
        let plain = with_tag("h1", None, |ctx| open_tag(InlineState::default(), ctx));
        assert!(!plain.state.centered);
        assert_eq!(plain.state.scaled_size(16.0), 24.0);
        let titled = with_tag("h1", Some("big title"), |ctx| open_tag(InlineState::default(), ctx));
        assert!(titled.state.centered);
    }

    #[test]
    fn unknown_tags_are_inert() {
        assert!(effect_for("span").is_none());
        let (opened, closed) = round_trip("span");
        assert_eq!(opened.state, InlineState::default());
        assert_eq!(closed.action, LineAction::None);
    }

    #[test]
    fn nested_sup_stays_raised_until_outer_close() {
        with_tag("sup", None, |ctx| {
            let outer = open_tag(InlineState::default(), ctx).state;
            let inner = open_tag(outer, ctx).state;
            assert_eq!(inner.scaled_size(16.0), 4.0);
            let back = close_tag(inner, ctx).state;
            assert!(back.is_superscript());
            assert_eq!(back.scaled_size(16.0), 8.0);
            assert!(!close_tag(back, ctx).state.is_superscript());
        });
    }

    #[test]
    fn nested_pre_survives_inner_tags() {
        with_tag("pre", None, |ctx| {
            let outer = open_tag(InlineState::default(), ctx).state;
            let inner = open_tag(outer, ctx).state;
            let back = close_tag(inner, ctx).state;
            assert!(back.is_preformatted());
            assert!(!close_tag(back, ctx).state.is_preformatted());
        });
    }
}

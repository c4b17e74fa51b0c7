//! # page-forge – HTML/CSS → paint commands
//!
//! A small layout core: it takes loosely-formed markup and simple
//! stylesheets and produces an ordered list of abstract paint commands for
//! an external renderer. The pipeline stages are:
//!
//! 1. **Parse** – markup → entity tree ([`html`], [`dom`])
//! 2. **Style** – stylesheet rules ([`css`]) cascaded over the tree ([`style`])
//! 3. **Layout** – block stacking and line breaking ([`layout`], [`inline`])
//! 4. **Paint** – geometry tree → display list ([`paint`])
//!
//! [`pipeline::Page`] runs the stages and keeps their results so a viewport
//! resize only repeats layout and painting.

pub mod css;
pub mod dom;
pub mod entities;
pub mod error;
pub mod fonts;
pub mod html;
pub mod inline;
pub mod layout;
pub mod paint;
pub mod pipeline;
pub mod style;

// Re-exports for convenience
pub use error::{Error, Result};
pub use paint::PaintCommand;
pub use pipeline::{Fetcher, Page, PipelineConfig};

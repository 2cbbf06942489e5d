//! Layercut Mask Engine
//!
//! Records freehand erase strokes and replays them over the subject:
//! - **Stroke:** display samples converted to native units and smoothed
//! - **History:** LIFO undo stack with a redo buffer
//! - **Render:** destination-out rasterization at any target scale
//!
//! Stroke geometry and width are fixed in native pixels when the stroke is
//! drawn, so rendering at scale 1.0 (export) and at the on-screen scale
//! (preview) agree up to rasterization rounding.

pub mod engine;
pub mod history;
pub mod render;
pub mod stroke;

pub use engine::MaskEngine;
pub use history::EraseHistory;
pub use render::render_masked;
pub use stroke::{MaskStroke, StrokeBuilder, StrokeRecord};

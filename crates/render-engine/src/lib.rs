//! Layercut Render Engine
//!
//! Flattens a document into one raster and encodes it for export.
//!
//! # Layer order
//!
//! ```text
//! background (transparent | color | gradient | cover image)
//!      │
//!      ├── overlay text, insertion order (shadow, then glyphs)
//!      │
//!      ├── masked subject (erase strokes applied)
//!      ▼
//! native-resolution RGBA ──► PNG
//! ```
//!
//! Text sits above the background and below the subject, so it can read as
//! being behind the person or object in the photo.

pub mod compositor;
pub mod export;
pub mod text;

pub use compositor::{Compositor, SceneSnapshot};
pub use export::*;
pub use text::FontBook;

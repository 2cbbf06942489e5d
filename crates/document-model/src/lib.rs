//! Layercut Document Model
//!
//! Defines the native-resolution state of one editing session:
//! - **Viewport:** the single zoom/pan transform broadcast to every surface
//! - **Background:** transparent, solid color, linear gradient or image
//! - **Overlay:** text items painted between background and subject
//! - **Document:** the layer store tying subject, background and overlays together
//!
//! Everything stored here is in native pixels of the segmented subject, so
//! nothing needs reinterpreting when the on-screen zoom changes.

pub mod background;
pub mod color;
pub mod document;
pub mod overlay;
pub mod viewport;

pub use background::*;
pub use color::*;
pub use document::*;
pub use overlay::*;
pub use viewport::*;

//! Layercut Session
//!
//! Ties the document, mask engine, viewport and compositor into one editing
//! session:
//! - **Session:** the `Empty → Loading → Ready ⇄ Exporting` state machine
//! - **Gateway:** pluggable background-removal backends
//! - **Handle:** async, serialized access for concurrent callers
//!
//! Segmentation is the only long-running step. It runs outside the session
//! lock and its result is dropped if a newer upload superseded it.

pub mod gateway;
pub mod handle;
pub mod session;

pub use gateway::{CommandGateway, PassthroughGateway, SegmentationGateway};
pub use handle::SessionHandle;
pub use session::{EditorSession, LoadOutcome, SessionState};

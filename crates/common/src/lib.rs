//! Layercut Common Utilities
//!
//! Shared infrastructure for all Layercut crates:
//! - Error taxonomy and result alias
//! - Configuration loading
//! - Tracing/logging initialization
//! - Frame-rate gate for coalescing re-renders

pub mod config;
pub mod error;
pub mod logging;
pub mod throttle;

pub use config::*;
pub use error::*;
pub use throttle::*;

//! Error types shared across Layercut crates.

/// Top-level error type for Layercut operations.
///
/// The first five variants are the user-facing taxonomy: decode and
/// segmentation failures abort a load, `NotFound` is a caller contract
/// violation, `NoSubject` and `UnsupportedBackground` reject a single
/// operation without touching the document.
#[derive(Debug, thiserror::Error)]
pub enum LayercutError {
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Segmentation error: {message}")]
    Segmentation { message: String },

    #[error("Overlay item not found: {id}")]
    NotFound { id: u64 },

    #[error("No subject loaded")]
    NoSubject,

    #[error("Unsupported background: {message}")]
    UnsupportedBackground { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using LayercutError.
pub type LayercutResult<T> = Result<T, LayercutError>;

impl LayercutError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn segmentation(msg: impl Into<String>) -> Self {
        Self::Segmentation {
            message: msg.into(),
        }
    }

    pub fn not_found(id: u64) -> Self {
        Self::NotFound { id }
    }

    pub fn unsupported_background(msg: impl Into<String>) -> Self {
        Self::UnsupportedBackground {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error should move a loading session to `Failed`.
    pub fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Segmentation { .. } | Self::Image(_)
        )
    }
}

//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Zoom limits for the viewport controller.
    #[serde(default)]
    pub viewport: ViewportDefaults,

    /// Style applied to newly added overlay text.
    #[serde(default)]
    pub overlay: OverlayDefaults,

    /// Export and preview rendering settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Fonts registered at startup.
    #[serde(default)]
    pub fonts: FontConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Zoom limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportDefaults {
    /// Smallest allowed display scale.
    pub min_scale: f64,

    /// Largest allowed display scale.
    pub max_scale: f64,
}

/// Default overlay text style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayDefaults {
    /// Placeholder content.
    pub content: String,

    /// CSS-style family list, tried left to right.
    pub font_family: String,

    /// CSS weight (400 regular, 700 bold).
    pub font_weight: u16,

    /// Text color.
    pub color: String,

    /// Minimum font size in native pixels.
    pub min_font_size: f64,

    /// Font size as a fraction of the document width.
    pub font_size_ratio: f64,

    /// Drop shadow color; `None` disables the shadow.
    pub shadow_color: Option<String>,

    /// Shadow blur radius in native pixels.
    pub shadow_blur: f64,

    /// Shadow offset in native pixels.
    pub shadow_offset: f64,
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Suggested filename for the download action.
    pub filename: String,

    /// Upper bound on preview re-renders per second.
    pub preview_fps: u32,
}

/// Fonts available to the overlay renderer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FontConfig {
    /// Font files (TTF/OTF) to register.
    pub files: Vec<PathBuf>,

    /// Family used when an overlay's family cannot be resolved.
    pub default_family: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "layercut_mask=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ViewportDefaults {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 5.0,
        }
    }
}

impl Default for OverlayDefaults {
    fn default() -> Self {
        Self {
            content: "Your Text Here".to_string(),
            font_family: "Arial Black, Arial, sans-serif".to_string(),
            font_weight: 700,
            color: "#ffffff".to_string(),
            min_font_size: 40.0,
            font_size_ratio: 0.125,
            shadow_color: Some("rgba(0,0,0,0.6)".to_string()),
            shadow_blur: 15.0,
            shadow_offset: 3.0,
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            filename: "layercut-composition.png".to_string(),
            preview_fps: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
                    Ok(config) => match config.validate() {
                        Ok(()) => return config,
                        Err(e) => {
                            tracing::warn!("Ignoring invalid config at {:?}: {}", config_path, e);
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> crate::LayercutResult<()> {
        let vp = &self.viewport;
        if !(vp.min_scale.is_finite() && vp.max_scale.is_finite())
            || vp.min_scale <= 0.0
            || vp.min_scale > vp.max_scale
        {
            return Err(crate::LayercutError::config(format!(
                "zoom limits must satisfy 0 < min <= max (got {}..{})",
                vp.min_scale, vp.max_scale
            )));
        }
        if self.export.preview_fps == 0 {
            return Err(crate::LayercutError::config("preview_fps must be at least 1"));
        }
        if self.overlay.min_font_size <= 0.0 || self.overlay.font_size_ratio <= 0.0 {
            return Err(crate::LayercutError::config(
                "overlay font sizing must be positive",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("layercut").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.viewport.min_scale, 0.5);
        assert_eq!(config.viewport.max_scale, 5.0);
        assert_eq!(config.overlay.content, "Your Text Here");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"viewport":{"min_scale":0.25,"max_scale":8.0}}"#).unwrap();
        assert_eq!(config.viewport.min_scale, 0.25);
        assert_eq!(config.export.preview_fps, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_inverted_zoom_limits_rejected() {
        let mut config = AppConfig::default();
        config.viewport.min_scale = 3.0;
        config.viewport.max_scale = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_invalid_file_falls_back() {
        let path = std::env::temp_dir().join("layercut_test_bad_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.filename, "layercut-composition.png");
        std::fs::remove_file(&path).ok();
    }
}

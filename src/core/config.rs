//! Engine configuration and render settings files
//!
//! [`RenderSettings`] can be stored as RON or JSON; the format follows the
//! file extension.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::renderer::RenderSettings;

/// Errors while reading or writing settings files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Only `.ron` and `.json` are understood
    #[error("Unsupported settings format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Ron,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ron") => Ok(Self::Ron),
            Some("json") => Ok(Self::Json),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Load render settings; fields missing from the file keep their defaults
///
/// # Errors
///
/// Returns an error if the file cannot be read, has an unknown extension or
/// does not parse
pub fn load_settings(path: impl AsRef<Path>) -> Result<RenderSettings, ConfigError> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

/// Save render settings in the format named by the extension
///
/// # Errors
///
/// Returns an error if the extension is unknown or the file cannot be written
pub fn save_settings(path: impl AsRef<Path>, settings: &RenderSettings) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = match Format::from_path(path)? {
        Format::Ron => ron::ser::to_string_pretty(settings, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        Format::Json => serde_json::to_string_pretty(settings)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?,
    };
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable VSync
    pub vsync: bool,
    /// Directory whose `.wgsl` files override the embedded shaders
    pub shader_dir: Option<PathBuf>,
    /// Root that relative asset paths are resolved against
    pub asset_dir: PathBuf,
    /// Render settings loaded at startup, if present
    pub settings_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("Diorama"),
            width: 1280,
            height: 720,
            vsync: true,
            shader_dir: None,
            asset_dir: PathBuf::from("assets"),
            settings_file: None,
        }
    }
}

impl EngineConfig {
    /// Create a new config with a title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set window dimensions
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable VSync
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = dir.into();
        self
    }

    pub fn with_settings_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_file = Some(path.into());
        self
    }

    /// Settings from [`settings_file`](Self::settings_file), or defaults
    ///
    /// A file that fails to load is reported and ignored.
    pub fn initial_settings(&self) -> RenderSettings {
        let Some(path) = &self.settings_file else {
            return RenderSettings::default();
        };
        match load_settings(path) {
            Ok(settings) => {
                log::info!("Loaded render settings from {}", path.display());
                settings
            }
            Err(err) => {
                log::warn!("{err}; using default render settings");
                RenderSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("diorama-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_ron_round_trip() {
        let path = temp_path("settings.ron");
        let mut settings = RenderSettings::default();
        settings.post.enabled = true;
        settings.shadow.strength = 0.5;

        save_settings(&path, &settings).unwrap();
        let loaded = load_settings(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_json_partial_file_keeps_defaults() {
        let path = temp_path("partial.json");
        fs::write(&path, r#"{ "debug_lights": true, "post": { "grayscale": false } }"#).unwrap();
        let loaded = load_settings(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(loaded.debug_lights);
        assert!(!loaded.post.grayscale);
        assert_eq!(loaded.post.spherize_strength, 2.0);
        assert_eq!(loaded.shadow, RenderSettings::default().shadow);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = save_settings("settings.toml", &RenderSettings::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_settings(temp_path("absent.ron")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_initial_settings_fall_back_to_defaults() {
        let config = EngineConfig::default().with_settings_file(temp_path("nowhere.json"));
        assert_eq!(config.initial_settings(), RenderSettings::default());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_title("Shrine")
            .with_size(800, 600)
            .with_shader_dir("shaders")
            .with_asset_dir("res");
        assert_eq!(config.title, "Shrine");
        assert_eq!((config.width, config.height), (800, 600));
        assert_eq!(config.shader_dir.as_deref(), Some(Path::new("shaders")));
        assert_eq!(config.asset_dir, PathBuf::from("res"));
    }
}

use crate::models::color::Color;
use crate::models::frame_cache::DEFAULT_FRAME_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_MAXIMIZE_TOLERANCE: f64 = 0.05;
pub const DEFAULT_MUTATION_QUEUE_NAME: &str = "slinger.mutations";
const CONFIG_DIR_NAME: &str = "slinger";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigParseError {
    #[error("File IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Invalid value for {variable}: {value}")]
    InvalidEnvironment { variable: String, value: String },
    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

/// Overlay window appearance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub background: Color,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            background: Color::OVERLAY_BACKDROP,
        }
    }
}

/// Runtime settings. Read once at startup, never written back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlingerConfig {
    /// Number of pre-maximize frames remembered
    pub frame_cache_capacity: usize,
    /// Fraction of the usable area a window may differ by and still count as maximized
    pub maximize_tolerance: f64,
    /// Thread name of the serial mutation queue
    pub mutation_queue_name: String,
    /// Extension script to load
    pub script_path: Option<PathBuf>,
    pub overlay: OverlayConfig,
}

impl Default for SlingerConfig {
    fn default() -> Self {
        Self {
            frame_cache_capacity: DEFAULT_FRAME_CACHE_CAPACITY,
            maximize_tolerance: DEFAULT_MAXIMIZE_TOLERANCE,
            mutation_queue_name: DEFAULT_MUTATION_QUEUE_NAME.to_string(),
            script_path: None,
            overlay: OverlayConfig::default(),
        }
    }
}

/// Loads [`SlingerConfig`] from TOML plus `SLINGER_*` environment overrides
pub struct ConfigParser {
    env: Box<dyn Fn(&str) -> Option<String>>,
}

impl ConfigParser {
    pub fn new() -> Self {
        Self {
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Use a custom environment lookup instead of the process environment
    pub fn with_env<F>(env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        Self { env: Box::new(env) }
    }

    /// `$XDG_CONFIG_HOME/slinger/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or the default location when `None`. A missing file
    /// yields defaults.
    pub fn load(&self, path: Option<&Path>) -> Result<SlingerConfig, ConfigParseError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "Loading configuration");
                self.parse_file(&path)?
            }
            Some(path) => {
                debug!(path = %path.display(), "No configuration file, using defaults");
                SlingerConfig::default()
            }
            None => SlingerConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<SlingerConfig, ConfigParseError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_str(&content)
    }

    pub fn parse_str(&self, content: &str) -> Result<SlingerConfig, ConfigParseError> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env_overrides(&self, config: &mut SlingerConfig) -> Result<(), ConfigParseError> {
        if let Some(value) = self.var("SLINGER_FRAME_CACHE_CAPACITY") {
            config.frame_cache_capacity = parse_env("SLINGER_FRAME_CACHE_CAPACITY", &value)?;
        }
        if let Some(value) = self.var("SLINGER_MAXIMIZE_TOLERANCE") {
            config.maximize_tolerance = parse_env("SLINGER_MAXIMIZE_TOLERANCE", &value)?;
        }
        if let Some(value) = self.var("SLINGER_MUTATION_QUEUE") {
            config.mutation_queue_name = value;
        }
        if let Some(value) = self.var("SLINGER_SCRIPT") {
            config.script_path = Some(PathBuf::from(value));
        }
        Ok(())
    }

    fn var(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|value| !value.trim().is_empty())
    }
}

impl Default for ConfigParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env<T: std::str::FromStr>(variable: &str, value: &str) -> Result<T, ConfigParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigParseError::InvalidEnvironment {
            variable: variable.to_string(),
            value: value.to_string(),
        })
}

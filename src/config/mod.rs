//! Configuration management for Slinger

pub mod parser;
pub mod validator;

pub use parser::{ConfigParseError, ConfigParser, OverlayConfig, SlingerConfig};
pub use validator::{ConfigValidator, ValidationResult, ValidationSeverity};

use std::path::Path;

/// Load, apply environment overrides and validate in one step
pub fn load_config(path: Option<&Path>) -> Result<SlingerConfig, ConfigParseError> {
    let config = ConfigParser::new().load(path)?;
    ConfigValidator::new().ensure_valid(&config)?;
    Ok(config)
}

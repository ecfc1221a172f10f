use crate::config::parser::{ConfigParseError, SlingerConfig};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub field: &'static str,
    pub message: String,
    pub severity: ValidationSeverity,
}

impl ValidationResult {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Frame caches beyond this size are almost certainly a typo
const LARGE_FRAME_CACHE: usize = 1000;
const LOOSE_TOLERANCE: f64 = 0.25;

#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &SlingerConfig) -> Vec<ValidationResult> {
        let mut results = Vec::new();

        if config.frame_cache_capacity == 0 {
            results.push(ValidationResult::error(
                "frame_cache_capacity",
                "must remember at least one frame",
            ));
        } else if config.frame_cache_capacity > LARGE_FRAME_CACHE {
            results.push(ValidationResult::warning(
                "frame_cache_capacity",
                format!("{} entries is unusually large", config.frame_cache_capacity),
            ));
        }

        if !(0.0..1.0).contains(&config.maximize_tolerance) {
            results.push(ValidationResult::error(
                "maximize_tolerance",
                format!("{} is outside [0, 1)", config.maximize_tolerance),
            ));
        } else if config.maximize_tolerance > LOOSE_TOLERANCE {
            results.push(ValidationResult::warning(
                "maximize_tolerance",
                "most windows will be reported as maximized",
            ));
        }

        if config.mutation_queue_name.trim().is_empty() {
            results.push(ValidationResult::error(
                "mutation_queue_name",
                "queue name must not be empty",
            ));
        }

        if let Some(path) = &config.script_path {
            if !path.is_file() {
                results.push(ValidationResult::warning(
                    "script_path",
                    format!("{} does not exist", path.display()),
                ));
            }
        }

        results
    }

    /// Log warnings and fail on the first error
    pub fn ensure_valid(&self, config: &SlingerConfig) -> Result<(), ConfigParseError> {
        let mut first_error = None;
        for result in self.validate(config) {
            match result.severity {
                ValidationSeverity::Warning => {
                    warn!(field = result.field, "Configuration warning: {}", result.message);
                }
                ValidationSeverity::Error => {
                    if first_error.is_none() {
                        first_error = Some(result);
                    }
                }
            }
        }

        match first_error {
            Some(result) => Err(ConfigParseError::ValidationError {
                message: format!("{}: {}", result.field, result.message),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_are_valid() {
        let validator = ConfigValidator::new();
        assert!(validator.validate(&SlingerConfig::default()).is_empty());
        assert!(validator.ensure_valid(&SlingerConfig::default()).is_ok());
    }

    #[test]
    fn zero_capacity_is_an_error() {
        let config = SlingerConfig {
            frame_cache_capacity: 0,
            ..SlingerConfig::default()
        };
        let err = ConfigValidator::new().ensure_valid(&config).unwrap_err();
        assert!(err.to_string().contains("frame_cache_capacity"));
    }

    #[test]
    fn tolerance_must_be_a_fraction() {
        let config = SlingerConfig {
            maximize_tolerance: 1.5,
            ..SlingerConfig::default()
        };
        let results = ConfigValidator::new().validate(&config);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, ValidationSeverity::Error);
    }

    #[test]
    fn missing_script_is_only_a_warning() {
        let config = SlingerConfig {
            script_path: Some(PathBuf::from("/nonexistent/extension.js")),
            ..SlingerConfig::default()
        };
        let validator = ConfigValidator::new();
        assert_eq!(validator.validate(&config)[0].severity, ValidationSeverity::Warning);
        assert!(validator.ensure_valid(&config).is_ok());
    }
}

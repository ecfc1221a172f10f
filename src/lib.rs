//! Slinger - keyboard-driven window slinging for macOS
//!
//! The core a scripted window-management extension depends on: a typed
//! coordinate-space model, a window directory and geometry service over the
//! accessibility API, a small retained-mode overlay scene graph, and the
//! calling contract with the script engine that hosts the extension.

pub mod bridge;
pub mod config;
pub mod logging;
pub mod macos;
pub mod models;
pub mod services;
pub mod ui;

pub use models::*;
pub use services::*;

/// Result type alias for Slinger operations
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to Slinger operations
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SlingerError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Window unavailable: {0}")]
    WindowUnavailable(String),

    #[error("No target screen available")]
    NoTargetScreen,

    #[error("Script error: {message}\n{stack}")]
    Script { message: String, stack: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("macOS API error: {0}")]
    MacOSAPIError(String),

    #[error("Mutation queue '{0}' is closed")]
    QueueClosed(String),
}

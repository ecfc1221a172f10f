//! macOS integration layer for Slinger
//!
//! These modules provide testable abstractions over the Accessibility,
//! AppKit and Core Graphics APIs. The system-backed implementations only
//! exist on macOS; every other platform (and every test) uses the in-memory
//! providers.

pub mod accessibility;
pub mod core_graphics;
#[cfg(target_os = "macos")]
pub mod overlay_window;
#[cfg(target_os = "macos")]
pub mod system_accessibility;

pub use accessibility::*;
pub use core_graphics::*;
#[cfg(target_os = "macos")]
pub use overlay_window::CocoaOverlayHost;
#[cfg(target_os = "macos")]
pub use system_accessibility::SystemAccessibilityProvider;

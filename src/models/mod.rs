//! Data models for Slinger

pub mod color;
pub mod frame_cache;
pub mod geometry;
pub mod input;
pub mod screen;
pub mod window;

pub use color::*;
pub use frame_cache::*;
pub use geometry::*;
pub use input::*;
pub use screen::*;
pub use window::*;

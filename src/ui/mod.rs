//! Overlay user interface for Slinger
//!
//! A small retained-mode scene graph the extension builds its picker from,
//! the native window host it renders into, and the translation of native
//! input into the events the extension subscribes to.

pub mod canvas;
pub mod input;
pub mod overlay;
pub mod scene_graph;
pub mod session;

pub use canvas::{DrawCommand, DrawContext, Operator, SharedDrawContext};
pub use input::{InputTranslator, NativeEvent, SceneInput};
pub use overlay::{HostRequest, OverlayHost, OverlayWindowId, RecordingOverlayHost};
pub use scene_graph::{ActorId, DisplayItem, PointerKind, Scene, Signal, SignalEvent, SignalHandler};
pub use session::{OverlaySession, ShownOverlay};

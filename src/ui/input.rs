//! Native overlay-window events into scene input
//!
//! Hosts report events in the window's own coordinates, which use the
//! platform axis convention with the usable area's origin. The translator
//! flips them into script space and turns modifier-flag changes into
//! synthetic key presses and releases.

use crate::models::geometry::{AxisFlip, Platform, Point, Script, Workspace};
use crate::models::input::{KeyEvent, KeyPhase, ModifierFlags, ModifierTracker, MouseEvent};
use crate::ui::scene_graph::PointerKind;

/// Event as reported by a native overlay window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeEvent {
    MouseMoved {
        location: Point<Platform, Workspace>,
    },
    MouseDown {
        location: Point<Platform, Workspace>,
    },
    KeyDown {
        key_code: u16,
        flags: ModifierFlags,
    },
    KeyUp {
        key_code: u16,
        flags: ModifierFlags,
    },
    FlagsChanged {
        flags: ModifierFlags,
    },
}

/// Input ready for delivery to the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneInput {
    Pointer(PointerKind, MouseEvent),
    Key(KeyEvent),
}

#[derive(Debug, Clone)]
pub struct InputTranslator {
    flip: AxisFlip<Platform, Script, Workspace>,
    modifiers: ModifierTracker,
}

impl InputTranslator {
    pub fn new(flip: AxisFlip<Platform, Script, Workspace>) -> Self {
        Self {
            flip,
            modifiers: ModifierTracker::new(),
        }
    }

    pub fn translate(&mut self, event: NativeEvent) -> Vec<SceneInput> {
        match event {
            NativeEvent::MouseMoved { location } => vec![self.pointer(PointerKind::Motion, location)],
            NativeEvent::MouseDown { location } => {
                vec![self.pointer(PointerKind::ButtonPress, location)]
            }
            NativeEvent::KeyDown { key_code, flags } => {
                vec![SceneInput::Key(KeyEvent::from_native(KeyPhase::Press, key_code, flags))]
            }
            NativeEvent::KeyUp { key_code, flags } => {
                vec![SceneInput::Key(KeyEvent::from_native(KeyPhase::Release, key_code, flags))]
            }
            NativeEvent::FlagsChanged { flags } => self
                .modifiers
                .update(flags)
                .into_iter()
                .map(SceneInput::Key)
                .collect(),
        }
    }

    fn pointer(&self, kind: PointerKind, location: Point<Platform, Workspace>) -> SceneInput {
        SceneInput::Pointer(kind, MouseEvent::new(location.invert(self.flip)))
    }
}

//! Neutral input events handed to the extension
//!
//! Native key codes and modifier flags are translated into the numbering the
//! extension was written against (X11/evdev-style key codes), and pointer
//! positions are delivered in script space.

use crate::models::geometry::ScriptPoint;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::debug;

bitflags! {
    /// Device-independent modifier flags as reported by native key events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModifierFlags: u64 {
        const CAPS_LOCK = 1 << 16;
        const SHIFT = 1 << 17;
        const CONTROL = 1 << 18;
        const OPTION = 1 << 19;
        const COMMAND = 1 << 20;
        const NUMERIC_PAD = 1 << 21;
        const HELP = 1 << 22;
        const FUNCTION = 1 << 23;
    }
}

/// Key code in the extension's numbering
pub type NeutralKeyCode = u32;

/// `get_state()` bit set while shift is held
pub const SHIFT_MASK: u32 = 1;

/// Value returned for native keys outside the known table
pub const UNMAPPED_KEY: NeutralKeyCode = 0;

pub mod keys {
    use super::NeutralKeyCode;

    pub const ESCAPE: NeutralKeyCode = 9;
    pub const MINUS: NeutralKeyCode = 20;
    pub const EQUALS: NeutralKeyCode = 21;
    pub const TAB: NeutralKeyCode = 23;
    pub const U: NeutralKeyCode = 30;
    pub const I: NeutralKeyCode = 31;
    pub const O: NeutralKeyCode = 32;
    pub const RETURN: NeutralKeyCode = 36;
    pub const A: NeutralKeyCode = 38;
    pub const H: NeutralKeyCode = 43;
    pub const J: NeutralKeyCode = 44;
    pub const K: NeutralKeyCode = 45;
    pub const L: NeutralKeyCode = 46;
    pub const SHIFT: NeutralKeyCode = 50;
    /// Control, and also command: the extension treats command as control
    pub const CONTROL: NeutralKeyCode = 64;
    pub const SPACE: NeutralKeyCode = 65;
    pub const UP: NeutralKeyCode = 111;
    pub const LEFT: NeutralKeyCode = 113;
    pub const RIGHT: NeutralKeyCode = 114;
    pub const DOWN: NeutralKeyCode = 116;
    pub const ALT: NeutralKeyCode = 133;
}

/// macOS virtual key codes (`kVK_*`) for the keys the extension understands
pub mod native {
    pub const A: u16 = 0x00;
    pub const H: u16 = 0x04;
    pub const EQUALS: u16 = 0x18;
    pub const MINUS: u16 = 0x1B;
    pub const O: u16 = 0x1F;
    pub const U: u16 = 0x20;
    pub const I: u16 = 0x22;
    pub const RETURN: u16 = 0x24;
    pub const L: u16 = 0x25;
    pub const J: u16 = 0x26;
    pub const K: u16 = 0x28;
    pub const TAB: u16 = 0x30;
    pub const SPACE: u16 = 0x31;
    pub const ESCAPE: u16 = 0x35;
    pub const SHIFT: u16 = 0x38;
    pub const CONTROL: u16 = 0x3B;
    pub const LEFT_ARROW: u16 = 0x7B;
    pub const RIGHT_ARROW: u16 = 0x7C;
    pub const DOWN_ARROW: u16 = 0x7D;
    pub const UP_ARROW: u16 = 0x7E;
}

/// Translate a native key code, falling back to [`UNMAPPED_KEY`]
pub fn neutral_key_code(native_code: u16) -> NeutralKeyCode {
    match native_code {
        native::ESCAPE => keys::ESCAPE,
        native::SHIFT => keys::SHIFT,
        native::SPACE => keys::SPACE,
        native::CONTROL => keys::CONTROL,
        native::TAB => keys::TAB,
        native::U => keys::U,
        native::I => keys::I,
        native::O => keys::O,
        native::A => keys::A,
        native::H => keys::H,
        native::J => keys::J,
        native::K => keys::K,
        native::L => keys::L,
        native::UP_ARROW => keys::UP,
        native::DOWN_ARROW => keys::DOWN,
        native::LEFT_ARROW => keys::LEFT,
        native::RIGHT_ARROW => keys::RIGHT,
        native::MINUS => keys::MINUS,
        native::EQUALS => keys::EQUALS,
        native::RETURN => keys::RETURN,
        other => {
            debug!(native_code = other, "Uninterpreted key");
            UNMAPPED_KEY
        }
    }
}

/// Modifiers that produce synthetic key events, in emission order
const MODIFIER_KEYS: [(ModifierFlags, NeutralKeyCode); 3] = [
    (ModifierFlags::SHIFT, keys::SHIFT),
    (ModifierFlags::COMMAND, keys::CONTROL),
    (ModifierFlags::OPTION, keys::ALT),
];

pub fn state_mask(flags: ModifierFlags) -> u32 {
    if flags.contains(ModifierFlags::SHIFT) {
        SHIFT_MASK
    } else {
        0
    }
}

/// Direction of a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPhase {
    Press,
    Release,
}

/// Key event in the extension's numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub phase: KeyPhase,
    pub code: NeutralKeyCode,
    pub state: u32,
}

impl KeyEvent {
    /// Translate a regular (non-modifier) native key event
    pub fn from_native(phase: KeyPhase, native_code: u16, flags: ModifierFlags) -> Self {
        Self {
            phase,
            code: neutral_key_code(native_code),
            state: state_mask(flags),
        }
    }

    pub fn key_code(&self) -> NeutralKeyCode {
        self.code
    }

    pub fn state(&self) -> u32 {
        self.state
    }
}

/// Synthesize key events for a modifier-flag change. Newly set modifiers
/// become presses, newly cleared ones releases; unmapped modifiers are ignored.
pub fn diff_modifiers(previous: ModifierFlags, current: ModifierFlags) -> Vec<KeyEvent> {
    let pressed = current.difference(previous);
    let released = previous.difference(current);

    let presses = MODIFIER_KEYS
        .iter()
        .filter(|(flag, _)| pressed.contains(*flag))
        .map(|(_, code)| KeyEvent {
            phase: KeyPhase::Press,
            code: *code,
            state: 0,
        });
    let releases = MODIFIER_KEYS
        .iter()
        .filter(|(flag, _)| released.contains(*flag))
        .map(|(_, code)| KeyEvent {
            phase: KeyPhase::Release,
            code: *code,
            state: 0,
        });

    presses.chain(releases).collect()
}

/// Tracks the last seen modifier flags so changes can be diffed
#[derive(Debug, Default, Clone)]
pub struct ModifierTracker {
    current: ModifierFlags,
}

impl ModifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, flags: ModifierFlags) -> Vec<KeyEvent> {
        let events = diff_modifiers(self.current, flags);
        self.current = flags;
        events
    }

    pub fn current(&self) -> ModifierFlags {
        self.current
    }
}

/// Pointer event with coordinates in script space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub position: ScriptPoint,
}

impl MouseEvent {
    pub fn new(position: ScriptPoint) -> Self {
        Self { position }
    }

    pub fn coords(&self) -> [i32; 2] {
        [self.position.x, self.position.y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressing_shift_emits_one_press() {
        let events = diff_modifiers(ModifierFlags::empty(), ModifierFlags::SHIFT);
        assert_eq!(
            events,
            vec![KeyEvent {
                phase: KeyPhase::Press,
                code: keys::SHIFT,
                state: 0
            }]
        );
    }

    #[test]
    fn releasing_command_keeps_shift_quiet() {
        let events = diff_modifiers(
            ModifierFlags::SHIFT | ModifierFlags::COMMAND,
            ModifierFlags::SHIFT,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, KeyPhase::Release);
        assert_eq!(events[0].code, keys::CONTROL);
    }

    #[test]
    fn unmapped_modifiers_are_ignored() {
        let events = diff_modifiers(ModifierFlags::empty(), ModifierFlags::CONTROL | ModifierFlags::CAPS_LOCK);
        assert!(events.is_empty());
    }

    #[test]
    fn tracker_remembers_previous_flags() {
        let mut tracker = ModifierTracker::new();
        assert_eq!(tracker.update(ModifierFlags::OPTION).len(), 1);
        assert!(tracker.update(ModifierFlags::OPTION).is_empty());
        let released = tracker.update(ModifierFlags::empty());
        assert_eq!(released[0].code, keys::ALT);
        assert_eq!(released[0].phase, KeyPhase::Release);
    }

    #[test]
    fn native_codes_translate_through_table() {
        assert_eq!(neutral_key_code(native::ESCAPE), keys::ESCAPE);
        assert_eq!(neutral_key_code(native::J), 44);
        assert_eq!(neutral_key_code(native::RETURN), 36);
        assert_eq!(neutral_key_code(0x63), UNMAPPED_KEY);
    }

    #[test]
    fn shift_sets_state_mask() {
        let event = KeyEvent::from_native(KeyPhase::Press, native::J, ModifierFlags::SHIFT);
        assert_eq!(event.state(), SHIFT_MASK);
        let event = KeyEvent::from_native(KeyPhase::Press, native::J, ModifierFlags::COMMAND);
        assert_eq!(event.state(), 0);
    }
}

use serde::{Deserialize, Serialize};

/// RGBA colour with 0-255 components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    /// Backdrop behind the picker: half-transparent mid grey
    pub const OVERLAY_BACKDROP: Color = Color::rgba(128, 128, 128, 128);

    pub const fn rgba(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Build from loosely typed components, clamping into range.
    /// Missing components default to 0.
    pub fn from_components(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        fn clamp(component: f64) -> u8 {
            if component.is_nan() {
                0
            } else {
                component.round().clamp(0.0, 255.0) as u8
            }
        }
        Self::rgba(clamp(red), clamp(green), clamp(blue), clamp(alpha))
    }

    /// Components scaled to the 0.0-1.0 range drawing APIs expect
    pub fn unit_components(&self) -> [f64; 4] {
        [
            f64::from(self.red) / 255.0,
            f64::from(self.green) / 255.0,
            f64::from(self.blue) / 255.0,
            f64::from(self.alpha) / 255.0,
        ]
    }
}

//! 2D drawing surface handed to canvas draw callbacks
//!
//! A [`DrawContext`] records path, paint and state operations into a command
//! list. A fresh context is created for every redraw, so nothing the callback
//! sets survives into the next one; the native host replays the recorded
//! commands onto its graphics context.

use crate::models::color::Color;
use crate::models::geometry::Size;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::warn;

/// Compositing operators the extension may select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Default source-over compositing
    Over,
    /// Erase to fully transparent
    Clear,
}

impl Operator {
    /// Numeric value exposed to scripts as `Cairo.CLEAR`
    pub const CLEAR_CODE: i64 = 1;

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            Self::CLEAR_CODE => Some(Operator::Clear),
            _ => None,
        }
    }
}

/// One recorded drawing operation, in the canvas's local coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rectangle {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    Arc {
        x: f64,
        y: f64,
        radius: f64,
        start: f64,
        end: f64,
    },
    Fill,
    Stroke,
    Clip,
    ResetClip,
    Paint,
    Save,
    Restore,
    Translate {
        x: f64,
        y: f64,
    },
    Rotate {
        radians: f64,
    },
    SetSourceRgba {
        red: f64,
        green: f64,
        blue: f64,
        alpha: f64,
    },
    SetLineWidth(f64),
    SetOperator(Operator),
}

/// Recording drawing context for a single redraw
#[derive(Debug, Clone, Default)]
pub struct DrawContext {
    size: Size,
    commands: Vec<DrawCommand>,
}

/// Context shared with script callbacks for the duration of a redraw
pub type SharedDrawContext = Rc<RefCell<DrawContext>>;

impl DrawContext {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<DrawCommand> {
        self.commands
    }

    pub fn rectangle(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.commands.push(DrawCommand::Rectangle {
            x,
            y,
            width,
            height,
        });
    }

    pub fn arc(&mut self, x: f64, y: f64, radius: f64, start: f64, end: f64) {
        self.commands.push(DrawCommand::Arc {
            x,
            y,
            radius,
            start,
            end,
        });
    }

    pub fn fill(&mut self) {
        self.commands.push(DrawCommand::Fill);
    }

    pub fn stroke(&mut self) {
        self.commands.push(DrawCommand::Stroke);
    }

    pub fn clip(&mut self) {
        self.commands.push(DrawCommand::Clip);
    }

    pub fn reset_clip(&mut self) {
        self.commands.push(DrawCommand::ResetClip);
    }

    pub fn paint(&mut self) {
        self.commands.push(DrawCommand::Paint);
    }

    pub fn save(&mut self) {
        self.commands.push(DrawCommand::Save);
    }

    pub fn restore(&mut self) {
        self.commands.push(DrawCommand::Restore);
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        self.commands.push(DrawCommand::Translate { x, y });
    }

    pub fn rotate(&mut self, radians: f64) {
        self.commands.push(DrawCommand::Rotate { radians });
    }

    pub fn set_source_rgba(&mut self, red: f64, green: f64, blue: f64, alpha: f64) {
        self.commands.push(DrawCommand::SetSourceRgba {
            red,
            green,
            blue,
            alpha,
        });
    }

    pub fn set_source_color(&mut self, color: Color) {
        let [red, green, blue, alpha] = color.unit_components();
        self.set_source_rgba(red, green, blue, alpha);
    }

    pub fn set_line_width(&mut self, width: f64) {
        self.commands.push(DrawCommand::SetLineWidth(width));
    }

    /// Unknown operator codes are logged and ignored
    pub fn set_operator(&mut self, code: i64) {
        match Operator::from_code(code) {
            Some(operator) => self.commands.push(DrawCommand::SetOperator(operator)),
            None => warn!(code, "Unsupported compositing operator"),
        }
    }
}

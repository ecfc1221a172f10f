//! Script engine abstraction and the values exchanged with it
//!
//! The engine itself is external. Scripts see host objects (the system
//! facade, actors, canvases, events) as opaque [`HostObject`] values and
//! reach their methods through a [`HostDispatch`] the bridge installs.

use crate::models::geometry::{ScriptPoint, ScriptRect};
use crate::models::input::{KeyEvent, MouseEvent};
use crate::models::window::WindowHandle;
use crate::ui::scene_graph::ActorId;
use crate::SlingerError;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Function owned by the engine, valid for the engine's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionRef(pub u64);

/// Native object handed to scripts by reference
#[derive(Debug, Clone, PartialEq)]
pub enum HostObject {
    /// The capability object passed to `makeExtension`
    System,
    /// `system.Clutter` constants and no-op grabs
    Clutter,
    /// `system.Cairo` constants
    Cairo,
    Window(WindowHandle),
    Actor(ActorId),
    Canvas(ActorId),
    /// Drawing context, valid only while its draw callback runs
    DrawContext(u64),
    KeyEvent(KeyEvent),
    MouseEvent(MouseEvent),
}

/// Value crossing the engine boundary
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ScriptValue>),
    Object(BTreeMap<String, ScriptValue>),
    Function(FunctionRef),
    Host(HostObject),
}

impl ScriptValue {
    pub fn is_nullish(&self) -> bool {
        matches!(self, ScriptValue::Undefined | ScriptValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numbers truncate toward zero the way the native integer coercion does
    pub fn as_i32(&self) -> Option<i32> {
        self.as_f64()
            .filter(|n| n.is_finite())
            .map(|n| n.trunc().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostObject> {
        match self {
            ScriptValue::Host(object) => Some(object),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, ScriptValue)>,
        K: Into<String>,
    {
        ScriptValue::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// `{x, y}`
    pub fn from_point(point: ScriptPoint) -> Self {
        Self::xy(point.x, point.y)
    }

    pub fn as_point(&self) -> Option<ScriptPoint> {
        Some(ScriptPoint::new(
            self.get("x")?.as_i32()?,
            self.get("y")?.as_i32()?,
        ))
    }

    /// Rects travel as `{pos: {x, y}, size: {x, y}}`
    pub fn from_rect(rect: ScriptRect) -> Self {
        Self::object([
            ("pos", Self::xy(rect.x(), rect.y())),
            ("size", Self::xy(rect.width(), rect.height())),
        ])
    }

    pub fn as_rect(&self) -> Option<ScriptRect> {
        let pos = self.get("pos")?;
        let size = self.get("size")?;
        Some(ScriptRect::from_xywh(
            pos.get("x")?.as_i32()?,
            pos.get("y")?.as_i32()?,
            size.get("x")?.as_i32()?,
            size.get("y")?.as_i32()?,
        ))
    }

    fn xy(x: i32, y: i32) -> Self {
        Self::object([
            ("x", ScriptValue::Number(f64::from(x))),
            ("y", ScriptValue::Number(f64::from(y))),
        ])
    }

    /// Plain-data view for logging and engines that exchange JSON.
    /// Functions and host objects have no JSON form and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            ScriptValue::Undefined | ScriptValue::Null => Value::Null,
            ScriptValue::Function(_) | ScriptValue::Host(_) => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(*b),
            ScriptValue::Number(n) => Number::from_f64(*n).map_or(Value::Null, Value::Number),
            ScriptValue::String(s) => Value::String(s.clone()),
            ScriptValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            ScriptValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl From<Value> for ScriptValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ScriptValue::Null,
            Value::Bool(b) => ScriptValue::Bool(b),
            Value::Number(n) => n.as_f64().map_or(ScriptValue::Null, ScriptValue::Number),
            Value::String(s) => ScriptValue::String(s),
            Value::Array(items) => ScriptValue::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(fields) => {
                ScriptValue::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<i32> for ScriptValue {
    fn from(n: i32) -> Self {
        ScriptValue::Number(f64::from(n))
    }
}

impl From<i64> for ScriptValue {
    fn from(n: i64) -> Self {
        ScriptValue::Number(n as f64)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Number(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::String(s)
    }
}

impl From<HostObject> for ScriptValue {
    fn from(object: HostObject) -> Self {
        ScriptValue::Host(object)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ScriptValue::Null, Into::into)
    }
}

impl<T: Into<ScriptValue>> From<Vec<T>> for ScriptValue {
    fn from(items: Vec<T>) -> Self {
        ScriptValue::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Exception raised inside the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptException {
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stack {
            Some(stack) => write!(f, "{}\n{}", self.message, stack),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<ScriptException> for SlingerError {
    fn from(exception: ScriptException) -> Self {
        SlingerError::Script {
            message: exception.message,
            stack: exception.stack.unwrap_or_default(),
        }
    }
}

pub type ScriptResult<T> = std::result::Result<T, ScriptException>;

/// Receives exceptions the engine reports through its handler
pub type ExceptionHandler = Box<dyn Fn(ScriptException)>;

/// Native side of host objects: property reads and method calls from scripts
pub trait HostDispatch {
    fn get(&self, target: &HostObject, name: &str) -> Option<ScriptValue>;

    /// An `Err` is raised in the script as an exception
    fn invoke(&self, target: &HostObject, method: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue>;
}

/// An embedded script engine. Engines run on the UI thread.
///
/// Engines may report an exception through the installed handler, through
/// the `Err` of the call that raised it, or both.
pub trait ScriptEngine {
    fn install_exception_handler(&self, handler: ExceptionHandler);

    /// Route host-object property reads and method calls to `host`
    fn install_host(&self, host: Rc<dyn HostDispatch>);

    fn evaluate(&self, source: &str) -> ScriptResult<ScriptValue>;

    fn global(&self, name: &str) -> Option<ScriptValue>;

    fn call(&self, function: &ScriptValue, args: &[ScriptValue]) -> ScriptResult<ScriptValue>;

    fn call_method(&self, object: &ScriptValue, name: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue>;

    fn property(&self, object: &ScriptValue, name: &str) -> Option<ScriptValue>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rects_use_pos_and_size_fields() {
        let rect = ScriptRect::from_xywh(10, 20, 300, 400);
        let value = ScriptValue::from_rect(rect);
        assert_eq!(
            value.to_json(),
            json!({"pos": {"x": 10.0, "y": 20.0}, "size": {"x": 300.0, "y": 400.0}})
        );
        assert_eq!(value.as_rect(), Some(rect));
    }

    #[test]
    fn fractional_coordinates_truncate() {
        let value: ScriptValue = json!({"pos": {"x": 10.9, "y": -3.5}, "size": {"x": 1, "y": 2}}).into();
        assert_eq!(value.as_rect(), Some(ScriptRect::from_xywh(10, -3, 1, 2)));
    }

    #[test]
    fn incomplete_rects_are_rejected() {
        let value: ScriptValue = json!({"pos": {"x": 1}, "size": {"x": 1, "y": 2}}).into();
        assert_eq!(value.as_rect(), None);
    }

    #[test]
    fn exceptions_become_script_errors() {
        let error: SlingerError = ScriptException::new("boom").with_stack("at line 3").into();
        assert_eq!(error.to_string(), "Script error: boom\nat line 3");
    }
}

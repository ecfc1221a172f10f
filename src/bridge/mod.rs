//! Calling contract between Slinger and the extension's script engine

pub mod capabilities;
pub mod engine;
pub mod extension;

pub use capabilities::Capabilities;
pub use engine::{
    ExceptionHandler, FunctionRef, HostDispatch, HostObject, ScriptEngine, ScriptException,
    ScriptResult, ScriptValue,
};
pub use extension::{ExtensionBridge, ScriptRuntime, EXTENSION_FACTORY};

//! Loading and driving the window-management extension
//!
//! Every call into the engine returns a `Result`. An exception raised while a
//! call runs fails that call. An exception the engine reports while no call
//! is running (timers, engine-internal callbacks) is held and fails the next
//! call exactly once, after which calls proceed normally. [`ExtensionBridge::finish`]
//! surfaces an exception still held at shutdown.

use crate::bridge::capabilities::Capabilities;
use crate::bridge::engine::{HostObject, ScriptEngine, ScriptException, ScriptResult, ScriptValue};
use crate::models::geometry::ScriptPoint;
use crate::ui::scene_graph::ActorId;
use crate::ui::session::OverlaySession;
use crate::{Result, SlingerError};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// Global the extension source must define
pub const EXTENSION_FACTORY: &str = "makeExtension";

#[derive(Debug, Default)]
struct ErrorSlots {
    /// Raised while no call was running
    pending: RefCell<Option<ScriptException>>,
    /// One slot per call in progress, innermost last
    frames: RefCell<Vec<Option<ScriptException>>>,
}

impl ErrorSlots {
    fn capture(&self, exception: ScriptException) {
        let mut frames = self.frames.borrow_mut();
        if let Some(slot) = frames.last_mut() {
            if slot.is_none() {
                *slot = Some(exception);
            }
            return;
        }
        drop(frames);

        let mut pending = self.pending.borrow_mut();
        if let Some(previous) = pending.replace(exception) {
            warn!(exception = %previous, "Unreported script exception replaced");
        }
    }
}

/// Engine wrapper that turns exceptions into per-call errors
pub struct ScriptRuntime {
    engine: Rc<dyn ScriptEngine>,
    errors: Rc<ErrorSlots>,
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

impl ScriptRuntime {
    /// Installs the engine's exception handler; do this once per engine
    pub fn new(engine: Rc<dyn ScriptEngine>) -> Self {
        let errors = Rc::new(ErrorSlots::default());
        let slots = errors.clone();
        engine.install_exception_handler(Box::new(move |exception| slots.capture(exception)));
        Self { engine, errors }
    }

    pub fn engine(&self) -> &Rc<dyn ScriptEngine> {
        &self.engine
    }

    fn guarded<T>(
        &self,
        description: &str,
        call: impl FnOnce(&dyn ScriptEngine) -> ScriptResult<T>,
    ) -> std::result::Result<T, SlingerError> {
        self.errors.frames.borrow_mut().push(None);
        let result = call(self.engine.as_ref());
        let raised = self.errors.frames.borrow_mut().pop().flatten();

        let outermost = self.errors.frames.borrow().is_empty();
        let stale = if outermost {
            self.errors.pending.borrow_mut().take()
        } else {
            None
        };

        let failure = match (result, raised) {
            (Err(exception), _) | (Ok(_), Some(exception)) => {
                if let Some(stale) = stale {
                    error!(exception = %stale, "Earlier script exception superseded");
                }
                exception
            }
            (Ok(value), None) => match stale {
                Some(stale) => stale,
                None => return Ok(value),
            },
        };
        debug!(call = description, exception = %failure, "Script call failed");
        Err(failure.into())
    }

    pub fn evaluate(&self, source: &str) -> std::result::Result<ScriptValue, SlingerError> {
        self.guarded("evaluate", |engine| engine.evaluate(source))
    }

    pub fn global(&self, name: &str) -> Option<ScriptValue> {
        self.engine.global(name).filter(|value| !value.is_nullish())
    }

    pub fn call(&self, function: &ScriptValue, args: &[ScriptValue]) -> std::result::Result<ScriptValue, SlingerError> {
        self.guarded("call", |engine| engine.call(function, args))
    }

    pub fn call_method(
        &self,
        object: &ScriptValue,
        name: &str,
        args: &[ScriptValue],
    ) -> std::result::Result<ScriptValue, SlingerError> {
        self.guarded(name, |engine| engine.call_method(object, name, args))
    }

    pub fn property(&self, object: &ScriptValue, name: &str) -> Option<ScriptValue> {
        self.engine
            .property(object, name)
            .filter(|value| !value.is_nullish())
    }

    /// Exception raised outside any call and not yet reported
    pub fn take_pending(&self) -> Option<SlingerError> {
        self.errors.pending.borrow_mut().take().map(Into::into)
    }
}

/// A loaded extension and the capability object it was given
#[derive(Debug)]
pub struct ExtensionBridge {
    runtime: Rc<ScriptRuntime>,
    capabilities: Rc<Capabilities>,
    extension: ScriptValue,
}

impl ExtensionBridge {
    /// Evaluate `source` and build the extension with `makeExtension(system)`
    pub fn load(engine: Rc<dyn ScriptEngine>, source: &str, capabilities: Rc<Capabilities>) -> Result<Self> {
        let runtime = Rc::new(ScriptRuntime::new(engine.clone()));
        capabilities.attach_runtime(&runtime);
        engine.install_host(capabilities.clone());

        runtime.evaluate(source)?;
        let factory = runtime.global(EXTENSION_FACTORY).ok_or_else(|| SlingerError::Script {
            message: format!("{} is not defined", EXTENSION_FACTORY),
            stack: String::new(),
        })?;
        let extension = runtime.call(&factory, &[HostObject::System.into()])?;
        info!("Extension loaded");

        Ok(Self {
            runtime,
            capabilities,
            extension,
        })
    }

    pub fn extension(&self) -> &ScriptValue {
        &self.extension
    }

    pub fn capabilities(&self) -> &Rc<Capabilities> {
        &self.capabilities
    }

    pub fn runtime(&self) -> &Rc<ScriptRuntime> {
        &self.runtime
    }

    /// Hand the extension a fresh root actor; returns its menu object or null
    pub fn show_ui(&self, root: ActorId, anchor: ScriptPoint) -> Result<ScriptValue> {
        let menu = self.runtime.call_method(
            &self.extension,
            "show_ui",
            &[HostObject::Actor(root).into(), ScriptValue::from_point(anchor)],
        )?;
        Ok(menu)
    }

    /// Open the overlay and build the picker inside it
    pub fn show(&self, session: &mut OverlaySession) -> Result<ScriptValue> {
        let shown = session.show()?;
        self.show_ui(shown.root, shown.anchor).inspect_err(|err| {
            error!(error = %err, "show_ui failed");
        })
    }

    /// Invoke `actions[name](...args)`
    pub fn invoke_action(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue> {
        let actions = self
            .runtime
            .property(&self.extension, "actions")
            .ok_or_else(|| SlingerError::Script {
                message: "extension has no actions table".to_string(),
                stack: String::new(),
            })?;
        if self.runtime.property(&actions, name).is_none() {
            return Err(SlingerError::Script {
                message: format!("unknown action '{}'", name),
                stack: String::new(),
            }
            .into());
        }
        debug!(action = name, "Invoking extension action");
        Ok(self.runtime.call_method(&actions, name, args)?)
    }

    /// Call a global function defined by the extension source
    pub fn call_function(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue> {
        let function = self.runtime.global(name).ok_or_else(|| SlingerError::Script {
            message: format!("{} is not defined", name),
            stack: String::new(),
        })?;
        Ok(self.runtime.call(&function, args)?)
    }

    /// Shut down, reporting an exception nobody has seen yet
    pub fn finish(self) -> Result<()> {
        match self.runtime.take_pending() {
            Some(err) => {
                error!(error = %err, "Script exception pending at shutdown");
                Err(err.into())
            }
            None => Ok(()),
        }
    }
}

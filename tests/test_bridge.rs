//! Extension bridge tests against a scripted fake engine
//!
//! The fake engine runs Rust closures in place of script functions. Scripts
//! are looked up by their source text, so "evaluating" a source runs the
//! closure registered under that name.

use slinger::bridge::{
    Capabilities, ExceptionHandler, ExtensionBridge, FunctionRef, HostDispatch, HostObject,
    ScriptEngine, ScriptException, ScriptResult, ScriptValue,
};
use slinger::config::OverlayConfig;
use slinger::macos::accessibility::{InMemoryAccessibilityProvider, InMemoryWindow};
use slinger::macos::core_graphics::InMemoryDisplayProvider;
use slinger::models::geometry::{GlobalRect, ScriptRect};
use slinger::models::input::{keys, native, ModifierFlags};
use slinger::models::screen::{ScreenId, ScreenInfo};
use slinger::models::window::{ApplicationInfo, ProcessId};
use slinger::services::WindowService;
use slinger::ui::{DisplayItem, NativeEvent, OverlaySession, RecordingOverlayHost, Scene};
use slinger::SlingerError;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

type NativeFunction = Rc<dyn Fn(&FakeEngine, &ScriptValue, &[ScriptValue]) -> ScriptResult<ScriptValue>>;
type Script = Rc<dyn Fn(&FakeEngine) -> ScriptResult<ScriptValue>>;

#[derive(Default)]
struct FakeEngine {
    handler: RefCell<Option<ExceptionHandler>>,
    host: RefCell<Option<Rc<dyn HostDispatch>>>,
    globals: RefCell<HashMap<String, ScriptValue>>,
    functions: RefCell<Vec<NativeFunction>>,
    scripts: RefCell<HashMap<String, Script>>,
    /// Also hand in-call exceptions to the handler, as some engines do
    reports_in_call: Cell<bool>,
}

impl FakeEngine {
    fn add_script<F>(&self, source: &str, script: F)
    where
        F: Fn(&FakeEngine) -> ScriptResult<ScriptValue> + 'static,
    {
        self.scripts
            .borrow_mut()
            .insert(source.to_string(), Rc::new(script));
    }

    fn define<F>(&self, function: F) -> ScriptValue
    where
        F: Fn(&FakeEngine, &ScriptValue, &[ScriptValue]) -> ScriptResult<ScriptValue> + 'static,
    {
        let mut functions = self.functions.borrow_mut();
        functions.push(Rc::new(function));
        ScriptValue::Function(FunctionRef(functions.len() as u64 - 1))
    }

    fn set_global(&self, name: &str, value: ScriptValue) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    fn host_call(&self, target: &ScriptValue, method: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        let host = self
            .host
            .borrow()
            .clone()
            .ok_or_else(|| ScriptException::new("no host installed"))?;
        let object = target
            .as_host()
            .ok_or_else(|| ScriptException::new(format!("{} called on a non-host value", method)))?;
        host.invoke(object, method, args)
    }

    /// An exception thrown outside any call, e.g. from a timer
    fn raise_uncaught(&self, exception: ScriptException) {
        if let Some(handler) = self.handler.borrow().as_ref() {
            handler(exception);
        }
    }

    fn run(&self, function: &ScriptValue, this: &ScriptValue, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        let native = match function {
            ScriptValue::Function(FunctionRef(index)) => self.functions.borrow().get(*index as usize).cloned(),
            _ => None,
        }
        .ok_or_else(|| ScriptException::new("value is not a function"))?;

        let result = native(self, this, args);
        if let Err(exception) = &result {
            if self.reports_in_call.get() {
                self.raise_uncaught(exception.clone());
            }
        }
        result
    }
}

impl ScriptEngine for FakeEngine {
    fn install_exception_handler(&self, handler: ExceptionHandler) {
        *self.handler.borrow_mut() = Some(handler);
    }

    fn install_host(&self, host: Rc<dyn HostDispatch>) {
        *self.host.borrow_mut() = Some(host);
    }

    fn evaluate(&self, source: &str) -> ScriptResult<ScriptValue> {
        let script = self
            .scripts
            .borrow()
            .get(source)
            .cloned()
            .ok_or_else(|| ScriptException::new(format!("SyntaxError: cannot parse {}", source)))?;
        script(self)
    }

    fn global(&self, name: &str) -> Option<ScriptValue> {
        self.globals.borrow().get(name).cloned()
    }

    fn call(&self, function: &ScriptValue, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        self.run(function, &ScriptValue::Undefined, args)
    }

    fn call_method(&self, object: &ScriptValue, name: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        if object.as_host().is_some() {
            return self.host_call(object, name, args);
        }
        let function = self
            .property(object, name)
            .ok_or_else(|| ScriptException::new(format!("TypeError: {} is not a function", name)))?;
        self.run(&function, object, args)
    }

    fn property(&self, object: &ScriptValue, name: &str) -> Option<ScriptValue> {
        match object {
            ScriptValue::Host(target) => {
                let host = self.host.borrow().clone()?;
                host.get(target, name)
            }
            other => other.get(name).cloned(),
        }
    }
}

fn system() -> ScriptValue {
    HostObject::System.into()
}

const PICKER: &str = "picker.js";

/// What the picker script recorded while running
#[derive(Default)]
struct ScriptLog {
    key_codes: RefCell<Vec<f64>>,
    draw_context: RefCell<Option<ScriptValue>>,
}

fn install_picker(engine: &FakeEngine, log: Rc<ScriptLog>) {
    engine.add_script(PICKER, move |engine| {
        let keys_log = log.clone();
        let on_key = engine.define(move |engine, _this, args| {
            let event = args.get(1).cloned().unwrap_or_default();
            let code = engine.host_call(&event, "get_key_code", &[])?;
            keys_log.record_key(code.as_f64().unwrap_or(-1.0));
            Ok(ScriptValue::Bool(true))
        });

        let draw_log = log.clone();
        let on_draw = engine.define(move |engine, _this, args| {
            let ctx = args.get(1).cloned().unwrap_or_default();
            engine.host_call(&ctx, "setSourceRGBA", &[1.0.into(), 0.0.into(), 0.0.into(), 1.0.into()])?;
            engine.host_call(&ctx, "rectangle", &[0.into(), 0.into(), 10.into(), 10.into()])?;
            engine.host_call(&ctx, "fill", &[])?;
            *draw_log.draw_context.borrow_mut() = Some(ctx);
            Ok(ScriptValue::Undefined)
        });

        let show_ui = engine.define(move |engine, _this, args| {
            let root = args.first().cloned().unwrap_or_default();
            let anchor = args
                .get(1)
                .and_then(ScriptValue::as_point)
                .ok_or_else(|| ScriptException::new("anchor missing"))?;

            let menu = engine.host_call(&system(), "newClutterActor", &[])?;
            engine.host_call(&menu, "set_position", &[anchor.x.into(), anchor.y.into()])?;
            engine.host_call(&menu, "set_size", &[200.into(), 100.into()])?;
            let color = engine.host_call(
                &system(),
                "newClutterColor",
                &[ScriptValue::object([("red", 30.into()), ("alpha", 255.into())])],
            )?;
            engine.host_call(&menu, "set_background_color", &[color])?;

            let canvas = engine.host_call(&system(), "newClutterCanvas", &[])?;
            engine.host_call(&menu, "set_content", &[canvas.clone()])?;
            engine.host_call(&canvas, "connect", &["draw".into(), on_draw.clone()])?;

            engine.host_call(&root, "add_actor", &[menu.clone()])?;
            engine.host_call(&root, "connect", &["key-press-event".into(), on_key.clone()])?;
            engine.host_call(&root, "grab_key_focus", &[])?;
            Ok(menu)
        });

        let tile_left = engine.define(|engine, _this, _args| {
            let windows = engine.host_call(&system(), "visibleWindows", &[])?;
            let current = match &windows {
                ScriptValue::Array(items) => items.first().cloned().unwrap_or_default(),
                _ => ScriptValue::Null,
            };
            if current.is_nullish() {
                return Ok(ScriptValue::Bool(false));
            }
            let area = engine
                .host_call(&system(), "workspaceArea", &[])?
                .as_rect()
                .ok_or_else(|| ScriptException::new("no workspace"))?;
            let left_half = ScriptRect::from_xywh(0, 0, area.width() / 2, area.height());
            engine.host_call(&system(), "moveResize", &[current, ScriptValue::from_rect(left_half)])?;
            Ok(ScriptValue::Bool(true))
        });

        let broken = engine.define(|_engine, _this, _args| {
            Err(ScriptException::new("TypeError: undefined is not an object").with_stack("broken@picker.js:12"))
        });

        let make_extension = engine.define(move |_engine, _this, _args| {
            Ok(ScriptValue::object([
                ("show_ui", show_ui.clone()),
                (
                    "actions",
                    ScriptValue::object([("tile_left", tile_left.clone()), ("broken", broken.clone())]),
                ),
            ]))
        });
        engine.set_global("makeExtension", make_extension);

        let ping = engine.define(|_engine, _this, _args| Ok("pong".into()));
        engine.set_global("ping", ping);
        Ok(ScriptValue::Undefined)
    });
}

impl ScriptLog {
    fn record_key(&self, code: f64) {
        self.key_codes.borrow_mut().push(code);
    }
}

const EDITOR: ProcessId = ProcessId(100);

struct Fixture {
    engine: Rc<FakeEngine>,
    accessibility: Arc<InMemoryAccessibilityProvider>,
    capabilities: Rc<Capabilities>,
    session: OverlaySession,
    log: Rc<ScriptLog>,
}

fn fixture() -> Fixture {
    let screen = ScreenInfo::new(
        ScreenId(1),
        GlobalRect::from_xywh(0, 0, 1440, 900),
        GlobalRect::from_xywh(0, 70, 1440, 805),
    );
    let accessibility = Arc::new(InMemoryAccessibilityProvider::new());
    let displays = Arc::new(InMemoryDisplayProvider::new_with(vec![screen]));
    let service = Arc::new(WindowService::new(accessibility.clone(), displays).unwrap());

    let scene = Scene::new(Rc::new(RecordingOverlayHost::new()));
    let session = OverlaySession::new(scene.clone(), service.clone(), &OverlayConfig::default());
    let capabilities = Rc::new(Capabilities::new(service, scene));

    let engine = Rc::new(FakeEngine::default());
    let log = Rc::new(ScriptLog::default());
    install_picker(&engine, log.clone());

    Fixture {
        engine,
        accessibility,
        capabilities,
        session,
        log,
    }
}

impl Fixture {
    fn load(&self) -> ExtensionBridge {
        ExtensionBridge::load(self.engine.clone(), PICKER, self.capabilities.clone())
            .expect("picker should load")
    }
}

fn script_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<SlingerError>() {
        Some(SlingerError::Script { message, .. }) => message.clone(),
        other => panic!("expected a script error, got {:?}", other),
    }
}

#[test]
fn load_builds_the_extension_from_make_extension() {
    let f = fixture();
    let bridge = f.load();
    assert!(bridge.extension().get("show_ui").is_some());
    assert!(bridge.extension().get("actions").is_some());
    assert!(bridge.finish().is_ok());
}

#[test]
fn load_fails_when_the_source_defines_no_factory() {
    let f = fixture();
    f.engine.add_script("empty.js", |_| Ok(ScriptValue::Undefined));
    let err = ExtensionBridge::load(f.engine.clone(), "empty.js", f.capabilities.clone()).unwrap_err();
    assert!(script_message(&err).contains("makeExtension"));
}

#[test]
fn load_fails_on_evaluation_errors() {
    let f = fixture();
    let err = ExtensionBridge::load(f.engine.clone(), "missing.js", f.capabilities.clone()).unwrap_err();
    assert!(script_message(&err).starts_with("SyntaxError"));
}

#[test]
fn show_builds_the_picker_in_a_fresh_overlay() {
    let mut f = fixture();
    let bridge = f.load();

    let menu = bridge.show(&mut f.session).unwrap();
    let menu = match menu {
        ScriptValue::Host(HostObject::Actor(id)) => id,
        other => panic!("expected an actor, got {:?}", other),
    };

    let root = f.session.root().expect("overlay should be shown");
    let scene = f.capabilities.scene();
    assert_eq!(scene.children(root), vec![menu]);
    // no current window: centre of the 1440x805 workspace
    assert_eq!(
        scene.position(menu),
        Some(slinger::models::geometry::ScriptPoint::new(720, 402))
    );
    assert_eq!(scene.focused(f.session.window().unwrap()), Some(root));
}

#[test]
fn key_presses_reach_script_handlers() {
    let mut f = fixture();
    let bridge = f.load();
    bridge.show(&mut f.session).unwrap();

    let consumed = f.session.handle_native(NativeEvent::KeyDown {
        key_code: native::J,
        flags: ModifierFlags::empty(),
    });
    assert_eq!(consumed.len(), 1);
    assert_eq!(*f.log.key_codes.borrow(), vec![f64::from(keys::J)]);
}

#[test]
fn draw_callbacks_record_commands_and_contexts_expire() {
    let mut f = fixture();
    let bridge = f.load();
    bridge.show(&mut f.session).unwrap();

    let items = f.session.render();
    let canvas_commands = items.iter().find_map(|item| match item {
        DisplayItem::Canvas { commands, .. } => Some(commands.len()),
        _ => None,
    });
    assert_eq!(canvas_commands, Some(3));

    let context = f.log.draw_context.borrow().clone().expect("draw should have run");
    let target = context.as_host().cloned().expect("context is a host object");
    assert!(f.capabilities.dispatch(&target, "fill", &[]).is_err());
}

#[test]
fn actions_move_the_current_window() {
    let f = fixture();
    f.accessibility
        .add_application(ApplicationInfo::new(EDITOR, "Editor", false));
    let window = f.accessibility.add_window(
        InMemoryWindow::new(EDITOR, GlobalRect::from_xywh(100, 375, 400, 300)).main(),
    );
    f.accessibility.set_frontmost(Some(EDITOR));

    let bridge = f.load();
    let moved = bridge.invoke_action("tile_left", &[]).unwrap();
    assert_eq!(moved, ScriptValue::Bool(true));

    assert_eq!(f.capabilities.service().flush().wait(), Ok(()));
    assert_eq!(
        f.accessibility.frame_of(window),
        Some(GlobalRect::from_xywh(0, 70, 720, 805))
    );
}

#[test]
fn unknown_actions_are_errors() {
    let f = fixture();
    let bridge = f.load();
    let err = bridge.invoke_action("teleport", &[]).unwrap_err();
    assert!(script_message(&err).contains("teleport"));
}

#[test]
fn exceptions_inside_a_call_fail_only_that_call() {
    let f = fixture();
    f.engine.reports_in_call.set(true);
    let bridge = f.load();

    let err = bridge.invoke_action("broken", &[]).unwrap_err();
    match err.downcast_ref::<SlingerError>() {
        Some(SlingerError::Script { message, stack }) => {
            assert_eq!(message, "TypeError: undefined is not an object");
            assert_eq!(stack, "broken@picker.js:12");
        }
        other => panic!("expected a script error, got {:?}", other),
    }

    assert_eq!(bridge.call_function("ping", &[]).unwrap(), ScriptValue::from("pong"));
    assert!(bridge.finish().is_ok());
}

#[test]
fn uncaught_exceptions_fail_the_next_call_exactly_once() {
    let f = fixture();
    let bridge = f.load();

    f.engine
        .raise_uncaught(ScriptException::new("timer failed").with_stack("tick@picker.js:40"));

    let err = bridge.call_function("ping", &[]).unwrap_err();
    assert_eq!(script_message(&err), "timer failed");
    assert_eq!(bridge.call_function("ping", &[]).unwrap(), ScriptValue::from("pong"));
    assert_eq!(bridge.call_function("ping", &[]).unwrap(), ScriptValue::from("pong"));
}

#[test]
fn finish_reports_an_unseen_exception() {
    let f = fixture();
    let bridge = f.load();
    f.engine.raise_uncaught(ScriptException::new("late failure"));

    let err = bridge.finish().unwrap_err();
    assert_eq!(script_message(&err), "late failure");
}

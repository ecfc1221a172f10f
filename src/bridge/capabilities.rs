//! The capability object scripts receive as `system`
//!
//! Method names follow what extensions already call (`currentWindow`,
//! `setSourceRGBA`, `set_position`, ...). Drawing and facade methods also
//! answer to their snake_case spelling.

use crate::bridge::engine::{HostDispatch, HostObject, ScriptException, ScriptResult, ScriptValue};
use crate::bridge::extension::ScriptRuntime;
use crate::models::color::Color;
use crate::models::input::SHIFT_MASK;
use crate::models::window::WindowHandle;
use crate::services::window_service::WindowService;
use crate::ui::canvas::{Operator, SharedDrawContext};
use crate::ui::scene_graph::{ActorId, Scene, SignalEvent, SignalHandler};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

static UNDEFINED: ScriptValue = ScriptValue::Undefined;

/// Drawing contexts alive for the duration of their draw callback
#[derive(Debug, Default)]
struct DrawContexts {
    next_id: Cell<u64>,
    live: RefCell<HashMap<u64, SharedDrawContext>>,
}

impl DrawContexts {
    fn register(&self, context: SharedDrawContext) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.live.borrow_mut().insert(id, context);
        id
    }

    fn release(&self, id: u64) {
        self.live.borrow_mut().remove(&id);
    }

    fn get(&self, id: u64) -> Option<SharedDrawContext> {
        self.live.borrow().get(&id).cloned()
    }
}

pub struct Capabilities {
    service: Arc<WindowService>,
    scene: Scene,
    runtime: RefCell<Weak<ScriptRuntime>>,
    contexts: Rc<DrawContexts>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("service", &self.service)
            .field("scene", &self.scene)
            .finish_non_exhaustive()
    }
}

impl Capabilities {
    pub fn new(service: Arc<WindowService>, scene: Scene) -> Self {
        Self {
            service,
            scene,
            runtime: RefCell::new(Weak::new()),
            contexts: Rc::new(DrawContexts::default()),
        }
    }

    pub fn service(&self) -> &Arc<WindowService> {
        &self.service
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Signal handlers call back into scripts through this runtime
    pub(crate) fn attach_runtime(&self, runtime: &Rc<ScriptRuntime>) {
        *self.runtime.borrow_mut() = Rc::downgrade(runtime);
    }

    /// Route a script method call on `target`
    pub fn dispatch(&self, target: &HostObject, method: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        match target {
            HostObject::System => self.system_method(method, args),
            HostObject::Clutter => match method {
                "grab_pointer" | "grab_keyboard" | "ungrab_pointer" | "ungrab_keyboard" => {
                    Ok(ScriptValue::Undefined)
                }
                _ => Err(unknown_method("Clutter", method)),
            },
            HostObject::Cairo => Err(unknown_method("Cairo", method)),
            HostObject::Window(_) => Err(unknown_method("window", method)),
            HostObject::Actor(actor) => self.actor_method(*actor, false, method, args),
            HostObject::Canvas(actor) => match method {
                "invalidate" => {
                    self.scene.invalidate(*actor);
                    Ok(ScriptValue::Undefined)
                }
                _ => self.actor_method(*actor, true, method, args),
            },
            HostObject::DrawContext(id) => self.draw_method(*id, method, args),
            HostObject::KeyEvent(event) => match method {
                "get_key_code" => Ok(ScriptValue::from(event.key_code() as f64)),
                "get_state" => Ok(ScriptValue::from(event.state() as f64)),
                _ => Err(unknown_method("key event", method)),
            },
            HostObject::MouseEvent(event) => match method {
                "get_coords" => {
                    let [x, y] = event.coords();
                    Ok(ScriptValue::from(vec![x, y]))
                }
                _ => Err(unknown_method("mouse event", method)),
            },
        }
    }

    /// Read a property of `target`
    pub fn property(&self, target: &HostObject, name: &str) -> Option<ScriptValue> {
        match (target, name) {
            (HostObject::System, "Clutter") => Some(HostObject::Clutter.into()),
            (HostObject::System, "Cairo") => Some(HostObject::Cairo.into()),
            (HostObject::Clutter, "EVENT_STOP") => Some(ScriptValue::Bool(true)),
            (HostObject::Clutter, "SHIFT_MASK") => Some(ScriptValue::from(SHIFT_MASK as f64)),
            (HostObject::Cairo, "CLEAR") => Some(ScriptValue::from(Operator::CLEAR_CODE)),
            _ => None,
        }
    }

    fn system_method(&self, method: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        let service = &self.service;
        let value: ScriptValue = match method {
            "currentWindow" | "current_window" => service.current_window().map(window_value).into(),
            "windowRect" | "window_rect" => {
                let window = window_arg(method, args, 0)?;
                service
                    .window_rect(&window)
                    .map_or(ScriptValue::Null, ScriptValue::from_rect)
            }
            "workspaceArea" | "workspace_area" => service
                .workspace_area()
                .map_or(ScriptValue::Null, ScriptValue::from_rect),
            "moveResize" | "move_resize" => {
                let window = window_arg(method, args, 0)?;
                let rect = arg(args, 1)
                    .as_rect()
                    .ok_or_else(|| bad_argument(method, 1, "a {pos, size} rect"))?;
                drop(service.move_resize(&window, rect));
                ScriptValue::Undefined
            }
            "maximize" => {
                drop(service.maximize(&window_arg(method, args, 0)?));
                ScriptValue::Undefined
            }
            "unmaximize" => {
                drop(service.unmaximize(&window_arg(method, args, 0)?));
                ScriptValue::Undefined
            }
            "getMaximized" | "get_maximized" => service.get_maximized(&window_arg(method, args, 0)?).into(),
            "visibleWindows" | "visible_windows" => {
                let (current, all) = service.visible_windows();
                ScriptValue::Array(vec![
                    current.map(window_value).into(),
                    all.into_iter().map(window_value).collect::<Vec<_>>().into(),
                ])
            }
            "minimizedWindows" | "minimized_windows" => service
                .minimized_windows()
                .into_iter()
                .map(window_value)
                .collect::<Vec<_>>()
                .into(),
            "activate" => {
                drop(service.activate(&window_arg(method, args, 0)?));
                ScriptValue::Undefined
            }
            "activateLater" | "activate_later" => {
                drop(service.activate_later(&window_arg(method, args, 0)?));
                ScriptValue::Undefined
            }
            "minimize" => {
                drop(service.minimize(&window_arg(method, args, 0)?));
                ScriptValue::Undefined
            }
            "unminimize" => {
                drop(service.unminimize(&window_arg(method, args, 0)?));
                ScriptValue::Undefined
            }
            "setWindowHidden" | "set_window_hidden" => {
                let window = window_arg(method, args, 0)?;
                let hidden = arg(args, 1)
                    .as_bool()
                    .ok_or_else(|| bad_argument(method, 1, "a boolean"))?;
                drop(service.set_window_hidden(&window, hidden));
                ScriptValue::Undefined
            }
            "stableSequence" | "stable_sequence" => service.stable_sequence(&window_arg(method, args, 0)?).into(),
            "windowTitle" | "window_title" => service.window_title(&window_arg(method, args, 0)?).into(),
            "newClutterColor" | "new_clutter_color" => color_value(color_from(arg(args, 0))),
            "newClutterActor" | "new_clutter_actor" => HostObject::Actor(self.scene.create_actor()).into(),
            "newClutterCanvas" | "new_clutter_canvas" => HostObject::Canvas(self.scene.create_canvas()).into(),
            "log" => {
                let message = arg(args, 0).as_str().map(str::to_string).unwrap_or_else(|| {
                    arg(args, 0).to_json().to_string()
                });
                info!(target: "slinger::extension", "{}", message);
                ScriptValue::Undefined
            }
            _ => return Err(unknown_method("system", method)),
        };
        Ok(value)
    }

    fn actor_method(
        &self,
        actor: ActorId,
        is_canvas: bool,
        method: &str,
        args: &[ScriptValue],
    ) -> ScriptResult<ScriptValue> {
        let scene = &self.scene;
        match method {
            "set_position" => scene.set_position(actor, int_arg(method, args, 0)?, int_arg(method, args, 1)?),
            "set_size" => scene.set_size(actor, int_arg(method, args, 0)?, int_arg(method, args, 1)?),
            "set_opacity" => {
                let opacity = number_arg(method, args, 0)?;
                scene.set_opacity(actor, opacity as i64);
            }
            "set_reactive" => scene.set_reactive(actor, arg(args, 0).as_bool().unwrap_or(true)),
            "add_actor" => scene.add_actor(actor, actor_arg(method, args, 0)?),
            "insert_child_above" => {
                let child = actor_arg(method, args, 0)?;
                let target = match arg(args, 1) {
                    value if value.is_nullish() => None,
                    _ => Some(actor_arg(method, args, 1)?),
                };
                scene.insert_child_above(actor, child, target);
            }
            "remove_child" => scene.remove_child(actor, actor_arg(method, args, 0)?),
            "set_background_color" => scene.set_background_color(actor, color_from(arg(args, 0))),
            "set_content" => scene.set_content(actor, actor_arg(method, args, 0)?),
            "grab_key_focus" => scene.grab_key_focus(actor),
            "hide" => scene.hide(actor),
            "show" => scene.show(actor),
            "connect" => {
                let signal = arg(args, 0)
                    .as_str()
                    .ok_or_else(|| bad_argument(method, 0, "a signal name"))?;
                let function = arg(args, 1).clone();
                if !matches!(function, ScriptValue::Function(_)) {
                    return Err(bad_argument(method, 1, "a function"));
                }
                let handler = self.signal_handler(is_canvas, signal, function);
                return Ok(scene.connect(actor, signal, handler).into());
            }
            _ => return Err(unknown_method("actor", method)),
        }
        Ok(ScriptValue::Undefined)
    }

    /// Wrap a script function as a scene handler. Failures are logged and
    /// the event counts as handled.
    fn signal_handler(&self, is_canvas: bool, signal: &str, function: ScriptValue) -> SignalHandler {
        let runtime = self.runtime.borrow().clone();
        let contexts = self.contexts.clone();
        let signal = signal.to_string();

        Box::new(move |_scene, actor, event| {
            let Some(runtime) = runtime.upgrade() else {
                debug!(%actor, "Script runtime gone, dropping event");
                return;
            };
            let receiver: ScriptValue = if is_canvas {
                HostObject::Canvas(actor).into()
            } else {
                HostObject::Actor(actor).into()
            };

            let mut context_id = None;
            let args = match event {
                SignalEvent::Motion(mouse) => vec![receiver, HostObject::MouseEvent(*mouse).into()],
                SignalEvent::ButtonPress(_) => vec![receiver],
                SignalEvent::Key(key) => vec![receiver, HostObject::KeyEvent(*key).into()],
                SignalEvent::Draw(context) => {
                    let id = contexts.register(context.clone());
                    context_id = Some(id);
                    vec![receiver, HostObject::DrawContext(id).into()]
                }
            };

            if let Err(err) = runtime.call(&function, &args) {
                error!(signal = %signal, %actor, error = %err, "Signal handler failed");
            }
            if let Some(id) = context_id {
                contexts.release(id);
            }
        })
    }

    fn draw_method(&self, id: u64, method: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        let context = self
            .contexts
            .get(id)
            .ok_or_else(|| ScriptException::new(format!("{}: drawing context is no longer valid", method)))?;
        let mut ctx = context.borrow_mut();
        let n = |index: usize| number_arg(method, args, index);

        match method {
            "fill" => ctx.fill(),
            "stroke" => ctx.stroke(),
            "clip" => ctx.clip(),
            "resetClip" | "reset_clip" => ctx.reset_clip(),
            "paint" => ctx.paint(),
            "save" => ctx.save(),
            "restore" => ctx.restore(),
            "rectangle" => ctx.rectangle(n(0)?, n(1)?, n(2)?, n(3)?),
            "arc" => ctx.arc(n(0)?, n(1)?, n(2)?, n(3)?, n(4)?),
            "rotate" => ctx.rotate(n(0)?),
            "translate" => ctx.translate(n(0)?, n(1)?),
            "setSourceRGBA" | "set_source_rgba" => ctx.set_source_rgba(n(0)?, n(1)?, n(2)?, n(3)?),
            "setLineWidth" | "set_line_width" => ctx.set_line_width(n(0)?),
            "setOperator" | "set_operator" => ctx.set_operator(n(0)? as i64),
            _ => return Err(unknown_method("drawing context", method)),
        }
        Ok(ScriptValue::Undefined)
    }
}

impl HostDispatch for Capabilities {
    fn get(&self, target: &HostObject, name: &str) -> Option<ScriptValue> {
        self.property(target, name)
    }

    fn invoke(&self, target: &HostObject, method: &str, args: &[ScriptValue]) -> ScriptResult<ScriptValue> {
        self.dispatch(target, method, args)
    }
}

fn arg(args: &[ScriptValue], index: usize) -> &ScriptValue {
    args.get(index).unwrap_or(&UNDEFINED)
}

fn number_arg(method: &str, args: &[ScriptValue], index: usize) -> ScriptResult<f64> {
    arg(args, index)
        .as_f64()
        .ok_or_else(|| bad_argument(method, index, "a number"))
}

fn int_arg(method: &str, args: &[ScriptValue], index: usize) -> ScriptResult<i32> {
    arg(args, index)
        .as_i32()
        .ok_or_else(|| bad_argument(method, index, "a number"))
}

fn window_arg(method: &str, args: &[ScriptValue], index: usize) -> ScriptResult<WindowHandle> {
    match arg(args, index) {
        ScriptValue::Host(HostObject::Window(handle)) => Ok(handle.clone()),
        _ => Err(bad_argument(method, index, "a window")),
    }
}

fn actor_arg(method: &str, args: &[ScriptValue], index: usize) -> ScriptResult<ActorId> {
    match arg(args, index) {
        ScriptValue::Host(HostObject::Actor(actor)) | ScriptValue::Host(HostObject::Canvas(actor)) => Ok(*actor),
        _ => Err(bad_argument(method, index, "an actor")),
    }
}

fn window_value(handle: WindowHandle) -> ScriptValue {
    HostObject::Window(handle).into()
}

/// Missing or non-numeric components read as 0
fn color_from(value: &ScriptValue) -> Color {
    let component = |name: &str| value.get(name).and_then(ScriptValue::as_f64).unwrap_or(0.0);
    Color::from_components(
        component("red"),
        component("green"),
        component("blue"),
        component("alpha"),
    )
}

fn color_value(color: Color) -> ScriptValue {
    ScriptValue::object([
        ("red", ScriptValue::from(i32::from(color.red))),
        ("green", ScriptValue::from(i32::from(color.green))),
        ("blue", ScriptValue::from(i32::from(color.blue))),
        ("alpha", ScriptValue::from(i32::from(color.alpha))),
    ])
}

fn unknown_method(receiver: &str, method: &str) -> ScriptException {
    warn!(receiver, method, "Unknown method called from script");
    ScriptException::new(format!("{} has no method '{}'", receiver, method))
}

fn bad_argument(method: &str, index: usize, expected: &str) -> ScriptException {
    ScriptException::new(format!("{}: argument {} must be {}", method, index, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macos::accessibility::InMemoryAccessibilityProvider;
    use crate::macos::core_graphics::InMemoryDisplayProvider;
    use crate::models::geometry::{GlobalRect, Size};
    use crate::models::input::{KeyEvent, KeyPhase};
    use crate::models::screen::{ScreenId, ScreenInfo};
    use crate::ui::canvas::DrawCommand;
    use crate::ui::overlay::RecordingOverlayHost;

    fn capabilities() -> Capabilities {
        let screen = ScreenInfo::new(
            ScreenId(1),
            GlobalRect::from_xywh(0, 0, 1920, 1080),
            GlobalRect::from_xywh(0, 0, 1920, 1080),
        );
        let service = WindowService::new(
            Arc::new(InMemoryAccessibilityProvider::new()),
            Arc::new(InMemoryDisplayProvider::new_with(vec![screen])),
        )
        .unwrap();
        Capabilities::new(Arc::new(service), Scene::new(Rc::new(RecordingOverlayHost::new())))
    }

    #[test]
    fn colors_default_missing_components_to_zero() {
        let caps = capabilities();
        let value = caps
            .dispatch(
                &HostObject::System,
                "newClutterColor",
                &[ScriptValue::object([("red", ScriptValue::from(200)), ("alpha", ScriptValue::from(255))])],
            )
            .unwrap();
        assert_eq!(color_from(&value), Color::rgba(200, 0, 0, 255));
    }

    #[test]
    fn clutter_and_cairo_constants() {
        let caps = capabilities();
        assert_eq!(caps.property(&HostObject::Clutter, "EVENT_STOP"), Some(ScriptValue::Bool(true)));
        assert_eq!(caps.property(&HostObject::Clutter, "SHIFT_MASK"), Some(ScriptValue::Number(1.0)));
        assert_eq!(caps.property(&HostObject::Cairo, "CLEAR"), Some(ScriptValue::Number(1.0)));
        assert_eq!(
            caps.dispatch(&HostObject::Clutter, "grab_keyboard", &[]),
            Ok(ScriptValue::Undefined)
        );
    }

    #[test]
    fn actors_are_created_and_sized_through_dispatch() {
        let caps = capabilities();
        let actor = caps.dispatch(&HostObject::System, "newClutterActor", &[]).unwrap();
        let id = match actor {
            ScriptValue::Host(HostObject::Actor(id)) => id,
            other => panic!("unexpected {:?}", other),
        };
        caps.dispatch(&HostObject::Actor(id), "set_size", &[ScriptValue::from(30.7), ScriptValue::from(40)])
            .unwrap();
        assert_eq!(caps.scene().size(id), Some(Size::new(30, 40)));
    }

    #[test]
    fn bad_arguments_raise_exceptions() {
        let caps = capabilities();
        let err = caps
            .dispatch(&HostObject::System, "windowRect", &[ScriptValue::from("nope")])
            .unwrap_err();
        assert!(err.message.contains("must be a window"));
        assert!(caps.dispatch(&HostObject::System, "teleport", &[]).is_err());
    }

    #[test]
    fn event_accessors() {
        let caps = capabilities();
        let key = HostObject::KeyEvent(KeyEvent {
            phase: KeyPhase::Press,
            code: 44,
            state: SHIFT_MASK,
        });
        assert_eq!(caps.dispatch(&key, "get_key_code", &[]), Ok(ScriptValue::Number(44.0)));
        assert_eq!(caps.dispatch(&key, "get_state", &[]), Ok(ScriptValue::Number(1.0)));
    }

    #[test]
    fn drawing_requires_a_live_context() {
        let caps = capabilities();
        assert!(caps.dispatch(&HostObject::DrawContext(7), "fill", &[]).is_err());

        let context: SharedDrawContext = Rc::new(RefCell::new(crate::ui::canvas::DrawContext::new(Size::new(5, 5))));
        let id = caps.contexts.register(context.clone());
        caps.dispatch(&HostObject::DrawContext(id), "setOperator", &[ScriptValue::from(1)])
            .unwrap();
        caps.dispatch(&HostObject::DrawContext(id), "reset_clip", &[]).unwrap();
        assert_eq!(
            context.borrow().commands(),
            &[DrawCommand::SetOperator(Operator::Clear), DrawCommand::ResetClip]
        );
    }
}

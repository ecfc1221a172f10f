//! Retained-mode actor tree rendered into overlay windows
//!
//! Actors live in an arena owned by [`Scene`] and are addressed by
//! [`ActorId`]. Positions are relative to the parent actor in script axis
//! convention (origin top-left, Y down); because every overlay window covers
//! exactly a screen's usable area, window-local coordinates and
//! script-workspace coordinates coincide.
//!
//! Event handlers may call back into the scene. They are taken out of the
//! arena while they run, so no borrow of the scene state is held across a
//! callback.

use crate::models::color::Color;
use crate::models::geometry::{GlobalRect, ScriptPoint, ScriptRect, Size};
use crate::models::input::{KeyEvent, KeyPhase, MouseEvent};
use crate::ui::canvas::{DrawCommand, DrawContext, SharedDrawContext};
use crate::ui::overlay::{OverlayHost, OverlayWindowId};
use crate::Result;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Handle to an actor in a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor-{}", self.0)
    }
}

/// Event kinds an actor can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Motion,
    ButtonPress,
    KeyPress,
    KeyRelease,
    Draw,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Motion => "motion-event",
            Signal::ButtonPress => "button-press-event",
            Signal::KeyPress => "key-press-event",
            Signal::KeyRelease => "key-release-event",
            Signal::Draw => "draw",
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "motion-event" => Ok(Signal::Motion),
            "button-press-event" => Ok(Signal::ButtonPress),
            "key-press-event" => Ok(Signal::KeyPress),
            "key-release-event" => Ok(Signal::KeyRelease),
            "draw" => Ok(Signal::Draw),
            other => Err(format!("Unknown signal: {}", other)),
        }
    }
}

/// Payload delivered to a signal handler
#[derive(Debug, Clone)]
pub enum SignalEvent {
    Motion(MouseEvent),
    ButtonPress(MouseEvent),
    Key(KeyEvent),
    Draw(SharedDrawContext),
}

impl SignalEvent {
    pub fn signal(&self) -> Signal {
        match self {
            SignalEvent::Motion(_) => Signal::Motion,
            SignalEvent::ButtonPress(_) => Signal::ButtonPress,
            SignalEvent::Key(event) => match event.phase {
                KeyPhase::Press => Signal::KeyPress,
                KeyPhase::Release => Signal::KeyRelease,
            },
            SignalEvent::Draw(_) => Signal::Draw,
        }
    }
}

/// Callback bound to one signal of one actor
pub type SignalHandler = Box<dyn FnMut(&Scene, ActorId, &SignalEvent)>;

/// Pointer input already translated into window-local script coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Motion,
    ButtonPress,
}

/// One entry of a rendered display list, in window-local script coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayItem {
    Fill {
        actor: ActorId,
        rect: ScriptRect,
        color: Color,
        opacity: f64,
    },
    Canvas {
        actor: ActorId,
        origin: ScriptPoint,
        size: Size,
        opacity: f64,
        commands: Vec<DrawCommand>,
    },
}

struct ActorNode {
    parent: Option<ActorId>,
    /// Back to front: the last child is drawn on top
    children: Vec<ActorId>,
    position: ScriptPoint,
    size: Size,
    explicit_size: bool,
    visible: bool,
    opacity: u8,
    background: Option<Color>,
    is_canvas: bool,
    handlers: HashMap<Signal, SignalHandler>,
    /// Set only on the root actor of an overlay window
    root_of: Option<OverlayWindowId>,
}

impl ActorNode {
    fn new(is_canvas: bool) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            position: ScriptPoint::origin(),
            size: Size::default(),
            explicit_size: false,
            visible: true,
            opacity: u8::MAX,
            background: None,
            is_canvas,
            handlers: HashMap::new(),
            root_of: None,
        }
    }
}

struct WindowState {
    root: ActorId,
    focus: Option<ActorId>,
    tracking_motion: bool,
}

#[derive(Default)]
struct SceneState {
    next_id: u64,
    actors: HashMap<ActorId, ActorNode>,
    windows: HashMap<OverlayWindowId, WindowState>,
}

impl SceneState {
    fn allocate(&mut self, node: ActorNode) -> ActorId {
        self.next_id += 1;
        let id = ActorId(self.next_id);
        self.actors.insert(id, node);
        id
    }

    fn topmost(&self, mut actor: ActorId) -> ActorId {
        while let Some(parent) = self.actors.get(&actor).and_then(|node| node.parent) {
            actor = parent;
        }
        actor
    }

    fn window_of(&self, actor: ActorId) -> Option<OverlayWindowId> {
        let top = self.topmost(actor);
        self.actors.get(&top).and_then(|node| node.root_of)
    }

    /// Drop every actor that is not beneath an open window's root: strays
    /// that were never attached and subtrees detached with `remove_child`
    fn sweep_unattached(&mut self) -> usize {
        let unattached: Vec<ActorId> = self
            .actors
            .keys()
            .copied()
            .filter(|actor| self.window_of(*actor).is_none())
            .collect();
        for actor in &unattached {
            self.actors.remove(actor);
        }
        unattached.len()
    }

    fn is_ancestor(&self, ancestor: ActorId, mut actor: ActorId) -> bool {
        loop {
            if actor == ancestor {
                return true;
            }
            match self.actors.get(&actor).and_then(|node| node.parent) {
                Some(parent) => actor = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, child: ActorId) {
        let parent = self.actors.get_mut(&child).and_then(|node| node.parent.take());
        if let Some(parent) = parent.and_then(|p| self.actors.get_mut(&p)) {
            parent.children.retain(|c| *c != child);
        }
    }

    fn autosize_to_parent(&mut self, child: ActorId) {
        let parent_size = match self.actors.get(&child) {
            Some(node) if !node.explicit_size => node
                .parent
                .and_then(|p| self.actors.get(&p))
                .map(|p| p.size),
            _ => None,
        };
        if let Some(size) = parent_size {
            self.resize(child, size);
        }
    }

    /// Set the size and stretch every auto-sized descendant along with it
    fn resize(&mut self, actor: ActorId, size: Size) {
        let children = match self.actors.get_mut(&actor) {
            Some(node) => {
                node.size = size;
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            let auto = self
                .actors
                .get(&child)
                .map(|node| !node.explicit_size)
                .unwrap_or(false);
            if auto {
                self.resize(child, size);
            }
        }
    }

    fn subtree(&self, actor: ActorId) -> Vec<ActorId> {
        let mut out = Vec::new();
        let mut stack = vec![actor];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.actors.get(&next) {
                out.push(next);
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }

    /// Deepest visible actor whose bounds contain `point`, topmost first
    fn hit_test(&self, actor: ActorId, origin: ScriptPoint, point: ScriptPoint) -> Option<ActorId> {
        let node = self.actors.get(&actor)?;
        if !node.visible {
            return None;
        }
        let bounds = ScriptRect::new(origin, node.size);
        if !bounds.contains(point) {
            return None;
        }
        for child in node.children.iter().rev() {
            if let Some(child_node) = self.actors.get(child) {
                let child_origin = ScriptPoint::new(
                    origin.x + child_node.position.x,
                    origin.y + child_node.position.y,
                );
                if let Some(hit) = self.hit_test(*child, child_origin, point) {
                    return Some(hit);
                }
            }
        }
        Some(actor)
    }

    fn ancestors_inclusive(&self, actor: ActorId) -> Vec<ActorId> {
        let mut chain = vec![actor];
        let mut current = actor;
        while let Some(parent) = self.actors.get(&current).and_then(|node| node.parent) {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    fn wants_motion(&self, window: OverlayWindowId) -> bool {
        self.windows
            .get(&window)
            .map(|w| {
                self.subtree(w.root).iter().any(|actor| {
                    self.actors
                        .get(actor)
                        .map(|node| node.handlers.contains_key(&Signal::Motion))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}

/// Layout of one actor captured before rendering, so draw callbacks can run
/// without the scene borrowed
struct RenderEntry {
    actor: ActorId,
    origin: ScriptPoint,
    size: Size,
    opacity: f64,
    background: Option<Color>,
    is_canvas: bool,
}

/// Shared handle to the actor tree. Clones refer to the same scene.
#[derive(Clone)]
pub struct Scene {
    state: Rc<RefCell<SceneState>>,
    host: Rc<dyn OverlayHost>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scene")
            .field("actors", &state.actors.len())
            .field("windows", &state.windows.len())
            .finish()
    }
}

impl Scene {
    pub fn new(host: Rc<dyn OverlayHost>) -> Self {
        Self {
            state: Rc::new(RefCell::new(SceneState::default())),
            host,
        }
    }

    pub fn host(&self) -> &Rc<dyn OverlayHost> {
        &self.host
    }

    pub fn create_actor(&self) -> ActorId {
        self.state.borrow_mut().allocate(ActorNode::new(false))
    }

    pub fn create_canvas(&self) -> ActorId {
        self.state.borrow_mut().allocate(ActorNode::new(true))
    }

    /// Open a host window over `frame` and give it a root actor of the same size
    pub fn open_window(&self, frame: GlobalRect, background: Color) -> Result<(OverlayWindowId, ActorId)> {
        let window = self.host.open_window(frame, background)?;
        let mut state = self.state.borrow_mut();
        let mut node = ActorNode::new(false);
        node.size = frame.size;
        node.explicit_size = true;
        node.root_of = Some(window);
        let root = state.allocate(node);
        state.windows.insert(
            window,
            WindowState {
                root,
                focus: None,
                tracking_motion: false,
            },
        );
        info!(%window, %root, ?frame, "Overlay window opened");
        Ok((window, root))
    }

    /// Close the window and drop every actor beneath its root, along with
    /// any actor left outside an open window
    pub fn close_window(&self, window: OverlayWindowId) {
        let removed = {
            let mut state = self.state.borrow_mut();
            match state.windows.remove(&window) {
                Some(window_state) => {
                    for actor in state.subtree(window_state.root) {
                        state.actors.remove(&actor);
                    }
                    Some(state.sweep_unattached())
                }
                None => None,
            }
        };
        if let Some(swept) = removed {
            self.host.close_window(window);
            info!(%window, swept, "Overlay window closed");
        }
    }

    pub fn is_open(&self, window: OverlayWindowId) -> bool {
        self.state.borrow().windows.contains_key(&window)
    }

    pub fn root(&self, window: OverlayWindowId) -> Option<ActorId> {
        self.state.borrow().windows.get(&window).map(|w| w.root)
    }

    pub fn window_of(&self, actor: ActorId) -> Option<OverlayWindowId> {
        self.state.borrow().window_of(actor)
    }

    pub fn exists(&self, actor: ActorId) -> bool {
        self.state.borrow().actors.contains_key(&actor)
    }

    pub fn is_canvas(&self, actor: ActorId) -> bool {
        self.read(actor, |node| node.is_canvas).unwrap_or(false)
    }

    pub fn parent(&self, actor: ActorId) -> Option<ActorId> {
        self.read(actor, |node| node.parent).flatten()
    }

    pub fn children(&self, actor: ActorId) -> Vec<ActorId> {
        self.read(actor, |node| node.children.clone()).unwrap_or_default()
    }

    pub fn position(&self, actor: ActorId) -> Option<ScriptPoint> {
        self.read(actor, |node| node.position)
    }

    pub fn size(&self, actor: ActorId) -> Option<Size> {
        self.read(actor, |node| node.size)
    }

    pub fn opacity(&self, actor: ActorId) -> Option<u8> {
        self.read(actor, |node| node.opacity)
    }

    pub fn is_visible(&self, actor: ActorId) -> bool {
        self.read(actor, |node| node.visible).unwrap_or(false)
    }

    pub fn focused(&self, window: OverlayWindowId) -> Option<ActorId> {
        self.state.borrow().windows.get(&window).and_then(|w| w.focus)
    }

    /// Append `child` as the topmost child of `parent`
    pub fn add_actor(&self, parent: ActorId, child: ActorId) {
        self.attach(parent, child, None);
    }

    /// Insert `child` directly above `target`; no target means topmost
    pub fn insert_child_above(&self, parent: ActorId, child: ActorId, target: Option<ActorId>) {
        self.attach(parent, child, target);
    }

    fn attach(&self, parent: ActorId, child: ActorId, above: Option<ActorId>) {
        let window = {
            let mut state = self.state.borrow_mut();
            if !state.actors.contains_key(&parent) || !state.actors.contains_key(&child) {
                warn!(%parent, %child, "Cannot attach unknown actor");
                return;
            }
            let child_is_root = state.actors.get(&child).and_then(|n| n.root_of).is_some();
            if child_is_root || state.is_ancestor(child, parent) {
                warn!(%parent, %child, "Refusing to attach actor beneath itself");
                return;
            }

            state.detach(child);
            if let Some(node) = state.actors.get_mut(&parent) {
                let index = above
                    .and_then(|target| node.children.iter().position(|c| *c == target))
                    .map(|i| i + 1)
                    .unwrap_or(node.children.len());
                node.children.insert(index, child);
            }
            if let Some(node) = state.actors.get_mut(&child) {
                node.parent = Some(parent);
            }
            state.autosize_to_parent(child);
            debug!(%parent, %child, ?above, "Actor attached");
            state.window_of(parent)
        };

        if let Some(window) = window {
            self.sync_motion_tracking(window);
            self.host.request_redraw(window);
        }
    }

    /// Detach `child` from `parent`. Removing a window's root actor closes
    /// the window instead.
    pub fn remove_child(&self, parent: ActorId, child: ActorId) {
        let (root_of, window) = {
            let state = self.state.borrow();
            (
                state.actors.get(&child).and_then(|n| n.root_of),
                state.window_of(child),
            )
        };
        if let Some(window) = root_of {
            debug!(%window, "Removing root actor; closing window");
            self.close_window(window);
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            if state.actors.get(&child).and_then(|n| n.parent) != Some(parent) {
                debug!(%parent, %child, "Actor is not a child; nothing to remove");
                return;
            }
            state.detach(child);
            for window_state in state.windows.values_mut() {
                if window_state.focus == Some(child) {
                    window_state.focus = None;
                }
            }
        }
        if let Some(window) = window {
            self.host.request_redraw(window);
        }
    }

    pub fn set_position(&self, actor: ActorId, x: i32, y: i32) {
        self.update(actor, |node| node.position = ScriptPoint::new(x, y));
    }

    /// Sizes set here survive later parent resizes
    pub fn set_size(&self, actor: ActorId, width: i32, height: i32) {
        let found = {
            let mut state = self.state.borrow_mut();
            match state.actors.get_mut(&actor) {
                Some(node) => {
                    node.explicit_size = true;
                    true
                }
                None => false,
            }
        };
        if found {
            self.state.borrow_mut().resize(actor, Size::new(width, height));
            self.invalidate(actor);
        } else {
            warn!(%actor, "set_size on unknown actor");
        }
    }

    /// 0 is fully transparent, 255 fully opaque; out-of-range values clamp
    pub fn set_opacity(&self, actor: ActorId, opacity: i64) {
        let opacity = opacity.clamp(0, i64::from(u8::MAX)) as u8;
        self.update(actor, |node| node.opacity = opacity);
    }

    /// Every actor already receives pointer events
    pub fn set_reactive(&self, _actor: ActorId, _reactive: bool) {}

    pub fn set_background_color(&self, actor: ActorId, color: Color) {
        self.update(actor, |node| node.background = Some(color));
    }

    /// Show `canvas` as the content of `actor`
    pub fn set_content(&self, actor: ActorId, canvas: ActorId) {
        self.add_actor(actor, canvas);
    }

    pub fn hide(&self, actor: ActorId) {
        self.update(actor, |node| node.visible = false);
    }

    pub fn show(&self, actor: ActorId) {
        self.update(actor, |node| node.visible = true);
    }

    /// Route keyboard input for the actor's window to `actor`
    pub fn grab_key_focus(&self, actor: ActorId) {
        let window = {
            let mut state = self.state.borrow_mut();
            let window = state.window_of(actor);
            if let Some(window_state) = window.and_then(|w| state.windows.get_mut(&w)) {
                window_state.focus = Some(actor);
            }
            window
        };
        match window {
            Some(window) => self.host.focus(window),
            None => warn!(%actor, "grab_key_focus: actor has no window"),
        }
    }

    /// Request a redraw of the window showing `actor`
    pub fn invalidate(&self, actor: ActorId) {
        if let Some(window) = self.window_of(actor) {
            self.host.request_redraw(window);
        }
    }

    /// Bind `handler` to `signal`, replacing any previous binding.
    /// Returns false for unknown signals and for `draw` on plain actors.
    pub fn connect(&self, actor: ActorId, signal: &str, handler: SignalHandler) -> bool {
        let signal = match signal.parse::<Signal>() {
            Ok(signal) => signal,
            Err(e) => {
                warn!(%actor, "{}", e);
                return false;
            }
        };

        let window = {
            let mut state = self.state.borrow_mut();
            let node = match state.actors.get_mut(&actor) {
                Some(node) => node,
                None => {
                    warn!(%actor, signal = signal.name(), "connect on unknown actor");
                    return false;
                }
            };
            if signal == Signal::Draw && !node.is_canvas {
                warn!(%actor, "Only canvases emit draw");
                return false;
            }
            node.handlers.insert(signal, handler);
            debug!(%actor, signal = signal.name(), "Handler connected");
            state.window_of(actor)
        };

        if let Some(window) = window {
            if signal == Signal::Motion {
                self.sync_motion_tracking(window);
            }
            if signal == Signal::Draw {
                self.host.request_redraw(window);
            }
        }
        true
    }

    /// Motion tracking is installed the first time anything in the window
    /// listens for it
    fn sync_motion_tracking(&self, window: OverlayWindowId) {
        let install = {
            let mut state = self.state.borrow_mut();
            let needed = state.wants_motion(window);
            match state.windows.get_mut(&window) {
                Some(window_state) if needed && !window_state.tracking_motion => {
                    window_state.tracking_motion = true;
                    true
                }
                _ => false,
            }
        };
        if install {
            debug!(%window, "Installing motion tracking");
            self.host.track_motion(window);
        }
    }

    pub fn is_tracking_motion(&self, window: OverlayWindowId) -> bool {
        self.state
            .borrow()
            .windows
            .get(&window)
            .map(|w| w.tracking_motion)
            .unwrap_or(false)
    }

    /// Deliver a pointer event at a window-local position. Returns the actor
    /// whose handler consumed it.
    pub fn dispatch_pointer(
        &self,
        window: OverlayWindowId,
        kind: PointerKind,
        position: ScriptPoint,
    ) -> Option<ActorId> {
        let target = {
            let state = self.state.borrow();
            let window_state = state.windows.get(&window)?;
            if kind == PointerKind::Motion && !window_state.tracking_motion {
                return None;
            }
            state.hit_test(window_state.root, ScriptPoint::origin(), position)?
        };
        let event = MouseEvent::new(position);
        let event = match kind {
            PointerKind::Motion => SignalEvent::Motion(event),
            PointerKind::ButtonPress => SignalEvent::ButtonPress(event),
        };
        self.bubble(target, &event)
    }

    /// Deliver a key event to the focused actor, or the root when nothing
    /// holds focus
    pub fn dispatch_key(&self, window: OverlayWindowId, event: KeyEvent) -> Option<ActorId> {
        let target = {
            let state = self.state.borrow();
            let window_state = state.windows.get(&window)?;
            window_state
                .focus
                .filter(|actor| state.actors.contains_key(actor))
                .unwrap_or(window_state.root)
        };
        self.bubble(target, &SignalEvent::Key(event))
    }

    fn bubble(&self, target: ActorId, event: &SignalEvent) -> Option<ActorId> {
        let chain = self.state.borrow().ancestors_inclusive(target);
        let signal = event.signal();
        chain
            .into_iter()
            .find(|actor| self.emit(*actor, signal, event))
    }

    /// Run the handler bound to `signal` on `actor`, if any
    fn emit(&self, actor: ActorId, signal: Signal, event: &SignalEvent) -> bool {
        let handler = self
            .state
            .borrow_mut()
            .actors
            .get_mut(&actor)
            .and_then(|node| node.handlers.remove(&signal));
        let mut handler = match handler {
            Some(handler) => handler,
            None => return false,
        };

        handler(self, actor, event);

        // keep a replacement bound while the handler ran
        if let Some(node) = self.state.borrow_mut().actors.get_mut(&actor) {
            node.handlers.entry(signal).or_insert(handler);
        }
        true
    }

    /// Produce the window's display list, back to front. Draw callbacks run
    /// with a fresh context for every canvas.
    pub fn render(&self, window: OverlayWindowId) -> Vec<DisplayItem> {
        let entries = {
            let state = self.state.borrow();
            let mut entries = Vec::new();
            if let Some(window_state) = state.windows.get(&window) {
                collect_render_entries(
                    &state,
                    window_state.root,
                    ScriptPoint::origin(),
                    1.0,
                    true,
                    &mut entries,
                );
            }
            entries
        };

        let mut items = Vec::new();
        for entry in entries {
            if let Some(color) = entry.background {
                items.push(DisplayItem::Fill {
                    actor: entry.actor,
                    rect: ScriptRect::new(entry.origin, entry.size),
                    color,
                    opacity: entry.opacity,
                });
            }
            if entry.is_canvas {
                let context: SharedDrawContext = Rc::new(RefCell::new(DrawContext::new(entry.size)));
                self.emit(entry.actor, Signal::Draw, &SignalEvent::Draw(context.clone()));
                let commands = context.borrow().commands().to_vec();
                items.push(DisplayItem::Canvas {
                    actor: entry.actor,
                    origin: entry.origin,
                    size: entry.size,
                    opacity: entry.opacity,
                    commands,
                });
            }
        }
        items
    }

    fn read<T>(&self, actor: ActorId, f: impl FnOnce(&ActorNode) -> T) -> Option<T> {
        self.state.borrow().actors.get(&actor).map(f)
    }

    fn update(&self, actor: ActorId, f: impl FnOnce(&mut ActorNode)) {
        let updated = self
            .state
            .borrow_mut()
            .actors
            .get_mut(&actor)
            .map(f)
            .is_some();
        if updated {
            self.invalidate(actor);
        } else {
            warn!(%actor, "Update on unknown actor ignored");
        }
    }
}

fn collect_render_entries(
    state: &SceneState,
    actor: ActorId,
    origin: ScriptPoint,
    inherited_opacity: f64,
    is_root: bool,
    out: &mut Vec<RenderEntry>,
) {
    let node = match state.actors.get(&actor) {
        Some(node) if node.visible => node,
        _ => return,
    };
    let origin = if is_root {
        origin
    } else {
        ScriptPoint::new(origin.x + node.position.x, origin.y + node.position.y)
    };
    let opacity = inherited_opacity * f64::from(node.opacity) / 255.0;
    out.push(RenderEntry {
        actor,
        origin,
        size: node.size,
        opacity,
        background: node.background,
        is_canvas: node.is_canvas,
    });
    for child in &node.children {
        collect_render_entries(state, *child, origin, opacity, false, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::input::{keys, KeyPhase};
    use crate::ui::overlay::{HostRequest, RecordingOverlayHost};
    use std::cell::Cell;

    fn scene_with_window() -> (Rc<RecordingOverlayHost>, Scene, OverlayWindowId, ActorId) {
        let host = Rc::new(RecordingOverlayHost::new());
        let scene = Scene::new(host.clone());
        let (window, root) = scene
            .open_window(GlobalRect::from_xywh(0, 0, 800, 600), Color::OVERLAY_BACKDROP)
            .unwrap();
        (host, scene, window, root)
    }

    #[test]
    fn children_stretch_to_parent_until_sized() {
        let (_host, scene, _window, root) = scene_with_window();
        let panel = scene.create_actor();
        scene.add_actor(root, panel);
        assert_eq!(scene.size(panel), Some(Size::new(800, 600)));

        let fixed = scene.create_actor();
        scene.set_size(fixed, 40, 30);
        let stretchy = scene.create_actor();
        scene.add_actor(panel, fixed);
        scene.add_actor(panel, stretchy);

        scene.set_size(panel, 200, 100);
        assert_eq!(scene.size(fixed), Some(Size::new(40, 30)));
        assert_eq!(scene.size(stretchy), Some(Size::new(200, 100)));
    }

    #[test]
    fn insert_above_target_or_on_top() {
        let (_host, scene, _window, root) = scene_with_window();
        let a = scene.create_actor();
        let b = scene.create_actor();
        let c = scene.create_actor();
        scene.add_actor(root, a);
        scene.add_actor(root, b);
        scene.insert_child_above(root, c, Some(a));
        assert_eq!(scene.children(root), vec![a, c, b]);

        scene.insert_child_above(root, a, None);
        assert_eq!(scene.children(root), vec![c, b, a]);
    }

    #[test]
    fn removing_root_closes_window() {
        let (host, scene, window, root) = scene_with_window();
        let child = scene.create_actor();
        scene.add_actor(root, child);

        scene.remove_child(root, root);
        assert!(!scene.is_open(window));
        assert!(!host.is_open(window));
        assert!(!scene.exists(child));
    }

    #[test]
    fn removing_a_plain_child_detaches_it() {
        let (host, scene, window, root) = scene_with_window();
        let child = scene.create_actor();
        scene.add_actor(root, child);
        scene.remove_child(root, child);
        assert!(scene.children(root).is_empty());
        assert!(scene.exists(child));
        assert!(host.is_open(window));
    }

    #[test]
    fn closing_a_window_frees_stray_and_detached_actors() {
        let (_host, scene, window, root) = scene_with_window();
        let stray = scene.create_actor();
        let panel = scene.create_actor();
        scene.add_actor(root, panel);
        let canvas = scene.create_canvas();
        scene.set_content(panel, canvas);
        let detached = scene.create_actor();
        let detached_child = scene.create_actor();
        scene.add_actor(panel, detached);
        scene.add_actor(detached, detached_child);
        scene.remove_child(panel, detached);

        scene.close_window(window);
        for actor in [root, stray, panel, canvas, detached, detached_child] {
            assert!(!scene.exists(actor), "{actor} outlived its window");
        }
    }

    #[test]
    fn closing_one_window_keeps_actors_of_another() {
        let (_host, scene, first, _) = scene_with_window();
        let (second, second_root) = scene
            .open_window(GlobalRect::from_xywh(0, 0, 400, 300), Color::OVERLAY_BACKDROP)
            .unwrap();
        let kept = scene.create_actor();
        scene.add_actor(second_root, kept);

        scene.close_window(first);
        assert!(scene.is_open(second));
        assert!(scene.exists(second_root));
        assert!(scene.exists(kept));
    }

    #[test]
    fn unknown_signals_are_rejected() {
        let (_host, scene, _window, root) = scene_with_window();
        assert!(!scene.connect(root, "scroll-event", Box::new(|_, _, _| {})));
        assert!(!scene.connect(root, "draw", Box::new(|_, _, _| {})));
    }

    #[test]
    fn motion_tracking_installs_once_on_first_subscription() {
        let (host, scene, window, root) = scene_with_window();
        assert!(!scene.is_tracking_motion(window));
        assert!(scene.dispatch_pointer(window, PointerKind::Motion, ScriptPoint::new(1, 1)).is_none());

        scene.connect(root, "motion-event", Box::new(|_, _, _| {}));
        scene.connect(root, "motion-event", Box::new(|_, _, _| {}));
        let installs = host
            .requests()
            .iter()
            .filter(|r| **r == HostRequest::TrackMotion(window))
            .count();
        assert_eq!(installs, 1);
        assert!(scene.is_tracking_motion(window));
    }

    #[test]
    fn pointer_hits_deepest_actor_and_bubbles() {
        let (_host, scene, window, root) = scene_with_window();
        let panel = scene.create_actor();
        scene.set_position(panel, 100, 100);
        scene.set_size(panel, 200, 200);
        scene.add_actor(root, panel);
        let tile = scene.create_actor();
        scene.set_position(tile, 10, 10);
        scene.set_size(tile, 50, 50);
        scene.add_actor(panel, tile);

        let hits = Rc::new(RefCell::new(Vec::new()));
        let log = hits.clone();
        scene.connect(
            panel,
            "button-press-event",
            Box::new(move |_, actor, event| {
                if let SignalEvent::ButtonPress(mouse) = event {
                    log.borrow_mut().push((actor, mouse.coords()));
                }
            }),
        );

        // inside the tile: no handler there, so the panel receives it
        let consumed = scene.dispatch_pointer(window, PointerKind::ButtonPress, ScriptPoint::new(120, 120));
        assert_eq!(consumed, Some(panel));
        assert_eq!(hits.borrow().as_slice(), &[(panel, [120, 120])]);

        // outside the panel: nobody listens
        assert!(scene
            .dispatch_pointer(window, PointerKind::ButtonPress, ScriptPoint::new(10, 10))
            .is_none());
    }

    #[test]
    fn hidden_actors_are_not_hit() {
        let (_host, scene, window, root) = scene_with_window();
        let top = scene.create_actor();
        scene.add_actor(root, top);
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        scene.connect(top, "button-press-event", Box::new(move |_, _, _| flag.set(true)));

        scene.hide(top);
        scene.dispatch_pointer(window, PointerKind::ButtonPress, ScriptPoint::new(5, 5));
        assert!(!hit.get());
        scene.show(top);
        scene.dispatch_pointer(window, PointerKind::ButtonPress, ScriptPoint::new(5, 5));
        assert!(hit.get());
    }

    #[test]
    fn keys_go_to_focus_then_root() {
        let (host, scene, window, root) = scene_with_window();
        let field = scene.create_actor();
        scene.add_actor(root, field);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        scene.connect(
            root,
            "key-press-event",
            Box::new(move |_, actor, event| {
                if let SignalEvent::Key(key) = event {
                    log.borrow_mut().push((actor, key.key_code()));
                }
            }),
        );

        let escape = KeyEvent {
            phase: KeyPhase::Press,
            code: keys::ESCAPE,
            state: 0,
        };
        assert_eq!(scene.dispatch_key(window, escape), Some(root));

        scene.grab_key_focus(field);
        assert!(host.requests().contains(&HostRequest::Focus(window)));
        assert_eq!(scene.focused(window), Some(field));
        // field has no handler; the key bubbles to the root
        assert_eq!(scene.dispatch_key(window, escape), Some(root));

        let release = KeyEvent {
            phase: KeyPhase::Release,
            ..escape
        };
        assert_eq!(scene.dispatch_key(window, release), None);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn handlers_can_mutate_the_scene() {
        let (_host, scene, window, root) = scene_with_window();
        scene.connect(
            root,
            "button-press-event",
            Box::new(|scene, actor, _| {
                let child = scene.create_actor();
                scene.add_actor(actor, child);
                scene.connect(actor, "button-press-event", Box::new(|_, _, _| {}));
            }),
        );
        scene.dispatch_pointer(window, PointerKind::ButtonPress, ScriptPoint::new(1, 1));
        assert_eq!(scene.children(root).len(), 1);

        // the rebinding made inside the first handler replaced it
        scene.dispatch_pointer(window, PointerKind::ButtonPress, ScriptPoint::new(1, 1));
        assert_eq!(scene.children(root).len(), 1);
    }

    #[test]
    fn render_skips_hidden_subtrees_and_multiplies_opacity() {
        let (_host, scene, window, root) = scene_with_window();
        let panel = scene.create_actor();
        scene.set_position(panel, 10, 20);
        scene.set_size(panel, 100, 50);
        scene.set_opacity(panel, 51);
        scene.set_background_color(panel, Color::rgba(255, 0, 0, 255));
        scene.add_actor(root, panel);

        let canvas = scene.create_canvas();
        scene.set_content(panel, canvas);
        scene.connect(
            canvas,
            "draw",
            Box::new(|_, _, event| {
                if let SignalEvent::Draw(ctx) = event {
                    let mut ctx = ctx.borrow_mut();
                    let size = ctx.size();
                    ctx.rectangle(0.0, 0.0, f64::from(size.width), f64::from(size.height));
                    ctx.fill();
                }
            }),
        );

        let hidden = scene.create_actor();
        scene.set_background_color(hidden, Color::rgba(0, 0, 255, 255));
        scene.add_actor(root, hidden);
        scene.hide(hidden);

        let items = scene.render(window);
        assert_eq!(items.len(), 2);
        match &items[0] {
            DisplayItem::Fill { rect, opacity, .. } => {
                assert_eq!(*rect, ScriptRect::from_xywh(10, 20, 100, 50));
                assert!((opacity - 0.2).abs() < 1e-9);
            }
            other => panic!("unexpected item {:?}", other),
        }
        match &items[1] {
            DisplayItem::Canvas {
                origin,
                size,
                commands,
                ..
            } => {
                assert_eq!(*origin, ScriptPoint::new(10, 20));
                assert_eq!(*size, Size::new(100, 50));
                assert_eq!(commands.len(), 2);
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn each_render_gets_a_fresh_context() {
        let (_host, scene, window, root) = scene_with_window();
        let canvas = scene.create_canvas();
        scene.add_actor(root, canvas);
        scene.connect(
            canvas,
            "draw",
            Box::new(|_, _, event| {
                if let SignalEvent::Draw(ctx) = event {
                    ctx.borrow_mut().paint();
                }
            }),
        );

        for _ in 0..2 {
            let items = scene.render(window);
            match &items[0] {
                DisplayItem::Canvas { commands, .. } => assert_eq!(commands, &[DrawCommand::Paint]),
                other => panic!("unexpected item {:?}", other),
            }
        }
    }

    #[test]
    fn grab_focus_without_window_is_ignored() {
        let (host, scene, _window, _root) = scene_with_window();
        host.clear_requests();
        let loose = scene.create_actor();
        scene.grab_key_focus(loose);
        assert!(host.requests().is_empty());
    }
}

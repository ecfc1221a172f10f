//! Cocoa overlay host: borderless translucent windows with a flipped content
//! view that forwards input and replays display lists through Core Graphics

use crate::models::color::Color;
use crate::models::geometry::{GlobalRect, Platform, Point, Workspace};
use crate::models::input::ModifierFlags;
use crate::ui::canvas::{DrawCommand, Operator};
use crate::ui::input::NativeEvent;
use crate::ui::overlay::{OverlayHost, OverlayWindowId};
use crate::ui::scene_graph::DisplayItem;
use crate::{Result, SlingerError};
use cocoa::appkit::{NSBackingStoreType, NSColor, NSWindow, NSWindowStyleMask};
use cocoa::base::{id, nil, BOOL, NO, YES};
use cocoa::foundation::{NSPoint, NSRect, NSSize, NSUInteger};
use core_graphics::base::CGFloat;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use objc::declare::ClassDecl;
use objc::runtime::{Class, Object, Sel};
use objc::{class, msg_send, sel, sel_impl};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Once;
use tracing::{debug, warn};

const VIEW_CLASS: &str = "SlingerOverlayView";
const WINDOW_CLASS: &str = "SlingerOverlayWindow";
const STATE_IVAR: &str = "_slingerState";

const TRACKING_MOUSE_MOVED: NSUInteger = 0x02;
const TRACKING_ACTIVE_ALWAYS: NSUInteger = 0x80;
const TRACKING_IN_VISIBLE_RECT: NSUInteger = 0x200;
const FLOATING_WINDOW_LEVEL: i64 = 3;

const BLEND_MODE_NORMAL: i32 = 0;
const BLEND_MODE_CLEAR: i32 = 16;

type CGContextRef = *mut c_void;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGContextSaveGState(c: CGContextRef);
    fn CGContextRestoreGState(c: CGContextRef);
    fn CGContextAddRect(c: CGContextRef, rect: CGRect);
    fn CGContextAddArc(
        c: CGContextRef,
        x: CGFloat,
        y: CGFloat,
        radius: CGFloat,
        start_angle: CGFloat,
        end_angle: CGFloat,
        clockwise: i32,
    );
    fn CGContextFillPath(c: CGContextRef);
    fn CGContextStrokePath(c: CGContextRef);
    fn CGContextClip(c: CGContextRef);
    fn CGContextFillRect(c: CGContextRef, rect: CGRect);
    fn CGContextGetClipBoundingBox(c: CGContextRef) -> CGRect;
    fn CGContextSetRGBFillColor(c: CGContextRef, r: CGFloat, g: CGFloat, b: CGFloat, a: CGFloat);
    fn CGContextSetRGBStrokeColor(c: CGContextRef, r: CGFloat, g: CGFloat, b: CGFloat, a: CGFloat);
    fn CGContextSetLineWidth(c: CGContextRef, width: CGFloat);
    fn CGContextTranslateCTM(c: CGContextRef, tx: CGFloat, ty: CGFloat);
    fn CGContextRotateCTM(c: CGContextRef, angle: CGFloat);
    fn CGContextSetBlendMode(c: CGContextRef, mode: i32);
    fn CGContextSetAlpha(c: CGContextRef, alpha: CGFloat);
}

type EventSink = Box<dyn FnMut(OverlayWindowId, NativeEvent)>;
type Renderer = Box<dyn FnMut(OverlayWindowId) -> Vec<DisplayItem>>;

/// Callbacks shared by every view the host creates
#[derive(Default)]
struct HostCallbacks {
    events: RefCell<Option<EventSink>>,
    renderer: RefCell<Option<Renderer>>,
}

/// Owned by a view through its state ivar
struct ViewState {
    window: OverlayWindowId,
    callbacks: Rc<HostCallbacks>,
}

struct NativeOverlay {
    window: id,
    view: id,
    state: *mut ViewState,
}

/// [`OverlayHost`] backed by AppKit. Main thread only.
pub struct CocoaOverlayHost {
    next_id: Cell<u64>,
    windows: RefCell<HashMap<OverlayWindowId, NativeOverlay>>,
    /// Closed windows are released on the next open, never from inside
    /// their own event handlers
    closed: RefCell<Vec<NativeOverlay>>,
    callbacks: Rc<HostCallbacks>,
}

impl CocoaOverlayHost {
    pub fn new() -> Self {
        Self {
            next_id: Cell::new(0),
            windows: RefCell::new(HashMap::new()),
            closed: RefCell::new(Vec::new()),
            callbacks: Rc::new(HostCallbacks::default()),
        }
    }

    /// Receives raw input from every overlay window
    pub fn set_event_sink<F>(&self, sink: F)
    where
        F: FnMut(OverlayWindowId, NativeEvent) + 'static,
    {
        *self.callbacks.events.borrow_mut() = Some(Box::new(sink));
    }

    /// Produces the display list painted on every redraw
    pub fn set_renderer<F>(&self, renderer: F)
    where
        F: FnMut(OverlayWindowId) -> Vec<DisplayItem> + 'static,
    {
        *self.callbacks.renderer.borrow_mut() = Some(Box::new(renderer));
    }

    fn release_closed(&self) {
        for overlay in self.closed.borrow_mut().drain(..) {
            unsafe {
                let _: () = msg_send![overlay.view, release];
                let _: () = msg_send![overlay.window, release];
                drop(Box::from_raw(overlay.state));
            }
        }
    }
}

impl Default for CocoaOverlayHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CocoaOverlayHost {
    fn drop(&mut self) {
        let open: Vec<OverlayWindowId> = self.windows.borrow().keys().copied().collect();
        for window in open {
            self.close_window(window);
        }
        self.release_closed();
    }
}

impl OverlayHost for CocoaOverlayHost {
    fn open_window(&self, frame: GlobalRect, background: Color) -> Result<OverlayWindowId> {
        self.release_closed();
        let (window_class, view_class) = overlay_classes()
            .ok_or_else(|| SlingerError::MacOSAPIError("overlay classes unavailable".to_string()))?;

        let id = OverlayWindowId(self.next_id.get() + 1);
        self.next_id.set(id.0);

        let content_rect = NSRect::new(
            NSPoint::new(f64::from(frame.x()), f64::from(frame.y())),
            NSSize::new(f64::from(frame.width()), f64::from(frame.height())),
        );
        let [red, green, blue, alpha] = background.unit_components();
        let state = Box::into_raw(Box::new(ViewState {
            window: id,
            callbacks: self.callbacks.clone(),
        }));

        let overlay = unsafe {
            let window: id = msg_send![window_class, alloc];
            let window = window.initWithContentRect_styleMask_backing_defer_(
                content_rect,
                NSWindowStyleMask::NSBorderlessWindowMask,
                NSBackingStoreType::NSBackingStoreBuffered,
                NO,
            );
            if window == nil {
                drop(Box::from_raw(state));
                return Err(SlingerError::MacOSAPIError("NSWindow init failed".to_string()).into());
            }
            let _: () = msg_send![window, setReleasedWhenClosed: NO];
            window.setOpaque_(NO);
            window.setBackgroundColor_(NSColor::colorWithRed_green_blue_alpha_(nil, red, green, blue, alpha));
            window.setLevel_(FLOATING_WINDOW_LEVEL);

            let bounds = NSRect::new(NSPoint::new(0.0, 0.0), content_rect.size);
            let view: id = msg_send![view_class, alloc];
            let view: id = msg_send![view, initWithFrame: bounds];
            (*view).set_ivar::<*mut c_void>(STATE_IVAR, state as *mut c_void);
            window.setContentView_(view);
            window.makeKeyAndOrderFront_(nil);

            NativeOverlay { window, view, state }
        };

        self.windows.borrow_mut().insert(id, overlay);
        debug!(window = %id, ?frame, "Native overlay window opened");
        Ok(id)
    }

    fn close_window(&self, window: OverlayWindowId) {
        let Some(overlay) = self.windows.borrow_mut().remove(&window) else {
            return;
        };
        unsafe {
            (*overlay.view).set_ivar::<*mut c_void>(STATE_IVAR, std::ptr::null_mut());
            let _: () = msg_send![overlay.window, orderOut: nil];
            let _: () = msg_send![overlay.window, close];
        }
        self.closed.borrow_mut().push(overlay);
        debug!(%window, "Native overlay window closed");
    }

    fn request_redraw(&self, window: OverlayWindowId) {
        if let Some(overlay) = self.windows.borrow().get(&window) {
            unsafe {
                let _: () = msg_send![overlay.view, setNeedsDisplay: YES];
            }
        }
    }

    fn focus(&self, window: OverlayWindowId) {
        if let Some(overlay) = self.windows.borrow().get(&window) {
            unsafe {
                overlay.window.makeKeyAndOrderFront_(nil);
                let accepted: BOOL = msg_send![overlay.window, makeFirstResponder: overlay.view];
                if accepted == NO {
                    warn!(%window, "Overlay view refused first responder");
                }
            }
        }
    }

    fn track_motion(&self, window: OverlayWindowId) {
        if let Some(overlay) = self.windows.borrow().get(&window) {
            unsafe {
                let _: () = msg_send![overlay.window, setAcceptsMouseMovedEvents: YES];
                let options = TRACKING_MOUSE_MOVED | TRACKING_ACTIVE_ALWAYS | TRACKING_IN_VISIBLE_RECT;
                let bounds: NSRect = msg_send![overlay.view, bounds];
                let area: id = msg_send![class!(NSTrackingArea), alloc];
                let area: id = msg_send![area,
                    initWithRect: bounds
                    options: options
                    owner: overlay.view
                    userInfo: nil];
                let _: () = msg_send![overlay.view, addTrackingArea: area];
                let _: () = msg_send![area, release];
            }
        }
    }
}

fn overlay_classes() -> Option<(&'static Class, &'static Class)> {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| unsafe {
        if let Some(mut decl) = ClassDecl::new(WINDOW_CLASS, class!(NSWindow)) {
            decl.add_method(
                sel!(canBecomeKeyWindow),
                can_become_key as extern "C" fn(&Object, Sel) -> BOOL,
            );
            decl.register();
        }
        if let Some(mut decl) = ClassDecl::new(VIEW_CLASS, class!(NSView)) {
            decl.add_ivar::<*mut c_void>(STATE_IVAR);
            decl.add_method(sel!(isFlipped), yes as extern "C" fn(&Object, Sel) -> BOOL);
            decl.add_method(sel!(acceptsFirstResponder), yes as extern "C" fn(&Object, Sel) -> BOOL);
            decl.add_method(sel!(drawRect:), draw_rect as extern "C" fn(&Object, Sel, NSRect));
            decl.add_method(sel!(mouseDown:), mouse_down as extern "C" fn(&Object, Sel, id));
            decl.add_method(sel!(mouseMoved:), mouse_moved as extern "C" fn(&Object, Sel, id));
            decl.add_method(sel!(keyDown:), key_down as extern "C" fn(&Object, Sel, id));
            decl.add_method(sel!(keyUp:), key_up as extern "C" fn(&Object, Sel, id));
            decl.add_method(sel!(flagsChanged:), flags_changed as extern "C" fn(&Object, Sel, id));
            decl.register();
        }
    });
    Some((Class::get(WINDOW_CLASS)?, Class::get(VIEW_CLASS)?))
}

extern "C" fn can_become_key(_this: &Object, _sel: Sel) -> BOOL {
    YES
}

extern "C" fn yes(_this: &Object, _sel: Sel) -> BOOL {
    YES
}

fn view_state(this: &Object) -> Option<&ViewState> {
    unsafe {
        let state: *mut c_void = *this.get_ivar(STATE_IVAR);
        (state as *const ViewState).as_ref()
    }
}

fn forward(this: &Object, event: NativeEvent) {
    let Some(state) = view_state(this) else {
        return;
    };
    match state.callbacks.events.try_borrow_mut() {
        Ok(mut sink) => {
            if let Some(sink) = sink.as_mut() {
                sink(state.window, event);
            }
        }
        Err(_) => debug!(window = %state.window, "Nested overlay event dropped"),
    }
}

/// Window coordinates, bottom-left origin; the window spans the workspace
fn location(event: id) -> Point<Platform, Workspace> {
    let point: NSPoint = unsafe { msg_send![event, locationInWindow] };
    Point::new(point.x.round() as i32, point.y.round() as i32)
}

fn key_parts(event: id) -> (u16, ModifierFlags) {
    unsafe {
        let key_code: u16 = msg_send![event, keyCode];
        let flags: NSUInteger = msg_send![event, modifierFlags];
        (key_code, ModifierFlags::from_bits_truncate(flags as u64))
    }
}

extern "C" fn mouse_down(this: &Object, _sel: Sel, event: id) {
    forward(this, NativeEvent::MouseDown {
        location: location(event),
    });
}

extern "C" fn mouse_moved(this: &Object, _sel: Sel, event: id) {
    forward(this, NativeEvent::MouseMoved {
        location: location(event),
    });
}

extern "C" fn key_down(this: &Object, _sel: Sel, event: id) {
    let (key_code, flags) = key_parts(event);
    forward(this, NativeEvent::KeyDown { key_code, flags });
}

extern "C" fn key_up(this: &Object, _sel: Sel, event: id) {
    let (key_code, flags) = key_parts(event);
    forward(this, NativeEvent::KeyUp { key_code, flags });
}

extern "C" fn flags_changed(this: &Object, _sel: Sel, event: id) {
    let (_, flags) = key_parts(event);
    forward(this, NativeEvent::FlagsChanged { flags });
}

extern "C" fn draw_rect(this: &Object, _sel: Sel, _dirty: NSRect) {
    let Some(state) = view_state(this) else {
        return;
    };
    let items = match state.callbacks.renderer.try_borrow_mut() {
        Ok(mut renderer) => match renderer.as_mut() {
            Some(render) => render(state.window),
            None => return,
        },
        Err(_) => {
            debug!(window = %state.window, "Nested redraw skipped");
            return;
        }
    };

    unsafe {
        let graphics: id = msg_send![class!(NSGraphicsContext), currentContext];
        if graphics == nil {
            warn!("No graphics context for overlay redraw");
            return;
        }
        let context: CGContextRef = msg_send![graphics, CGContext];
        if context.is_null() {
            return;
        }
        replay(context, &items);
    }
}

unsafe fn replay(c: CGContextRef, items: &[DisplayItem]) {
    for item in items {
        CGContextSaveGState(c);
        match item {
            DisplayItem::Fill {
                rect,
                color,
                opacity,
                ..
            } => {
                let [r, g, b, a] = color.unit_components();
                CGContextSetAlpha(c, *opacity);
                CGContextSetRGBFillColor(c, r, g, b, a);
                CGContextFillRect(c, cg_rect(f64::from(rect.x()), f64::from(rect.y()), rect.size.width, rect.size.height));
            }
            DisplayItem::Canvas {
                origin,
                size,
                opacity,
                commands,
                ..
            } => {
                CGContextSetAlpha(c, *opacity);
                CGContextTranslateCTM(c, f64::from(origin.x), f64::from(origin.y));
                CGContextAddRect(c, cg_rect(0.0, 0.0, size.width, size.height));
                CGContextClip(c);
                replay_commands(c, commands);
            }
        }
        CGContextRestoreGState(c);
    }
}

/// Source colour and line width as last set, for re-applying after a clip reset
#[derive(Clone, Copy)]
struct PenState {
    source: [CGFloat; 4],
    line_width: CGFloat,
    blend_mode: i32,
}

unsafe fn replay_commands(c: CGContextRef, commands: &[DrawCommand]) {
    let mut pen = PenState {
        source: [0.0, 0.0, 0.0, 1.0],
        line_width: 2.0,
        blend_mode: BLEND_MODE_NORMAL,
    };
    let mut save_depth = 0usize;
    let mut clip_depth = 0usize;

    let apply_pen = |pen: &PenState| {
        let [r, g, b, a] = pen.source;
        CGContextSetRGBFillColor(c, r, g, b, a);
        CGContextSetRGBStrokeColor(c, r, g, b, a);
        CGContextSetLineWidth(c, pen.line_width);
        CGContextSetBlendMode(c, pen.blend_mode);
    };
    apply_pen(&pen);

    for command in commands {
        match *command {
            DrawCommand::Rectangle {
                x,
                y,
                width,
                height,
            } => CGContextAddRect(c, CGRect::new(&CGPoint::new(x, y), &CGSize::new(width, height))),
            DrawCommand::Arc {
                x,
                y,
                radius,
                start,
                end,
            } => CGContextAddArc(c, x, y, radius, start, end, 0),
            DrawCommand::Fill => CGContextFillPath(c),
            DrawCommand::Stroke => CGContextStrokePath(c),
            // Clips nest in their own saved state so they can be dropped again
            DrawCommand::Clip => {
                CGContextSaveGState(c);
                clip_depth += 1;
                CGContextClip(c);
            }
            DrawCommand::ResetClip => {
                for _ in 0..clip_depth {
                    CGContextRestoreGState(c);
                }
                clip_depth = 0;
                apply_pen(&pen);
            }
            DrawCommand::Paint => CGContextFillRect(c, CGContextGetClipBoundingBox(c)),
            DrawCommand::Save => {
                CGContextSaveGState(c);
                save_depth += 1;
            }
            DrawCommand::Restore => {
                if save_depth > 0 {
                    CGContextRestoreGState(c);
                    save_depth -= 1;
                }
            }
            DrawCommand::Translate { x, y } => CGContextTranslateCTM(c, x, y),
            DrawCommand::Rotate { radians } => CGContextRotateCTM(c, radians),
            DrawCommand::SetSourceRgba {
                red,
                green,
                blue,
                alpha,
            } => {
                pen.source = [red, green, blue, alpha];
                apply_pen(&pen);
            }
            DrawCommand::SetLineWidth(width) => {
                pen.line_width = width;
                CGContextSetLineWidth(c, width);
            }
            DrawCommand::SetOperator(operator) => {
                pen.blend_mode = match operator {
                    Operator::Clear => BLEND_MODE_CLEAR,
                    Operator::Over => BLEND_MODE_NORMAL,
                };
                CGContextSetBlendMode(c, pen.blend_mode);
            }
        }
    }

    for _ in 0..(save_depth + clip_depth) {
        CGContextRestoreGState(c);
    }
}

fn cg_rect(x: f64, y: f64, width: i32, height: i32) -> CGRect {
    CGRect::new(
        &CGPoint::new(x, y),
        &CGSize::new(f64::from(width), f64::from(height)),
    )
}

//! Window directory and geometry service
//!
//! The only component that observes or mutates live window state. Reads run
//! synchronously on the caller's thread; every mutation is queued on a serial
//! worker and reported through a [`MutationTicket`]. Per-item accessibility
//! failures are logged and treated as "no data" so a single misbehaving
//! application never aborts an enumeration.

use crate::config::SlingerConfig;
use crate::macos::accessibility::{
    query, top_left, AccessibilityProvider, AttributeValue, AxError, PermissionStatus,
    WindowAttribute, STANDARD_WINDOW_SUBROLE, WINDOW_ROLE,
};
use crate::macos::core_graphics::DisplayProvider;
use crate::models::frame_cache::PreviousFrameCache;
use crate::models::geometry::{GlobalRect, ScriptPoint, ScriptRect};
use crate::models::screen::{assign_screen, ScreenGeometry, ScreenInfo};
use crate::models::window::{ProcessId, WindowHandle, WindowRef};
use crate::services::mutation_queue::{MutationQueue, MutationResult, MutationTicket, QueueState};
use crate::{trace_performance, Result, SlingerError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The screen placement targets, with its conversion pipeline
#[derive(Debug, Clone, Copy)]
pub struct TargetScreen {
    pub info: ScreenInfo,
    pub geometry: ScreenGeometry,
}

pub struct WindowService {
    accessibility: Arc<dyn AccessibilityProvider>,
    displays: Arc<dyn DisplayProvider>,
    queue: MutationQueue,
    maximize_tolerance: f64,
}

impl std::fmt::Debug for WindowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowService")
            .field("queue", &self.queue)
            .field("maximize_tolerance", &self.maximize_tolerance)
            .finish_non_exhaustive()
    }
}

impl WindowService {
    pub fn new(
        accessibility: Arc<dyn AccessibilityProvider>,
        displays: Arc<dyn DisplayProvider>,
    ) -> Result<Self> {
        Self::with_config(accessibility, displays, &SlingerConfig::default())
    }

    pub fn with_config(
        accessibility: Arc<dyn AccessibilityProvider>,
        displays: Arc<dyn DisplayProvider>,
        config: &SlingerConfig,
    ) -> Result<Self> {
        let queue = MutationQueue::spawn(
            config.mutation_queue_name.clone(),
            QueueState {
                frame_cache: PreviousFrameCache::new(config.frame_cache_capacity),
            },
        )?;
        info!(
            queue = queue.name(),
            frame_cache_capacity = config.frame_cache_capacity,
            "Window service ready"
        );

        Ok(Self {
            accessibility,
            displays,
            queue,
            maximize_tolerance: config.maximize_tolerance,
        })
    }

    fn has_permission(&self) -> bool {
        match self.accessibility.permission_status() {
            PermissionStatus::Granted => true,
            status => {
                warn!(?status, "Accessibility permission missing, window access disabled");
                false
            }
        }
    }

    /// Target screen queried live: the display that currently has focus
    pub fn target_screen(&self) -> Option<TargetScreen> {
        let main = match self.displays.main_screen() {
            Ok(Some(screen)) => screen,
            Ok(None) => {
                warn!("No main screen available");
                return None;
            }
            Err(err) => {
                warn!(error = %err, "Failed to query main screen");
                return None;
            }
        };
        let primary = match self.displays.primary_screen() {
            Ok(Some(primary)) => primary,
            Ok(None) => main,
            Err(err) => {
                warn!(error = %err, "Failed to query primary screen");
                return None;
            }
        };

        Some(TargetScreen {
            info: main,
            geometry: ScreenGeometry::new(&main, &primary),
        })
    }

    fn read(&self, description: &str, window: WindowRef, attribute: WindowAttribute) -> Option<AttributeValue> {
        query(description, self.accessibility.read_attribute(window, attribute)).flatten()
    }

    fn read_bool(&self, description: &str, handle: &WindowHandle, attribute: WindowAttribute) -> Option<bool> {
        self.read(description, handle.window_ref(), attribute)
            .and_then(|value| value.as_bool())
    }

    /// Memoized frame; the first call per handle hits the provider
    pub fn frame(&self, handle: &WindowHandle) -> Option<GlobalRect> {
        handle.frame_with(|| {
            self.read("frame", handle.window_ref(), WindowAttribute::Frame)
                .and_then(|value| value.as_rect())
        })
    }

    fn live_frame(&self, handle: &WindowHandle) -> Option<GlobalRect> {
        self.read("frame", handle.window_ref(), WindowAttribute::Frame)
            .and_then(|value| value.as_rect())
    }

    // Role absent or AXWindow, subrole absent or AXStandardWindow.
    // Attributes that fail to read exclude the window.
    fn is_normal_window(&self, window: WindowRef) -> bool {
        let text_matches = |attribute: WindowAttribute, expected: &str| {
            match self.accessibility.read_attribute(window, attribute) {
                Ok(None) => true,
                Ok(Some(AttributeValue::Text(value))) => value == expected,
                Ok(Some(_)) => false,
                Err(err) => {
                    debug!(?attribute, error = %err, "Unreadable window attribute");
                    false
                }
            }
        };
        text_matches(WindowAttribute::Role, WINDOW_ROLE)
            && text_matches(WindowAttribute::Subrole, STANDARD_WINDOW_SUBROLE)
    }

    /// Normal windows of every non-hidden application
    fn windows_from_visible_apps(&self) -> Vec<WindowHandle> {
        let applications = query(
            "running applications",
            self.accessibility.running_applications(),
        )
        .unwrap_or_default();

        let mut windows = Vec::new();
        for app in applications.iter().filter(|app| !app.is_hidden) {
            let Some(refs) = query(&app.name, self.accessibility.application_windows(app.pid)) else {
                continue;
            };
            windows.extend(
                refs.into_iter()
                    .filter(|window| self.is_normal_window(*window))
                    .map(|window| WindowHandle::new(app.pid, window)),
            );
        }
        windows
    }

    // A missing attribute means not minimized; a failed read yields none.
    fn is_minimized(&self, handle: &WindowHandle) -> Option<bool> {
        match self
            .accessibility
            .read_attribute(handle.window_ref(), WindowAttribute::Minimized)
        {
            Ok(value) => Some(value.and_then(|value| value.as_bool()).unwrap_or(false)),
            Err(err) => {
                debug!(pid = %handle.pid(), error = %err, "Unreadable minimized state");
                None
            }
        }
    }

    fn is_main(&self, handle: &WindowHandle) -> bool {
        self.read_bool("isMain", handle, WindowAttribute::Main)
            .unwrap_or(false)
    }

    /// The frontmost application's main window
    pub fn current_window(&self) -> Option<WindowHandle> {
        if !self.has_permission() {
            return None;
        }
        let frontmost = query(
            "frontmost application",
            self.accessibility.frontmost_application(),
        )
        .flatten()?;
        let windows = query(
            "frontmost windows",
            self.accessibility.application_windows(frontmost),
        )?;

        windows
            .into_iter()
            .map(|window| WindowHandle::new(frontmost, window))
            .find(|handle| self.is_main(handle))
    }

    /// The current window (if it is among them) and all normal, non-minimized
    /// windows on the target screen
    pub fn visible_windows(&self) -> (Option<WindowHandle>, Vec<WindowHandle>) {
        if !self.has_permission() {
            return (None, Vec::new());
        }
        let Some(target) = self.target_screen() else {
            return (None, Vec::new());
        };
        let screens = match self.displays.screens() {
            Ok(screens) => screens,
            Err(err) => {
                warn!(error = %err, "Failed to enumerate screens");
                return (None, Vec::new());
            }
        };

        let visible: Vec<WindowHandle> = trace_performance!("visible_windows", {
            self.windows_from_visible_apps()
                .into_iter()
                .filter(|handle| self.is_minimized(handle) == Some(false))
                .filter(|handle| {
                    self.frame(handle)
                        .and_then(|frame| assign_screen(&frame, &screens))
                        .is_some_and(|screen| screen.id == target.info.id)
                })
                .collect()
        });

        let frontmost = query(
            "frontmost application",
            self.accessibility.frontmost_application(),
        )
        .flatten();
        let current = frontmost.and_then(|pid| {
            visible
                .iter()
                .find(|handle| handle.pid() == pid && self.is_main(handle))
                .cloned()
        });

        debug!(count = visible.len(), has_current = current.is_some(), "Enumerated visible windows");
        (current, visible)
    }

    /// Minimized windows of non-hidden applications, on any screen
    pub fn minimized_windows(&self) -> Vec<WindowHandle> {
        if !self.has_permission() {
            return Vec::new();
        }
        trace_performance!("minimized_windows", {
            self.windows_from_visible_apps()
                .into_iter()
                .filter(|handle| self.is_minimized(handle) == Some(true))
                .collect()
        })
    }

    /// Memoized frame in script-workspace coordinates of the target screen
    pub fn window_rect(&self, handle: &WindowHandle) -> Option<ScriptRect> {
        let target = self.target_screen()?;
        self.frame(handle).map(|frame| target.geometry.to_script(frame))
    }

    /// The target screen's usable area, anchored at the script origin
    pub fn workspace_area(&self) -> Option<ScriptRect> {
        self.target_screen()
            .map(|target| target.geometry.script_workspace())
    }

    /// Where the picker is anchored: the current window's centre, else the
    /// workspace centre
    pub fn anchor_point(&self) -> Option<ScriptPoint> {
        if let Some(rect) = self.current_window().and_then(|handle| self.window_rect(&handle)) {
            return Some(rect.center());
        }
        self.workspace_area().map(|area| area.center())
    }

    fn refuse(&self, description: &'static str) -> Option<MutationTicket> {
        if !self.has_permission() {
            return Some(MutationTicket::failed(SlingerError::PermissionDenied(
                description.to_string(),
            )));
        }
        None
    }

    /// Move and resize to a script-space rect on the target screen
    pub fn move_resize(&self, handle: &WindowHandle, rect: ScriptRect) -> MutationTicket {
        if let Some(refused) = self.refuse("moveResize") {
            return refused;
        }
        let Some(target) = self.target_screen() else {
            return MutationTicket::failed(SlingerError::NoTargetScreen);
        };
        let frame = target.geometry.to_global(rect);
        let accessibility = self.accessibility.clone();
        let window = handle.window_ref();

        self.queue.submit("moveResize", move |_| {
            apply_frame("moveResize", accessibility.as_ref(), window, frame)
        })
    }

    /// Remember the current frame, then fill the target screen's usable area
    pub fn maximize(&self, handle: &WindowHandle) -> MutationTicket {
        if let Some(refused) = self.refuse("maximize") {
            return refused;
        }
        let Some(target) = self.target_screen() else {
            return MutationTicket::failed(SlingerError::NoTargetScreen);
        };
        let usable = target.info.usable_area;
        let accessibility = self.accessibility.clone();
        let window = handle.window_ref();
        let pid = handle.pid();

        self.queue.submit("maximize", move |state| {
            let current = query(
                "frame",
                accessibility.read_attribute(window, WindowAttribute::Frame),
            )
            .flatten()
            .and_then(|value| value.as_rect());
            if let Some(frame) = current {
                state.frame_cache.push(pid, frame);
            }
            apply_frame("maximize", accessibility.as_ref(), window, usable)
        })
    }

    /// Leave full screen and restore the frame remembered by [`maximize`],
    /// if any
    ///
    /// [`maximize`]: WindowService::maximize
    pub fn unmaximize(&self, handle: &WindowHandle) -> MutationTicket {
        if let Some(refused) = self.refuse("unmaximize") {
            return refused;
        }
        let accessibility = self.accessibility.clone();
        let window = handle.window_ref();
        let pid = handle.pid();

        self.queue.submit("unmaximize", move |state| {
            query(
                "unmaximize",
                accessibility.write_attribute(
                    window,
                    WindowAttribute::FullScreen,
                    AttributeValue::Bool(false),
                ),
            );
            match state.frame_cache.pop(pid) {
                Some(frame) => {
                    debug!(%pid, ?frame, "Restoring previous frame");
                    apply_frame("unmaximize", accessibility.as_ref(), window, frame)
                }
                None => {
                    debug!(%pid, "No previous frame to restore");
                    Ok(())
                }
            }
        })
    }

    /// Full screen, or within the configured tolerance of the usable area.
    /// A difference of exactly the tolerance still counts as maximized.
    pub fn get_maximized(&self, handle: &WindowHandle) -> bool {
        if !self.has_permission() {
            return false;
        }
        if self.read_bool("getMaximized", handle, WindowAttribute::FullScreen) == Some(true) {
            return true;
        }
        let Some(target) = self.target_screen() else {
            return false;
        };
        let Some(frame) = self.live_frame(handle) else {
            return false;
        };

        let workspace_area = target.info.usable_area.area();
        let window_area = frame.area();
        let tolerance = (self.maximize_tolerance * workspace_area as f64).floor() as i64;
        let difference = (workspace_area - window_area).abs();
        let maximized = difference <= tolerance;
        debug!(maximized, difference, tolerance, "Checked maximized state");
        maximized
    }

    /// Bring the owning application forward, then make the window main
    pub fn activate(&self, handle: &WindowHandle) -> MutationTicket {
        if let Some(refused) = self.refuse("activate") {
            return refused;
        }
        let accessibility = self.accessibility.clone();
        let window = handle.window_ref();
        let pid = handle.pid();

        self.queue.submit("activate", move |_| {
            accessibility
                .activate_application(pid)
                .map_err(|err| ax_failure("activate", err))?;
            debug!(%pid, "Activating window");
            accessibility
                .write_attribute(window, WindowAttribute::Main, AttributeValue::Bool(true))
                .map_err(|err| ax_failure("activate", err))
        })
    }

    /// Same as [`WindowService::activate`]; callers that want activation after
    /// the overlay has closed use this entry point
    pub fn activate_later(&self, handle: &WindowHandle) -> MutationTicket {
        self.activate(handle)
    }

    pub fn minimize(&self, handle: &WindowHandle) -> MutationTicket {
        self.set_flag("minimize", handle, WindowAttribute::Minimized, true)
    }

    pub fn unminimize(&self, handle: &WindowHandle) -> MutationTicket {
        self.set_flag("unminimize", handle, WindowAttribute::Minimized, false)
    }

    pub fn set_window_hidden(&self, handle: &WindowHandle, hidden: bool) -> MutationTicket {
        self.set_flag("setWindowHidden", handle, WindowAttribute::Hidden, hidden)
    }

    fn set_flag(
        &self,
        description: &'static str,
        handle: &WindowHandle,
        attribute: WindowAttribute,
        value: bool,
    ) -> MutationTicket {
        if let Some(refused) = self.refuse(description) {
            return refused;
        }
        let accessibility = self.accessibility.clone();
        let window = handle.window_ref();

        self.queue.submit(description, move |_| {
            accessibility
                .write_attribute(window, attribute, AttributeValue::Bool(value))
                .map_err(|err| ax_failure(description, err))
        })
    }

    /// Ordering key for windows with identical frames. Not unique and not
    /// stable across title changes.
    pub fn stable_sequence(&self, handle: &WindowHandle) -> i64 {
        let title_hash = self.window_title(handle).map_or(0, |title| {
            let mut hasher = DefaultHasher::new();
            title.hash(&mut hasher);
            hasher.finish() as i64
        });
        i64::from(handle.pid().0).wrapping_add(title_hash)
    }

    pub fn window_title(&self, handle: &WindowHandle) -> Option<String> {
        self.read("windowTitle", handle.window_ref(), WindowAttribute::Title)
            .and_then(|value| value.as_text().map(str::to_string))
    }

    pub fn owner(&self, handle: &WindowHandle) -> ProcessId {
        handle.pid()
    }

    /// Ticket that resolves once every mutation submitted so far has run
    pub fn flush(&self) -> MutationTicket {
        self.queue.flush()
    }
}

fn ax_failure(description: &str, err: AxError) -> SlingerError {
    match err {
        AxError::PermissionDenied => SlingerError::PermissionDenied(description.to_string()),
        AxError::ApplicationGone(_) | AxError::InvalidElement => {
            SlingerError::WindowUnavailable(format!("{description}: {err}"))
        }
        other => SlingerError::MacOSAPIError(format!("{description}: {other}")),
    }
}

// Size first so the move is not clamped by the old size near screen edges,
// then position, then size again in case the move clamped it.
fn apply_frame(
    description: &str,
    accessibility: &dyn AccessibilityProvider,
    window: WindowRef,
    frame: GlobalRect,
) -> MutationResult {
    let writes = [
        (WindowAttribute::Size, AttributeValue::Size(frame.size)),
        (WindowAttribute::Position, AttributeValue::Point(top_left(&frame))),
        (WindowAttribute::Size, AttributeValue::Size(frame.size)),
    ];
    for (attribute, value) in writes {
        accessibility
            .write_attribute(window, attribute, value)
            .map_err(|err| ax_failure(description, err))?;
    }
    Ok(())
}

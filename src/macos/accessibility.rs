use crate::models::geometry::{GlobalPoint, GlobalRect, Size};
use crate::models::window::{ApplicationInfo, ProcessId, WindowRef};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tracing::warn;

/// Failure reported by the accessibility API for a single item
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AxError {
    #[error("accessibility permission has not been granted")]
    PermissionDenied,

    #[error("application {0} is no longer running")]
    ApplicationGone(ProcessId),

    #[error("window element is no longer valid")]
    InvalidElement,

    #[error("attribute {0:?} is not supported")]
    AttributeUnsupported(WindowAttribute),

    #[error("accessibility request could not complete")]
    CannotComplete,

    #[error("accessibility error code {0}")]
    Platform(i32),
}

pub type AxResult<T> = std::result::Result<T, AxError>;

/// Tracks accessibility permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Unknown,
    Granted,
    Denied,
}

/// Window attributes the service reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowAttribute {
    Frame,
    /// Top-left corner of the window, in platform-global coordinates
    Position,
    Size,
    Minimized,
    Hidden,
    Main,
    FullScreen,
    Title,
    Role,
    Subrole,
}

impl WindowAttribute {
    pub fn ax_name(self) -> &'static str {
        match self {
            WindowAttribute::Frame => "AXFrame",
            WindowAttribute::Position => "AXPosition",
            WindowAttribute::Size => "AXSize",
            WindowAttribute::Minimized => "AXMinimized",
            WindowAttribute::Hidden => "AXHidden",
            WindowAttribute::Main => "AXMain",
            WindowAttribute::FullScreen => "AXFullScreen",
            WindowAttribute::Title => "AXTitle",
            WindowAttribute::Role => "AXRole",
            WindowAttribute::Subrole => "AXSubrole",
        }
    }
}

pub const WINDOW_ROLE: &str = "AXWindow";
pub const STANDARD_WINDOW_SUBROLE: &str = "AXStandardWindow";

/// Attribute payload, already converted to platform-global coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Bool(bool),
    Text(String),
    Point(GlobalPoint),
    Size(Size),
    Rect(GlobalRect),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_rect(&self) -> Option<GlobalRect> {
        match self {
            AttributeValue::Rect(value) => Some(*value),
            _ => None,
        }
    }
}

/// Top-left corner of a platform-global rect, the anchor position writes use
pub fn top_left(rect: &GlobalRect) -> GlobalPoint {
    GlobalPoint::new(rect.x(), rect.max_y())
}

/// Abstraction for interacting with macOS Accessibility APIs.
///
/// Reads of attributes the element lacks return `Ok(None)`; errors are
/// reserved for failures the caller may want to tell apart.
#[cfg_attr(test, mockall::automock)]
pub trait AccessibilityProvider: Send + Sync {
    /// Retrieve permission status without prompting the user
    fn permission_status(&self) -> PermissionStatus;

    /// All running applications, in workspace order
    fn running_applications(&self) -> AxResult<Vec<ApplicationInfo>>;

    fn frontmost_application(&self) -> AxResult<Option<ProcessId>>;

    /// Window elements of one application
    fn application_windows(&self, pid: ProcessId) -> AxResult<Vec<WindowRef>>;

    fn read_attribute(
        &self,
        window: WindowRef,
        attribute: WindowAttribute,
    ) -> AxResult<Option<AttributeValue>>;

    fn write_attribute(
        &self,
        window: WindowRef,
        attribute: WindowAttribute,
        value: AttributeValue,
    ) -> AxResult<()>;

    /// Bring an application to the foreground with all of its windows
    fn activate_application(&self, pid: ProcessId) -> AxResult<()>;
}

/// Collapse a provider result into "no data", logging the failure
pub fn query<T>(description: &str, result: AxResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(query = description, error = %err, "Accessibility query failed");
            None
        }
    }
}

/// Window held by [`InMemoryAccessibilityProvider`]
#[derive(Debug, Clone)]
pub struct InMemoryWindow {
    pub pid: ProcessId,
    pub frame: GlobalRect,
    attributes: HashMap<WindowAttribute, AttributeValue>,
    unreadable: HashSet<WindowAttribute>,
}

impl InMemoryWindow {
    pub fn new(pid: ProcessId, frame: GlobalRect) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(WindowAttribute::Minimized, AttributeValue::Bool(false));
        attributes.insert(WindowAttribute::Main, AttributeValue::Bool(false));
        attributes.insert(WindowAttribute::FullScreen, AttributeValue::Bool(false));
        attributes.insert(
            WindowAttribute::Role,
            AttributeValue::Text(WINDOW_ROLE.to_string()),
        );
        attributes.insert(
            WindowAttribute::Subrole,
            AttributeValue::Text(STANDARD_WINDOW_SUBROLE.to_string()),
        );
        Self {
            pid,
            frame,
            attributes,
            unreadable: HashSet::new(),
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.attributes
            .insert(WindowAttribute::Title, AttributeValue::Text(title.into()));
        self
    }

    pub fn main(self) -> Self {
        self.with(WindowAttribute::Main, AttributeValue::Bool(true))
    }

    pub fn minimized(self) -> Self {
        self.with(WindowAttribute::Minimized, AttributeValue::Bool(true))
    }

    pub fn full_screen(self) -> Self {
        self.with(WindowAttribute::FullScreen, AttributeValue::Bool(true))
    }

    pub fn with_subrole(self, subrole: &str) -> Self {
        self.with(WindowAttribute::Subrole, AttributeValue::Text(subrole.to_string()))
    }

    /// Drop an attribute so reads report it as absent
    pub fn without(mut self, attribute: WindowAttribute) -> Self {
        self.attributes.remove(&attribute);
        self
    }

    /// Make reads of an attribute fail
    pub fn unreadable(mut self, attribute: WindowAttribute) -> Self {
        self.unreadable.insert(attribute);
        self
    }

    pub fn with(mut self, attribute: WindowAttribute, value: AttributeValue) -> Self {
        self.attributes.insert(attribute, value);
        self
    }

    fn read(&self, attribute: WindowAttribute) -> AxResult<Option<AttributeValue>> {
        if self.unreadable.contains(&attribute) {
            return Err(AxError::CannotComplete);
        }
        Ok(match attribute {
            WindowAttribute::Frame => Some(AttributeValue::Rect(self.frame)),
            WindowAttribute::Position => Some(AttributeValue::Point(top_left(&self.frame))),
            WindowAttribute::Size => Some(AttributeValue::Size(self.frame.size)),
            other => self.attributes.get(&other).cloned(),
        })
    }

    // Resizing keeps the top edge in place, as the real window server does.
    fn write(&mut self, attribute: WindowAttribute, value: AttributeValue) -> AxResult<()> {
        match (attribute, value) {
            (WindowAttribute::Size, AttributeValue::Size(size)) => {
                let top = self.frame.max_y();
                self.frame = GlobalRect::from_xywh(self.frame.x(), top - size.height, size.width, size.height);
            }
            (WindowAttribute::Position, AttributeValue::Point(corner)) => {
                self.frame = GlobalRect::from_xywh(
                    corner.x,
                    corner.y - self.frame.height(),
                    self.frame.width(),
                    self.frame.height(),
                );
            }
            (WindowAttribute::Frame, AttributeValue::Rect(frame)) => self.frame = frame,
            (WindowAttribute::Role | WindowAttribute::Subrole | WindowAttribute::Title, _) => {
                return Err(AxError::AttributeUnsupported(attribute));
            }
            (attribute, value @ AttributeValue::Bool(_)) => {
                self.attributes.insert(attribute, value);
            }
            (attribute, _) => return Err(AxError::AttributeUnsupported(attribute)),
        }
        Ok(())
    }
}

/// One attribute write observed by [`InMemoryAccessibilityProvider`]
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeWrite {
    pub window: WindowRef,
    pub attribute: WindowAttribute,
    pub value: AttributeValue,
}

#[derive(Debug, Default)]
struct InMemoryState {
    applications: Vec<ApplicationInfo>,
    windows: Vec<(WindowRef, InMemoryWindow)>,
    frontmost: Option<ProcessId>,
    terminated: HashSet<ProcessId>,
    writes: Vec<AttributeWrite>,
    activations: Vec<ProcessId>,
    next_window: u64,
}

/// Simple in-memory provider used for testing the higher level services
#[derive(Debug)]
pub struct InMemoryAccessibilityProvider {
    state: RwLock<InMemoryState>,
    status: RwLock<PermissionStatus>,
}

impl InMemoryAccessibilityProvider {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(InMemoryState::default()),
            status: RwLock::new(PermissionStatus::Granted),
        }
    }

    pub fn set_permission_status(&self, status: PermissionStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    pub fn add_application(&self, application: ApplicationInfo) {
        self.write_state().applications.push(application);
    }

    pub fn add_window(&self, window: InMemoryWindow) -> WindowRef {
        let mut state = self.write_state();
        state.next_window += 1;
        let reference = WindowRef(state.next_window);
        state.windows.push((reference, window));
        reference
    }

    pub fn set_frontmost(&self, pid: Option<ProcessId>) {
        self.write_state().frontmost = pid;
    }

    /// Simulate an application exiting while its windows are still referenced
    pub fn terminate(&self, pid: ProcessId) {
        self.write_state().terminated.insert(pid);
    }

    pub fn frame_of(&self, window: WindowRef) -> Option<GlobalRect> {
        self.read_state()
            .windows
            .iter()
            .find(|(reference, _)| *reference == window)
            .map(|(_, entry)| entry.frame)
    }

    pub fn bool_attribute(&self, window: WindowRef, attribute: WindowAttribute) -> Option<bool> {
        self.read_state()
            .windows
            .iter()
            .find(|(reference, _)| *reference == window)
            .and_then(|(_, entry)| entry.attributes.get(&attribute))
            .and_then(AttributeValue::as_bool)
    }

    pub fn writes(&self) -> Vec<AttributeWrite> {
        self.read_state().writes.clone()
    }

    pub fn activations(&self) -> Vec<ProcessId> {
        self.read_state().activations.clone()
    }

    fn ensure_trusted(&self) -> AxResult<()> {
        match self.permission_status() {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Unknown | PermissionStatus::Denied => Err(AxError::PermissionDenied),
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, InMemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, InMemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryAccessibilityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessibilityProvider for InMemoryAccessibilityProvider {
    fn permission_status(&self) -> PermissionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn running_applications(&self) -> AxResult<Vec<ApplicationInfo>> {
        self.ensure_trusted()?;
        let state = self.read_state();
        Ok(state
            .applications
            .iter()
            .filter(|app| !state.terminated.contains(&app.pid))
            .cloned()
            .collect())
    }

    fn frontmost_application(&self) -> AxResult<Option<ProcessId>> {
        self.ensure_trusted()?;
        Ok(self.read_state().frontmost)
    }

    fn application_windows(&self, pid: ProcessId) -> AxResult<Vec<WindowRef>> {
        self.ensure_trusted()?;
        let state = self.read_state();
        if state.terminated.contains(&pid) {
            return Err(AxError::ApplicationGone(pid));
        }
        Ok(state
            .windows
            .iter()
            .filter(|(_, window)| window.pid == pid)
            .map(|(reference, _)| *reference)
            .collect())
    }

    fn read_attribute(
        &self,
        window: WindowRef,
        attribute: WindowAttribute,
    ) -> AxResult<Option<AttributeValue>> {
        self.ensure_trusted()?;
        let state = self.read_state();
        let (_, entry) = state
            .windows
            .iter()
            .find(|(reference, _)| *reference == window)
            .ok_or(AxError::InvalidElement)?;
        if state.terminated.contains(&entry.pid) {
            return Err(AxError::ApplicationGone(entry.pid));
        }
        entry.read(attribute)
    }

    fn write_attribute(
        &self,
        window: WindowRef,
        attribute: WindowAttribute,
        value: AttributeValue,
    ) -> AxResult<()> {
        self.ensure_trusted()?;
        let mut state = self.write_state();
        let terminated = state.terminated.clone();
        let (_, entry) = state
            .windows
            .iter_mut()
            .find(|(reference, _)| *reference == window)
            .ok_or(AxError::InvalidElement)?;
        if terminated.contains(&entry.pid) {
            return Err(AxError::ApplicationGone(entry.pid));
        }
        entry.write(attribute, value.clone())?;
        state.writes.push(AttributeWrite {
            window,
            attribute,
            value,
        });
        Ok(())
    }

    fn activate_application(&self, pid: ProcessId) -> AxResult<()> {
        self.ensure_trusted()?;
        let mut state = self.write_state();
        if state.terminated.contains(&pid) || !state.applications.iter().any(|app| app.pid == pid) {
            return Err(AxError::ApplicationGone(pid));
        }
        state.activations.push(pid);
        Ok(())
    }
}

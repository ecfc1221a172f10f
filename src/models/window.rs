use crate::models::geometry::GlobalRect;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Process identifier of an application owning windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub i32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token for a window element held by the accessibility provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowRef(pub u64);

/// Running application as reported by the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub pid: ProcessId,
    pub name: String,
    pub is_hidden: bool,
}

impl ApplicationInfo {
    pub fn new(pid: ProcessId, name: impl Into<String>, is_hidden: bool) -> Self {
        Self {
            pid,
            name: name.into(),
            is_hidden,
        }
    }
}

/// Handle to a window owned by another process.
///
/// The frame is fetched at most once per handle and then reused for the rest
/// of the interaction; enumeration hands out fresh handles every time.
#[derive(Clone)]
pub struct WindowHandle {
    pid: ProcessId,
    window: WindowRef,
    frame: Arc<OnceLock<Option<GlobalRect>>>,
}

impl WindowHandle {
    pub fn new(pid: ProcessId, window: WindowRef) -> Self {
        Self {
            pid,
            window,
            frame: Arc::new(OnceLock::new()),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn window_ref(&self) -> WindowRef {
        self.window
    }

    /// Memoized frame, computed by `fetch` on first use only
    pub fn frame_with<F>(&self, fetch: F) -> Option<GlobalRect>
    where
        F: FnOnce() -> Option<GlobalRect>,
    {
        *self.frame.get_or_init(fetch)
    }

    /// Frame if it has already been fetched
    pub fn cached_frame(&self) -> Option<GlobalRect> {
        self.frame.get().copied().flatten()
    }
}

impl PartialEq for WindowHandle {
    fn eq(&self, other: &Self) -> bool {
        self.pid == other.pid && self.window == other.window
    }
}

impl Eq for WindowHandle {}

impl std::hash::Hash for WindowHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pid.hash(state);
        self.window.hash(state);
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowHandle")
            .field("pid", &self.pid)
            .field("window", &self.window.0)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn frame_is_fetched_once() {
        let handle = WindowHandle::new(ProcessId(10), WindowRef(1));
        let calls = Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Some(GlobalRect::from_xywh(0, 0, 10, 10))
        };

        assert!(handle.cached_frame().is_none());
        assert!(handle.frame_with(fetch).is_some());
        assert!(handle.frame_with(|| None).is_some());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn clones_share_the_memoized_frame() {
        let handle = WindowHandle::new(ProcessId(10), WindowRef(1));
        let clone = handle.clone();
        handle.frame_with(|| Some(GlobalRect::from_xywh(1, 2, 3, 4)));
        assert_eq!(clone.cached_frame(), Some(GlobalRect::from_xywh(1, 2, 3, 4)));
        assert_eq!(handle, clone);
    }
}

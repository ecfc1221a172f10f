//! Native window host behind the overlay scene graph
//!
//! The scene graph owns actor state; the host only owns windows. On macOS the
//! host is [`crate::macos::CocoaOverlayHost`]; everywhere else (and in tests)
//! [`RecordingOverlayHost`] records the requests it receives.

use crate::models::color::Color;
use crate::models::geometry::GlobalRect;
use crate::Result;
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Identifier of a native overlay window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayWindowId(pub u64);

impl fmt::Display for OverlayWindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

/// Window operations the scene graph needs from the platform.
///
/// Hosts live on the UI thread, so the trait is not `Send`.
pub trait OverlayHost {
    /// Open a borderless, non-opaque window covering `frame`
    fn open_window(&self, frame: GlobalRect, background: Color) -> Result<OverlayWindowId>;

    fn close_window(&self, window: OverlayWindowId);

    /// Ask for the window's display list to be rendered again
    fn request_redraw(&self, window: OverlayWindowId);

    /// Make the window key so it receives keyboard input
    fn focus(&self, window: OverlayWindowId);

    /// Start delivering pointer-motion events for the window
    fn track_motion(&self, window: OverlayWindowId);
}

/// One request received by a [`RecordingOverlayHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    Open {
        window: OverlayWindowId,
        frame: GlobalRect,
        background: Color,
    },
    Close(OverlayWindowId),
    Redraw(OverlayWindowId),
    Focus(OverlayWindowId),
    TrackMotion(OverlayWindowId),
}

/// Headless host that keeps a log of requests
#[derive(Debug, Default)]
pub struct RecordingOverlayHost {
    next_id: Cell<u64>,
    open: RefCell<BTreeSet<OverlayWindowId>>,
    requests: RefCell<Vec<HostRequest>>,
}

impl RecordingOverlayHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<HostRequest> {
        self.requests.borrow().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.borrow_mut().clear();
    }

    pub fn open_windows(&self) -> Vec<OverlayWindowId> {
        self.open.borrow().iter().copied().collect()
    }

    pub fn is_open(&self, window: OverlayWindowId) -> bool {
        self.open.borrow().contains(&window)
    }

    pub fn redraw_count(&self, window: OverlayWindowId) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| **r == HostRequest::Redraw(window))
            .count()
    }

    fn record(&self, request: HostRequest) {
        debug!(?request, "Overlay host request");
        self.requests.borrow_mut().push(request);
    }
}

impl OverlayHost for RecordingOverlayHost {
    fn open_window(&self, frame: GlobalRect, background: Color) -> Result<OverlayWindowId> {
        let window = OverlayWindowId(self.next_id.get() + 1);
        self.next_id.set(window.0);
        self.open.borrow_mut().insert(window);
        self.record(HostRequest::Open {
            window,
            frame,
            background,
        });
        Ok(window)
    }

    fn close_window(&self, window: OverlayWindowId) {
        self.open.borrow_mut().remove(&window);
        self.record(HostRequest::Close(window));
    }

    fn request_redraw(&self, window: OverlayWindowId) {
        self.record(HostRequest::Redraw(window));
    }

    fn focus(&self, window: OverlayWindowId) {
        self.record(HostRequest::Focus(window));
    }

    fn track_motion(&self, window: OverlayWindowId) {
        self.record(HostRequest::TrackMotion(window));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ids_are_unique() {
        let host = RecordingOverlayHost::new();
        let frame = GlobalRect::from_xywh(0, 0, 10, 10);
        let a = host.open_window(frame, Color::TRANSPARENT).unwrap();
        let b = host.open_window(frame, Color::TRANSPARENT).unwrap();
        assert_ne!(a, b);
        host.close_window(a);
        assert_eq!(host.open_windows(), vec![b]);
    }
}

//! Overlay lifecycle: at most one picker window at a time

use crate::config::OverlayConfig;
use crate::models::color::Color;
use crate::models::geometry::ScriptPoint;
use crate::services::window_service::WindowService;
use crate::ui::input::{InputTranslator, NativeEvent, SceneInput};
use crate::ui::overlay::OverlayWindowId;
use crate::ui::scene_graph::{ActorId, DisplayItem, Scene};
use crate::{Result, SlingerError};
use std::sync::Arc;
use tracing::{debug, info};

/// What a freshly shown overlay hands to the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShownOverlay {
    pub window: OverlayWindowId,
    pub root: ActorId,
    pub anchor: ScriptPoint,
}

#[derive(Debug)]
struct ActiveOverlay {
    window: OverlayWindowId,
    root: ActorId,
    input: InputTranslator,
}

/// Hidden until [`OverlaySession::show`], hidden again after
/// [`OverlaySession::hide`] or once the extension removes the root actor
pub struct OverlaySession {
    scene: Scene,
    service: Arc<WindowService>,
    background: Color,
    active: Option<ActiveOverlay>,
}

impl std::fmt::Debug for OverlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySession")
            .field("background", &self.background)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl OverlaySession {
    pub fn new(scene: Scene, service: Arc<WindowService>, config: &OverlayConfig) -> Self {
        Self {
            scene,
            service,
            background: config.background,
            active: None,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn service(&self) -> &Arc<WindowService> {
        &self.service
    }

    /// Close any open overlay, then open a new one over the target screen's
    /// usable area
    pub fn show(&mut self) -> Result<ShownOverlay> {
        self.hide();

        let target = self
            .service
            .target_screen()
            .ok_or(SlingerError::NoTargetScreen)?;
        let anchor = self
            .service
            .anchor_point()
            .unwrap_or_else(|| target.geometry.script_workspace().center());

        let (window, root) = self
            .scene
            .open_window(target.info.usable_area, self.background)?;
        self.active = Some(ActiveOverlay {
            window,
            root,
            input: InputTranslator::new(target.geometry.workspace_flip()),
        });

        info!(%window, screen = %target.info.id, ?anchor, "Overlay shown");
        Ok(ShownOverlay {
            window,
            root,
            anchor,
        })
    }

    pub fn hide(&mut self) {
        if let Some(active) = self.active.take() {
            self.scene.close_window(active.window);
            debug!(window = %active.window, "Overlay hidden");
        }
    }

    /// Also notices windows the extension closed itself
    pub fn is_shown(&mut self) -> bool {
        self.sync();
        self.active.is_some()
    }

    pub fn window(&mut self) -> Option<OverlayWindowId> {
        self.sync();
        self.active.as_ref().map(|active| active.window)
    }

    pub fn root(&mut self) -> Option<ActorId> {
        self.sync();
        self.active.as_ref().map(|active| active.root)
    }

    fn sync(&mut self) {
        let closed = self
            .active
            .as_ref()
            .is_some_and(|active| !self.scene.is_open(active.window));
        if closed {
            self.active = None;
        }
    }

    /// Translate and deliver a native event. Returns the actors whose
    /// handlers consumed the resulting inputs.
    pub fn handle_native(&mut self, event: NativeEvent) -> Vec<ActorId> {
        self.sync();
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        let window = active.window;
        let inputs = active.input.translate(event);

        inputs
            .into_iter()
            .filter_map(|input| match input {
                SceneInput::Pointer(kind, mouse) => {
                    self.scene.dispatch_pointer(window, kind, mouse.position)
                }
                SceneInput::Key(key) => self.scene.dispatch_key(window, key),
            })
            .collect()
    }

    pub fn render(&mut self) -> Vec<DisplayItem> {
        match self.window() {
            Some(window) => self.scene.render(window),
            None => Vec::new(),
        }
    }
}

impl Drop for OverlaySession {
    fn drop(&mut self) {
        self.hide();
    }
}

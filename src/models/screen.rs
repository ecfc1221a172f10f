use crate::models::geometry::{
    AxisFlip, Global, GlobalRect, Offset, Platform, Point, Rect, Screen, Script, ScriptPoint,
    ScriptRect, Size, Workspace,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a physical display as reported by the display provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScreenId(pub u32);

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "screen-{}", self.0)
    }
}

/// Snapshot of one display's geometry in platform-global coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub id: ScreenId,
    /// Full frame of the display
    pub frame: GlobalRect,
    /// Frame minus menu bar and dock
    pub usable_area: GlobalRect,
}

impl ScreenInfo {
    pub fn new(id: ScreenId, frame: GlobalRect, usable_area: GlobalRect) -> Self {
        Self {
            id,
            frame,
            usable_area,
        }
    }
}

/// The fixed conversion pipeline between platform-global and script-workspace
/// coordinates for one screen:
/// global → screen offset, screen → workspace offset, then an axis flip by the
/// workspace height.
#[derive(Debug, Clone, Copy)]
pub struct ScreenGeometry {
    global_to_screen: Offset<Platform, Global, Screen>,
    screen_to_workspace: Offset<Platform, Screen, Workspace>,
    workspace_flip: AxisFlip<Platform, Script, Workspace>,
    workspace_size: Size,
}

impl ScreenGeometry {
    /// `primary` is the display whose origin anchors the global space
    pub fn new(screen: &ScreenInfo, primary: &ScreenInfo) -> Self {
        let global_to_screen = Offset::between(primary.frame.origin, screen.frame.origin);
        let frame_in_screen = screen.frame.move_by(global_to_screen);
        let usable_in_screen = screen.usable_area.move_by(global_to_screen);
        let screen_to_workspace = Offset::between(frame_in_screen.origin, usable_in_screen.origin);

        Self {
            global_to_screen,
            screen_to_workspace,
            workspace_flip: AxisFlip::new(screen.usable_area.height()),
            workspace_size: screen.usable_area.size,
        }
    }

    pub fn global_to_screen(&self) -> Offset<Platform, Global, Screen> {
        self.global_to_screen
    }

    pub fn screen_to_workspace(&self) -> Offset<Platform, Screen, Workspace> {
        self.screen_to_workspace
    }

    pub fn workspace_flip(&self) -> AxisFlip<Platform, Script, Workspace> {
        self.workspace_flip
    }

    pub fn workspace_size(&self) -> Size {
        self.workspace_size
    }

    /// The usable area as the script sees it: always anchored at (0, 0)
    pub fn script_workspace(&self) -> ScriptRect {
        Rect::new(ScriptPoint::origin(), self.workspace_size)
    }

    pub fn to_script(&self, rect: GlobalRect) -> ScriptRect {
        rect.move_by(self.global_to_screen)
            .move_by(self.screen_to_workspace)
            .invert(self.workspace_flip)
    }

    pub fn to_global(&self, rect: ScriptRect) -> GlobalRect {
        rect.invert(self.workspace_flip.reverse())
            .move_by(self.screen_to_workspace.reverse())
            .move_by(self.global_to_screen.reverse())
    }

    /// Points inside the overlay window arrive relative to the usable area
    pub fn workspace_point_to_script(&self, point: Point<Platform, Workspace>) -> ScriptPoint {
        point.invert(self.workspace_flip)
    }
}

/// Pick the screen whose frame overlaps `frame` the most. Ties keep the
/// earliest screen; no overlap at all means the window is not on any screen.
pub fn assign_screen<'a>(frame: &GlobalRect, screens: &'a [ScreenInfo]) -> Option<&'a ScreenInfo> {
    let mut best: Option<(&ScreenInfo, i64)> = None;
    for screen in screens {
        let area = screen.frame.intersection_area(frame);
        if area <= 0 {
            continue;
        }
        match best {
            Some((_, best_area)) if best_area >= area => {}
            _ => best = Some((screen, area)),
        }
    }
    best.map(|(screen, _)| screen)
}

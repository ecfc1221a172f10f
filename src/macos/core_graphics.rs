use crate::models::screen::ScreenInfo;
use crate::{Result, SlingerError};
use std::sync::{PoisonError, RwLock};

/// Abstraction over display enumeration
pub trait DisplayProvider: Send + Sync {
    /// Snapshot all displays; the first entry is the primary display
    fn screens(&self) -> Result<Vec<ScreenInfo>>;

    /// The display that currently has keyboard focus, target of all placement
    fn main_screen(&self) -> Result<Option<ScreenInfo>>;

    /// Display whose origin anchors the global coordinate space
    fn primary_screen(&self) -> Result<Option<ScreenInfo>> {
        Ok(self.screens()?.into_iter().next())
    }
}

/// In-memory display provider for testing
#[derive(Debug, Default)]
pub struct InMemoryDisplayProvider {
    screens: RwLock<Vec<ScreenInfo>>,
    main: RwLock<Option<usize>>,
}

impl InMemoryDisplayProvider {
    /// The first screen is both primary and main
    pub fn new_with(screens: Vec<ScreenInfo>) -> Self {
        let main = if screens.is_empty() { None } else { Some(0) };
        Self {
            screens: RwLock::new(screens),
            main: RwLock::new(main),
        }
    }

    pub fn set_main_index(&self, index: Option<usize>) {
        *self.main.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    pub fn set_screens(&self, screens: Vec<ScreenInfo>) {
        *self.screens.write().unwrap_or_else(PoisonError::into_inner) = screens;
    }
}

impl DisplayProvider for InMemoryDisplayProvider {
    fn screens(&self) -> Result<Vec<ScreenInfo>> {
        Ok(self
            .screens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn main_screen(&self) -> Result<Option<ScreenInfo>> {
        let index = *self.main.read().unwrap_or_else(PoisonError::into_inner);
        let screens = self.screens.read().unwrap_or_else(PoisonError::into_inner);
        Ok(index.and_then(|index| screens.get(index).copied()))
    }
}

/// Display provider backed by NSScreen
#[cfg(target_os = "macos")]
#[derive(Debug, Default)]
pub struct SystemDisplayProvider;

#[cfg(target_os = "macos")]
impl SystemDisplayProvider {
    pub fn new() -> Self {
        Self
    }

    unsafe fn describe(screen: cocoa::base::id) -> ScreenInfo {
        use crate::models::geometry::GlobalRect;
        use crate::models::screen::ScreenId;
        use cocoa::appkit::NSScreen;
        use cocoa::foundation::{NSDictionary, NSRect, NSString};
        use objc::{msg_send, sel, sel_impl};

        fn to_rect(rect: NSRect) -> GlobalRect {
            GlobalRect::from_xywh(
                rect.origin.x.round() as i32,
                rect.origin.y.round() as i32,
                rect.size.width.round() as i32,
                rect.size.height.round() as i32,
            )
        }

        let description = screen.deviceDescription();
        let key = NSString::alloc(cocoa::base::nil).init_str("NSScreenNumber");
        let number = description.objectForKey_(key);
        let _: () = msg_send![key, release];
        let id: u32 = if number == cocoa::base::nil {
            0
        } else {
            msg_send![number, unsignedIntValue]
        };

        ScreenInfo::new(ScreenId(id), to_rect(screen.frame()), to_rect(screen.visibleFrame()))
    }
}

#[cfg(target_os = "macos")]
impl DisplayProvider for SystemDisplayProvider {
    fn screens(&self) -> Result<Vec<ScreenInfo>> {
        use cocoa::appkit::NSScreen;
        use cocoa::base::nil;
        use cocoa::foundation::NSArray;

        unsafe {
            let screens = NSScreen::screens(nil);
            if screens == nil {
                return Err(SlingerError::MacOSAPIError("NSScreen.screens unavailable".into()).into());
            }
            Ok((0..screens.count())
                .map(|index| Self::describe(screens.objectAtIndex(index)))
                .collect())
        }
    }

    fn main_screen(&self) -> Result<Option<ScreenInfo>> {
        use cocoa::appkit::NSScreen;
        use cocoa::base::nil;

        unsafe {
            let screen = NSScreen::mainScreen(nil);
            if screen == nil {
                return Ok(None);
            }
            Ok(Some(Self::describe(screen)))
        }
    }
}

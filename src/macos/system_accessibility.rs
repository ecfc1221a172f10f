//! Accessibility provider backed by AXUIElement and NSWorkspace

use crate::macos::accessibility::{
    AccessibilityProvider, AttributeValue, AxError, AxResult, PermissionStatus, WindowAttribute,
};
use crate::models::geometry::{AxisFlip, Global, Platform, Point, Rect, Script, Size};
use crate::models::window::{ApplicationInfo, ProcessId, WindowRef};
use cocoa::base::{id, nil, BOOL, NO};
use cocoa::foundation::NSArray;
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFEqual, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use objc::{class, msg_send, sel, sel_impl};
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

#[repr(C)]
struct __AXUIElement(c_void);
type AXUIElementRef = *const __AXUIElement;

const AX_VALUE_CG_POINT: u32 = 1;
const AX_VALUE_CG_SIZE: u32 = 2;
const AX_VALUE_CG_RECT: u32 = 3;

const AX_ERROR_SUCCESS: i32 = 0;
const AX_ERROR_INVALID_ELEMENT: i32 = -25202;
const AX_ERROR_CANNOT_COMPLETE: i32 = -25204;
const AX_ERROR_ATTRIBUTE_UNSUPPORTED: i32 = -25205;
const AX_ERROR_API_DISABLED: i32 = -25211;
const AX_ERROR_NO_VALUE: i32 = -25212;

const ACTIVATE_ALL_WINDOWS: u64 = 1 << 0;
const ACTIVATE_IGNORING_OTHER_APPS: u64 = 1 << 1;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFTypeRef,
        value: *mut CFTypeRef,
    ) -> i32;
    fn AXUIElementSetAttributeValue(
        element: AXUIElementRef,
        attribute: CFTypeRef,
        value: CFTypeRef,
    ) -> i32;
    fn AXValueCreate(value_type: u32, value: *const c_void) -> CFTypeRef;
    fn AXValueGetType(value: CFTypeRef) -> u32;
    fn AXValueGetValue(value: CFTypeRef, value_type: u32, out: *mut c_void) -> bool;
}

fn check(code: i32) -> AxResult<()> {
    match code {
        AX_ERROR_SUCCESS => Ok(()),
        AX_ERROR_INVALID_ELEMENT => Err(AxError::InvalidElement),
        AX_ERROR_CANNOT_COMPLETE => Err(AxError::CannotComplete),
        AX_ERROR_API_DISABLED => Err(AxError::PermissionDenied),
        other => Err(AxError::Platform(other)),
    }
}

/// Retained AXUIElement. The accessibility API may be called from any thread.
#[derive(Clone)]
struct Element(CFType);

unsafe impl Send for Element {}
unsafe impl Sync for Element {}

impl Element {
    fn application(pid: ProcessId) -> AxResult<Self> {
        let raw = unsafe { AXUIElementCreateApplication(pid.0) };
        if raw.is_null() {
            return Err(AxError::ApplicationGone(pid));
        }
        Ok(Self(unsafe { CFType::wrap_under_create_rule(raw as CFTypeRef) }))
    }

    fn as_ax(&self) -> AXUIElementRef {
        self.0.as_CFTypeRef() as AXUIElementRef
    }

    fn copy_value(&self, name: &str) -> AxResult<Option<CFType>> {
        let attribute = CFString::new(name);
        let mut value: CFTypeRef = std::ptr::null();
        let code = unsafe {
            AXUIElementCopyAttributeValue(self.as_ax(), attribute.as_CFTypeRef(), &mut value)
        };
        match code {
            AX_ERROR_NO_VALUE | AX_ERROR_ATTRIBUTE_UNSUPPORTED => Ok(None),
            code => {
                check(code)?;
                if value.is_null() {
                    Ok(None)
                } else {
                    Ok(Some(unsafe { CFType::wrap_under_create_rule(value) }))
                }
            }
        }
    }

    fn set_value(&self, attribute: WindowAttribute, value: &CFType) -> AxResult<()> {
        let name = CFString::new(attribute.ax_name());
        let code = unsafe {
            AXUIElementSetAttributeValue(self.as_ax(), name.as_CFTypeRef(), value.as_CFTypeRef())
        };
        if code == AX_ERROR_ATTRIBUTE_UNSUPPORTED {
            return Err(AxError::AttributeUnsupported(attribute));
        }
        check(code)
    }
}

fn ax_value<T: Default>(value: &CFType, value_type: u32) -> Option<T> {
    let raw = value.as_CFTypeRef();
    unsafe {
        if AXValueGetType(raw) != value_type {
            return None;
        }
        let mut out = T::default();
        AXValueGetValue(raw, value_type, &mut out as *mut T as *mut c_void).then_some(out)
    }
}

fn create_ax_value<T>(value_type: u32, value: &T) -> AxResult<CFType> {
    let raw = unsafe { AXValueCreate(value_type, value as *const T as *const c_void) };
    if raw.is_null() {
        return Err(AxError::CannotComplete);
    }
    Ok(unsafe { CFType::wrap_under_create_rule(raw) })
}

fn same_element(known: &Element, element: &Element) -> bool {
    unsafe { CFEqual(known.0.as_CFTypeRef(), element.0.as_CFTypeRef()) != 0 }
}

struct ElementRegistry<E> {
    next_id: u64,
    elements: HashMap<WindowRef, (ProcessId, E)>,
}

impl<E> Default for ElementRegistry<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            elements: HashMap::new(),
        }
    }
}

impl<E> ElementRegistry<E> {
    /// Reuse the reference of an equal element so handles survive re-enumeration
    fn register(&mut self, pid: ProcessId, element: E, same: impl Fn(&E, &E) -> bool) -> WindowRef {
        let existing = self
            .elements
            .iter()
            .find(|(_, (owner, known))| *owner == pid && same(known, &element));
        if let Some((reference, _)) = existing {
            return *reference;
        }
        self.next_id += 1;
        let reference = WindowRef(self.next_id);
        self.elements.insert(reference, (pid, element));
        reference
    }

    fn retain_for(&mut self, pid: ProcessId, live: &[WindowRef]) {
        self.elements
            .retain(|reference, (owner, _)| *owner != pid || live.contains(reference));
    }

    /// Forget elements of applications that are no longer running
    fn retain_running(&mut self, running: &[ProcessId]) {
        let before = self.elements.len();
        self.elements.retain(|_, (owner, _)| running.contains(owner));
        let pruned = before - self.elements.len();
        if pruned > 0 {
            debug!(pruned, "Dropped elements of exited applications");
        }
    }
}

/// System-backed provider using the macOS Accessibility API.
///
/// Coordinates cross the boundary in platform-global space. The API itself
/// reports top-left anchored positions measured down from the primary
/// display's top edge, so every read and write flips by the primary height.
pub struct SystemAccessibilityProvider {
    registry: Mutex<ElementRegistry<Element>>,
}

impl std::fmt::Debug for SystemAccessibilityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemAccessibilityProvider")
            .finish_non_exhaustive()
    }
}

impl SystemAccessibilityProvider {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(ElementRegistry::default()),
        }
    }

    fn ensure_trusted(&self) -> AxResult<()> {
        match self.permission_status() {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Unknown | PermissionStatus::Denied => Err(AxError::PermissionDenied),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, ElementRegistry<Element>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn element(&self, window: WindowRef) -> AxResult<Element> {
        self.registry()
            .elements
            .get(&window)
            .map(|(_, element)| element.clone())
            .ok_or(AxError::InvalidElement)
    }

    fn accessibility_flip() -> AxisFlip<Script, Platform, Global> {
        AxisFlip::new(CGDisplay::main().bounds().size.height.round() as i32)
    }

    fn decode(attribute: WindowAttribute, value: CFType) -> Option<AttributeValue> {
        let flip = Self::accessibility_flip();
        match attribute {
            WindowAttribute::Frame => {
                let rect: CGRect = ax_value(&value, AX_VALUE_CG_RECT)?;
                let top_left = Rect::<Script, Global>::from_xywh(
                    rect.origin.x.round() as i32,
                    rect.origin.y.round() as i32,
                    rect.size.width.round() as i32,
                    rect.size.height.round() as i32,
                );
                Some(AttributeValue::Rect(flip.apply_rect(top_left)))
            }
            WindowAttribute::Position => {
                let point: CGPoint = ax_value(&value, AX_VALUE_CG_POINT)?;
                let corner = Point::<Script, Global>::new(point.x.round() as i32, point.y.round() as i32);
                Some(AttributeValue::Point(flip.apply_point(corner)))
            }
            WindowAttribute::Size => {
                let size: CGSize = ax_value(&value, AX_VALUE_CG_SIZE)?;
                Some(AttributeValue::Size(Size::new(
                    size.width.round() as i32,
                    size.height.round() as i32,
                )))
            }
            WindowAttribute::Title | WindowAttribute::Role | WindowAttribute::Subrole => value
                .downcast::<CFString>()
                .map(|text| AttributeValue::Text(text.to_string())),
            WindowAttribute::Minimized
            | WindowAttribute::Hidden
            | WindowAttribute::Main
            | WindowAttribute::FullScreen => value
                .downcast::<CFBoolean>()
                .map(|flag| AttributeValue::Bool(flag.into())),
        }
    }

    fn encode(attribute: WindowAttribute, value: &AttributeValue) -> AxResult<CFType> {
        match value {
            AttributeValue::Bool(flag) => {
                let boolean = if *flag {
                    CFBoolean::true_value()
                } else {
                    CFBoolean::false_value()
                };
                Ok(boolean.as_CFType())
            }
            AttributeValue::Point(corner) => {
                let ax_corner = Self::accessibility_flip().reverse().apply_point(*corner);
                let point = CGPoint::new(f64::from(ax_corner.x), f64::from(ax_corner.y));
                create_ax_value(AX_VALUE_CG_POINT, &point)
            }
            AttributeValue::Size(size) => {
                let size = CGSize::new(f64::from(size.width), f64::from(size.height));
                create_ax_value(AX_VALUE_CG_SIZE, &size)
            }
            AttributeValue::Text(_) | AttributeValue::Rect(_) => {
                Err(AxError::AttributeUnsupported(attribute))
            }
        }
    }
}

impl Default for SystemAccessibilityProvider {
    fn default() -> Self {
        Self::new()
    }
}

unsafe fn ns_string(value: id) -> String {
    if value == nil {
        return String::new();
    }
    let raw: *const c_char = msg_send![value, UTF8String];
    if raw.is_null() {
        return String::new();
    }
    CStr::from_ptr(raw).to_string_lossy().into_owned()
}

impl AccessibilityProvider for SystemAccessibilityProvider {
    fn permission_status(&self) -> PermissionStatus {
        if unsafe { AXIsProcessTrusted() } {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    fn running_applications(&self) -> AxResult<Vec<ApplicationInfo>> {
        self.ensure_trusted()?;
        unsafe {
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let running: id = msg_send![workspace, runningApplications];
            if running == nil {
                return Err(AxError::CannotComplete);
            }
            let count = running.count();
            let mut applications = Vec::with_capacity(count as usize);
            for index in 0..count {
                let app = running.objectAtIndex(index);
                let pid: i32 = msg_send![app, processIdentifier];
                let hidden: BOOL = msg_send![app, isHidden];
                let name: id = msg_send![app, localizedName];
                applications.push(ApplicationInfo::new(ProcessId(pid), ns_string(name), hidden != NO));
            }
            let running: Vec<ProcessId> = applications.iter().map(|app| app.pid).collect();
            self.registry().retain_running(&running);
            Ok(applications)
        }
    }

    fn frontmost_application(&self) -> AxResult<Option<ProcessId>> {
        self.ensure_trusted()?;
        unsafe {
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let app: id = msg_send![workspace, frontmostApplication];
            if app == nil {
                return Ok(None);
            }
            let pid: i32 = msg_send![app, processIdentifier];
            Ok(Some(ProcessId(pid)))
        }
    }

    fn application_windows(&self, pid: ProcessId) -> AxResult<Vec<WindowRef>> {
        self.ensure_trusted()?;
        let application = Element::application(pid)?;
        let Some(value) = application.copy_value("AXWindows")? else {
            return Ok(Vec::new());
        };
        if value.type_of() != CFArray::<CFType>::type_id() {
            debug!(%pid, "AXWindows is not an array");
            return Ok(Vec::new());
        }
        let windows: CFArray<CFType> =
            unsafe { CFArray::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) };

        let mut registry = self.registry();
        let references: Vec<WindowRef> = windows
            .iter()
            .map(|window| registry.register(pid, Element(CFType::clone(&window)), same_element))
            .collect();
        registry.retain_for(pid, &references);
        Ok(references)
    }

    fn read_attribute(
        &self,
        window: WindowRef,
        attribute: WindowAttribute,
    ) -> AxResult<Option<AttributeValue>> {
        self.ensure_trusted()?;
        let element = self.element(window)?;
        let Some(value) = element.copy_value(attribute.ax_name())? else {
            return Ok(None);
        };
        Ok(Self::decode(attribute, value))
    }

    fn write_attribute(
        &self,
        window: WindowRef,
        attribute: WindowAttribute,
        value: AttributeValue,
    ) -> AxResult<()> {
        self.ensure_trusted()?;
        let element = self.element(window)?;
        let encoded = Self::encode(attribute, &value)?;
        element.set_value(attribute, &encoded)
    }

    fn activate_application(&self, pid: ProcessId) -> AxResult<()> {
        self.ensure_trusted()?;
        unsafe {
            let app: id = msg_send![
                class!(NSRunningApplication),
                runningApplicationWithProcessIdentifier: pid.0
            ];
            if app == nil {
                return Err(AxError::ApplicationGone(pid));
            }
            let options = ACTIVATE_ALL_WINDOWS | ACTIVATE_IGNORING_OTHER_APPS;
            let activated: BOOL = msg_send![app, activateWithOptions: options];
            if activated == NO {
                warn!(%pid, "NSRunningApplication refused activation");
                return Err(AxError::CannotComplete);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same(a: &u32, b: &u32) -> bool {
        a == b
    }

    #[test]
    fn equal_elements_keep_their_reference() {
        let mut registry = ElementRegistry::default();
        let first = registry.register(ProcessId(10), 7u32, same);
        let again = registry.register(ProcessId(10), 7u32, same);
        let other_app = registry.register(ProcessId(11), 7u32, same);
        assert_eq!(first, again);
        assert_ne!(first, other_app);
    }

    #[test]
    fn exited_applications_lose_their_elements() {
        let mut registry = ElementRegistry::default();
        let kept = registry.register(ProcessId(10), 1u32, same);
        let gone = registry.register(ProcessId(20), 2u32, same);

        registry.retain_running(&[ProcessId(10), ProcessId(30)]);
        assert!(registry.elements.contains_key(&kept));
        assert!(!registry.elements.contains_key(&gone));
    }

    #[test]
    fn re_enumeration_drops_closed_windows_of_that_app_only() {
        let mut registry = ElementRegistry::default();
        let open = registry.register(ProcessId(10), 1u32, same);
        let closed = registry.register(ProcessId(10), 2u32, same);
        let elsewhere = registry.register(ProcessId(20), 3u32, same);

        registry.retain_for(ProcessId(10), &[open]);
        assert!(registry.elements.contains_key(&open));
        assert!(!registry.elements.contains_key(&closed));
        assert!(registry.elements.contains_key(&elsewhere));
    }
}

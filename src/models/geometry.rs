//! Coordinate spaces for window, screen and script geometry
//!
//! Two axis conventions meet in this crate: the platform one (origin at the
//! bottom-left, Y growing upward) used by screens and native events, and the
//! script one (origin at the top-left, Y growing downward) the extension works
//! in. Each value is additionally relative to an origin frame: the global
//! screen set, one physical screen, or one screen's usable area.
//!
//! Both dimensions are carried as zero-sized type parameters, so mixing values
//! from different spaces is a compile error. The only way to change a tag is
//! through an [`Offset`] (origin frame) or an [`AxisFlip`] (axis convention).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// Axis convention marker
pub trait Axis: sealed::Sealed + Copy + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Origin frame marker
pub trait OriginFrame: sealed::Sealed + Copy + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Origin bottom-left, Y up. Screens, native windows and raw input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {}

/// Origin top-left, Y down. Everything handed to the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {}

/// Relative to the primary screen's origin, spanning every display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Global {}

/// Relative to one physical screen's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {}

/// Relative to one screen's usable area (menu bar and dock excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workspace {}

impl sealed::Sealed for Platform {}
impl sealed::Sealed for Script {}
impl sealed::Sealed for Global {}
impl sealed::Sealed for Screen {}
impl sealed::Sealed for Workspace {}

impl Axis for Platform {
    const NAME: &'static str = "platform";
}

impl Axis for Script {
    const NAME: &'static str = "script";
}

impl OriginFrame for Global {
    const NAME: &'static str = "global";
}

impl OriginFrame for Screen {
    const NAME: &'static str = "screen";
}

impl OriginFrame for Workspace {
    const NAME: &'static str = "workspace";
}

/// A position tagged with its coordinate space
pub struct Point<A: Axis, O: OriginFrame> {
    pub x: i32,
    pub y: i32,
    space: PhantomData<(A, O)>,
}

impl<A: Axis, O: OriginFrame> Point<A, O> {
    pub const fn new(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }

    pub const fn origin() -> Self {
        Self::new(0, 0)
    }

    /// Re-express this point relative to the offset's destination frame
    pub fn move_by<To: OriginFrame>(self, offset: Offset<A, O, To>) -> Point<A, To> {
        Point::new(self.x - offset.dx, self.y - offset.dy)
    }

    /// Re-express this point in the flip's destination axis convention
    pub fn invert<To: Axis>(self, flip: AxisFlip<A, To, O>) -> Point<To, O> {
        flip.apply_point(self)
    }
}

// Manual impls: derives would needlessly bound the marker parameters.
impl<A: Axis, O: OriginFrame> Clone for Point<A, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Axis, O: OriginFrame> Copy for Point<A, O> {}

impl<A: Axis, O: OriginFrame> PartialEq for Point<A, O> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl<A: Axis, O: OriginFrame> Eq for Point<A, O> {}

impl<A: Axis, O: OriginFrame> fmt::Debug for Point<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point<{},{}>({}, {})", A::NAME, O::NAME, self.x, self.y)
    }
}

/// Width and height. Identical in every space, so it carries no tag.
/// Zero and negative extents are legal (hidden or collapsed windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Area in square points; negative extents count as empty
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }
}

/// A rectangle tagged with its coordinate space. The origin is the corner
/// nearest the axis origin: bottom-left for [`Platform`], top-left for [`Script`].
pub struct Rect<A: Axis, O: OriginFrame> {
    pub origin: Point<A, O>,
    pub size: Size,
}

impl<A: Axis, O: OriginFrame> Rect<A, O> {
    pub const fn new(origin: Point<A, O>, size: Size) -> Self {
        Self { origin, size }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(Point::new(x, y), Size::new(width, height))
    }

    pub fn x(&self) -> i32 {
        self.origin.x
    }

    pub fn y(&self) -> i32 {
        self.origin.y
    }

    pub fn width(&self) -> i32 {
        self.size.width
    }

    pub fn height(&self) -> i32 {
        self.size.height
    }

    pub fn max_x(&self) -> i32 {
        self.origin.x + self.size.width
    }

    pub fn max_y(&self) -> i32 {
        self.origin.y + self.size.height
    }

    pub fn area(&self) -> i64 {
        self.size.area()
    }

    pub fn center(&self) -> Point<A, O> {
        Point::new(
            self.origin.x + self.size.width / 2,
            self.origin.y + self.size.height / 2,
        )
    }

    pub fn contains(&self, point: Point<A, O>) -> bool {
        point.x >= self.origin.x
            && point.x < self.max_x()
            && point.y >= self.origin.y
            && point.y < self.max_y()
    }

    /// Size of the overlap with another rect in the same space
    pub fn intersection_size(&self, other: &Rect<A, O>) -> Size {
        let width = self.max_x().min(other.max_x()) - self.origin.x.max(other.origin.x);
        let height = self.max_y().min(other.max_y()) - self.origin.y.max(other.origin.y);
        if width <= 0 || height <= 0 {
            Size::default()
        } else {
            Size::new(width, height)
        }
    }

    pub fn intersection_area(&self, other: &Rect<A, O>) -> i64 {
        self.intersection_size(other).area()
    }

    /// Re-express this rect relative to the offset's destination frame
    pub fn move_by<To: OriginFrame>(self, offset: Offset<A, O, To>) -> Rect<A, To> {
        Rect::new(self.origin.move_by(offset), self.size)
    }

    /// Re-express this rect in the flip's destination axis convention
    pub fn invert<To: Axis>(self, flip: AxisFlip<A, To, O>) -> Rect<To, O> {
        flip.apply_rect(self)
    }
}

impl<A: Axis, O: OriginFrame> Clone for Rect<A, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Axis, O: OriginFrame> Copy for Rect<A, O> {}

impl<A: Axis, O: OriginFrame> PartialEq for Rect<A, O> {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.size == other.size
    }
}

impl<A: Axis, O: OriginFrame> Eq for Rect<A, O> {}

impl<A: Axis, O: OriginFrame> fmt::Debug for Rect<A, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect<{},{}>({}, {}, {}x{})",
            A::NAME,
            O::NAME,
            self.origin.x,
            self.origin.y,
            self.size.width,
            self.size.height
        )
    }
}

/// Vector from one origin frame to another within a single axis convention
pub struct Offset<A: Axis, From: OriginFrame, To: OriginFrame> {
    pub dx: i32,
    pub dy: i32,
    space: PhantomData<(A, From, To)>,
}

impl<A: Axis, From: OriginFrame, To: OriginFrame> Offset<A, From, To> {
    pub const fn new(dx: i32, dy: i32) -> Self {
        Self {
            dx,
            dy,
            space: PhantomData,
        }
    }

    /// Offset whose destination origin sits at `to`, measured in the source frame
    pub fn between(from: Point<A, From>, to: Point<A, From>) -> Self {
        Self::new(to.x - from.x, to.y - from.y)
    }

    pub fn reverse(self) -> Offset<A, To, From> {
        Offset::new(-self.dx, -self.dy)
    }

    /// Compose with a second hop, skipping the intermediate frame
    pub fn then<Next: OriginFrame>(self, next: Offset<A, To, Next>) -> Offset<A, From, Next> {
        Offset::new(self.dx + next.dx, self.dy + next.dy)
    }

    pub fn apply(self, point: Point<A, From>) -> Point<A, To> {
        point.move_by(self)
    }
}

impl<A: Axis, From: OriginFrame, To: OriginFrame> Clone for Offset<A, From, To> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Axis, From: OriginFrame, To: OriginFrame> Copy for Offset<A, From, To> {}

impl<A: Axis, From: OriginFrame, To: OriginFrame> PartialEq for Offset<A, From, To> {
    fn eq(&self, other: &Self) -> bool {
        self.dx == other.dx && self.dy == other.dy
    }
}

impl<A: Axis, From: OriginFrame, To: OriginFrame> fmt::Debug for Offset<A, From, To> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Offset<{},{}->{}>({}, {})",
            A::NAME,
            From::NAME,
            To::NAME,
            self.dx,
            self.dy
        )
    }
}

/// Swap between axis conventions inside one origin frame of the given height
pub struct AxisFlip<From: Axis, To: Axis, O: OriginFrame> {
    height: i32,
    space: PhantomData<(From, To, O)>,
}

impl<From: Axis, To: Axis, O: OriginFrame> AxisFlip<From, To, O> {
    pub const fn new(height: i32) -> Self {
        Self {
            height,
            space: PhantomData,
        }
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn reverse(self) -> AxisFlip<To, From, O> {
        AxisFlip::new(self.height)
    }

    pub fn apply_point(&self, point: Point<From, O>) -> Point<To, O> {
        Point::new(point.x, self.height - point.y)
    }

    /// The origin moves to the opposite vertical edge so the rect keeps its
    /// visual position while being anchored from the other corner.
    pub fn apply_rect(&self, rect: Rect<From, O>) -> Rect<To, O> {
        let opposite: Point<From, O> = Point::new(rect.origin.x, rect.origin.y + rect.size.height);
        Rect::new(self.apply_point(opposite), rect.size)
    }
}

impl<From: Axis, To: Axis, O: OriginFrame> Clone for AxisFlip<From, To, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<From: Axis, To: Axis, O: OriginFrame> Copy for AxisFlip<From, To, O> {}

impl<From: Axis, To: Axis, O: OriginFrame> fmt::Debug for AxisFlip<From, To, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AxisFlip<{}->{},{}>(height {})",
            From::NAME,
            To::NAME,
            O::NAME,
            self.height
        )
    }
}

/// Common aliases for the spaces that actually occur
pub type GlobalRect = Rect<Platform, Global>;
pub type GlobalPoint = Point<Platform, Global>;
pub type ScriptRect = Rect<Script, Workspace>;
pub type ScriptPoint = Point<Script, Workspace>;

//! Geometry helpers - bounds rectangles, clip state and surface origin

/// Axis-aligned float rectangle (left, top, right, bottom)
///
/// Used for segment bounds, which grow by union and are clipped to the
/// target at submission time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// An empty rectangle at the origin
    pub const fn empty() -> Self {
        Self { left: 0.0, top: 0.0, right: 0.0, bottom: 0.0 }
    }

    pub const fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_ltrb(x, y, x + width, y + height)
    }

    /// Rectangle covering `[0, width) x [0, height)`
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::from_ltrb(0.0, 0.0, width as f32, height as f32)
    }

    /// True when the rectangle has no area (or is inverted)
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Grow this rectangle to also cover `other`
    ///
    /// Empty inputs are ignored; joining into an empty rectangle copies `other`.
    pub fn join(&mut self, other: &Rect) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    /// Clip this rectangle to `other`
    ///
    /// Returns false and leaves `self` untouched when the two do not overlap.
    pub fn intersect(&mut self, other: &Rect) -> bool {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);
        if left < right && top < bottom {
            *self = Rect::from_ltrb(left, top, right, bottom);
            true
        } else {
            false
        }
    }

    /// Smallest integer rectangle containing this one
    pub fn round_out(&self) -> IRect {
        IRect::from_ltrb(
            self.left.floor() as i32,
            self.top.floor() as i32,
            self.right.ceil() as i32,
            self.bottom.ceil() as i32,
        )
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::empty()
    }
}

/// Axis-aligned integer rectangle (left, top, right, bottom)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IRect {
    pub const fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::from_ltrb(x, y, x + width, y + height)
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self::from_ltrb(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    /// True when `other` lies entirely inside this rectangle
    pub fn contains(&self, other: &IRect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Overlap of the two rectangles, `None` when they do not overlap
    pub fn intersection(&self, other: &IRect) -> Option<IRect> {
        let r = IRect::from_ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() { None } else { Some(r) }
    }

    pub fn to_rect(&self) -> Rect {
        Rect::from_ltrb(self.left as f32, self.top as f32, self.right as f32, self.bottom as f32)
    }

    /// Mirror vertically inside a surface of the given height
    pub fn flip_y(&self, surface_height: u32) -> IRect {
        let h = surface_height as i32;
        IRect::from_ltrb(self.left, h - self.bottom, self.right, h - self.top)
    }
}

/// Where row 0 of a surface lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceOrigin {
    #[default]
    TopLeft,
    BottomLeft,
}

impl SurfaceOrigin {
    /// Convert a logical rectangle to device space for a surface of `height` rows
    pub fn to_device(&self, rect: &IRect, height: u32) -> IRect {
        match self {
            SurfaceOrigin::TopLeft => *rect,
            SurfaceOrigin::BottomLeft => rect.flip_y(height),
        }
    }
}

/// Clip applied to clears: either the whole target or a scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedClip {
    scissor: Option<IRect>,
}

impl FixedClip {
    /// No restriction: the whole target
    pub const fn disabled() -> Self {
        Self { scissor: None }
    }

    /// Restrict to `rect` (logical, origin-relative coordinates)
    pub const fn with_scissor(rect: IRect) -> Self {
        Self { scissor: Some(rect) }
    }

    pub fn scissor_enabled(&self) -> bool {
        self.scissor.is_some()
    }

    pub fn scissor_rect(&self) -> Option<IRect> {
        self.scissor
    }

    /// True when the clip leaves the whole `width x height` target writable
    pub fn covers_target(&self, width: u32, height: u32) -> bool {
        match self.scissor {
            None => true,
            Some(rect) => rect.contains(&IRect::from_size(width, height)),
        }
    }

    /// Region written through this clip on a target, in logical coordinates
    pub fn region(&self, width: u32, height: u32) -> IRect {
        self.scissor.unwrap_or_else(|| IRect::from_size(width, height))
    }
}

#[cfg(test)]
#[path = "geometry_tests.rs"]
mod tests;

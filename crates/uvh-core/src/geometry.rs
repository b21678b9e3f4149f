#![forbid(unsafe_code)]

//! Viewport-space rectangles used for visibility and volume-eligibility checks.

use serde::{Deserialize, Serialize};

/// A bounding rectangle in CSS pixels, relative to some document's viewport.
///
/// Field names match the `rect` object of the cross-frame wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// All four edges are finite numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.top.is_finite() && self.left.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Shift the rectangle by `(dx, dy)`.
    ///
    /// Used to lift a child-document rect into the parent document by the
    /// owning iframe's offset.
    #[must_use]
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            top: self.top + dy,
            left: self.left + dx,
            ..*self
        }
    }

    /// Whether a non-empty rect intersects the viewport grown by `margin` px on
    /// every side.
    #[must_use]
    pub fn is_visible_in(&self, viewport: Viewport, margin: f64) -> bool {
        !self.is_empty()
            && self.top < viewport.height + margin
            && self.bottom() > -margin
            && self.left < viewport.width + margin
            && self.right() > -margin
    }

    /// Whether `inner` lies inside `self` once `self` is grown by `tolerance`
    /// px on every side.
    #[must_use]
    pub fn encloses(&self, inner: &Rect, tolerance: f64) -> bool {
        inner.left >= self.left - tolerance
            && inner.top >= self.top - tolerance
            && inner.right() <= self.right() + tolerance
            && inner.bottom() <= self.bottom() + tolerance
    }
}

/// Size of the layout viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

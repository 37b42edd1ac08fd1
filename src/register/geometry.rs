//! Rectangles and search-window geometry in pixel coordinates.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::GeometryError;

// =============================================================================
// Rect
// =============================================================================

/// Axis-aligned rectangle with its top-left corner at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The empty rectangle, used to flag an all-black image.
    pub const fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Whether the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// Overlap of two rectangles, or `None` if they do not share any pixel.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());

        if x1 <= x0 as u64 || y1 <= y0 as u64 {
            return None;
        }

        Some(Rect::new(x0, y0, (x1 - x0 as u64) as u32, (y1 - y0 as u64) as u32))
    }

    /// Whether the rectangle lies inside a `width` x `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        !self.is_empty() && self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Express this rectangle relative to `origin`'s top-left corner.
    ///
    /// Coordinates left of or above `origin` are clamped to 0.
    pub fn relative_to(&self, origin: &Rect) -> Rect {
        Rect::new(
            self.x.saturating_sub(origin.x),
            self.y.saturating_sub(origin.y),
            self.width,
            self.height,
        )
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={} y={} width={} height={}",
            self.x, self.y, self.width, self.height
        )
    }
}

impl FromStr for Rect {
    type Err = String;

    /// Parse `x,y,width,height`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(format!(
                "expected 'x,y,width,height', got '{}' ({} field(s))",
                s,
                parts.len()
            ));
        }

        let mut values = [0u32; 4];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = part
                .parse()
                .map_err(|_| format!("'{}' is not a non-negative integer", part))?;
        }

        Ok(Rect::new(values[0], values[1], values[2], values[3]))
    }
}

// =============================================================================
// Search Window
// =============================================================================

/// Region of a slice searched for the template, derived from the last known
/// template position and the maximum expected shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// Window in slice coordinates
    pub rect: Rect,

    /// Largest valid template offset along x, relative to the window
    pub max_offset_x: u32,

    /// Largest valid template offset along y, relative to the window
    pub max_offset_y: u32,
}

impl SearchWindow {
    /// Derive the window around `prev` (last absolute template position).
    ///
    /// The top-left corner is `prev - max_shift` clamped at 0; the
    /// bottom-right corner is `prev + max_shift + patch` clamped at
    /// `extent - 1`.
    ///
    /// # Errors
    ///
    /// [`GeometryError::DegenerateSearchWindow`] if clamping leaves no room
    /// for a single placement of the patch.
    pub fn around(
        prev: (u32, u32),
        max_shift: (u32, u32),
        patch: (u32, u32),
        image: (u32, u32),
    ) -> Result<Self, GeometryError> {
        let (x0, x1) = clamp_axis(prev.0, max_shift.0, patch.0, image.0);
        let (y0, y1) = clamp_axis(prev.1, max_shift.1, patch.1, image.1);

        let width = x1.saturating_sub(x0);
        let height = y1.saturating_sub(y0);
        let rect = Rect::new(x0 as u32, y0 as u32, width as u32, height as u32);

        if width < patch.0 as u64 || height < patch.1 as u64 {
            return Err(GeometryError::DegenerateSearchWindow {
                window: rect.to_string(),
                patch_width: patch.0,
                patch_height: patch.1,
            });
        }

        Ok(Self {
            rect,
            max_offset_x: (width - patch.0 as u64) as u32,
            max_offset_y: (height - patch.1 as u64) as u32,
        })
    }
}

fn clamp_axis(prev: u32, max_shift: u32, patch: u32, extent: u32) -> (u64, u64) {
    let start = (prev as u64).saturating_sub(max_shift as u64);
    let end = (prev as u64 + max_shift as u64 + patch as u64)
        .min((extent as u64).saturating_sub(1));
    (start, end)
}

// =============================================================================
// Tests
// =============================================================================

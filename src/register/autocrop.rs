//! Black-border detection.
//!
//! Slices coming off the acquisition pipeline are often padded with a border
//! of pure black (value 0) pixels. The border is measured once on the reference
//! slice and the resulting rectangle is applied to every slice.

use tracing::debug;

use super::geometry::Rect;
use super::image::SliceImage;

/// Bounding rectangle of the non-black region of `image`.
///
/// Four independent scans count the fully black rows from the top and from
/// the bottom, and the fully black columns from the left and from the right,
/// each stopping at the first row or column holding a non-zero pixel.
///
/// Returns [`Rect::empty`] for an all-black image.
pub fn non_black_region(image: &SliceImage) -> Rect {
    let (width, height) = image.dimensions();

    let top = (0..height).take_while(|&y| image.is_black_row(y)).count() as u32;
    let bottom = (0..height)
        .rev()
        .take_while(|&y| image.is_black_row(y))
        .count() as u32;
    let left = (0..width).take_while(|&x| image.is_black_column(x)).count() as u32;
    let right = (0..width)
        .rev()
        .take_while(|&x| image.is_black_column(x))
        .count() as u32;

    debug!(
        "Black margins: top={} bottom={} left={} right={}",
        top, bottom, left, right
    );

    let crop_width = width as i64 - left as i64 - right as i64;
    let crop_height = height as i64 - top as i64 - bottom as i64;

    if crop_width > 0 && crop_height > 0 {
        Rect::new(left, top, crop_width as u32, crop_height as u32)
    } else {
        Rect::empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

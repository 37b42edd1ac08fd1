//! Test utilities for integration tests.
//!
//! Synthetic slice stacks written to temp folders, and deterministic patch
//! matchers for exercising the pipeline without real correlation.

use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use em_registration::{
    CancelToken, IntensityGrid, MatchError, MatchPosition, PatchMatcher, SearchBounds,
};

// =============================================================================
// Synthetic Slices
// =============================================================================

/// Pseudo-random texture with no repeating structure in small windows.
pub fn texture(x: i64, y: i64) -> u8 {
    let h = ((x as u32).wrapping_mul(73_856_093) ^ (y as u32).wrapping_mul(19_349_663))
        .wrapping_mul(2_654_435_761);
    // Keep away from 0 so textured pixels never count as black border
    1 + ((h >> 24) % 250) as u8
}

/// Scene content displaced by `(dx, dy)`: pixel `(x, y)` shows scene point
/// `(x - dx, y - dy)`.
pub fn drifted_slice(width: u32, height: u32, dx: i64, dy: i64) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([texture(x as i64 - dx, y as i64 - dy)])
    })
}

/// Zero out a border of `margin` pixels on every side.
pub fn with_black_border(mut image: GrayImage, margin: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if x < margin || y < margin || x >= width - margin || y >= height - margin {
            *pixel = Luma([0]);
        }
    }
    image
}

/// Write one TIFF per drift entry, named `slice_{n:05}.tif`.
pub fn write_drifting_stack(
    dir: &Path,
    width: u32,
    height: u32,
    drifts: &[(i64, i64)],
) -> Vec<PathBuf> {
    drifts
        .iter()
        .enumerate()
        .map(|(i, &(dx, dy))| {
            let path = dir.join(format!("slice_{:05}.tif", i));
            drifted_slice(width, height, dx, dy).save(&path).unwrap();
            path
        })
        .collect()
}

/// Create empty files with z-encoded names; resampling never opens them.
pub fn touch_z_stack(dir: &Path, zs: &[f64]) -> Vec<PathBuf> {
    zs.iter()
        .enumerate()
        .map(|(i, z)| {
            let path = dir.join(format!("slice_{:05}_z={}um.tif", i, z));
            std::fs::write(&path, b"").unwrap();
            path
        })
        .collect()
}

/// Sorted file names inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Stub Matchers
// =============================================================================

/// Always answers the center of the search bounds.
#[derive(Debug, Default)]
pub struct CenterMatcher {
    pub calls: usize,
}

impl PatchMatcher for CenterMatcher {
    fn find_best_match(
        &mut self,
        _region: &IntensityGrid,
        _template: &IntensityGrid,
        bounds: SearchBounds,
    ) -> Result<MatchPosition, MatchError> {
        self.calls += 1;
        Ok(MatchPosition {
            x: (bounds.x_min + bounds.x_max) / 2,
            y: (bounds.y_min + bounds.y_max) / 2,
        })
    }
}

/// Center matcher that raises a cancellation flag on its `cancel_on_call`-th call.
pub struct CancellingMatcher {
    inner: CenterMatcher,
    cancel_on_call: usize,
    flag: CancelFlag,
}

/// Either a raw flag (direct pipeline use) or a worker token.
pub enum CancelFlag {
    Raw(Arc<AtomicBool>),
    Token(CancelToken),
}

impl CancellingMatcher {
    pub fn new(cancel_on_call: usize, flag: CancelFlag) -> Self {
        Self {
            inner: CenterMatcher::default(),
            cancel_on_call,
            flag,
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls
    }
}

impl PatchMatcher for CancellingMatcher {
    fn find_best_match(
        &mut self,
        region: &IntensityGrid,
        template: &IntensityGrid,
        bounds: SearchBounds,
    ) -> Result<MatchPosition, MatchError> {
        let result = self.inner.find_best_match(region, template, bounds);
        if self.inner.calls == self.cancel_on_call {
            match &self.flag {
                CancelFlag::Raw(flag) => flag.store(true, Ordering::SeqCst),
                CancelFlag::Token(token) => token.cancel(),
            }
        }
        result
    }
}

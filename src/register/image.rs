//! Grayscale slice pixels.
//!
//! EM slices are single-channel 8- or 16-bit intensity grids. [`SliceImage`]
//! keeps the decoded bit depth so registered slices are written back in the
//! same pixel format they were read in.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Pixel};

use super::geometry::Rect;
use crate::error::IoError;

/// 16-bit grayscale buffer.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

// =============================================================================
// Slice Image
// =============================================================================

/// A decoded grayscale slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceImage {
    Gray8(GrayImage),
    Gray16(Gray16Image),
}

impl SliceImage {
    /// Decode a slice from disk.
    pub fn open(path: &Path) -> Result<Self, IoError> {
        let decoded = image::open(path).map_err(|e| IoError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_dynamic(decoded, path)
    }

    /// Accept only single-channel images; `path` is used for diagnostics.
    pub fn from_dynamic(image: DynamicImage, path: &Path) -> Result<Self, IoError> {
        match image {
            DynamicImage::ImageLuma8(buf) => Ok(SliceImage::Gray8(buf)),
            DynamicImage::ImageLuma16(buf) => Ok(SliceImage::Gray16(buf)),
            other => Err(IoError::UnsupportedPixelFormat {
                path: path.to_path_buf(),
                color: format!("{:?}", other.color()),
            }),
        }
    }

    /// Encode the slice; the format follows the file extension.
    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        let result = match self {
            SliceImage::Gray8(buf) => buf.save(path),
            SliceImage::Gray16(buf) => buf.save(path),
        };
        result.map_err(|e| IoError::Save {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn width(&self) -> u32 {
        match self {
            SliceImage::Gray8(buf) => buf.width(),
            SliceImage::Gray16(buf) => buf.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            SliceImage::Gray8(buf) => buf.height(),
            SliceImage::Gray16(buf) => buf.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Copy of the pixels inside `rect`.
    ///
    /// The rectangle is clipped to the image.
    pub fn crop(&self, rect: Rect) -> SliceImage {
        match self {
            SliceImage::Gray8(buf) => SliceImage::Gray8(crop_buffer(buf, rect)),
            SliceImage::Gray16(buf) => SliceImage::Gray16(crop_buffer(buf, rect)),
        }
    }

    /// Translate the content by `(dx, dy)` pixels; uncovered pixels become 0.
    pub fn translate(&self, dx: i64, dy: i64) -> SliceImage {
        match self {
            SliceImage::Gray8(buf) => SliceImage::Gray8(translate_buffer(buf, dx, dy)),
            SliceImage::Gray16(buf) => SliceImage::Gray16(translate_buffer(buf, dx, dy)),
        }
    }

    /// Whether every pixel in row `y` is exactly zero.
    pub fn is_black_row(&self, y: u32) -> bool {
        match self {
            SliceImage::Gray8(buf) => (0..buf.width()).all(|x| buf.get_pixel(x, y).0[0] == 0),
            SliceImage::Gray16(buf) => (0..buf.width()).all(|x| buf.get_pixel(x, y).0[0] == 0),
        }
    }

    /// Whether every pixel in column `x` is exactly zero.
    pub fn is_black_column(&self, x: u32) -> bool {
        match self {
            SliceImage::Gray8(buf) => (0..buf.height()).all(|y| buf.get_pixel(x, y).0[0] == 0),
            SliceImage::Gray16(buf) => (0..buf.height()).all(|y| buf.get_pixel(x, y).0[0] == 0),
        }
    }

    /// Intensities as `f32`, row-major.
    pub fn to_intensity(&self) -> IntensityGrid {
        let data = match self {
            SliceImage::Gray8(buf) => buf.as_raw().iter().map(|&v| v as f32).collect(),
            SliceImage::Gray16(buf) => buf.as_raw().iter().map(|&v| v as f32).collect(),
        };
        IntensityGrid {
            width: self.width(),
            height: self.height(),
            data,
        }
    }
}

fn crop_buffer<P>(
    buf: &ImageBuffer<P, Vec<P::Subpixel>>,
    rect: Rect,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    image::imageops::crop_imm(buf, rect.x, rect.y, rect.width, rect.height).to_image()
}

fn translate_buffer<P>(
    buf: &ImageBuffer<P, Vec<P::Subpixel>>,
    dx: i64,
    dy: i64,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (width, height) = buf.dimensions();
    let mut out: ImageBuffer<P, Vec<P::Subpixel>> = ImageBuffer::new(width, height);

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let sx = x as i64 - dx;
        let sy = y as i64 - dy;
        if sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64 {
            *pixel = *buf.get_pixel(sx as u32, sy as u32);
        }
    }

    out
}

// =============================================================================
// Intensity Grid
// =============================================================================

/// Bit-depth independent view of a slice region handed to a patch matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    pub width: u32,
    pub height: u32,
    /// Row-major intensities, `width * height` values
    pub data: Vec<f32>,
}

impl IntensityGrid {
    /// Build a grid from row-major data.
    ///
    /// Returns `None` if `data` does not hold exactly `width * height` values.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Row `y` as a slice.
    #[inline]
    pub fn row(&self, y: u32) -> &[f32] {
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }
}

// =============================================================================
// Tests
// =============================================================================

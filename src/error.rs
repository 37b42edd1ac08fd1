use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while decoding the z-position encoded in a slice filename
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// Filename does not follow the `..._{ordinal}_z={float}um.{ext}` grammar
    #[error("Filename does not encode a z-position (expected '..._<n>_z=<float>um.<ext>'): {path}")]
    NoZPosition { path: PathBuf },

    /// Filename matched the grammar but the z value is not a number
    #[error("Invalid z-position '{value}' in filename {path}")]
    InvalidZ { path: PathBuf, value: String },
}

/// Errors related to template, crop and search window geometry
#[derive(Debug, Clone, Error)]
pub enum GeometryError {
    /// The user-selected template rectangle has no area
    #[error("Template patch is empty: {width}x{height} at ({x}, {y})")]
    EmptyTemplate { x: u32, y: u32, width: u32, height: u32 },

    /// Auto-crop region and template patch do not overlap
    #[error(
        "The auto-crop rectangle {crop} and the template patch {template} do not overlap; \
         select a template patch inside the non-black region of the image"
    )]
    CropTemplateDisjoint { crop: String, template: String },

    /// Template patch extends beyond the (possibly cropped) reference slice
    #[error("Template patch {template} does not fit inside the {width}x{height} reference slice")]
    TemplateOutOfBounds {
        template: String,
        width: u32,
        height: u32,
    },

    /// Clamped search window is too small to contain the template patch
    #[error(
        "Search window {window} cannot contain the {patch_width}x{patch_height} template patch"
    )]
    DegenerateSearchWindow {
        window: String,
        patch_width: u32,
        patch_height: u32,
    },

    /// Slice dimensions differ from the reference slice
    #[error("Slice is {width}x{height} but the reference slice is {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// File system and image codec errors
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Input folder could not be listed
    #[error("Cannot read folder {path}: {message}")]
    ReadDir { path: PathBuf, message: String },

    /// Slice could not be opened or decoded
    #[error("Failed to load image {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Slice could not be encoded or written
    #[error("Failed to save image {path}: {message}")]
    Save { path: PathBuf, message: String },

    /// Slice decoded to something other than a single-channel intensity grid
    #[error("Unsupported pixel format {color} in {path} (expected 8- or 16-bit grayscale)")]
    UnsupportedPixelFormat { path: PathBuf, color: String },

    /// Output folder could not be created
    #[error("Cannot create output folder {path}: {message}")]
    CreateDir { path: PathBuf, message: String },

    /// Run report could not be written
    #[error("Cannot write report {path}: {message}")]
    Report { path: PathBuf, message: String },
}

/// Errors reported by a patch matcher
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    /// Search bounds do not describe a valid placement inside the region
    #[error(
        "Invalid search bounds x=[{x_min}, {x_max}] y=[{y_min}, {y_max}] for a \
         {template_width}x{template_height} template in a {region_width}x{region_height} region"
    )]
    InvalidBounds {
        x_min: u32,
        x_max: u32,
        y_min: u32,
        y_max: u32,
        template_width: u32,
        template_height: u32,
        region_width: u32,
        region_height: u32,
    },

    /// Template has no intensity variation, so correlation is undefined
    #[error("Template patch has zero variance; normalized correlation is undefined")]
    FlatTemplate,

    /// Matching backend failed
    #[error("Matcher failure: {0}")]
    Engine(String),
}

/// Caller errors for isotonic regression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// Values and weights have different lengths
    #[error("Got {values} values but {weights} weights")]
    LengthMismatch { values: usize, weights: usize },

    /// Weight is zero, negative or NaN
    #[error("Weight {weight} at index {index} is not strictly positive")]
    NonPositiveWeight { index: usize, weight: f64 },
}

/// Failure while processing a single slice mid-run
#[derive(Debug, Clone, Error)]
pub enum SliceError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Errors that abort a registration run
#[derive(Debug, Clone, Error)]
pub enum RegistrationError {
    /// Filename z-grammar violation, detected before any slice is processed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Geometry violation, detected before any slice is processed
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// I/O failure outside of the per-slice loop
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid run settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A slice failed mid-run; slices already written stay on disk
    #[error("Slice {index} ({path}) failed: {source}")]
    Slice {
        index: usize,
        path: PathBuf,
        #[source]
        source: SliceError,
    },

    /// Background worker panicked or was aborted
    #[error("Registration worker failed: {0}")]
    Worker(String),
}

impl RegistrationError {
    /// Wrap a per-slice failure with the slice's 1-based index and path.
    pub fn slice(index: usize, path: impl Into<PathBuf>, source: impl Into<SliceError>) -> Self {
        RegistrationError::Slice {
            index,
            path: path.into(),
            source: source.into(),
        }
    }
}

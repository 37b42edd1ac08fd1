//! Configuration management for EM Registration.
//!
//! This module provides:
//! - Command-line arguments via clap, with one subcommand per tool
//! - Environment variables with `EMREG_` prefix
//! - The immutable [`RegistrationConfig`] handed to the registration pipeline
//!
//! # Example
//!
//! ```ignore
//! use em_registration::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Register(config) = cli.into_command() {
//!     config.validate()?;
//!     let pipeline_config = config.registration_config();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `EMREG_INPUT` - Folder with the input slices
//! - `EMREG_OUTPUT` - Folder receiving the registered slices
//! - `EMREG_EXTENSIONS` - Slice file extensions (default: tif,tiff)
//! - `EMREG_TEMPLATE` - Template patch as `x,y,width,height`
//! - `EMREG_MAX_SHIFT_X` / `EMREG_MAX_SHIFT_Y` - Search radius in pixels (default: 25)
//! - `EMREG_THICKNESS_CORRECTION` - Resample to a uniform z pitch first
//! - `EMREG_SLICE_THICKNESS_NM` - Target z pitch in nm (default: 5.0)
//! - `EMREG_PRESERVE_SLICE_ORDER` - Repair z by isotonic fit instead of sorting
//! - `EMREG_AUTO_CROP` - Remove black borders before registration
//! - `EMREG_METRIC` - Matching metric, `zncc` or `ssd` (default: zncc)
//! - `EMREG_PROGRESS_QUEUE` - Progress queue capacity (default: 64)
//! - `EMREG_REPORT` - Write a JSON run report to this path

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::register::{Metric, Rect};
use crate::stack::DEFAULT_SLICE_EXTENSIONS;
use crate::zaxis::{OrderPolicy, ZAxisResampler, DEFAULT_SLICE_THICKNESS_NM};

// =============================================================================
// Default Values
// =============================================================================

/// Default search radius along x, in pixels.
pub const DEFAULT_MAX_SHIFT_X: u32 = 25;

/// Default search radius along y, in pixels.
pub const DEFAULT_MAX_SHIFT_Y: u32 = 25;

/// Default capacity of the progress event queue.
pub const DEFAULT_PROGRESS_QUEUE: usize = 64;

// =============================================================================
// Pipeline Configuration
// =============================================================================

/// Settings for one registration run.
///
/// Built once by the caller and never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationConfig {
    /// Folder receiving the registered slices (created if missing)
    pub output_folder: PathBuf,

    /// Template patch in the reference slice, in uncropped coordinates
    pub template: Rect,

    /// Maximum per-slice search radius along x
    pub max_shift_x: u32,

    /// Maximum per-slice search radius along y
    pub max_shift_y: u32,

    /// Crop every slice to the non-black region of the reference slice
    pub auto_crop: bool,
}

impl RegistrationConfig {
    /// Configuration with default search radii and auto-crop disabled.
    pub fn new(output_folder: impl Into<PathBuf>, template: Rect) -> Self {
        Self {
            output_folder: output_folder.into(),
            template,
            max_shift_x: DEFAULT_MAX_SHIFT_X,
            max_shift_y: DEFAULT_MAX_SHIFT_Y,
            auto_crop: false,
        }
    }

    pub fn with_max_shift(mut self, x: u32, y: u32) -> Self {
        self.max_shift_x = x;
        self.max_shift_y = y;
        self
    }

    pub fn with_auto_crop(mut self, enabled: bool) -> Self {
        self.auto_crop = enabled;
        self
    }
}

/// Slice thickness correction applied to the slice list before registration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThicknessCorrection {
    pub slice_thickness_nm: f64,
    pub policy: OrderPolicy,
}

impl ThicknessCorrection {
    pub fn new(slice_thickness_nm: f64, preserve_slice_order: bool) -> Self {
        Self {
            slice_thickness_nm,
            policy: if preserve_slice_order {
                OrderPolicy::Preserve
            } else {
                OrderPolicy::Reorder
            },
        }
    }

    pub fn resampler(&self) -> ZAxisResampler {
        ZAxisResampler::new(self.slice_thickness_nm, self.policy)
    }
}

// =============================================================================
// CLI Structure
// =============================================================================

/// EM Registration - drift correction for electron-microscopy slice stacks.
#[derive(Parser, Debug)]
#[command(name = "em-registration")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a folder of slices against a template patch
    Register(RegisterConfig),

    /// Show the uniform-z resampling of a folder without registering it
    Resample(ResampleConfig),

    /// Show the non-black region of a single slice
    Autocrop(AutocropConfig),
}

/// Output format for the inspection subcommands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,

    /// Pretty-printed JSON
    Json,
}

// =============================================================================
// Register Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RegisterConfig {
    /// Folder containing the input slices.
    ///
    /// Slices are processed in lexicographic order; the first one is the
    /// reference slice holding the template patch.
    #[arg(env = "EMREG_INPUT")]
    pub input: PathBuf,

    /// Folder receiving the registered slices.
    #[arg(short, long, env = "EMREG_OUTPUT")]
    pub output: PathBuf,

    /// Slice file extensions to pick up (comma-separated, case-insensitive).
    #[arg(
        long,
        env = "EMREG_EXTENSIONS",
        value_delimiter = ',',
        default_values_t = DEFAULT_SLICE_EXTENSIONS.iter().map(|s| s.to_string())
    )]
    pub extensions: Vec<String>,

    /// Template patch in the reference slice as `x,y,width,height`.
    #[arg(short, long, env = "EMREG_TEMPLATE")]
    pub template: Rect,

    /// Maximum drift between consecutive slices along x, in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_SHIFT_X, env = "EMREG_MAX_SHIFT_X")]
    pub max_shift_x: u32,

    /// Maximum drift between consecutive slices along y, in pixels.
    #[arg(long, default_value_t = DEFAULT_MAX_SHIFT_Y, env = "EMREG_MAX_SHIFT_Y")]
    pub max_shift_y: u32,

    /// Resample the stack to a uniform z pitch before registering.
    ///
    /// Requires filenames like `slice_00025_z=0.2908um.tif`.
    #[arg(long, default_value_t = false, env = "EMREG_THICKNESS_CORRECTION")]
    pub thickness_correction: bool,

    /// Target z pitch in nanometers.
    #[arg(long, default_value_t = DEFAULT_SLICE_THICKNESS_NM, env = "EMREG_SLICE_THICKNESS_NM")]
    pub slice_thickness_nm: f64,

    /// Keep acquisition order and repair non-monotonic z by isotonic regression
    /// (default: sort slices by z).
    #[arg(long, default_value_t = false, env = "EMREG_PRESERVE_SLICE_ORDER")]
    pub preserve_slice_order: bool,

    /// Crop every slice to the non-black region of the reference slice.
    #[arg(long, default_value_t = false, env = "EMREG_AUTO_CROP")]
    pub auto_crop: bool,

    /// Similarity metric used to locate the template.
    #[arg(long, value_enum, default_value_t = Metric::Zncc, env = "EMREG_METRIC")]
    pub metric: Metric,

    /// Capacity of the progress event queue.
    #[arg(long, default_value_t = DEFAULT_PROGRESS_QUEUE, env = "EMREG_PROGRESS_QUEUE")]
    pub progress_queue: usize,

    /// Write a JSON run report (per-slice shifts, resample mapping) to this file.
    #[arg(long, env = "EMREG_REPORT")]
    pub report: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RegisterConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.template.is_empty() {
            return Err(format!(
                "Template patch must not be empty (got {}). Set --template x,y,width,height",
                self.template
            ));
        }

        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err("At least one slice extension is required".to_string());
        }

        validate_thickness(self.slice_thickness_nm)?;

        if self.progress_queue == 0 {
            return Err("progress_queue must be greater than 0".to_string());
        }

        if self.input == self.output {
            return Err(
                "Output folder must differ from the input folder; registered slices \
                 would otherwise be picked up as input on the next run"
                    .to_string(),
            );
        }

        Ok(())
    }

    pub fn registration_config(&self) -> RegistrationConfig {
        RegistrationConfig::new(self.output.clone(), self.template)
            .with_max_shift(self.max_shift_x, self.max_shift_y)
            .with_auto_crop(self.auto_crop)
    }

    /// The correction to apply, or `None` when it is disabled.
    pub fn thickness_correction(&self) -> Option<ThicknessCorrection> {
        self.thickness_correction
            .then(|| ThicknessCorrection::new(self.slice_thickness_nm, self.preserve_slice_order))
    }
}

// =============================================================================
// Resample Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ResampleConfig {
    /// Folder containing z-encoded slices.
    #[arg(env = "EMREG_INPUT")]
    pub input: PathBuf,

    /// Slice file extensions to pick up (comma-separated, case-insensitive).
    #[arg(
        long,
        env = "EMREG_EXTENSIONS",
        value_delimiter = ',',
        default_values_t = DEFAULT_SLICE_EXTENSIONS.iter().map(|s| s.to_string())
    )]
    pub extensions: Vec<String>,

    /// Target z pitch in nanometers.
    #[arg(long, default_value_t = DEFAULT_SLICE_THICKNESS_NM, env = "EMREG_SLICE_THICKNESS_NM")]
    pub slice_thickness_nm: f64,

    /// Keep acquisition order and repair non-monotonic z by isotonic regression.
    #[arg(long, default_value_t = false, env = "EMREG_PRESERVE_SLICE_ORDER")]
    pub preserve_slice_order: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ResampleConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_thickness(self.slice_thickness_nm)
    }

    pub fn thickness_correction(&self) -> ThicknessCorrection {
        ThicknessCorrection::new(self.slice_thickness_nm, self.preserve_slice_order)
    }
}

// =============================================================================
// Autocrop Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct AutocropConfig {
    /// Slice to inspect.
    pub image: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

fn validate_thickness(slice_thickness_nm: f64) -> Result<(), String> {
    if !slice_thickness_nm.is_finite() || slice_thickness_nm <= 0.0 {
        return Err(format!(
            "slice_thickness_nm must be a positive number (got {})",
            slice_thickness_nm
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

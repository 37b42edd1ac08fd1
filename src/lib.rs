//! # EM Registration
//!
//! Drift correction for electron-microscopy z-stacks.
//!
//! A stack is a folder of 2D grayscale slices. Acquisition introduces a
//! lateral drift between consecutive slices; this library tracks a template
//! patch from the first slice through the stack, translates every slice so
//! the patch stays put, and writes the aligned slices to an output folder.
//!
//! ## Features
//!
//! - **Template tracking**: bounded exhaustive search around the last known
//!   template position, with shifts measured against the first slice
//! - **Auto-crop**: removal of the pure-black border left by the acquisition
//! - **Slice thickness correction**: nearest-neighbor resampling of an
//!   irregularly spaced stack to a uniform z pitch, with isotonic repair of
//!   non-monotonic z-positions
//! - **Background execution**: bounded progress queue and cooperative
//!   cancellation
//!
//! ## Architecture
//!
//! - [`stack`] - Slice discovery and the filename z-grammar
//! - [`zaxis`] - Isotonic regression and z-axis resampling
//! - [`register`] - Geometry, pixels, auto-crop, matching, pipeline and worker
//! - [`config`] - CLI and configuration types
//! - [`error`] - Error taxonomy
//!
//! ## Example
//!
//! ```rust,no_run
//! use em_registration::{
//!     list_slices, spawn_registration, CorrelationEngine, Metric, Rect, RegistrationConfig,
//!     RegistrationJob, DEFAULT_SLICE_EXTENSIONS,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let slices = list_slices("stack/".as_ref(), DEFAULT_SLICE_EXTENSIONS)?;
//!     let config = RegistrationConfig::new("registered/", Rect::new(512, 512, 128, 128));
//!     let matcher = CorrelationEngine::open(Metric::Zncc)?;
//!
//!     let mut handle = spawn_registration(RegistrationJob { config, slices, matcher }, 64);
//!     while let Some(event) = handle.next_progress().await {
//!         println!("{:.1}%", 100.0 * event.fraction);
//!     }
//!
//!     let (outcome, engine) = handle.finish().await?;
//!     engine.close();
//!     println!("{} slice(s) registered", outcome.processed());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod register;
pub mod stack;
pub mod zaxis;

// Re-export commonly used types
pub use config::{
    AutocropConfig, Cli, Command, OutputFormat, RegisterConfig, RegistrationConfig,
    ResampleConfig, ThicknessCorrection,
};
pub use error::{
    FitError, GeometryError, IoError, MatchError, ParseError, RegistrationError, SliceError,
};
pub use register::{
    format_duration, non_black_region, output_filename, spawn_registration,
    spawn_registration_with, CancelToken, CorrelationEngine, EngineStats, EtaEstimator,
    IntensityGrid, MatchPosition, Metric, PatchMatcher, ProgressEvent, Rect, RegistrationHandle,
    RegistrationJob, RegistrationPipeline, RunOutcome, RunStatus, SearchBounds, SearchWindow,
    SliceImage, SliceShift,
};
pub use stack::{list_slices, parse_z_position, SlicePosition, DEFAULT_SLICE_EXTENSIONS};
pub use zaxis::{
    resampled_paths, OrderPolicy, ResampleMapping, ZAxisResampler, ZSlice,
    DEFAULT_SLICE_THICKNESS_NM,
};

//! Sequential slice registration.
//!
//! # State machine
//!
//! ```text
//! Init ──► AutoCrop? ──► ExtractTemplate ──► PerSlice loop ──► Completed
//!                                               │    │
//!                                               │    └──────► Cancelled
//!                                               └───────────► Err (abort)
//! ```
//!
//! # Per-slice step
//!
//! 1. Poll the cancellation check; stop before touching the slice if set.
//! 2. Derive the search window from the last known template position.
//! 3. Load the slice (auto-cropped if enabled) and cut out the window.
//! 4. Ask the [`PatchMatcher`] for the best template offset inside the window.
//! 5. Convert to absolute coordinates.
//! 6. Shift = absolute position minus the reference template position.
//! 7. Translate the slice by `-shift` and write it to the output folder.
//! 8. Remember the absolute position for the next window.
//! 9. Update the ETA and report progress.
//!
//! Each slice depends on the previous slice's position, so the loop is
//! strictly sequential. Any load, match or save failure aborts the run;
//! slices written so far stay on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::autocrop::non_black_region;
use super::geometry::{Rect, SearchWindow};
use super::image::{IntensityGrid, SliceImage};
use super::matcher::{PatchMatcher, SearchBounds};
use super::progress::{format_duration, EtaEstimator, ProgressEvent};
use crate::config::RegistrationConfig;
use crate::error::{GeometryError, IoError, RegistrationError, SliceError};

// =============================================================================
// Run Outcome
// =============================================================================

/// How a run ended when it did not abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every slice was registered
    Completed,

    /// The cancellation check fired; the slices listed were fully written
    Cancelled,
}

/// Registration result for one slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceShift {
    /// 1-based position in the processed slice list
    pub index: usize,

    /// Input slice
    pub source: PathBuf,

    /// Registered slice
    pub output: PathBuf,

    /// Shift relative to the reference slice; the slice was translated by `-dx, -dy`
    pub dx: i64,
    pub dy: i64,

    /// Absolute template position found in this slice
    pub match_x: u32,
    pub match_y: u32,
}

/// Result of a run that was not aborted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,

    /// Number of slices handed to the pipeline
    pub total_slices: usize,

    /// One entry per written slice, in processing order
    pub shifts: Vec<SliceShift>,
}

impl RunOutcome {
    /// Number of slices written.
    pub fn processed(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

/// Output path for the slice at 0-based position `index`:
/// `{index:05}_{stem}_registered{.ext}`.
///
/// The extension is everything from the last `.` of the file name; a name
/// without a dot gets the suffix appended.
pub fn output_filename(index: usize, input: &Path, folder: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file = match name.rfind('.') {
        Some(dot) => format!("{:05}_{}_registered{}", index, &name[..dot], &name[dot..]),
        None => format!("{:05}_{}_registered", index, name),
    };

    folder.join(file)
}

// =============================================================================
// Pipeline
// =============================================================================

/// Template-tracking registration over an ordered slice list.
///
/// Progress reporting and cancellation are injected as plain closures:
/// `progress` is called once per written slice, `is_cancelled` is polled
/// once before each slice.
pub struct RegistrationPipeline<M, P, C> {
    config: RegistrationConfig,
    matcher: M,
    progress: P,
    is_cancelled: C,
}

/// Reference-slice state derived at `Init`.
struct Reference {
    image: SliceImage,
    crop: Option<Rect>,
    template: Rect,
    patch: IntensityGrid,
}

impl<M, P, C> RegistrationPipeline<M, P, C>
where
    M: PatchMatcher,
    P: FnMut(ProgressEvent),
    C: Fn() -> bool,
{
    pub fn new(config: RegistrationConfig, matcher: M, progress: P, is_cancelled: C) -> Self {
        Self {
            config,
            matcher,
            progress,
            is_cancelled,
        }
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Give the matcher back, e.g. to close it.
    pub fn into_matcher(self) -> M {
        self.matcher
    }

    /// Register `slices` in order; `slices[0]` is the reference slice.
    ///
    /// # Errors
    ///
    /// Configuration and geometry problems are reported before any output is
    /// written. Failures on an individual slice are reported as
    /// [`RegistrationError::Slice`]; earlier outputs are kept.
    pub fn run(&mut self, slices: &[PathBuf]) -> Result<RunOutcome, RegistrationError> {
        let total = slices.len();
        let Some(reference_path) = slices.first() else {
            return Err(RegistrationError::Config("no slices to register".to_string()));
        };

        let template = self.config.template;
        if template.is_empty() {
            return Err(GeometryError::EmptyTemplate {
                x: template.x,
                y: template.y,
                width: template.width,
                height: template.height,
            }
            .into());
        }

        info!("Reference patch: {}", template);
        info!(
            "Maximum shift in pixels: X={} Y={}",
            self.config.max_shift_x, self.config.max_shift_y
        );

        let reference = self.prepare_reference(reference_path)?;
        let initial = (reference.template.x, reference.template.y);
        let expected = reference.image.dimensions();
        let patch_size = (reference.template.width, reference.template.height);

        // The first window is fixed by the reference alone; later ones follow the drift
        SearchWindow::around(
            initial,
            (self.config.max_shift_x, self.config.max_shift_y),
            patch_size,
            expected,
        )?;

        create_output_folder(&self.config.output_folder)?;

        let mut first = Some(reference.image);
        let mut prev = initial;
        let mut eta = EtaEstimator::new();
        let mut shifts = Vec::with_capacity(total);
        let mut status = RunStatus::Completed;

        for (i, path) in slices.iter().enumerate() {
            let k = i + 1;

            if (self.is_cancelled)() {
                warn!("Registration cancelled after {} of {} slice(s)", i, total);
                status = RunStatus::Cancelled;
                break;
            }

            info!("Image {}/{}: {}", k, total, path.display());
            let started = Instant::now();

            let image = match first.take() {
                Some(image) => image,
                None => load_slice(path, reference.crop)
                    .map_err(|e| RegistrationError::slice(k, path, e))?,
            };
            let loaded = started.elapsed();

            if image.dimensions() != expected {
                return Err(RegistrationError::slice(
                    k,
                    path,
                    GeometryError::DimensionMismatch {
                        width: image.width(),
                        height: image.height(),
                        expected_width: expected.0,
                        expected_height: expected.1,
                    },
                ));
            }

            let match_started = Instant::now();
            let found = if k == 1 {
                initial
            } else {
                self.locate(&image, &reference.patch, prev, patch_size)
                    .map_err(|e| RegistrationError::slice(k, path, e))?
            };
            let matched = match_started.elapsed();

            let dx = found.0 as i64 - initial.0 as i64;
            let dy = found.1 as i64 - initial.1 as i64;
            info!(
                "Shift: dx={} dy={} compared to first slice; dx={} dy={} compared to previous slice",
                dx,
                dy,
                found.0 as i64 - prev.0 as i64,
                found.1 as i64 - prev.1 as i64
            );
            prev = found;

            let save_started = Instant::now();
            let output = output_filename(i, path, &self.config.output_folder);
            image
                .translate(-dx, -dy)
                .save(&output)
                .map_err(|e| RegistrationError::slice(k, path, e))?;
            let saved = save_started.elapsed();

            debug!(
                "Load {}, register {}, save {} (ms)",
                loaded.as_millis(),
                matched.as_millis(),
                saved.as_millis()
            );

            eta.record(started.elapsed());
            let remaining = eta.eta(total - k);
            info!("ETA={}", format_duration(remaining));

            shifts.push(SliceShift {
                index: k,
                source: path.clone(),
                output: output.clone(),
                dx,
                dy,
                match_x: found.0,
                match_y: found.1,
            });

            (self.progress)(ProgressEvent {
                slice: k,
                total,
                fraction: k as f64 / total as f64,
                shift_x: dx,
                shift_y: dy,
                output,
                eta: remaining,
            });
        }

        Ok(RunOutcome {
            status,
            total_slices: total,
            shifts,
        })
    }

    /// Load the reference slice, apply auto-crop and extract the template patch.
    fn prepare_reference(&self, path: &Path) -> Result<Reference, RegistrationError> {
        let mut image = SliceImage::open(path).map_err(|e| RegistrationError::slice(1, path, e))?;
        let mut template = self.config.template;
        let mut crop = None;

        if self.config.auto_crop {
            let region = non_black_region(&image);
            info!("Autocropping to {}", region);

            let overlap = region
                .intersection(&template)
                .ok_or_else(|| GeometryError::CropTemplateDisjoint {
                    crop: region.to_string(),
                    template: template.to_string(),
                })?;

            template = overlap.relative_to(&region);
            info!("Template patch relative to the auto-cropped slice: {}", template);

            image = image.crop(region);
            crop = Some(region);
        }

        let (width, height) = image.dimensions();
        if !template.fits_within(width, height) {
            return Err(GeometryError::TemplateOutOfBounds {
                template: template.to_string(),
                width,
                height,
            }
            .into());
        }

        let patch = image.crop(template).to_intensity();

        Ok(Reference {
            image,
            crop,
            template,
            patch,
        })
    }

    /// Absolute template position in `image`, searched around `prev`.
    fn locate(
        &mut self,
        image: &SliceImage,
        patch: &IntensityGrid,
        prev: (u32, u32),
        patch_size: (u32, u32),
    ) -> Result<(u32, u32), SliceError> {
        let window = SearchWindow::around(
            prev,
            (self.config.max_shift_x, self.config.max_shift_y),
            patch_size,
            image.dimensions(),
        )?;

        let region = image.crop(window.rect).to_intensity();
        let bounds = SearchBounds::up_to(window.max_offset_x, window.max_offset_y);
        let best = self.matcher.find_best_match(&region, patch, bounds)?;

        Ok((window.rect.x + best.x, window.rect.y + best.y))
    }
}

fn load_slice(path: &Path, crop: Option<Rect>) -> Result<SliceImage, IoError> {
    let image = SliceImage::open(path)?;
    Ok(match crop {
        Some(rect) => image.crop(rect),
        None => image,
    })
}

fn create_output_folder(folder: &Path) -> Result<(), IoError> {
    fs::create_dir_all(folder).map_err(|e| IoError::CreateDir {
        path: folder.to_path_buf(),
        message: e.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================

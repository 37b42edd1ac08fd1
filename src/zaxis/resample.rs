//! Slice-thickness correction by nearest-neighbor resampling along z.
//!
//! FIB-SEM stacks are nominally acquired at a fixed milling pitch, but the
//! per-slice z estimates reported by the microscope drift and occasionally go
//! backwards. The resampler turns such an irregular sequence into a uniformly
//! spaced one by picking, for each desired z, the nearest original slice.
//!
//! # Pipeline
//!
//! ```text
//! paths ──► parse z ──► monotonic? ──no──► repair ──► nearest-neighbor ──► mappings
//!                           │              (reorder or          resample
//!                           └──yes─────────  isotonic)  ──────────┘
//! ```
//!
//! When the sequence is not strictly increasing it is repaired according to
//! an [`OrderPolicy`]:
//!
//! - [`OrderPolicy::Reorder`] stably sorts slices by z.
//! - [`OrderPolicy::Preserve`] keeps acquisition order and replaces the z values
//!   by their isotonic regression, then spreads every flat run of equal values
//!   by a tiny epsilon so the sequence becomes strictly increasing.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::isotonic;
use crate::error::ParseError;
use crate::stack::parse_z_positions;

/// Default slice thickness in nanometers.
pub const DEFAULT_SLICE_THICKNESS_NM: f64 = 5.0;

/// Spacing aimed for between values of a flattened run, in micrometers (0.1 nm).
const IDEAL_FLAT_RUN_EPS_UM: f64 = 0.1 / 1000.0;

/// Fraction of the allowed perturbation actually used, so run endpoints never
/// land exactly on their neighbors.
const FLAT_RUN_SAFETY: f64 = 0.95;

// =============================================================================
// Types
// =============================================================================

/// How to repair a z-sequence that is not strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Sort slices by ascending z (loses acquisition order)
    Reorder,

    /// Keep acquisition order and smooth z with isotonic regression
    Preserve,
}

/// One original slice with its z-position in micrometers.
#[derive(Debug, Clone, PartialEq)]
pub struct ZSlice {
    pub path: PathBuf,
    pub z_um: f64,
}

/// Mapping from a uniformly spaced output position to the chosen original slice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampleMapping {
    /// Desired z-position in micrometers
    pub desired_z: f64,

    /// (Possibly repaired) z-position of the chosen original slice
    pub original_z: f64,

    /// Index of the chosen slice in the repaired sequence
    pub original_index: usize,

    /// Path of the chosen slice
    pub original_path: PathBuf,
}

// =============================================================================
// Resampler
// =============================================================================

/// Nearest-neighbor z-axis resampler.
#[derive(Debug, Clone)]
pub struct ZAxisResampler {
    /// Output pitch in nanometers
    slice_thickness_nm: f64,

    /// Repair policy for non-monotonic input
    policy: OrderPolicy,
}

impl ZAxisResampler {
    /// Create a resampler with the given output pitch (nanometers).
    ///
    /// The pitch must be positive and finite; configuration validation
    /// enforces this before a resampler is built.
    pub fn new(slice_thickness_nm: f64, policy: OrderPolicy) -> Self {
        Self {
            slice_thickness_nm,
            policy,
        }
    }

    /// Output pitch in nanometers.
    pub fn slice_thickness_nm(&self) -> f64 {
        self.slice_thickness_nm
    }

    /// Repair policy.
    pub fn policy(&self) -> OrderPolicy {
        self.policy
    }

    /// Parse z-positions from the filenames and resample.
    ///
    /// Every filename is parsed before any resampling happens, so a single
    /// malformed name rejects the whole stack.
    pub fn resample_paths(&self, paths: &[PathBuf]) -> Result<Vec<ResampleMapping>, ParseError> {
        let zs = parse_z_positions(paths)?;
        let slices = paths
            .iter()
            .cloned()
            .zip(zs)
            .map(|(path, z_um)| ZSlice { path, z_um })
            .collect();
        Ok(self.resample(slices))
    }

    /// Repair (if needed) and resample already-parsed slices.
    pub fn resample(&self, mut slices: Vec<ZSlice>) -> Vec<ResampleMapping> {
        if slices.is_empty() {
            return Vec::new();
        }

        let zs: Vec<f64> = slices.iter().map(|s| s.z_um).collect();
        if !is_strictly_increasing(&zs) {
            match self.policy {
                OrderPolicy::Preserve => {
                    warn!("Slice z-positions are not monotonically increasing; applying isotonic regression");
                    let mut repaired = isotonic::fit(&zs);
                    make_strictly_monotonic(&mut repaired);
                    for (slice, z) in slices.iter_mut().zip(repaired) {
                        debug!("{} -> {} {}", slice.z_um, z, slice.path.display());
                        slice.z_um = z;
                    }
                }
                OrderPolicy::Reorder => {
                    warn!("Slice z-positions are not monotonically increasing; re-ordering slices by z");
                    slices.sort_by(|a, b| a.z_um.total_cmp(&b.z_um));
                }
            }
        }

        nearest_neighbor_resample(&slices, self.slice_thickness_nm)
    }
}

/// Paths of the chosen originals, in output order.
pub fn resampled_paths(mappings: &[ResampleMapping]) -> Vec<PathBuf> {
    mappings.iter().map(|m| m.original_path.clone()).collect()
}

/// Number of uniformly spaced output slices between `z_first` and `z_last`.
///
/// Computed as `floor((z_last - z_first) / dz + dz / 2)`, with `dz` in
/// micrometers.
pub fn resampled_count(z_first: f64, z_last: f64, dz_um: f64) -> usize {
    let n = ((z_last - z_first) / dz_um + dz_um / 2.0).floor();
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

fn nearest_neighbor_resample(slices: &[ZSlice], slice_thickness_nm: f64) -> Vec<ResampleMapping> {
    let dz = slice_thickness_nm / 1000.0;
    let z_first = slices[0].z_um;
    let z_last = slices[slices.len() - 1].z_um;
    let count = resampled_count(z_first, z_last, dz);

    info!(
        "Resampling z in [{}, {}] um at {} nm: {} original slice(s) -> {} resampled slice(s)",
        z_first,
        z_last,
        slice_thickness_nm,
        slices.len(),
        count
    );
    if count == 0 {
        warn!("Z-range is shorter than one slice thickness; resampling yields no slices");
    }

    let mut nearest = 0usize;
    let mut mappings = Vec::with_capacity(count);

    for i in 0..count {
        let desired_z = z_first + i as f64 * dz;

        // `>=` rather than `>`: duplicate z-values must be stepped over, or the
        // pointer would stall on the first of them.
        while nearest + 1 < slices.len()
            && (slices[nearest].z_um - desired_z).abs()
                >= (slices[nearest + 1].z_um - desired_z).abs()
        {
            nearest += 1;
        }

        let chosen = &slices[nearest];
        debug!(
            "Resampled slice {} at z={} -> original z={} (index {}) {}",
            i,
            desired_z,
            chosen.z_um,
            nearest,
            chosen.path.display()
        );

        mappings.push(ResampleMapping {
            desired_z,
            original_z: chosen.z_um,
            original_index: nearest,
            original_path: chosen.path.clone(),
        });
    }

    mappings
}

// =============================================================================
// Monotonicity
// =============================================================================

/// Whether every z is strictly greater than its predecessor.
pub fn is_strictly_increasing(zs: &[f64]) -> bool {
    zs.windows(2).all(|w| w[1] > w[0])
}

/// Turn a non-decreasing sequence into a strictly increasing one.
///
/// Each maximal run of exactly equal values is spread linearly around its
/// midpoint. The spread stays below the gap to the neighboring values, so
/// no value crosses a neighbor and indices outside the run are untouched.
/// Values are in micrometers.
pub fn make_strictly_monotonic(zs: &mut [f64]) {
    let mut start = 0;
    while start < zs.len() {
        let mut end = start;
        while end + 1 < zs.len() && zs[end + 1] == zs[start] {
            end += 1;
        }
        if end > start {
            spread_flat_run(zs, start, end);
        }
        start = end + 1;
    }
}

/// Spread the equal values `zs[first..=last]` (with `first < last`).
fn spread_flat_run(zs: &mut [f64], first: usize, last: usize) {
    let steps = (last - first) as f64;

    let gap_left = if first == 0 {
        f64::INFINITY
    } else {
        zs[first] - zs[first - 1]
    };
    let gap_right = if last == zs.len() - 1 {
        f64::INFINITY
    } else {
        zs[last + 1] - zs[last]
    };

    // Endpoints move by (steps / 2) * eps, which must stay below the gap
    let max_eps = 2.0 * gap_left.min(gap_right) / steps;
    let eps = FLAT_RUN_SAFETY * IDEAL_FLAT_RUN_EPS_UM.min(max_eps);

    let mid = (first + last) as f64 / 2.0;
    for (i, z) in zs.iter_mut().enumerate().take(last + 1).skip(first) {
        *z += (i as f64 - mid) * eps;
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Patch matching.
//!
//! The registration loop only needs one capability from its compute backend:
//! find the offset inside a search region where a fixed-size template fits
//! best, restricted to integer bounds on each axis. [`PatchMatcher`] is that
//! contract.
//!
//! # Serialization
//!
//! `find_best_match` takes `&mut self`, so a matcher can never be entered from
//! two places at once. Backends bound to a single stateful device or session
//! rely on this: the caller owns the matcher, moves it into the registration
//! worker for the duration of a run, and gets it back afterwards.
//!
//! # Built-in backend
//!
//! [`CorrelationEngine`] is an exhaustive CPU search with an explicit
//! `open`/`close` lifecycle. It scores every candidate offset with either
//! zero-mean normalized cross-correlation ([`Metric::Zncc`]) or the sum of
//! squared differences ([`Metric::Ssd`]).

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use super::image::IntensityGrid;
use crate::error::MatchError;

// =============================================================================
// Contract
// =============================================================================

/// Inclusive range of template offsets to try, relative to the search region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBounds {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl SearchBounds {
    /// Every placement of a template inside a region, i.e.
    /// `[0, max_x] x [0, max_y]`.
    pub fn up_to(max_x: u32, max_y: u32) -> Self {
        Self {
            x_min: 0,
            x_max: max_x,
            y_min: 0,
            y_max: max_y,
        }
    }

    /// Check that every offset places the template fully inside the region.
    pub fn validate(
        &self,
        region: &IntensityGrid,
        template: &IntensityGrid,
    ) -> Result<(), MatchError> {
        let fits = self.x_min <= self.x_max
            && self.y_min <= self.y_max
            && self.x_max as u64 + template.width as u64 <= region.width as u64
            && self.y_max as u64 + template.height as u64 <= region.height as u64
            && template.width > 0
            && template.height > 0;

        if fits {
            Ok(())
        } else {
            Err(MatchError::InvalidBounds {
                x_min: self.x_min,
                x_max: self.x_max,
                y_min: self.y_min,
                y_max: self.y_max,
                template_width: template.width,
                template_height: template.height,
                region_width: region.width,
                region_height: region.height,
            })
        }
    }
}

/// Best-matching template offset, relative to the search region's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPosition {
    pub x: u32,
    pub y: u32,
}

/// Locate a fixed-size template inside a larger search region.
pub trait PatchMatcher {
    /// Return the offset within `region` whose window best matches `template`,
    /// considering only offsets inside `bounds`.
    fn find_best_match(
        &mut self,
        region: &IntensityGrid,
        template: &IntensityGrid,
        bounds: SearchBounds,
    ) -> Result<MatchPosition, MatchError>;
}

impl<M: PatchMatcher + ?Sized> PatchMatcher for &mut M {
    fn find_best_match(
        &mut self,
        region: &IntensityGrid,
        template: &IntensityGrid,
        bounds: SearchBounds,
    ) -> Result<MatchPosition, MatchError> {
        (**self).find_best_match(region, template, bounds)
    }
}

impl<M: PatchMatcher + ?Sized> PatchMatcher for Box<M> {
    fn find_best_match(
        &mut self,
        region: &IntensityGrid,
        template: &IntensityGrid,
        bounds: SearchBounds,
    ) -> Result<MatchPosition, MatchError> {
        (**self).find_best_match(region, template, bounds)
    }
}

// =============================================================================
// Correlation Engine
// =============================================================================

/// Similarity criterion for [`CorrelationEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Zero-mean normalized cross-correlation (higher is better)
    #[default]
    Zncc,

    /// Sum of squared differences (lower is better)
    Ssd,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Zncc => write!(f, "zncc"),
            Metric::Ssd => write!(f, "ssd"),
        }
    }
}

/// Counters reported when an engine is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStats {
    /// Number of `find_best_match` calls served
    pub matches: u64,

    /// Total candidate offsets scored
    pub candidates: u64,
}

/// Exhaustive CPU template matcher.
///
/// Ties are resolved in favor of the first candidate in row-major order
/// (smallest `y`, then smallest `x`), which makes results deterministic.
#[derive(Debug)]
pub struct CorrelationEngine {
    metric: Metric,
    stats: EngineStats,
}

impl CorrelationEngine {
    /// Acquire an engine session.
    pub fn open(metric: Metric) -> Result<Self, MatchError> {
        info!("Opening correlation engine (metric: {})", metric);
        Ok(Self {
            metric,
            stats: EngineStats::default(),
        })
    }

    /// Release the session and return its usage counters.
    pub fn close(self) -> EngineStats {
        info!(
            "Closing correlation engine after {} match(es), {} candidate(s)",
            self.stats.matches, self.stats.candidates
        );
        self.stats
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }
}

impl PatchMatcher for CorrelationEngine {
    fn find_best_match(
        &mut self,
        region: &IntensityGrid,
        template: &IntensityGrid,
        bounds: SearchBounds,
    ) -> Result<MatchPosition, MatchError> {
        bounds.validate(region, template)?;

        let (best, scored) = match self.metric {
            Metric::Zncc => search_zncc(region, template, bounds)?,
            Metric::Ssd => search_ssd(region, template, bounds),
        };

        self.stats.matches += 1;
        self.stats.candidates += scored;
        debug!("Best match at ({}, {}) after {} candidate(s)", best.x, best.y, scored);

        Ok(best)
    }
}

fn candidates(bounds: SearchBounds) -> impl Iterator<Item = (u32, u32)> {
    (bounds.y_min..=bounds.y_max)
        .flat_map(move |y| (bounds.x_min..=bounds.x_max).map(move |x| (x, y)))
}

fn search_zncc(
    region: &IntensityGrid,
    template: &IntensityGrid,
    bounds: SearchBounds,
) -> Result<(MatchPosition, u64), MatchError> {
    let n = (template.width as usize * template.height as usize) as f64;

    let t_mean = template.data.iter().map(|&v| v as f64).sum::<f64>() / n;
    let centered: Vec<f64> = template.data.iter().map(|&v| v as f64 - t_mean).collect();
    let t_norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
    if t_norm == 0.0 {
        return Err(MatchError::FlatTemplate);
    }

    let tw = template.width as usize;
    let mut best = MatchPosition {
        x: bounds.x_min,
        y: bounds.y_min,
    };
    let mut best_score = f64::NEG_INFINITY;
    let mut scored = 0u64;

    for (x, y) in candidates(bounds) {
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut cross = 0.0f64;

        for ty in 0..template.height {
            let row = &region.row(y + ty)[x as usize..x as usize + tw];
            let t_row = &centered[ty as usize * tw..(ty as usize + 1) * tw];
            for (&r, &t) in row.iter().zip(t_row) {
                let r = r as f64;
                sum += r;
                sum_sq += r * r;
                cross += r * t;
            }
        }

        // sum(t_centered) == 0, so cross already equals sum((r - r_mean) * t_centered)
        let variance = (sum_sq - sum * sum / n).max(0.0);
        let score = if variance > 0.0 {
            cross / (variance.sqrt() * t_norm)
        } else {
            0.0
        };

        scored += 1;
        if score > best_score {
            best_score = score;
            best = MatchPosition { x, y };
        }
    }

    Ok((best, scored))
}

fn search_ssd(
    region: &IntensityGrid,
    template: &IntensityGrid,
    bounds: SearchBounds,
) -> (MatchPosition, u64) {
    let tw = template.width as usize;
    let mut best = MatchPosition {
        x: bounds.x_min,
        y: bounds.y_min,
    };
    let mut best_score = f64::INFINITY;
    let mut scored = 0u64;

    for (x, y) in candidates(bounds) {
        let mut ssd = 0.0f64;
        for ty in 0..template.height {
            let row = &region.row(y + ty)[x as usize..x as usize + tw];
            for (&r, &t) in row.iter().zip(template.row(ty)) {
                let d = (r - t) as f64;
                ssd += d * d;
            }
            if ssd >= best_score {
                break;
            }
        }

        scored += 1;
        if ssd < best_score {
            best_score = ssd;
            best = MatchPosition { x, y };
        }
    }

    (best, scored)
}

// =============================================================================
// Tests
// =============================================================================

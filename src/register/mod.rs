//! Slice registration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  spawn_registration (worker)                 │
//! │        bounded progress queue, cooperative cancellation      │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    RegistrationPipeline                      │
//! │   reference slice ─► auto-crop ─► template ─► per-slice loop │
//! └──────┬───────────────────┬───────────────────────┬───────────┘
//!        ▼                   ▼                       ▼
//! ┌─────────────┐   ┌─────────────────┐   ┌──────────────────────┐
//! │ SliceImage  │   │  SearchWindow   │   │    PatchMatcher      │
//! │ load/crop/  │   │  (geometry)     │   │ (CorrelationEngine)  │
//! │ translate   │   └─────────────────┘   └──────────────────────┘
//! └─────────────┘
//! ```

mod autocrop;
mod geometry;
mod image;
mod matcher;
mod pipeline;
mod progress;
mod worker;

pub use autocrop::non_black_region;
pub use geometry::{Rect, SearchWindow};
pub use image::{Gray16Image, IntensityGrid, SliceImage};
pub use matcher::{
    CorrelationEngine, EngineStats, MatchPosition, Metric, PatchMatcher, SearchBounds,
};
pub use pipeline::{output_filename, RegistrationPipeline, RunOutcome, RunStatus, SliceShift};
pub use progress::{format_duration, EtaEstimator, ProgressEvent, ETA_SMOOTHING};
pub use worker::{
    spawn_registration, spawn_registration_with, CancelToken, RegistrationHandle,
    RegistrationJob, WorkerResult,
};

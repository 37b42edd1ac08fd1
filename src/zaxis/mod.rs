//! Z-axis correction.
//!
//! Slice thickness correction turns an irregularly z-spaced stack into a
//! uniformly spaced one before registration:
//!
//! ```text
//! ┌───────────────────────────┐
//! │  slice paths (z in name)  │
//! └─────────────┬─────────────┘
//!               ▼
//! ┌───────────────────────────┐      ┌──────────────────────┐
//! │      ZAxisResampler       │─────►│  isotonic::fit (PAVA) │
//! │  (repair + nearest z)     │      └──────────────────────┘
//! └─────────────┬─────────────┘
//!               ▼
//! ┌───────────────────────────┐
//! │  Vec<ResampleMapping>     │
//! └───────────────────────────┘
//! ```

pub mod isotonic;
mod resample;

pub use resample::{
    is_strictly_increasing, make_strictly_monotonic, resampled_count, resampled_paths,
    OrderPolicy, ResampleMapping, ZAxisResampler, ZSlice, DEFAULT_SLICE_THICKNESS_NM,
};

//! Isotonic regression via the Pool Adjacent Violators Algorithm (PAVA).
//!
//! Given samples `a[i]` with strictly positive weights `w[i]`, [`fit_weighted`]
//! returns `y` minimizing `sum w[i] * (y[i] - a[i])^2` subject to
//! `y[0] <= y[1] <= ... <= y[n-1]`.
//!
//! The solver keeps a stack of blocks, each holding the weighted mean and
//! total weight of a contiguous run of samples. Every new sample is pushed as
//! its own block; while the top block's mean is below the one underneath, the
//! two are pooled. Surviving blocks are finally expanded back to one value per
//! input index.

use crate::error::FitError;

/// A pooled run of consecutive samples.
#[derive(Debug, Clone, Copy)]
struct Block {
    mean: f64,
    weight: f64,
    /// Number of original samples covered by this block
    len: usize,
}

/// Unweighted isotonic regression (all weights 1.0).
pub fn fit(values: &[f64]) -> Vec<f64> {
    let blocks = pool(values.iter().map(|&v| (v, 1.0)));
    expand(&blocks, values.len())
}

/// Weighted isotonic regression.
///
/// # Errors
///
/// Returns [`FitError`] if `weights` has a different length than `values` or
/// contains a weight that is not strictly positive.
pub fn fit_weighted(values: &[f64], weights: &[f64]) -> Result<Vec<f64>, FitError> {
    if values.len() != weights.len() {
        return Err(FitError::LengthMismatch {
            values: values.len(),
            weights: weights.len(),
        });
    }

    if let Some((index, &weight)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| w.is_nan() || **w <= 0.0)
    {
        return Err(FitError::NonPositiveWeight { index, weight });
    }

    let blocks = pool(values.iter().copied().zip(weights.iter().copied()));
    Ok(expand(&blocks, values.len()))
}

fn pool(samples: impl Iterator<Item = (f64, f64)>) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();

    for (value, weight) in samples {
        let mut top = Block {
            mean: value,
            weight,
            len: 1,
        };

        while let Some(prev) = blocks.last() {
            if top.mean >= prev.mean {
                break;
            }
            let total = prev.weight + top.weight;
            top = Block {
                mean: (prev.weight * prev.mean + top.weight * top.mean) / total,
                weight: total,
                len: prev.len + top.len,
            };
            blocks.pop();
        }

        blocks.push(top);
    }

    blocks
}

fn expand(blocks: &[Block], n: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(n);
    for block in blocks {
        out.extend(std::iter::repeat(block.mean).take(block.len));
    }
    debug_assert_eq!(out.len(), n);
    out
}

// =============================================================================
// Tests
// =============================================================================

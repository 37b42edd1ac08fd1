//! Filename z-position grammar.
//!
//! FIB-SEM acquisition software writes one file per slice and encodes the
//! estimated stage z-position (in micrometers) in the name, e.g.
//! `slice_00025_z=0.2908um.tif`.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;

static Z_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^.*_(\d+)_z=(\d*\.?\d*)um\.[^.]+$")
        .unwrap_or_else(|e| panic!("Failed to compile z-name pattern: {e}"))
});

/// Position information decoded from a slice filename.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicePosition {
    /// Acquisition ordinal (the digits before `_z=`)
    pub ordinal: u64,

    /// Stage z-position in micrometers
    pub z_um: f64,
}

/// Parse the ordinal and z-position out of a slice filename.
///
/// Only the final path component is inspected.
pub fn parse_z_position(path: &Path) -> Result<SlicePosition, ParseError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ParseError::NoZPosition {
            path: path.to_path_buf(),
        })?;

    let caps = Z_NAME_RE
        .captures(name)
        .ok_or_else(|| ParseError::NoZPosition {
            path: path.to_path_buf(),
        })?;

    let ordinal_str = &caps[1];
    let z_str = &caps[2];

    let ordinal = ordinal_str.parse::<u64>().map_err(|_| ParseError::InvalidZ {
        path: path.to_path_buf(),
        value: ordinal_str.to_string(),
    })?;
    let z_um = z_str.parse::<f64>().map_err(|_| ParseError::InvalidZ {
        path: path.to_path_buf(),
        value: z_str.to_string(),
    })?;

    Ok(SlicePosition { ordinal, z_um })
}

/// Parse every path, failing on the first name that violates the grammar.
pub fn parse_z_positions(paths: &[PathBuf]) -> Result<Vec<f64>, ParseError> {
    paths
        .iter()
        .map(|p| parse_z_position(p).map(|pos| pos.z_um))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

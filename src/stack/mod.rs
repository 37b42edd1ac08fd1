//! Input stack handling.
//!
//! A stack is a folder of single-image slice files. This module enumerates the
//! slice files in acquisition order and decodes the z-position that the
//! microscope encodes in each filename.
//!
//! - [`list_slices`]: sorted, extension-filtered listing of an input folder
//! - [`parse_z_position`]: the `..._{ordinal}_z={float}um.{ext}` filename grammar

mod discovery;
mod zname;

pub use discovery::{has_slice_extension, list_slices, DEFAULT_SLICE_EXTENSIONS};
pub use zname::{parse_z_position, parse_z_positions, SlicePosition};

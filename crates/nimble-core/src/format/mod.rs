//! Loading and saving raw cell grids
//!
//! Files are dispatched by extension: `.csv` (any case) goes through the
//! delimited-text codec, everything else is treated as a spreadsheet workbook.

pub mod delimited;
pub mod xlsx;

use crate::error::{Error, Result};
use std::path::Path;

/// Rows of cell strings; rows may differ in length
pub type Grid = Vec<Vec<String>>;

/// Extensions picked up when scanning a donor folder
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "CSV", "xlsx", "XLSX"];

/// Which workbook a spreadsheet save starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookBase<'a> {
    /// A new, empty workbook
    Blank,
    /// The existing destination file, keeping its formatting and other sheets
    Destination,
    /// A separate template file
    Template(&'a Path),
}

/// Whether a path names a delimited-text file
pub fn is_delimited<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Load a file into a raw grid
pub fn load_grid<P: AsRef<Path>>(path: P) -> Result<Grid> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    if is_delimited(path) {
        delimited::load(path)
    } else {
        xlsx::load(path)
    }
}

/// Write a raw grid to a file
pub fn save_grid<P: AsRef<Path>>(path: P, grid: &Grid, base: WorkbookBase<'_>) -> Result<()> {
    let path = path.as_ref();
    if is_delimited(path) {
        delimited::save(path, grid)
    } else {
        xlsx::save(path, grid, base)
    }
}

/// Length of the longest row
pub(crate) fn grid_width(grid: &Grid) -> usize {
    grid.iter().map(Vec::len).max().unwrap_or(0)
}

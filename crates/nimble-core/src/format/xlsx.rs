//! Spreadsheet workbooks via umya-spreadsheet
//!
//! Only the active sheet is read or written. Every workbook is checked by
//! opening it, saving a scratch copy and opening that copy again; a workbook
//! that fails any step is reported as corrupt instead of yielding partial data.

use super::{grid_width, Grid, WorkbookBase};
use crate::codec::{classify, parse_number, to_display_decimal, CellKind, DECIMAL_SEPARATOR};
use crate::error::{Error, Result};
use std::fmt::Display;
use std::path::Path;
use tracing::debug;
use umya_spreadsheet::helper::coordinate::index_from_coordinate;
use umya_spreadsheet::{Spreadsheet, Worksheet};

/// Number format applied to decimal cells
pub const DECIMAL_FORMAT: &str = "0.000";

/// Number format applied to text cells
pub const TEXT_FORMAT: &str = "@";

/// Read the active sheet of a workbook into a grid
pub fn load(path: &Path) -> Result<Grid> {
    let book = check_workbook(path)?;
    let sheet = book.get_active_sheet();
    let (max_col, max_row) = sheet.get_highest_column_and_row();

    let mut grid = Grid::with_capacity(max_row as usize);
    for row in 1..=max_row {
        let cells = (1..=max_col)
            .map(|col| {
                sheet
                    .get_cell((col, row))
                    .map(|cell| match cell.get_value_number() {
                        Some(number) => display_number(number),
                        None => cell.get_value().to_string(),
                    })
                    .unwrap_or_default()
            })
            .collect();
        grid.push(cells);
    }

    debug!(path = %path.display(), rows = grid.len(), columns = max_col, "loaded workbook");
    Ok(grid)
}

/// Write a grid into the active sheet of a workbook
///
/// Cells of the base workbook outside the grid's extent are cleared. Inside
/// it, empty grid values never overwrite what the base holds, and cells
/// covered by a merged range (other than its top-left cell) are left alone.
/// The result is written to a scratch file and validated before it replaces
/// `path`.
pub fn save(path: &Path, grid: &Grid, base: WorkbookBase<'_>) -> Result<()> {
    let mut book = match base {
        WorkbookBase::Blank => umya_spreadsheet::new_file(),
        WorkbookBase::Destination if path.is_file() => check_workbook(path)?,
        WorkbookBase::Destination => umya_spreadsheet::new_file(),
        WorkbookBase::Template(template) => {
            if !template.is_file() {
                return Err(Error::FileNotFound(template.to_path_buf()));
            }
            check_workbook(template)?
        }
    };

    let sheet = book.get_active_sheet_mut();
    clear_outside(sheet, grid.len() as u32, grid_width(grid) as u32);

    let merged = merged_ranges(sheet);
    for (row_idx, row) in grid.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            let (col, row) = (col_idx as u32 + 1, row_idx as u32 + 1);
            if value.is_empty() || merged.iter().any(|range| range.hides(col, row)) {
                continue;
            }
            write_cell(sheet, col, row, value);
        }
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let scratch = tempfile::Builder::new()
        .prefix(".nimble-save-")
        .suffix(".xlsx")
        .tempfile_in(dir)?;

    umya_spreadsheet::writer::xlsx::write(&book, scratch.path())
        .map_err(|e| corrupt(path, e))?;
    umya_spreadsheet::reader::xlsx::read(scratch.path())
        .map_err(|e| corrupt(path, format!("saved copy does not reopen: {}", e)))?;

    scratch.persist(path).map_err(|e| Error::Io(e.error))?;
    debug!(path = %path.display(), rows = grid.len(), "saved workbook");
    Ok(())
}

/// Open a workbook, save a scratch copy and reopen it
pub fn check_workbook(path: &Path) -> Result<Spreadsheet> {
    let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| corrupt(path, e))?;

    let scratch = tempfile::Builder::new()
        .prefix("nimble-check-")
        .suffix(".xlsx")
        .tempfile()?;
    umya_spreadsheet::writer::xlsx::write(&book, scratch.path())
        .map_err(|e| corrupt(path, e))?;
    umya_spreadsheet::reader::xlsx::read(scratch.path()).map_err(|e| corrupt(path, e))?;

    Ok(book)
}

fn corrupt(path: &Path, err: impl Display) -> Error {
    Error::CorruptFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Whole numbers keep their integer form; everything else gets three decimals
fn display_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        (number as i64).to_string()
    } else {
        to_display_decimal(number)
    }
}

fn write_cell(sheet: &mut Worksheet, col: u32, row: u32, value: &str) {
    let cell = sheet.get_cell_mut((col, row));
    match classify(value) {
        CellKind::Integer => match value.parse::<i64>() {
            Ok(number) => {
                cell.set_value_number(number as f64);
            }
            Err(_) => {
                cell.set_value_string(value);
            }
        },
        CellKind::Decimal if value.contains(DECIMAL_SEPARATOR) => match parse_number(value) {
            Some(number) => {
                cell.set_value_number(number);
                cell.get_style_mut()
                    .get_number_format_mut()
                    .set_format_code(DECIMAL_FORMAT);
            }
            None => {
                cell.set_value_string(value);
            }
        },
        _ => {
            cell.set_value_string(value);
            cell.get_style_mut()
                .get_number_format_mut()
                .set_format_code(TEXT_FORMAT);
        }
    }
}

/// Blank every non-empty cell beyond `rows` x `cols`
fn clear_outside(sheet: &mut Worksheet, rows: u32, cols: u32) {
    let (used_cols, used_rows) = sheet.get_highest_column_and_row();
    for row in 1..=used_rows {
        for col in 1..=used_cols {
            if row <= rows && col <= cols {
                continue;
            }
            let stale = sheet
                .get_cell((col, row))
                .is_some_and(|cell| !cell.get_value().is_empty());
            if stale {
                sheet.get_cell_mut((col, row)).set_value_string("");
            }
        }
    }
}

/// A merged cell range, 1-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergedRange {
    first_col: u32,
    first_row: u32,
    last_col: u32,
    last_row: u32,
}

impl MergedRange {
    /// Parse a range such as `B2:D4`
    fn parse(range: &str) -> Option<Self> {
        let (start, end) = range.split_once(':')?;
        let (first_col, first_row, _, _) = index_from_coordinate(start);
        let (last_col, last_row, _, _) = index_from_coordinate(end);
        Some(Self {
            first_col: first_col?,
            first_row: first_row?,
            last_col: last_col?,
            last_row: last_row?,
        })
    }

    /// Whether a cell lies inside the range without being its top-left cell
    fn hides(&self, col: u32, row: u32) -> bool {
        let inside = (self.first_col..=self.last_col).contains(&col)
            && (self.first_row..=self.last_row).contains(&row);
        inside && (col, row) != (self.first_col, self.first_row)
    }
}

fn merged_ranges(sheet: &Worksheet) -> Vec<MergedRange> {
    sheet
        .get_merge_cells()
        .iter()
        .filter_map(|range| MergedRange::parse(&range.get_range()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Grid {
        rows.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_display_number() {
        assert_eq!(display_number(42.0), "42");
        assert_eq!(display_number(-3.0), "-3");
        assert_eq!(display_number(12.5), "12,500");
    }

    #[test]
    fn test_merged_range_hides_all_but_top_left() {
        let range = MergedRange::parse("B2:C3").unwrap();
        assert!(!range.hides(2, 2));
        assert!(range.hides(3, 2));
        assert!(range.hides(2, 3));
        assert!(range.hides(3, 3));
        assert!(!range.hides(4, 3));
        assert!(!range.hides(1, 1));
    }

    #[test]
    fn test_save_and_load_keeps_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipts.xlsx");
        let data = grid(&[
            &["DATA", "Item", "Qty", "Weight", "Note"],
            &["", "Bolt", "12", "1,5", "12.5"],
        ]);

        save(&path, &data, WorkbookBase::Blank).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded[0], vec!["DATA", "Item", "Qty", "Weight", "Note"]);
        assert_eq!(loaded[1][1], "Bolt");
        assert_eq!(loaded[1][2], "12");
        assert_eq!(loaded[1][3], "1,500");
        assert_eq!(loaded[1][4], "12.5");
    }

    #[test]
    fn test_save_in_place_never_blanks_and_clears_outside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipts.xlsx");
        save(
            &path,
            &grid(&[&["DATA", "Item", "Extra"], &["", "Bolt", "x"], &["", "Nut", "y"]]),
            WorkbookBase::Blank,
        )
        .unwrap();

        save(
            &path,
            &grid(&[&["DATA", "Item"], &["", ""]]),
            WorkbookBase::Destination,
        )
        .unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded[1][1], "Bolt");
        assert!(loaded[0].get(2).map_or(true, |v| v.is_empty()));
        assert!(loaded
            .get(2)
            .map_or(true, |row| row.iter().all(|v| v.is_empty())));
    }

    #[test]
    fn test_save_leaves_merged_followers_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.xlsx");
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_active_sheet_mut();
        sheet.get_cell_mut((1, 1)).set_value_string("DATA");
        sheet.add_merge_cells("B1:C1");
        umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();

        save(
            &path,
            &grid(&[&["DATA", "New", "Hidden"]]),
            WorkbookBase::Destination,
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded[0][1], "New");
        assert!(loaded[0].get(2).map_or(true, |v| v.is_empty()));

        let reopened = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
        assert_eq!(reopened.get_active_sheet().get_merge_cells().len(), 1);
    }

    #[test]
    fn test_corrupt_workbook_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptFile { .. }));
    }

    #[test]
    fn test_failed_template_leaves_destination_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let template = dir.path().join("template.xlsx");
        std::fs::write(&template, b"garbage").unwrap();
        std::fs::write(&path, b"original").unwrap();

        let result = save(
            &path,
            &grid(&[&["DATA", "Item"]]),
            WorkbookBase::Template(&template),
        );

        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }
}

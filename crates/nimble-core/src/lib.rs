//! nimble-core: Core library for goods-receiving sheets
//!
//! This library provides functionality to:
//! - Load spreadsheet (`.xlsx`) and semicolon-separated (`.csv`) sheets into
//!   header-addressed records, and save them back
//! - Classify cell values (integer, decimal comma, text) and convert date
//!   serials
//! - Merge values from a donor file or a whole donor folder into a target
//!   sheet, by key or by appending records
//! - Remember which donor files of a folder were already merged
//! - Persist per-file merge settings

pub mod cache;
pub mod codec;
pub mod dataset;
pub mod error;
pub mod export;
pub mod format;
pub mod merge;
pub mod record;
pub mod settings;

pub use cache::{CacheEntry, FolderCache};
pub use codec::{classify, serial_to_date, to_display_decimal, CellKind};
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use export::{export_matching, records_to_json, write_records_csv};
pub use format::{load_grid, save_grid, Grid, WorkbookBase};
pub use merge::{
    merge_folder, merge_one, merge_with_settings, resolve_folder, FieldMapping, FieldPair,
    FolderMerge, JoinKey, MergeReport,
};
pub use record::{HeaderInfo, HeaderKey, Record};
pub use settings::{HeaderPair, MergeSettings};

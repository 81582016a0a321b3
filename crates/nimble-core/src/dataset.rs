//! A loaded sheet: raw grid, header index and records

use crate::codec::{classify, parse_number, serial_to_date};
use crate::error::{Error, Result};
use crate::format::{load_grid, save_grid, Grid, WorkbookBase};
use crate::record::{HeaderInfo, HeaderKey, Record};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// First-column text marking the header row
pub const HEADER_SENTINEL: &str = "DATA";

/// Prefix of the values in the record synthesized for a sheet without data
pub const PLACEHOLDER_PREFIX: &str = "empty_file";

/// Header substrings whose numeric values are date serials
const DATE_MARKERS: &[&str] = &["Date", "date", "Datum", "datum"];

/// One loaded file
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    grid: Grid,
    headers: Vec<HeaderInfo>,
    header_row: Option<usize>,
    records: Vec<Record>,
    source_path: PathBuf,
    ready: bool,
}

impl Dataset {
    /// Create a new empty, unloaded dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a file into a new dataset
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut dataset = Self::new();
        dataset.load(path)?;
        Ok(dataset)
    }

    /// Build a dataset from an in-memory grid
    pub fn from_grid<P: AsRef<Path>>(grid: Grid, path: P) -> Result<Self> {
        let mut dataset = Self::new();
        dataset.build(grid, path.as_ref())?;
        Ok(dataset)
    }

    /// An empty, ready dataset using another sheet's header layout
    ///
    /// Saving it writes a fresh header row built from `headers`.
    pub fn with_layout(headers: Vec<HeaderInfo>) -> Self {
        Self {
            headers,
            ready: true,
            ..Self::default()
        }
    }

    /// Load a file, replacing whatever was loaded before
    ///
    /// On failure the dataset is left empty and not ready, and the error is
    /// logged as a warning as well as returned.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.unload();

        let result = load_grid(path).and_then(|grid| self.build(grid, path));
        if let Err(e) = &result {
            warn!(path = %path.display(), error = %e, "could not load sheet");
            self.unload();
        }
        result
    }

    fn build(&mut self, grid: Grid, path: &Path) -> Result<()> {
        let header_row = grid
            .iter()
            .rposition(|row| row.first().is_some_and(|cell| cell == HEADER_SENTINEL))
            .ok_or_else(|| Error::MissingHeaderSentinel(path.to_path_buf()))?;

        let headers: Vec<HeaderInfo> = grid[header_row]
            .iter()
            .skip(1)
            .enumerate()
            .map(|(ordinal, name)| {
                HeaderInfo::new(HeaderKey::new(name.as_str(), ordinal), header_row, ordinal + 1)
            })
            .collect();

        let mut records = extract_records(&grid, header_row, &headers);
        if records.is_empty() {
            records.push(placeholder(&headers, PLACEHOLDER_PREFIX));
        }

        debug!(
            path = %path.display(),
            header_row,
            headers = headers.len(),
            records = records.len(),
            "built header index"
        );

        self.grid = grid;
        self.headers = headers;
        self.header_row = Some(header_row);
        self.records = records;
        self.source_path = path.to_path_buf();
        self.ready = true;
        Ok(())
    }

    /// Drop the grid, header index and records
    pub fn unload(&mut self) {
        *self = Self::default();
    }

    /// Whether a header row was found on the last load
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The file this dataset was loaded from
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The raw grid as loaded or last rebuilt
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Grid row holding the headers
    pub fn header_row(&self) -> Option<usize> {
        self.header_row
    }

    /// The header index
    pub fn header_info(&self) -> &[HeaderInfo] {
        &self.headers
    }

    /// Replace the header index, e.g. with a template's layout
    pub fn set_header_info(&mut self, headers: Vec<HeaderInfo>) {
        self.headers = headers;
    }

    /// All header keys in column order
    pub fn header_keys(&self) -> Vec<HeaderKey> {
        self.headers.iter().map(|h| h.key.clone()).collect()
    }

    /// Whether the header index contains a key
    pub fn has_header(&self, key: &HeaderKey) -> bool {
        self.headers.iter().any(|h| h.key == *key)
    }

    /// Resolve header text: either the display form `name ##n` or a plain
    /// header name (first column with that name wins)
    pub fn find_header(&self, text: &str) -> Option<HeaderKey> {
        if let Some(key) = HeaderKey::parse(text).filter(|k| self.has_header(k)) {
            return Some(key);
        }
        self.headers
            .iter()
            .find(|h| h.key.name == text)
            .map(|h| h.key.clone())
    }

    /// All records
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// All records, mutable
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at an index
    pub fn record(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Mutable record at an index
    pub fn record_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    /// Append a record
    pub fn add_record(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Replace the record at an index; out of range does nothing
    pub fn replace_record(&mut self, index: usize, record: Record) {
        if let Some(slot) = self.records.get_mut(index) {
            *slot = record;
        }
    }

    /// Remove the record at an index; out of range does nothing
    pub fn remove_record(&mut self, index: usize) {
        if index < self.records.len() {
            self.records.remove(index);
        }
    }

    /// Remove every record
    pub fn clear_records(&mut self) {
        self.records.clear();
    }

    /// A record holding `marker` for every header, used to keep the header
    /// layout when there is no data
    pub fn placeholder(&self, marker: &str) -> Record {
        placeholder(&self.headers, marker)
    }

    /// Rewrite the grid rows below the header row from the records
    ///
    /// Rows above the header row are kept. Without a grid (a dataset built
    /// with [`Dataset::with_layout`]) a header row is generated first.
    pub fn rebuild_grid(&mut self) {
        if self.records.is_empty() {
            return;
        }

        let header_row = match self.header_row {
            Some(row) if row < self.grid.len() => row,
            _ => self.synthesize_header_row(),
        };
        self.grid.truncate(header_row + 1);

        let width = self.headers.iter().map(|h| h.column + 1).max().unwrap_or(1);
        for record in &self.records {
            let mut row = vec![String::new(); width];
            for (key, value) in record.fields() {
                let column = self
                    .headers
                    .iter()
                    .find(|h| h.key == *key && h.row == header_row)
                    .map(|h| h.column);
                if let Some(column) = column.filter(|&c| c > 0) {
                    row[column] = value.clone();
                }
            }
            self.grid.push(row);
        }
    }

    fn synthesize_header_row(&mut self) -> usize {
        let width = self.headers.iter().map(|h| h.column + 1).max().unwrap_or(1);
        let mut row = vec![String::new(); width];
        row[0] = HEADER_SENTINEL.to_string();
        for header in &mut self.headers {
            header.row = 0;
            if header.column > 0 {
                row[header.column] = header.key.name.clone();
            }
        }

        self.grid = vec![row];
        self.header_row = Some(0);
        0
    }

    /// Save the records
    ///
    /// `target` defaults to the source file. Saving onto the source file keeps
    /// its workbook formatting; saving elsewhere starts from a blank workbook
    /// unless a `template` workbook is given.
    pub fn save(&mut self, target: Option<&Path>, template: Option<&Path>) -> Result<()> {
        if !self.ready {
            return Err(Error::NotReady(self.source_path.clone()));
        }

        let target = target.unwrap_or(&self.source_path).to_path_buf();
        let base = match template {
            Some(template) => WorkbookBase::Template(template),
            None if target == self.source_path => WorkbookBase::Destination,
            None => WorkbookBase::Blank,
        };

        self.rebuild_grid();
        save_grid(&target, &self.grid, base)
    }
}

/// Records for the rows below the header row, up to the first blank row
fn extract_records(grid: &Grid, header_row: usize, headers: &[HeaderInfo]) -> Vec<Record> {
    let mut records = Vec::new();

    for row in &grid[header_row + 1..] {
        let mut record = Record::new();
        for header in headers {
            let mut value = row.get(header.column).cloned().unwrap_or_default();
            if is_date_header(&header.key.name) && classify(&value).is_numeric() {
                if let Some(date) =
                    parse_number(&value).and_then(|serial| serial_to_date(serial.trunc() as i64))
                {
                    value = date;
                }
            }
            record.insert(header.key.clone(), value);
        }

        if !record.has_data() {
            break;
        }
        records.push(record);
    }

    records
}

fn is_date_header(name: &str) -> bool {
    DATE_MARKERS.iter().any(|marker| name.contains(marker))
}

fn placeholder(headers: &[HeaderInfo], marker: &str) -> Record {
    let mut record = Record::new();
    for header in headers {
        record.insert(header.key.clone(), format!("{} {}", marker, header.key));
    }
    record
}

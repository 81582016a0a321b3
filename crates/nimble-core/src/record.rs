//! Header-addressed records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between a header's raw name and its ordinal in display form
const ORDINAL_MARK: &str = " ##";

/// Identifies one header column
///
/// Header text may repeat within a sheet, so every header also carries its
/// position in the header row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeaderKey {
    /// Literal header cell text
    pub name: String,
    /// Position among the headers (0-based)
    pub ordinal: usize,
}

impl HeaderKey {
    /// Create a new header key
    pub fn new(name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            ordinal,
        }
    }

    /// Parse the display form `name ##ordinal`
    pub fn parse(text: &str) -> Option<Self> {
        let (name, ordinal) = text.rsplit_once(ORDINAL_MARK)?;
        let ordinal = ordinal.parse().ok()?;
        Some(Self::new(name, ordinal))
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.name, ORDINAL_MARK, self.ordinal)
    }
}

/// Where a header lives in the raw grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub key: HeaderKey,
    /// Grid row of the header (the `DATA` row)
    pub row: usize,
    /// Grid column of the header
    pub column: usize,
}

impl HeaderInfo {
    /// Create a new header info
    pub fn new(key: HeaderKey, row: usize, column: usize) -> Self {
        Self { key, row, column }
    }
}

/// One business entity: values keyed by header, in header order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(HeaderKey, String)>,
    #[serde(skip)]
    changed: bool,
}

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// A record with the same headers as `other` and every value empty
    pub fn blank_like(other: &Record) -> Self {
        Self {
            fields: other
                .fields
                .iter()
                .map(|(key, _)| (key.clone(), String::new()))
                .collect(),
            changed: false,
        }
    }

    /// Add a header with a value, or replace the value if the header exists
    ///
    /// Does not mark the record as changed.
    pub fn insert(&mut self, key: HeaderKey, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Change the value of an existing header and mark the record as changed
    ///
    /// Headers the record does not have are ignored.
    pub fn update(&mut self, key: &HeaderKey, value: impl Into<String>) {
        if let Some((_, existing)) = self.fields.iter_mut().find(|(k, _)| k == key) {
            *existing = value.into();
            self.changed = true;
        }
    }

    /// Value for a header, empty if the header is absent
    pub fn get(&self, key: &HeaderKey) -> &str {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    /// Whether the record has a header
    pub fn contains(&self, key: &HeaderKey) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// All headers and values
    pub fn fields(&self) -> &[(HeaderKey, String)] {
        &self.fields
    }

    /// Replace all headers and values
    pub fn set_fields(&mut self, fields: Vec<(HeaderKey, String)>) {
        self.fields = fields;
    }

    /// Whether any value is non-empty
    pub fn has_data(&self) -> bool {
        self.fields.iter().any(|(_, v)| !v.is_empty())
    }

    /// Return whether the record changed since the last call, and reset it
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Forget pending changes
    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    /// Drop all headers and values
    pub fn clear(&mut self) {
        self.fields.clear();
        self.changed = false;
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no headers
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

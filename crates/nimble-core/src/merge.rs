//! Merge engine: fill or extend a target sheet from donor sheets
//!
//! Two modes:
//! - join: target records are matched to donor records on a key header pair,
//!   and mapped values are copied across (the first matching donor record
//!   wins, empty donor values never overwrite)
//! - append: without a join key every eligible donor record becomes a new
//!   target record
//!
//! Folder merges scan a donor folder and skip files recorded as unchanged in
//! the folder's [`FolderCache`].

use crate::cache::{cache_key, last_write_time, CacheEntry, FolderCache};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::format::SUPPORTED_EXTENSIONS;
use crate::record::{HeaderKey, Record};
use crate::settings::MergeSettings;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Marker value of the shape record used when the target has no records
pub const MERGE_PLACEHOLDER: &str = "empty";

/// One target header and the donor header it is filled from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPair {
    pub target: HeaderKey,
    /// `None` when the mapping was cleared
    pub donor: Option<HeaderKey>,
}

/// Target-to-donor header mapping, unique by target header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pairs: Vec<FieldPair>,
}

impl FieldMapping {
    /// Create a new empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a target header, replacing an existing mapping for it
    pub fn set(&mut self, target: HeaderKey, donor: Option<HeaderKey>) {
        match self.pairs.iter_mut().find(|p| p.target == target) {
            Some(pair) => pair.donor = donor,
            None => self.pairs.push(FieldPair { target, donor }),
        }
    }

    /// Clear the donor of a target header, keeping the entry
    pub fn clear(&mut self, target: &HeaderKey) {
        if let Some(pair) = self.pairs.iter_mut().find(|p| p.target == *target) {
            pair.donor = None;
        }
    }

    /// Remove the entry for a target header
    pub fn remove(&mut self, target: &HeaderKey) {
        self.pairs.retain(|p| p.target != *target);
    }

    /// Donor header of a target header
    pub fn donor_for(&self, target: &HeaderKey) -> Option<&HeaderKey> {
        self.pairs
            .iter()
            .find(|p| p.target == *target)
            .and_then(|p| p.donor.as_ref())
    }

    /// All entries, in insertion order
    pub fn pairs(&self) -> &[FieldPair] {
        &self.pairs
    }

    /// Entries that still have a donor header
    pub fn active(&self) -> impl Iterator<Item = (&HeaderKey, &HeaderKey)> {
        self.pairs
            .iter()
            .filter_map(|p| p.donor.as_ref().map(|d| (&p.target, d)))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Header pair used to match target records with donor records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey {
    /// `None` selects append mode
    pub target: Option<HeaderKey>,
    pub donor: Option<HeaderKey>,
}

impl JoinKey {
    /// Join on `target == donor`
    pub fn new(target: HeaderKey, donor: HeaderKey) -> Self {
        Self {
            target: Some(target),
            donor: Some(donor),
        }
    }

    /// No key: append donor records
    pub fn append() -> Self {
        Self::default()
    }

    /// Whether this key selects append mode
    pub fn is_append(&self) -> bool {
        self.target.is_none()
    }
}

/// Everything a folder merge needs
#[derive(Debug, Clone, Default)]
pub struct FolderMerge {
    pub folder: PathBuf,
    pub mapping: FieldMapping,
    pub join: JoinKey,
    /// In append mode, skip donor records whose value under this header
    /// already occurs in the target
    pub dont_import_if: Option<HeaderKey>,
    /// Process every donor file, even those the cache lists as unchanged
    pub ignore_cache: bool,
}

/// Outcome of a merge
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Values copied into target records
    pub cells_merged: usize,
    /// Existing target records that changed
    pub records_updated: usize,
    /// Records appended to the target
    pub records_appended: usize,
    /// Donor files merged (and cached), in processing order
    pub donors_processed: Vec<PathBuf>,
    /// Donor files skipped, with the reason
    pub donors_skipped: Vec<(PathBuf, String)>,
}

impl MergeReport {
    fn absorb(&mut self, other: MergeReport) {
        self.cells_merged += other.cells_merged;
        self.records_updated += other.records_updated;
        self.records_appended += other.records_appended;
        self.donors_processed.extend(other.donors_processed);
        self.donors_skipped.extend(other.donors_skipped);
    }
}

/// Fill target records from one donor dataset by key
pub fn merge_one(
    target: &mut Dataset,
    donor: &Dataset,
    mapping: &FieldMapping,
    join: &JoinKey,
) -> Result<MergeReport> {
    ensure_ready(target)?;
    ensure_ready(donor)?;
    let target_key = require_header(target, join.target.as_ref())?;
    let donor_key = require_header(donor, join.donor.as_ref())?;

    info!(
        sheet = %target.source_path().display(),
        donor = %donor.source_path().display(),
        target_key = %target_key,
        donor_key = %donor_key,
        "merging file"
    );

    let mut report = MergeReport::default();
    join_records(target, donor.records(), mapping, &target_key, &donor_key, &mut report);
    report.donors_processed.push(donor.source_path().to_path_buf());

    info!(
        cells = report.cells_merged,
        records = report.records_updated,
        "file merge done"
    );
    Ok(report)
}

/// List the donor files of a folder that still need merging
///
/// Only regular `.csv`/`.CSV`/`.xlsx`/`.XLSX` files directly inside the folder
/// are considered, in file name order. Unless `ignore_cache` is set, files
/// whose cached timestamp equals their current last-write time are left out.
pub fn resolve_folder<P: AsRef<Path>>(folder: P, ignore_cache: bool) -> Result<Vec<PathBuf>> {
    let folder = folder.as_ref();
    if !folder.is_dir() {
        return Err(Error::FileNotFound(folder.to_path_buf()));
    }

    let cache = if ignore_cache {
        FolderCache::empty(folder)
    } else {
        FolderCache::load(folder)?
    };

    let mut pending = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext));
        if !entry.file_type().is_file() || !supported {
            continue;
        }

        if cache.is_unchanged(&cache_key(path), &last_write_time(path)?) {
            debug!(path = %path.display(), "unchanged since last merge");
            continue;
        }
        pending.push(path.to_path_buf());
    }

    info!(folder = %folder.display(), files = pending.len(), "files to merge");
    Ok(pending)
}

/// Merge every pending donor file of a folder into the target
///
/// Donors that fail to load, or lack the donor join header, are skipped and
/// get no cache entry so the next merge retries them. Each processed donor is
/// added to the folder cache as soon as it is merged.
pub fn merge_folder(target: &mut Dataset, job: &FolderMerge) -> Result<MergeReport> {
    ensure_ready(target)?;
    let join = match (&job.join.target, &job.join.donor) {
        (None, _) => None,
        (Some(_), None) => {
            return Err(Error::InvalidJoinConfiguration {
                header: String::new(),
                path: job.folder.clone(),
            })
        }
        (Some(t), Some(d)) => Some((require_header(target, Some(t))?, d.clone())),
    };

    let dedupe = job.dont_import_if.as_ref().map(|header| {
        let seen: HashSet<String> = target
            .records()
            .iter()
            .map(|r| r.get(header).to_string())
            .collect();
        (header, seen)
    });
    let shape = target
        .records()
        .last()
        .cloned()
        .unwrap_or_else(|| target.placeholder(MERGE_PLACEHOLDER));

    info!(
        sheet = %target.source_path().display(),
        folder = %job.folder.display(),
        mode = if join.is_some() { "join" } else { "append" },
        "merging folder"
    );

    let donors = resolve_folder(&job.folder, job.ignore_cache)?;
    let mut cache = FolderCache::empty(&job.folder);
    let mut report = MergeReport::default();

    for path in donors {
        let entry = match CacheEntry::for_file(&path) {
            Ok(entry) => entry,
            Err(e) => {
                skip(&mut report, path, e.to_string());
                continue;
            }
        };
        let donor = match Dataset::open(&path) {
            Ok(donor) => donor,
            Err(e) => {
                skip(&mut report, path, e.to_string());
                continue;
            }
        };

        match &join {
            Some((target_key, donor_key)) => {
                if !donor.has_header(donor_key) {
                    let reason = format!("missing join header '{}'", donor_key);
                    skip(&mut report, path, reason);
                    continue;
                }
                join_records(target, donor.records(), &job.mapping, target_key, donor_key, &mut report);
            }
            None => {
                let dedupe = dedupe.as_ref().map(|(header, seen)| (*header, seen));
                append_records(target, donor.records(), &job.mapping, dedupe, &shape, &mut report);
            }
        }

        if let Err(e) = cache.append(entry) {
            warn!(path = %path.display(), error = %e, "could not cache merged file");
        }
        debug!(path = %path.display(), "merged donor");
        report.donors_processed.push(path);
    }

    info!(
        donors = report.donors_processed.len(),
        skipped = report.donors_skipped.len(),
        cells = report.cells_merged,
        updated = report.records_updated,
        appended = report.records_appended,
        "folder merge done"
    );
    Ok(report)
}

/// Run the merges configured in a settings record
///
/// The folder merge runs first (when a folder and a template are set), then
/// the single-file merge (when a merge file and its join key are set).
pub fn merge_with_settings(
    target: &mut Dataset,
    settings: &MergeSettings,
    ignore_cache: bool,
) -> Result<MergeReport> {
    ensure_ready(target)?;
    let mut report = MergeReport::default();

    if let (Some(folder), Some(template)) =
        (&settings.merge_folder, &settings.merge_folder_template)
    {
        let template = Dataset::open(template)?;
        let job = FolderMerge {
            folder: folder.clone(),
            mapping: settings.folder_mapping(target, &template),
            join: settings.folder_join(target, &template)?,
            dont_import_if: settings.dont_import_header(target),
            ignore_cache,
        };
        report.absorb(merge_folder(target, &job)?);
    }

    if let Some(file) = &settings.merge_file {
        let donor = Dataset::open(file)?;
        let join = settings.file_join(target, &donor)?;
        if join.is_append() {
            warn!(file = %file.display(), "merge file has no join key, skipping");
        } else {
            let mapping = settings.file_mapping(target, &donor);
            report.absorb(merge_one(target, &donor, &mapping, &join)?);
        }
    }

    Ok(report)
}

fn ensure_ready(dataset: &Dataset) -> Result<()> {
    if dataset.is_ready() {
        Ok(())
    } else {
        Err(Error::NotReady(dataset.source_path().to_path_buf()))
    }
}

fn require_header(dataset: &Dataset, key: Option<&HeaderKey>) -> Result<HeaderKey> {
    match key {
        Some(key) if dataset.has_header(key) => Ok(key.clone()),
        _ => Err(Error::InvalidJoinConfiguration {
            header: key.map(ToString::to_string).unwrap_or_default(),
            path: dataset.source_path().to_path_buf(),
        }),
    }
}

fn skip(report: &mut MergeReport, path: PathBuf, reason: String) {
    warn!(path = %path.display(), reason = %reason, "skipping donor file");
    report.donors_skipped.push((path, reason));
}

/// Copy mapped values from the first donor record whose key matches
fn join_records(
    target: &mut Dataset,
    donors: &[Record],
    mapping: &FieldMapping,
    target_key: &HeaderKey,
    donor_key: &HeaderKey,
    report: &mut MergeReport,
) {
    for record in target.records_mut() {
        let key = record.get(target_key).to_string();
        if key.is_empty() {
            continue;
        }

        let matched = donors.iter().find(|d| {
            let value = d.get(donor_key);
            !value.is_empty() && value == key
        });
        if let Some(donor) = matched {
            for (target_header, donor_header) in mapping.active() {
                let value = donor.get(donor_header);
                if !value.is_empty() && record.contains(target_header) {
                    record.update(target_header, value);
                    report.cells_merged += 1;
                }
            }
        }

        if record.take_changed() {
            report.records_updated += 1;
        }
    }
}

/// Append donor records as new target records shaped like `shape`
fn append_records(
    target: &mut Dataset,
    donors: &[Record],
    mapping: &FieldMapping,
    dedupe: Option<(&HeaderKey, &HashSet<String>)>,
    shape: &Record,
    report: &mut MergeReport,
) {
    for donor in donors {
        if let Some((header, seen)) = dedupe {
            if seen.contains(donor.get(header)) {
                continue;
            }
        }

        let mut record = Record::blank_like(shape);
        let mut cells = 0;
        for (target_header, donor_header) in mapping.active() {
            let value = donor.get(donor_header);
            if !value.is_empty() && record.contains(target_header) {
                record.update(target_header, value);
                cells += 1;
            }
        }

        if cells > 0 {
            record.reset_changed();
            target.add_record(record);
            report.cells_merged += cells;
            report.records_appended += 1;
        }
    }
}

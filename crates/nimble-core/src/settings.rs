//! Per-file merge settings
//!
//! Settings are stored next to a project as `<file name>.ini`, one
//! `key = value` line per setting. Header mappings are written as a count
//! line followed by that many `target := donor` lines. Headers are stored in
//! display form (`name ##n`) but plain header names are accepted too.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::merge::{FieldMapping, JoinKey};
use crate::record::HeaderKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Dedupe header value meaning "no dedupe"
pub const NO_DEDUPE: &str = "NONE";

const KEY_SEPARATOR: &str = " = ";
const PAIR_SEPARATOR: &str = " := ";

/// A target header and the donor header it is filled from, as stored text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
    pub target: String,
    /// Empty when the mapping was cleared
    pub donor: String,
}

impl HeaderPair {
    /// Create a new header pair
    pub fn new(target: impl Into<String>, donor: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            donor: donor.into(),
        }
    }

    /// Whether no target header is set
    pub fn is_unset(&self) -> bool {
        self.target.is_empty()
    }

    fn render(&self) -> String {
        format!("{}{}{}", self.target, PAIR_SEPARATOR, self.donor)
    }

    fn parse(text: &str) -> Self {
        match text.split_once(PAIR_SEPARATOR) {
            Some((target, donor)) => Self::new(target, donor),
            None => Self::new(text.trim_end_matches(" :="), ""),
        }
    }
}

/// Merge configuration of one target file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// The target file these settings belong to
    pub file: Option<PathBuf>,
    /// Donor of the single-file merge
    pub merge_file: Option<PathBuf>,
    /// Donor folder of the folder merge
    pub merge_folder: Option<PathBuf>,
    /// File whose headers name the donor columns of the folder merge
    pub merge_folder_template: Option<PathBuf>,
    /// Target header whose existing values are never appended again
    pub dont_import_if: String,
    /// Join key of the single-file merge
    pub merge_if: HeaderPair,
    /// Field mapping of the single-file merge
    pub merge_headers: Vec<HeaderPair>,
    /// Join key of the folder merge; unset means append mode
    pub merge_folder_if: HeaderPair,
    /// Field mapping of the folder merge
    pub merge_headers_folder: Vec<HeaderPair>,
}

impl MergeSettings {
    /// Create new empty settings for a file
    pub fn new<P: AsRef<Path>>(file: P) -> Self {
        Self {
            file: Some(file.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Settings file of a dataset inside a settings directory
    pub fn path_for<D: AsRef<Path>, P: AsRef<Path>>(dir: D, dataset_path: P) -> PathBuf {
        let name = dataset_path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        dir.as_ref().join(format!("{}.ini", name))
    }

    /// Read settings from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = Self::parse(&content, path)?;
        debug!(path = %path.display(), "loaded merge settings");
        Ok(settings)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut settings = Self::default();
        let mut lines = content.lines().enumerate();

        while let Some((idx, line)) = lines.next() {
            let Some((key, value)) = split_setting(line) else {
                continue;
            };

            match key {
                "m_filename" => settings.file = non_empty_path(value),
                "m_mergefile" => settings.merge_file = non_empty_path(value),
                "m_mergefolderfile" => settings.merge_folder_template = non_empty_path(value),
                "m_mergefolder" => settings.merge_folder = non_empty_path(value),
                "m_dontimportifexistsheader" => settings.dont_import_if = value.to_string(),
                "m_mergeif" => settings.merge_if = HeaderPair::parse(value),
                "m_mergefolderif" => settings.merge_folder_if = HeaderPair::parse(value),
                "m_mergeheaders" | "m_mergeheadersfolder" => {
                    let count: usize = value.trim().parse().map_err(|_| Error::Settings {
                        path: path.to_path_buf(),
                        line: idx + 1,
                        message: format!("invalid header count '{}'", value),
                    })?;

                    let mut pairs = Vec::with_capacity(count);
                    for _ in 0..count {
                        let (_, pair) = lines.next().ok_or_else(|| Error::Settings {
                            path: path.to_path_buf(),
                            line: idx + 1,
                            message: format!("expected {} header lines after {}", count, key),
                        })?;
                        pairs.push(HeaderPair::parse(pair));
                    }

                    if key == "m_mergeheaders" {
                        settings.merge_headers = pairs;
                    } else {
                        settings.merge_headers_folder = pairs;
                    }
                }
                _ => {}
            }
        }

        Ok(settings)
    }

    /// Write settings to a file, replacing it
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render())?;
        debug!(path = %path.display(), "saved merge settings");
        Ok(())
    }

    fn render(&self) -> String {
        let path_text = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };

        let mut lines = vec![
            format!("m_filename = {}", path_text(&self.file)),
            format!("m_mergefile = {}", path_text(&self.merge_file)),
            format!("m_mergefolderfile = {}", path_text(&self.merge_folder_template)),
            format!("m_dontimportifexistsheader = {}", self.dont_import_if),
            format!("m_mergefolder = {}", path_text(&self.merge_folder)),
            format!("m_mergeheadersfolder = {}", self.merge_headers_folder.len()),
        ];
        lines.extend(self.merge_headers_folder.iter().map(HeaderPair::render));
        lines.push(format!("m_mergefolderif = {}", self.merge_folder_if.render()));
        lines.push(format!("m_mergeheaders = {}", self.merge_headers.len()));
        lines.extend(self.merge_headers.iter().map(HeaderPair::render));
        lines.push(format!("m_mergeif = {}", self.merge_if.render()));

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    /// Map a target header for the single-file merge, replacing an existing
    /// mapping; an empty donor clears it
    pub fn add_header(&mut self, target: &str, donor: &str) {
        upsert(&mut self.merge_headers, target, donor);
    }

    /// Drop the single-file mapping of a target header
    pub fn remove_header(&mut self, target: &str) {
        self.merge_headers.retain(|p| p.target != target);
    }

    /// Map a target header for the folder merge, replacing an existing
    /// mapping; an empty donor clears it
    pub fn add_folder_header(&mut self, target: &str, donor: &str) {
        upsert(&mut self.merge_headers_folder, target, donor);
    }

    /// Drop the folder mapping of a target header
    pub fn remove_folder_header(&mut self, target: &str) {
        self.merge_headers_folder.retain(|p| p.target != target);
    }

    /// Set the join key of the single-file merge
    pub fn set_merge_if(&mut self, target: &str, donor: &str) {
        self.merge_if = HeaderPair::new(target, donor);
    }

    /// Set the join key of the folder merge; an empty target selects append
    /// mode
    pub fn set_merge_folder_if(&mut self, target: &str, donor: &str) {
        self.merge_folder_if = HeaderPair::new(target, donor);
    }

    /// The dedupe header resolved against the target, if dedupe is enabled
    pub fn dont_import_header(&self, target: &Dataset) -> Option<HeaderKey> {
        let text = self.dont_import_if.as_str();
        if text.is_empty() || text == NO_DEDUPE {
            return None;
        }
        let key = target.find_header(text);
        if key.is_none() {
            warn!(header = text, "dedupe header not found in target, importing everything");
        }
        key
    }

    /// Single-file mapping resolved against the target and the donor
    pub fn file_mapping(&self, target: &Dataset, donor: &Dataset) -> FieldMapping {
        resolve_mapping(&self.merge_headers, target, donor)
    }

    /// Folder mapping resolved against the target and the folder template
    pub fn folder_mapping(&self, target: &Dataset, template: &Dataset) -> FieldMapping {
        resolve_mapping(&self.merge_headers_folder, target, template)
    }

    /// Single-file join key resolved against the target and the donor
    pub fn file_join(&self, target: &Dataset, donor: &Dataset) -> Result<JoinKey> {
        resolve_join(&self.merge_if, target, donor)
    }

    /// Folder join key resolved against the target and the folder template
    pub fn folder_join(&self, target: &Dataset, template: &Dataset) -> Result<JoinKey> {
        resolve_join(&self.merge_folder_if, target, template)
    }
}

fn split_setting(line: &str) -> Option<(&str, &str)> {
    line.split_once(KEY_SEPARATOR)
        .or_else(|| line.trim_end().strip_suffix(" =").map(|key| (key, "")))
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn upsert(pairs: &mut Vec<HeaderPair>, target: &str, donor: &str) {
    match pairs.iter_mut().find(|p| p.target == target) {
        Some(pair) => pair.donor = donor.to_string(),
        None => pairs.push(HeaderPair::new(target, donor)),
    }
}

fn resolve_mapping(pairs: &[HeaderPair], target: &Dataset, donor: &Dataset) -> FieldMapping {
    let mut mapping = FieldMapping::new();
    for pair in pairs {
        let Some(target_key) = target.find_header(&pair.target) else {
            warn!(header = %pair.target, "mapped header not found in target");
            continue;
        };
        let donor_key = if pair.donor.is_empty() {
            None
        } else {
            let key = donor.find_header(&pair.donor);
            if key.is_none() {
                warn!(header = %pair.donor, "mapped header not found in donor");
            }
            key
        };
        mapping.set(target_key, donor_key);
    }
    mapping
}

fn resolve_join(pair: &HeaderPair, target: &Dataset, donor: &Dataset) -> Result<JoinKey> {
    if pair.is_unset() {
        return Ok(JoinKey::append());
    }
    let target_key = target
        .find_header(&pair.target)
        .ok_or_else(|| Error::InvalidJoinConfiguration {
            header: pair.target.clone(),
            path: target.source_path().to_path_buf(),
        })?;
    let donor_key = donor
        .find_header(&pair.donor)
        .ok_or_else(|| Error::InvalidJoinConfiguration {
            header: pair.donor.clone(),
            path: donor.source_path().to_path_buf(),
        })?;
    Ok(JoinKey::new(target_key, donor_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Grid;

    fn dataset(rows: &[&[&str]], name: &str) -> Dataset {
        let grid: Grid = rows
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect();
        Dataset::from_grid(grid, name).unwrap()
    }

    fn sample() -> MergeSettings {
        let mut settings = MergeSettings::new("in/receipts.xlsx");
        settings.merge_file = Some(PathBuf::from("in/prices.csv"));
        settings.merge_folder = Some(PathBuf::from("in/deliveries"));
        settings.merge_folder_template = Some(PathBuf::from("in/template.csv"));
        settings.dont_import_if = "id ##0".to_string();
        settings.add_folder_header("item ##1", "Artikel ##2");
        settings.add_header("price ##2", "Preis ##1");
        settings.add_header("note ##3", "");
        settings.set_merge_if("sku ##4", "Nr ##0");
        settings
    }

    #[test]
    fn test_render_order() {
        let text = sample().render();
        assert_eq!(
            text,
            "m_filename = in/receipts.xlsx\n\
             m_mergefile = in/prices.csv\n\
             m_mergefolderfile = in/template.csv\n\
             m_dontimportifexistsheader = id ##0\n\
             m_mergefolder = in/deliveries\n\
             m_mergeheadersfolder = 1\n\
             item ##1 := Artikel ##2\n\
             m_mergefolderif =  := \n\
             m_mergeheaders = 2\n\
             price ##2 := Preis ##1\n\
             note ##3 := \n\
             m_mergeif = sku ##4 := Nr ##0\n"
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = MergeSettings::path_for(dir.path(), "in/receipts.xlsx");
        assert_eq!(path, dir.path().join("receipts.xlsx.ini"));

        let settings = sample();
        settings.save(&path).unwrap();
        let loaded = MergeSettings::load(&path).unwrap();

        assert_eq!(loaded, settings);
        assert!(loaded.merge_folder_if.is_unset());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let parsed = MergeSettings::parse(
            "m_colour = blue\r\nm_mergeif = a := b\r\nnot a setting\r\n",
            Path::new("x.ini"),
        )
        .unwrap();
        assert_eq!(parsed.merge_if, HeaderPair::new("a", "b"));
        assert_eq!(parsed.file, None);
    }

    #[test]
    fn test_bad_count_is_an_error() {
        let err = MergeSettings::parse("m_filename = a\nm_mergeheaders = many\n", Path::new("x.ini"))
            .unwrap_err();
        assert!(matches!(err, Error::Settings { line: 2, .. }));

        let err = MergeSettings::parse("m_mergeheaders = 2\na := b\n", Path::new("x.ini"))
            .unwrap_err();
        assert!(matches!(err, Error::Settings { line: 1, .. }));
    }

    #[test]
    fn test_mapping_edits() {
        let mut settings = MergeSettings::default();
        settings.add_header("a", "x");
        settings.add_header("b", "y");
        settings.add_header("a", "z");
        assert_eq!(
            settings.merge_headers,
            vec![HeaderPair::new("a", "z"), HeaderPair::new("b", "y")]
        );

        settings.add_header("b", "");
        assert_eq!(settings.merge_headers[1].donor, "");
        settings.remove_header("a");
        settings.remove_header("missing");
        assert_eq!(settings.merge_headers, vec![HeaderPair::new("b", "")]);

        settings.add_folder_header("c", "w");
        settings.remove_folder_header("c");
        assert!(settings.merge_headers_folder.is_empty());
    }

    #[test]
    fn test_dont_import_header() {
        let target = dataset(&[&["DATA", "id", "item"], &["", "1", "Bolt"]], "t.csv");
        let mut settings = MergeSettings::default();
        assert_eq!(settings.dont_import_header(&target), None);

        settings.dont_import_if = NO_DEDUPE.to_string();
        assert_eq!(settings.dont_import_header(&target), None);

        settings.dont_import_if = "id".to_string();
        assert_eq!(settings.dont_import_header(&target), Some(HeaderKey::new("id", 0)));

        settings.dont_import_if = "unknown".to_string();
        assert_eq!(settings.dont_import_header(&target), None);
    }

    #[test]
    fn test_resolve_against_datasets() {
        let target = dataset(&[&["DATA", "sku", "price", "note"], &["", "S1", "", ""]], "t.csv");
        let donor = dataset(&[&["DATA", "Nr", "Preis"], &["", "S1", "2"]], "d.csv");

        let mut settings = MergeSettings::default();
        settings.add_header("price ##1", "Preis");
        settings.add_header("note", "");
        settings.add_header("gone", "Preis");
        settings.set_merge_if("sku", "Nr ##0");

        let mapping = settings.file_mapping(&target, &donor);
        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping.donor_for(&HeaderKey::new("price", 1)),
            Some(&HeaderKey::new("Preis", 1))
        );
        assert_eq!(mapping.donor_for(&HeaderKey::new("note", 2)), None);

        let join = settings.file_join(&target, &donor).unwrap();
        assert_eq!(join, JoinKey::new(HeaderKey::new("sku", 0), HeaderKey::new("Nr", 0)));

        assert!(settings.folder_join(&target, &donor).unwrap().is_append());

        settings.set_merge_if("sku", "missing");
        let err = settings.file_join(&target, &donor).unwrap_err();
        assert!(matches!(err, Error::InvalidJoinConfiguration { .. }));
    }
}

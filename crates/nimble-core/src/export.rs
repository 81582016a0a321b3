//! Record views and filtered exports

use crate::dataset::Dataset;
use crate::error::Result;
use crate::record::{HeaderKey, Record};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Write the records as plain CSV: raw header names, then one row per record
pub fn write_records_csv<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let keys = dataset.header_keys();

    out.write_record(keys.iter().map(|k| k.name.as_str()))?;
    for record in dataset.records() {
        out.write_record(keys.iter().map(|k| record.get(k)))?;
    }
    out.flush()?;
    Ok(())
}

/// The records as a JSON array of objects keyed by header display name
pub fn records_to_json(dataset: &Dataset) -> Value {
    let keys = dataset.header_keys();
    let rows = dataset
        .records()
        .iter()
        .map(|record| {
            let object: Map<String, Value> = keys
                .iter()
                .map(|k| (k.to_string(), Value::String(record.get(k).to_string())))
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

/// Records whose value under `key` equals `value`
pub fn matching_records<'a>(
    dataset: &'a Dataset,
    key: &'a HeaderKey,
    value: &'a str,
) -> impl Iterator<Item = &'a Record> + 'a {
    dataset.records().iter().filter(move |r| r.get(key) == value)
}

/// Save the records matching `key == value` to a new file with the source's
/// header layout
///
/// Returns the number of exported records; nothing is written when none
/// match.
pub fn export_matching(
    source: &Dataset,
    key: &HeaderKey,
    value: &str,
    dest: &Path,
    template: Option<&Path>,
) -> Result<usize> {
    let mut export = Dataset::with_layout(source.header_info().to_vec());
    for record in matching_records(source, key, value) {
        export.add_record(record.clone());
    }

    let count = export.len();
    if count == 0 {
        info!(header = %key, value, "no records to export");
        return Ok(0);
    }

    export.save(Some(dest), template)?;
    info!(dest = %dest.display(), records = count, "exported records");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Grid;

    fn sample() -> Dataset {
        let rows: &[&[&str]] = &[
            &["DATA", "Item", "Qty", "Item"],
            &["", "Bolt", "12", "M8"],
            &["", "Nut, hex", "3", "M6"],
        ];
        let grid: Grid = rows
            .iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect();
        Dataset::from_grid(grid, "stock.csv").unwrap()
    }

    #[test]
    fn test_write_records_csv() {
        let mut out = Vec::new();
        write_records_csv(&sample(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Item,Qty,Item\nBolt,12,M8\n\"Nut, hex\",3,M6\n"
        );
    }

    #[test]
    fn test_records_to_json() {
        let json = records_to_json(&sample());
        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["Item ##0"], "Bolt");
        assert_eq!(json[0]["Item ##2"], "M8");
        assert_eq!(json[1]["Qty ##1"], "3");
    }

    #[test]
    fn test_export_matching() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("m6.csv");
        let ds = sample();
        let key = ds.find_header("Item ##2").unwrap();

        assert_eq!(export_matching(&ds, &key, "M6", &dest, None).unwrap(), 1);
        let exported = Dataset::open(&dest).unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported.records()[0].get(&HeaderKey::new("Item", 0)), "Nut, hex");

        let none = dir.path().join("none.csv");
        assert_eq!(export_matching(&ds, &key, "M10", &none, None).unwrap(), 0);
        assert!(!none.exists());
    }
}

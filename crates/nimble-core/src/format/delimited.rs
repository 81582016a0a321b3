//! Semicolon-separated text files in the Windows-1252 codepage

use super::Grid;
use crate::codec::{is_numeric_for_output, legacy_to_utf8, utf8_to_legacy};
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Separator used when the file has no `sep=` directive, and on every write
pub const DEFAULT_SEPARATOR: &str = ";";

const SEP_DIRECTIVE: &str = "sep=";

/// Read a delimited-text file into a grid
pub fn load(path: &Path) -> Result<Grid> {
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(parse(&legacy_to_utf8(&bytes)))
}

/// Split decoded text into a grid
///
/// Quotes and tab/CR characters are dropped rather than interpreted, so a
/// quoted field containing the separator is still split. Backslashes become
/// `/`.
pub fn parse(content: &str) -> Grid {
    let mut separator = DEFAULT_SEPARATOR.to_string();
    let mut grid = Grid::new();

    for (line_no, raw) in content.lines().enumerate() {
        let line: String = raw
            .chars()
            .filter(|c| !matches!(c, '"' | '\n' | '\t' | '\r'))
            .map(|c| if c == '\\' { '/' } else { c })
            .collect();

        if line_no == 0 {
            if let Some(sep) = line.strip_prefix(SEP_DIRECTIVE) {
                let sep = sep.trim();
                if !sep.is_empty() {
                    separator = sep.to_string();
                }
                continue;
            }
        }

        grid.push(line.split(separator.as_str()).map(str::to_string).collect());
    }

    grid
}

/// Render a grid as delimited text (before codepage encoding)
pub fn render(grid: &Grid) -> String {
    let mut out = format!("{}{}\r\n", SEP_DIRECTIVE, DEFAULT_SEPARATOR);

    for row in grid {
        let fields: Vec<String> = row.iter().map(|value| quote_field(value)).collect();
        out.push_str(&fields.join(DEFAULT_SEPARATOR));
        out.push_str("\r\n");
    }

    out
}

/// Write a grid as a delimited-text file
pub fn save(path: &Path, grid: &Grid) -> Result<()> {
    fs::write(path, utf8_to_legacy(&render(grid)))?;
    Ok(())
}

/// Quote a value unless it is written as a number; empty values stay empty
fn quote_field(value: &str) -> String {
    let value = value.replace('\n', " ");
    if value.is_empty() || is_numeric_for_output(&value) {
        value
    } else {
        format!("\"{}\"", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_separator() {
        let grid = parse("DATA;Item;Qty\n;Bolt;12\n");
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0], vec!["DATA", "Item", "Qty"]);
        assert_eq!(grid[1], vec!["", "Bolt", "12"]);
    }

    #[test]
    fn test_parse_sep_directive() {
        let grid = parse("sep=|\r\nDATA|a;b|c\r\n");
        assert_eq!(grid.len(), 1);
        assert_eq!(grid[0], vec!["DATA", "a;b", "c"]);
    }

    #[test]
    fn test_parse_strips_quotes_and_controls() {
        let grid = parse("\"DATA\";\"Item\tName\";\"Qty\"\r\n");
        assert_eq!(grid[0], vec!["DATA", "ItemName", "Qty"]);
    }

    #[test]
    fn test_parse_normalizes_backslashes() {
        let grid = parse("DATA;Path\r\n;\\\\srv\\in\\a.pdf\r\n");
        assert_eq!(grid[1], vec!["", "//srv/in/a.pdf"]);
    }

    #[test]
    fn test_parse_keeps_trailing_empty_fields() {
        let grid = parse("DATA;a;;\n");
        assert_eq!(grid[0], vec!["DATA", "a", "", ""]);
    }

    #[test]
    fn test_parse_blank_line_is_an_empty_row() {
        let grid = parse("DATA;a\n;1\n\n;2\n");
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[2], vec![""]);
    }

    #[test]
    fn test_render_quotes_text_only() {
        let grid: Grid = vec![
            vec!["DATA".into(), "Item".into(), "Qty".into(), "Weight".into()],
            vec!["".into(), "Bolt".into(), "12".into(), "1,500".into()],
            vec!["".into(), "Nut".into(), "-3".into(), "2.5".into()],
        ];
        let text = render(&grid);
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(lines[0], "sep=;");
        assert_eq!(lines[1], "\"DATA\";\"Item\";\"Qty\";\"Weight\"");
        assert_eq!(lines[2], ";\"Bolt\";12;1,500");
        assert_eq!(lines[3], ";\"Nut\";-3;\"2.5\"");
    }

    #[test]
    fn test_render_flattens_newlines() {
        let grid: Grid = vec![vec!["two\nlines".into()]];
        assert!(render(&grid).contains("\"two lines\""));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipts.csv");
        let grid: Grid = vec![
            vec!["DATA".into(), "Lieferant".into(), "Menge".into()],
            vec!["".into(), "Müller".into(), "4,250".into()],
        ];

        save(&path, &grid).unwrap();
        let raw = fs::read(&path).unwrap();
        assert!(raw.contains(&0xFC));

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, grid);
    }
}

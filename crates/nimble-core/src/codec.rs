//! Cell value classification and encoding helpers

use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Fractional separator used when numbers are displayed and written
pub const DECIMAL_SEPARATOR: char = ',';

/// The kind of value a cell string holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    /// Optional sign followed by ASCII digits
    Integer,
    /// Optional sign, digits and exactly one `.` or `,`
    Decimal,
    /// Anything else, including the empty string
    Text,
}

impl CellKind {
    /// Whether the value is numeric (integer or decimal)
    pub fn is_numeric(self) -> bool {
        !matches!(self, CellKind::Text)
    }
}

/// Classify a cell string
pub fn classify(text: &str) -> CellKind {
    let digits = text
        .strip_prefix('+')
        .or_else(|| text.strip_prefix('-'))
        .unwrap_or(text);

    let mut separators = 0;
    let mut digit_count = 0;
    for c in digits.chars() {
        match c {
            '0'..='9' => digit_count += 1,
            '.' | ',' => {
                separators += 1;
                if separators > 1 {
                    return CellKind::Text;
                }
            }
            _ => return CellKind::Text,
        }
    }

    match (digit_count, separators) {
        (0, _) => CellKind::Text,
        (_, 0) => CellKind::Integer,
        _ => CellKind::Decimal,
    }
}

/// Whether a value is written as a number: integers always, decimals only
/// when they use the display separator
pub fn is_numeric_for_output(text: &str) -> bool {
    match classify(text) {
        CellKind::Integer => true,
        CellKind::Decimal => text.contains(DECIMAL_SEPARATOR),
        CellKind::Text => false,
    }
}

/// Parse a numeric cell string, accepting either separator
pub fn parse_number(text: &str) -> Option<f64> {
    if !classify(text).is_numeric() {
        return None;
    }
    text.replace(DECIMAL_SEPARATOR, ".").parse().ok()
}

/// Format a number with three fractional digits and a decimal comma
pub fn to_display_decimal(number: f64) -> String {
    format!("{:.3}", number).replace('.', ",")
}

/// Convert a 1900-epoch spreadsheet day count into `dd.mm.yyyy`
///
/// Uses the Fliegel/Van Flandern Julian-day arithmetic with truncating integer
/// division. The phantom 1900-02-29 does not exist here, so serials up to 60
/// land one day earlier than spreadsheet tools display them. Returns `None`
/// when the serial is too large for the arithmetic.
pub fn serial_to_date(serial: i64) -> Option<String> {
    let mut l = serial.checked_add(68569 + 2415019)?;
    let n = l.checked_mul(4)? / 146097;
    l -= (n.checked_mul(146097)? + 3) / 4;
    let i = 4000 * (l + 1) / 1461001;
    l = l - 1461 * i / 4 + 31;
    let j = 80 * l / 2447;
    let day = l - 2447 * j / 80;
    l = j / 11;
    let month = j + 2 - 12 * l;
    let year = n.checked_sub(49)?.checked_mul(100)?.checked_add(i + l)?;

    Some(format!("{:02}.{:02}.{}", day, month, year))
}

/// Decode delimited-text bytes stored in Windows-1252
///
/// A leading UTF-8 byte order mark means the file is already UTF-8; the mark
/// is dropped either way.
pub fn legacy_to_utf8(bytes: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    match text {
        Cow::Borrowed(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
        Cow::Owned(s) => match s.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => s,
        },
    }
}

/// Encode text as Windows-1252 for writing delimited-text files
///
/// Characters outside the codepage become numeric character references.
pub fn utf8_to_legacy(text: &str) -> Vec<u8> {
    let (bytes, _, _) = WINDOWS_1252.encode(text);
    bytes.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_integer() {
        assert_eq!(classify("42"), CellKind::Integer);
        assert_eq!(classify("-7"), CellKind::Integer);
        assert_eq!(classify("+0012"), CellKind::Integer);
    }

    #[test]
    fn test_classify_decimal() {
        assert_eq!(classify("12,5"), CellKind::Decimal);
        assert_eq!(classify("12.5"), CellKind::Decimal);
        assert_eq!(classify("-0,250"), CellKind::Decimal);
    }

    #[test]
    fn test_classify_text() {
        assert_eq!(classify("12.5.6"), CellKind::Text);
        assert_eq!(classify("12,5,6"), CellKind::Text);
        assert_eq!(classify("12,5.6"), CellKind::Text);
        assert_eq!(classify("abc"), CellKind::Text);
        assert_eq!(classify("1 2"), CellKind::Text);
        assert_eq!(classify("-"), CellKind::Text);
        assert_eq!(classify(","), CellKind::Text);
    }

    #[test]
    fn test_classify_empty_is_not_numeric() {
        assert_eq!(classify(""), CellKind::Text);
        assert!(!classify("").is_numeric());
    }

    #[test]
    fn test_numeric_for_output_needs_comma() {
        assert!(is_numeric_for_output("17"));
        assert!(is_numeric_for_output("3,250"));
        assert!(!is_numeric_for_output("3.250"));
        assert!(!is_numeric_for_output("PO-17"));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("-3"), Some(-3.0));
        assert_eq!(parse_number("x"), None);
    }

    #[test]
    fn test_display_decimal() {
        assert_eq!(to_display_decimal(12.5), "12,500");
        assert_eq!(to_display_decimal(0.1234), "0,123");
        assert_eq!(to_display_decimal(-2.0), "-2,000");
    }

    #[test]
    fn test_serial_to_date() {
        assert_eq!(serial_to_date(1).as_deref(), Some("31.12.1899"));
        assert_eq!(serial_to_date(61).as_deref(), Some("01.03.1900"));
        assert_eq!(serial_to_date(45000).as_deref(), Some("15.03.2023"));
    }

    #[test]
    fn test_serial_before_march_1900_is_shifted() {
        assert_eq!(serial_to_date(59).as_deref(), Some("27.02.1900"));
        assert_eq!(serial_to_date(60).as_deref(), Some("28.02.1900"));
    }

    #[test]
    fn test_serial_out_of_range() {
        assert_eq!(serial_to_date(i64::MAX), None);
        assert_eq!(serial_to_date(i64::MAX / 2), None);
    }

    #[test]
    fn test_legacy_round_trip() {
        let bytes = utf8_to_legacy("Größe;Menge");
        assert_eq!(bytes[2], 0xF6);
        assert_eq!(legacy_to_utf8(&bytes), "Größe;Menge");
    }

    #[test]
    fn test_legacy_strips_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFsep=;";
        assert_eq!(legacy_to_utf8(bytes), "sep=;");
    }
}

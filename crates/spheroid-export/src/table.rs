//! Delimited area table.
//!
//! One header line followed by one row per analysed image:
//!
//! ```text
//! filename,total_area_px,spheroid_area_px,invasion_area_px,invasion_ratio
//! well-a1.png,5230,4100,1130,0.275609756097561
//! ```
//!
//! An undefined ratio (empty spheroid) is written as `NaN`. Fields that
//! contain the delimiter, a double quote or a line break are quoted,
//! with embedded quotes doubled.

use std::io::Write;

use csv::{QuoteStyle, WriterBuilder};
use spheroid_pipeline::AreaStats;

/// Column names, in order.
pub const HEADER: [&str; 5] = [
    "filename",
    "total_area_px",
    "spheroid_area_px",
    "invasion_area_px",
    "invasion_ratio",
];

/// Errors from table serialization.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The delimiter would make rows ambiguous or is not a single byte.
    #[error("unusable delimiter {0:?}: must be ASCII and not a quote or line break")]
    InvalidDelimiter(char),

    /// A record could not be written.
    #[error("failed to write table record: {0}")]
    Csv(#[from] csv::Error),

    /// The buffered table could not be flushed.
    #[error("failed to flush table: {0}")]
    Io(#[from] std::io::Error),

    /// The serialized table was not valid UTF-8.
    #[error("table is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Format an invasion ratio cell.
#[must_use]
pub fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "NaN".to_string(), |r| r.to_string())
}

/// Write one `stats` record.
///
/// # Errors
///
/// Returns the underlying [`csv::Error`] if the record cannot be written.
pub fn write_row<W: Write>(
    writer: &mut csv::Writer<W>,
    stats: &AreaStats,
) -> Result<(), csv::Error> {
    writer.write_record([
        stats.filename.clone(),
        stats.total_area.to_string(),
        stats.spheroid_area.to_string(),
        stats.invasion_area.to_string(),
        format_ratio(stats.invasion_ratio),
    ])
}

/// Serialize a header plus one row per record, in the given order.
///
/// # Errors
///
/// Returns [`TableError::InvalidDelimiter`] for `"`, `\r`, `\n` or a
/// non-ASCII delimiter.
pub fn to_table(rows: &[AreaStats], delimiter: char) -> Result<String, TableError> {
    let byte = u8::try_from(delimiter)
        .ok()
        .filter(|&b| b.is_ascii() && !matches!(b, b'"' | b'\r' | b'\n'))
        .ok_or(TableError::InvalidDelimiter(delimiter))?;

    let mut writer = WriterBuilder::new()
        .delimiter(byte)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer.write_record(HEADER)?;
    for stats in rows {
        write_row(&mut writer, stats)?;
    }
    let bytes = writer.into_inner().map_err(|e| TableError::Io(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stats(filename: &str, spheroid: u64, invasion: u64) -> AreaStats {
        #[allow(clippy::cast_precision_loss)]
        let ratio = (spheroid > 0).then(|| invasion as f64 / spheroid as f64);
        AreaStats {
            filename: filename.to_string(),
            total_area: spheroid + invasion,
            spheroid_area: spheroid,
            invasion_area: invasion,
            invasion_ratio: ratio,
        }
    }

    #[test]
    fn header_only_for_no_rows() {
        let table = to_table(&[], ',').unwrap();
        assert_eq!(
            table,
            "filename,total_area_px,spheroid_area_px,invasion_area_px,invasion_ratio\n"
        );
    }

    #[test]
    fn rows_follow_input_order() {
        let table = to_table(&[stats("b.png", 400, 100), stats("a.png", 200, 0)], ',').unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "b.png,500,400,100,0.25");
        assert_eq!(lines[2], "a.png,200,200,0,0");
    }

    #[test]
    fn undefined_ratio_is_nan() {
        let table = to_table(&[stats("empty.png", 0, 12)], ',').unwrap();
        assert!(table.lines().nth(1).unwrap().ends_with(",NaN"));
        assert_eq!(format_ratio(None), "NaN");
    }

    #[test]
    fn filenames_with_delimiter_or_quotes_are_quoted() {
        let table = to_table(
            &[stats("a,b.png", 1, 0), stats("say \"hi\".png", 1, 0)],
            ',',
        )
        .unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[1].starts_with("\"a,b.png\","));
        assert!(lines[2].starts_with("\"say \"\"hi\"\".png\","));
    }

    #[test]
    fn custom_delimiter() {
        let table = to_table(&[stats("a,b.png", 10, 5)], '\t').unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("filename\ttotal_area_px\t"));
        assert_eq!(lines[1], "a,b.png\t15\t10\t5\t0.5");
    }

    #[test]
    fn quote_and_newline_delimiters_are_rejected() {
        for bad in ['"', '\n', '\r', '§'] {
            assert!(
                matches!(to_table(&[], bad), Err(TableError::InvalidDelimiter(c)) if c == bad),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn semicolon_delimiter_quotes_only_semicolon_fields() {
        let table = to_table(&[stats("a;b.png", 4, 1), stats("a,b.png", 4, 1)], ';').unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[1], "\"a;b.png\";5;4;1;0.25");
        assert_eq!(lines[2], "a,b.png;5;4;1;0.25");
    }
}

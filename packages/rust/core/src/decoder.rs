//! Line-oriented CSV decoding.
//!
//! The first non-blank line is the header. Every following non-blank line is
//! split on the delimiter and paired positionally with the headers. Blank lines
//! are skipped and never counted. Quoted fields are not supported: a value
//! containing the delimiter is split like any other.
//!
//! Header names are map keys, so a repeated header keeps the value of its
//! rightmost column present on that row.

use rowpipe_shared::RawRow;

/// Default field delimiter.
pub const DEFAULT_DELIMITER: char = ',';

/// One decoded data row.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    /// 1-based index among data rows.
    pub row: usize,
    /// 1-based physical line number in the source text.
    pub line: usize,
    pub fields: RawRow,
}

/// Interpret raw object bytes as UTF-8 text, dropping a leading byte-order mark.
pub fn decode_utf8(bytes: &[u8]) -> std::result::Result<&str, std::str::Utf8Error> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Decode `text` lazily into rows. The iterator is single-pass.
pub fn decode(text: &str, delimiter: char) -> CsvRows<'_> {
    CsvRows {
        lines: text.lines().enumerate(),
        headers: None,
        delimiter,
        rows_seen: 0,
    }
}

/// Lazy row iterator returned by [`decode`].
pub struct CsvRows<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    headers: Option<Vec<String>>,
    delimiter: char,
    rows_seen: usize,
}

impl CsvRows<'_> {
    /// Header names, once the header line has been consumed.
    pub fn headers(&self) -> Option<&[String]> {
        self.headers.as_deref()
    }
}

impl Iterator for CsvRows<'_> {
    type Item = DecodedRow;

    fn next(&mut self) -> Option<DecodedRow> {
        for (idx, line) in self.lines.by_ref() {
            if line.trim().is_empty() {
                continue;
            }

            match &self.headers {
                None => {
                    self.headers = Some(
                        line.split(self.delimiter)
                            .map(|h| h.trim().to_string())
                            .collect(),
                    );
                }
                Some(headers) => {
                    // Short rows leave trailing headers absent; surplus values are dropped.
                    let fields = headers
                        .iter()
                        .zip(line.split(self.delimiter))
                        .map(|(header, value)| (header.clone(), value.trim().to_string()))
                        .collect();
                    self.rows_seen += 1;
                    return Some(DecodedRow {
                        row: self.rows_seen,
                        line: idx + 1,
                        fields,
                    });
                }
            }
        }
        None
    }
}

//! Raw CSV tables as downloaded.
//!
//! Source files are loaded untyped (headers + string cells) and interpreted
//! by the per-source normalizers. Non-UTF-8 cells (Census publishes Latin-1)
//! are decoded byte-for-byte instead of failing the load.

use csv::{ByteRecord, ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {file}: {source}")]
    Read {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("{file}: missing expected column '{column}'")]
    MissingColumn { file: String, column: String },
}

/// An untyped CSV table.
#[derive(Debug, Clone)]
pub struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

impl RawTable {
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let name = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| TableError::Read {
            file: name.clone(),
            source: csv::Error::from(e),
        })?;
        Self::from_reader(&name, file)
    }

    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self, TableError> {
        let err = |source| TableError::Read {
            file: name.to_string(),
            source,
        };
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .byte_headers()
            .map_err(err)?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let h = decode(h);
                let h = if i == 0 {
                    h.trim_start_matches('\u{feff}').to_string()
                } else {
                    h
                };
                h.trim().to_string()
            })
            .collect();

        let mut rows = Vec::new();
        let mut record = ByteRecord::new();
        while rdr.read_byte_record(&mut record).map_err(err)? {
            let fields: Vec<String> = record.iter().map(decode).collect();
            rows.push(StringRecord::from(fields));
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column whose header equals any alias (case-insensitive).
    pub fn find_column(&self, aliases: &[&str]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            self.headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(alias))
        })
    }

    pub fn require_column(&self, aliases: &[&str]) -> Result<usize, TableError> {
        self.find_column(aliases)
            .ok_or_else(|| TableError::MissingColumn {
                file: self.name.clone(),
                column: aliases.first().copied().unwrap_or_default().to_string(),
            })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|record| Row { record })
    }
}

/// A borrowed row. Empty cells read as `None`.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.record
            .get(index)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Numeric cell; thousands separators are tolerated, non-numbers read as `None`.
    pub fn number(&self, index: usize) -> Option<f64> {
        let raw = self.get(index)?;
        let value: f64 = if raw.contains(',') {
            raw.replace(',', "").parse().ok()?
        } else {
            raw.parse().ok()?
        };
        value.is_finite().then_some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_headers_and_rows() {
        let csv = "\u{feff}RegionName,2024-01-31\n\"Austin, TX\",\"450,000\"\nDallas,\n";
        let table = RawTable::from_reader("mem.csv", csv.as_bytes()).unwrap();
        assert_eq!(table.headers()[0], "RegionName");
        assert_eq!(table.len(), 2);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].number(1), Some(450_000.0));
        assert_eq!(rows[1].get(1), None);
    }

    #[test]
    fn latin1_cells_are_decoded() {
        let mut bytes = b"CTYNAME\nDo".to_vec();
        bytes.push(0xF1); // n with tilde in Latin-1
        bytes.extend_from_slice(b"a Ana County\n");
        let table = RawTable::from_reader("census.csv", bytes.as_slice()).unwrap();
        let row = table.rows().next().unwrap();
        assert_eq!(row.get(0), Some("Do\u{f1}a Ana County"));
    }

    #[test]
    fn missing_column_names_file_and_column() {
        let table = RawTable::from_reader("bls.csv", "year,value\n".as_bytes()).unwrap();
        let err = table.require_column(&["series_id", "seriesID"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "bls.csv: missing expected column 'series_id'"
        );
        assert_eq!(table.find_column(&["YEAR"]), Some(0));
    }
}

//! Chunked CSV reading. A source is consumed in one forward pass, at most `chunk_size`
//! rows at a time, so memory stays bounded regardless of file size.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

use csv::{ByteRecord, ReaderBuilder};
use tracing::{debug, warn};

use super::source::CsvSource;
use crate::common::error::SourceError;
use crate::domain::{RawRow, RejectReason, Rejection};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const CANDIDATE_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// One entry read from the source: a well-formed row or a malformed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEntry {
    Row(RawRow),
    Malformed(Rejection),
}

impl RawEntry {
    pub fn row_number(&self) -> u64 {
        match self {
            RawEntry::Row(row) => row.row_number,
            RawEntry::Malformed(rejection) => rejection.row_number,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBatch {
    pub entries: Vec<RawEntry>,
}

impl RawBatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ChunkedReader {
    location: String,
    header: Vec<String>,
    records: Option<csv::Reader<BufReader<Box<dyn Read + Send>>>>,
    chunk_size: usize,
    rows_read: u64,
}

impl ChunkedReader {
    /// Open `source` and read its header line.
    ///
    /// The delimiter is sniffed from the header (`,`, `;` or tab) and a UTF-8 BOM is
    /// dropped. A zero-byte source opens successfully and yields no batches.
    pub fn open(source: &CsvSource, chunk_size: usize) -> Result<Self, SourceError> {
        let location = source.location();
        let mut input = BufReader::new(source.open()?);

        let mut header_line = Vec::new();
        input
            .read_until(b'\n', &mut header_line)
            .map_err(|e| SourceError::Read {
                location: location.clone(),
                source: csv::Error::from(e),
            })?;

        let header_bytes = header_line
            .strip_prefix(UTF8_BOM)
            .unwrap_or(header_line.as_slice());
        if header_bytes.iter().all(|b| b.is_ascii_whitespace()) {
            debug!(location = %location, "Source is empty");
            return Ok(Self {
                location,
                header: Vec::new(),
                records: None,
                chunk_size: chunk_size.max(1),
                rows_read: 0,
            });
        }

        let delimiter = sniff_delimiter(header_bytes);
        let header = parse_header(header_bytes, delimiter).map_err(|message| SourceError::Header {
            location: location.clone(),
            message,
        })?;
        debug!(
            location = %location,
            columns = header.len(),
            delimiter = %char::from(delimiter).escape_default(),
            "Opened CSV source"
        );

        let records = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(input);

        Ok(Self {
            location,
            header,
            records: Some(records),
            chunk_size: chunk_size.max(1),
            rows_read: 0,
        })
    }

    /// [`ChunkedReader::open`] on the blocking pool.
    pub async fn open_blocking(source: CsvSource, chunk_size: usize) -> Result<Self, SourceError> {
        let location = source.location();
        tokio::task::spawn_blocking(move || Self::open(&source, chunk_size))
            .await
            .map_err(|e| SourceError::Task {
                location,
                message: e.to_string(),
            })?
    }

    /// Read the next batch on the blocking pool and hand the reader back with it, so
    /// source I/O never stalls a runtime worker.
    pub async fn next_batch_blocking(mut self) -> Result<(Self, Option<RawBatch>), SourceError> {
        let location = self.location.clone();
        tokio::task::spawn_blocking(move || -> Result<(Self, Option<RawBatch>), SourceError> {
            let batch = self.next_batch()?;
            Ok((self, batch))
        })
        .await
        .map_err(|e| SourceError::Task {
            location,
            message: e.to_string(),
        })?
    }

    /// Lower-cased, trimmed column names in file order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn to_entry(&self, row_number: u64, record: &ByteRecord) -> RawEntry {
        if record.len() != self.header.len() {
            return RawEntry::Malformed(Rejection {
                row_number,
                field: None,
                reason: RejectReason::MalformedRow,
                message: format!(
                    "expected {} columns, found {}",
                    self.header.len(),
                    record.len()
                ),
            });
        }

        let mut values = HashMap::with_capacity(self.header.len());
        for (name, raw) in self.header.iter().zip(record.iter()) {
            match std::str::from_utf8(raw) {
                Ok(value) => {
                    values.insert(name.clone(), value.to_string());
                }
                Err(_) => {
                    return RawEntry::Malformed(Rejection {
                        row_number,
                        field: Some(name.clone()),
                        reason: RejectReason::MalformedRow,
                        message: "value is not valid UTF-8".to_string(),
                    })
                }
            }
        }
        RawEntry::Row(RawRow::new(row_number, values))
    }
}

impl ChunkedReader {
    /// Next batch of at most `chunk_size` entries. Returns `Ok(None)` once the source is
    /// exhausted and never yields an empty batch.
    pub fn next_batch(&mut self) -> Result<Option<RawBatch>, SourceError> {
        let mut entries = Vec::with_capacity(self.chunk_size);
        let mut record = ByteRecord::new();

        while entries.len() < self.chunk_size {
            let more = match self.records.as_mut() {
                Some(records) => records
                    .read_byte_record(&mut record)
                    .map_err(|source| SourceError::Read {
                        location: self.location.clone(),
                        source,
                    })?,
                None => false,
            };
            if !more {
                self.records = None;
                break;
            }
            self.rows_read += 1;
            entries.push(self.to_entry(self.rows_read, &record));
        }

        if entries.is_empty() {
            Ok(None)
        } else {
            Ok(Some(RawBatch { entries }))
        }
    }
}

/// Pick the candidate delimiter occurring most often in the header, defaulting to `,`.
fn sniff_delimiter(header: &[u8]) -> u8 {
    let mut best = b',';
    let mut best_count = 0;
    for candidate in CANDIDATE_DELIMITERS {
        let count = header.iter().filter(|b| **b == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

fn parse_header(line: &[u8], delimiter: u8) -> Result<Vec<String>, String> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .from_reader(line);
    let mut record = ByteRecord::new();
    match reader.read_byte_record(&mut record) {
        Ok(true) => {}
        Ok(false) => return Err("header line is empty".to_string()),
        Err(e) => return Err(e.to_string()),
    }

    let mut names = Vec::with_capacity(record.len());
    for raw in record.iter() {
        let name = std::str::from_utf8(raw)
            .map_err(|_| "header is not valid UTF-8".to_string())?
            .trim()
            .to_lowercase();
        names.push(name);
    }
    Ok(names)
}

/// Columns of `header` that are not in `known`, for a one-off warning by the caller.
pub fn unknown_columns<'a>(header: &'a [String], known: &[&str]) -> Vec<&'a str> {
    header
        .iter()
        .map(String::as_str)
        .filter(|name| !name.is_empty() && !known.contains(name))
        .collect()
}

/// Warn once per source about header columns that no schema field reads.
pub fn warn_unknown_columns(reader: &ChunkedReader, known: &[&str]) {
    let unknown = unknown_columns(reader.header(), known);
    if !unknown.is_empty() {
        warn!(
            location = reader.location(),
            columns = ?unknown,
            "Ignoring columns not defined in the schema"
        );
    }
}

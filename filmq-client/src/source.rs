//! Record sources feeding the batch builder.

use crate::error::SourceError;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// An ordered stream of already-delimited text records.
pub trait RecordSource {
    /// Returns the next record, or `None` once the source is drained.
    fn next_record(&mut self) -> Result<Option<String>, SourceError>;
}

impl RecordSource for VecDeque<String> {
    fn next_record(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.pop_front())
    }
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn next_record(&mut self) -> Result<Option<String>, SourceError> {
        (**self).next_record()
    }
}

/// Reads CSV records, yielding each one as its raw text.
///
/// The first record is treated as a header and skipped. Quoted fields may
/// contain line breaks; the record is returned with its own line breaks intact
/// and the terminating one stripped. Blank lines are skipped.
pub struct CsvRecordReader<R> {
    reader: R,
    line: usize,
    header_skipped: bool,
}

impl CsvRecordReader<BufReader<File>> {
    /// Opens a CSV file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> CsvRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            header_skipped: false,
        }
    }

    /// Number of physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line
    }

    fn read_raw_record(&mut self) -> Result<Option<String>, SourceError> {
        let start_line = self.line + 1;
        let mut record = String::new();
        let mut in_quotes = false;

        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                if in_quotes {
                    return Err(SourceError::UnterminatedQuote { line: start_line });
                }
                return Ok((!record.is_empty()).then_some(record));
            }
            self.line += 1;

            // Escaped quotes ("") toggle twice and cancel out.
            in_quotes ^= line.bytes().filter(|&b| b == b'"').count() % 2 == 1;
            record.push_str(&line);

            if !in_quotes {
                let trimmed = record.trim_end_matches(['\n', '\r']).len();
                record.truncate(trimmed);
                return Ok(Some(record));
            }
        }
    }
}

impl<R: BufRead> RecordSource for CsvRecordReader<R> {
    fn next_record(&mut self) -> Result<Option<String>, SourceError> {
        if !self.header_skipped {
            self.header_skipped = true;
            if self.read_raw_record()?.is_none() {
                return Ok(None);
            }
        }

        loop {
            match self.read_raw_record()? {
                Some(record) if record.is_empty() => continue,
                other => return Ok(other),
            }
        }
    }
}

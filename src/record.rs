use memchr::memchr;
use std::io::BufRead;

use crate::error::Result;

/// One parsed input line: an ordered sequence of string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<String>,
    line: u64,
}

impl Record {
    /// Create a record from its fields and 1-based source line number
    pub fn new(fields: Vec<String>, line: u64) -> Self {
        Self { fields, line }
    }

    /// Get a field by zero-based index
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Number of fields in this record
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Source line number this record was parsed from
    pub fn line(&self) -> u64 {
        self.line
    }
}

/// A sequential source of records.
///
/// `Ok(None)` signals end of input; `Err` is an I/O failure, distinct from
/// a record that merely lacks fields.
pub trait RecordSource {
    fn read_record(&mut self) -> Result<Option<Record>>;
}

/// Reads delimited text records from any buffered reader.
///
/// Each line becomes one record, split on a single delimiter byte. An empty
/// line yields a record with zero fields. Quoting rules are out of scope;
/// inputs that need them should supply their own [`RecordSource`].
pub struct DelimitedReader<R> {
    input: R,
    delimiter: u8,
    line: u64,
    buf: Vec<u8>,
}

impl<R: BufRead> DelimitedReader<R> {
    /// Create a reader with the default comma delimiter
    pub fn new(input: R) -> Self {
        Self::with_delimiter(input, b',')
    }

    /// Create a reader with a custom delimiter byte
    pub fn with_delimiter(input: R, delimiter: u8) -> Self {
        Self {
            input,
            delimiter,
            line: 0,
            buf: Vec::with_capacity(256),
        }
    }

    fn split_fields(&self, line: &[u8]) -> Vec<String> {
        if line.is_empty() {
            return Vec::new();
        }
        let mut fields = Vec::new();
        let mut rest = line;
        loop {
            match memchr(self.delimiter, rest) {
                Some(pos) => {
                    fields.push(String::from_utf8_lossy(&rest[..pos]).into_owned());
                    rest = &rest[pos + 1..];
                }
                None => {
                    fields.push(String::from_utf8_lossy(rest).into_owned());
                    break;
                }
            }
        }
        fields
    }
}

impl<R: BufRead> RecordSource for DelimitedReader<R> {
    fn read_record(&mut self) -> Result<Option<Record>> {
        self.buf.clear();
        let n = self.input.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.line += 1;

        let mut end = self.buf.len();
        if end > 0 && self.buf[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && self.buf[end - 1] == b'\r' {
            end -= 1;
        }

        let fields = self.split_fields(&self.buf[..end]);
        Ok(Some(Record::new(fields, self.line)))
    }
}

/// A record source backed by an in-memory list, for tests and benchmarks
pub struct StaticSource {
    records: std::vec::IntoIter<Record>,
}

impl StaticSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl RecordSource for StaticSource {
    fn read_record(&mut self) -> Result<Option<Record>> {
        Ok(self.records.next())
    }
}

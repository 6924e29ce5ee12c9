//! Sequential log scanner

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use tracing::warn;

use crate::log::LogRecord;

/// How a scan terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEnd {
    /// Last record ended exactly at end of file
    Clean,
    /// Bytes after the last good record did not decode; treated as end-of-stream
    Incomplete { offset: u64, reason: String },
    /// The underlying file could not be read
    Io { offset: u64, reason: String },
}

/// Iterates records from the start of a log, stopping at the first bad one.
///
/// Check [`LogReader::end`] after the iterator is exhausted.
pub struct LogReader<R> {
    inner: R,
    offset: u64,
    end: Option<LogEnd>,
}

impl LogReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            end: None,
        }
    }

    /// Byte offset just past the last good record
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// `None` until the scan has finished
    pub fn end(&self) -> Option<&LogEnd> {
        self.end.as_ref()
    }

    fn read_record(&mut self) -> Result<Option<LogRecord>, LogEnd> {
        match self.inner.fill_buf() {
            Ok([]) => return Ok(None),
            Ok(_) => {}
            Err(e) => {
                return Err(LogEnd::Io {
                    offset: self.offset,
                    reason: e.to_string(),
                })
            }
        }

        let mut counted = Counted {
            inner: &mut self.inner,
            consumed: 0,
        };
        match rmp_serde::from_read::<_, LogRecord>(&mut counted) {
            Ok(record) => {
                self.offset += counted.consumed;
                Ok(Some(record))
            }
            Err(e) => Err(LogEnd::Incomplete {
                offset: self.offset,
                reason: e.to_string(),
            }),
        }
    }
}

impl<R: BufRead> Iterator for LogReader<R> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        if self.end.is_some() {
            return None;
        }

        match self.read_record() {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                self.end = Some(LogEnd::Clean);
                None
            }
            Err(end) => {
                warn!("Log scan stopped: {:?}", end);
                self.end = Some(end);
                None
            }
        }
    }
}

struct Counted<'a, R> {
    inner: &'a mut R,
    consumed: u64,
}

impl<R: Read> Read for Counted<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Aggregate view of a whole log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    pub records: u64,
    pub first_timestamp: Option<u32>,
    pub last_timestamp: Option<u32>,
    pub payload_bytes: u64,
    pub min_payload: Option<usize>,
    pub max_payload: Option<usize>,
    pub end: LogEnd,
}

impl LogSummary {
    /// Scan `reader` to completion, calling `visit` on each record.
    pub fn scan<R: BufRead>(
        mut reader: LogReader<R>,
        mut visit: impl FnMut(&LogRecord),
    ) -> LogSummary {
        let mut summary = LogSummary {
            records: 0,
            first_timestamp: None,
            last_timestamp: None,
            payload_bytes: 0,
            min_payload: None,
            max_payload: None,
            end: LogEnd::Clean,
        };

        for record in reader.by_ref() {
            let len = record.payload.len();
            summary.records += 1;
            summary.first_timestamp.get_or_insert(record.sensor_timestamp);
            summary.last_timestamp = Some(record.sensor_timestamp);
            summary.payload_bytes += len as u64;
            summary.min_payload = Some(summary.min_payload.map_or(len, |m| m.min(len)));
            summary.max_payload = Some(summary.max_payload.map_or(len, |m| m.max(len)));
            visit(&record);
        }

        if let Some(end) = reader.end() {
            summary.end = end.clone();
        }
        summary
    }
}

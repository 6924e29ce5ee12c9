//! Append-only MessagePack frame log.
//!
//! Each record is a three-element array `[kind, sensor_timestamp, payload]`
//! with `payload` as a bin field. There is no index or checksum; readers scan
//! from the start and stop at the first record that does not decode.

pub mod persister;
pub mod reader;
pub mod record;

pub use persister::Persister;
pub use reader::{LogEnd, LogReader, LogSummary};
pub use record::{LogRecord, RecordRef};

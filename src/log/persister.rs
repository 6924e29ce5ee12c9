use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::capture::FrameKind;
use crate::error::PersistError;
use crate::log::RecordRef;

/// Owns the log file. Each `append` is exactly one `write` call; nothing is
/// batched, retried or fsynced.
pub struct Persister {
    out: Box<dyn Write + Send>,
    path: PathBuf,
    scratch: Vec<u8>,
    records: u64,
    bytes: u64,
}

impl Persister {
    /// Open `path` for appending; `truncate` discards any previous session.
    pub fn open(path: impl AsRef<Path>, truncate: bool) -> Result<Self, PersistError> {
        let path = path.as_ref().to_path_buf();

        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }

        let file = options.open(&path).map_err(|source| PersistError::Open {
            path: path.clone(),
            source,
        })?;

        info!(
            "Writing frame log to {} ({})",
            path.display(),
            if truncate { "truncated" } else { "appending" }
        );

        Ok(Self::from_writer(file, path))
    }

    /// Persist into any writer; `path` only labels it in diagnostics.
    pub fn from_writer(out: impl Write + Send + 'static, path: PathBuf) -> Self {
        Self {
            out: Box::new(out),
            path,
            scratch: Vec::new(),
            records: 0,
            bytes: 0,
        }
    }

    /// Serialize one record and write it; returns the record size in bytes.
    pub fn append(
        &mut self,
        sensor_timestamp: u32,
        kind: FrameKind,
        payload: &[u8],
    ) -> Result<usize, PersistError> {
        self.scratch.clear();
        rmp_serde::encode::write(
            &mut self.scratch,
            &RecordRef {
                kind: kind.tag(),
                sensor_timestamp,
                payload,
            },
        )?;

        let expected = self.scratch.len();
        let written = self.out.write(&self.scratch)?;
        if written != expected {
            return Err(PersistError::ShortWrite { expected, written });
        }

        self.records += 1;
        self.bytes += expected as u64;
        metrics::counter!("depthlog_frames_persisted").increment(1);
        metrics::counter!("depthlog_bytes_written").increment(expected as u64);
        Ok(expected)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        debug!(
            "Closing {} after {} records ({} bytes)",
            self.path.display(),
            self.records,
            self.bytes
        );
    }
}

//! Background encode/persist loop

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::capture::Frame;
use crate::error::PersistError;
use crate::log::Persister;
use crate::pipeline::{Codec, FrameBuffer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub persisted: u64,
    pub codec_failures: u64,
    /// Frames persisted after cancellation
    pub drained: u64,
    pub bytes_written: u64,
}

/// Single consumer of the [`FrameBuffer`].
///
/// Polls the buffer, sleeping `poll_interval` when it is empty, until `stop`
/// fires. `stop` must only fire once the producer has returned, so nothing
/// can land in the buffer after the final drain. A codec failure drops that
/// one frame; a persistence failure stops the worker and cancels `on_failure`.
pub struct EncodeWorker {
    buffer: Arc<FrameBuffer>,
    codec: Codec,
    persister: Persister,
    poll_interval: Duration,
    drain_on_shutdown: bool,
    stop: CancellationToken,
    on_failure: CancellationToken,
    report: WorkerReport,
}

impl EncodeWorker {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        codec: Codec,
        persister: Persister,
        poll_interval: Duration,
        stop: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            codec,
            persister,
            poll_interval,
            drain_on_shutdown: true,
            on_failure: stop.clone(),
            stop,
            report: WorkerReport::default(),
        }
    }

    pub fn drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    /// Token cancelled when a write fails; defaults to the stop token.
    pub fn cancel_on_failure(mut self, token: CancellationToken) -> Self {
        self.on_failure = token;
        self
    }

    /// Run on a dedicated named thread, optionally pinned to `core`.
    pub fn spawn(
        self,
        core: Option<usize>,
    ) -> std::io::Result<JoinHandle<Result<WorkerReport, PersistError>>> {
        thread::Builder::new()
            .name("encode-worker".to_string())
            .spawn(move || {
                if let Some(core) = core {
                    pin_to_core(core);
                }
                self.run()
            })
    }

    pub fn run(mut self) -> Result<WorkerReport, PersistError> {
        info!(codec = self.codec.name(), "Encode worker started");

        match self.run_loop() {
            Ok(()) => {
                info!(
                    "Encode worker finished: {} persisted ({} drained), {} codec failures",
                    self.report.persisted, self.report.drained, self.report.codec_failures
                );
                Ok(self.report)
            }
            Err(e) => {
                error!("Encode worker stopping on persistence failure: {}", e);
                self.on_failure.cancel();
                Err(e)
            }
        }
    }

    fn run_loop(&mut self) -> Result<(), PersistError> {
        loop {
            if self.stop.is_cancelled() {
                if self.drain_on_shutdown {
                    self.drain()?;
                } else {
                    debug!("Abandoning {} buffered frames", self.buffer.len());
                }
                return Ok(());
            }

            match self.buffer.pop_latest() {
                Some(frame) => {
                    self.process(frame)?;
                }
                None => thread::sleep(self.poll_interval),
            }
        }
    }

    fn drain(&mut self) -> Result<(), PersistError> {
        let resident = self.buffer.len();
        if resident > 0 {
            info!("Draining {} buffered frames", resident);
        }
        while let Some(frame) = self.buffer.pop_latest() {
            if self.process(frame)? {
                self.report.drained += 1;
            }
        }
        Ok(())
    }

    /// Encode and persist one frame. Returns false if the codec dropped it.
    pub fn process(&mut self, frame: Frame) -> Result<bool, PersistError> {
        let ts = frame.sensor_timestamp();

        let encoded = match frame.encode(&self.codec) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.report.codec_failures += 1;
                metrics::counter!("depthlog_frames_codec_failed").increment(1);
                warn!("Dropping frame {}: {}", ts, e);
                return Ok(false);
            }
        };

        let written = self
            .persister
            .append(ts, encoded.meta.kind, &encoded.payload)?;

        self.report.persisted += 1;
        self.report.bytes_written += written as u64;
        trace!("Persisted frame {} ({} bytes)", ts, written);
        Ok(true)
    }
}

fn pin_to_core(core: usize) {
    let Some(ids) = core_affinity::get_core_ids() else {
        warn!("Cannot query CPU cores; encode worker left unpinned");
        return;
    };

    match ids.into_iter().find(|id| id.id == core) {
        Some(id) if core_affinity::set_for_current(id) => {
            debug!("Encode worker pinned to core {}", core)
        }
        _ => warn!("Failed to pin encode worker to core {}", core),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DepthGeometry, SyntheticSource};
    use crate::log::{LogEnd, LogReader};

    const GEOMETRY: DepthGeometry = DepthGeometry::new(8, 6);

    fn frame(ts: u32) -> Frame {
        Frame::from_driver(&SyntheticSource::pattern(GEOMETRY, ts), ts, 0)
    }

    fn worker(
        codec: Codec,
        path: &std::path::Path,
    ) -> (EncodeWorker, Arc<FrameBuffer>, CancellationToken) {
        let buffer = Arc::new(FrameBuffer::new(8));
        let cancel = CancellationToken::new();
        let worker = EncodeWorker::new(
            Arc::clone(&buffer),
            codec,
            Persister::open(path, true).unwrap(),
            Duration::from_millis(1),
            cancel.clone(),
        );
        (worker, buffer, cancel)
    }

    #[test]
    fn drains_on_cancel_in_stack_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.mpack");
        let (worker, buffer, cancel) = worker(Codec::Raw, &path);

        for ts in 1..=3 {
            buffer.push(frame(ts));
        }
        cancel.cancel();

        let report = worker.run().unwrap();
        assert_eq!(report.persisted, 3);
        assert_eq!(report.drained, 3);
        assert!(buffer.is_empty());

        let timestamps: Vec<_> = LogReader::open(&path)
            .unwrap()
            .map(|r| r.sensor_timestamp)
            .collect();
        assert_eq!(timestamps, vec![3, 2, 1]);
    }

    #[test]
    fn abandon_leaves_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, buffer, cancel) = worker(Codec::Raw, &dir.path().join("log.mpack"));
        buffer.push(frame(1));
        cancel.cancel();

        let report = worker.drain_on_shutdown(false).run().unwrap();
        assert_eq!(report.persisted, 0);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn codec_failure_drops_only_that_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.mpack");
        let (mut worker, _buffer, _cancel) = worker(Codec::Image(GEOMETRY), &path);

        assert!(!worker.process(Frame::from_driver(&[1, 2, 3], 1, 0)).unwrap());
        assert!(worker.process(frame(2)).unwrap());
        assert_eq!(worker.report.codec_failures, 1);
        assert_eq!(worker.report.persisted, 1);
        drop(worker);

        let mut reader = LogReader::open(&path).unwrap();
        let record = reader.next().unwrap();
        assert_eq!(record.sensor_timestamp, 2);
        assert_eq!(
            Codec::Image(GEOMETRY).decode(&record.payload).unwrap(),
            SyntheticSource::pattern(GEOMETRY, 2)
        );
        assert!(reader.next().is_none());
        assert_eq!(reader.end(), Some(&LogEnd::Clean));
    }

    #[test]
    fn write_failure_cancels_pipeline_token() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, buffer, stop) = worker(Codec::Raw, &dir.path().join("log.mpack"));
        let pipeline = CancellationToken::new();
        let mut worker = worker.cancel_on_failure(pipeline.clone());
        worker.persister = Persister::from_writer(FailingWriter, "failing".into());

        buffer.push(frame(1));
        assert!(worker.run().is_err());
        assert!(pipeline.is_cancelled());
        assert!(!stop.is_cancelled());
    }

    struct FailingWriter;

    impl std::io::Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn keeps_polling_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.mpack");
        let (worker, buffer, stop) = worker(Codec::Raw, &path);
        let handle = worker.spawn(None).unwrap();

        for ts in 0..5 {
            buffer.push(frame(ts));
            thread::sleep(Duration::from_millis(5));
        }
        // a late push right before stop is still persisted
        buffer.push(frame(5));
        stop.cancel();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.persisted, 6);
        assert!(buffer.is_empty());
    }

    #[test]
    fn spawned_worker_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, buffer, cancel) = worker(Codec::Raw, &dir.path().join("log.mpack"));

        let handle = worker.spawn(None).unwrap();
        buffer.push(frame(7));
        cancel.cancel();

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.persisted, 1);
    }
}

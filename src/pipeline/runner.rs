//! Capture session lifecycle: start, run, stop

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::capture::{run_capture, CaptureSummary, FrameProducer, FrameSource, Throttle};
use crate::error::{ConfigError, PipelineError};
use crate::log::Persister;
use crate::pipeline::{BufferStats, Codec, EncodeWorker, FrameBuffer, WorkerReport};
use crate::Config;

/// Totals for one capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub capture: CaptureSummary,
    pub worker: WorkerReport,
    pub buffer: BufferStats,
}

/// One sensor, one buffer, one encode worker, one log file.
pub struct Pipeline {
    config: Config,
    codec: Codec,
    buffer: Arc<FrameBuffer>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let codec = Codec::from_kind(config.encoder()?, config.geometry());
        let buffer = Arc::new(FrameBuffer::new(config.pipeline.buffer_capacity));

        Ok(Self {
            config,
            codec,
            buffer,
            cancel: CancellationToken::new(),
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Cancelling stops capture; the worker then drains or abandons the buffer.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open the log, start the worker, and capture from `source` until it is
    /// exhausted or the session is cancelled.
    #[instrument(skip_all, fields(codec = self.codec.name()))]
    pub async fn run<S: FrameSource + 'static>(
        self,
        mut source: S,
    ) -> Result<PipelineReport, PipelineError> {
        let geometry = self.config.geometry();
        if source.geometry() != geometry {
            let got = source.geometry();
            return Err(ConfigError::Invalid(format!(
                "source delivers {}x{}, configured for {}x{}",
                got.width, got.height, geometry.width, geometry.height
            ))
            .into());
        }

        let persister = Persister::open(&self.config.output.path, self.config.output.truncate)?;

        // Fired only after capture has returned, so the final drain sees every push
        let stop_worker = CancellationToken::new();
        let worker = EncodeWorker::new(
            Arc::clone(&self.buffer),
            self.codec,
            persister,
            Duration::from_millis(self.config.pipeline.poll_interval_ms),
            stop_worker.clone(),
        )
        .cancel_on_failure(self.cancel.clone())
        .drain_on_shutdown(self.config.pipeline.drain_on_shutdown)
        .spawn(self.config.pipeline.worker_core)
        .map_err(|e| PipelineError::Worker(format!("failed to spawn encode worker: {e}")))?;

        let mut producer = FrameProducer::new(
            Throttle::new(self.config.capture.target_fps),
            Arc::clone(&self.buffer),
            geometry,
        );
        info!(
            "Pipeline started: buffer {} frames, target {} fps",
            self.buffer.capacity(),
            self.config.capture.target_fps
        );

        let cancel = self.cancel.clone();
        let capture =
            tokio::task::spawn_blocking(move || run_capture(&mut source, &mut producer, &cancel))
                .await;

        // The producer can no longer push; let the worker finish up
        self.cancel.cancel();
        stop_worker.cancel();

        let worker = tokio::task::spawn_blocking(move || worker.join())
            .await
            .map_err(|e| PipelineError::Worker(format!("join task failed: {e}")))?
            .map_err(|_| PipelineError::Worker("encode worker panicked".into()))?;
        let capture =
            capture.map_err(|e| PipelineError::Worker(format!("capture task failed: {e}")))?;

        let report = match (worker, capture) {
            (Err(e), capture) => {
                if let Err(ce) = capture {
                    warn!("Capture also failed: {}", ce);
                }
                return Err(e.into());
            }
            (Ok(_), Err(e)) => return Err(e.into()),
            (Ok(worker), Ok(capture)) => PipelineReport {
                capture,
                worker,
                buffer: self.buffer.stats(),
            },
        };

        info!(
            "Pipeline stopped: {} persisted, {} evicted, {} throttled",
            report.worker.persisted, report.buffer.evicted, report.capture.throttled
        );
        Ok(report)
    }
}

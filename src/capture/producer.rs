//! Driver-context side of the pipeline: copy, throttle, buffer

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::capture::{DepthGeometry, Frame, FrameSource, SourceStatus, Throttle};
use crate::error::DeviceError;
use crate::pipeline::FrameBuffer;
use crate::utils;

/// What happened to one frame delivered by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Accepted, but the oldest resident frame was evicted to make room
    AcceptedWithEviction,
    Throttled,
    /// Payload size did not match the device geometry
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub delivered: u64,
    pub accepted: u64,
    pub throttled: u64,
    pub rejected: u64,
}

/// Frame-arrival callback body. Lives in the driver's context only.
pub struct FrameProducer {
    throttle: Throttle,
    buffer: Arc<FrameBuffer>,
    geometry: DepthGeometry,
    summary: CaptureSummary,
}

impl FrameProducer {
    pub fn new(throttle: Throttle, buffer: Arc<FrameBuffer>, geometry: DepthGeometry) -> Self {
        Self {
            throttle,
            buffer,
            geometry,
            summary: CaptureSummary::default(),
        }
    }

    pub fn on_depth(&mut self, raw: &[u8], device_timestamp: u32) -> Admission {
        self.on_depth_at(raw, device_timestamp, utils::wall_clock_ms())
    }

    pub fn on_depth_at(&mut self, raw: &[u8], device_timestamp: u32, now_ms: u64) -> Admission {
        self.summary.delivered += 1;

        if raw.len() != self.geometry.frame_len() {
            self.summary.rejected += 1;
            warn!(
                "Rejecting depth frame {}: {} bytes, expected {}",
                device_timestamp,
                raw.len(),
                self.geometry.frame_len()
            );
            return Admission::Rejected;
        }

        if !self.throttle.accept(now_ms) {
            self.summary.throttled += 1;
            metrics::counter!("depthlog_frames_throttled").increment(1);
            return Admission::Throttled;
        }

        self.summary.accepted += 1;
        metrics::counter!("depthlog_frames_accepted").increment(1);
        trace!("Adding depth frame {}", device_timestamp);

        let frame = Frame::from_driver(raw, device_timestamp, now_ms);
        if self.buffer.push(frame) {
            Admission::AcceptedWithEviction
        } else {
            Admission::Accepted
        }
    }

    pub fn summary(&self) -> CaptureSummary {
        self.summary
    }
}

/// Drive `source` until it is exhausted, fails, or `cancel` fires.
///
/// The source is always stopped before returning.
#[instrument(skip_all)]
pub fn run_capture<S: FrameSource>(
    source: &mut S,
    producer: &mut FrameProducer,
    cancel: &CancellationToken,
) -> Result<CaptureSummary, DeviceError> {
    source.start()?;
    info!("Capture started");

    let result = loop {
        if cancel.is_cancelled() {
            debug!("Capture cancelled");
            break Ok(());
        }

        match source.process_events(&mut |raw, ts| {
            producer.on_depth(raw, ts);
        }) {
            Ok(SourceStatus::Active) => {}
            Ok(SourceStatus::Exhausted) => {
                debug!("Frame source exhausted");
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = source.stop() {
        warn!("Failed to stop frame source: {}", e);
    }

    let summary = producer.summary();
    info!(
        "Capture stopped: {} delivered, {} accepted, {} throttled, {} rejected",
        summary.delivered, summary.accepted, summary.throttled, summary.rejected
    );
    result.map(|()| summary)
}

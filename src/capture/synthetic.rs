//! Synthetic depth source for running the pipeline without hardware

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::capture::{DepthGeometry, FrameSource, SourceStatus};
use crate::error::DeviceError;

const DEPTH_MASK: u16 = 0x07ff;

/// Emits a deterministic 11-bit gradient, one frame per `process_events` call.
pub struct SyntheticSource {
    geometry: DepthGeometry,
    interval: Duration,
    frame_limit: Option<u64>,
    emitted: u64,
    timestamp: u32,
    streaming: bool,
    scratch: Vec<u8>,
}

impl SyntheticSource {
    pub fn new(geometry: DepthGeometry, interval: Duration, frame_limit: Option<u64>) -> Self {
        Self {
            geometry,
            interval,
            frame_limit,
            emitted: 0,
            timestamp: 0,
            streaming: false,
            scratch: vec![0; geometry.frame_len()],
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Frame content for `timestamp`, native-endian samples like the driver delivers.
    pub fn pattern(geometry: DepthGeometry, timestamp: u32) -> Vec<u8> {
        let mut buf = vec![0; geometry.frame_len()];
        Self::fill(geometry, timestamp, &mut buf);
        buf
    }

    fn fill(geometry: DepthGeometry, timestamp: u32, buf: &mut [u8]) {
        let width = geometry.width as usize;
        let shift = timestamp.wrapping_mul(7) as usize;
        for (i, sample) in buf
            .chunks_exact_mut(DepthGeometry::BYTES_PER_SAMPLE)
            .enumerate()
        {
            let (x, y) = (i % width, i / width);
            let depth = ((x + 3 * y + shift) & DEPTH_MASK as usize) as u16;
            sample.copy_from_slice(&depth.to_ne_bytes());
        }
    }
}

impl FrameSource for SyntheticSource {
    fn geometry(&self) -> DepthGeometry {
        self.geometry
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        info!(
            "Synthetic depth source {}x{} every {:?}",
            self.geometry.width, self.geometry.height, self.interval
        );
        self.streaming = true;
        Ok(())
    }

    fn process_events(
        &mut self,
        on_depth: &mut dyn FnMut(&[u8], u32),
    ) -> Result<SourceStatus, DeviceError> {
        if !self.streaming || self.frame_limit.is_some_and(|limit| self.emitted >= limit) {
            return Ok(SourceStatus::Exhausted);
        }

        if !self.interval.is_zero() {
            thread::sleep(self.interval);
        }

        Self::fill(self.geometry, self.timestamp, &mut self.scratch);
        on_depth(&self.scratch, self.timestamp);

        self.emitted += 1;
        self.timestamp = self.timestamp.wrapping_add(1);
        Ok(SourceStatus::Active)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        debug!("Synthetic source stopped after {} frames", self.emitted);
        self.streaming = false;
        Ok(())
    }
}

//! Boundary to the depth driver

use crate::capture::DepthGeometry;
use crate::error::DeviceError;

/// Outcome of one round of driver event processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Active,
    /// The source will deliver no more frames
    Exhausted,
}

/// Callback-style depth frame source.
///
/// `process_events` blocks for at most one batch of driver events and calls
/// `on_depth(raw, device_timestamp)` once per captured frame. `raw` is only
/// valid for the duration of that call.
pub trait FrameSource: Send {
    fn geometry(&self) -> DepthGeometry;

    fn start(&mut self) -> Result<(), DeviceError>;

    fn process_events(
        &mut self,
        on_depth: &mut dyn FnMut(&[u8], u32),
    ) -> Result<SourceStatus, DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn geometry(&self) -> DepthGeometry {
        (**self).geometry()
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        (**self).start()
    }

    fn process_events(
        &mut self,
        on_depth: &mut dyn FnMut(&[u8], u32),
    ) -> Result<SourceStatus, DeviceError> {
        (**self).process_events(on_depth)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }
}

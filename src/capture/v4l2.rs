//! V4L2 depth capture over memory-mapped buffers

use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::{DepthGeometry, FrameSource, SourceStatus};
use crate::error::DeviceError;
use crate::utils::FoundDevice;

/// 16-bit greyscale, the format depth nodes expose their samples in
pub const DEPTH_FOURCC: [u8; 4] = *b"Y16 ";

const BUFFER_COUNT: u32 = 4;

/// Depth stream from a V4L2 node
pub struct V4l2DepthSource {
    device: Box<Device>,
    path: String,
    stream: Option<MmapStream<'static>>,
    geometry: DepthGeometry,
    rejected: u64,
}

impl V4l2DepthSource {
    /// Open the node and negotiate 16-bit depth at `geometry`.
    pub fn open(found: &FoundDevice, geometry: DepthGeometry) -> Result<Self, DeviceError> {
        info!("Initializing V4L2 depth capture: {}", found.path);

        let device = Device::with_path(&found.path).map_err(|source| DeviceError::Open {
            path: found.path.clone(),
            source,
        })?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(DeviceError::Unsupported {
                path: found.path.clone(),
                what: "video capture".into(),
            });
        }

        let mut fmt = device.format()?;
        fmt.width = geometry.width;
        fmt.height = geometry.height;
        fmt.fourcc = FourCC::new(&DEPTH_FOURCC);

        let applied = device.set_format(&fmt)?;
        if applied.fourcc != fmt.fourcc
            || applied.width != geometry.width
            || applied.height != geometry.height
        {
            return Err(DeviceError::Unsupported {
                path: found.path.clone(),
                what: format!(
                    "{}x{} Y16 depth (driver offered {}x{} {})",
                    geometry.width, geometry.height, applied.width, applied.height, applied.fourcc
                ),
            });
        }

        Ok(Self {
            device: Box::new(device),
            path: found.path.clone(),
            stream: None,
            geometry,
            rejected: 0,
        })
    }
}

impl FrameSource for V4l2DepthSource {
    fn geometry(&self) -> DepthGeometry {
        self.geometry
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn start(&mut self) -> Result<(), DeviceError> {
        let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)?;

        self.stream = Some(stream);
        info!("Depth stream started with {} buffers", BUFFER_COUNT);
        Ok(())
    }

    fn process_events(
        &mut self,
        on_depth: &mut dyn FnMut(&[u8], u32),
    ) -> Result<SourceStatus, DeviceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(SourceStatus::Exhausted);
        };

        // Blocks until the driver dequeues the next filled buffer
        let (buf, meta) = stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        let expected = self.geometry.frame_len();

        if used < expected {
            self.rejected += 1;
            warn!(
                "Dropping short depth buffer: {} of {} bytes (seq {})",
                used, expected, meta.sequence
            );
            return Ok(SourceStatus::Active);
        }

        on_depth(&buf[..expected], meta.sequence);
        Ok(SourceStatus::Active)
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop()?;
        }
        debug!("Depth stream stopped, {} short buffers rejected", self.rejected);
        Ok(())
    }
}

impl Drop for V4l2DepthSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

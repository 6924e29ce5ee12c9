use bytes::Bytes;

use crate::error::CodecError;
use crate::pipeline::Codec;

/// Payload type tag, written as the first field of every log record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Depth = 1,
}

impl FrameKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Depth),
            _ => None,
        }
    }
}

/// Depth image dimensions; fixed for the lifetime of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthGeometry {
    pub width: u32,
    pub height: u32,
}

impl DepthGeometry {
    /// 11 significant bits packed into 16
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn samples(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub const fn frame_len(&self) -> usize {
        self.samples() * Self::BYTES_PER_SAMPLE
    }
}

impl Default for DepthGeometry {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// Frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub kind: FrameKind,
    /// Device counter; wraps per driver semantics, not wall-clock
    pub sensor_timestamp: u32,
    /// Wall-clock milliseconds at which the throttle accepted the frame
    pub capture_time_ms: u64,
}

/// One captured depth sample, owned by exactly one pipeline stage at a time.
///
/// A `Frame` carries only the raw payload. Encoding consumes it and yields an
/// [`EncodedFrame`], so a frame cannot be encoded twice.
#[derive(Debug)]
pub struct Frame {
    data: Bytes,
    pub meta: FrameMetadata,
}

impl Frame {
    /// Copy a driver-owned buffer that is only valid for the duration of the callback.
    pub fn from_driver(raw: &[u8], sensor_timestamp: u32, capture_time_ms: u64) -> Self {
        Self {
            data: Bytes::copy_from_slice(raw),
            meta: FrameMetadata {
                kind: FrameKind::Depth,
                sensor_timestamp,
                capture_time_ms,
            },
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    pub fn sensor_timestamp(&self) -> u32 {
        self.meta.sensor_timestamp
    }

    /// Hand the raw payload to `codec`, consuming the frame.
    pub fn encode(self, codec: &Codec) -> Result<EncodedFrame, CodecError> {
        let payload = codec.encode(self.data)?;
        Ok(EncodedFrame {
            meta: self.meta,
            payload,
        })
    }
}

/// A frame whose payload has been through the codec and is ready to persist
#[derive(Debug)]
pub struct EncodedFrame {
    pub meta: FrameMetadata,
    pub payload: Bytes,
}

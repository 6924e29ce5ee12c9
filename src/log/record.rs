use serde::{Deserialize, Serialize};

use crate::capture::FrameKind;

/// Borrowed record, as written
#[derive(Debug, Serialize)]
pub struct RecordRef<'a> {
    pub kind: u8,
    pub sensor_timestamp: u32,
    #[serde(with = "serde_bytes")]
    pub payload: &'a [u8],
}

/// Owned record, as read back
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogRecord {
    pub kind: u8,
    pub sensor_timestamp: u32,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl LogRecord {
    pub fn frame_kind(&self) -> Option<FrameKind> {
        FrameKind::from_tag(self.kind)
    }
}

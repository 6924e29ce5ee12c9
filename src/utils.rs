use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::capture::v4l2::DEPTH_FOURCC;
use crate::error::DeviceError;

// Detected depth device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
}

impl FoundDevice {
    pub fn new(path: String, card: String) -> Self {
        Self { path, card }
    }
}

/// Enumerate capture nodes that offer 16-bit greyscale depth, in node order
pub fn enumerate_depth_devices() -> Vec<FoundDevice> {
    info!("Enumerating depth devices...");

    let mut found = Vec::new();
    for i in 0..64 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            if formats
                .iter()
                .any(|fmt| fmt.fourcc == FourCC::new(&DEPTH_FOURCC))
            {
                info!("Found depth device: {} - {}", path, caps.card);
                found.push(FoundDevice::new(path, caps.card));
            } else {
                debug!("Skipping {}: no Y16 format", path);
            }
        }
    }

    info!("Number of depth devices found: {}", found.len());
    found
}

/// Pick the `ordinal`-th enumerated depth device
pub fn select_device(ordinal: u32) -> Result<FoundDevice, DeviceError> {
    pick(enumerate_depth_devices(), ordinal)
}

fn pick(mut devices: Vec<FoundDevice>, ordinal: u32) -> Result<FoundDevice, DeviceError> {
    if devices.is_empty() {
        return Err(DeviceError::NoDevices);
    }
    let found = devices.len();
    if ordinal as usize >= found {
        return Err(DeviceError::OrdinalOutOfRange { ordinal, found });
    }
    Ok(devices.swap_remove(ordinal as usize))
}

/// Wall-clock milliseconds since the Unix epoch
pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

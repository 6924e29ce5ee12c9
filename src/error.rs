//! Error taxonomy for each pipeline stage

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to find, open or stream from the depth device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no depth-capable capture devices found")]
    NoDevices,

    #[error("device ordinal {ordinal} out of range ({found} device(s) found)")]
    OrdinalOutOfRange { ordinal: u32, found: usize },

    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} does not support {what}")]
    Unsupported { path: String, what: String },

    #[error("device stream error: {0}")]
    Stream(#[from] io::Error),
}

/// Failure to encode a single frame payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("raw payload is {actual} bytes, expected {expected}")]
    InvalidInput { expected: usize, actual: usize },

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("decoded image is {width}x{height}, expected {expected_width}x{expected_height}")]
    Dimensions {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// Failure to append a record to the log file.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("log write failed: {0}")]
    Write(#[from] io::Error),

    #[error("short write to log: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },
}

/// Failure to load or validate configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("no encoder selected (expected `raw` or `image`)")]
    MissingEncoder,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level pipeline failure, naming the stage that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("device: {0}")]
    Device(#[from] DeviceError),

    #[error("persist: {0}")]
    Persist(#[from] PersistError),

    #[error("worker: {0}")]
    Worker(String),
}

pub mod capture;
pub mod error;
pub mod log;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use capture::{DepthGeometry, Frame, FrameKind};
pub use error::{CodecError, ConfigError, DeviceError, PersistError, PipelineError};
pub use pipeline::{Codec, Pipeline, PipelineReport};

/// Prefix for environment overrides, e.g. `DEPTHLOG_CAPTURE__TARGET_FPS=15`
pub const ENV_PREFIX: &str = "DEPTHLOG";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Index into the list of enumerated depth devices
    pub device: u32,
    pub width: u32,
    pub height: u32,
    /// Accepted frames per second; 0 accepts every frame
    pub target_fps: u32,
    pub source: SourceKind,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    V4l2,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub interval_ms: u64,
    pub frame_limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Store the sensor payload untouched
    Raw,
    /// Lossless 16-bit greyscale PNG
    #[value(alias = "png")]
    #[serde(alias = "png")]
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub buffer_capacity: usize,
    pub poll_interval_ms: u64,
    /// No default; must come from a file, the environment or the command line
    pub encoder: Option<EncoderKind>,
    pub drain_on_shutdown: bool,
    pub worker_core: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub truncate: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: 0,
            width: 640,
            height: 480,
            target_fps: 0,
            source: SourceKind::V4l2,
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            interval_ms: 33, // ~30fps, the sensor's native rate
            frame_limit: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 60,
            poll_interval_ms: 5,
            encoder: None,
            drain_on_shutdown: true,
            worker_core: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sleepdata.mpack"),
            truncate: true,
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `DEPTHLOG_*` environment variables.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Config>()?;

        Ok(config)
    }

    pub fn geometry(&self) -> DepthGeometry {
        DepthGeometry::new(self.capture.width, self.capture.height)
    }

    pub fn encoder(&self) -> Result<EncoderKind, ConfigError> {
        self.pipeline.encoder.ok_or(ConfigError::MissingEncoder)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.encoder()?;

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture geometry {}x{} must be non-zero",
                self.capture.width, self.capture.height
            )));
        }
        if self.pipeline.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.buffer_capacity must be at least 1".into(),
            ));
        }
        if self.pipeline.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.poll_interval_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_sensor() {
        let config = Config::default();
        assert_eq!(config.capture.device, 0);
        assert_eq!(config.geometry().frame_len(), 640 * 480 * 2);
        assert_eq!(config.capture.target_fps, 0);
        assert_eq!(config.pipeline.buffer_capacity, 60);
        assert_eq!(config.output.path, PathBuf::from("sleepdata.mpack"));
    }

    #[test]
    fn encoder_is_required() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingEncoder)));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = Config::default();
        config.pipeline.encoder = Some(EncoderKind::Raw);
        config.pipeline.buffer_capacity = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[capture]
target_fps = 15

[pipeline]
encoder = "png"
buffer_capacity = 10
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.capture.target_fps, 15);
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.pipeline.encoder, Some(EncoderKind::Image));
        assert_eq!(config.pipeline.buffer_capacity, 10);
        assert!(config.validate().is_ok());
    }
}

//! Payload codecs selected at startup

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use crate::capture::DepthGeometry;
use crate::error::CodecError;
use crate::EncoderKind;

/// Transform from raw sensor bytes to stored bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Passthrough
    Raw,
    /// Lossless 16-bit greyscale PNG of the given geometry
    Image(DepthGeometry),
}

impl Codec {
    pub fn from_kind(kind: EncoderKind, geometry: DepthGeometry) -> Self {
        match kind {
            EncoderKind::Raw => Codec::Raw,
            EncoderKind::Image => Codec::Image(geometry),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Raw => "raw",
            Codec::Image(_) => "image",
        }
    }

    pub fn encode(&self, raw: Bytes) -> Result<Bytes, CodecError> {
        match self {
            Codec::Raw => Ok(raw),
            Codec::Image(geometry) => encode_png(&raw, *geometry).map(Bytes::from),
        }
    }

    /// Inverse of [`Codec::encode`], yielding native-endian samples for `Image`.
    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Raw => Ok(payload.to_vec()),
            Codec::Image(geometry) => decode_png(payload, *geometry),
        }
    }
}

fn encode_png(raw: &[u8], geometry: DepthGeometry) -> Result<Vec<u8>, CodecError> {
    let expected = geometry.frame_len();
    if raw.len() != expected {
        return Err(CodecError::InvalidInput {
            expected,
            actual: raw.len(),
        });
    }

    // Encoder state lives only for this call
    let mut out = Vec::with_capacity(expected / 2);
    PngEncoder::new(&mut out).write_image(
        raw,
        geometry.width,
        geometry.height,
        ExtendedColorType::L16,
    )?;
    Ok(out)
}

fn decode_png(payload: &[u8], geometry: DepthGeometry) -> Result<Vec<u8>, CodecError> {
    let img = image::load_from_memory_with_format(payload, ImageFormat::Png)?;
    if img.width() != geometry.width || img.height() != geometry.height {
        return Err(CodecError::Dimensions {
            width: img.width(),
            height: img.height(),
            expected_width: geometry.width,
            expected_height: geometry.height,
        });
    }

    let samples = img.into_luma16().into_raw();
    Ok(samples.iter().flat_map(|s| s.to_ne_bytes()).collect())
}

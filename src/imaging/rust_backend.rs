//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify (JPEG, PNG, GIF, TIFF, WebP) | `image::ImageReader::into_decoder` (header only) |
//! | Identify (AVIF) | `avif-parse` container metadata |
//! | Decode | `image::load_from_memory`; AVIF via `avif-parse` + `rav1d` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder` (lossless; quality applied by posterizing first) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |

use super::avif;
use super::backend::{BackendError, ImageBackend, ImageMetadata};
use super::params::ResizeParams;
use crate::variants::OutputFormat;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::io::Cursor;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest).
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Avif => "avif",
        other => return format!("{other:?}").to_lowercase(),
    }
    .to_string()
}

/// Drop exotic pixel layouts (16-bit, float, luma) to the 8-bit RGB(A) every
/// encoder accepts.
fn to_rgb_family(img: &DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    }
}

/// Posterize the colour channels of interleaved 8-bit samples so the
/// lossless WebP encoder sees fewer distinct values at lower quality.
/// Alpha is left untouched.
fn posterize(samples: &mut [u8], channels: usize, quality: u8) {
    if quality >= 100 {
        return;
    }
    let q = f32::from(quality.max(1)) / 100.0;
    let levels = (2.0 + q * q * 254.0).round().clamp(2.0, 256.0);
    let step = 255.0 / (levels - 1.0);
    for pixel in samples.chunks_exact_mut(channels) {
        for channel in pixel.iter_mut().take(3) {
            let bucket = (f32::from(*channel) / step).round();
            *channel = (bucket * step).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Encode `img` as `format` into a fresh buffer.
fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let result = match format {
        // JPEG has no alpha channel
        OutputFormat::Jpeg => img
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality)),
        OutputFormat::Webp => {
            let mut img = to_rgb_family(img);
            match &mut img {
                DynamicImage::ImageRgba8(buf) => posterize(buf, 4, quality),
                DynamicImage::ImageRgb8(buf) => posterize(buf, 3, quality),
                _ => {}
            }
            img.write_with_encoder(WebPEncoder::new_lossless(&mut out))
        }
        OutputFormat::Avif => to_rgb_family(img).write_with_encoder(
            AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, quality),
        ),
    };
    result.map_err(|e| BackendError::Encode(format!("{format} encode failed: {e}")))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, bytes: &[u8]) -> Result<ImageMetadata, BackendError> {
        let size = bytes.len() as u64;
        if avif::is_avif(bytes) {
            let (width, height, has_alpha) = avif::identify(bytes)?;
            return Ok(ImageMetadata {
                width,
                height,
                format: "avif".to_string(),
                size,
                has_alpha,
            });
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| BackendError::Decode("unrecognized image format".into()))?;
        let decoder = reader.into_decoder().map_err(|e| {
            BackendError::Decode(format!("unreadable {} header: {e}", format_name(format)))
        })?;
        let (width, height) = decoder.dimensions();

        Ok(ImageMetadata {
            width,
            height,
            format: format_name(format),
            size,
            has_alpha: decoder.color_type().has_alpha(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError> {
        if avif::is_avif(bytes) {
            return avif::decode(bytes);
        }
        image::load_from_memory(bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn downscale(&self, image: DynamicImage, width: u32, height: u32) -> DynamicImage {
        // Bounding pass only; variants get their own Lanczos3 resize afterwards
        image.resize_exact(width, height, FilterType::Triangle)
    }

    fn resize(
        &self,
        source: &DynamicImage,
        params: &ResizeParams,
    ) -> Result<Vec<u8>, BackendError> {
        let resized = if (source.width(), source.height()) == (params.width, params.height) {
            Cow::Borrowed(source)
        } else {
            Cow::Owned(source.resize_exact(params.width, params.height, FilterType::Lanczos3))
        };
        encode(&resized, params.format, params.quality.value())
    }
}

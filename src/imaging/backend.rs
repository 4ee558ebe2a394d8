//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: identify, decode, downscale, and resize (resize + encode).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate and statically linked into the binary.

use super::params::ResizeParams;
use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// Bytes are not a valid or supported image.
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Header-level description of a source image.
///
/// `width`/`height` are the true dimensions of the upload, even when the
/// engine later works on a downscaled copy. They are 0 only when the decoder
/// cannot report them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    /// Decoder-reported source format, e.g. `"jpeg"`, `"png"`, `"avif"`.
    pub format: String,
    /// Byte length of the original upload.
    pub size: u64,
    pub has_alpha: bool,
}

/// Trait for image processing backends.
///
/// `Sync` so encodes can fan out over rayon's pool.
pub trait ImageBackend: Sync {
    /// Read dimensions, format and alpha from the image header.
    fn identify(&self, bytes: &[u8]) -> Result<ImageMetadata, BackendError>;

    /// Fully decode the image into memory.
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, BackendError>;

    /// Shrink an in-memory image to exactly `width` × `height`.
    fn downscale(&self, image: DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Resize `source` to the requested dimensions and encode it.
    fn resize(&self, source: &DynamicImage, params: &ResizeParams)
    -> Result<Vec<u8>, BackendError>;
}

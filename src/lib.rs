//! # Image Variants
//!
//! Turns an uploaded raster image into a fixed family of resized,
//! re-encoded derivatives ("variants") plus metadata, and derives the storage
//! keys and URLs those variants live under.
//!
//! # Architecture
//!
//! ```text
//! variants   static schema: thumbnail < medium < large, output formats
//!    ↑
//! keys       pure key/URL derivation and upload admission checks
//!    ↑
//! process    ImageProcessor: bytes + key → metadata + VariantResult[]
//!    │
//! imaging    ImageBackend trait, RustBackend, dimension math
//! ```
//!
//! Uploading is not part of this crate. The caller PUTs each
//! [`VariantResult`](imaging::VariantResult) buffer at its `key` with the
//! format's content-type, and renderers use [`keys::all_variant_urls`] to
//! find a variant without calling the engine again, falling back to the
//! original when the variant does not exist.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`variants`] | Variant definitions, output formats, global limits |
//! | [`keys`] | MIME/extension checks, variant keys, variant URLs, size validation |
//! | [`config`] | `variants.toml` + environment loading, storage settings |
//! | [`imaging`] | Pure-Rust identify, decode, resize and encode |
//! | [`process`] | The transcoding engine |
//!
//! # Design Decisions
//!
//! ## Skip Only When the Source Fits Inside
//!
//! A variant is generated when the original is larger than its box on *either*
//! axis, and skipped only when it fits on both. An image smaller than the
//! thumbnail box in both directions produces no variants at all; renderers
//! fall back to the original.
//!
//! ## Storage Configuration Fails Early
//!
//! [`ImageProcessor`](process::ImageProcessor) takes a validated
//! [`StorageConfig`](config::StorageConfig) at construction. A missing region
//! or bucket is reported once when the engine is built, never per upload.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding use the `image` crate, with `avif-parse` + `rav1d`
//! for AVIF input. No system libraries are required.

pub mod config;
pub mod imaging;
pub mod keys;
pub mod process;
pub mod variants;

pub use config::{ConfigError, PipelineConfig, StorageConfig};
pub use imaging::{ImageMetadata, VariantResult};
pub use keys::{
    ValidationError, VariantUrls, all_variant_urls, derive_variant_url, file_extension,
    is_processable_extension, is_processable_image, validate_image_size, variant_key,
};
pub use process::{ErrorKind, ImageProcessor, ProcessError, ProcessOptions, ProcessedImage};
pub use variants::{DEFAULT_FORMAT, OutputFormat, VARIANTS, VariantName, VariantSpec};

#[cfg(test)]
pub(crate) mod test_helpers;

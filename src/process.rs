//! Variant derivation: the transcoding engine.
//!
//! Takes the raw bytes of an upload and the storage key the caller chose for
//! it, and returns the source metadata plus every variant that applies.
//!
//! ## Steps
//!
//! ```text
//! 1. admit         reject input over the configured byte limit
//! 2. identify      header only → ImageMetadata (true dimensions)
//! 3. plan          skip variants the source fits inside, cross the rest with formats
//! 4. decode        only when at least one encode is planned
//! 5. bound         originals over the dimension limit are downscaled in memory
//! 6. encode        variant × format, fit-inside, in parallel on the encoder pool
//! ```
//!
//! Nothing is uploaded here. Each [`VariantResult`] carries the key, URL and
//! buffer the caller PUTs to object storage with the format's content-type.
//!
//! ## Parallel Processing
//!
//! Encodes within one call run on a dedicated [rayon](https://docs.rs/rayon)
//! pool sized by [`effective_threads`]. Separate calls share no state and can
//! run concurrently from any number of threads.

use crate::config::{
    ConfigError, LimitsConfig, PipelineConfig, StorageConfig, effective_threads,
};
use crate::imaging::{
    BackendError, ImageBackend, ImageMetadata, RustBackend, VariantResult, create_variants,
    exceeds_dimension, fit_inside, plan_variants,
};
use crate::keys::{self, ValidationError};
use crate::variants::{DEFAULT_FORMAT, OutputFormat, VariantName};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Image processing failed: {0}")]
    Imaging(#[from] BackendError),
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of a [`ProcessError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bytes are not a valid or supported image.
    Decode,
    Encode,
    Validation,
    Configuration,
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Imaging(BackendError::Decode(_)) => ErrorKind::Decode,
            Self::Imaging(BackendError::Encode(_)) => ErrorKind::Encode,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }
}

/// Which variants and formats a call should produce.
///
/// Defaults to every variant in [`DEFAULT_FORMAT`]. The variants actually
/// produced are the requested ones the source is large enough for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    pub variants: BTreeSet<VariantName>,
    pub formats: BTreeSet<OutputFormat>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            variants: VariantName::ALL.into_iter().collect(),
            formats: BTreeSet::from([DEFAULT_FORMAT]),
        }
    }
}

impl ProcessOptions {
    pub fn with_variants(mut self, variants: impl IntoIterator<Item = VariantName>) -> Self {
        self.variants = variants.into_iter().collect();
        self
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = OutputFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    /// Build options from caller-supplied names. `None` keeps the default for
    /// that field.
    pub fn from_names(
        variants: Option<&[&str]>,
        formats: Option<&[&str]>,
    ) -> Result<Self, ValidationError> {
        let mut options = Self::default();
        if let Some(names) = variants {
            options.variants = names
                .iter()
                .map(|n| {
                    n.parse::<VariantName>()
                        .map_err(|e| ValidationError::UnknownVariant(e.0))
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(names) = formats {
            options.formats = names
                .iter()
                .map(|n| {
                    n.parse::<OutputFormat>()
                        .map_err(|e| ValidationError::UnknownFormat(e.0))
                })
                .collect::<Result<_, _>>()?;
        }
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.formats.is_empty() {
            return Err(ValidationError::NoFormats);
        }
        Ok(())
    }
}

/// Output of one [`ImageProcessor::process_image`] call.
///
/// `variants` holds only what was produced, ordered by variant size and then
/// format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub metadata: ImageMetadata,
    pub variants: Vec<VariantResult>,
}

impl ProcessedImage {
    pub fn variant(&self, name: VariantName, format: OutputFormat) -> Option<&VariantResult> {
        self.variants
            .iter()
            .find(|v| v.variant == name && v.format == format)
    }

    /// Serializable summary without the encoded buffers.
    pub fn manifest(&self) -> Manifest<'_> {
        Manifest {
            metadata: &self.metadata,
            variants: self
                .variants
                .iter()
                .map(|v| ManifestEntry {
                    variant: v.variant,
                    format: v.format,
                    key: &v.key,
                    url: &v.url,
                    width: v.width,
                    height: v.height,
                    size: v.size,
                    content_type: v.content_type(),
                })
                .collect(),
        }
    }

    pub fn manifest_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.manifest())
    }
}

#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    pub metadata: &'a ImageMetadata,
    pub variants: Vec<ManifestEntry<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry<'a> {
    pub variant: VariantName,
    pub format: OutputFormat,
    pub key: &'a str,
    pub url: &'a str,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub content_type: &'static str,
}

/// The transcoding engine. Holds only read-only configuration and the
/// encoder pool; safe to share across threads.
pub struct ImageProcessor<B = RustBackend> {
    backend: B,
    storage: StorageConfig,
    limits: LimitsConfig,
    pool: rayon::ThreadPool,
}

impl ImageProcessor<RustBackend> {
    /// Engine with default limits and an encoder pool of all cores.
    pub fn new(storage: StorageConfig) -> Result<Self, ConfigError> {
        Self::with_backend(RustBackend::new(), storage, &PipelineConfig::default())
    }

    /// Engine from a loaded config. Fails if storage is not configured.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Self::with_backend(RustBackend::new(), config.storage()?, config)
    }
}

impl<B: ImageBackend> ImageProcessor<B> {
    pub fn with_backend(
        backend: B,
        storage: StorageConfig,
        config: &PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(effective_threads(&config.processing))
            .thread_name(|i| format!("variant-encoder-{i}"))
            .build()?;
        Ok(Self {
            backend,
            storage,
            limits: config.limits.clone(),
            pool,
        })
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Upload admission check against this engine's configured byte limit.
    pub fn validate_upload(
        &self,
        mime_type: &str,
        filename: &str,
        byte_len: u64,
    ) -> Result<(), ValidationError> {
        keys::validate_upload(mime_type, filename, byte_len, self.limits.max_upload_bytes)
    }

    /// Header-only inspection of `bytes`.
    pub fn extract_image_metadata(&self, bytes: &[u8]) -> Result<ImageMetadata, ProcessError> {
        Ok(self.backend.identify(bytes)?)
    }

    /// Derive every applicable variant of the image in `bytes`, stored under
    /// `key`.
    pub fn process_image(
        &self,
        bytes: &[u8],
        key: &str,
        options: &ProcessOptions,
    ) -> Result<ProcessedImage, ProcessError> {
        options.validate()?;
        let size = bytes.len() as u64;
        let limit = self.limits.max_upload_bytes;
        if !keys::validate_image_size(size, limit) {
            return Err(ValidationError::TooLarge { size, limit }.into());
        }
        let metadata = self.backend.identify(bytes)?;
        let original = (metadata.width, metadata.height);

        let mut plans = plan_variants(original, &options.variants, &options.formats);
        if plans.is_empty() {
            tracing::info!(
                key,
                width = metadata.width,
                height = metadata.height,
                "no variants needed"
            );
            return Ok(ProcessedImage {
                metadata,
                variants: Vec::new(),
            });
        }

        let mut source = self.backend.decode(bytes)?;
        let decoded = (source.width(), source.height());
        let max = self.limits.max_original_dimension;
        if exceeds_dimension(decoded, max) {
            let (width, height) = fit_inside(decoded, (max, max));
            tracing::warn!(
                key,
                original_width = decoded.0,
                original_height = decoded.1,
                width,
                height,
                "downscaling oversized original"
            );
            source = self.backend.downscale(source, width, height);
        }

        let working = (source.width(), source.height());
        if working != original {
            for plan in &mut plans {
                let spec = plan.variant.spec();
                (plan.width, plan.height) = fit_inside(working, (spec.max_width, spec.max_height));
            }
        }

        let variants = self
            .pool
            .install(|| create_variants(&self.backend, &source, key, &self.storage, &plans))?;

        tracing::info!(
            key,
            width = metadata.width,
            height = metadata.height,
            format = %metadata.format,
            variants = variants.len(),
            "processed image"
        );
        Ok(ProcessedImage { metadata, variants })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};

    fn processor(width: u32, height: u32) -> ImageProcessor<MockBackend> {
        ImageProcessor::with_backend(
            MockBackend::with_dimensions(width, height),
            StorageConfig::new("eu-west-1", "uploads").unwrap(),
            &PipelineConfig::default(),
        )
        .unwrap()
    }

    fn produced(result: &ProcessedImage) -> Vec<(VariantName, OutputFormat)> {
        result
            .variants
            .iter()
            .map(|v| (v.variant, v.format))
            .collect()
    }

    // =========================================================================
    // Options
    // =========================================================================

    #[test]
    fn default_options_all_variants_default_format() {
        let options = ProcessOptions::default();
        assert_eq!(options.variants.len(), 3);
        assert_eq!(options.formats, BTreeSet::from([OutputFormat::Webp]));
    }

    #[test]
    fn options_from_names() {
        let options =
            ProcessOptions::from_names(Some(&["medium", "thumbnail"]), Some(&["webp", "jpeg"]))
                .unwrap();
        assert_eq!(
            options.variants,
            BTreeSet::from([VariantName::Thumbnail, VariantName::Medium])
        );
        assert_eq!(
            options.formats,
            BTreeSet::from([OutputFormat::Webp, OutputFormat::Jpeg])
        );
    }

    #[test]
    fn options_from_names_rejects_unknown() {
        assert_eq!(
            ProcessOptions::from_names(Some(&["poster"]), None),
            Err(ValidationError::UnknownVariant("poster".into()))
        );
        assert_eq!(
            ProcessOptions::from_names(None, Some(&["bmp"])),
            Err(ValidationError::UnknownFormat("bmp".into()))
        );
        assert_eq!(
            ProcessOptions::from_names(None, Some(&[])),
            Err(ValidationError::NoFormats)
        );
    }

    // =========================================================================
    // Variant selection
    // =========================================================================

    #[test]
    fn source_smaller_than_every_box_yields_nothing() {
        let p = processor(120, 90);
        let result = p
            .process_image(b"bytes", "a/b.jpg", &ProcessOptions::default())
            .unwrap();
        assert!(result.variants.is_empty());
        assert_eq!(result.metadata.width, 120);
        // Nothing to encode, so no full decode either
        assert_eq!(p.backend.get_operations(), vec![RecordedOp::Identify]);
    }

    #[test]
    fn scenario_800_by_600_default_options() {
        let result = processor(800, 600)
            .process_image(b"bytes", "a/b.jpg", &ProcessOptions::default())
            .unwrap();
        assert_eq!(
            produced(&result),
            vec![
                (VariantName::Thumbnail, OutputFormat::Webp),
                (VariantName::Medium, OutputFormat::Webp),
            ]
        );
    }

    #[test]
    fn scenario_exactly_600_square() {
        let result = processor(600, 600)
            .process_image(b"bytes", "a/b.jpg", &ProcessOptions::default())
            .unwrap();
        assert_eq!(
            produced(&result),
            vec![(VariantName::Thumbnail, OutputFormat::Webp)]
        );
        assert_eq!((result.variants[0].width, result.variants[0].height), (150, 150));
    }

    #[test]
    fn scenario_2000_by_1500_two_formats() {
        let options = ProcessOptions::default().with_formats([OutputFormat::Webp, OutputFormat::Jpeg]);
        let result = processor(2000, 1500)
            .process_image(b"bytes", "equipment/photo/123/img.jpg", &options)
            .unwrap();

        assert_eq!(result.variants.len(), 6);
        for v in &result.variants {
            assert!(v.key.ends_with(&format!(".{}", v.format.extension())));
            assert_eq!(v.content_type(), v.format.content_type());
            let spec = v.variant.spec();
            assert!(v.width <= spec.max_width && v.height <= spec.max_height);
            assert!(!v.buffer.is_empty());
        }
        let thumb = result
            .variant(VariantName::Thumbnail, OutputFormat::Webp)
            .unwrap();
        assert_eq!(thumb.key, "equipment/photo/123/img_thumb.webp");
        assert_eq!((thumb.width, thumb.height), (150, 113));
    }

    #[test]
    fn requested_variants_intersect_with_applicable() {
        let options = ProcessOptions::default().with_variants([VariantName::Large]);
        let p = processor(800, 600);
        let result = p.process_image(b"bytes", "a.jpg", &options).unwrap();
        assert!(result.variants.is_empty());

        let options = ProcessOptions::default().with_variants([VariantName::Medium]);
        let result = p.process_image(b"bytes", "a.jpg", &options).unwrap();
        assert_eq!(
            produced(&result),
            vec![(VariantName::Medium, OutputFormat::Webp)]
        );
    }

    #[test]
    fn empty_formats_is_validation_error() {
        let options = ProcessOptions::default().with_formats(Vec::new());
        let err = processor(800, 600)
            .process_image(b"bytes", "a.jpg", &options)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn input_over_byte_limit_is_rejected_before_identify() {
        let mut config = PipelineConfig::default();
        config.limits.max_upload_bytes = 4;
        let p = ImageProcessor::with_backend(
            MockBackend::with_dimensions(800, 600),
            StorageConfig::new("eu-west-1", "uploads").unwrap(),
            &config,
        )
        .unwrap();

        let err = p
            .process_image(b"12345", "a.jpg", &ProcessOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ProcessError::Validation(ValidationError::TooLarge { size: 5, limit: 4 })
        ));
        assert!(p.backend.get_operations().is_empty());

        // Exactly at the limit is accepted
        assert!(
            p.process_image(b"1234", "a.jpg", &ProcessOptions::default())
                .is_ok()
        );
    }

    #[test]
    fn validate_upload_uses_configured_limit() {
        let mut config = PipelineConfig::default();
        config.limits.max_upload_bytes = 1024;
        let p = ImageProcessor::with_backend(
            MockBackend::with_dimensions(800, 600),
            StorageConfig::new("eu-west-1", "uploads").unwrap(),
            &config,
        )
        .unwrap();

        assert_eq!(p.validate_upload("image/jpeg", "a.jpg", 1024), Ok(()));
        assert_eq!(
            p.validate_upload("image/jpeg", "a.jpg", 38196),
            Err(ValidationError::TooLarge {
                size: 38196,
                limit: 1024
            })
        );
    }

    // =========================================================================
    // Oversized originals
    // =========================================================================

    #[test]
    fn oversized_original_is_downscaled_before_encoding() {
        let p = processor(8192, 2048);
        let result = p
            .process_image(b"bytes", "a.jpg", &ProcessOptions::default())
            .unwrap();

        // Metadata keeps the true dimensions
        assert_eq!((result.metadata.width, result.metadata.height), (8192, 2048));
        assert!(
            p.backend
                .get_operations()
                .contains(&RecordedOp::Downscale {
                    width: 4096,
                    height: 1024
                })
        );
        for op in p.backend.resizes() {
            let RecordedOp::Resize { source, .. } = op else {
                unreachable!()
            };
            assert_eq!(source, (4096, 1024));
        }
        let large = result
            .variant(VariantName::Large, OutputFormat::Webp)
            .unwrap();
        assert_eq!((large.width, large.height), (1200, 300));
    }

    #[test]
    fn original_at_limit_is_not_downscaled() {
        let p = processor(4096, 4096);
        p.process_image(b"bytes", "a.jpg", &ProcessOptions::default())
            .unwrap();
        assert!(
            !p.backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Downscale { .. }))
        );
    }

    // =========================================================================
    // Output shape
    // =========================================================================

    #[test]
    fn urls_point_at_configured_storage() {
        let result = processor(800, 600)
            .process_image(b"bytes", "equipment/1/img.jpg", &ProcessOptions::default())
            .unwrap();
        assert_eq!(
            result.variants[1].url,
            "https://uploads.s3.eu-west-1.amazonaws.com/equipment/1/img_medium.webp"
        );
    }

    #[test]
    fn manifest_omits_buffers() {
        let result = processor(800, 600)
            .process_image(b"bytes", "a/b.jpg", &ProcessOptions::default())
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&result.manifest_json().unwrap()).unwrap();

        assert_eq!(json["metadata"]["width"], 800);
        let entries = json["variants"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["variant"], "thumbnail");
        assert_eq!(entries[0]["contentType"], "image/webp");
        assert_eq!(entries[0]["key"], "a/b_thumb.webp");
        assert!(entries[0].get("buffer").is_none());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            ProcessError::from(BackendError::Decode("x".into())).kind(),
            ErrorKind::Decode
        );
        assert_eq!(
            ProcessError::from(BackendError::Encode("x".into())).kind(),
            ErrorKind::Encode
        );
        assert_eq!(
            ProcessError::from(ConfigError::MissingStorage { field: "bucket" }).kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn from_config_requires_storage() {
        let result = ImageProcessor::from_config(&PipelineConfig::default());
        assert!(matches!(
            result,
            Err(ConfigError::MissingStorage { field: "region" })
        ));
    }
}

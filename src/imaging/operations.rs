//! High-level image operations.
//!
//! Planning is pure: it decides which variant × format encodes to run and at
//! what dimensions. Execution hands each plan to the backend, in parallel on
//! whatever rayon pool the caller installed.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{fit_inside, needs_variant};
use super::params::{Quality, ResizeParams};
use crate::config::StorageConfig;
use crate::keys::variant_key;
use crate::variants::{OutputFormat, VARIANTS, VariantName};
use image::DynamicImage;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// One encode to run: variant, format and fitted output dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedVariant {
    pub variant: VariantName,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// One produced derivative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantResult {
    pub variant: VariantName,
    pub format: OutputFormat,
    /// Storage key derived from the original key.
    pub key: String,
    pub url: String,
    /// Actual output dimensions.
    pub width: u32,
    pub height: u32,
    pub buffer: Vec<u8>,
    /// Byte length of `buffer`.
    pub size: u64,
}

impl VariantResult {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Plan the encodes for a source of `source` dimensions.
///
/// Variants are visited smallest first; a variant the source already fits
/// inside is skipped. Each surviving, requested variant is planned once per
/// requested format.
pub fn plan_variants(
    source: (u32, u32),
    variants: &BTreeSet<VariantName>,
    formats: &BTreeSet<OutputFormat>,
) -> Vec<PlannedVariant> {
    VARIANTS
        .iter()
        .filter(|spec| variants.contains(&spec.name))
        .filter(|spec| needs_variant(source, spec))
        .flat_map(|spec| {
            let (width, height) = fit_inside(source, (spec.max_width, spec.max_height));
            formats.iter().map(move |&format| PlannedVariant {
                variant: spec.name,
                format,
                width,
                height,
            })
        })
        .collect()
}

/// Encode every plan from `source`. Results keep plan order.
pub fn create_variants(
    backend: &impl ImageBackend,
    source: &DynamicImage,
    original_key: &str,
    storage: &StorageConfig,
    plans: &[PlannedVariant],
) -> Result<Vec<VariantResult>> {
    plans
        .par_iter()
        .map(|plan| {
            let spec = plan.variant.spec();
            let buffer = backend.resize(
                source,
                &ResizeParams {
                    width: plan.width,
                    height: plan.height,
                    format: plan.format,
                    quality: Quality::new(spec.quality),
                },
            )?;
            if buffer.is_empty() {
                return Err(BackendError::Encode(format!(
                    "{} {} encoder produced no data",
                    plan.variant, plan.format
                )));
            }

            let key = variant_key(original_key, plan.variant, plan.format);
            tracing::debug!(
                variant = %plan.variant,
                format = %plan.format,
                width = plan.width,
                height = plan.height,
                bytes = buffer.len(),
                "encoded variant"
            );
            Ok(VariantResult {
                variant: plan.variant,
                format: plan.format,
                url: storage.object_url(&key),
                key,
                width: plan.width,
                height: plan.height,
                size: buffer.len() as u64,
                buffer,
            })
        })
        .collect()
}

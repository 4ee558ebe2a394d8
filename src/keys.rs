//! Storage key and URL derivation for variants.
//!
//! All functions are pure string manipulation over the [`variants`](crate::variants)
//! schema, cheap enough to call on every render.
//!
//! A variant key replaces the original's extension with
//! `<suffix>.<format extension>`:
//!
//! ```text
//! equipment/photo/123/img.jpg  →  equipment/photo/123/img_thumb.webp
//! equipment/photo/123/img      →  equipment/photo/123/img_thumb.webp
//! ```
//!
//! Only a dot inside the final path segment counts as an extension dot. A
//! segment that starts with its only dot (`.gitignore`) or ends with a dot has
//! no extension.

use crate::variants::{DEFAULT_FORMAT, OutputFormat, VariantName};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown variant: {0}")]
    UnknownVariant(String),
    #[error("unknown output format: {0}")]
    UnknownFormat(String),
    #[error("at least one output format must be requested")]
    NoFormats,
    #[error("unsupported content type: {0:?}")]
    UnsupportedMimeType(String),
    #[error("unsupported file extension: {0:?}")]
    UnsupportedExtension(String),
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

const PROCESSABLE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
    "image/tiff",
];

const PROCESSABLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif", "tif", "tiff"];

/// Exact, case-sensitive match against the accepted image MIME types.
pub fn is_processable_image(mime_type: &str) -> bool {
    PROCESSABLE_MIME_TYPES.contains(&mime_type)
}

/// Case-insensitive match against the accepted file extensions (no leading dot).
pub fn is_processable_extension(ext: &str) -> bool {
    !ext.is_empty()
        && PROCESSABLE_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

/// Splits `path` into (everything before the extension dot, extension).
fn split_extension(path: &str) -> Option<(&str, &str)> {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let segment = &path[segment_start..];
    let dot = segment.rfind('.')?;
    if dot == 0 || dot + 1 == segment.len() {
        return None;
    }
    Some((&path[..segment_start + dot], &segment[dot + 1..]))
}

/// Lower-cased text after the last dot, or an empty string when there is no
/// extension.
///
/// - `"archive.tar.gz"` → `"gz"`
/// - `"PHOTO.JPG"` → `"jpg"`
/// - `"noext"`, `".gitignore"`, `"file."`, `"."` → `""`
pub fn file_extension(filename: &str) -> String {
    split_extension(filename)
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

fn with_variant_extension(path: &str, variant: VariantName, format: OutputFormat) -> String {
    let stem = split_extension(path).map_or(path, |(stem, _)| stem);
    format!("{stem}{}.{}", variant.spec().suffix, format.extension())
}

/// Storage key of `variant` encoded as `format`, derived from the original key.
pub fn variant_key(original_key: &str, variant: VariantName, format: OutputFormat) -> String {
    with_variant_extension(original_key, variant, format)
}

/// [`variant_key`] for a variant named by string.
pub fn variant_key_by_name(
    original_key: &str,
    variant: &str,
    format: OutputFormat,
) -> Result<String, ValidationError> {
    let variant = variant
        .parse::<VariantName>()
        .map_err(|e| ValidationError::UnknownVariant(e.0))?;
    Ok(variant_key(original_key, variant, format))
}

/// Byte offset where the path component of `url` starts.
///
/// For absolute (`scheme://host/...`) and protocol-relative (`//host/...`)
/// URLs the authority is skipped so a dot in the host name is never read as an
/// extension. A URL with an authority but no path yields `url.len()`.
fn path_start(url: &str) -> usize {
    let authority_start = if let Some(i) = url.find("://") {
        i + 3
    } else if url.starts_with("//") {
        2
    } else {
        return 0;
    };
    url[authority_start..]
        .find('/')
        .map_or(url.len(), |i| authority_start + i)
}

/// URL of `variant` derived from the URL of the original.
///
/// The query string and fragment are carried over verbatim. Any dot in the
/// final path segment marks the extension, including a leading one
/// (`/.jpg` → `/_thumb.webp`), unlike [`variant_key`] which treats dotfiles
/// as extensionless. A URL whose final path segment has no dot is returned
/// unchanged.
pub fn derive_variant_url(
    original_url: &str,
    variant: VariantName,
    format: Option<OutputFormat>,
) -> String {
    let (before_fragment, fragment) = original_url
        .find('#')
        .map_or((original_url, ""), |i| original_url.split_at(i));
    let (before_query, query) = before_fragment
        .find('?')
        .map_or((before_fragment, ""), |i| before_fragment.split_at(i));

    let start = path_start(before_query);
    let (prefix, path) = before_query.split_at(start);
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    let Some(dot) = path[segment_start..].rfind('.') else {
        return original_url.to_string();
    };

    let format = format.unwrap_or(DEFAULT_FORMAT);
    format!(
        "{prefix}{}{}.{}{query}{fragment}",
        &path[..segment_start + dot],
        variant.spec().suffix,
        format.extension()
    )
}

/// [`derive_variant_url`] for a variant named by string. Unknown names leave
/// the URL unchanged so renderers fall straight back to the original.
pub fn derive_variant_url_by_name(
    original_url: &str,
    variant: &str,
    format: Option<OutputFormat>,
) -> String {
    match variant.parse::<VariantName>() {
        Ok(variant) => derive_variant_url(original_url, variant, format),
        Err(_) => original_url.to_string(),
    }
}

/// The original URL plus one derived URL per variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantUrls {
    pub original: String,
    pub thumbnail: String,
    pub medium: String,
    pub large: String,
}

impl VariantUrls {
    pub fn get(&self, variant: VariantName) -> &str {
        match variant {
            VariantName::Thumbnail => &self.thumbnail,
            VariantName::Medium => &self.medium,
            VariantName::Large => &self.large,
        }
    }
}

pub fn all_variant_urls(original_url: &str, format: Option<OutputFormat>) -> VariantUrls {
    VariantUrls {
        original: original_url.to_string(),
        thumbnail: derive_variant_url(original_url, VariantName::Thumbnail, format),
        medium: derive_variant_url(original_url, VariantName::Medium, format),
        large: derive_variant_url(original_url, VariantName::Large, format),
    }
}

/// `true` iff `byte_len <= max_bytes`.
pub fn validate_image_size(byte_len: u64, max_bytes: u64) -> bool {
    byte_len <= max_bytes
}

/// Admission check an upload handler runs before handing bytes to the engine.
pub fn validate_upload(
    mime_type: &str,
    filename: &str,
    byte_len: u64,
    max_bytes: u64,
) -> Result<(), ValidationError> {
    if !is_processable_image(mime_type) {
        return Err(ValidationError::UnsupportedMimeType(mime_type.to_string()));
    }
    let ext = file_extension(filename);
    if !is_processable_extension(&ext) {
        return Err(ValidationError::UnsupportedExtension(ext));
    }
    if !validate_image_size(byte_len, max_bytes) {
        return Err(ValidationError::TooLarge {
            size: byte_len,
            limit: max_bytes,
        });
    }
    Ok(())
}

//! Variant schema: the fixed family of derivatives produced for every upload.
//!
//! ```text
//! name       box          quality  suffix
//! thumbnail  150 x 150    70       _thumb
//! medium     600 x 600    80       _medium
//! large      1200 x 1200  85       _large
//! ```
//!
//! [`VARIANTS`] is ordered by `max_width` ascending. The engine walks it in
//! that order, and [`VariantName`]'s `Ord` follows the same order so sets of
//! names iterate smallest first.
//!
//! Output formats each map to exactly one content-type and one filename
//! extension. Both mappings are exhaustive `match`es over [`OutputFormat`],
//! so they cannot drift apart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest width or height an original is kept at in memory before variants
/// are derived from it.
pub const MAX_ORIGINAL_DIMENSION: u32 = 4096;

/// Default upper bound for an uploaded original (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Name of a variant. Declaration order is size order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantName {
    Thumbnail,
    Medium,
    Large,
}

impl VariantName {
    pub const ALL: [VariantName; 3] = [Self::Thumbnail, Self::Medium, Self::Large];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// Schema entry for this variant.
    pub fn spec(self) -> &'static VariantSpec {
        match self {
            Self::Thumbnail => &VARIANTS[0],
            Self::Medium => &VARIANTS[1],
            Self::Large => &VARIANTS[2],
        }
    }
}

impl fmt::Display for VariantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a variant or format name that is not in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownName(pub String);

impl FromStr for VariantName {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thumbnail" => Ok(Self::Thumbnail),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

/// Immutable definition of one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VariantSpec {
    pub name: VariantName,
    pub max_width: u32,
    pub max_height: u32,
    /// Lossy encoding quality, 0-100.
    pub quality: u8,
    /// Appended to the base filename, before the extension.
    pub suffix: &'static str,
}

pub static VARIANTS: [VariantSpec; 3] = [
    VariantSpec {
        name: VariantName::Thumbnail,
        max_width: 150,
        max_height: 150,
        quality: 70,
        suffix: "_thumb",
    },
    VariantSpec {
        name: VariantName::Medium,
        max_width: 600,
        max_height: 600,
        quality: 80,
        suffix: "_medium",
    },
    VariantSpec {
        name: VariantName::Large,
        max_width: 1200,
        max_height: 1200,
        quality: 85,
        suffix: "_large",
    },
];

/// Encodable output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Jpeg,
    Avif,
}

pub const DEFAULT_FORMAT: OutputFormat = OutputFormat::Webp;

pub const SUPPORTED_FORMATS: [OutputFormat; 3] =
    [OutputFormat::Webp, OutputFormat::Jpeg, OutputFormat::Avif];

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpg",
            Self::Avif => "avif",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Avif => "avif",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webp" => Ok(Self::Webp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "avif" => Ok(Self::Avif),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

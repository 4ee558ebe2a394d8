//! Pipeline configuration.
//!
//! Loaded once at startup from an optional `variants.toml`, layered with
//! environment overrides, then validated. Object-storage settings are turned
//! into a [`StorageConfig`] up front so a missing region or bucket fails the
//! deployment, not an individual upload.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! region = "eu-west-1"        # or AWS_REGION
//! bucket = "my-uploads"       # or AWS_S3_BUCKET
//! # endpoint = "http://localhost:9000"  # S3-compatible store, or AWS_S3_ENDPOINT
//!
//! [limits]
//! max_upload_bytes = 10485760 # or IMAGE_MAX_UPLOAD_BYTES
//! max_original_dimension = 4096
//!
//! [processing]
//! max_processes = 4           # Max parallel encoders (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::variants::{MAX_ORIGINAL_DIMENSION, MAX_UPLOAD_BYTES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_BUCKET: &str = "AWS_S3_BUCKET";
pub const ENV_ENDPOINT: &str = "AWS_S3_ENDPOINT";
pub const ENV_MAX_UPLOAD_BYTES: &str = "IMAGE_MAX_UPLOAD_BYTES";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("storage {field} is not configured")]
    MissingStorage { field: &'static str },
    #[error("{name} is not a valid value: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("failed to build encoder pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Object-storage location variant URLs point at.
    pub storage: StorageSection,
    /// Upload and decode limits.
    pub limits: LimitsConfig,
    /// Parallel encoding settings.
    pub processing: ProcessingConfig,
}

/// Raw `[storage]` table. Turned into a [`StorageConfig`] by
/// [`PipelineConfig::storage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest accepted upload in bytes (inclusive).
    pub max_upload_bytes: u64,
    /// Originals wider or taller than this are downscaled before variants
    /// are derived. The reported metadata keeps the true dimensions.
    pub max_original_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES,
            max_original_dimension: MAX_ORIGINAL_DIMENSION,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel encode workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

impl PipelineConfig {
    /// Read `path` if it exists, otherwise start from defaults. Environment
    /// overrides are applied on top and the result is validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            toml::from_str(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables, looked up through `var`.
    /// Empty values are ignored.
    pub fn apply_env(
        &mut self,
        var: impl Fn(&'static str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let lookup = |name| var(name).filter(|v| !v.trim().is_empty());

        if let Some(region) = lookup(ENV_REGION) {
            self.storage.region = Some(region);
        }
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.storage.bucket = Some(bucket);
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(raw) = lookup(ENV_MAX_UPLOAD_BYTES) {
            self.limits.max_upload_bytes =
                raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    name: ENV_MAX_UPLOAD_BYTES,
                    value: raw.clone(),
                })?;
        }
        Ok(())
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "limits.max_upload_bytes must be non-zero".into(),
            ));
        }
        let largest_variant = crate::variants::VARIANTS
            .iter()
            .map(|v| v.max_width.max(v.max_height))
            .max()
            .unwrap_or(0);
        if self.limits.max_original_dimension < largest_variant {
            return Err(ConfigError::Validation(format!(
                "limits.max_original_dimension must be at least {largest_variant}"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Validated storage settings.
    pub fn storage(&self) -> Result<StorageConfig, ConfigError> {
        let mut storage = StorageConfig::new(
            self.storage.region.as_deref().unwrap_or_default(),
            self.storage.bucket.as_deref().unwrap_or_default(),
        )?;
        storage.endpoint = self
            .storage
            .endpoint
            .as_deref()
            .map(|e| e.trim_end_matches('/').to_string())
            .filter(|e| !e.is_empty());
        Ok(storage)
    }
}

/// Object-storage location: region and bucket are both present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageConfig {
    region: String,
    bucket: String,
    endpoint: Option<String>,
}

impl StorageConfig {
    pub fn new(region: &str, bucket: &str) -> Result<Self, ConfigError> {
        let region = region.trim();
        let bucket = bucket.trim();
        if region.is_empty() {
            return Err(ConfigError::MissingStorage { field: "region" });
        }
        if bucket.is_empty() {
            return Err(ConfigError::MissingStorage { field: "bucket" });
        }
        Ok(Self {
            region: region.to_string(),
            bucket: bucket.to_string(),
            endpoint: None,
        })
    }

    /// Storage settings from `AWS_REGION` / `AWS_S3_BUCKET` / `AWS_S3_ENDPOINT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = PipelineConfig::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.storage()
    }

    /// Point URLs at an S3-compatible endpoint instead of AWS
    /// (path-style: `<endpoint>/<bucket>/<key>`).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        let endpoint = endpoint.trim().trim_end_matches('/');
        self.endpoint = (!endpoint.is_empty()).then(|| endpoint.to_string());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Fully qualified URL of the object stored under `key`.
    pub fn object_url(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        match &self.endpoint {
            Some(endpoint) => format!("{endpoint}/{}/{key}", self.bucket),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{key}",
                self.bucket, self.region
            ),
        }
    }
}

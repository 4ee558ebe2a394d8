//! Image processing in pure Rust, with no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image` decoder headers, `avif-parse` for AVIF |
//! | **Decode** | `image::load_from_memory`, `rav1d` for AVIF |
//! | **Fit-inside resize** | `resize_exact` with Lanczos3 at precomputed dimensions |
//! | **Encode** | WebP (lossless), JPEG and AVIF (rav1e) encoders from `image` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math and the skip rule (unit testable)
//! - **Parameters**: Data structures describing encode operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Planning and executing the variant × format encodes

mod avif;
pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, ImageMetadata};
pub use calculations::{exceeds_dimension, fit_inside, needs_variant};
pub use operations::{PlannedVariant, VariantResult, create_variants, plan_variants};
pub use params::{Quality, ResizeParams};
pub use rust_backend::RustBackend;

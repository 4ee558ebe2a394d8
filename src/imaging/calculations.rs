//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use crate::variants::VariantSpec;

/// Largest dimensions with the source aspect ratio that fit inside `bounds`,
/// never larger than the source itself.
///
/// The limiting axis lands on its bound; the other axis is scaled by the same
/// factor and rounded, so it never exceeds its bound either.
///
/// # Examples
/// ```
/// # use image_variants::imaging::fit_inside;
/// assert_eq!(fit_inside((800, 600), (150, 150)), (150, 113));
/// assert_eq!(fit_inside((100, 50), (150, 150)), (100, 50));
/// ```
pub fn fit_inside(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;
    if src_w == 0 || src_h == 0 {
        return source;
    }

    let scale = (max_w as f64 / src_w as f64)
        .min(max_h as f64 / src_h as f64)
        .min(1.0);
    if scale >= 1.0 {
        return source;
    }

    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

/// Whether `spec` should be generated for a source of `source` dimensions.
///
/// A variant is skipped only when the source fits inside its box on *both*
/// axes; being larger on either axis is enough to generate it.
pub fn needs_variant(source: (u32, u32), spec: &VariantSpec) -> bool {
    let (w, h) = source;
    !(w <= spec.max_width && h <= spec.max_height)
}

/// Whether either dimension is strictly greater than `max_dimension`.
pub fn exceeds_dimension(source: (u32, u32), max_dimension: u32) -> bool {
    source.0 > max_dimension || source.1 > max_dimension
}

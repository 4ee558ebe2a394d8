//! Shared test utilities: synthetic images encoded in memory.
//!
//! Pixel content is a simple gradient so encoders have something non-uniform
//! to compress; only dimensions and channel layout matter to the tests.

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

/// A valid JPEG of the given dimensions.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(gradient(width, height)), ImageFormat::Jpeg)
}

/// A valid PNG, RGBA with a half-transparent right side when `alpha` is set.
pub fn png_bytes(width: u32, height: u32, alpha: bool) -> Vec<u8> {
    let img = if alpha {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            let a = if x < width / 2 { 255 } else { 128 };
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, a])
        }))
    } else {
        DynamicImage::ImageRgb8(gradient(width, height))
    };
    encode(img, ImageFormat::Png)
}

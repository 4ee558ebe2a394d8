//! AVIF input support.
//!
//! The `image` crate's `"avif"` feature only provides the encoder (rav1e).
//! Decoding requires `"avif-native"` which depends on the C library dav1d.
//! Instead, the container is parsed with `avif-parse` and the AV1 payload is
//! decoded with `rav1d` (pure Rust port of dav1d).

use super::backend::BackendError;
use image::DynamicImage;
use std::borrow::Cow;

/// Major and compatible brands of a leading ISO-BMFF `ftyp` box.
fn ftyp_brands(bytes: &[u8]) -> Option<impl Iterator<Item = &[u8]>> {
    if bytes.len() < 16 || &bytes[4..8] != b"ftyp" {
        return None;
    }
    let size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if size < 16 {
        return None;
    }
    let end = size.min(bytes.len());
    Some(std::iter::once(&bytes[8..12]).chain(bytes[16..end].chunks_exact(4)))
}

/// `ftyp` box listing an AVIF brand, as major brand or among the compatible
/// brands (e.g. major `mif1` with `avif` compatible).
pub fn is_avif(bytes: &[u8]) -> bool {
    ftyp_brands(bytes).is_some_and(|mut brands| brands.any(|b| b == b"avif" || b == b"avis"))
}

fn parse(bytes: &[u8]) -> Result<avif_parse::AvifData, BackendError> {
    // avif-parse only accepts an `avif` major brand
    let container = if bytes.len() >= 12 && !matches!(&bytes[8..12], b"avif" | b"avis") {
        let mut patched = bytes.to_vec();
        patched[8..12].copy_from_slice(b"avif");
        Cow::Owned(patched)
    } else {
        Cow::Borrowed(bytes)
    };
    avif_parse::read_avif(&mut std::io::Cursor::new(&container[..]))
        .map_err(|e| BackendError::Decode(format!("invalid AVIF container: {e:?}")))
}

/// Dimensions and alpha presence from container metadata (no AV1 decode).
pub fn identify(bytes: &[u8]) -> Result<(u32, u32, bool), BackendError> {
    let avif = parse(bytes)?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| BackendError::Decode(format!("unreadable AVIF metadata: {e:?}")))?;
    Ok((
        meta.max_frame_width.get(),
        meta.max_frame_height.get(),
        avif.alpha_item.is_some(),
    ))
}

/// Decode the primary item to RGB8. An alpha item, if any, is not composited.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, BackendError> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib::{
        dav1d_close, dav1d_data_create, dav1d_data_unref, dav1d_default_settings, dav1d_get_picture,
        dav1d_open, dav1d_picture_unref, dav1d_send_data,
    };
    use std::ptr::NonNull;

    let avif = parse(bytes)?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    unsafe { dav1d_default_settings(NonNull::from(&mut settings).cast::<Dav1dSettings>()) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let mut data = Dav1dData::default();
    let buf_ptr = unsafe { dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::Decode("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d_data_unref(NonNull::new(&mut data));
            dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(BackendError::Decode(format!(
            "rav1d send_data failed ({})",
            rc.0
        )));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::Decode(format!(
            "rav1d get_picture failed ({})",
            rc.0
        )));
    }

    let layout = pic.p.layout;
    let subsampling = match layout {
        DAV1D_PIXEL_LAYOUT_I400 => None,
        DAV1D_PIXEL_LAYOUT_I420 => Some((true, true)),
        DAV1D_PIXEL_LAYOUT_I422 => Some((true, false)),
        DAV1D_PIXEL_LAYOUT_I444 => Some((false, false)),
        _ => {
            unsafe {
                dav1d_picture_unref(NonNull::new(&mut pic));
                dav1d_close(NonNull::new(&mut ctx));
            }
            return Err(BackendError::Decode(format!(
                "unsupported AVIF pixel layout: {layout}"
            )));
        }
    };

    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let y_ptr = pic.data[0].map(|p| p.as_ptr() as *const u8);
    let planes = match (y_ptr, subsampling) {
        (Some(y_ptr), None) => Some(YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width,
            height,
            bpc: pic.p.bpc as u32,
            subsampling: (false, false),
            monochrome: true,
        }),
        (Some(y_ptr), Some(subsampling)) => match (pic.data[1], pic.data[2]) {
            (Some(u), Some(v)) => Some(YuvPlanes {
                y_ptr,
                u_ptr: u.as_ptr() as *const u8,
                v_ptr: v.as_ptr() as *const u8,
                y_stride: pic.stride[0],
                uv_stride: pic.stride[1],
                width,
                height,
                bpc: pic.p.bpc as u32,
                subsampling,
                monochrome: false,
            }),
            _ => None,
        },
        (None, _) => None,
    };
    let rgb = planes.map(|p| p.to_rgb());

    unsafe {
        dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d_close(NonNull::new(&mut ctx));
    }

    let rgb = rgb.ok_or_else(|| BackendError::Decode("AVIF picture has no pixel planes".into()))?;
    image::RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::Decode("decoded AVIF buffer has wrong length".into()))
}

/// Decoded YUV plane pointers from rav1d, valid until the picture is unref'd.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling: horizontal, vertical (e.g. I420 = true, true)
    subsampling: (bool, bool),
    monochrome: bool,
}

impl YuvPlanes {
    /// Convert to interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;
        let (ss_x, ss_y) = self.subsampling;

        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);
        for row in 0..self.height {
            for col in 0..self.width {
                let y = self.sample(self.y_ptr, self.y_stride, col, row);
                let pixel = if self.monochrome {
                    let v = (y * scale).clamp(0.0, 255.0) as u8;
                    [v, v, v]
                } else {
                    let (cx, cy) = (
                        if ss_x { col / 2 } else { col },
                        if ss_y { row / 2 } else { row },
                    );
                    let cb = self.sample(self.u_ptr, self.uv_stride, cx, cy) - center;
                    let cr = self.sample(self.v_ptr, self.uv_stride, cx, cy) - center;
                    [
                        ((y + 1.402 * cr) * scale).clamp(0.0, 255.0) as u8,
                        ((y - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0) as u8,
                        ((y + 1.772 * cb) * scale).clamp(0.0, 255.0) as u8,
                    ]
                };
                rgb.extend_from_slice(&pixel);
            }
        }
        rgb
    }

    /// One sample from a plane; 10/12-bit depths are stored as u16.
    #[inline]
    fn sample(&self, ptr: *const u8, stride: isize, x: u32, y: u32) -> f32 {
        if self.bpc <= 8 {
            (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
        } else {
            let byte_offset = y as isize * stride + x as isize * 2;
            (unsafe { (ptr.offset(byte_offset) as *const u16).read_unaligned() }) as f32
        }
    }
}

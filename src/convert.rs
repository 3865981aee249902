//! Conversion of driver buffers into BGR frames.

use crate::traits::{CameraError, Format, FourCC, RawFrame, Result};

/// Pixel formats the pipeline can convert, in order of preference.
pub const SUPPORTED_FORMATS: [FourCC; 4] = [FourCC::YUYV, FourCC::MJPG, FourCC::BGR3, FourCC::RGB3];

/// Whether a pixel format can be converted to BGR.
#[must_use]
pub fn is_supported(fourcc: FourCC) -> bool {
    SUPPORTED_FORMATS.contains(&fourcc)
}

/// Reject formats that cannot be converted into whole frames.
///
/// YUYV packs pixels in pairs, so an odd width would lose the last column.
pub fn ensure_convertible(format: &Format) -> Result<()> {
    let odd_yuyv = format.fourcc == FourCC::YUYV && format.width % 2 != 0;
    if !is_supported(format.fourcc) || odd_yuyv {
        return Err(CameraError::FormatNotSupported(format.fourcc));
    }
    Ok(())
}

/// Convert a driver buffer in `format` into a BGR [`RawFrame`].
///
/// Returns `Ok(None)` for buffers too short for the announced dimensions,
/// which happens when a driver hands back a partially filled buffer.
pub fn to_bgr(data: &[u8], format: &Format, sequence: u32) -> Result<Option<RawFrame>> {
    ensure_convertible(format)?;

    let bgr = match format.fourcc {
        FourCC::YUYV => yuyv_to_bgr(data, format.width, format.height, format.stride),
        FourCC::BGR3 => packed_to_bgr(data, format, false),
        FourCC::RGB3 => packed_to_bgr(data, format, true),
        FourCC::MJPG => return mjpeg_to_bgr(data, sequence),
        other => return Err(CameraError::FormatNotSupported(other)),
    };

    Ok(bgr.map(|data| RawFrame {
        width: format.width,
        height: format.height,
        data,
        sequence,
    }))
}

fn yuyv_to_bgr(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Vec<u8>> {
    let stride = if stride == 0 { width * 2 } else { stride } as usize;
    let row_bytes = width as usize * 2;
    let mut out = Vec::with_capacity(width as usize * height as usize * 3);

    for row in 0..height as usize {
        let start = row * stride;
        let line = data.get(start..start + row_bytes)?;
        // YUYV format: [Y0 U Y1 V] repeats, each pair of pixels shares U and V
        for quad in line.chunks_exact(4) {
            if let [y0, u, y1, v] = *quad {
                let (r, g, b) = yuv_to_rgb(y0, u, v);
                out.extend_from_slice(&[b, g, r]);
                let (r, g, b) = yuv_to_rgb(y1, u, v);
                out.extend_from_slice(&[b, g, r]);
            }
        }
    }

    Some(out)
}

fn packed_to_bgr(data: &[u8], format: &Format, swap: bool) -> Option<Vec<u8>> {
    let row_bytes = format.width as usize * 3;
    let stride = if format.stride == 0 {
        row_bytes
    } else {
        format.stride as usize
    };
    let mut out = Vec::with_capacity(row_bytes * format.height as usize);

    for row in 0..format.height as usize {
        let start = row * stride;
        out.extend_from_slice(data.get(start..start + row_bytes)?);
    }

    if swap {
        for pixel in out.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
    }
    Some(out)
}

fn mjpeg_to_bgr(data: &[u8], sequence: u32) -> Result<Option<RawFrame>> {
    if data.is_empty() {
        return Ok(None);
    }

    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?.to_rgb8();
    let (width, height) = image.dimensions();
    let mut data = image.into_raw();
    for pixel in data.chunks_exact_mut(3) {
        pixel.swap(0, 2);
    }

    Ok(Some(RawFrame {
        width,
        height,
        data,
        sequence,
    }))
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value (16-235 for studio range)
/// * `u` - Blue-difference chroma value (16-240)
/// * `v` - Red-difference chroma value (16-240)
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    (clamp_u8(r), clamp_u8(g), clamp_u8(b))
}

/// Clamp a wide value into the 8-bit range, rounding to nearest.
#[must_use]
pub fn clamp_u8(val: f32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        val.round().clamp(0.0, 255.0) as u8
    }
}

use zune_jpeg::JpegDecoder;

use super::frame::{Frame, PixelFormat};
use crate::error::CaptureError;

/// Decode one device buffer into the session's RGB24 frame.
pub fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
    frame: &mut Frame,
) -> Result<(), CaptureError> {
    match format {
        PixelFormat::Mjpeg => {
            let mut decoder = JpegDecoder::new(data);
            decoder
                .decode_headers()
                .map_err(|e| CaptureError::Decode(format!("{e:?}")))?;
            // The JPEG header is authoritative over the negotiated size
            let (w, h) = decoder
                .dimensions()
                .ok_or_else(|| CaptureError::Decode("missing JPEG dimensions".into()))?;
            let out = frame.prepare(w as u32, h as u32, PixelFormat::Mjpeg);
            decoder
                .decode_into(out)
                .map_err(|e| CaptureError::Decode(format!("{e:?}")))?;
            Ok(())
        }
        PixelFormat::Rgb24 => {
            let len = width as usize * height as usize * 3;
            if data.len() < len {
                return Err(CaptureError::Decode(format!(
                    "short RGB24 buffer: {} < {len}",
                    data.len()
                )));
            }
            frame
                .prepare(width, height, PixelFormat::Rgb24)
                .copy_from_slice(&data[..len]);
            Ok(())
        }
        PixelFormat::Yuyv4 => {
            if width % 2 != 0 {
                return Err(CaptureError::Format(format!("odd YUYV width {width}")));
            }
            let len = width as usize * height as usize * 2;
            if data.len() < len {
                return Err(CaptureError::Decode(format!(
                    "short YUYV buffer: {} < {len}",
                    data.len()
                )));
            }
            let out = frame.prepare(width, height, PixelFormat::Yuyv4);
            yuyv_to_rgb(&data[..len], out);
            Ok(())
        }
    }
}

/// BT.601 limited-range YUYV (4:2:2) to packed RGB24.
fn yuyv_to_rgb(yuyv: &[u8], rgb: &mut [u8]) {
    for (src, dst) in yuyv.chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        let (y0, u, y1, v) = (src[0], src[1], src[2], src[3]);
        dst[..3].copy_from_slice(&yuv_to_rgb(y0, u, v));
        dst[3..].copy_from_slice(&yuv_to_rgb(y1, u, v));
    }
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}

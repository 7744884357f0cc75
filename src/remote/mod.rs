//! Remote rendering service seam.

pub mod http;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

use crate::capture::Frame;
use crate::error::RemoteError;
use crate::selection::GarmentId;

pub use http::HttpTryOnService;

/// One frame submitted for one garment.
#[derive(Debug, Clone)]
pub struct TryOnRequest {
    /// JPEG-encoded camera frame.
    pub frame: Bytes,
    pub garment_id: GarmentId,
}

impl TryOnRequest {
    pub fn from_frame(
        frame: &Frame,
        garment_id: GarmentId,
        quality: u8,
    ) -> Result<Self, RemoteError> {
        if frame.is_empty() {
            return Err(RemoteError::Encode("empty frame".into()));
        }
        let mut jpeg = Vec::with_capacity(frame.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(
                &frame.pixels,
                frame.meta.width,
                frame.meta.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| RemoteError::Encode(e.to_string()))?;
        Ok(Self {
            frame: Bytes::from(jpeg),
            garment_id,
        })
    }
}

#[derive(Debug)]
pub enum TryOnResult {
    /// Decoded result image.
    Image(RgbImage),
    /// Accepted, but the service returned no image reference.
    Empty,
}

pub type TryOnFuture = Pin<Box<dyn Future<Output = Result<TryOnResult, RemoteError>> + Send>>;

/// Opaque request/response try-on endpoint.
///
/// The returned future must own everything it needs: the scheduler runs it
/// detached and does not cancel it on stop.
pub trait TryOnService: Send + Sync + 'static {
    fn try_on(&self, request: TryOnRequest) -> TryOnFuture;
}

//! Generic `Camera` trait and supporting types for image-capture hardware.

use async_trait::async_trait;
use image::ColorType;
use image::codecs::jpeg::JpegEncoder;
use vigil_types::VigilError;

/// JPEG quality used for snapshots and captioning payloads.
pub const JPEG_QUALITY: u8 = 90;

/// A raw RGB24 image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed RGB24 pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Decode a JPEG/PNG payload into an RGB24 frame.
    pub fn decode(device: &str, bytes: &[u8]) -> Result<Self, VigilError> {
        let rgb = image::load_from_memory(bytes)
            .map_err(|e| VigilError::Capture {
                device: device.to_string(),
                details: format!("undecodable image: {e}"),
            })?
            .to_rgb8();
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            data: rgb.into_raw(),
        })
    }

    /// Encode the frame as JPEG.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Serialization`] if the pixel buffer does not
    /// match the frame dimensions or the encoder fails.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, VigilError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.width == 0 || self.height == 0 || self.data.len() != expected {
            return Err(VigilError::Serialization(format!(
                "frame buffer holds {} bytes, expected {expected} for {}x{} RGB24",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
            .encode(&self.data, self.width, self.height, ColorType::Rgb8)
            .map_err(|e| VigilError::Serialization(format!("jpeg encoding failed: {e}")))?;
        Ok(out)
    }
}

/// A camera or image-capture device.
///
/// The pipeline owns exactly one camera and calls [`Camera::capture`] once
/// per cycle.  [`Camera::release`] is called once, when the scheduler stops.
#[async_trait]
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"bedside"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Capture`] if the frame cannot be captured
    /// (e.g. the device is disconnected or no new frame is available).
    async fn capture(&mut self) -> Result<CameraFrame, VigilError>;

    /// Release the underlying device.
    fn release(&mut self) {}
}

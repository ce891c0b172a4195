use std::io::Cursor;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;

use crate::error::CaptureError;

/// A single captured frame. The pixel buffer is immutable once produced and
/// shared by reference, so cloning a frame never copies image data.
#[derive(Clone)]
pub struct Frame {
    image: Arc<DynamicImage>,
    frame_id: u64,
    captured_at: DateTime<Utc>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(frame_id: u64, image: DynamicImage, captured_at: DateTime<Utc>) -> Self {
        let width = image.width();
        let height = image.height();
        Self {
            image: Arc::new(image),
            frame_id,
            captured_at,
            width,
            height,
        }
    }

    pub fn id(&self) -> u64 {
        self.frame_id
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Encodes the frame as JPEG for transport and for the external vision
    /// request. Quality is fixed by the caller's configuration.
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, CaptureError> {
        let mut buffer = Cursor::new(Vec::new());
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        self.image
            .write_with_encoder(encoder)
            .map_err(|e| CaptureError::FrameRead(format!("JPEG encoding failed: {e}")))?;
        Ok(buffer.into_inner())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("captured_at", &self.captured_at)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn test_image() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
            16,
            16,
            Rgb([1, 2, 3]),
        ))
    }

    #[test]
    fn cloning_frame_shares_image_buffer() {
        let f1 = Frame::new(1, test_image(), Utc::now());
        let f2 = f1.clone();
        assert!(Arc::ptr_eq(&f1.image, &f2.image));
    }

    #[test]
    fn jpeg_encoding_produces_nonempty_payload() {
        let frame = Frame::new(1, test_image(), Utc::now());
        let bytes = frame.to_jpeg(85).expect("encoding failed");
        assert!(!bytes.is_empty());
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}

//! The stored result payload and its codecs.
//!
//! A [`Cutout`] is an RGBA image behind an `Arc`: cheap to hand out on every
//! preview, never mutated after creation, and freed when the last clone
//! drops (store overwrite, take, or sweep).

use std::sync::Arc;

use cutout_types::error::CutoutError;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, RgbaImage};

use crate::store::ResidentSize;

/// Input formats accepted from users.
pub const SUPPORTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// PNG encoder settings for the two delivery paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PngProfile {
    /// Lossless download: fast compression, no filtering.
    Document,
    /// Inline preview: encoder defaults.
    Preview,
}

/// A finished background-removal result.
#[derive(Debug, Clone)]
pub struct Cutout {
    image: Arc<RgbaImage>,
}

impl Cutout {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode as a 4-channel PNG.
    pub fn encode_png(&self, profile: PngProfile) -> Result<Vec<u8>, CutoutError> {
        let (width, height) = self.image.dimensions();
        let mut buf = Vec::with_capacity(self.image.as_raw().len() / 2);

        let encoder = match profile {
            PngProfile::Document => {
                PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::NoFilter)
            }
            PngProfile::Preview => PngEncoder::new(&mut buf),
        };
        encoder
            .write_image(self.image.as_raw(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| CutoutError::Segmentation(format!("png encode failed: {e}")))?;

        Ok(buf)
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::sync::Weak<RgbaImage> {
        Arc::downgrade(&self.image)
    }
}

impl ResidentSize for Cutout {
    fn resident_bytes(&self) -> usize {
        self.image.as_raw().len()
    }
}

/// Decode raw upload bytes, accepting only [`SUPPORTED_FORMATS`].
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, CutoutError> {
    let format = image::guess_format(bytes)
        .map_err(|e| CutoutError::Decode(format!("unrecognized image data: {e}")))?;

    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(CutoutError::Decode(format!("unsupported format {format:?}")));
    }

    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| CutoutError::Decode(format!("{format:?} decode failed: {e}")))
}

#[cfg(test)]
pub(crate) mod test_images {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    /// A solid-background JPEG with a darker square in the middle.
    pub fn opaque_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let inside = x > width / 4 && x < width * 3 / 4 && y > height / 4 && y < height * 3 / 4;
            if inside { Rgb([30, 60, 200]) } else { Rgb([245, 245, 245]) }
        });
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }
}

//! Image transformer: decode, normalize color mode, bound, re-encode as JPEG

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Failed to read image data: {0}")]
    Io(#[from] std::io::Error),

    #[error("Thumbnail task did not complete: {0}")]
    Interrupted(String),
}

pub type Result<T> = std::result::Result<T, TransformError>;

/// Maximum thumbnail size on each axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailBounds {
    pub max_width: u32,
    pub max_height: u32,
}

impl ThumbnailBounds {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width: max_width.max(1),
            max_height: max_height.max(1),
        }
    }

    pub fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    /// Largest size that fits inside the bounds with the source aspect ratio.
    ///
    /// Images already inside the bounds keep their size; nothing is enlarged.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= self.max_width && height <= self.max_height {
            return (width, height);
        }

        let scale = f64::min(
            self.max_width as f64 / width as f64,
            self.max_height as f64 / height as f64,
        );
        let scaled = |edge: u32, limit: u32| ((edge as f64 * scale).round() as u32).clamp(1, limit);

        (
            scaled(width, self.max_width),
            scaled(height, self.max_height),
        )
    }
}

/// Encoded thumbnail plus the geometry that produced it
#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub dropped_alpha: bool,
}

/// Renders JPEG thumbnails within fixed bounds
#[derive(Debug, Clone, Copy)]
pub struct Thumbnailer {
    bounds: ThumbnailBounds,
    quality: u8,
}

impl Thumbnailer {
    pub fn new(bounds: ThumbnailBounds, quality: u8) -> Self {
        Self {
            bounds,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn bounds(&self) -> ThumbnailBounds {
        self.bounds
    }

    /// Decode `data`, shrink it into the bounds and encode it as JPEG.
    ///
    /// CPU-bound; async callers should go through [`Thumbnailer::render_blocking`].
    pub fn render(&self, data: &[u8]) -> Result<Thumbnail> {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
        if reader.format().is_none() {
            return Err(TransformError::UnrecognizedFormat);
        }
        let image = reader.decode().map_err(TransformError::Decode)?;

        let (source_width, source_height) = image.dimensions();
        let (width, height) = self.bounds.fit(source_width, source_height);

        let resized = if (width, height) == (source_width, source_height) {
            image
        } else {
            image.resize_exact(width, height, FilterType::Lanczos3)
        };

        let dropped_alpha = resized.color().has_alpha();
        let opaque = into_jpeg_color(resized);

        let mut buffer = Vec::with_capacity((width * height) as usize);
        let encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
        opaque
            .write_with_encoder(encoder)
            .map_err(TransformError::Encode)?;

        tracing::debug!(
            source_width,
            source_height,
            width,
            height,
            dropped_alpha,
            size = buffer.len(),
            "Thumbnail rendered"
        );

        Ok(Thumbnail {
            bytes: Bytes::from(buffer),
            width,
            height,
            source_width,
            source_height,
            dropped_alpha,
        })
    }

    /// Run [`Thumbnailer::render`] on the blocking thread pool
    pub async fn render_blocking(&self, data: Bytes) -> Result<Thumbnail> {
        let thumbnailer = *self;
        tokio::task::spawn_blocking(move || thumbnailer.render(&data))
            .await
            .map_err(|e| TransformError::Interrupted(e.to_string()))?
    }
}

/// JPEG carries 8-bit gray or RGB only: alpha and high bit depths are dropped
fn into_jpeg_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, ImageFormat, Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    fn transparent_png(width: u32, height: u32) -> Vec<u8> {
        let pixels = RgbaImage::from_fn(width, height, |x, _| Rgba([(x % 255) as u8, 40, 200, 0]));
        encode(DynamicImage::ImageRgba8(pixels), ImageFormat::Png)
    }

    fn decode_jpeg(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).unwrap()
    }

    #[test]
    fn test_fit_landscape() {
        let bounds = ThumbnailBounds::square(300);
        assert_eq!(bounds.fit(1200, 600), (300, 150));
    }

    #[test]
    fn test_fit_portrait_rectangular_bounds() {
        let bounds = ThumbnailBounds::new(200, 100);
        assert_eq!(bounds.fit(400, 1000), (40, 100));
    }

    #[test]
    fn test_fit_never_upscales() {
        let bounds = ThumbnailBounds::square(128);
        assert_eq!(bounds.fit(64, 32), (64, 32));
        assert_eq!(bounds.fit(128, 128), (128, 128));
    }

    #[test]
    fn test_fit_extreme_aspect_keeps_one_pixel() {
        let bounds = ThumbnailBounds::square(100);
        assert_eq!(bounds.fit(10_000, 10), (100, 1));
    }

    #[test]
    fn test_render_drops_alpha() {
        let thumbnailer = Thumbnailer::new(ThumbnailBounds::square(300), DEFAULT_JPEG_QUALITY);
        let thumbnail = thumbnailer.render(&transparent_png(800, 400)).unwrap();

        assert!(thumbnail.dropped_alpha);
        let decoded = decode_jpeg(&thumbnail.bytes);
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!(decoded.dimensions(), (300, 150));
    }

    #[test]
    fn test_render_small_image_keeps_size() {
        let thumbnailer = Thumbnailer::new(ThumbnailBounds::square(300), DEFAULT_JPEG_QUALITY);
        let source = encode(
            DynamicImage::ImageRgb8(image::RgbImage::new(120, 80)),
            ImageFormat::Png,
        );

        let thumbnail = thumbnailer.render(&source).unwrap();

        assert!(!thumbnail.dropped_alpha);
        assert_eq!((thumbnail.width, thumbnail.height), (120, 80));
        assert_eq!(decode_jpeg(&thumbnail.bytes).dimensions(), (120, 80));
    }

    #[test]
    fn test_render_sixteen_bit_gray() {
        let thumbnailer = Thumbnailer::new(ThumbnailBounds::square(64), DEFAULT_JPEG_QUALITY);
        let source = encode(
            DynamicImage::ImageLuma16(image::ImageBuffer::new(256, 128)),
            ImageFormat::Png,
        );

        let thumbnail = thumbnailer.render(&source).unwrap();

        let decoded = decode_jpeg(&thumbnail.bytes);
        assert_eq!(decoded.color(), ColorType::L8);
        assert_eq!(decoded.dimensions(), (64, 32));
    }

    #[test]
    fn test_render_rejects_garbage() {
        let thumbnailer = Thumbnailer::new(ThumbnailBounds::square(300), DEFAULT_JPEG_QUALITY);
        let result = thumbnailer.render(b"definitely not an image");
        assert!(matches!(result, Err(TransformError::UnrecognizedFormat)));
    }

    #[test]
    fn test_render_rejects_truncated_png() {
        let thumbnailer = Thumbnailer::new(ThumbnailBounds::square(300), DEFAULT_JPEG_QUALITY);
        let png = transparent_png(64, 64);
        let result = thumbnailer.render(&png[..png.len() / 2]);
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }

    #[tokio::test]
    async fn test_render_blocking() {
        let thumbnailer = Thumbnailer::new(ThumbnailBounds::square(50), 90);
        let thumbnail = thumbnailer
            .render_blocking(Bytes::from(transparent_png(100, 100)))
            .await
            .unwrap();
        assert_eq!((thumbnail.width, thumbnail.height), (50, 50));
    }
}

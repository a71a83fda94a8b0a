//! Image previews: decode, downscale to the target width, encode as JPEG.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

pub struct ImageThumbnailer;

impl ImageThumbnailer {
    /// Render a JPEG preview `width` pixels wide. Images narrower than `width` are
    /// re-encoded without upscaling. CPU bound; call from `spawn_blocking`.
    pub fn render(data: &[u8], width: u32, quality: u8) -> Result<Bytes, anyhow::Error> {
        let img = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()?;

        let resized = Self::resize_to_width(&img, width);

        // JPEG has no alpha channel
        let rgb = resized.to_rgb8();
        let (w, h) = rgb.dimensions();
        let mut buffer = Vec::with_capacity((w * h) as usize / 4);
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder.encode_image(&rgb)?;

        Ok(Bytes::from(buffer))
    }

    fn resize_to_width(img: &DynamicImage, width: u32) -> DynamicImage {
        let (src_w, src_h) = img.dimensions();
        if src_w <= width || src_w == 0 {
            return img.clone();
        }
        let height = ((src_h as u64 * width as u64) / src_w as u64).max(1) as u32;
        img.resize_exact(width, height, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([200, 30, 30, 128]),
        ));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[test]
    fn test_render_downscales_to_width() {
        let preview = ImageThumbnailer::render(&png(640, 480), 320, 85).unwrap();
        let decoded = image::load_from_memory(&preview).unwrap();
        assert_eq!(decoded.dimensions(), (320, 240));
        assert_eq!(
            image::guess_format(&preview).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_render_does_not_upscale() {
        let preview = ImageThumbnailer::render(&png(100, 50), 320, 85).unwrap();
        let decoded = image::load_from_memory(&preview).unwrap();
        assert_eq!(decoded.dimensions(), (100, 50));
    }

    #[test]
    fn test_render_rejects_garbage() {
        assert!(ImageThumbnailer::render(b"definitely not an image", 320, 85).is_err());
    }
}

//! Conversion des pochettes en vignettes WebP carrées

use crate::error::CoverError;
use image::{DynamicImage, imageops::FilterType};
use webp::{Encoder, WebPMemory};

pub fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>, CoverError> {
    let rgba = img.to_rgba8();
    let encoder = Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
    let webp_data: WebPMemory = encoder.encode(85.0);
    Ok(webp_data.to_vec())
}

/// Redimensionne `img` pour qu'il tienne dans un carré `size`×`size`,
/// centré sur fond transparent
pub fn ensure_square(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = (img.width().max(1), img.height().max(1));

    let scale = size as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * scale) as u32).clamp(1, size);
    let new_height = ((height as f32 * scale) as u32).clamp(1, size);

    let resized = img.resize_exact(new_width, new_height, FilterType::Lanczos3);

    let mut square = DynamicImage::new_rgba8(size, size);
    let x = (size - new_width) / 2;
    let y = (size - new_height) / 2;
    image::imageops::overlay(&mut square, &resized, x.into(), y.into());

    square
}

/// Décode `original` et produit la vignette WebP `size`×`size` (bloquant)
pub fn render_variant(original: &[u8], size: u32) -> Result<Vec<u8>, CoverError> {
    let img = image::load_from_memory(original)?;
    encode_webp(&ensure_square(&img, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn square_keeps_aspect_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let square = ensure_square(&img, 64);
        assert_eq!((square.width(), square.height()), (64, 64));
    }

    #[test]
    fn variant_is_webp() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(30, 50))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let webp = render_variant(&png, 32).unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[test]
    fn garbage_is_an_image_error() {
        assert!(matches!(render_variant(b"nope", 32), Err(CoverError::Image(_))));
    }
}

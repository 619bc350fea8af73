use image::imageops::FilterType;
use ndarray::Array4;

/// Converts an uploaded image of any source format into the fixed-shape
/// input tensor the classifier expects.
///
/// Output shape is `(1, height, width, 3)` — a single-sample batch in HWC
/// order — with pixel values scaled from [0, 255] to [0.0, 1.0]. Grayscale
/// inputs are replicated across the three channels by the RGB conversion.
#[derive(Debug, Clone, Copy)]
pub struct ImageNormalizer {
    height: u32,
    width: u32,
}

impl ImageNormalizer {
    pub fn new(size: u32) -> Self {
        Self {
            height: size,
            width: size,
        }
    }

    pub fn normalize(&self, bytes: &[u8]) -> Result<Array4<f32>, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        let resized = img.resize_exact(self.width, self.height, FilterType::Triangle);
        let rgb = resized.to_rgb8();

        let (h, w) = (self.height as usize, self.width as usize);
        let mut tensor = Array4::<f32>::zeros((1, h, w, 3));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = f32::from(pixel[c]) / 255.0;
            }
        }
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn white_grayscale_png_becomes_all_ones_tensor() {
        let png = encode_png(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            10,
            10,
            Luma([255u8]),
        )));

        let tensor = ImageNormalizer::new(128).normalize(&png).expect("decode");

        assert_eq!(tensor.shape(), &[1, 128, 128, 3]);
        assert!(tensor.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn rgb_of_arbitrary_size_normalizes_to_configured_shape_in_unit_range() {
        let img = RgbImage::from_fn(37, 63, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let png = encode_png(DynamicImage::ImageRgb8(img));

        let tensor = ImageNormalizer::new(128).normalize(&png).expect("decode");

        assert_eq!(tensor.shape(), &[1, 128, 128, 3]);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn grayscale_channels_are_replicated_not_synthesized() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 13 + y * 7) as u8]));
        let png = encode_png(DynamicImage::ImageLuma8(img));

        let tensor = ImageNormalizer::new(32).normalize(&png).expect("decode");

        for row in 0..32 {
            for col in 0..32 {
                let r = tensor[[0, row, col, 0]];
                let g = tensor[[0, row, col, 1]];
                let b = tensor[[0, row, col, 2]];
                assert_eq!(r, g);
                assert_eq!(g, b);
            }
        }
    }

    #[test]
    fn undecodable_bytes_are_rejected() {
        let err = ImageNormalizer::new(128).normalize(b"not-an-image");
        assert!(err.is_err());
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(ImageNormalizer::new(128).normalize(&[]).is_err());
    }
}

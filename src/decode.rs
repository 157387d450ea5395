//! Loading reference and test renders into linear-light RGB.
//!
//! Integer formats (PNG, JPEG, TIFF, ...) are assumed to carry sRGB-encoded
//! values and are linearized. Float formats (OpenEXR, Radiance HDR) are already
//! linear and kept as-is, including values above 1. Alpha is dropped.
//!
//! # Example
//!
//! ```ignore
//! use flip_batch::decode::load_linear_rgb;
//!
//! let reference = load_linear_rgb("dump/ref/scene.png".as_ref())?;
//! println!("{}x{}", reference.width(), reference.height());
//! ```

use std::path::Path;

use image::DynamicImage;
use imgref::ImgVec;
use rgb::RGB;

use crate::error::{Error, Result};
use crate::metrics::color::srgb_to_linear;

/// Decode an image file into linear RGB.
///
/// # Errors
///
/// [`Error::FileNotFound`] if `path` does not exist, and
/// [`Error::UnreadableImage`] if it cannot be decoded.
pub fn load_linear_rgb(path: &Path) -> Result<ImgVec<RGB<f32>>> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let image = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            Error::FileNotFound {
                path: path.to_path_buf(),
            }
        }
        other => Error::UnreadableImage {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    })?;

    Ok(to_linear_rgb(&image))
}

/// Convert a decoded image to linear RGB.
#[must_use]
pub fn to_linear_rgb(image: &DynamicImage) -> ImgVec<RGB<f32>> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let is_linear = matches!(
        image,
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_)
    );

    let raw = image.to_rgb32f().into_raw();
    let pixels: Vec<RGB<f32>> = raw
        .chunks_exact(3)
        .map(|c| {
            if is_linear {
                RGB::new(c[0], c[1], c[2])
            } else {
                RGB::new(srgb_to_linear(c[0]), srgb_to_linear(c[1]), srgb_to_linear(c[2]))
            }
        })
        .collect();

    ImgVec::new(pixels, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_missing_file() {
        let result = load_linear_rgb(Path::new("/nonexistent/flip-batch/missing.png"));
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let result = load_linear_rgb(&path);
        assert!(matches!(result, Err(Error::UnreadableImage { .. })));
    }

    #[test]
    fn test_png_is_linearized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        RgbImage::from_pixel(3, 2, Rgb([255, 128, 0])).save(&path).unwrap();

        let img = load_linear_rgb(&path).unwrap();
        assert_eq!(img.width(), 3);
        assert_eq!(img.height(), 2);
        let p = img.pixels().next().unwrap();
        assert!((p.r - 1.0).abs() < 1e-6);
        assert!((p.g - srgb_to_linear(128.0 / 255.0)).abs() < 1e-5);
        assert!(p.g < 0.25, "128 should linearize to ~0.216, got {}", p.g);
        assert_eq!(p.b, 0.0);
    }

    #[test]
    fn test_float_image_kept_linear() {
        let buf = image::Rgb32FImage::from_pixel(2, 2, Rgb([4.0, 0.5, 0.25]));
        let img = to_linear_rgb(&DynamicImage::ImageRgb32F(buf));
        let p = img.pixels().next().unwrap();
        assert_eq!((p.r, p.g, p.b), (4.0, 0.5, 0.25));
    }
}

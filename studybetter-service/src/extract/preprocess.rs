//! Image preprocessing ahead of OCR.
//!
//! Mirrors what a human would do before feeding a noisy scan to an OCR
//! engine: flatten to luminance, exaggerate contrast and edge sharpness,
//! then knock down salt-and-pepper scan noise with a small median filter.
//! Every step is best-effort; a failure anywhere returns the input
//! unchanged rather than aborting the surrounding extraction.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{box_filter, median_filter};

/// Fixed contrast multiplier applied around the mean luminance.
const CONTRAST_FACTOR: f32 = 2.0;

/// Fixed sharpness multiplier applied against a 3x3 box-smoothed copy.
const SHARPNESS_FACTOR: f32 = 2.0;

/// Prepare an image for OCR. Deterministic, no per-image adaptation.
pub fn prepare_for_ocr(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();

    let contrasted = enhance_contrast(&gray, CONTRAST_FACTOR);
    let sharpened = enhance_sharpness(&contrasted, SHARPNESS_FACTOR);

    // Radius 1 gives the 3x3 window.
    median_filter(&sharpened, 1, 1)
}

/// Scale pixel distance from the image-wide mean luminance by `factor`.
fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let pixel_count = (image.width() as u64) * (image.height() as u64);
    if pixel_count == 0 {
        return image.clone();
    }

    let sum: u64 = image.pixels().map(|p| p.0[0] as u64).sum();
    let mean = sum as f32 / pixel_count as f32;

    map_pixels(image, |value| mean + (value - mean) * factor)
}

/// Extrapolate away from a smoothed copy: `out = smooth + (orig - smooth) * factor`.
fn enhance_sharpness(image: &GrayImage, factor: f32) -> GrayImage {
    if image.width() < 3 || image.height() < 3 {
        return image.clone();
    }

    let smoothed = box_filter(image, 1, 1);

    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let original = pixel.0[0] as f32;
        let smooth = smoothed.get_pixel(x, y).0[0] as f32;
        let value = smooth + (original - smooth) * factor;
        *pixel = Luma([value.clamp(0.0, 255.0) as u8]);
    }
    out
}

fn map_pixels(image: &GrayImage, f: impl Fn(f32) -> f32) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = f(pixel.0[0] as f32);
        *pixel = Luma([value.clamp(0.0, 255.0) as u8]);
    }
    out
}

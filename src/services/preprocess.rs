//! Binarization of photographed handwriting pages ahead of OCR.
//!
//! The steps run in a fixed order; the threshold in step 6 is tuned for the
//! output of steps 1-5, so reordering them changes what it means.

use std::io::Cursor;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};

use crate::services::errors::PipelineError;

const BRIGHTNESS_FACTOR: f32 = 2.7;
const CONTRAST_FACTOR: f32 = 100.0;
const SHARPEN_KERNEL: [[i32; 3]; 3] = [[-2, -2, -2], [-2, 32, -2], [-2, -2, -2]];
const SHARPEN_SCALE: i32 = 16;
const STRETCH_GAIN: i32 = 3;
const MID_GRAY: i32 = 128;
const BINARY_THRESHOLD: u8 = 180;

/// Decodes `bytes`, runs the binarization chain and returns a grayscale PNG.
pub fn preprocess(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| PipelineError::Decode(format!("unsupported or corrupt image: {err}")))?;
    let binary = binarize(decoded.to_rgb8());
    encode_png(binary)
}

pub(crate) fn binarize(rgb: RgbImage) -> GrayImage {
    let brightened = enhance_brightness(rgb, BRIGHTNESS_FACTOR);
    let contrasted = enhance_contrast(brightened, CONTRAST_FACTOR);
    let sharpened = sharpen(&contrasted);

    let mut gray = luminance(&sharpened);
    stretch_contrast(&mut gray);
    threshold_inverted(&mut gray, BINARY_THRESHOLD);

    let mut dilated = dilate_2x2(&gray);
    image::imageops::invert(&mut dilated);
    dilated
}

fn encode_png(image: GrayImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|err| PipelineError::Decode(format!("failed to encode binarized page: {err}")))?;
    Ok(buf)
}

/// Clip then truncate, as the extrapolating blend does.
fn clip_u8(value: f32) -> u8 {
    if value <= 0.0 {
        0
    } else if value >= 255.0 {
        255
    } else {
        value as u8
    }
}

/// Blend towards black: every channel scaled by `factor`.
fn enhance_brightness(mut image: RgbImage, factor: f32) -> RgbImage {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = clip_u8(f32::from(*channel) * factor);
        }
    }
    image
}

/// Blend against a flat image at the mean luminance.
fn enhance_contrast(mut image: RgbImage, factor: f32) -> RgbImage {
    let mean = mean_luminance(&image);
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = clip_u8(mean + factor * (f32::from(*channel) - mean));
        }
    }
    image
}

fn mean_luminance(image: &RgbImage) -> f32 {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return 0.0;
    }
    let total: u64 = image.pixels().map(|pixel| u64::from(luma_of(pixel))).sum();
    (total as f64 / count as f64).round() as f32
}

/// ITU-R 601-2 luma in 16-bit fixed point.
fn luma_of(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let weighted = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
    (weighted >> 16) as u8
}

/// 3x3 sharpen of the interior; the outermost rows and columns are copied
/// through unchanged.
fn sharpen(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0i32; 3];
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let source = image.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for (channel, sum) in acc.iter_mut().enumerate() {
                        *sum += weight * i32::from(source.0[channel]);
                    }
                }
            }
            let sharpened = acc.map(|sum| {
                let scaled = (sum + SHARPEN_SCALE / 2).div_euclid(SHARPEN_SCALE);
                scaled.clamp(0, 255) as u8
            });
            out.put_pixel(x, y, Rgb(sharpened));
        }
    }
    out
}

fn luminance(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| Luma([luma_of(image.get_pixel(x, y))]))
}

fn stretch_contrast(image: &mut GrayImage) {
    for pixel in image.pixels_mut() {
        let value = STRETCH_GAIN * (i32::from(pixel.0[0]) - MID_GRAY) + MID_GRAY;
        pixel.0[0] = value.clamp(0, 255) as u8;
    }
}

/// Ink (dark) becomes 255, paper becomes 0.
fn threshold_inverted(image: &mut GrayImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > threshold { 0 } else { 255 };
    }
}

/// 2x2 max filter anchored at the lower-right kernel cell, so a foreground
/// pixel also lights up its right, lower and lower-right neighbours.
fn dilate_2x2(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let mut value = image.get_pixel(x, y).0[0];
        if x > 0 {
            value = value.max(image.get_pixel(x - 1, y).0[0]);
        }
        if y > 0 {
            value = value.max(image.get_pixel(x, y - 1).0[0]);
        }
        if x > 0 && y > 0 {
            value = value.max(image.get_pixel(x - 1, y - 1).0[0]);
        }
        Luma([value])
    })
}

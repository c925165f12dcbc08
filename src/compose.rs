//! Frame visualizations built from a saliency map.
//!
//! All three outputs use the same convention: confidence 1.0 is foreground.

use clap::ValueEnum;
use image::{DynamicImage, Luma, Rgb, RgbImage, RgbaImage};
use imageproc::map::map_colors;

use crate::errors::{Result, SalientError};
use crate::traits::SaliencyMap;

/// Chroma-key fill behind the foreground in `green` output.
pub const GREEN_BACKGROUND: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputKind {
    /// Grayscale confidence map.
    Map,
    /// Original pixels with confidence as the alpha channel.
    Rgba,
    /// Foreground composited over a green background.
    Green,
}

fn ensure_same_size(frame: &RgbImage, pred: &SaliencyMap) -> Result<()> {
    if frame.dimensions() != pred.dimensions() {
        let (width, height) = frame.dimensions();
        let (pred_width, pred_height) = pred.dimensions();
        return Err(SalientError::DimensionMismatch {
            width,
            height,
            pred_width,
            pred_height,
        });
    }
    Ok(())
}

fn level(confidence: f32) -> u8 {
    (confidence.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn blend(foreground: u8, background: u8, alpha: f32) -> u8 {
    (f32::from(foreground) * alpha + f32::from(background) * (1.0 - alpha)).round() as u8
}

/// Confidence replicated into the three channels of a grayscale image.
pub fn saliency_map(pred: &SaliencyMap) -> RgbImage {
    map_colors(pred, |Luma([confidence])| {
        let gray = level(confidence);
        Rgb([gray, gray, gray])
    })
}

/// Original pixels with the confidence written into the alpha channel.
pub fn rgba_cutout(frame: &RgbImage, pred: &SaliencyMap) -> Result<RgbaImage> {
    ensure_same_size(frame, pred)?;
    let pixels = frame
        .pixels()
        .zip(pred.pixels())
        .flat_map(|(&Rgb([red, green, blue]), &Luma([confidence]))| {
            [red, green, blue, level(confidence)]
        })
        .collect();
    RgbaImage::from_raw(frame.width(), frame.height(), pixels).ok_or_else(|| {
        SalientError::ImageProcessing {
            path: "in-memory frame".to_string(),
            operation: "assemble rgba cutout".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "pixel buffer size mismatch",
            )),
        }
    })
}

/// Per-pixel linear blend between the frame and the green background, with
/// the confidence as the mixing weight.
pub fn green_screen(frame: &RgbImage, pred: &SaliencyMap) -> Result<RgbImage> {
    ensure_same_size(frame, pred)?;
    let Rgb([bg_red, bg_green, bg_blue]) = GREEN_BACKGROUND;
    let pixels = frame
        .pixels()
        .zip(pred.pixels())
        .flat_map(|(&Rgb([red, green, blue]), &Luma([confidence]))| {
            let alpha = confidence.clamp(0.0, 1.0);
            [
                blend(red, bg_red, alpha),
                blend(green, bg_green, alpha),
                blend(blue, bg_blue, alpha),
            ]
        })
        .collect();
    RgbImage::from_raw(frame.width(), frame.height(), pixels).ok_or_else(|| {
        SalientError::ImageProcessing {
            path: "in-memory frame".to_string(),
            operation: "assemble green screen".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "pixel buffer size mismatch",
            )),
        }
    })
}

/// Compose the requested visualization for one frame.
pub fn render(kind: OutputKind, frame: &RgbImage, pred: &SaliencyMap) -> Result<DynamicImage> {
    ensure_same_size(frame, pred)?;
    Ok(match kind {
        OutputKind::Map => DynamicImage::ImageRgb8(saliency_map(pred)),
        OutputKind::Rgba => DynamicImage::ImageRgba8(rgba_cutout(frame, pred)?),
        OutputKind::Green => DynamicImage::ImageRgb8(green_screen(frame, pred)?),
    })
}

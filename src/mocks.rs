use image::{Luma, RgbImage};

use crate::errors::Result;
use crate::traits::{SaliencyMap, SaliencyModel};

/// Session-free model that reports every pixel at the same confidence.
///
/// Lets the pipeline, the tiled predictor, and the compositors be exercised
/// without weights on disk.
#[derive(Debug, Clone)]
pub struct ConstantSaliency {
    pub input_size: u32,
    pub confidence: f32,
}

impl ConstantSaliency {
    pub const fn new(input_size: u32, confidence: f32) -> Self {
        Self {
            input_size,
            confidence,
        }
    }
}

impl SaliencyModel for ConstantSaliency {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict_map(&self, image: &RgbImage) -> Result<SaliencyMap> {
        let (width, height) = image.dimensions();
        Ok(SaliencyMap::from_pixel(
            width,
            height,
            Luma([self.confidence]),
        ))
    }
}

/// Model that marks the brighter half of each frame as foreground.
///
/// Useful when a test needs spatial structure in the prediction, e.g. to see
/// both composited regions in one output.
#[derive(Debug, Clone)]
pub struct BrightnessSplit {
    pub input_size: u32,
    pub threshold: u8,
}

impl BrightnessSplit {
    pub const fn new(input_size: u32, threshold: u8) -> Self {
        Self {
            input_size,
            threshold,
        }
    }
}

impl SaliencyModel for BrightnessSplit {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict_map(&self, image: &RgbImage) -> Result<SaliencyMap> {
        let (width, height) = image.dimensions();
        let mut map = SaliencyMap::new(width, height);
        for (x, y, pixel) in map.enumerate_pixels_mut() {
            let rgb = image.get_pixel(x, y).0;
            let brightness = rgb.iter().map(|&c| u16::from(c)).sum::<u16>() / 3;
            pixel.0[0] = if brightness >= u16::from(self.threshold) {
                1.0
            } else {
                0.0
            };
        }
        Ok(map)
    }
}

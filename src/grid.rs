use image::{imageops, RgbImage};
use ndarray::Array2;
use tracing::debug;

use crate::config::ResizeConfig;
use crate::errors::Result;
use crate::traits::{SaliencyMap, SaliencyModel};

/// How a frame is fitted onto the square model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Aspect-preserving letterbox. `base` is used when the graph does not
    /// declare a static input edge.
    Dynamic { base: u32 },
    /// Stretch the frame to `size` x `size`, ignoring aspect ratio.
    Fixed { size: u32 },
}

impl ResizePolicy {
    pub fn from_flags(fix: bool, resize: &ResizeConfig) -> Self {
        if fix {
            Self::Fixed {
                size: resize.fixed_size,
            }
        } else {
            Self::Dynamic {
                base: resize.base_size,
            }
        }
    }
}

/// Tiled inference for frames larger than the model input.
///
/// The frame is covered with overlapping tiles of the model's input edge.
/// Each tile is predicted independently and the per-pixel results are blended
/// with a raised-cosine weight, so tile seams do not show in the output.
pub struct GridPredictor<M> {
    inner: M,
    overlap: f32,
}

impl<M: SaliencyModel> GridPredictor<M> {
    pub fn new(inner: M, overlap: f32) -> Self {
        Self {
            inner,
            overlap: overlap.clamp(0.0, 0.9),
        }
    }
}

/// Tile origins covering `[0, extent)`. The final tile is shifted flush with
/// the edge instead of spilling past it.
fn tile_starts(extent: u32, tile: u32, stride: u32) -> Vec<u32> {
    if extent <= tile {
        return vec![0];
    }
    let mut starts = Vec::new();
    let mut x = 0;
    loop {
        if x + tile >= extent {
            starts.push(extent - tile);
            break;
        }
        starts.push(x);
        x += stride;
    }
    starts
}

/// Raised-cosine weights along one axis, kept strictly positive so pixels at
/// the frame border never end up with zero total weight.
fn hann_axis(n: u32) -> Vec<f32> {
    let n = n as usize;
    if n <= 1 {
        return vec![1.0; n.max(1)];
    }
    (0..n)
        .map(|i| {
            let theta = 2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32;
            (0.5 * (1.0 - theta.cos())).max(1e-3)
        })
        .collect()
}

fn hann_window(width: u32, height: u32) -> Array2<f32> {
    let wx = hann_axis(width);
    let wy = hann_axis(height);
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| wy[y] * wx[x])
}

impl<M: SaliencyModel> SaliencyModel for GridPredictor<M> {
    fn input_size(&self) -> u32 {
        self.inner.input_size()
    }

    fn predict_map(&self, image: &RgbImage) -> Result<SaliencyMap> {
        let tile = self.inner.input_size();
        let (width, height) = image.dimensions();
        if width <= tile && height <= tile {
            return self.inner.predict_map(image);
        }

        let stride = ((tile as f32) * (1.0 - self.overlap)).round().max(1.0) as u32;
        let tile_w = tile.min(width);
        let tile_h = tile.min(height);
        let xs = tile_starts(width, tile_w, stride);
        let ys = tile_starts(height, tile_h, stride);
        debug!(width, height, tile_w, tile_h, tiles = xs.len() * ys.len(), "tiled prediction");

        let mut acc = Array2::<f32>::zeros((height as usize, width as usize));
        let mut weight = Array2::<f32>::zeros((height as usize, width as usize));
        let window = hann_window(tile_w, tile_h);

        for &y in &ys {
            for &x in &xs {
                let patch = imageops::crop_imm(image, x, y, tile_w, tile_h).to_image();
                let pred = self.inner.predict_map(&patch)?;
                for (px, py, pixel) in pred.enumerate_pixels() {
                    let w = window[[py as usize, px as usize]];
                    let gy = (y + py) as usize;
                    let gx = (x + px) as usize;
                    acc[[gy, gx]] += pixel.0[0] * w;
                    weight[[gy, gx]] += w;
                }
            }
        }

        let mut blended = SaliencyMap::new(width, height);
        for (x, y, pixel) in blended.enumerate_pixels_mut() {
            let w = weight[[y as usize, x as usize]];
            if w > 0.0 {
                pixel.0[0] = (acc[[y as usize, x as usize]] / w).clamp(0.0, 1.0);
            }
        }
        Ok(blended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ConstantSaliency;
    use image::Rgb;

    #[test]
    fn starts_cover_the_extent_and_end_flush() {
        let starts = tile_starts(800, 384, 192);
        assert_eq!(starts.first(), Some(&0));
        assert_eq!(starts.last(), Some(&416));
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] <= 384, "gap between {} and {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn small_extent_is_a_single_tile() {
        assert_eq!(tile_starts(100, 384, 192), vec![0]);
        assert_eq!(tile_starts(384, 384, 192), vec![0]);
    }

    #[test]
    fn exact_multiple_has_no_duplicate_final_start() {
        let starts = tile_starts(768, 384, 192);
        assert_eq!(starts, vec![0, 192, 384]);
    }

    #[test]
    fn hann_weights_are_positive_and_symmetric() {
        let weights = hann_axis(33);
        assert!(weights.iter().all(|&w| w > 0.0));
        for i in 0..weights.len() {
            let mirrored = weights[weights.len() - 1 - i];
            assert!((weights[i] - mirrored).abs() < 1e-6);
        }
        let center = weights[16];
        assert!(weights.iter().all(|&w| w <= center));
    }

    #[test]
    fn blending_preserves_a_constant_prediction() {
        let grid = GridPredictor::new(ConstantSaliency::new(32, 0.6), 0.5);
        let image = RgbImage::from_pixel(100, 70, Rgb([40, 40, 40]));
        let map = grid.predict_map(&image).unwrap();
        assert_eq!(map.dimensions(), (100, 70));
        assert!(map.pixels().all(|p| (p.0[0] - 0.6).abs() < 1e-4));
    }

    #[test]
    fn frames_within_one_tile_bypass_tiling() {
        let grid = GridPredictor::new(ConstantSaliency::new(64, 0.25), 0.5);
        let image = RgbImage::from_pixel(48, 32, Rgb([0, 0, 0]));
        let map = grid.predict_map(&image).unwrap();
        assert_eq!(map.dimensions(), (48, 32));
        assert!(map.pixels().all(|p| (p.0[0] - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn thin_frames_tile_along_one_axis_only() {
        let grid = GridPredictor::new(ConstantSaliency::new(32, 0.9), 0.25);
        let image = RgbImage::from_pixel(120, 16, Rgb([0, 0, 0]));
        let map = grid.predict_map(&image).unwrap();
        assert_eq!(map.dimensions(), (120, 16));
        assert!(map.pixels().all(|p| (p.0[0] - 0.9).abs() < 1e-4));
    }
}

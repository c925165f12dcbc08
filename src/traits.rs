use image::{ImageBuffer, Luma, RgbImage};

use crate::errors::Result;

/// Per-pixel foreground confidence in `[0, 1]`, at the resolution of the
/// frame it was predicted for.
pub type SaliencyMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Abstraction over the saliency network.
///
/// The pipeline and the tiled predictor depend on this seam instead of a
/// concrete session, so tests can run without weights.
pub trait SaliencyModel: Send + Sync {
    /// Edge length of the square tensor fed to the network.
    fn input_size(&self) -> u32;

    /// Predict the saliency map for one frame.
    ///
    /// The returned map always has the frame's dimensions.
    fn predict_map(&self, image: &RgbImage) -> Result<SaliencyMap>;
}

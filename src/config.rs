use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{Result, SalientError};

/// Settings file contents. Every field has a default, so an empty file (or a
/// partial one) still yields a usable configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub webcam: WebcamConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// Display name, also used as the preview window title.
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Directory holding the exported weights (`latest.onnx`).
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// Graph input tensor name.
    #[serde(default = "default_input_name")]
    pub input_name: String,
    /// Graph output tensor name.
    #[serde(default = "default_output_name")]
    pub output_name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InferenceConfig {
    #[serde(default)]
    pub resize: ResizeConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ResizeConfig {
    /// Long-edge target when the graph does not declare a static input size.
    #[serde(default = "default_base_size")]
    pub base_size: u32,
    /// Edge length used by the distorting fixed-size policy.
    #[serde(default = "default_fixed_size")]
    pub fixed_size: u32,
    /// Fraction of a tile shared with its neighbor during tiled inference.
    /// Valid range `[0, 0.9]`, matching what the tile blender accepts.
    #[serde(default = "default_tile_overlap")]
    pub tile_overlap: f32,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct NormalizeConfig {
    /// Per-channel RGB mean, ImageNet statistics by default.
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    /// Per-channel RGB standard deviation.
    #[serde(default = "default_std")]
    pub std: [f32; 3],
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct WebcamConfig {
    #[serde(default = "default_webcam_width")]
    pub width: u32,
    #[serde(default = "default_webcam_height")]
    pub height: u32,
    #[serde(default = "default_webcam_fps")]
    pub fps: f64,
}

fn default_model_name() -> String {
    "InSPyReNet".to_string()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_input_name() -> String {
    "image".to_string()
}

fn default_output_name() -> String {
    "pred".to_string()
}

const fn default_base_size() -> u32 {
    384
}

const fn default_fixed_size() -> u32 {
    384
}

const fn default_tile_overlap() -> f32 {
    0.5
}

const fn default_mean() -> [f32; 3] {
    [0.485, 0.456, 0.406]
}

const fn default_std() -> [f32; 3] {
    [0.229, 0.224, 0.225]
}

const fn default_webcam_width() -> u32 {
    1280
}

const fn default_webcam_height() -> u32 {
    720
}

const fn default_webcam_fps() -> f64 {
    30.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            inference: InferenceConfig::default(),
            webcam: WebcamConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            checkpoint_dir: default_checkpoint_dir(),
            input_name: default_input_name(),
            output_name: default_output_name(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            resize: ResizeConfig::default(),
            normalize: NormalizeConfig::default(),
        }
    }
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            base_size: default_base_size(),
            fixed_size: default_fixed_size(),
            tile_overlap: default_tile_overlap(),
        }
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            mean: default_mean(),
            std: default_std(),
        }
    }
}

impl Default for WebcamConfig {
    fn default() -> Self {
        Self {
            width: default_webcam_width(),
            height: default_webcam_height(),
            fps: default_webcam_fps(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| SalientError::FileSystem {
            path: path.to_path_buf(),
            operation: "read settings file".to_string(),
            source,
        })?;
        Self::from_str_contents(&raw)
    }

    pub fn from_str_contents(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.inference.resize.base_size == 0 {
            return Err(SalientError::Validation {
                field: "inference.resize.base_size".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.inference.resize.fixed_size == 0 {
            return Err(SalientError::Validation {
                field: "inference.resize.fixed_size".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        let overlap = self.inference.resize.tile_overlap;
        if !(0.0..=0.9).contains(&overlap) {
            return Err(SalientError::Validation {
                field: "inference.resize.tile_overlap".to_string(),
                reason: format!("{overlap} is outside [0, 0.9]"),
            });
        }
        if self.inference.normalize.std.iter().any(|&s| s == 0.0) {
            return Err(SalientError::Validation {
                field: "inference.normalize.std".to_string(),
                reason: "contains a zero component".to_string(),
            });
        }
        if self.webcam.width == 0 || self.webcam.height == 0 {
            return Err(SalientError::Validation {
                field: "webcam".to_string(),
                reason: "capture size must be positive".to_string(),
            });
        }
        if self.webcam.fps <= 0.0 {
            return Err(SalientError::Validation {
                field: "webcam.fps".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the exported weights inside the checkpoint directory.
    pub fn weights_path(&self) -> PathBuf {
        self.model.checkpoint_dir.join("latest.onnx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_fall_back_to_defaults() {
        let config = Config::from_str_contents("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.inference.resize.base_size, 384);
        assert_eq!(config.model.input_name, "image");
    }

    #[test]
    fn partial_settings_keep_unrelated_defaults() {
        let raw = "model:\n  checkpoint_dir: snapshots/swinb\ninference:\n  resize:\n    base_size: 512\n";
        let config = Config::from_str_contents(raw).unwrap();
        assert_eq!(config.model.checkpoint_dir, PathBuf::from("snapshots/swinb"));
        assert_eq!(config.inference.resize.base_size, 512);
        assert_eq!(config.inference.resize.fixed_size, 384);
        assert_eq!(config.webcam.width, 1280);
    }

    #[test]
    fn weights_path_is_under_checkpoint_dir() {
        let config = Config::default();
        assert_eq!(config.weights_path(), PathBuf::from("snapshots/latest.onnx"));
    }

    #[test]
    fn zero_std_component_is_rejected() {
        let raw = "inference:\n  normalize:\n    std: [0.0, 0.224, 0.225]\n";
        let err = Config::from_str_contents(raw).unwrap_err();
        assert!(matches!(err, SalientError::Validation { .. }));
    }

    #[test]
    fn overlap_beyond_the_blend_range_is_rejected() {
        let raw = "inference:\n  resize:\n    tile_overlap: 0.95\n";
        assert!(Config::from_str_contents(raw).is_err());
        let raw = "inference:\n  resize:\n    tile_overlap: 1.0\n";
        assert!(Config::from_str_contents(raw).is_err());
    }

    #[test]
    fn overlap_at_the_blend_cap_is_accepted() {
        let raw = "inference:\n  resize:\n    tile_overlap: 0.9\n";
        let config = Config::from_str_contents(raw).unwrap();
        assert_eq!(config.inference.resize.tile_overlap, 0.9);
    }

    #[test]
    fn malformed_yaml_is_a_configuration_error() {
        let err = Config::from_str_contents("model: [").unwrap_err();
        assert!(matches!(err, SalientError::Configuration { .. }));
    }
}

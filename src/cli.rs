use std::path::PathBuf;

use clap::Parser;
use image::ImageFormat;

use crate::compose::OutputKind;
use crate::errors::{Result, SalientError};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file
    #[arg(short, long, default_value = "configs/default.yaml")]
    pub config: PathBuf,

    /// Image file, image directory, video file, video directory, or webcam index
    #[arg(short, long)]
    pub source: String,

    /// Visualization written for each frame
    #[arg(short = 't', long = "type", value_enum, default_value = "map")]
    pub output_type: OutputKind,

    /// Tile large inputs and blend overlapping predictions
    #[arg(long, default_value_t = false)]
    pub grid: bool,

    /// Distorting fixed-size resize instead of aspect-preserving
    #[arg(long, default_value_t = false)]
    pub fix: bool,

    /// Register TensorRT/CUDA execution providers
    #[arg(long, default_value_t = false)]
    pub gpu: bool,

    /// Progress bars and debug logging
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Output extension for image sources
    #[arg(short, long, default_value = "png", value_parser = check_format)]
    pub format: String,

    /// GPU ordinal passed to the execution providers
    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,
}

impl Args {
    /// Flag combinations clap cannot express: the cutout needs an alpha
    /// channel, so it cannot be written as JPEG. Checked on the parsed
    /// format, since the extension string accepts case variants.
    pub fn validate(&self) -> Result<()> {
        if self.output_type == OutputKind::Rgba && self.image_format() == ImageFormat::Jpeg {
            return Err(SalientError::Validation {
                field: "--format".to_string(),
                reason: format!("{} cannot store the alpha channel rgba output needs", self.format),
            });
        }
        Ok(())
    }

    /// Format the composed images are encoded with. The value parser already
    /// rejected anything unsupported, so unknown extensions only appear when
    /// `Args` is built by hand; they fall back to PNG.
    pub fn image_format(&self) -> ImageFormat {
        ImageFormat::from_extension(&self.format).unwrap_or(ImageFormat::Png)
    }
}

fn check_format(s: &str) -> std::result::Result<String, String> {
    let supported: Vec<_> = ImageFormat::all()
        .filter(|f| f.writing_enabled())
        .flat_map(|f| f.extensions_str())
        .map(|s| format!("`{}`", s))
        .collect();
    let supported_message = format!("Supported formats: {}", supported.join(", "));

    let format = ImageFormat::from_extension(s)
        .ok_or(format!("{} is not supported. {}", s, supported_message))?;
    if !format.writing_enabled() {
        return Err(format!("{} is not supported. {}", s, supported_message));
    }

    Ok(s.to_string())
}

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::{
    config::{Config, NormalizeConfig},
    errors::{Result, SalientError},
    grid::ResizePolicy,
    traits::{SaliencyMap, SaliencyModel},
};

/// Region of the padded model input covered by frame content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub struct Model {
    input_size: u32,
    input_name: String,
    output_name: String,
    normalize: NormalizeConfig,
    policy: ResizePolicy,
    session: Mutex<Session>,
}

impl Model {
    pub fn load(config: &Config, gpu: bool, device_id: i32, policy: ResizePolicy) -> Result<Self> {
        let weights = config.weights_path();
        let builder = SessionBuilder::new().map_err(|e| SalientError::Model {
            operation: "create session builder".to_string(),
            source: Box::new(e),
        })?;
        let builder = if gpu {
            info!(device_id, "registering TensorRT and CUDA execution providers");
            builder
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])
                .map_err(|e| SalientError::Model {
                    operation: "register execution providers".to_string(),
                    source: Box::new(e),
                })?
        } else {
            builder
        };
        let mut session = builder
            .with_memory_pattern(true)
            .map_err(|e| SalientError::Model {
                operation: "enable memory pattern".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(&weights)
            .map_err(|e| SalientError::Model {
                operation: format!("load weights from {}", weights.display()),
                source: Box::new(e),
            })?;

        // Static graphs declare their input edge; dynamic graphs leave it to
        // the settings file.
        let declared = session
            .inputs
            .first()
            .and_then(|input| input.input_type.tensor_shape())
            .and_then(|shape| shape.get(2).copied())
            .and_then(|dim| u32::try_from(dim).ok())
            .filter(|&dim| dim > 0);
        let input_size = match policy {
            ResizePolicy::Fixed { size } => {
                if declared.is_some_and(|d| d != size) {
                    warn!(
                        declared = declared.unwrap_or(0),
                        size, "fixed size differs from the graph's declared input edge"
                    );
                }
                size
            }
            ResizePolicy::Dynamic { base } => declared.unwrap_or(base),
        };

        // initialize model
        let data = Array4::<f32>::zeros((1, 3, input_size as usize, input_size as usize));
        session
            .run(ort::inputs![config.model.input_name.as_str() => TensorRef::from_array_view(&data).map_err(|e| SalientError::Model {
                operation: "create warmup tensor".to_string(),
                source: Box::new(e),
            })?])
            .map_err(|e| SalientError::Model {
                operation: "warmup run".to_string(),
                source: Box::new(e),
            })?;
        info!(input_size, weights = %weights.display(), "model ready");

        Ok(Self {
            input_size,
            input_name: config.model.input_name.clone(),
            output_name: config.model.output_name.clone(),
            normalize: config.inference.normalize,
            policy,
            session: Mutex::new(session),
        })
    }

    pub fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(
            ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?],
        )?;
        let value = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| SalientError::Model {
                operation: format!("read output tensor `{}`", self.output_name),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such output in the graph; check model.output_name in the settings file",
                )),
            })?;
        Ok(value
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned())
    }
}

impl SaliencyModel for Model {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn predict_map(&self, image: &RgbImage) -> Result<SaliencyMap> {
        let (width, height) = image.dimensions();
        let (tensor, crop) = preprocess(image, self.input_size, self.policy, &self.normalize);
        let mask = self.predict(tensor.view())?;
        postprocess_mask(mask, self.input_size, crop, width, height)
    }
}

/// Resize a frame onto the square model input.
///
/// The dynamic policy preserves aspect ratio and letterboxes onto a black
/// canvas; the fixed policy stretches the frame to fill the input. The
/// returned crop box marks where frame content ended up.
pub fn letterbox(image: &RgbImage, size: u32, policy: ResizePolicy) -> (RgbImage, CropBox) {
    if matches!(policy, ResizePolicy::Fixed { .. }) {
        let resized = imageops::resize(image, size, size, FilterType::Lanczos3);
        return (
            resized,
            CropBox {
                x: 0,
                y: 0,
                width: size,
                height: size,
            },
        );
    }

    let (width, height) = image.dimensions();
    let scale = f64::from(size) / f64::from(width.max(height));
    let scaled_w = ((f64::from(width) * scale).round() as u32).clamp(1, size);
    let scaled_h = ((f64::from(height) * scale).round() as u32).clamp(1, size);
    let content = imageops::resize(image, scaled_w, scaled_h, FilterType::Lanczos3);
    let x = (size - scaled_w) / 2;
    let y = (size - scaled_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    imageops::overlay(&mut canvas, &content, i64::from(x), i64::from(y));
    (
        canvas,
        CropBox {
            x,
            y,
            width: scaled_w,
            height: scaled_h,
        },
    )
}

/// Build the normalized NCHW tensor for one frame.
pub fn preprocess(
    image: &RgbImage,
    size: u32,
    policy: ResizePolicy,
    normalize: &NormalizeConfig,
) -> (Array4<f32>, CropBox) {
    let (canvas, crop) = letterbox(image, size, policy);
    let mut tensor = canvas
        .as_ndarray3()
        .slice_move(s![NewAxis, .., .., ..])
        .map(|&v| f32::from(v) / 255.0);
    for (c, mut channel) in tensor.axis_iter_mut(Axis(1)).enumerate() {
        let (mean, std) = (normalize.mean[c], normalize.std[c]);
        channel.map_inplace(|v| *v = (*v - mean) / std);
    }
    (tensor, crop)
}

/// Map the network output back to frame resolution.
///
/// Drops the letterbox padding, resizes the content region to the frame's
/// dimensions, and folds resampling overshoot back into `[0, 1]`.
pub fn postprocess_mask(
    mask: Array4<f32>,
    size: u32,
    crop: CropBox,
    width: u32,
    height: u32,
) -> Result<SaliencyMap> {
    let mask = SaliencyMap::from_raw(size, size, mask.into_raw_vec_and_offset().0).ok_or_else(
        || SalientError::Model {
            operation: format!("reshape prediction to {size}x{size}"),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "output tensor does not match the input geometry",
            )),
        },
    )?;
    let content = imageops::crop_imm(&mask, crop.x, crop.y, crop.width, crop.height).to_image();
    let mut resized = imageops::resize(&content, width, height, FilterType::Lanczos3);
    for pixel in resized.pixels_mut() {
        pixel.0[0] = pixel.0[0].clamp(0.0, 1.0);
    }
    Ok(resized)
}

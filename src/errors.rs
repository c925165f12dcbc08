use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the saliency inference application.
///
/// Each variant captures the context of its error domain (filesystem, source
/// classification, model operations, video plumbing) so callers never have to
/// parse error strings.
#[derive(Error, Debug)]
pub enum SalientError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Source {path:?} does not exist and is not a webcam index")]
    SourceNotFound { path: PathBuf },

    #[error("Source {path:?} mixes {images} image file(s) and {videos} video file(s)")]
    AmbiguousSource {
        path: PathBuf,
        images: usize,
        videos: usize,
    },

    #[error("No supported media found at {path:?}")]
    UnsupportedSource { path: PathBuf },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Prediction is {pred_width}x{pred_height} but the frame is {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        pred_width: u32,
        pred_height: u32,
    },

    #[error("Frame is {width}x{height} but the sink expects {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("ffmpeg: {0}")]
    Ffmpeg(String),
}

pub type Result<T> = std::result::Result<T, SalientError>;

/// I/O errors without richer context become filesystem errors. Code that knows
/// the path and operation constructs `SalientError::FileSystem` directly.
impl From<std::io::Error> for SalientError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for SalientError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for SalientError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors occur during tensor handling, which is part of inference, so
/// they land in the model category.
impl From<ndarray::ShapeError> for SalientError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<serde_yaml::Error> for SalientError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

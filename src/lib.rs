pub mod cli;
pub mod compose;
pub mod config;
pub mod errors;
pub mod grid;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod traits;
pub mod video;

pub mod mocks;

pub use cli::Args;
pub use compose::OutputKind;
pub use config::Config;
pub use errors::{Result, SalientError};
pub use grid::{GridPredictor, ResizePolicy};
pub use model::Model;
pub use pipeline::Pipeline;
pub use source::{MediaKind, Source};
pub use traits::{SaliencyMap, SaliencyModel};

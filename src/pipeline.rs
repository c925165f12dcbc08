use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::cli::Args;
use crate::compose::{self, OutputKind};
use crate::config::Config;
use crate::errors::{Result, SalientError};
use crate::source::{MediaKind, Source};
use crate::traits::{SaliencyMap, SaliencyModel};
use crate::video::{Preview, VideoReader, VideoWriter, WebcamReader};

/// Sequential frame loop: acquire, predict, compose, write.
///
/// Image sources continue past per-file failures; a failing video aborts the
/// run because a partially written container is worthless.
pub struct Pipeline<M: SaliencyModel> {
    model: M,
    config: Config,
    output_type: OutputKind,
    format: String,
    image_format: ImageFormat,
    verbose: bool,
}

/// Build a pipeline around `model` and drain the source with it.
pub fn run_with_model<M: SaliencyModel>(
    model: M,
    config: Config,
    args: &Args,
    source: &Source,
) -> Result<()> {
    Pipeline::new(model, config, args).run(source)
}

impl<M: SaliencyModel> Pipeline<M> {
    pub fn new(model: M, config: Config, args: &Args) -> Self {
        Self {
            model,
            config,
            output_type: args.output_type,
            format: args.format.clone(),
            image_format: args.image_format(),
            verbose: args.verbose,
        }
    }

    pub fn run(&self, source: &Source) -> Result<()> {
        if self.output_type == OutputKind::Rgba && source.kind != MediaKind::Image {
            return Err(SalientError::Validation {
                field: "--type".to_string(),
                reason: "rgba needs an alpha channel, which video frames cannot carry; use `map` or `green`".to_string(),
            });
        }
        if let Some(save_dir) = &source.save_dir {
            fs::create_dir_all(save_dir).map_err(|e| SalientError::FileSystem {
                path: save_dir.clone(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
        }
        match source.kind {
            MediaKind::Image => self.run_images(source),
            MediaKind::Video => self.run_videos(source),
            MediaKind::Webcam => self.run_webcam(source),
        }
    }

    fn run_images(&self, source: &Source) -> Result<()> {
        let save_dir = source
            .save_dir
            .as_deref()
            .ok_or_else(|| SalientError::Configuration {
                message: "image source without an output directory".to_string(),
            })?;
        let bar = self.frame_bar(Some(source.paths.len() as u64));
        let mut failures = 0_usize;
        for path in &source.paths {
            match self.process_image(path, source, save_dir) {
                Ok(output) => {
                    debug!(input = %path.display(), output = %output.display(), "image done");
                }
                Err(e) => {
                    failures += 1;
                    warn!(input = %path.display(), error = %e, "skipping image");
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        if failures > 0 {
            warn!(failures, total = source.paths.len(), "some images failed");
        }
        info!(
            processed = source.paths.len() - failures,
            "image pass complete"
        );
        Ok(())
    }

    fn process_image(&self, path: &Path, source: &Source, save_dir: &Path) -> Result<PathBuf> {
        let image = image::open(path)
            .map_err(|e| SalientError::ImageProcessing {
                path: path.display().to_string(),
                operation: "open image".to_string(),
                source: Box::new(e),
            })?
            .into_rgb8();
        let pred = self.model.predict_map(&image)?;
        let composed = compose::render(self.output_type, &image, &pred)?;

        let output = save_dir
            .join(source.relative(path))
            .with_extension(&self.format);
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| SalientError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
        }
        composed
            .save_with_format(&output, self.image_format)
            .map_err(|e| SalientError::ImageProcessing {
                path: output.display().to_string(),
                operation: "save image".to_string(),
                source: Box::new(e),
            })?;
        Ok(output)
    }

    fn run_videos(&self, source: &Source) -> Result<()> {
        let save_dir = source
            .save_dir
            .as_deref()
            .ok_or_else(|| SalientError::Configuration {
                message: "video source without an output directory".to_string(),
            })?;
        for path in &source.paths {
            self.process_video(path, source, save_dir)?;
        }
        Ok(())
    }

    fn process_video(&self, path: &Path, source: &Source, save_dir: &Path) -> Result<()> {
        let reader = VideoReader::open(path)?;
        let meta = reader.meta().clone();
        info!(
            video = %path.display(),
            width = meta.width,
            height = meta.height,
            fps = meta.fps,
            "processing video"
        );

        let output = save_dir.join(source.relative(path));
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| SalientError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create output directory".to_string(),
                source: e,
            })?;
        }

        let bar = self.frame_bar(meta.nb_frames);
        let mut writer: Option<VideoWriter> = None;
        let mut frames = 0_u64;
        for frame in reader {
            let frame = frame?;
            let pred = self.model.predict_map(&frame)?;
            let composed = self.render_rgb(&frame, &pred)?;
            if writer.is_none() {
                writer = Some(VideoWriter::create(
                    &output,
                    meta.width,
                    meta.height,
                    meta.fps,
                )?);
            }
            if let Some(sink) = writer.as_mut() {
                sink.write_frame(&composed)?;
            }
            frames += 1;
            bar.inc(1);
        }
        bar.finish_and_clear();

        match writer {
            Some(sink) => {
                sink.finish()?;
                info!(output = %output.display(), frames, "video done");
            }
            None => warn!(video = %path.display(), "no frames decoded, nothing written"),
        }
        Ok(())
    }

    fn run_webcam(&self, source: &Source) -> Result<()> {
        let device = source
            .device
            .ok_or_else(|| SalientError::Configuration {
                message: "webcam source without a device index".to_string(),
            })?;
        let webcam = self.config.webcam;
        let reader = WebcamReader::open(device, &webcam)?;
        let mut preview = Preview::open(
            &self.config.model.name,
            webcam.width,
            webcam.height,
            webcam.fps,
        )?;
        info!(
            device,
            width = webcam.width,
            height = webcam.height,
            "live preview running, close the window to stop"
        );

        let bar = self.frame_bar(None);
        for frame in reader {
            let frame = frame?;
            let pred = self.model.predict_map(&frame)?;
            let composed = self.render_rgb(&frame, &pred)?;
            if !preview.show(&composed)? {
                info!("preview window closed");
                break;
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        Ok(())
    }

    /// Three-channel rendering for video and preview sinks.
    fn render_rgb(&self, frame: &RgbImage, pred: &SaliencyMap) -> Result<RgbImage> {
        match self.output_type {
            OutputKind::Rgba => Err(SalientError::Validation {
                field: "--type".to_string(),
                reason: "rgba output requires image sources".to_string(),
            }),
            kind => Ok(compose::render(kind, frame, pred)?.into_rgb8()),
        }
    }

    fn frame_bar(&self, len: Option<u64>) -> ProgressBar {
        if !self.verbose {
            return ProgressBar::hidden();
        }
        match len {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                        )
                        .unwrap()
                        .progress_chars("#>-"),
                );
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} [{elapsed_precise}] {pos} frames")
                        .unwrap(),
                );
                bar
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ConstantSaliency;
    use std::path::PathBuf;

    fn test_args(output_type: &str) -> Args {
        use clap::Parser;
        Args::try_parse_from(["salient-rs", "--source", "ignored", "--type", output_type])
            .unwrap()
    }

    fn pipeline(output_type: &str) -> Pipeline<ConstantSaliency> {
        Pipeline::new(
            ConstantSaliency::new(64, 0.5),
            Config::default(),
            &test_args(output_type),
        )
    }

    #[test]
    fn rgba_over_a_video_source_is_rejected_up_front() {
        let source = Source {
            kind: MediaKind::Video,
            root: PathBuf::new(),
            paths: vec![],
            device: None,
            save_dir: None,
        };
        let err = pipeline("rgba").run(&source).unwrap_err();
        assert!(matches!(err, SalientError::Validation { .. }));
    }

    #[test]
    fn rgba_over_a_webcam_source_is_rejected_up_front() {
        let source = Source {
            kind: MediaKind::Webcam,
            root: PathBuf::new(),
            paths: vec![],
            device: Some(0),
            save_dir: None,
        };
        assert!(pipeline("rgba").run(&source).is_err());
    }

    #[test]
    fn webcam_source_needs_a_device_index() {
        let source = Source {
            kind: MediaKind::Webcam,
            root: PathBuf::new(),
            paths: vec![],
            device: None,
            save_dir: None,
        };
        let err = pipeline("map").run(&source).unwrap_err();
        assert!(matches!(err, SalientError::Configuration { .. }));
    }

    #[test]
    fn render_rgb_refuses_the_alpha_visualization() {
        let p = pipeline("rgba");
        let frame = RgbImage::new(2, 2);
        let pred = SaliencyMap::from_pixel(2, 2, image::Luma([0.5]));
        assert!(p.render_rgb(&frame, &pred).is_err());
    }
}

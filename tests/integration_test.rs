use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use image::{Rgb, RgbImage, Rgba};
use tempfile::TempDir;

use salient_rs::mocks::{BrightnessSplit, ConstantSaliency};
use salient_rs::{Args, MediaKind, Pipeline, SalientError, Source};

fn args(extra: &[&str]) -> Args {
    let mut argv = vec!["salient-rs", "--source", "ignored"];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
}

fn write_image(path: &Path, width: u32, height: u32, color: [u8; 3]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, Rgb(color))
        .save(path)
        .unwrap();
}

/// Image source rooted in a temp directory, writing into the temp directory
/// as well so tests never touch the real working directory.
fn image_source(root: &TempDir, save_dir: &TempDir, names: &[&str]) -> Source {
    let paths = names.iter().map(|n| root.path().join(n)).collect();
    Source {
        kind: MediaKind::Image,
        root: root.path().to_path_buf(),
        paths,
        device: None,
        save_dir: Some(save_dir.path().join("out")),
    }
}

#[test]
fn map_output_is_grayscale_at_frame_resolution() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"), 6, 4, [200, 10, 10]);

    let source = image_source(&input, &output, &["a.png"]);
    let pipeline = Pipeline::new(
        ConstantSaliency::new(64, 0.5),
        salient_rs::Config::default(),
        &args(&["--type", "map"]),
    );
    pipeline.run(&source).unwrap();

    let saved = image::open(output.path().join("out/a.png")).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (6, 4));
    assert!(saved.pixels().all(|p| p == &Rgb([128, 128, 128])));
}

#[test]
fn rgba_output_keeps_color_and_writes_alpha() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"), 4, 4, [10, 20, 30]);

    let source = image_source(&input, &output, &["a.png"]);
    let pipeline = Pipeline::new(
        ConstantSaliency::new(64, 1.0),
        salient_rs::Config::default(),
        &args(&["--type", "rgba"]),
    );
    pipeline.run(&source).unwrap();

    let saved = image::open(output.path().join("out/a.png")).unwrap().into_rgba8();
    assert!(saved.pixels().all(|p| p == &Rgba([10, 20, 30, 255])));
}

#[test]
fn green_output_replaces_background() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    // Left half dark (background), right half bright (foreground).
    let mut image = RgbImage::from_pixel(8, 4, Rgb([10, 10, 10]));
    for y in 0..4 {
        for x in 4..8 {
            image.put_pixel(x, y, Rgb([240, 240, 240]));
        }
    }
    image.save(input.path().join("split.png")).unwrap();

    let source = image_source(&input, &output, &["split.png"]);
    let pipeline = Pipeline::new(
        BrightnessSplit::new(64, 128),
        salient_rs::Config::default(),
        &args(&["--type", "green"]),
    );
    pipeline.run(&source).unwrap();

    let saved = image::open(output.path().join("out/split.png"))
        .unwrap()
        .into_rgb8();
    assert_eq!(saved.get_pixel(0, 0), &Rgb([0, 255, 0]));
    assert_eq!(saved.get_pixel(7, 0), &Rgb([240, 240, 240]));
}

#[test]
fn nested_input_directories_are_mirrored() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_image(&input.path().join("top.png"), 4, 4, [1, 2, 3]);
    write_image(&input.path().join("nested/deep.png"), 4, 4, [4, 5, 6]);

    let source = image_source(&input, &output, &["top.png", "nested/deep.png"]);
    let pipeline = Pipeline::new(
        ConstantSaliency::new(64, 0.5),
        salient_rs::Config::default(),
        &args(&[]),
    );
    pipeline.run(&source).unwrap();

    assert!(output.path().join("out/top.png").exists());
    assert!(output.path().join("out/nested/deep.png").exists());
}

#[test]
fn format_flag_selects_the_output_encoding() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"), 4, 4, [9, 9, 9]);

    let source = image_source(&input, &output, &["a.png"]);
    let pipeline = Pipeline::new(
        ConstantSaliency::new(64, 0.5),
        salient_rs::Config::default(),
        &args(&["--format", "jpg"]),
    );
    pipeline.run(&source).unwrap();

    let saved = output.path().join("out/a.jpg");
    assert!(saved.exists());
    assert_eq!(image::open(&saved).unwrap().into_rgb8().dimensions(), (4, 4));
}

#[test]
fn unreadable_images_are_skipped_without_aborting() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_image(&input.path().join("good.png"), 4, 4, [50, 60, 70]);
    fs::write(input.path().join("broken.png"), b"not an image").unwrap();

    let source = image_source(&input, &output, &["broken.png", "good.png"]);
    let pipeline = Pipeline::new(
        ConstantSaliency::new(64, 0.5),
        salient_rs::Config::default(),
        &args(&[]),
    );
    pipeline.run(&source).unwrap();

    assert!(output.path().join("out/good.png").exists());
    assert!(!output.path().join("out/broken.png").exists());
}

#[test]
fn tiled_and_plain_pipelines_agree_on_small_frames() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_image(&input.path().join("a.png"), 16, 12, [120, 30, 200]);

    let plain_source = image_source(&input, &output, &["a.png"]);
    Pipeline::new(
        ConstantSaliency::new(64, 0.4),
        salient_rs::Config::default(),
        &args(&[]),
    )
    .run(&plain_source)
    .unwrap();
    let plain = image::open(output.path().join("out/a.png")).unwrap().into_rgb8();

    let tiled_output = TempDir::new().unwrap();
    let tiled_source = image_source(&input, &tiled_output, &["a.png"]);
    Pipeline::new(
        salient_rs::GridPredictor::new(ConstantSaliency::new(64, 0.4), 0.5),
        salient_rs::Config::default(),
        &args(&[]),
    )
    .run(&tiled_source)
    .unwrap();
    let tiled = image::open(tiled_output.path().join("out/a.png"))
        .unwrap()
        .into_rgb8();

    assert_eq!(plain.as_raw(), tiled.as_raw());
}

#[test]
fn rgba_over_video_fails_before_any_decoding() {
    let source = Source {
        kind: MediaKind::Video,
        root: PathBuf::new(),
        paths: vec![PathBuf::from("missing.mp4")],
        device: None,
        save_dir: None,
    };
    let pipeline = Pipeline::new(
        ConstantSaliency::new(64, 0.5),
        salient_rs::Config::default(),
        &args(&["--type", "rgba"]),
    );
    let err = pipeline.run(&source).unwrap_err();
    assert!(matches!(err, SalientError::Validation { .. }));
}

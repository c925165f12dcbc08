use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{Result, SalientError};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

/// Directory all outputs land under.
pub const RESULTS_DIR: &str = "results";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Webcam,
}

/// A classified `--source` argument.
///
/// `root` anchors relative paths when mirroring a directory tree into the
/// output directory; for a single file it is the file's parent.
#[derive(Debug, Clone)]
pub struct Source {
    pub kind: MediaKind,
    pub root: PathBuf,
    pub paths: Vec<PathBuf>,
    pub device: Option<u32>,
    pub save_dir: Option<PathBuf>,
}

impl Source {
    /// Path of `media` relative to the source root, for mirroring into the
    /// output directory. Collected paths always live under the root.
    pub fn relative<'a>(&self, media: &'a Path) -> &'a Path {
        media.strip_prefix(&self.root).unwrap_or(media)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()?.to_str().map(str::to_ascii_lowercase)
}

pub fn is_image(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn is_video(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

/// Decide what `--source` refers to.
///
/// A purely numeric argument is a webcam index. A directory is scanned
/// recursively and must contain media of exactly one kind; mixing images and
/// videos is reported instead of silently picking one. A file is classified
/// by its extension.
pub fn classify(raw: &str) -> Result<Source> {
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        let device = raw.parse().map_err(|_| SalientError::Validation {
            field: "--source".to_string(),
            reason: format!("{raw} is not a valid webcam index"),
        })?;
        return Ok(Source {
            kind: MediaKind::Webcam,
            root: PathBuf::new(),
            paths: Vec::new(),
            device: Some(device),
            save_dir: None,
        });
    }

    let path = Path::new(raw);
    if path.is_dir() {
        classify_directory(path)
    } else if path.is_file() {
        classify_file(path)
    } else {
        Err(SalientError::SourceNotFound {
            path: path.to_path_buf(),
        })
    }
}

fn classify_directory(path: &Path) -> Result<Source> {
    let mut media: Vec<PathBuf> = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| is_image(p) || is_video(p))
        .collect();
    media.sort();

    let images = media.iter().filter(|p| is_image(p)).count();
    let videos = media.len() - images;

    let kind = match (images, videos) {
        (0, 0) => {
            return Err(SalientError::UnsupportedSource {
                path: path.to_path_buf(),
            })
        }
        (_, 0) => MediaKind::Image,
        (0, _) => MediaKind::Video,
        (images, videos) => {
            return Err(SalientError::AmbiguousSource {
                path: path.to_path_buf(),
                images,
                videos,
            })
        }
    };

    let dir_name = path
        .file_name()
        .map(|name| Path::new(RESULTS_DIR).join(name))
        .unwrap_or_else(|| PathBuf::from(RESULTS_DIR));

    Ok(Source {
        kind,
        root: path.to_path_buf(),
        paths: media,
        device: None,
        save_dir: Some(dir_name),
    })
}

fn classify_file(path: &Path) -> Result<Source> {
    let kind = if is_image(path) {
        MediaKind::Image
    } else if is_video(path) {
        MediaKind::Video
    } else {
        return Err(SalientError::UnsupportedSource {
            path: path.to_path_buf(),
        });
    };

    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(Source {
        kind,
        root,
        paths: vec![path.to_path_buf()],
        device: None,
        save_dir: Some(PathBuf::from(RESULTS_DIR)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        File::create(&path).unwrap();
        path
    }

    #[test]
    fn numeric_source_is_a_webcam() {
        let source = classify("0").unwrap();
        assert_eq!(source.kind, MediaKind::Webcam);
        assert_eq!(source.device, Some(0));
        assert_eq!(source.save_dir, None);
        assert!(source.paths.is_empty());
    }

    #[test]
    fn image_directory_collects_recursively_in_order() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "b.png");
        touch(&dir, "a.jpg");
        touch(&dir, "nested/c.jpeg");
        touch(&dir, "notes.txt");

        let source = classify(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(source.kind, MediaKind::Image);
        assert_eq!(source.paths.len(), 3);
        assert!(source.paths.windows(2).all(|w| w[0] <= w[1]));

        let name = dir.path().file_name().unwrap();
        assert_eq!(source.save_dir, Some(Path::new(RESULTS_DIR).join(name)));
    }

    #[test]
    fn mixed_directory_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.jpg");
        touch(&dir, "b.mp4");

        let err = classify(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(
            err,
            SalientError::AmbiguousSource {
                images: 1,
                videos: 1,
                ..
            }
        ));
    }

    #[test]
    fn directory_without_media_is_unsupported() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "readme.md");
        let err = classify(dir.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SalientError::UnsupportedSource { .. }));
    }

    #[test]
    fn single_video_file_saves_into_results() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "clip.mp4");

        let source = classify(clip.to_str().unwrap()).unwrap();
        assert_eq!(source.kind, MediaKind::Video);
        assert_eq!(source.paths, vec![clip.clone()]);
        assert_eq!(source.save_dir, Some(PathBuf::from(RESULTS_DIR)));
        assert_eq!(source.relative(&clip), Path::new("clip.mp4"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let doc = touch(&dir, "notes.txt");
        let err = classify(doc.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, SalientError::UnsupportedSource { .. }));
    }

    #[test]
    fn missing_path_is_reported() {
        let err = classify("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, SalientError::SourceNotFound { .. }));
    }

    #[test]
    fn relative_paths_mirror_the_tree() {
        let dir = TempDir::new().unwrap();
        let nested = touch(&dir, "nested/c.png");
        let source = classify(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(source.relative(&nested), Path::new("nested/c.png"));
    }

    #[test]
    fn extension_matching_is_case_insensitive() {
        assert!(is_image(Path::new("photo.JPG")));
        assert!(is_video(Path::new("clip.MOV")));
        assert!(!is_image(Path::new("archive.tar")));
    }
}

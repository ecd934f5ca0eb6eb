use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::error::{FaceError, Result};
use crate::shared::frame::Frame;
use crate::video::domain::frame_reader::{FrameReader, SourceInfo};

/// Reads a single image, or every image of a directory in name order, as a
/// frame sequence.
///
/// Decoding is lazy: `open` decodes only the first image to report its size.
#[derive(Default)]
pub struct ImageFileReader {
    paths: Vec<PathBuf>,
    opened: bool,
}

impl ImageFileReader {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_err = |e| FaceError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_image_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn decode_image(path: &Path, index: usize) -> Result<Frame> {
    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => FaceError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => FaceError::Configuration(format!("cannot decode {}: {other}", path.display())),
    })?;
    Ok(Frame::from_rgb_image(img.to_rgb8(), index))
}

impl FrameReader for ImageFileReader {
    fn open(&mut self, path: &Path) -> Result<SourceInfo> {
        let paths = if path.is_dir() {
            list_images(path)?
        } else {
            vec![path.to_path_buf()]
        };
        let first = paths.first().ok_or_else(|| {
            FaceError::Configuration(format!("no images found in {}", path.display()))
        })?;
        let sample = decode_image(first, 0)?;

        let info = SourceInfo {
            source_path: path.to_path_buf(),
            frame_count: paths.len(),
            width: sample.width(),
            height: sample.height(),
        };
        log::info!("Opened {} ({} images)", path.display(), info.frame_count);
        self.paths = paths;
        self.opened = true;
        Ok(info)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame>> + '_> {
        if !self.opened {
            return Box::new(std::iter::once(Err(FaceError::Configuration(
                "image reader not opened".into(),
            ))));
        }
        Box::new(
            self.paths
                .iter()
                .enumerate()
                .map(|(index, path)| decode_image(path, index)),
        )
    }

    fn close(&mut self) {
        self.paths.clear();
        self.opened = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::PixelFormat;

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_open_single_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), "test.png", 100, 80);
        let mut reader = ImageFileReader::new();
        let info = reader.open(&path).unwrap();
        assert_eq!((info.width, info.height), (100, 80));
        assert_eq!(info.frame_count, 1);
        assert_eq!(info.source_path, path);
    }

    #[test]
    fn test_frame_is_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), "test.png", 10, 8);
        let mut reader = ImageFileReader::new();
        reader.open(&path).unwrap();
        let frame = reader.frames().next().unwrap().unwrap();
        assert_eq!(frame.format(), PixelFormat::Rgb);
        assert_eq!(&frame.data()[..3], &[50, 100, 200]);
    }

    #[test]
    fn test_directory_yields_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_test_image(dir.path(), "b.png", 4, 4);
        write_test_image(dir.path(), "a.png", 6, 6);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut reader = ImageFileReader::new();
        let info = reader.open(dir.path()).unwrap();
        assert_eq!(info.frame_count, 2);
        assert_eq!(info.width, 6);

        let frames: Vec<Frame> = reader.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames[0].index(), 0);
        assert_eq!(frames[1].index(), 1);
        assert_eq!(frames[1].width(), 4);
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageFileReader::new().open(dir.path()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_open_nonexistent_is_io_error() {
        let err = ImageFileReader::new()
            .open(Path::new("/nonexistent/test.png"))
            .unwrap_err();
        assert!(matches!(err, FaceError::Io { .. }));
    }

    #[test]
    fn test_frames_without_open_returns_error() {
        let mut reader = ImageFileReader::new();
        assert!(reader.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_extension_match_ignores_case() {
        assert!(is_image_file(Path::new("x/IMG_001.JPG")));
        assert!(!is_image_file(Path::new("x/clip.mp4")));
        assert!(!is_image_file(Path::new("x/noext")));
    }
}

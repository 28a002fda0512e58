use std::fs;
use std::path::{Path, PathBuf};

use fiducam_core::{Frame, PixelOrder};
use image::ImageFormat;

use super::{now_ms, FrameSource, ReadError, SourceError};

/// Still images played back as a finite stream: a single file or every
/// image in a directory, in file-name order.
///
/// With `repeat` the sequence loops forever and decoded frames are cached,
/// which turns a folder of snapshots into a stand-in camera.
pub struct ImageSource {
    paths: Vec<PathBuf>,
    next: usize,
    repeat: bool,
    cache: Vec<Option<Frame>>,
    description: String,
}

impl ImageSource {
    pub fn open(path: impl AsRef<Path>, repeat: bool) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let origin = path.display().to_string();

        let paths = if path.is_dir() {
            let mut paths: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| SourceError::unavailable(&origin, e.to_string()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && ImageFormat::from_path(p).is_ok())
                .collect();
            paths.sort();
            paths
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            return Err(SourceError::unavailable(origin, "no such file or directory"));
        };

        if paths.is_empty() {
            return Err(SourceError::unavailable(origin, "directory contains no images"));
        }

        log::info!("opened {} image(s) from {origin}", paths.len());
        Ok(Self {
            cache: vec![None; paths.len()],
            paths,
            next: 0,
            repeat,
            description: format!("images {origin}"),
        })
    }

    /// Number of images in one pass.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn load(path: &Path) -> Result<Frame, ReadError> {
        let rgb = image::open(path)
            .map_err(|e| ReadError::Corrupt(format!("{}: {e}", path.display())))?
            .to_rgb8();
        Ok(Frame::from_rgb_image(&rgb).to_order(PixelOrder::Bgr))
    }
}

impl FrameSource for ImageSource {
    fn read_frame(&mut self) -> Result<Frame, ReadError> {
        if self.next >= self.paths.len() {
            if !self.repeat {
                return Err(ReadError::EndOfStream);
            }
            self.next = 0;
        }
        let idx = self.next;
        self.next += 1;

        let frame = match &self.cache[idx] {
            Some(frame) => frame.clone(),
            None => {
                let frame = Self::load(&self.paths[idx])?;
                if self.repeat {
                    self.cache[idx] = Some(frame.clone());
                }
                frame
            }
        };
        Ok(frame.with_timestamp(now_ms()))
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

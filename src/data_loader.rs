use std::path::{Path, PathBuf};

use glob::glob;
use image::{ImageReader, RgbImage};
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::error::{CalibrationError, CalibrationResult};
use crate::pipeline::CaptureSource;
use crate::types::FrameSet;

fn img_filter(rp: glob::GlobResult) -> Option<PathBuf> {
    if let Ok(p) = rp {
        for ext in &[".png", ".jpg", ".jpeg", ".bmp"] {
            if p.as_os_str().to_string_lossy().to_lowercase().ends_with(ext) {
                return Some(p);
            }
        }
    }
    None
}

/// Sorted image files of `root_folder/cam{cam_idx}/`.
pub fn camera_image_paths<P: AsRef<Path>>(root_folder: P, cam_idx: usize) -> CalibrationResult<Vec<PathBuf>> {
    let pattern = root_folder.as_ref().join(format!("cam{}", cam_idx)).join("*");
    let img_paths = glob(&pattern.to_string_lossy()).map_err(|e| {
        CalibrationError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;
    let mut sorted_path: Vec<PathBuf> = img_paths.into_iter().filter_map(img_filter).collect();
    sorted_path.sort();
    log::trace!("cam{}: {} images", cam_idx, sorted_path.len());
    Ok(sorted_path)
}

fn decode(cam_idx: usize, path: &Path) -> CalibrationResult<RgbImage> {
    let unreadable = |reason: String| CalibrationError::FeatureExtraction {
        camera: cam_idx,
        reason: format!("{}: {}", path.display(), reason),
    };
    let img = ImageReader::open(path)
        .map_err(|e| unreadable(e.to_string()))?
        .decode()
        .map_err(|e| unreadable(e.to_string()))?;
    Ok(img.to_rgb8())
}

/// Loads frame `frame_idx` of every camera folder, decoding in parallel.
pub fn load_rig_images<P: AsRef<Path>>(
    root_folder: P,
    camera_count: usize,
    frame_idx: usize,
) -> CalibrationResult<Vec<RgbImage>> {
    let paths: Vec<PathBuf> = (0..camera_count)
        .map(|cam_idx| {
            camera_image_paths(root_folder.as_ref(), cam_idx)?
                .into_iter()
                .nth(frame_idx)
                .ok_or_else(|| CalibrationError::FeatureExtraction {
                    camera: cam_idx,
                    reason: format!("no image {} in cam{}", frame_idx, cam_idx),
                })
        })
        .collect::<CalibrationResult<_>>()?;
    paths
        .par_iter()
        .enumerate()
        .progress_count(camera_count as u64)
        .map(|(cam_idx, path)| decode(cam_idx, path))
        .collect()
}

/// Replays `cam{i}` image folders as a synchronized capture source, one
/// image per camera per capture.
pub struct FolderCapture {
    paths: Vec<Vec<PathBuf>>,
    cursor: usize,
    looping: bool,
    streaming: bool,
}

impl FolderCapture {
    pub fn new<P: AsRef<Path>>(root_folder: P, camera_count: usize, looping: bool) -> CalibrationResult<FolderCapture> {
        let paths = (0..camera_count)
            .map(|cam_idx| camera_image_paths(root_folder.as_ref(), cam_idx))
            .collect::<CalibrationResult<Vec<_>>>()?;
        Ok(FolderCapture {
            paths,
            cursor: 0,
            looping,
            streaming: false,
        })
    }

    /// Number of complete frame sets available.
    pub fn len(&self) -> usize {
        self.paths.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CaptureSource for FolderCapture {
    fn start_stream(&mut self) -> bool {
        self.streaming = !self.is_empty();
        self.cursor = 0;
        self.streaming
    }

    fn stop_stream(&mut self) {
        self.streaming = false;
    }

    fn capture(&mut self, frames: &mut FrameSet) -> bool {
        if !self.streaming {
            return false;
        }
        if self.cursor >= self.len() {
            if !self.looping {
                return false;
            }
            self.cursor = 0;
        }
        let idx = self.cursor;
        self.cursor += 1;
        let decoded: CalibrationResult<Vec<RgbImage>> = self
            .paths
            .par_iter()
            .enumerate()
            .map(|(cam_idx, p)| decode(cam_idx, &p[idx]))
            .collect();
        match decoded {
            Ok(images) => {
                *frames = FrameSet::from_images(images);
                true
            }
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }
}

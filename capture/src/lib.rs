//! Still-frame capture for the recognition loop.
//!
//! A [`CaptureSource`] hands out one encoded image per call. The watcher does
//! not talk to camera hardware itself: [`FileCapture`] picks up the frames an
//! external grabber keeps writing to disk.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_WIDTH: u32 = 640;
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("IO Error: {0}")]
    IoError(String),
    #[error("No frame available in {0}")]
    NoFrame(PathBuf),
    #[error("Image Error: {0}")]
    ImageError(String),
    #[error("Other Error: {0}")]
    Other(String),
}

#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Grab the current frame as encoded image bytes.
    async fn capture(&self) -> Result<Vec<u8>, CaptureError>;
}

/// Reads the latest frame from an image file, or from the most recently
/// modified image in a directory, scaled to a fixed width.
pub struct FileCapture {
    path: PathBuf,
    width: u32,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>, width: u32) -> Self {
        FileCapture {
            path: path.into(),
            width,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CaptureSource for FileCapture {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        let path = self.path.clone();
        let width = self.width;
        tokio::task::spawn_blocking(move || grab_frame(&path, width))
            .await
            .map_err(|e| CaptureError::Other(e.to_string()))?
    }
}

/// Keep the aspect ratio when scaling to `target_width`. A zero target keeps
/// the source size.
pub fn scaled_dimensions(width: u32, height: u32, target_width: u32) -> (u32, u32) {
    if target_width == 0 || width == 0 {
        return (width, height);
    }
    let scaled = (height as f64 * target_width as f64 / width as f64).round() as u32;
    (target_width, scaled.max(1))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn newest_image(dir: &Path) -> Result<PathBuf, CaptureError> {
    let entries = std::fs::read_dir(dir).map_err(|e| CaptureError::IoError(e.to_string()))?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
        .ok_or_else(|| CaptureError::NoFrame(dir.to_path_buf()))
}

fn grab_frame(path: &Path, width: u32) -> Result<Vec<u8>, CaptureError> {
    let file = if path.is_dir() {
        newest_image(path)?
    } else {
        path.to_path_buf()
    };
    if !file.exists() {
        return Err(CaptureError::NoFrame(file));
    }

    let img = image::open(&file).map_err(|e| CaptureError::ImageError(e.to_string()))?;
    let (w, h) = scaled_dimensions(img.width(), img.height(), width);
    let img = if (w, h) != (img.width(), img.height()) {
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| CaptureError::ImageError(e.to_string()))?;
    tracing::debug!(file = %file.display(), width = w, height = h, "Captured frame");
    Ok(out.into_inner())
}

/// Hands out the same bytes on every call and counts how often it was asked.
#[derive(Clone)]
pub struct StaticCapture {
    frame: Arc<Vec<u8>>,
    captures: Arc<AtomicUsize>,
}

impl StaticCapture {
    pub fn new(frame: Vec<u8>) -> Self {
        StaticCapture {
            frame: Arc::new(frame),
            captures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, CaptureError> {
        let frame = tokio::fs::read(path)
            .await
            .map_err(|e| CaptureError::IoError(e.to_string()))?;
        Ok(Self::new(frame))
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSource for StaticCapture {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.frame.as_ref().clone())
    }
}

use capture::{CaptureError, CaptureSource, FileCapture};
use image::{ImageFormat, RgbImage};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn write_frame(path: &std::path::Path, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]))
        .save(path)
        .unwrap();
}

#[tokio::test]
async fn scales_single_file_to_width() {
    let dir = TempDir::new().unwrap();
    let frame = dir.path().join("frame.png");
    write_frame(&frame, 1280, 720);

    let bytes = FileCapture::new(&frame, 640).capture().await.unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (640, 360));
}

#[tokio::test]
async fn picks_newest_frame_in_directory() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("a.png");
    let new = dir.path().join("b.png");
    write_frame(&old, 100, 100);
    write_frame(&new, 200, 100);
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let past = SystemTime::now() - Duration::from_secs(60);
    std::fs::File::options()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(past)
        .unwrap();

    let bytes = FileCapture::new(dir.path(), 0).capture().await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (200, 100));
}

#[tokio::test]
async fn empty_directory_has_no_frame() {
    let dir = TempDir::new().unwrap();
    let err = FileCapture::new(dir.path(), 640).capture().await.unwrap_err();
    assert!(matches!(err, CaptureError::NoFrame(_)));
}

#[tokio::test]
async fn missing_file_has_no_frame() {
    let dir = TempDir::new().unwrap();
    let err = FileCapture::new(dir.path().join("gone.jpg"), 640)
        .capture()
        .await
        .unwrap_err();
    assert!(matches!(err, CaptureError::NoFrame(_)));
}

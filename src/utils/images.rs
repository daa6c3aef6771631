use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::errors::{AppError, AppResult};

pub const JPEG_QUALITY: u8 = 90;
pub const USER_PHOTO_SIZE: (u32, u32) = (500, 500);
pub const TOUR_IMAGE_SIZE: (u32, u32) = (2000, 1333);

pub fn not_an_image() -> AppError {
    AppError::bad_request("Not an image! Please upload only images.")
}

/// Accepts `image/*` uploads only.
pub fn ensure_image(content_type: Option<&str>) -> AppResult<()> {
    match content_type {
        Some(ct) if ct.starts_with("image/") => Ok(()),
        _ => Err(not_an_image()),
    }
}

/// Decodes `bytes`, crops and scales to exactly `width x height` and encodes as JPEG.
pub fn resize_to_jpeg(bytes: &[u8], (width, height): (u32, u32)) -> AppResult<Vec<u8>> {
    let img = image::load_from_memory(bytes).map_err(|_| not_an_image())?;
    let resized = img.resize_to_fill(width, height, FilterType::Lanczos3).to_rgb8();

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| AppError::internal(format!("jpeg encoding failed: {}", e)))?;
    Ok(out.into_inner())
}

/// Resizes off the async runtime and writes `<dir>/<filename>`.
pub async fn save_resized(bytes: Vec<u8>, size: (u32, u32), dir: PathBuf, filename: String) -> AppResult<String> {
    let name = filename.clone();
    tokio::task::spawn_blocking(move || -> AppResult<()> {
        let jpeg = resize_to_jpeg(&bytes, size)?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::internal(format!("cannot create {}: {}", dir.display(), e)))?;
        let path = dir.join(&filename);
        std::fs::write(&path, jpeg).map_err(|e| AppError::internal(format!("cannot write {}: {}", path.display(), e)))
    })
    .await??;
    tracing::debug!(file = %name, "stored resized image");
    Ok(name)
}

pub fn users_dir(public_dir: &str) -> PathBuf {
    Path::new(public_dir).join("img").join("users")
}

pub fn tours_dir(public_dir: &str) -> PathBuf {
    Path::new(public_dir).join("img").join("tours")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([40, 160, 90]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn crops_to_requested_size() {
        let jpeg = resize_to_jpeg(&png(800, 300), USER_PHOTO_SIZE).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 500));
    }

    #[test]
    fn rejects_non_images() {
        assert!(ensure_image(Some("text/plain")).is_err());
        assert!(ensure_image(None).is_err());
        assert!(ensure_image(Some("image/png")).is_ok());
        let err = resize_to_jpeg(b"definitely not a picture", USER_PHOTO_SIZE).unwrap_err();
        assert_eq!(err.message, "Not an image! Please upload only images.");
    }

    #[tokio::test]
    async fn writes_file_under_directory() {
        let dir = std::env::temp_dir().join(format!("natours-img-{}", std::process::id()));
        let name = save_resized(png(50, 50), (20, 10), dir.clone(), "t.jpeg".into()).await.unwrap();
        assert_eq!(name, "t.jpeg");
        assert!(dir.join("t.jpeg").exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}

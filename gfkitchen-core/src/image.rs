//! Image validation, download and storage.
//!
//! Generated image URLs are short-lived, so the bytes are fetched right after
//! generation, checked, and written to owned storage.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader};

use crate::http::HttpClient;
use crate::persist::write_atomic;

/// Allowed image formats for recipe photos.
pub const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Maximum file size for images (10MB).
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Result of successfully fetching and validating an image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// The raw image bytes.
    pub data: Vec<u8>,
    /// The detected content type (e.g., "image/jpeg").
    pub content_type: String,
}

/// Validate image data: check format is allowed and detect content type.
///
/// Returns the content type on success (e.g., "image/jpeg").
pub fn validate_image(data: &[u8]) -> Result<String, String> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("Failed to read image: {}", e))?;

    let format = reader
        .format()
        .ok_or_else(|| "Could not detect image format".to_string())?;

    if !ALLOWED_FORMATS.contains(&format) {
        return Err(format!(
            "Unsupported image format: {:?}. Allowed: JPEG, PNG, GIF, WebP",
            format
        ));
    }

    Ok(format.to_mime_type().to_string())
}

/// Fetch an image from a URL and validate its size and format.
pub async fn fetch_and_validate_image<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
) -> Result<FetchedImage, String> {
    let data = client
        .fetch_bytes(url)
        .await
        .map_err(|e| format!("Failed to fetch image: {}", e))?;

    if data.is_empty() {
        return Err("Image download returned no bytes".to_string());
    }

    if data.len() > MAX_FILE_SIZE {
        return Err(format!(
            "Image too large: {} bytes (max {})",
            data.len(),
            MAX_FILE_SIZE
        ));
    }

    let content_type = validate_image(&data)?;

    Ok(FetchedImage { data, content_type })
}

/// File extension for an allowed content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Write a fetched image to `{dir}/{slug}.{ext}`, replacing any previous file.
pub fn save_image(dir: &Path, slug: &str, image: &FetchedImage) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("{}.{}", slug, extension_for(&image.content_type)));
    write_atomic(&path, &image.data)?;
    Ok(path)
}

#[cfg(test)]
pub(crate) fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 150, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

//! Filesystem collaborator for the images folder: listing the taggable
//! files and serving them (optionally thumbnailed) as JPEG.

use std::path::Path;

use image::imageops::FilterType;
use walkdir::WalkDir;

use crate::error::{AppError, Result};

/// Extensions the application considers taggable images.
const IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpg", "png"];

/// Thumbnails fit inside this box, preserving aspect ratio.
const THUMBNAIL_WIDTH: u32 = 192;
const THUMBNAIL_HEIGHT: u32 = 108;

const JPEG_QUALITY: u8 = 85;

/// Sorted filenames of the images directly inside the configured folder.
pub fn list_images(folder: &Path) -> Result<Vec<String>> {
    if !folder.is_dir() {
        tracing::error!(
            "Failed to list images: configured folder {} not found",
            folder.display()
        );
        return Err(AppError::operational("images_folder_missing"));
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(folder).max_depth(1).into_iter() {
        let entry = entry.map_err(|e| {
            tracing::error!("Failed to list images: {e}");
            AppError::operational("images_folder_unreadable")
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension() else { continue };
        if !IMAGE_EXTENSIONS.contains(&ext.to_string_lossy().to_lowercase().as_str()) {
            continue;
        }
        if let Some(name) = path.file_name() {
            names.push(name.to_string_lossy().to_string());
        }
    }

    names.sort();
    Ok(names)
}

/// Load an image from the folder and re-encode it as JPEG, shrinking it
/// to thumbnail size first when asked. Returns the encoded bytes.
pub fn load_jpeg(folder: &Path, fn_: &str, thumbnail: bool) -> Result<Vec<u8>> {
    // Filenames come straight from the catalog; anything path-like is
    // someone probing the server.
    if fn_.contains('/') || fn_.contains('\\') || fn_.contains("..") {
        return Err(AppError::validation("bad_filename"));
    }

    let path = folder.join(fn_);
    if !path.is_file() {
        return Err(AppError::not_found("missing_image_file"));
    }

    let img = image::open(&path).map_err(|e| {
        tracing::error!("Failed to decode {}: {e}", path.display());
        AppError::operational("image_undecodable")
    })?;

    // Shrink only; an image already inside the box is served as-is.
    let img = if thumbnail && (img.width() > THUMBNAIL_WIDTH || img.height() > THUMBNAIL_HEIGHT) {
        img.resize(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Lanczos3)
    } else {
        img
    };
    // JPEG has no alpha or palette, flatten to RGB first
    let rgb = img.into_rgb8();

    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    rgb.write_with_encoder(encoder).map_err(|e| {
        tracing::error!("Failed to encode {} as JPEG: {e}", path.display());
        AppError::operational("image_encode_failed")
    })?;

    Ok(buf)
}

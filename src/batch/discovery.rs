//! Image discovery in directories.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Supported image extensions (lowercase).
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "tga", "tif", "tiff", "webp", "exr", "hdr",
];

/// Whether `path` has a supported image extension (case-insensitive).
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// List the image files directly inside `dir`, sorted by file name.
///
/// Subdirectories are not descended into and hidden files are skipped.
///
/// # Errors
///
/// [`Error::DirectoryUnreadable`] if `dir` is missing, not a directory, or
/// cannot be listed.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let unreadable = |reason: String| Error::DirectoryUnreadable {
        path: dir.to_path_buf(),
        reason,
    };

    if !dir.exists() {
        return Err(unreadable("path does not exist".to_string()));
    }
    if !dir.is_dir() {
        return Err(unreadable("path is not a directory".to_string()));
    }

    let entries = fs::read_dir(dir).map_err(|e| unreadable(e.to_string()))?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| unreadable(e.to_string()))?;
        let path = entry.path();

        let hidden = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with('.'));
        if hidden || !path.is_file() {
            continue;
        }

        if is_supported_image(&path) {
            images.push(path);
        } else {
            debug!(path = %path.display(), "ignoring non-image file");
        }
    }

    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = images.len(), "discovered images");
    Ok(images)
}

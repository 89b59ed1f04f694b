use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IMAGE_EXTENSIONS;
use crate::error::{Error, Result};

/// Lowercase extension of a path with a leading dot, e.g. `.html`
pub fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

/// Returns if the path's extension is in the given (normalized) set
pub fn has_extension_in(path: &Path, extensions: &BTreeSet<String>) -> bool {
    match dotted_extension(path) {
        Some(ext) => extensions.contains(&ext),
        None => false,
    }
}

/// Returns if the file name ends in an extracted-image extension.
/// Case-sensitive: the extractor writes lowercase names, so `.PNG` is not counted.
pub fn is_image_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
        .unwrap_or(false)
}

/// List the immediate files of `directory` whose extension is in `extensions`.
/// Subdirectories are not descended into.
pub fn list_web_assets(directory: &Path, extensions: &BTreeSet<String>) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(Error::Configuration(format!(
            "Folder does not exist: {}",
            directory.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension_in(p, extensions))
        .collect();

    files.sort();
    Ok(files)
}

/// Count entries in an images directory with an image extension
pub fn count_images(images_dir: &Path) -> io::Result<u64> {
    let mut count = 0;
    for entry in fs::read_dir(images_dir)? {
        if is_image_path(&entry?.path()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Total size in bytes of the files directly inside a directory
pub fn dir_size(directory: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(directory)? {
        let metadata = entry?.metadata()?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

// -- Tests --

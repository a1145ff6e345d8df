use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ComposeError, Result};

/// extensions the finders pick up (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// image format inferred from the file extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    Jpeg,
    Png,
    /// anything else, with the extension as found (empty when missing)
    Unsupported(String),
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => SourceFormat::Jpeg,
            "png" => SourceFormat::Png,
            _ => SourceFormat::Unsupported(ext),
        }
    }
}

/// an input image path, never mutated after creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    path: PathBuf,
    format: SourceFormat,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = SourceFormat::from_path(&path);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &SourceFormat {
        &self.format
    }

    /// file name for progress output, falling back to the full path
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// error for a source whose extension has no decoder
    pub(crate) fn unsupported(&self) -> ComposeError {
        let ext = match &self.format {
            SourceFormat::Unsupported(ext) => ext.clone(),
            _ => String::new(),
        };
        ComposeError::UnsupportedFormat {
            path: self.path.clone(),
            ext,
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// expand dirs in input list into their sorted image files (non-recursive)
pub fn expand_image_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| ComposeError::OpenFailure {
                path: path.clone(),
                source,
            })?;
            let mut images: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && has_image_extension(p))
                .collect();
            images.sort();
            result.extend(images);
        } else {
            result.push(path.clone());
        }
    }
    Ok(result)
}

/// every jpg/jpeg/png file below `dir`, at any depth, sorted by path
pub fn find_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let root = dir.to_str().ok_or_else(|| {
        ComposeError::InvalidConfiguration(format!("Non UTF-8 directory: {}", dir.display()))
    })?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(root));
    let walker = glob::glob(&pattern)
        .map_err(|e| ComposeError::InvalidConfiguration(format!("Bad search pattern: {e}")))?;

    let mut images = Vec::new();
    for entry in walker {
        match entry {
            Ok(path) if path.is_file() && has_image_extension(&path) => images.push(path),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %e.path().display(), "Skipping unreadable entry: {}", e.error());
            }
        }
    }
    images.sort();
    Ok(images)
}

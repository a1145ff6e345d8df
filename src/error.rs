use std::path::PathBuf;
use thiserror::Error;

/// boxed cause of a decoder rejection
pub type DecodeCause = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("No input images provided")]
    EmptyInput,
    #[error("Unsupported image format {ext:?}: {}", path.display())]
    UnsupportedFormat { path: PathBuf, ext: String },
    #[error("Failed to open {}: {source}", path.display())]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode {}: {source}", path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: DecodeCause,
    },
    #[error("Image has zero width or height: {}", path.display())]
    InvalidImageDimensions { path: PathBuf },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Failed to write {}: {source}", destination.display())]
    WriteFailure {
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("Cancelled")]
    Cancelled,
    #[error("All {skipped} image(s) failed, nothing to write")]
    NothingComposed { skipped: usize },
}

impl ComposeError {
    pub(crate) fn decode(path: impl Into<PathBuf>, source: impl Into<DecodeCause>) -> Self {
        ComposeError::DecodeFailure {
            path: path.into(),
            source: source.into(),
        }
    }

    /// true for failures tied to a single input image, which the skip policy may absorb
    pub fn is_per_image(&self) -> bool {
        matches!(
            self,
            ComposeError::UnsupportedFormat { .. }
                | ComposeError::OpenFailure { .. }
                | ComposeError::DecodeFailure { .. }
                | ComposeError::InvalidImageDimensions { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ComposeError>;

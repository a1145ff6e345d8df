use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ComposeError, Result};
use crate::geometry::{compute_geometry, LayoutError, LayoutOptions, PageGeometry};
use crate::metadata::read_pixel_size;
use crate::source::ImageSource;
use crate::writer::{DocumentInfo, DocumentWriter, PdfWriter};

/// What to do when a single image cannot be read or laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// stop and report the failing image
    #[default]
    Abort,
    /// log the failure, leave the image out and keep going
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ComposeOptions {
    #[serde(flatten)]
    pub layout: LayoutOptions,
    pub on_error: ErrorPolicy,
    /// Flate-compress pixel data and content streams
    pub compress: bool,
    pub title: Option<String>,
    pub author: Option<String>,
    /// suppress the per-image progress lines
    pub quiet: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            layout: LayoutOptions::default(),
            on_error: ErrorPolicy::Abort,
            compress: true,
            title: None,
            author: None,
            quiet: false,
        }
    }
}

/// one page of the finished document
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPage {
    pub source: PathBuf,
    pub geometry: PageGeometry,
}

#[derive(Debug)]
pub struct SkippedImage {
    pub source: PathBuf,
    pub error: ComposeError,
}

#[derive(Debug, Default)]
pub struct ComposeReport {
    pub pages: Vec<ComposedPage>,
    pub skipped: Vec<SkippedImage>,
}

impl ComposeReport {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

pub struct PageCompositor {
    options: ComposeOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl PageCompositor {
    pub fn new(options: ComposeOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// stop before the next image once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Lay out `sources` one per page and write the PDF to `destination`.
    pub fn compose(&self, sources: &[ImageSource], destination: &Path) -> Result<ComposeReport> {
        let writer = PdfWriter::new(
            self.options.compress,
            DocumentInfo {
                title: self.options.title.clone(),
                author: self.options.author.clone(),
            },
        );
        self.compose_with(sources, writer, destination)
    }

    /// Same as [`compose`](Self::compose) with a caller-supplied writer.
    pub fn compose_with<W: DocumentWriter>(
        &self,
        sources: &[ImageSource],
        mut writer: W,
        destination: &Path,
    ) -> Result<ComposeReport> {
        self.check_configuration()?;
        if sources.is_empty() {
            return Err(ComposeError::EmptyInput);
        }

        let start = Instant::now();
        let total = sources.len();
        let mut report = ComposeReport::default();

        for (i, source) in sources.iter().enumerate() {
            if self.is_cancelled() {
                tracing::info!(done = i, total, "compose cancelled");
                return Err(ComposeError::Cancelled);
            }
            if !self.options.quiet {
                eprintln!("[{}/{}] adding: {}", i + 1, total, source.display_name());
            }

            match self.place(source, &mut writer) {
                Ok(geometry) => report.pages.push(ComposedPage {
                    source: source.path().to_path_buf(),
                    geometry,
                }),
                Err(error) if error.is_per_image() && self.options.on_error == ErrorPolicy::Skip => {
                    tracing::warn!(path = %source.path().display(), "skipping image: {error}");
                    report.skipped.push(SkippedImage {
                        source: source.path().to_path_buf(),
                        error,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        if report.pages.is_empty() {
            return Err(ComposeError::NothingComposed {
                skipped: report.skipped.len(),
            });
        }

        writer.finish(destination)?;

        tracing::info!(
            destination = %destination.display(),
            pages = report.page_count(),
            skipped = report.skipped.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "document written"
        );
        Ok(report)
    }

    fn place<W: DocumentWriter>(&self, source: &ImageSource, writer: &mut W) -> Result<PageGeometry> {
        let pixels = read_pixel_size(source)?;
        let geometry = compute_geometry(pixels, &self.options.layout).map_err(|e| match e {
            LayoutError::InvalidImageDimensions => ComposeError::InvalidImageDimensions {
                path: source.path().to_path_buf(),
            },
            LayoutError::InvalidConfiguration(reason) => ComposeError::InvalidConfiguration(reason),
        })?;
        tracing::debug!(
            path = %source.path().display(),
            width_px = pixels.width,
            height_px = pixels.height,
            orientation = ?geometry.orientation,
            scale = geometry.scale,
            "placing image"
        );
        writer.add_page(source, &geometry)?;
        Ok(geometry)
    }

    fn check_configuration(&self) -> Result<()> {
        self.options.layout.validate().map_err(|e| match e {
            LayoutError::InvalidConfiguration(reason) => ComposeError::InvalidConfiguration(reason),
            other => ComposeError::InvalidConfiguration(other.to_string()),
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

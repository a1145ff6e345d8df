//! Lay out JPEG and PNG images as the pages of a single PDF.
//!
//! [`PageCompositor`] reads each image's bounds, computes a [`PageGeometry`]
//! from the [`LayoutOptions`] and hands the page to a [`DocumentWriter`].

mod config;
pub mod compositor;
pub mod embed;
pub mod error;
pub mod folder;
pub mod geometry;
pub mod header;
pub mod metadata;
pub mod source;
pub mod writer;

pub use compositor::{ComposeOptions, ComposeReport, ComposedPage, ErrorPolicy, PageCompositor, SkippedImage};
pub use error::{ComposeError, Result};
pub use folder::{compose_folder, compose_subfolders, folder_output_path, FolderOutcome};
pub use geometry::{
    compute_geometry, FitMode, LayoutOptions, Orientation, PageGeometry, PageSize, PixelSize, RotationPolicy,
};
pub use metadata::read_pixel_size;
pub use source::{expand_image_paths, find_images, ImageSource, SourceFormat};
pub use writer::{DocumentInfo, DocumentWriter, PdfWriter};

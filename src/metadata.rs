use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::ImageDecoder;
use std::fs::File;
use std::io::BufReader;

use crate::error::{ComposeError, Result};
use crate::geometry::PixelSize;
use crate::source::{ImageSource, SourceFormat};

/// Read an image's pixel bounds from its header.
///
/// The decoder is picked from the extension. The file handle lives only for
/// this call and is dropped on every return path.
pub fn read_pixel_size(source: &ImageSource) -> Result<PixelSize> {
    let path = source.path();
    let file = File::open(path).map_err(|e| ComposeError::OpenFailure {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader = BufReader::new(file);

    let (width, height) = match source.format() {
        SourceFormat::Jpeg => JpegDecoder::new(reader)
            .map_err(|e| ComposeError::decode(path, e))?
            .dimensions(),
        SourceFormat::Png => PngDecoder::new(reader)
            .map_err(|e| ComposeError::decode(path, e))?
            .dimensions(),
        SourceFormat::Unsupported(_) => return Err(source.unsupported()),
    };

    tracing::trace!(path = %path.display(), width, height, "read image bounds");
    Ok(PixelSize::new(width, height))
}

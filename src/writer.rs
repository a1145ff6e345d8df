//! PDF assembly on top of lopdf.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;
use std::path::Path;

use crate::embed::{deflate, prepare_image};
use crate::error::{ComposeError, Result};
use crate::geometry::{PageGeometry, Point, MM_PER_INCH};
use crate::source::ImageSource;

const PT_PER_MM: f64 = 72.0 / MM_PER_INCH;

pub fn mm_to_pt(mm: f64) -> f32 {
    (mm * PT_PER_MM) as f32
}

/// Destination of composed pages.
///
/// `finish` consumes the writer, so a finalized document cannot gain pages.
pub trait DocumentWriter {
    /// add one page laid out per `geometry` showing `source`
    fn add_page(&mut self, source: &ImageSource, geometry: &PageGeometry) -> Result<()>;

    /// serialize everything to `destination` ("-" for stdout)
    fn finish(self, destination: &Path) -> Result<()>;
}

/// Info dictionary entries besides Producer and CreationDate
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    page_ids: Vec<Object>,
    compress: bool,
    info: DocumentInfo,
}

impl PdfWriter {
    pub fn new(compress: bool, info: DocumentInfo) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            page_ids: Vec::new(),
            compress,
            info,
        }
    }

    fn write_catalog(&mut self) {
        let count = self.page_ids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => std::mem::take(&mut self.page_ids),
                "Count" => count,
            }),
        );

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut info = lopdf::Dictionary::new();
        info.set(
            "Producer",
            Object::string_literal(format!("imgpdf {}", env!("CARGO_PKG_VERSION"))),
        );
        info.set(
            "CreationDate",
            Object::string_literal(chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string()),
        );
        if let Some(title) = &self.info.title {
            info.set("Title", Object::string_literal(title.as_str()));
        }
        if let Some(author) = &self.info.author {
            info.set("Author", Object::string_literal(author.as_str()));
        }
        let info_id = self.doc.add_object(info);
        self.doc.trailer.set("Info", info_id);
    }
}

impl DocumentWriter for PdfWriter {
    fn add_page(&mut self, source: &ImageSource, geometry: &PageGeometry) -> Result<()> {
        // everything that can fail for this image happens before the document is touched
        let prepared = prepare_image(source, self.compress)?;
        let content = Content {
            operations: placement_operations(geometry, "Im0"),
        }
        .encode()?;
        let content = deflate(content, self.compress).map_err(|e| ComposeError::decode(source.path(), e))?;

        let image_id = prepared.into_xobject(&mut self.doc);
        let mut content_dict = dictionary! {};
        if self.compress {
            content_dict.set("Filter", "FlateDecode");
        }
        let content_id = self.doc.add_object(Stream::new(content_dict, content));

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(mm_to_pt(geometry.page_width)),
                Object::Real(mm_to_pt(geometry.page_height)),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        self.page_ids.push(page_id.into());
        Ok(())
    }

    fn finish(mut self, destination: &Path) -> Result<()> {
        self.write_catalog();

        let write_failure = |source| ComposeError::WriteFailure {
            destination: destination.to_path_buf(),
            source,
        };
        if destination == Path::new("-") {
            let stdout = std::io::stdout();
            let mut out = std::io::BufWriter::new(stdout.lock());
            self.doc.save_to(&mut out).map_err(write_failure)?;
            out.flush().map_err(write_failure)?;
        } else {
            self.doc.save(destination).map_err(write_failure)?;
        }
        Ok(())
    }
}

/// `cm` matrix rotating PDF user space clockwise by `degrees` around `pivot` (in points)
fn rotation_matrix(degrees: f64, pivot: (f64, f64)) -> [f64; 6] {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (a, b, c, d) = (cos, -sin, sin, cos);
    let (px, py) = pivot;
    [a, b, c, d, px - a * px - c * py, py - b * px - d * py]
}

/// Content stream drawing the named image XObject per `geometry`.
///
/// Geometry is measured from the top-left page corner in mm; PDF user space
/// starts bottom-left in points.
pub fn placement_operations(geometry: &PageGeometry, xobject: &str) -> Vec<Operation> {
    let page_h = geometry.page_height * PT_PER_MM;
    let rect = &geometry.placement;
    let w = rect.width * PT_PER_MM;
    let h = rect.height * PT_PER_MM;
    let x = rect.x * PT_PER_MM;
    let y = page_h - (rect.y * PT_PER_MM + h);

    let mut ops = vec![Operation::new("q", vec![])];
    if let Some(rotation) = &geometry.rotation {
        let Point { x: px, y: py } = rotation.pivot;
        let m = rotation_matrix(rotation.degrees, (px * PT_PER_MM, page_h - py * PT_PER_MM));
        ops.push(Operation::new("cm", m.iter().map(|v| Object::Real(*v as f32)).collect()));
    }
    ops.push(Operation::new(
        "cm",
        vec![
            Object::Real(w as f32),
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(h as f32),
            Object::Real(x as f32),
            Object::Real(y as f32),
        ],
    ));
    ops.push(Operation::new("Do", vec![Object::Name(xobject.as_bytes().to_vec())]));
    ops.push(Operation::new("Q", vec![]));
    ops
}

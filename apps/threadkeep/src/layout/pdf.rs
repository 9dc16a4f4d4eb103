//! printpdf-backed `DrawingBackend`.
//!
//! Layout coordinates are millimetres from the top-left corner; PDF user space
//! is points from the bottom-left, so every placement flips the y axis.
//!
//! The backend only holds page ops and decoded pixels while drawing. The
//! `PdfDocument` itself is built inside `save`, which keeps the backend `Send`
//! so it can move onto a blocking worker.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use printpdf::color::Color;
use printpdf::graphics::{Line, LinePoint, Point};
use printpdf::image::RawImage;
use printpdf::matrix::TextMatrix;
use printpdf::ops::Op;
use printpdf::text::TextItem;
use printpdf::xobject::{XObject, XObjectTransform};
use printpdf::{BuiltinFont, Mm, PdfDocument, PdfPage, PdfSaveOptions, Pt, Rgb, XObjectId};
use tracing::{debug, info};

use crate::image_store::ImageStore;
use crate::layout::backend::{
    BackendError, BackendFactory, DrawingBackend, ImageFormat, PageSize, Rect,
};
use crate::layout::font_metrics::{get_metrics, PageConfig};
use crate::layout::wrap::wrap_text;

const DOCUMENT_TITLE: &str = "Thread export";
const SEPARATOR_THICKNESS_PT: f32 = 0.5;
/// Upper bound on `_N` suffixes tried before giving up on a file name.
const MAX_NAME_SUFFIX: u32 = 1000;

fn mm_to_pt(mm: f32) -> f32 {
    Mm(mm).into_pt().0
}

pub struct PdfBackend {
    config: PageConfig,
    images: ImageStore,
    output_dir: PathBuf,
    /// Ops of the page currently being drawn.
    page_ops: Vec<Op>,
    finished_pages: Vec<Vec<Op>>,
    /// Images already decoded, by source, with their XObject id and pixel size.
    xobjects: HashMap<String, (XObjectId, (usize, usize))>,
    /// Pixel data attached to the document when it is built.
    raw_images: Vec<(XObjectId, RawImage)>,
    draw_gray: u8,
}

impl PdfBackend {
    pub fn new(config: PageConfig, images: ImageStore, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            images,
            output_dir: output_dir.into(),
            page_ops: Vec::new(),
            finished_pages: Vec::new(),
            xobjects: HashMap::new(),
            raw_images: Vec::new(),
            draw_gray: 0,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Pages drawn so far, including the open one.
    pub fn page_count(&self) -> usize {
        self.finished_pages.len() + 1
    }

    fn page_height_pt(&self) -> f32 {
        mm_to_pt(self.config.page_height_mm)
    }

    /// Decodes the image for `src` on first use.
    fn image_xobject(&mut self, src: &str) -> Result<(XObjectId, (usize, usize)), BackendError> {
        if let Some((id, dims)) = self.xobjects.get(src) {
            return Ok((id.clone(), *dims));
        }

        let data = self
            .images
            .get(src)
            .ok_or_else(|| BackendError::MissingImage(src.to_string()))?;
        let mut warnings = Vec::new();
        let raw_image = RawImage::decode_from_bytes(&data, &mut warnings).map_err(|e| {
            BackendError::ImageDecode {
                src: src.to_string(),
                message: e.to_string(),
            }
        })?;
        let dims = (raw_image.width, raw_image.height);
        let id = XObjectId::new();
        self.raw_images.push((id.clone(), raw_image));
        self.xobjects.insert(src.to_string(), (id.clone(), dims));
        Ok((id, dims))
    }

    /// Assembles the drawn pages into a document and serializes it.
    fn render_document(&mut self) -> Vec<u8> {
        let width = Mm(self.config.page_width_mm);
        let height = Mm(self.config.page_height_mm);
        let last_page = std::mem::take(&mut self.page_ops);

        let mut document = PdfDocument::new(DOCUMENT_TITLE);
        for (id, raw_image) in self.raw_images.drain(..) {
            document
                .resources
                .xobjects
                .map
                .insert(id, XObject::Image(raw_image));
        }
        document.pages = self
            .finished_pages
            .drain(..)
            .chain(std::iter::once(last_page))
            .map(|ops| PdfPage::new(width, height, ops))
            .collect();

        let mut bytes: Vec<u8> = Vec::new();
        let mut warnings = Vec::new();
        document.save_writer(&mut bytes, &PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(warnings = warnings.len(), "printpdf reported warnings while saving");
        }
        bytes
    }
}

/// Stores `bytes` in `dir` as `filename`, or as the first free `<stem>_<n>.pdf`
/// when that name is taken.
///
/// The document is staged in a hidden temp file and moved into place without
/// replacing an existing export, so readers never see a partial file.
fn write_unique(dir: &Path, filename: &str, bytes: &[u8]) -> std::io::Result<String> {
    std::fs::create_dir_all(dir)?;
    let mut staged = tempfile::Builder::new()
        .prefix(".threadkeep-")
        .suffix(".part")
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;

    let stem = filename.strip_suffix(".pdf").unwrap_or(filename);
    for n in 1..=MAX_NAME_SUFFIX {
        let candidate = if n == 1 {
            filename.to_string()
        } else {
            format!("{stem}_{n}.pdf")
        };
        match staged.persist_noclobber(dir.join(&candidate)) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => staged = e.file,
            Err(e) => return Err(e.error),
        }
    }
    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free file name left for {filename}"),
    ))
}

impl DrawingBackend for PdfBackend {
    fn page_size(&self) -> PageSize {
        PageSize {
            width: self.config.page_width_mm,
            height: self.config.page_height_mm,
        }
    }

    fn split_text_to_size(&self, text: &str, max_width: f32) -> Vec<String> {
        wrap_text(text, max_width, get_metrics(), self.config.font_size_pt)
    }

    fn text(&mut self, lines: &[String], x: f32, y: f32) -> Result<(), BackendError> {
        let page_height = self.page_height_pt();
        self.page_ops.push(Op::StartTextSection);
        self.page_ops.push(Op::SetFillColor {
            col: Color::Rgb(Rgb::new(0.0, 0.0, 0.0, None)),
        });
        self.page_ops.push(Op::SetFontSizeBuiltinFont {
            size: Pt(self.config.font_size_pt),
            font: BuiltinFont::Helvetica,
        });
        for (i, line) in lines.iter().enumerate() {
            let baseline = y + i as f32 * self.config.line_height_mm;
            self.page_ops.push(Op::SetTextMatrix {
                matrix: TextMatrix::Translate(Pt(mm_to_pt(x)), Pt(page_height - mm_to_pt(baseline))),
            });
            self.page_ops.push(Op::WriteTextBuiltinFont {
                items: vec![TextItem::Text(line.clone())],
                font: BuiltinFont::Helvetica,
            });
        }
        self.page_ops.push(Op::EndTextSection);
        Ok(())
    }

    fn add_image(&mut self, src: &str, format: ImageFormat, rect: Rect) -> Result<(), BackendError> {
        // printpdf sniffs the encoding from the bytes; the declared format is informational.
        debug!(src, ?format, "Placing image");
        let (id, (img_w, img_h)) = self.image_xobject(src)?;

        let width_pt = mm_to_pt(rect.width);
        let height_pt = mm_to_pt(rect.height);
        let transform = XObjectTransform {
            translate_x: Some(Pt(mm_to_pt(rect.x))),
            translate_y: Some(Pt(self.page_height_pt() - mm_to_pt(rect.y) - height_pt)),
            scale_x: Some(width_pt / img_w as f32),
            scale_y: Some(height_pt / img_h as f32),
            rotate: None,
            dpi: Some(72.0),
        };
        self.page_ops.push(Op::UseXobject { id, transform });
        Ok(())
    }

    fn set_draw_gray(&mut self, level: u8) {
        self.draw_gray = level;
    }

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), BackendError> {
        let page_height = self.page_height_pt();
        let gray = self.draw_gray as f32 / 255.0;
        let point = |x: f32, y: f32| LinePoint {
            p: Point {
                x: Pt(mm_to_pt(x)),
                y: Pt(page_height - mm_to_pt(y)),
            },
            bezier: false,
        };

        self.page_ops.push(Op::SetOutlineColor {
            col: Color::Rgb(Rgb::new(gray, gray, gray, None)),
        });
        self.page_ops.push(Op::SetOutlineThickness {
            pt: Pt(SEPARATOR_THICKNESS_PT),
        });
        self.page_ops.push(Op::DrawLine {
            line: Line {
                points: vec![point(x1, y1), point(x2, y2)],
                is_closed: false,
            },
        });
        Ok(())
    }

    fn add_page(&mut self) {
        let ops = std::mem::take(&mut self.page_ops);
        self.finished_pages.push(ops);
    }

    fn save(&mut self, filename: &str) -> Result<String, BackendError> {
        let pages = self.page_count();
        let bytes = self.render_document();
        let stored = write_unique(&self.output_dir, filename, &bytes)?;
        info!(
            path = %self.output_dir.join(&stored).display(),
            pages,
            bytes = bytes.len(),
            "PDF written"
        );
        Ok(stored)
    }
}

/// Opens a `PdfBackend` per export, sharing the export's image store.
#[derive(Clone)]
pub struct PdfBackendFactory {
    config: PageConfig,
    images: ImageStore,
    output_dir: PathBuf,
}

impl PdfBackendFactory {
    pub fn new(config: PageConfig, images: ImageStore, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            images,
            output_dir: output_dir.into(),
        }
    }
}

impl BackendFactory for PdfBackendFactory {
    type Backend = PdfBackend;

    fn create(&self) -> Result<PdfBackend, BackendError> {
        Ok(PdfBackend::new(
            self.config.clone(),
            self.images.clone(),
            self.output_dir.clone(),
        ))
    }
}

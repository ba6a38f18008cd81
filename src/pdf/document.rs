//! PDFium-backed document load, rasterization and save

use crate::editor::{
    apply_ops, BurnInResult, CanvasError, Color, DocPoint, DocRect, DocumentPage, EditOp,
    EditorConfig, EditorSession, PageCanvas, PageRaster,
};
use crate::error::{Error, Result};
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use serde::Serialize;
use std::io::Cursor;

/// Get PDFium instance (creates new instance each time - PDFium is not thread-safe)
fn create_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

fn map_pdfium_error(err: PdfiumError) -> Error {
    match err {
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
            Error::PasswordRequired
        }
        _ => Error::Pdfium {
            reason: format!("{}", err),
        },
    }
}

/// Reject bytes that do not start with a PDF header
pub fn ensure_pdf_header(data: &[u8]) -> Result<()> {
    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::InvalidPdf {
            reason: "Not a valid PDF file".to_string(),
        });
    }
    Ok(())
}

fn load_document<'a>(
    pdfium: &'a Pdfium,
    data: &'a [u8],
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>> {
    pdfium
        .load_pdf_from_byte_slice(data, password)
        .map_err(map_pdfium_error)
}

fn page_at<'a>(document: &PdfDocument<'a>, page_number: u32) -> Result<PdfPage<'a>> {
    let total = document.pages().len() as u32;
    if page_number < 1 || page_number > total {
        return Err(Error::PageOutOfBounds {
            page: page_number,
            total,
        });
    }
    document
        .pages()
        .get((page_number - 1) as u16)
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to get page {}: {}", page_number, e),
        })
}

fn document_page(page: &PdfPage) -> Result<DocumentPage> {
    DocumentPage::new(page.width().value as f64, page.height().value as f64)
}

fn check_pixel_budget(width: u32, height: u32, max_pixels: u64) -> Result<()> {
    let area = u64::from(width) * u64::from(height);
    if area > max_pixels {
        return Err(Error::ImageDimensionExceeded {
            detail: format!("{}x{} exceeds {} pixels", width, height, max_pixels),
        });
    }
    Ok(())
}

fn encode_image(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let result = match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut Cursor::new(&mut bytes), format),
        _ => image.write_to(&mut Cursor::new(&mut bytes), format),
    };
    result.map_err(|e| Error::InvalidImage {
        reason: format!("Failed to encode {:?}: {}", format, e),
    })?;
    Ok(bytes)
}

fn render_raster(page: &PdfPage, raster: &PageRaster) -> Result<DynamicImage> {
    let config = PdfRenderConfig::new()
        .set_target_size(raster.pixel_width as i32, raster.pixel_height as i32)
        .render_form_data(true)
        .render_annotations(true);
    let bitmap = page.render_with_config(&config).map_err(map_pdfium_error)?;
    Ok(bitmap.as_image())
}

/// A page rasterized for editing
#[derive(Debug, Clone, Serialize)]
pub struct PagePreview {
    /// Page number (1-indexed)
    pub page: u32,
    pub page_count: u32,
    pub document_page: DocumentPage,
    pub raster: PageRaster,
    /// PNG encoded raster
    #[serde(skip)]
    pub png: Vec<u8>,
}

/// Render one page at `scale` pixels per point.
///
/// The raster has exactly the size an editing session computes for the same
/// page and scale, so coordinates taken from the preview project correctly.
pub fn render_preview(
    data: &[u8],
    password: Option<&str>,
    page_number: u32,
    scale: f64,
    max_pixels: u64,
) -> Result<PagePreview> {
    ensure_pdf_header(data)?;
    let pdfium = create_pdfium()?;
    let document = load_document(&pdfium, data, password)?;
    let page_count = document.pages().len() as u32;
    let page = page_at(&document, page_number)?;

    let document_page = document_page(&page)?;
    let raster = PageRaster::for_page(&document_page, scale)?;
    check_pixel_budget(raster.pixel_width, raster.pixel_height, max_pixels)?;

    let image = render_raster(&page, &raster)?;
    let png = encode_image(&image, ImageFormat::Png)?;

    Ok(PagePreview {
        page: page_number,
        page_count,
        document_page,
        raster,
        png,
    })
}

/// Render every page as JPEG, returned with 1-indexed page numbers
pub fn render_pages_jpeg(
    data: &[u8],
    password: Option<&str>,
    scale: f64,
    max_pixels: u64,
) -> Result<Vec<(u32, Vec<u8>)>> {
    ensure_pdf_header(data)?;
    let pdfium = create_pdfium()?;
    let document = load_document(&pdfium, data, password)?;
    let page_count = document.pages().len() as u32;

    let mut rendered = Vec::with_capacity(page_count as usize);
    for page_number in 1..=page_count {
        let page = page_at(&document, page_number)?;
        let raster = PageRaster::for_page(&document_page(&page)?, scale)?;
        check_pixel_budget(raster.pixel_width, raster.pixel_height, max_pixels)?;

        let image = render_raster(&page, &raster)?;
        rendered.push((page_number, encode_image(&image, ImageFormat::Jpeg)?));
        tracing::debug!(page = page_number, "Rendered page to JPEG");
    }

    Ok(rendered)
}

/// Plain text of all pages, separated by blank lines
pub fn extract_text(data: &[u8], password: Option<&str>) -> Result<String> {
    ensure_pdf_header(data)?;
    let pdfium = create_pdfium()?;
    let document = load_document(&pdfium, data, password)?;

    let mut pages = Vec::new();
    for page in document.pages().iter() {
        // Pages without a text layer contribute nothing
        if let Ok(text) = page.text() {
            pages.push(text.all());
        }
    }
    Ok(pages.join("\n\n"))
}

/// Build a PDF with one page per image, each page sized to the image in points
pub fn images_to_pdf(images: &[Vec<u8>], max_pixels: u64) -> Result<Vec<u8>> {
    if images.is_empty() {
        return Err(Error::InvalidImage {
            reason: "No images provided".to_string(),
        });
    }

    let pdfium = create_pdfium()?;
    let mut document = pdfium.create_new_pdf().map_err(map_pdfium_error)?;

    for (index, bytes) in images.iter().enumerate() {
        let image = image::load_from_memory(bytes).map_err(|e| Error::InvalidImage {
            reason: format!("image {}: {}", index + 1, e),
        })?;
        check_pixel_budget(image.width(), image.height(), max_pixels)?;

        let width = PdfPoints::new(image.width() as f32);
        let height = PdfPoints::new(image.height() as f32);
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(map_pdfium_error)?;
        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &image,
                Some(width),
                Some(height),
            )
            .map_err(map_pdfium_error)?;
    }

    document.save_to_bytes().map_err(map_pdfium_error)
}

/// [`PageCanvas`] that writes page objects into a PDFium page
pub struct PdfiumPageCanvas<'p, 'a> {
    page: &'p mut PdfPage<'a>,
    font: PdfFontToken,
}

impl<'p, 'a> PdfiumPageCanvas<'p, 'a> {
    pub fn new(page: &'p mut PdfPage<'a>, font: PdfFontToken) -> Self {
        Self { page, font }
    }
}

impl PageCanvas for PdfiumPageCanvas<'_, '_> {
    fn draw_image(
        &mut self,
        encoded: &[u8],
        rect: DocRect,
    ) -> std::result::Result<(), CanvasError> {
        let image =
            image::load_from_memory(encoded).map_err(|e| CanvasError::ImageDecode(e.to_string()))?;
        self.page
            .objects_mut()
            .create_image_object(
                PdfPoints::new(rect.origin.x as f32),
                PdfPoints::new(rect.origin.y as f32),
                &image,
                Some(PdfPoints::new(rect.width as f32)),
                Some(PdfPoints::new(rect.height as f32)),
            )
            .map_err(|e| CanvasError::Backend(e.to_string()))?;
        Ok(())
    }

    fn draw_text(
        &mut self,
        text: &str,
        baseline: DocPoint,
        font_size: f64,
        color: Color,
    ) -> std::result::Result<(), CanvasError> {
        let mut object = self
            .page
            .objects_mut()
            .create_text_object(
                PdfPoints::new(baseline.x as f32),
                PdfPoints::new(baseline.y as f32),
                text,
                self.font,
                PdfPoints::new(font_size as f32),
            )
            .map_err(|e| CanvasError::Text(e.to_string()))?;
        object
            .set_fill_color(PdfColor::new(color.r, color.g, color.b, color.a))
            .map_err(|e| CanvasError::Text(e.to_string()))?;
        Ok(())
    }
}

/// Result of editing one page
#[derive(Debug, Clone)]
pub struct EditedPage {
    pub pdf: Vec<u8>,
    pub raster: PageRaster,
    pub burn_in: BurnInResult,
    pub annotations_created: usize,
}

/// Raster an edit is replayed against, refused when it exceeds `max_pixels`
fn editing_raster(page: &DocumentPage, scale: f64, max_pixels: u64) -> Result<PageRaster> {
    let raster = PageRaster::for_page(page, scale)?;
    check_pixel_budget(raster.pixel_width, raster.pixel_height, max_pixels)?;
    Ok(raster)
}

/// Session settings for replaying `ops`; undo snapshots are only kept when an op can use them
fn replay_config(config: &EditorConfig, ops: &[EditOp]) -> EditorConfig {
    let mut config = config.clone();
    if !ops.iter().any(|op| matches!(op, EditOp::UndoStroke)) {
        config.undo_depth = 0;
    }
    config
}

/// Replay `ops` on a fresh editing session for one page, burn them in and save.
///
/// Coordinates in `ops` are raster pixels of the page rendered at `scale`.
pub fn edit_page(
    data: &[u8],
    password: Option<&str>,
    page_number: u32,
    scale: f64,
    max_pixels: u64,
    ops: &[EditOp],
    config: &EditorConfig,
) -> Result<EditedPage> {
    ensure_pdf_header(data)?;
    let pdfium = create_pdfium()?;
    let mut document = load_document(&pdfium, data, password)?;
    let font = document.fonts_mut().helvetica();
    let mut page = page_at(&document, page_number)?;

    let doc_page = document_page(&page)?;
    let raster = editing_raster(&doc_page, scale, max_pixels)?;
    let mut session = EditorSession::new(replay_config(config, ops));
    session.load_raster(doc_page, raster)?;
    let created = apply_ops(&mut session, ops)?;

    let burn_in = {
        let mut canvas = PdfiumPageCanvas::new(&mut page, font);
        session.burn_in(&mut canvas)?
    };
    session.close();
    drop(page);

    let pdf = document.save_to_bytes().map_err(map_pdfium_error)?;
    tracing::info!(
        page = page_number,
        applied = burn_in.applied_count,
        skipped = burn_in.skipped.len(),
        "Page edited"
    );

    Ok(EditedPage {
        pdf,
        raster,
        burn_in,
        annotations_created: created.len(),
    })
}

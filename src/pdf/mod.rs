//! PDF processing layer
//!
//! PDFium renders pages and writes burned-in edits; qpdf copies, merges and
//! compresses pages.

mod document;
pub mod qpdf;

pub use document::{
    edit_page, ensure_pdf_header, extract_text, images_to_pdf, render_pages_jpeg,
    render_preview, EditedPage, PagePreview, PdfiumPageCanvas,
};

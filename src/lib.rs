//! DocDesk Library
//!
//! Page editing for PDFs (freehand ink, text and image annotations burned into
//! the document) plus document utilities, exposed as MCP tools:
//! - `preview_page`: Render a page raster to edit against
//! - `edit_pdf_page`: Apply edit operations to a page and save them into the PDF
//! - `merge_pdfs`, `split_pdf`, `compress_pdf`: Page-level PDF assembly
//! - `pdf_to_images`, `images_to_pdf`: Convert between PDFs and images
//! - `scan_documents`: Batch AI document scanning, packaged as a ZIP
//! - `pdf_to_document_structure`: AI transcription of pages into Word-style blocks
//! - `enhance_passport_photo`, `generate_resume_content`, `summarize_pdf`: AI helpers

pub mod ai;
pub mod archive;
pub mod batch;
pub mod editor;
pub mod error;
pub mod pdf;
pub mod server;
pub mod source;

pub use error::{Error, Result};
pub use server::{run_server, run_server_with_config, DocDeskServer, ServerConfig};

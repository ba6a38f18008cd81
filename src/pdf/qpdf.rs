//! Page-level document assembly with qpdf (vendored FFI)
//!
//! Splitting a document into single-page files, merging documents and
//! rewriting with stream compression.

use crate::error::{Error, Result};
use qpdf::{ObjectStreamMode, QPdf};

/// Parse a page selection into 0-indexed page indices, in the order given.
///
/// Accepts comma separated parts, each one of:
/// - `N` (1-indexed page), `z` (last page), `rN` (N-th from last)
/// - `A-B` where A and B are any of the above; `B < A` walks backwards
/// - a range followed by `:odd` or `:even`
pub fn parse_page_selection(selection: &str, num_pages: u32) -> Result<Vec<u32>> {
    if num_pages == 0 {
        return Err(Error::QpdfError {
            reason: "PDF has no pages".to_string(),
        });
    }

    let mut indices: Vec<u32> = Vec::new();

    for part in selection.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (span, parity) = match part.rsplit_once(':') {
            Some((span, "odd")) => (span, Some(1)),
            Some((span, "even")) => (span, Some(0)),
            Some(_) => {
                return Err(Error::InvalidPageRange {
                    range: part.to_string(),
                })
            }
            None => (part, None),
        };

        let pages: Vec<u32> = match span.split_once('-') {
            Some((start, end)) => {
                let start = resolve_page_ref(start, num_pages)?;
                let end = resolve_page_ref(end, num_pages)?;
                if start <= end {
                    (start..=end).collect()
                } else {
                    (end..=start).rev().collect()
                }
            }
            None => vec![resolve_page_ref(span, num_pages)?],
        };

        indices.extend(
            pages
                .into_iter()
                .filter(|p| parity.map_or(true, |rem| p % 2 == rem))
                .map(|p| p - 1),
        );
    }

    if indices.is_empty() {
        return Err(Error::InvalidPageRange {
            range: selection.to_string(),
        });
    }

    Ok(indices)
}

fn resolve_page_ref(s: &str, num_pages: u32) -> Result<u32> {
    let s = s.trim();
    let invalid = || Error::InvalidPageRange {
        range: s.to_string(),
    };

    let page = if s == "z" {
        num_pages
    } else if let Some(from_end) = s.strip_prefix('r') {
        let n: u32 = from_end.parse().map_err(|_| invalid())?;
        if n == 0 || n > num_pages {
            return Err(invalid());
        }
        num_pages - n + 1
    } else {
        s.parse().map_err(|_| invalid())?
    };

    if page == 0 || page > num_pages {
        return Err(Error::PageOutOfBounds {
            page,
            total: num_pages,
        });
    }
    Ok(page)
}

fn open_qpdf(data: &[u8], password: Option<&str>) -> Result<QPdf> {
    match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(data, pwd).map_err(map_qpdf_error),
        None => QPdf::read_from_memory(data).map_err(map_qpdf_error),
    }
}

fn map_qpdf_error(e: qpdf::QPdfError) -> Error {
    match e.error_code() {
        qpdf::QPdfErrorCode::InvalidPassword => Error::IncorrectPassword,
        _ => Error::QpdfError {
            reason: e.to_string(),
        },
    }
}

/// Number of pages in a document
pub fn page_count(data: &[u8], password: Option<&str>) -> Result<u32> {
    open_qpdf(data, password)?
        .get_num_pages()
        .map_err(map_qpdf_error)
}

/// Copy each selected page into its own single-page document.
///
/// Returns `(page_number, pdf_bytes)` pairs with 1-indexed page numbers, in
/// selection order. Without a selection every page is emitted.
pub fn split_pages(
    data: &[u8],
    password: Option<&str>,
    selection: Option<&str>,
) -> Result<Vec<(u32, Vec<u8>)>> {
    let source = open_qpdf(data, password)?;
    let num_pages = source.get_num_pages().map_err(map_qpdf_error)?;

    let indices = match selection {
        Some(selection) => parse_page_selection(selection, num_pages)?,
        None => (0..num_pages).collect(),
    };

    let mut outputs = Vec::with_capacity(indices.len());
    for idx in indices {
        let page = source.get_page(idx).ok_or(Error::PageOutOfBounds {
            page: idx + 1,
            total: num_pages,
        })?;

        let dest = QPdf::empty();
        let copied = dest.copy_from_foreign(&page);
        dest.add_page(&copied, false).map_err(map_qpdf_error)?;

        let mut writer = dest.writer();
        writer.preserve_encryption(false);
        outputs.push((idx + 1, writer.write_to_memory().map_err(map_qpdf_error)?));
    }

    tracing::debug!(pages = outputs.len(), "Split document into single pages");
    Ok(outputs)
}

/// Concatenate the pages of `inputs` in order
pub fn merge(inputs: &[Vec<u8>]) -> Result<Vec<u8>> {
    if inputs.is_empty() {
        return Err(Error::QpdfError {
            reason: "No input PDFs provided".to_string(),
        });
    }

    let dest = QPdf::empty();

    for (i, input) in inputs.iter().enumerate() {
        let source = QPdf::read_from_memory(input).map_err(|e| Error::QpdfError {
            reason: format!("Failed to read input PDF {}: {}", i + 1, e),
        })?;
        let pages = source.get_pages().map_err(|e| Error::QpdfError {
            reason: format!("Failed to get pages from input PDF {}: {}", i + 1, e),
        })?;

        for page in &pages {
            let copied = dest.copy_from_foreign(page);
            dest.add_page(&copied, false).map_err(map_qpdf_error)?;
        }
    }

    dest.writer().write_to_memory().map_err(map_qpdf_error)
}

/// Rewrite with compressed streams, generated object streams and unreferenced objects dropped
pub fn compress(data: &[u8], password: Option<&str>) -> Result<Vec<u8>> {
    let qpdf = open_qpdf(data, password)?;

    let mut writer = qpdf.writer();
    writer
        .object_stream_mode(ObjectStreamMode::Generate)
        .compress_streams(true)
        .normalize_content(true)
        .preserve_unreferenced_objects(false)
        .preserve_encryption(false);
    writer.write_to_memory().map_err(map_qpdf_error)
}

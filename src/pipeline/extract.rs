//! PDF-to-positioned-text conversion via pdfium.
//!
//! Each page's text layer is read as pdfium text segments: runs of text that
//! share a baseline and font. A segment is the unit the table reconstructor
//! works with, so it is kept whole rather than split into characters.
//!
//! pdfium measures from the bottom-left corner of the page; fragments are
//! converted to a top-left origin so that `y` grows down the page in reading
//! order.
//!
//! The work runs inside `spawn_blocking` because pdfium wraps a C++ library
//! that must not be driven from async worker threads.

use crate::error::{ConversionError, ScrapeError};
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A run of text recovered from a page, with its position.
///
/// `x` is the left edge and `y` the baseline, both in PDF points from the
/// top-left corner of the page. `font_size` is approximated by the height of
/// the text run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedFragment {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    /// 1-indexed page number.
    pub page: usize,
}

/// All fragments of one page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-indexed page number.
    pub number: usize,
    pub fragments: Vec<PositionedFragment>,
}

/// Convert PDF bytes into pages of positioned fragments.
///
/// Either every page is converted or an error is returned; there is no
/// partial output.
pub async fn extract_pages(
    bytes: Vec<u8>,
    library_path: Option<PathBuf>,
) -> Result<Vec<Page>, ScrapeError> {
    tokio::task::spawn_blocking(move || extract_pages_blocking(&bytes, library_path.as_deref()))
        .await
        .map_err(|e| ScrapeError::Internal(format!("Extraction task panicked: {}", e)))?
        .map_err(ScrapeError::from)
}

/// Reject buffers that cannot be a PDF before handing them to pdfium.
pub fn validate_pdf_magic(bytes: &[u8]) -> Result<(), ConversionError> {
    if bytes.is_empty() {
        return Err(ConversionError::Empty);
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(ConversionError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Blocking implementation of [`extract_pages`].
pub fn extract_pages_blocking(
    bytes: &[u8],
    library_path: Option<&Path>,
) -> Result<Vec<Page>, ConversionError> {
    validate_pdf_magic(bytes)?;

    let pdfium = bind_pdfium(library_path)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ConversionError::CorruptPdf {
            detail: format!("{:?}", e),
        })?;

    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let number = index + 1;
        let page_height = page.height().value;
        let text = page.text().map_err(|e| ConversionError::PageText {
            page: number,
            detail: format!("{:?}", e),
        })?;

        let mut fragments = Vec::new();
        for segment in text.segments().iter() {
            let value = segment.text();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            fragments.push(PositionedFragment {
                text: value.to_string(),
                x: bounds.left().value,
                y: page_height - bounds.bottom().value,
                font_size: (bounds.top().value - bounds.bottom().value).abs(),
                page: number,
            });
        }

        debug!("Page {}: {} text fragments", number, fragments.len());
        pages.push(Page { number, fragments });
    }

    info!("PDF converted: {} pages", pages.len());
    Ok(pages)
}

/// Bind to pdfium: an explicit path first, then the working directory, then
/// the system library path.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, ConversionError> {
    let bindings = match library_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| ConversionError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_buffer() {
        assert!(matches!(validate_pdf_magic(b""), Err(ConversionError::Empty)));
    }

    #[test]
    fn rejects_html_error_page() {
        let err = validate_pdf_magic(b"<!DOCTYPE html><html>").unwrap_err();
        match err {
            ConversionError::NotAPdf { magic } => assert_eq!(magic, b"<!DO"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn accepts_pdf_header() {
        assert!(validate_pdf_magic(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3").is_ok());
    }

    #[test]
    fn invalid_bytes_fail_before_binding() {
        // No pdfium library is needed to reject a non-PDF buffer.
        let err = extract_pages_blocking(b"hello", Some(Path::new("/nonexistent"))).unwrap_err();
        assert!(matches!(err, ConversionError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn async_wrapper_maps_to_conversion_error() {
        let err = extract_pages(b"GIF89a".to_vec(), None).await.unwrap_err();
        assert!(matches!(
            err,
            ScrapeError::Conversion(ConversionError::NotAPdf { .. })
        ));
    }
}

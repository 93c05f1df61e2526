//! PDF generation: encoding page images into a document and decorating it.
//!
//! Two seams separate the page assembler from `lopdf`:
//!
//! * [`PageEncoder`] turns the ordered page bytes into a PDF byte stream.
//! * [`PdfDocument`] edits that PDF: metadata, outline, viewer settings, saving.
//!
//! [`assemble`] drives both in the fixed order a conversion needs.

use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Direction, EpubMetadata, NavigationEntry, PageItem, PageLayout, PageMode};

pub mod document;
pub mod encoder;

pub use document::LopdfDocument;
pub use encoder::ImagePdfEncoder;

/// Encodes an ordered sequence of page images into a PDF, one page per image.
pub trait PageEncoder {
    /// # Arguments
    ///
    /// * `pages` - JPEG or PNG page bytes, already in page order
    ///
    /// # Returns
    ///
    /// * `Result<Vec<u8>>` - The complete PDF file
    fn encode(&self, pages: &[PageItem]) -> Result<Vec<u8>>;
}

/// An editable PDF document.
///
/// The `set_*` viewer methods only write when the stored value differs and report
/// whether they did, so applying the same settings twice is a no-op.
pub trait PdfDocument: Sized {
    /// Parses a PDF produced by a [`PageEncoder`].
    fn load(bytes: &[u8]) -> Result<Self>;

    fn page_count(&self) -> usize;

    /// Writes document information, language and the XMP packet.
    /// Absent fields are written as empty strings.
    fn set_metadata(&mut self, metadata: &EpubMetadata) -> Result<&mut Self>;

    /// Writes one top-level outline item per entry, in order.
    fn set_outline(&mut self, entries: &[NavigationEntry]) -> Result<&mut Self>;

    fn set_page_layout(&mut self, layout: PageLayout) -> Result<bool>;

    fn set_page_mode(&mut self, mode: PageMode) -> Result<bool>;

    fn set_direction(&mut self, direction: Direction) -> Result<bool>;

    /// Saves to `path`, replacing any existing file only once the new one is complete.
    fn save(&mut self, path: &Path) -> Result<()>;
}

/// Viewer settings applied to every generated PDF. `None` leaves the value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerSettings {
    pub page_layout: Option<PageLayout>,
    pub page_mode: Option<PageMode>,
    pub direction: Option<Direction>,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            page_layout: Some(PageLayout::default()),
            page_mode: Some(PageMode::default()),
            direction: Some(Direction::default()),
        }
    }
}

/// Navigation and metadata recovered from a package book.
#[derive(Debug, Clone, Copy)]
pub struct BookDetails<'a> {
    pub metadata: &'a EpubMetadata,
    pub navigation: &'a [NavigationEntry],
}

/// Encodes `pages`, decorates the document and saves it to `output`.
///
/// # Arguments
///
/// * `encoder` - The image-to-PDF encoder
/// * `pages` - Pages in final order
/// * `book` - Metadata and outline for package books, `None` otherwise
/// * `settings` - Viewer settings
/// * `output` - Destination `.pdf` path
///
/// # Returns
///
/// * `Result<usize>` - Number of pages in the saved document
pub fn assemble<E, D>(
    encoder: &E,
    pages: &[PageItem],
    book: Option<BookDetails<'_>>,
    settings: &ViewerSettings,
    output: &Path,
) -> Result<usize>
where
    E: PageEncoder,
    D: PdfDocument,
{
    if pages.is_empty() {
        return Err(Error::NotFound("No pages to write into the PDF".to_string()));
    }

    let bytes = encoder.encode(pages)?;
    let mut document = D::load(&bytes)?;

    if let Some(book) = book {
        document.set_metadata(book.metadata)?;
        document.set_outline(book.navigation)?;
        debug!("Wrote metadata and {} outline entries", book.navigation.len());
    }

    if let Some(layout) = settings.page_layout {
        if document.set_page_layout(layout)? {
            debug!("Page layout set to {}", layout);
        }
    }
    if let Some(mode) = settings.page_mode {
        if document.set_page_mode(mode)? {
            debug!("Page mode set to {}", mode);
        }
    }
    if let Some(direction) = settings.direction {
        if document.set_direction(direction)? {
            debug!("Reading direction set to {}", direction);
        }
    }

    document.save(output)?;
    let page_count = document.page_count();
    info!("Wrote {} pages to {:?}", page_count, output);
    Ok(page_count)
}

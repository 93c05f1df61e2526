//! manga2pdf - Manga/Comic to PDF Conversion Library
//!
//! This crate converts an image folder, a zip/cbz or rar/cbr archive, or an EPUB
//! (and, through a pluggable unwrapper, MOBI/AZW) book into a single PDF with a
//! deterministic page order, optional image normalization, and embedded metadata,
//! table of contents and viewer settings.
//!
//! # Getting Started
//!
//! Describe the conversion with the [`ConversionRequest`] builder and run it with
//! [`ConversionRequest::convert`].
//!
//! ```rust,no_run
//! use manga2pdf::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> manga2pdf::error::Result<()> {
//!     // 1. Configure the conversion; validation happens in `build()`
//!     let request = ConversionRequest::builder()
//!         .source_path("./my_manga/Volume 03.epub")
//!         .output_path("./converted/Volume 03.pdf")
//!         .page_layout(PageLayout::TwoPageRight)
//!         .page_mode(PageMode::UseOutlines)
//!         .direction(Direction::R2L)
//!         .build()?;
//!
//!     // 2. Run the whole pipeline
//!     let report = request.convert().await?;
//!     println!(
//!         "Wrote {} pages ({} outline entries) to {:?}",
//!         report.page_count, report.outline_entries, report.output_path
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! The individual stages ([`classifier`], [`extractor`], [`collector`], [`package`],
//! [`normalizer`], [`generator`]) are public and can be driven on their own.

pub mod classifier;
pub mod collector;
pub mod converter;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod mobi;
pub mod normalizer;
pub mod package;
pub mod path_utils;
pub mod types;

// Publicly expose the main `ConversionRequest` struct and its builder
pub use converter::ConversionRequest;
pub use converter::ConversionRequestBuilder;

// Re-export error and core types for direct access
pub use types::{
    ArchiveKind, BookKind, ConversionReport, Direction, EpubMetadata, NavigationEntry,
    NormalizationMode, PageItem, PageLayout, PageMode, SourceInput,
};

/// Prelude module for convenient imports.
///
/// Re-exports the request builder, the value types it takes and returns, and the
/// MOBI unwrapping seam, so `use manga2pdf::prelude::*;` is enough for most callers.
pub mod prelude {
    pub use super::{
        ArchiveKind, BookKind, ConversionReport, ConversionRequest, ConversionRequestBuilder,
        Direction, EpubMetadata, NavigationEntry, NormalizationMode, PageLayout, PageMode,
        SourceInput, error, generator, types,
    };
    pub use crate::mobi::{MobiUnwrapper, UnwrapError};
    pub use std::path::{Path, PathBuf};
    pub use std::sync::Arc;
}

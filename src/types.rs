//! Core data types, enums, and reports for the manga2pdf conversion library.
//!
//! This module defines the fundamental data structures used throughout the pipeline:
//! - The classified input (`SourceInput`, `ArchiveKind`, `BookKind`)
//! - Page data flowing between stages (`PageItem`, `NavigationEntry`, `EpubMetadata`)
//! - Viewer settings written into the PDF (`PageLayout`, `PageMode`, `Direction`)
//! - The per-run transcoding policy (`NormalizationMode`)
//! - The outcome of a conversion (`ConversionReport`)

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Archive container families handled by the extractor.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ArchiveKind {
    Zip, // .zip, .cbz
    Rar, // .rar, .cbr
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveKind::Zip => f.write_str("zip"),
            ArchiveKind::Rar => f.write_str("rar"),
        }
    }
}

/// Package-format e-books.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BookKind {
    Epub,
    /// .mobi/.azw/.azw3, unwrapped to an embedded EPUB before parsing
    Mobi,
}

/// A classified conversion input. Immutable once produced by the classifier.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SourceInput {
    Directory(PathBuf),
    Archive(PathBuf, ArchiveKind),
    PackageBook(PathBuf, BookKind),
}

impl SourceInput {
    /// The filesystem path this input was classified from.
    pub fn path(&self) -> &Path {
        match self {
            SourceInput::Directory(p) | SourceInput::Archive(p, _) | SourceInput::PackageBook(p, _) => {
                p
            }
        }
    }

    pub fn is_package_book(&self) -> bool {
        matches!(self, SourceInput::PackageBook(..))
    }
}

/// Per-run image transcoding policy. Exactly one mode applies to a whole conversion.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NormalizationMode {
    /// JPEGs pass through untouched; other rasters lose their alpha channel and become PNG.
    #[default]
    None,
    /// Every image is re-encoded as 3-channel JPEG.
    ForceJpeg,
    /// Every image becomes PNG, single-channel unless it is colorful.
    ForceGrayscale,
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationMode::None => f.write_str("none"),
            NormalizationMode::ForceJpeg => f.write_str("forceJpeg"),
            NormalizationMode::ForceGrayscale => f.write_str("forceGrayscale"),
        }
    }
}

impl FromStr for NormalizationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(NormalizationMode::None),
            "forceJpeg" | "jpeg" => Ok(NormalizationMode::ForceJpeg),
            "forceGrayscale" | "grayscale" => Ok(NormalizationMode::ForceGrayscale),
            other => Err(Error::Other(format!("Unknown normalization mode '{}'", other))),
        }
    }
}

/// How a viewer lays out pages (`/PageLayout` in the document catalog).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PageLayout {
    SinglePage,    // Single page display
    OneColumn,     // Continuous scrolling
    TwoColumnLeft, // Spread view with scrolling
    TwoColumnRight, // Separate cover, scrolling spread view
    TwoPageLeft,   // Spread view
    #[default]
    TwoPageRight, // Separate cover, spread view
}

impl PageLayout {
    /// The PDF name written to the catalog, without the leading slash.
    pub fn pdf_name(&self) -> &'static str {
        match self {
            PageLayout::SinglePage => "SinglePage",
            PageLayout::OneColumn => "OneColumn",
            PageLayout::TwoColumnLeft => "TwoColumnLeft",
            PageLayout::TwoColumnRight => "TwoColumnRight",
            PageLayout::TwoPageLeft => "TwoPageLeft",
            PageLayout::TwoPageRight => "TwoPageRight",
        }
    }
}

impl fmt::Display for PageLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pdf_name())
    }
}

impl FromStr for PageLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            PageLayout::SinglePage,
            PageLayout::OneColumn,
            PageLayout::TwoColumnLeft,
            PageLayout::TwoColumnRight,
            PageLayout::TwoPageLeft,
            PageLayout::TwoPageRight,
        ]
        .into_iter()
        .find(|layout| layout.pdf_name() == s)
        .ok_or_else(|| Error::Other(format!("Unknown page layout '{}'", s)))
    }
}

/// What a viewer shows alongside the pages when the document opens (`/PageMode`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PageMode {
    #[default]
    UseNone,
    UseOutlines,
    UseThumbs,
    FullScreen,
    UseOC,
    UseAttachments,
}

impl PageMode {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            PageMode::UseNone => "UseNone",
            PageMode::UseOutlines => "UseOutlines",
            PageMode::UseThumbs => "UseThumbs",
            PageMode::FullScreen => "FullScreen",
            PageMode::UseOC => "UseOC",
            PageMode::UseAttachments => "UseAttachments",
        }
    }
}

impl fmt::Display for PageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pdf_name())
    }
}

impl FromStr for PageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        [
            PageMode::UseNone,
            PageMode::UseOutlines,
            PageMode::UseThumbs,
            PageMode::FullScreen,
            PageMode::UseOC,
            PageMode::UseAttachments,
        ]
        .into_iter()
        .find(|mode| mode.pdf_name() == s)
        .ok_or_else(|| Error::Other(format!("Unknown page mode '{}'", s)))
    }
}

/// Binding direction (`/ViewerPreferences /Direction`).
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Left binding, western reading order
    L2R,
    /// Right binding, manga reading order
    #[default]
    R2L,
}

impl Direction {
    pub fn pdf_name(&self) -> &'static str {
        match self {
            Direction::L2R => "L2R",
            Direction::R2L => "R2L",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pdf_name())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L2R" | "ltr" => Ok(Direction::L2R),
            "R2L" | "rtl" => Ok(Direction::R2L),
            other => Err(Error::Other(format!("Unknown direction '{}'", other))),
        }
    }
}

/// The byte content of one page image, tagged with its position in the canonical page order.
///
/// The tag survives concurrent normalization so the pages can be put back in order
/// after every task has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageItem {
    pub bytes: Vec<u8>,
    pub source_index: usize,
}

impl PageItem {
    pub fn new(bytes: Vec<u8>, source_index: usize) -> Self {
        Self {
            bytes,
            source_index,
        }
    }
}

/// A table-of-contents entry resolved to a zero-based page index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NavigationEntry {
    pub label: String,
    pub target_page_index: usize,
}

/// Bibliographic metadata read from an EPUB package document.
/// Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EpubMetadata {
    pub title: Option<String>,
    pub creators: Vec<String>,
    pub publisher: Option<String>,
    pub date: Option<String>,
    pub language: Option<String>,
}

/// Summary of a finished conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConversionReport {
    /// Where the PDF was written
    pub output_path: PathBuf,
    pub page_count: usize,
    /// Number of outline entries written (0 for image folders and archives)
    pub outline_entries: usize,
    pub source: SourceInput,
}

/// Raster formats the discoverer accepts as pages.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "bmp"];

/// Returns true if the file name ends (case-insensitively) in a supported image extension.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Returns true for `.jpg`/`.jpeg` files, which can be embedded without re-encoding.
pub fn is_jpeg_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}

//! EPUB package parsing.
//!
//! An EPUB is a zip container holding a package document (`.opf`) with the manifest
//! and bibliographic metadata, and a navigation document (`.ncx`) with the table of
//! contents. [`PackageParser`] walks through them in a fixed order:
//!
//! ```text
//! Unopened -> ManifestLocated -> NavigationResolved -> MetadataExtracted -> Ready
//! ```
//!
//! Any failing step moves the parser to the terminal `Failed` state.

pub mod manifest;
pub mod metadata;
pub mod navigation;

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use log::{debug, info};
use quick_xml::events::BytesStart;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{Error, Result};
use crate::types::{EpubMetadata, NavigationEntry};

/// Read access to the entries of a package container.
pub trait Container {
    /// All entry names, in container order.
    fn entry_names(&self) -> Vec<String>;

    /// Reads the complete contents of the entry called `name`.
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>>;
}

impl<R: Read + Seek> Container for ZipArchive<R> {
    fn entry_names(&self) -> Vec<String> {
        self.file_names().map(str::to_string).collect()
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => {
                Error::NotFound(format!("'{}' is not an entry of the package", name))
            }
            other => Error::Zip(other),
        })?;
        // The declared size is untrusted, so the buffer grows with the data actually read.
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// In-memory container, mostly useful for building packages in tests.
impl Container for BTreeMap<String, Vec<u8>> {
    fn entry_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("'{}' is not an entry of the package", name)))
    }
}

/// Picks the entry with the given extension.
///
/// If several match, the first whose name contains `standard` wins, otherwise the
/// first in container order.
///
/// # Arguments
///
/// * `names` - Entry names in container order
/// * `extension` - Extension without the dot, compared case-insensitively
///
/// # Returns
///
/// * `Option<String>` - The chosen entry, or None if no entry has the extension
pub fn select_preferred(names: &[String], extension: &str) -> Option<String> {
    let candidates: Vec<&String> = names
        .iter()
        .filter(|name| {
            name.rsplit_once('.')
                .map(|(_, ext)| ext.eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .collect();

    candidates
        .iter()
        .find(|name| name.to_lowercase().contains("standard"))
        .or_else(|| candidates.first())
        .map(|name| name.to_string())
}

/// Returns the unescaped value of the first attribute whose local name is `name`.
///
/// Matching on the local name lets `xlink:href` and `href` share one lookup.
pub(crate) fn attribute_value(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        if attribute.key.local_name().as_ref() == name {
            return Ok(Some(attribute.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Everything recovered from a parsed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubBook {
    /// Container paths of the page images, in page order
    pub pages: Vec<String>,
    pub navigation: Vec<NavigationEntry>,
    pub metadata: EpubMetadata,
    pub package_document: String,
    pub navigation_document: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    Unopened,
    ManifestLocated,
    NavigationResolved,
    MetadataExtracted,
    Ready,
    Failed(String),
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Step-wise parser over a package [`Container`].
#[derive(Debug)]
pub struct PackageParser<C: Container> {
    container: C,
    state: ParserState,
    package_document: String,
    navigation_document: String,
    pages: Vec<String>,
    navigation: Vec<NavigationEntry>,
    metadata: EpubMetadata,
}

impl<C: Container> PackageParser<C> {
    pub fn new(container: C) -> Self {
        Self {
            container,
            state: ParserState::Unopened,
            package_document: String::new(),
            navigation_document: String::new(),
            pages: Vec::new(),
            navigation: Vec::new(),
            metadata: EpubMetadata::default(),
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Finds the package and navigation documents and builds the candidate page list.
    pub fn locate_manifest(&mut self) -> Result<()> {
        self.advance(ParserState::Unopened, ParserState::ManifestLocated, |parser| {
            let names = parser.container.entry_names();
            parser.package_document = select_preferred(&names, "opf")
                .ok_or_else(|| Error::ManifestOrNavigationMissing("package (.opf)".to_string()))?;
            parser.navigation_document = select_preferred(&names, "ncx").ok_or_else(|| {
                Error::ManifestOrNavigationMissing("navigation (.ncx)".to_string())
            })?;
            debug!(
                "Using package document '{}' and navigation document '{}'",
                parser.package_document, parser.navigation_document
            );

            let opf = parser.container.read_entry(&parser.package_document)?;
            let entries = manifest::parse_manifest(&opf)?;
            parser.pages = manifest::candidate_pages(&entries, &parser.package_document);
            debug!("Manifest lists {} page images", parser.pages.len());
            Ok(())
        })
    }

    /// Resolves every navigation point to an index into the page list.
    pub fn resolve_navigation(&mut self) -> Result<()> {
        self.advance(
            ParserState::ManifestLocated,
            ParserState::NavigationResolved,
            |parser| {
                let ncx = parser.container.read_entry(&parser.navigation_document)?;
                let points = navigation::parse_nav_points(&ncx)?;
                parser.navigation = navigation::resolve_nav_points(
                    &points,
                    &parser.navigation_document,
                    &parser.pages,
                    &mut parser.container,
                )?;
                Ok(())
            },
        )
    }

    pub fn extract_metadata(&mut self) -> Result<()> {
        self.advance(
            ParserState::NavigationResolved,
            ParserState::MetadataExtracted,
            |parser| {
                let opf = parser.container.read_entry(&parser.package_document)?;
                parser.metadata = metadata::parse_metadata(&opf)?;
                Ok(())
            },
        )
    }

    pub fn finish(&mut self) -> Result<()> {
        self.advance(ParserState::MetadataExtracted, ParserState::Ready, |_| Ok(()))
    }

    /// Runs every remaining step and hands back the book together with its container,
    /// which is still needed to read the page images.
    pub fn parse(mut self) -> Result<(EpubBook, C)> {
        if self.state == ParserState::Unopened {
            self.locate_manifest()?;
        }
        if self.state == ParserState::ManifestLocated {
            self.resolve_navigation()?;
        }
        if self.state == ParserState::NavigationResolved {
            self.extract_metadata()?;
        }
        if self.state == ParserState::MetadataExtracted {
            self.finish()?;
        }
        self.into_book()
    }

    /// Consumes a `Ready` parser.
    pub fn into_book(self) -> Result<(EpubBook, C)> {
        if self.state != ParserState::Ready {
            return Err(Error::Other(format!(
                "Package parser is not ready (state: {})",
                self.state
            )));
        }
        let book = EpubBook {
            pages: self.pages,
            navigation: self.navigation,
            metadata: self.metadata,
            package_document: self.package_document,
            navigation_document: self.navigation_document,
        };
        Ok((book, self.container))
    }

    fn advance<F>(&mut self, expected: ParserState, next: ParserState, step: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if self.state != expected {
            return Err(Error::Other(format!(
                "Package parser cannot move from {} to {}",
                self.state, next
            )));
        }
        match step(self) {
            Ok(()) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                self.state = ParserState::Failed(e.to_string());
                Err(e)
            }
        }
    }
}

/// Opens an `.epub` file and parses its package.
pub fn open_epub(path: &Path) -> Result<(EpubBook, ZipArchive<File>)> {
    let archive = ZipArchive::new(File::open(path)?).map_err(|e| match e {
        ZipError::Io(io) => Error::Io(io),
        other => Error::NotAValidArchive(path.to_path_buf(), format!("epub ({})", other)),
    })?;

    let (book, archive) = PackageParser::new(archive).parse()?;
    info!(
        "Parsed {:?}: {} pages, {} navigation entries",
        path,
        book.pages.len(),
        book.navigation.len()
    );
    Ok((book, archive))
}

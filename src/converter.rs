use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::task::spawn_blocking;
use zip::ZipArchive;

use crate::classifier::classify;
use crate::collector::discover_images;
use crate::error::{Error, Result};
use crate::extractor::extract_archive;
use crate::generator::{
    BookDetails, ImagePdfEncoder, LopdfDocument, ViewerSettings, assemble,
};
use crate::mobi::{MobiUnwrapper, UnconfiguredMobiUnwrapper};
use crate::normalizer::Normalizer;
use crate::package::{Container, EpubBook, open_epub};
use crate::path_utils::{default_output_path, validate_output_path};
use crate::types::{
    BookKind, ConversionReport, Direction, NormalizationMode, PageItem, PageLayout, PageMode,
    SourceInput,
};

/// A single manga/comic to PDF conversion, built declaratively using the builder pattern.
///
/// The request is validated once by [`ConversionRequestBuilder::build`], before any
/// file is touched, and never changes afterwards. [`convert`](ConversionRequest::convert)
/// runs the whole pipeline:
///
/// 1. Classify the source (image folder, zip/rar archive, EPUB or MOBI book)
/// 2. Extract archives into a run-owned scratch directory, or parse the EPUB package
/// 3. Discover, order and concurrently normalize loose page images; package pages
///    are taken from the book as stored
/// 4. Encode the PDF, add metadata/outline/viewer settings and save it atomically
///
/// ## Builder Pattern
///
/// ```rust,no_run
/// # use manga2pdf::prelude::*;
/// # async fn run() -> manga2pdf::error::Result<()> {
/// let report = ConversionRequest::builder()
///     .source_path("./Volume 01.cbz")
///     .page_layout(PageLayout::TwoPageLeft)
///     .direction(Direction::L2R)
///     .force_grayscale(true)
///     .build()?
///     .convert()
///     .await?;
/// println!("{} pages written to {:?}", report.page_count, report.output_path);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, derive_builder::Builder)]
#[builder(
    setter(into, strip_option),
    build_fn(validate = "Self::validate", error = "crate::error::Error")
)]
pub struct ConversionRequest {
    /// Image directory, `.zip/.cbz/.rar/.cbr` archive, or `.epub/.mobi/.azw/.azw3` book.
    pub source_path: PathBuf,

    /// Where to write the PDF. Must end in `.pdf`; an existing file is replaced.
    /// Defaults to `<dir>/<dirname>.pdf` for folders and `<stem>.pdf` next to files.
    #[builder(default)]
    pub output_path: Option<PathBuf>,

    /// `None` keeps whatever the encoder produced. See [`ConversionRequestBuilder::keep_page_layout`].
    #[builder(default = "Some(PageLayout::TwoPageRight)")]
    pub page_layout: Option<PageLayout>,

    #[builder(default = "Some(PageMode::UseNone)")]
    pub page_mode: Option<PageMode>,

    /// Binding direction. Manga reads right to left, so that is the default.
    #[builder(default = "Some(Direction::R2L)")]
    pub direction: Option<Direction>,

    /// Re-encode every page as JPEG. Conflicts with `force_grayscale`.
    #[builder(default)]
    pub force_jpeg: bool,

    /// Re-encode every page as PNG, grayscale unless colorful. Conflicts with `force_jpeg`.
    #[builder(default)]
    pub force_grayscale: bool,

    /// Size of the normalization pool. Defaults to the number of CPUs.
    #[builder(default)]
    pub worker_count: Option<usize>,

    /// Unwraps `.mobi/.azw/.azw3` files to their embedded EPUB.
    #[builder(setter(custom), default)]
    pub mobi_unwrapper: Option<Arc<dyn MobiUnwrapper>>,
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("source_path", &self.source_path)
            .field("output_path", &self.output_path)
            .field("page_layout", &self.page_layout)
            .field("page_mode", &self.page_mode)
            .field("direction", &self.direction)
            .field("force_jpeg", &self.force_jpeg)
            .field("force_grayscale", &self.force_grayscale)
            .field("worker_count", &self.worker_count)
            .field("mobi_unwrapper", &self.mobi_unwrapper.is_some())
            .finish()
    }
}

impl ConversionRequest {
    /// Creates a new builder for configuring a `ConversionRequest`.
    pub fn builder() -> ConversionRequestBuilder {
        ConversionRequestBuilder::default()
    }

    /// The transcoding policy implied by the `force_*` flags.
    pub fn normalization_mode(&self) -> NormalizationMode {
        if self.force_jpeg {
            NormalizationMode::ForceJpeg
        } else if self.force_grayscale {
            NormalizationMode::ForceGrayscale
        } else {
            NormalizationMode::None
        }
    }

    pub fn viewer_settings(&self) -> ViewerSettings {
        ViewerSettings {
            page_layout: self.page_layout,
            page_mode: self.page_mode,
            direction: self.direction,
        }
    }

    /// Runs the conversion and returns once the PDF has been saved.
    ///
    /// The scratch directory is removed whether the conversion succeeds or not. On
    /// failure nothing is written at the output path.
    ///
    /// # Returns
    ///
    /// * `Ok(ConversionReport)` - Output path, page count and outline size
    /// * `Err(Error)` - The first stage that failed, with its cause
    pub async fn convert(&self) -> Result<ConversionReport> {
        let source = classify(&self.source_path)?;
        info!("Converting {:?}", source);

        let output_path = match &self.output_path {
            Some(path) => path.clone(),
            None => default_output_path(&source),
        };

        let scratch = tempfile::Builder::new().prefix("manga2pdf-").tempdir()?;
        let result = self.run(&source, scratch.path(), &output_path).await;
        if let Err(e) = scratch.close() {
            warn!("Failed to remove the scratch directory: {}", e);
        }
        let (page_count, outline_entries) = result?;

        Ok(ConversionReport {
            output_path,
            page_count,
            outline_entries,
            source,
        })
    }

    async fn run(
        &self,
        source: &SourceInput,
        scratch: &Path,
        output_path: &Path,
    ) -> Result<(usize, usize)> {
        let (pages, book) = match source {
            SourceInput::Directory(directory) => (self.pages_from_directory(directory, scratch).await?, None),
            SourceInput::Archive(archive, kind) => {
                let destination = scratch.join("extracted");
                let (archive, kind, target) = (archive.clone(), *kind, destination.clone());
                spawn_blocking(move || extract_archive(&archive, kind, &target)).await??;
                (self.pages_from_directory(&destination, scratch).await?, None)
            }
            SourceInput::PackageBook(book, BookKind::Epub) => {
                let (pages, book) = self.pages_from_epub(book).await?;
                (pages, Some(book))
            }
            SourceInput::PackageBook(book, BookKind::Mobi) => {
                let epub = self.unwrap_mobi(book, scratch).await?;
                let (pages, book) = self.pages_from_epub(&epub).await?;
                (pages, Some(book))
            }
        };

        if pages.is_empty() {
            return Err(Error::NotFound(format!(
                "No page images found in {:?}",
                source.path()
            )));
        }

        let outline_entries = book.as_ref().map(|b| b.navigation.len()).unwrap_or(0);
        let settings = self.viewer_settings();
        let output_path = output_path.to_path_buf();

        // Encoding and PDF editing are CPU-bound.
        let page_count = spawn_blocking(move || {
            let details = book.as_ref().map(|b| BookDetails {
                metadata: &b.metadata,
                navigation: &b.navigation,
            });
            assemble::<ImagePdfEncoder, LopdfDocument>(
                &ImagePdfEncoder::default(),
                &pages,
                details,
                &settings,
                &output_path,
            )
        })
        .await??;

        Ok((page_count, outline_entries))
    }

    async fn normalize(&self, sources: &[PathBuf], scratch: &Path) -> Result<Vec<PageItem>> {
        let normalized = scratch.join("normalized");
        tokio::fs::create_dir_all(&normalized).await?;
        Normalizer::new(self.normalization_mode(), &normalized, self.worker_count)
            .normalize(sources)
            .await
    }

    async fn pages_from_directory(&self, directory: &Path, scratch: &Path) -> Result<Vec<PageItem>> {
        let images = discover_images(directory).await?;
        let sources: Vec<PathBuf> = images.into_iter().map(|image| image.path).collect();
        self.normalize(&sources, scratch).await
    }

    /// Parses the package and reads its page images, in page order, straight from the
    /// container. Package pages skip normalization and are embedded as stored.
    async fn pages_from_epub(&self, epub: &Path) -> Result<(Vec<PageItem>, EpubBook)> {
        let epub = epub.to_path_buf();

        let (pages, book) = spawn_blocking(move || -> Result<(Vec<PageItem>, EpubBook)> {
            let (book, mut archive): (EpubBook, ZipArchive<File>) = open_epub(&epub)?;

            let mut pages = Vec::with_capacity(book.pages.len());
            for (index, page) in book.pages.iter().enumerate() {
                pages.push(PageItem::new(archive.read_entry(page)?, index));
            }
            Ok((pages, book))
        })
        .await??;

        Ok((pages, book))
    }

    async fn unwrap_mobi(&self, book: &Path, scratch: &Path) -> Result<PathBuf> {
        let unwrapper: Arc<dyn MobiUnwrapper> = match &self.mobi_unwrapper {
            Some(unwrapper) => Arc::clone(unwrapper),
            None => Arc::new(UnconfiguredMobiUnwrapper),
        };

        let epub = match unwrapper.unwrap(book, scratch).await {
            Ok(epub) => epub,
            Err(e) => {
                warn!("Could not unwrap {:?} to EPUB: {}", book, e);
                return Err(Error::MobiUnwrap(book.to_path_buf(), e));
            }
        };

        // The unwrapped file goes through classification like any other input.
        match classify(&epub)? {
            SourceInput::PackageBook(path, BookKind::Epub) => {
                info!("Unwrapped {:?} to {:?}", book, path);
                Ok(path)
            }
            other => Err(Error::UnsupportedInputKind(
                other.path().to_path_buf(),
                "a MOBI unwrapper must produce an .epub file".to_string(),
            )),
        }
    }
}

impl ConversionRequestBuilder {
    /// Sets the collaborator used to unwrap MOBI/AZW books.
    pub fn mobi_unwrapper(&mut self, unwrapper: Arc<dyn MobiUnwrapper>) -> &mut Self {
        self.mobi_unwrapper = Some(Some(unwrapper));
        self
    }

    /// Leaves `/PageLayout` as the encoder wrote it.
    pub fn keep_page_layout(&mut self) -> &mut Self {
        self.page_layout = Some(None);
        self
    }

    /// Leaves `/PageMode` as the encoder wrote it.
    pub fn keep_page_mode(&mut self) -> &mut Self {
        self.page_mode = Some(None);
        self
    }

    /// Leaves `/ViewerPreferences /Direction` as the encoder wrote it.
    pub fn keep_direction(&mut self) -> &mut Self {
        self.direction = Some(None);
        self
    }

    /// Sets the normalization flags from a single mode.
    pub fn normalization_mode(&mut self, mode: NormalizationMode) -> &mut Self {
        self.force_jpeg = Some(mode == NormalizationMode::ForceJpeg);
        self.force_grayscale = Some(mode == NormalizationMode::ForceGrayscale);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.force_jpeg == Some(true) && self.force_grayscale == Some(true) {
            return Err(Error::ConflictingOptions(
                "force_jpeg and force_grayscale cannot be combined".to_string(),
            ));
        }
        if let Some(source) = &self.source_path {
            if source.as_os_str().is_empty() {
                return Err(Error::Other("The source path is empty".to_string()));
            }
        }
        if let Some(Some(output)) = &self.output_path {
            validate_output_path(output)?;
        }
        if let Some(Some(0)) = self.worker_count {
            return Err(Error::Other("worker_count must be at least 1".to_string()));
        }
        Ok(())
    }
}

//! Custom error types and result handling for manga2pdf operations.
//!
//! Every stage of the conversion pipeline reports through the single [`Error`] enum.
//! All operations return a [`Result<T>`] which is a type alias for `std::result::Result<T, Error>`.
//!
use std::path::PathBuf;

/// Type alias for Results with manga2pdf errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all conversion stages.
///
/// Every variant is fatal to the conversion that raised it: there is no retry
/// and no partially written output.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O errors from the standard library
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Raster decoding/encoding errors
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// ZIP container errors (archives and EPUB packages)
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// Package or navigation document is not well-formed XML
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    /// PDF object-level errors
    #[error(transparent)]
    Pdf(#[from] lopdf::Error),
    /// Async task join errors
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Semaphore(#[from] tokio::sync::AcquireError),

    /// The input is neither a directory nor a recognised archive/e-book extension.
    #[error("Unsupported input '{0:?}': {1}")]
    UnsupportedInputKind(PathBuf, String),
    /// The file's signature does not match the container its extension claims.
    #[error("'{0:?}' is not a valid {1} archive")]
    NotAValidArchive(PathBuf, String),
    /// Extracting an archive into the scratch directory failed.
    #[error("Failed to extract '{0:?}': {1}")]
    ExtractionIOError(PathBuf, String),
    /// No `.opf` or `.ncx` document inside the package.
    #[error("Package is missing its {0} document")]
    ManifestOrNavigationMissing(String),
    /// A navigation point resolved to a path that is not in the page list.
    #[error("Navigation entry '{label}' points to '{target}', which is not a page of the book")]
    NavigationTargetNotFound { label: String, target: String },
    /// A page image could not be decoded or re-encoded.
    #[error("Failed to decode image '{0:?}': {1}")]
    ImageDecodeError(PathBuf, String),
    /// The requested output file does not end in `.pdf`.
    #[error("Output path '{0:?}' is invalid: {1}")]
    OutputPathInvalid(PathBuf, String),
    /// Mutually exclusive options were requested together.
    #[error("Conflicting options: {0}")]
    ConflictingOptions(String),
    /// The MOBI/AZW container could not be unwrapped to its embedded EPUB.
    #[error("Failed to unwrap '{0:?}' to EPUB: {1}")]
    MobiUnwrap(PathBuf, crate::mobi::UnwrapError),
    /// Error for resources that couldn't be found (e.g., source directory, image file)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Other errors that don't fit into specific categories
    #[error("Other error: {0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Other(error)
    }
}

impl From<&str> for Error {
    fn from(error: &str) -> Self {
        Error::Other(error.to_string())
    }
}

// Raised by the request builder when a required setter was never called.
impl From<derive_builder::UninitializedFieldError> for Error {
    fn from(error: derive_builder::UninitializedFieldError) -> Self {
        Error::Other(format!("Missing required field `{}`", error.field_name()))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

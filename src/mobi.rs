//! MOBI/AZW unwrapping seam.
//!
//! Kindle containers are not decoded here. A [`MobiUnwrapper`] extracts the EPUB
//! embedded in them, and the result re-enters the EPUB branch of the pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Why a MOBI container could not be unwrapped.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UnwrapError {
    pub message: String,
}

impl UnwrapError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Extracts the EPUB embedded in a `.mobi`, `.azw` or `.azw3` file.
#[async_trait]
pub trait MobiUnwrapper: Send + Sync {
    /// Unwraps `source` and returns the path of the extracted `.epub`.
    ///
    /// # Arguments
    ///
    /// * `source` - The Kindle container
    /// * `scratch` - The run's scratch directory; the EPUB should be written inside it
    async fn unwrap(&self, source: &Path, scratch: &Path) -> Result<PathBuf, UnwrapError>;
}

/// Used when no unwrapper was configured. Always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredMobiUnwrapper;

#[async_trait]
impl MobiUnwrapper for UnconfiguredMobiUnwrapper {
    async fn unwrap(&self, source: &Path, _scratch: &Path) -> Result<PathBuf, UnwrapError> {
        Err(UnwrapError::new(format!(
            "no MOBI unwrapper is configured, cannot read {:?}",
            source
        )))
    }
}

//! Input classification.
//!
//! Decides, from the path alone, which branch of the pipeline handles an input:
//! the image-folder branch, the archive branch, or the package-book branch.

use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::types::{ArchiveKind, BookKind, SourceInput};

/// Classifies a filesystem path into a [`SourceInput`].
///
/// Directories win over extensions. For files the lowercased extension decides:
///
/// | Extension | Result |
/// |---|---|
/// | `zip`, `cbz` | `Archive(Zip)` |
/// | `rar`, `cbr` | `Archive(Rar)` |
/// | `epub` | `PackageBook(Epub)` |
/// | `mobi`, `azw`, `azw3` | `PackageBook(Mobi)` |
///
/// # Errors
///
/// * [`Error::UnsupportedInputKind`] - The path does not exist, or has any other
///   extension, or none
pub fn classify(path: &Path) -> Result<SourceInput> {
    if path.is_dir() {
        debug!("Classified {:?} as an image directory", path);
        return Ok(SourceInput::Directory(path.to_path_buf()));
    }
    if !path.exists() {
        return Err(Error::UnsupportedInputKind(
            path.to_path_buf(),
            "the path does not exist".to_string(),
        ));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let source = match extension.as_deref() {
        Some("zip") | Some("cbz") => SourceInput::Archive(path.to_path_buf(), ArchiveKind::Zip),
        Some("rar") | Some("cbr") => SourceInput::Archive(path.to_path_buf(), ArchiveKind::Rar),
        Some("epub") => SourceInput::PackageBook(path.to_path_buf(), BookKind::Epub),
        Some("mobi") | Some("azw") | Some("azw3") => {
            SourceInput::PackageBook(path.to_path_buf(), BookKind::Mobi)
        }
        other => {
            return Err(Error::UnsupportedInputKind(
                path.to_path_buf(),
                format!(
                    "extension {:?} is not one of zip, cbz, rar, cbr, epub, mobi, azw, azw3",
                    other.unwrap_or("")
                ),
            ));
        }
    };

    debug!("Classified {:?} as {:?}", path, source);
    Ok(source)
}

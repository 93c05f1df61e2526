//! Path utilities for filesystem and in-container paths.
//!
//! Two kinds of paths flow through the pipeline: real filesystem paths (inputs,
//! scratch files, the output PDF) and container-relative paths inside an EPUB
//! (always `/`-separated, resolved against the directory of the document that
//! references them). This module keeps the helpers for both in one place.

use crate::error::{Error, Result};
use crate::types::SourceInput;

use std::path::{Path, PathBuf};

/// Gets the file name from a path with fallback to lossy conversion.
///
/// # Arguments
///
/// * `path` - The path to extract the file name from
///
/// # Returns
///
/// * `String` - The file name, using lossy conversion if necessary
pub fn get_file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Checks if a filename starts with a dot (hidden file) using safe conversion.
///
/// # Arguments
///
/// * `path` - The path to check
///
/// # Returns
///
/// * `bool` - True if the file is hidden (starts with a dot)
pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

/// Returns the directory part of a container path, without a trailing slash.
///
/// `"OEBPS/content.opf"` gives `"OEBPS"`, a top-level `"content.opf"` gives `""`.
pub fn container_dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolves `href` against the container directory `base_dir`.
///
/// `.` and `..` segments are collapsed, a `#fragment` suffix is dropped, and the
/// result never starts with `/`. A `..` that would climb above the container root
/// is discarded.
///
/// # Arguments
///
/// * `base_dir` - Directory of the referencing document (see [`container_dirname`])
/// * `href` - The link as written in the document
///
/// # Returns
///
/// * `String` - The normalized container-relative path
pub fn join_container_path(base_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or("");
    let mut segments: Vec<&str> = Vec::new();

    // Absolute hrefs are anchored at the container root.
    let base = if href.starts_with('/') { "" } else { base_dir };

    for segment in base.split('/').chain(href.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    segments.join("/")
}

/// Checks that an explicitly requested output path names a PDF file.
pub fn validate_output_path(path: &Path) -> Result<()> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if !is_pdf {
        return Err(Error::OutputPathInvalid(
            path.to_path_buf(),
            "The output file must end in '.pdf'".to_string(),
        ));
    }
    Ok(())
}

/// Computes the output path used when none was requested.
///
/// - Directories: `<dir>/<dirname>.pdf` (the PDF lands inside the source folder)
/// - Files: `<parent>/<stem>.pdf`
pub fn default_output_path(source: &SourceInput) -> PathBuf {
    match source {
        SourceInput::Directory(dir) => {
            let dir_name = get_file_name_lossy(dir);
            dir.join(format!("{}.pdf", dir_name))
        }
        SourceInput::Archive(file, _) | SourceInput::PackageBook(file, _) => {
            file.with_extension("pdf")
        }
    }
}

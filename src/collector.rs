//! Page image discovery and natural ordering.
//!
//! This module walks an image directory (or an extracted archive), keeps every
//! supported raster file, and sorts them into the canonical page order: cover pages
//! first, copyright pages last, everything else in natural numeric order.

use std::cmp::{Ordering, Reverse};
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, info};
use rayon::prelude::*;
use regex::Regex;
use tokio::fs::read_dir;

use crate::error::{Error, Result};
use crate::path_utils::{get_file_name_lossy, is_hidden_file};
use crate::types::is_image_file;

lazy_static! {
    /// Runs of ASCII digits; everything between two matches is a text segment.
    pub static ref DIGIT_RUN_REGEX: Regex = Regex::new(r"[0-9]+").unwrap();
}

/// Resource-fork folders that zip tools on macOS add next to the real content.
const SKIPPED_DIRECTORIES: [&str; 1] = ["__macosx"];

/// One token of a natural sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A digit run, stored without leading zeros so `02` and `2` are equal.
    Number(String),
    Text(String),
}

impl Segment {
    fn number(digits: &str) -> Self {
        Segment::Number(digits.trim_start_matches('0').to_string())
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // Digit runs compare by value without overflowing on very long runs.
            (Segment::Number(a), Segment::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Less,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Natural sort key of a page image.
///
/// Compares as `(cover first, copyright last, segments)`, so the two flags dominate
/// the numeric/text comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub is_cover: bool,
    pub is_copyright: bool,
    pub segments: Vec<Segment>,
}

impl SortKey {
    /// Builds the key for `relative_path` (`/`-separated, relative to the discovery root).
    ///
    /// The cover/copyright flags look at the file name only; the segments cover the
    /// whole relative path so pages in `chapter 2/` follow those in `chapter 1/`.
    pub fn new(relative_path: &str) -> Self {
        let lowered = relative_path.to_lowercase();
        let file_name = lowered.rsplit('/').next().unwrap_or(&lowered);

        Self {
            is_cover: file_name.contains("cover"),
            is_copyright: file_name.contains("copyright"),
            segments: split_segments(&lowered),
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (Reverse(self.is_cover), self.is_copyright, &self.segments).cmp(&(
            Reverse(other.is_cover),
            other.is_copyright,
            &other.segments,
        ))
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Splits a lowercased name into alternating text and number segments.
/// The first segment is always text, possibly empty.
fn split_segments(name: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last_end = 0;

    for digits in DIGIT_RUN_REGEX.find_iter(name) {
        segments.push(Segment::Text(name[last_end..digits.start()].to_string()));
        segments.push(Segment::number(digits.as_str()));
        last_end = digits.end();
    }
    segments.push(Segment::Text(name[last_end..].to_string()));
    segments
}

/// A discovered page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub path: PathBuf,
    pub sort_key: SortKey,
}

/// Discovers and orders the page images below a root directory.
#[derive(Debug)]
pub struct Collector<'a> {
    root: &'a Path,
}

impl<'a> Collector<'a> {
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    /// Collects every supported image below the root, in canonical page order.
    ///
    /// The walk is top-down with directory entries visited in name order, so images
    /// with equal keys keep a deterministic encounter order through the stable sort.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<ImageFile>>` - The ordered pages; empty if the tree holds no images
    pub async fn collect_images(&self) -> Result<Vec<ImageFile>> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!(
                "Image directory does not exist: {:?}",
                self.root
            )));
        }

        let mut images: Vec<ImageFile> = Vec::new();
        let mut pending: Vec<PathBuf> = vec![self.root.to_path_buf()];

        while let Some(directory) = pending.pop() {
            let (files, subdirectories) = Self::read_sorted(&directory).await?;

            for file in files.into_iter().filter(|f| is_image_file(f)) {
                let sort_key = SortKey::new(&self.relative_name(&file));
                images.push(ImageFile {
                    path: file,
                    sort_key,
                });
            }
            // Reversed so the first subdirectory is walked next.
            pending.extend(subdirectories.into_iter().rev());
        }

        images.par_sort_by(|a, b| a.sort_key.cmp(&b.sort_key));

        info!("Discovered {} page images in {:?}", images.len(), self.root);
        Ok(images)
    }

    /// Reads one directory level, returning (files, subdirectories), each sorted by name.
    async fn read_sorted(directory: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut entries = read_dir(directory).await?;
        let mut files = Vec::new();
        let mut subdirectories = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_hidden_file(&path) {
                continue;
            }

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                let name = get_file_name_lossy(&path).to_lowercase();
                if !SKIPPED_DIRECTORIES.contains(&name.as_str()) {
                    subdirectories.push(path);
                }
            } else if file_type.is_file() {
                files.push(path);
            } else if file_type.is_symlink() {
                // Linked files are pages; linked directories are never walked.
                match tokio::fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => files.push(path),
                    Ok(_) => debug!("Not following directory link {:?}", path),
                    Err(e) => debug!("Skipping dangling link {:?}: {}", path, e),
                }
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        subdirectories.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok((files, subdirectories))
    }

    fn relative_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Convenience wrapper around [`Collector::collect_images`].
pub async fn discover_images(root: &Path) -> Result<Vec<ImageFile>> {
    Collector::new(root).collect_images().await
}

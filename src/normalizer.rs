//! Concurrent page image normalization.
//!
//! Each non-passthrough page is decoded, converted according to the run's
//! [`NormalizationMode`], and re-encoded into the scratch directory by a bounded pool
//! of blocking tasks. Results are tagged with their source index and put back into
//! page order once every task has finished.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use log::{debug, info};
use rayon::prelude::*;
use tokio::spawn;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, spawn_blocking};

use crate::error::{Error, Result};
use crate::path_utils::get_file_name_lossy;
use crate::types::{NormalizationMode, PageItem, is_jpeg_file};

/// Channel difference above which a pixel counts as colored (channels scaled to `[0, 1]`).
pub const COLORFUL_THRESHOLD: f32 = 0.5;
/// Quality used when re-encoding pages as JPEG.
pub const JPEG_QUALITY: u8 = 75;

/// Converts page images into PDF-ready bytes.
#[derive(Debug, Clone)]
pub struct Normalizer {
    mode: NormalizationMode,
    scratch: PathBuf,
    worker_count: usize,
}

impl Normalizer {
    /// Creates a normalizer writing its intermediates into `scratch`.
    ///
    /// # Arguments
    ///
    /// * `mode` - Transcoding policy for the whole run
    /// * `scratch` - Run-owned scratch directory
    /// * `worker_count` - Pool size; `None` uses the number of CPUs, and 0 is treated as 1
    pub fn new(mode: NormalizationMode, scratch: &Path, worker_count: Option<usize>) -> Self {
        Self {
            mode,
            scratch: scratch.to_path_buf(),
            worker_count: worker_count.unwrap_or_else(num_cpus::get).max(1),
        }
    }

    /// Normalizes `sources` and returns one [`PageItem`] per source, in source order.
    ///
    /// JPEGs are read as they are when the mode is `None`; every other file becomes a
    /// task on the pool. One failing page fails the whole batch.
    ///
    /// # Returns
    ///
    /// * `Result<Vec<PageItem>>` - Pages whose `source_index` runs `0..sources.len()`
    pub async fn normalize(&self, sources: &[PathBuf]) -> Result<Vec<PageItem>> {
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut handles: Vec<JoinHandle<Result<PageItem>>> = Vec::new();
        let mut pages: Vec<PageItem> = Vec::with_capacity(sources.len());

        for (index, source) in sources.iter().enumerate() {
            if self.mode == NormalizationMode::None && is_jpeg_file(source) {
                let bytes = tokio::fs::read(source).await?;
                debug!("Page {} passes through unchanged: {:?}", index, source);
                pages.push(PageItem::new(bytes, index));
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let source = source.clone();
            let scratch = self.scratch.clone();
            let mode = self.mode;

            handles.push(spawn(async move {
                let _permit = semaphore.acquire().await?;
                // Decoding and encoding are CPU-bound, keep them off the async workers.
                spawn_blocking(move || normalize_file(&source, index, mode, &scratch)).await?
            }));
        }

        let task_count = handles.len();
        for result in try_join_all(handles).await? {
            pages.push(result?);
        }

        // Completion order is not page order.
        pages.sort_by_key(|page| page.source_index);

        if pages.len() != sources.len() {
            return Err(Error::Other(format!(
                "Normalization produced {} pages for {} sources",
                pages.len(),
                sources.len()
            )));
        }

        info!(
            "Normalized {} pages ({} re-encoded, mode {})",
            pages.len(),
            task_count,
            self.mode
        );
        Ok(pages)
    }
}

/// Decodes, converts and re-encodes a single page.
///
/// The result is written to `{index:06}_{stem}.{ext}` in `scratch` so concurrent
/// tasks never share an output file, then read back.
pub fn normalize_file(
    source: &Path,
    index: usize,
    mode: NormalizationMode,
    scratch: &Path,
) -> Result<PageItem> {
    let image = image::open(source)
        .map_err(|e| Error::ImageDecodeError(source.to_path_buf(), e.to_string()))?;

    let (converted, format) = match mode {
        NormalizationMode::ForceJpeg => (DynamicImage::ImageRgb8(image.to_rgb8()), ImageFormat::Jpeg),
        NormalizationMode::ForceGrayscale => {
            if is_colorful(&image) {
                (DynamicImage::ImageRgb8(image.to_rgb8()), ImageFormat::Png)
            } else {
                (DynamicImage::ImageLuma8(image.to_luma8()), ImageFormat::Png)
            }
        }
        NormalizationMode::None => {
            if image.color().has_alpha() {
                (DynamicImage::ImageRgb8(image.to_rgb8()), ImageFormat::Png)
            } else {
                (image, ImageFormat::Png)
            }
        }
    };

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| get_file_name_lossy(source));
    let extension = if format == ImageFormat::Jpeg { "jpg" } else { "png" };
    let output = scratch.join(format!("{:06}_{}.{}", index, stem, extension));

    match format {
        ImageFormat::Jpeg => {
            let writer = BufWriter::new(File::create(&output)?);
            converted.write_with_encoder(JpegEncoder::new_with_quality(writer, JPEG_QUALITY))?;
        }
        _ => converted.save_with_format(&output, format)?,
    }

    debug!("Normalized page {} {:?} -> {:?}", index, source, output);
    Ok(PageItem::new(std::fs::read(&output)?, index))
}

/// Returns true if any pixel has two channels more than [`COLORFUL_THRESHOLD`] apart.
///
/// A coarse color-cast check, not a perceptual one. Grayscale images are never colorful.
pub fn is_colorful(image: &DynamicImage) -> bool {
    if matches!(image.color(), ColorType::L8 | ColorType::L16) {
        return false;
    }

    let rgb = image.to_rgb8();
    let threshold = (COLORFUL_THRESHOLD * 255.0) as u8;

    rgb.as_raw().par_chunks_exact(3).any(|pixel| {
        let (r, g, b) = (pixel[0], pixel[1], pixel[2]);
        r.abs_diff(g) > threshold || g.abs_diff(b) > threshold || r.abs_diff(b) > threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_is_colorful() {
        let gray = RgbImage::from_pixel(4, 4, Rgb([120, 120, 120]));
        assert!(!is_colorful(&DynamicImage::ImageRgb8(gray)));

        // 100/255 apart is below the threshold.
        let tinted = RgbImage::from_pixel(4, 4, Rgb([200, 150, 100]));
        assert!(!is_colorful(&DynamicImage::ImageRgb8(tinted)));

        let mut mostly_gray = RgbImage::from_pixel(8, 8, Rgb([30, 30, 30]));
        mostly_gray.put_pixel(7, 7, Rgb([255, 0, 0]));
        assert!(is_colorful(&DynamicImage::ImageRgb8(mostly_gray)));
    }

    #[test]
    fn test_is_colorful_threshold_boundary() {
        // 127/255 is just below one half, 128/255 just above.
        let mut below = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        below.put_pixel(0, 0, Rgb([227, 100, 100]));
        assert!(!is_colorful(&DynamicImage::ImageRgb8(below)));

        let mut above = RgbImage::from_pixel(4, 4, Rgb([100, 100, 100]));
        above.put_pixel(0, 0, Rgb([228, 100, 100]));
        assert!(is_colorful(&DynamicImage::ImageRgb8(above)));
    }

    #[test]
    fn test_normalize_file_modes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("page.png");
        RgbaImage::from_pixel(6, 4, Rgba([10, 200, 10, 128]))
            .save(&source)
            .unwrap();

        let page = normalize_file(&source, 3, NormalizationMode::None, dir.path()).unwrap();
        assert_eq!(page.source_index, 3);
        let decoded = image::load_from_memory(&page.bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert!(dir.path().join("000003_page.png").exists());

        let page = normalize_file(&source, 4, NormalizationMode::ForceJpeg, dir.path()).unwrap();
        assert_eq!(
            image::guess_format(&page.bytes).unwrap(),
            ImageFormat::Jpeg
        );

        let page = normalize_file(&source, 5, NormalizationMode::ForceGrayscale, dir.path()).unwrap();
        let decoded = image::load_from_memory(&page.bytes).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
    }

    #[test]
    fn test_undecodable_page_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.png");
        std::fs::write(&source, b"not a png").unwrap();

        let result = normalize_file(&source, 0, NormalizationMode::ForceGrayscale, dir.path());
        assert!(matches!(result, Err(Error::ImageDecodeError(..))));
    }

    #[tokio::test]
    async fn test_normalize_preserves_order_for_any_pool_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let scratch = dir.path().join("scratch");
        std::fs::create_dir_all(&scratch)?;

        let mut sources = Vec::new();
        for i in 0..12u8 {
            let path = dir.path().join(format!("{}.png", i));
            // Different sizes give the tasks different run times.
            let side = 4 + (12 - i as u32) * 8;
            RgbImage::from_pixel(side, side, Rgb([i, i, i])).save(&path)?;
            sources.push(path);
        }

        for workers in [1, 3, 16] {
            let normalizer =
                Normalizer::new(NormalizationMode::ForceGrayscale, &scratch, Some(workers));
            let pages = normalizer.normalize(&sources).await?;
            let order: Vec<usize> = pages.iter().map(|p| p.source_index).collect();
            assert_eq!(order, (0..12).collect::<Vec<_>>());

            let first = image::load_from_memory(&pages[0].bytes)?;
            assert_eq!(first.width(), 4 + 12 * 8);
        }
        Ok(())
    }
}

//! Common test utilities and constants for the manga2pdf crate.
//!
//! Provides functions for setting up test directories, creating dummy images,
//! archives and EPUB packages, and inspecting the generated PDFs.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::{Dictionary, Document, Object};
use manga2pdf::error::{Error, Result};
use rand::{Rng, distributions::Alphanumeric};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[allow(dead_code)]
pub const TEST_TMP_DIR: &str = "tests/tmp";
#[allow(dead_code)]
pub const TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Paths of one test's private working area.
#[allow(dead_code)]
pub struct TestDirs {
    pub base_dir: PathBuf,
    pub source_dir: PathBuf,
    pub target_dir: PathBuf,
}

/// Creates a unique test directory with empty `source` and `target` subdirectories.
#[allow(dead_code)]
pub async fn setup_test_dirs(sub_path: &str) -> TestDirs {
    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let base_dir = PathBuf::from(TEST_TMP_DIR).join(format!("{}-{}", sub_path, rand_string));
    if base_dir.exists() {
        fs::remove_dir_all(&base_dir).await.unwrap();
    }
    let source_dir = base_dir.join("source");
    let target_dir = base_dir.join("target");
    fs::create_dir_all(&source_dir).await.unwrap();
    fs::create_dir_all(&target_dir).await.unwrap();

    TestDirs {
        base_dir,
        source_dir,
        target_dir,
    }
}

/// Encodes a solid-color image of the given size.
#[allow(dead_code)]
pub fn image_bytes(width: u32, height: u32, color: Rgb<u8>, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, color));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

/// Writes a solid-color image; the format follows the file extension.
#[allow(dead_code)]
pub async fn create_dummy_image(path: &Path, width: u32, color: Rgb<u8>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let img = RgbImage::from_pixel(width, 100, color);
    let path_clone = path.to_path_buf();
    tokio::task::spawn_blocking(move || img.save(path_clone))
        .await?
        .map_err(Error::Image)?;
    Ok(())
}

/// Creates a dummy color image at the given path.
#[allow(dead_code)]
pub async fn create_dummy_color_image(path: &Path, width: u32) -> Result<()> {
    create_dummy_image(path, width, Rgb([255, 0, 0])).await // Red
}

/// Creates a dummy grayscale image at the given path.
#[allow(dead_code)]
pub async fn create_dummy_grayscale_image(path: &Path, width: u32) -> Result<()> {
    create_dummy_image(path, width, Rgb([128, 128, 128])).await
}

/// Creates a half-transparent PNG.
#[allow(dead_code)]
pub async fn create_transparent_png(path: &Path, width: u32) -> Result<()> {
    let img = RgbaImage::from_pixel(width, 100, Rgba([20, 20, 20, 100]));
    let path_clone = path.to_path_buf();
    tokio::task::spawn_blocking(move || img.save_with_format(path_clone, ImageFormat::Png))
        .await?
        .map_err(Error::Image)?;
    Ok(())
}

/// Writes a zip archive with the given entries, in order.
#[allow(dead_code)]
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

#[allow(dead_code)]
pub const SAMPLE_OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Sample Manga Vol. 1</dc:title>
    <dc:creator>Writer One</dc:creator>
    <dc:creator>Artist Two</dc:creator>
    <dc:publisher>Sample Press</dc:publisher>
    <dc:date>2020-02-29</dc:date>
    <dc:language>ja</dc:language>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="i1" href="images/p1.jpg" media-type="image/jpeg"/>
    <item id="i2" href="images/p2.png" media-type="image/png"/>
    <item id="i3" href="images/p3.jpg" media-type="image/jpeg"/>
    <item id="x1" href="xhtml/p1.xhtml" media-type="application/xhtml+xml"/>
    <item id="x2" href="xhtml/p2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="x1"/>
    <itemref idref="x2"/>
  </spine>
</package>"#;

#[allow(dead_code)]
pub const SAMPLE_NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Cover</text></navLabel>
      <content src="xhtml/p1.xhtml"/>
    </navPoint>
    <navPoint id="n2" playOrder="2">
      <navLabel><text>Chapter 1</text></navLabel>
      <content src="images/p3.jpg"/>
    </navPoint>
    <navPoint id="n3" playOrder="3">
      <navLabel><text>Extra</text></navLabel>
      <content src="xhtml/p2.xhtml#page"/>
    </navPoint>
  </navMap>
</ncx>"#;

#[allow(dead_code)]
pub const SAMPLE_P1_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:xlink="http://www.w3.org/1999/xlink">
<head><title>p1</title></head>
<body><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 40 100"><image width="40" height="100" xlink:href="../images/p1.jpg"/></svg></body>
</html>"#;

#[allow(dead_code)]
pub const SAMPLE_P2_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>p2</title></head>
<body><div><img src="../images/p2.png" alt=""/></div></body>
</html>"#;

/// Page widths of the sample EPUB, in page order: p1.jpg, p3.jpg, p2.png.
#[allow(dead_code)]
pub const SAMPLE_EPUB_WIDTHS: [u32; 3] = [40, 120, 80];

/// Builds the sample EPUB, replacing the NCX if `ncx` is given.
#[allow(dead_code)]
pub fn create_sample_epub(path: &Path, ncx: Option<&str>) {
    write_zip(
        path,
        &[
            ("mimetype", b"application/epub+zip".to_vec()),
            (
                "META-INF/container.xml",
                br#"<container><rootfiles><rootfile full-path="OEBPS/standard.opf"/></rootfiles></container>"#.to_vec(),
            ),
            ("OEBPS/standard.opf", SAMPLE_OPF.as_bytes().to_vec()),
            ("OEBPS/toc.ncx", ncx.unwrap_or(SAMPLE_NCX).as_bytes().to_vec()),
            ("OEBPS/xhtml/p1.xhtml", SAMPLE_P1_XHTML.as_bytes().to_vec()),
            ("OEBPS/xhtml/p2.xhtml", SAMPLE_P2_XHTML.as_bytes().to_vec()),
            (
                "OEBPS/images/p1.jpg",
                image_bytes(40, 100, Rgb([200, 30, 30]), ImageFormat::Jpeg),
            ),
            (
                "OEBPS/images/p2.png",
                image_bytes(80, 100, Rgb([90, 90, 90]), ImageFormat::Png),
            ),
            (
                "OEBPS/images/p3.jpg",
                image_bytes(120, 100, Rgb([30, 30, 200]), ImageFormat::Jpeg),
            ),
        ],
    );
}

/// Loads a generated PDF, asserting it exists.
#[allow(dead_code)]
pub fn load_pdf(path: &Path) -> Document {
    assert!(path.is_file(), "Output PDF does not exist: {:?}", path);
    Document::load(path).unwrap()
}

#[allow(dead_code)]
pub fn catalog(doc: &Document) -> &Dictionary {
    let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_dictionary(root).unwrap()
}

/// Name stored under `key` in the catalog, if any.
#[allow(dead_code)]
pub fn catalog_name(doc: &Document, key: &[u8]) -> Option<String> {
    catalog(doc)
        .get(key)
        .and_then(Object::as_name)
        .ok()
        .map(|name| String::from_utf8_lossy(name).to_string())
}

/// `/ViewerPreferences /Direction`, if any.
#[allow(dead_code)]
pub fn direction(doc: &Document) -> Option<String> {
    let prefs = catalog(doc).get(b"ViewerPreferences").ok()?.as_dict().ok()?;
    let name = prefs.get(b"Direction").ok()?.as_name().ok()?;
    Some(String::from_utf8_lossy(name).to_string())
}

/// Page widths in points, in page order.
#[allow(dead_code)]
pub fn page_widths(doc: &Document) -> Vec<f32> {
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            media_box[2].as_float().unwrap()
        })
        .collect()
}

/// Decodes a PDF text string (PDFDocEncoding for ASCII, UTF-16BE with BOM otherwise).
#[allow(dead_code)]
pub fn decode_text(object: &Object) -> String {
    let bytes = object.as_str().unwrap();
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}

/// Outline item titles, following the `/First` and `/Next` links.
#[allow(dead_code)]
pub fn outline_titles(doc: &Document) -> Vec<String> {
    let Ok(outlines) = catalog(doc).get(b"Outlines") else {
        return Vec::new();
    };
    let outlines = doc
        .get_dictionary(outlines.as_reference().unwrap())
        .unwrap();

    let mut titles = Vec::new();
    let mut next = outlines.get(b"First").ok().map(|o| o.as_reference().unwrap());
    while let Some(id) = next {
        let item = doc.get_dictionary(id).unwrap();
        titles.push(decode_text(item.get(b"Title").unwrap()));
        next = item.get(b"Next").ok().map(|o| o.as_reference().unwrap());
    }
    titles
}

/// The `/Info` dictionary entry `key`, decoded.
#[allow(dead_code)]
pub fn info_field(doc: &Document, key: &[u8]) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = doc.get_dictionary(info).ok()?;
    info.get(key).ok().map(decode_text)
}

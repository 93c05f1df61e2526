//! [`PdfDocument`] on top of `lopdf`.

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use regex::{Captures, Regex};
use tempfile::NamedTempFile;

use super::PdfDocument;
use crate::error::{Error, Result};
use crate::types::{Direction, EpubMetadata, NavigationEntry, PageLayout, PageMode};

const XMP_TEMPLATE: &str = include_str!("../../templates/xmp.xml");

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"%([a-z]+)%").unwrap();
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Encodes a PDF text string: a literal for ASCII, UTF-16BE with a byte order mark otherwise.
pub fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Converts an EPUB date to a PDF date string (`D:YYYYMMDDHHmmSSZ`).
///
/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM` and `YYYY`. Anything else is returned
/// unchanged.
pub fn pdf_date(date: &str) -> String {
    let date = date.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return parsed.with_timezone(&Utc).format("D:%Y%m%d%H%M%SZ").to_string();
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return parsed.format("D:%Y%m%d000000Z").to_string();
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(&format!("{}-01", date), "%Y-%m-%d") {
        return parsed.format("D:%Y%m%d000000Z").to_string();
    }
    if date.len() == 4 && date.chars().all(|c| c.is_ascii_digit()) {
        return format!("D:{}0101000000Z", date);
    }
    date.to_string()
}

/// Renders the XMP packet for `metadata`.
pub fn render_xmp(metadata: &EpubMetadata) -> String {
    let creators = metadata
        .creators
        .iter()
        .map(|creator| format!("          <rdf:li>{}</rdf:li>", escape_xml(creator)))
        .collect::<Vec<_>>()
        .join("\n");

    let field = |value: &Option<String>| escape_xml(value.as_deref().unwrap_or(""));

    // One pass over the template, so substituted values are never scanned again.
    PLACEHOLDER_REGEX
        .replace_all(XMP_TEMPLATE, |caps: &Captures| match &caps[1] {
            "title" => field(&metadata.title),
            "creators" => creators.clone(),
            "publisher" => field(&metadata.publisher),
            "createdate" => field(&metadata.date),
            "language" => field(&metadata.language),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Writes `value` as a name under `key` unless it is already stored there.
fn set_name_if_changed(dict: &mut Dictionary, key: &str, value: &str) -> bool {
    let current = dict.get(key.as_bytes()).and_then(Object::as_name).ok();
    if current == Some(value.as_bytes()) {
        return false;
    }
    dict.set(key, Object::Name(value.as_bytes().to_vec()));
    true
}

/// A PDF loaded into memory for editing.
#[derive(Debug)]
pub struct LopdfDocument {
    document: Document,
}

impl LopdfDocument {
    pub fn document(&self) -> &Document {
        &self.document
    }

    fn catalog_id(&self) -> Result<ObjectId> {
        Ok(self.document.trailer.get(b"Root")?.as_reference()?)
    }

    fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = self.catalog_id()?;
        Ok(self.document.get_object_mut(id)?.as_dict_mut()?)
    }

    /// The viewer preferences dictionary, created inline if the catalog has none.
    fn viewer_preferences_mut(&mut self) -> Result<&mut Dictionary> {
        let indirect = match self.catalog_mut()?.get(b"ViewerPreferences") {
            Ok(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        if let Some(id) = indirect {
            return Ok(self.document.get_object_mut(id)?.as_dict_mut()?);
        }

        let catalog = self.catalog_mut()?;
        if !matches!(catalog.get(b"ViewerPreferences"), Ok(Object::Dictionary(_))) {
            catalog.set("ViewerPreferences", Dictionary::new());
        }
        Ok(catalog.get_mut(b"ViewerPreferences")?.as_dict_mut()?)
    }
}

impl PdfDocument for LopdfDocument {
    fn load(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            document: Document::load_mem(bytes)?,
        })
    }

    fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    fn set_metadata(&mut self, metadata: &EpubMetadata) -> Result<&mut Self> {
        let text = |value: &Option<String>| text_string(value.as_deref().unwrap_or(""));

        let info_id = self.document.add_object(dictionary! {
            "Title" => text(&metadata.title),
            "Author" => text_string(&metadata.creators.join(", ")),
            "Publisher" => text(&metadata.publisher),
            "CreationDate" => text_string(&metadata.date.as_deref().map(pdf_date).unwrap_or_default()),
            "Producer" => text_string(""),
        });
        self.document.trailer.set("Info", info_id);

        let mut xmp = Stream::new(
            dictionary! {
                "Type" => "Metadata",
                "Subtype" => "XML",
            },
            render_xmp(metadata).into_bytes(),
        );
        // Viewers read the packet without decoding filters.
        xmp.allows_compression = false;
        let xmp_id = self.document.add_object(xmp);

        let catalog = self.catalog_mut()?;
        catalog.set("Metadata", xmp_id);
        if let Some(language) = metadata.language.as_deref().filter(|l| !l.is_empty()) {
            catalog.set("Lang", text_string(language));
        }
        Ok(self)
    }

    fn set_outline(&mut self, entries: &[NavigationEntry]) -> Result<&mut Self> {
        if entries.is_empty() {
            return Ok(self);
        }

        let page_ids: Vec<ObjectId> = self.document.get_pages().into_values().collect();
        let outlines_id = self.document.new_object_id();
        let item_ids: Vec<ObjectId> = entries
            .iter()
            .map(|_| self.document.new_object_id())
            .collect();

        for (i, entry) in entries.iter().enumerate() {
            let page_id = page_ids.get(entry.target_page_index).ok_or_else(|| {
                Error::NavigationTargetNotFound {
                    label: entry.label.clone(),
                    target: format!("page {}", entry.target_page_index),
                }
            })?;

            let mut item = dictionary! {
                "Title" => text_string(&entry.label),
                "Parent" => outlines_id,
                "Dest" => vec![Object::Reference(*page_id), Object::Name(b"Fit".to_vec())],
            };
            if i > 0 {
                item.set("Prev", item_ids[i - 1]);
            }
            if let Some(next) = item_ids.get(i + 1) {
                item.set("Next", *next);
            }
            self.document
                .objects
                .insert(item_ids[i], Object::Dictionary(item));
        }

        let (first, last) = (item_ids[0], item_ids[item_ids.len() - 1]);
        self.document.objects.insert(
            outlines_id,
            Object::Dictionary(dictionary! {
                "Type" => "Outlines",
                "First" => first,
                "Last" => last,
                "Count" => entries.len() as i64,
            }),
        );
        self.catalog_mut()?.set("Outlines", outlines_id);
        Ok(self)
    }

    fn set_page_layout(&mut self, layout: PageLayout) -> Result<bool> {
        Ok(set_name_if_changed(
            self.catalog_mut()?,
            "PageLayout",
            layout.pdf_name(),
        ))
    }

    fn set_page_mode(&mut self, mode: PageMode) -> Result<bool> {
        Ok(set_name_if_changed(
            self.catalog_mut()?,
            "PageMode",
            mode.pdf_name(),
        ))
    }

    fn set_direction(&mut self, direction: Direction) -> Result<bool> {
        Ok(set_name_if_changed(
            self.viewer_preferences_mut()?,
            "Direction",
            direction.pdf_name(),
        ))
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !directory.is_dir() {
            return Err(Error::OutputPathInvalid(
                path.to_path_buf(),
                format!("The directory {:?} does not exist", directory),
            ));
        }

        // Written next to the target, then renamed over it.
        let mut temporary = NamedTempFile::new_in(directory)?;
        self.document.save_to(temporary.as_file_mut())?;
        temporary.as_file().sync_all()?;
        temporary.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{ImagePdfEncoder, PageEncoder};
    use crate::types::PageItem;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn sample_document(pages: usize) -> LopdfDocument {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let items: Vec<PageItem> = (0..pages).map(|i| PageItem::new(png.clone(), i)).collect();
        let bytes = ImagePdfEncoder::default().encode(&items).unwrap();
        LopdfDocument::load(&bytes).unwrap()
    }

    fn catalog(doc: &LopdfDocument) -> &Dictionary {
        let id = doc.catalog_id().unwrap();
        doc.document().get_dictionary(id).unwrap()
    }

    #[test]
    fn test_viewer_settings_are_idempotent() {
        let mut doc = sample_document(1);
        assert!(doc.set_page_layout(PageLayout::TwoPageRight).unwrap());
        assert!(!doc.set_page_layout(PageLayout::TwoPageRight).unwrap());
        assert!(doc.set_page_layout(PageLayout::OneColumn).unwrap());

        assert!(doc.set_direction(Direction::R2L).unwrap());
        assert!(!doc.set_direction(Direction::R2L).unwrap());
        assert!(doc.set_page_mode(PageMode::UseOutlines).unwrap());

        let catalog = catalog(&doc);
        assert_eq!(catalog.get(b"PageLayout").unwrap().as_name().unwrap(), b"OneColumn");
        assert_eq!(catalog.get(b"PageMode").unwrap().as_name().unwrap(), b"UseOutlines");
        let prefs = catalog.get(b"ViewerPreferences").unwrap().as_dict().unwrap();
        assert_eq!(prefs.get(b"Direction").unwrap().as_name().unwrap(), b"R2L");
    }

    #[test]
    fn test_outline_links_pages_in_order() {
        let mut doc = sample_document(3);
        let entries = vec![
            NavigationEntry {
                label: "表紙".to_string(),
                target_page_index: 0,
            },
            NavigationEntry {
                label: "Chapter 1".to_string(),
                target_page_index: 2,
            },
        ];
        doc.set_outline(&entries).unwrap();

        let outlines_id = catalog(&doc).get(b"Outlines").unwrap().as_reference().unwrap();
        let outlines = doc.document().get_dictionary(outlines_id).unwrap();
        assert_eq!(outlines.get(b"Count").unwrap().as_i64().unwrap(), 2);

        let first_id = outlines.get(b"First").unwrap().as_reference().unwrap();
        let first = doc.document().get_dictionary(first_id).unwrap();
        assert!(first.get(b"Prev").is_err());
        let title = first.get(b"Title").unwrap().as_str().unwrap();
        assert!(title.starts_with(&[0xFE, 0xFF]));

        let second_id = first.get(b"Next").unwrap().as_reference().unwrap();
        let second = doc.document().get_dictionary(second_id).unwrap();
        let dest = second.get(b"Dest").unwrap().as_array().unwrap();
        let third_page = doc.document().get_pages()[&3];
        assert_eq!(dest[0].as_reference().unwrap(), third_page);
    }

    #[test]
    fn test_outline_target_out_of_range() {
        let mut doc = sample_document(1);
        let entries = vec![NavigationEntry {
            label: "Nowhere".to_string(),
            target_page_index: 5,
        }];
        assert!(matches!(
            doc.set_outline(&entries),
            Err(Error::NavigationTargetNotFound { .. })
        ));
    }

    #[test]
    fn test_pdf_date() {
        assert_eq!(pdf_date("2021-04-09"), "D:20210409000000Z");
        assert_eq!(pdf_date("2021-04-09T10:20:30+09:00"), "D:20210409012030Z");
        assert_eq!(pdf_date("2021-04"), "D:20210401000000Z");
        assert_eq!(pdf_date("2021"), "D:20210101000000Z");
        assert_eq!(pdf_date("spring 2021"), "spring 2021");
    }

    #[test]
    fn test_render_xmp_escapes_and_lists_creators() {
        let metadata = EpubMetadata {
            title: Some("Tom & Jerry".to_string()),
            creators: vec!["A".to_string(), "B".to_string()],
            ..Default::default()
        };
        let xmp = render_xmp(&metadata);
        assert!(xmp.contains("Tom &amp; Jerry"));
        assert!(xmp.contains("<rdf:li>A</rdf:li>"));
        assert!(xmp.contains("<rdf:li>B</rdf:li>"));
        assert!(xmp.contains("<dc:publisher>"));
        assert!(!xmp.contains('%'));
    }

    #[test]
    fn test_render_xmp_keeps_placeholder_text_in_values() {
        let metadata = EpubMetadata {
            title: Some("100%publisher% %language%".to_string()),
            creators: vec!["%title%".to_string()],
            publisher: Some("Press".to_string()),
            language: Some("en".to_string()),
            ..Default::default()
        };
        let xmp = render_xmp(&metadata);
        assert!(xmp.contains(r#"<rdf:li xml:lang="x-default">100%publisher% %language%</rdf:li>"#));
        assert!(xmp.contains("<rdf:li>%title%</rdf:li>"));
        assert!(xmp.contains("<rdf:li>Press</rdf:li>"));
        assert!(xmp.contains("<pdf:Language>en</pdf:Language>"));
    }
}

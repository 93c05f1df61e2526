//! Manifest parsing and the candidate page list.

use log::debug;
use quick_xml::Reader;
use quick_xml::events::Event;

use super::attribute_value;
use crate::error::Result;
use crate::path_utils::{container_dirname, join_container_path};

pub const JPEG_MEDIA_TYPE: &str = "image/jpeg";
pub const PNG_MEDIA_TYPE: &str = "image/png";

/// One `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub href: String,
    pub media_type: String,
}

/// Reads every `<item>` inside `<manifest>`, in declaration order.
/// Items without an `href` are skipped.
pub fn parse_manifest(opf: &[u8]) -> Result<Vec<ManifestEntry>> {
    let mut reader = Reader::from_reader(opf);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut in_manifest = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"manifest" => in_manifest = true,
            Event::End(e) if e.local_name().as_ref() == b"manifest" => in_manifest = false,
            Event::Start(e) | Event::Empty(e)
                if in_manifest && e.local_name().as_ref() == b"item" =>
            {
                let Some(href) = attribute_value(&e, b"href")? else {
                    debug!("Skipping manifest item without href");
                    continue;
                };
                entries.push(ManifestEntry {
                    id: attribute_value(&e, b"id")?.unwrap_or_default(),
                    href,
                    media_type: attribute_value(&e, b"media-type")?.unwrap_or_default(),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

/// Builds the page list: every JPEG item in declaration order, then every PNG item
/// in declaration order. Hrefs are resolved against the package document's directory.
///
/// # Arguments
///
/// * `entries` - The manifest, as returned by [`parse_manifest`]
/// * `package_document` - Container path of the `.opf` the manifest came from
pub fn candidate_pages(entries: &[ManifestEntry], package_document: &str) -> Vec<String> {
    let base = container_dirname(package_document);
    let with_type = move |media_type: &'static str| {
        entries
            .iter()
            .filter(move |entry| entry.media_type.eq_ignore_ascii_case(media_type))
            .map(move |entry| join_container_path(base, &entry.href))
    };

    with_type(JPEG_MEDIA_TYPE)
        .chain(with_type(PNG_MEDIA_TYPE))
        .collect()
}

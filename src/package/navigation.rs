//! NCX navigation: table-of-contents entries resolved to page indices.

use log::debug;
use quick_xml::Reader;
use quick_xml::events::Event;

use super::{Container, attribute_value};
use crate::error::{Error, Result};
use crate::path_utils::{container_dirname, join_container_path};
use crate::types::NavigationEntry;

const CONTENT_DOCUMENT_EXTENSIONS: [&str; 3] = ["xhtml", "html", "htm"];

/// A raw `<navPoint>`: its label text and its `content@src`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavPoint {
    pub label: String,
    pub src: String,
}

/// Reads every `<navPoint>` of an NCX document.
///
/// Nested points are included; points are returned in the order their opening
/// tags appear, which is the reading order of the table of contents.
pub fn parse_nav_points(ncx: &[u8]) -> Result<Vec<NavPoint>> {
    let mut reader = Reader::from_reader(ncx);
    reader.config_mut().trim_text(true);

    let mut points: Vec<NavPoint> = Vec::new();
    // Indices into `points` of the navPoints currently open.
    let mut open: Vec<usize> = Vec::new();
    let mut in_label = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                name if name.eq_ignore_ascii_case(b"navPoint") => {
                    open.push(points.len());
                    points.push(NavPoint::default());
                }
                name if name.eq_ignore_ascii_case(b"navLabel") => in_label = true,
                name if name.eq_ignore_ascii_case(b"content") => {
                    set_src(&mut points, &open, attribute_value(&e, b"src")?)
                }
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref().eq_ignore_ascii_case(b"content") => {
                set_src(&mut points, &open, attribute_value(&e, b"src")?)
            }
            Event::End(e) => match e.local_name().as_ref() {
                name if name.eq_ignore_ascii_case(b"navPoint") => {
                    open.pop();
                }
                name if name.eq_ignore_ascii_case(b"navLabel") => in_label = false,
                _ => {}
            },
            Event::Text(t) if in_label => {
                if let Some(&current) = open.last() {
                    points[current].label.push_str(t.unescape()?.trim());
                }
            }
            Event::CData(t) if in_label => {
                if let Some(&current) = open.last() {
                    points[current].label.push_str(String::from_utf8_lossy(&t).trim());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(points)
}

fn set_src(points: &mut [NavPoint], open: &[usize], src: Option<String>) {
    if let (Some(&current), Some(src)) = (open.last(), src) {
        if points[current].src.is_empty() {
            points[current].src = src;
        }
    }
}

/// Finds the page image a content document displays.
///
/// The first `<image>` (SVG wrapper, `xlink:href`) wins; the first `<img>` (`src`)
/// is the fallback. End-tag mismatches are tolerated since content documents are
/// often loose HTML.
pub fn find_image_link(document: &[u8]) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(document);
    reader.config_mut().check_end_names = false;

    let mut first_img: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"image" => {
                    let link = match attribute_value(&e, b"href")? {
                        Some(href) => Some(href),
                        None => attribute_value(&e, b"src")?,
                    };
                    if link.is_some() {
                        return Ok(link);
                    }
                }
                b"img" if first_img.is_none() => first_img = attribute_value(&e, b"src")?,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(first_img)
}

fn is_content_document(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| {
            CONTENT_DOCUMENT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Resolves navigation points to indices into `pages`.
///
/// A point either targets a page image directly or a content document showing one.
/// Paths are resolved against the NCX's directory (and then the content document's
/// directory) before the lookup.
///
/// # Errors
///
/// * [`Error::NavigationTargetNotFound`] - A point resolves to a path that is not a page
pub fn resolve_nav_points<C: Container>(
    points: &[NavPoint],
    navigation_document: &str,
    pages: &[String],
    container: &mut C,
) -> Result<Vec<NavigationEntry>> {
    let base = container_dirname(navigation_document);
    let mut entries = Vec::with_capacity(points.len());

    for point in points {
        let not_found = |target: &str| Error::NavigationTargetNotFound {
            label: point.label.clone(),
            target: target.to_string(),
        };
        if point.src.is_empty() {
            return Err(not_found(""));
        }

        let mut target = join_container_path(base, &point.src);
        if is_content_document(&target) {
            let document = container.read_entry(&target).map_err(|_| not_found(&target))?;
            let link = find_image_link(&document)?.ok_or_else(|| not_found(&target))?;
            target = join_container_path(container_dirname(&target), &link);
        }

        let target_page_index = pages
            .iter()
            .position(|page| *page == target)
            .ok_or_else(|| not_found(&target))?;

        debug!("Navigation '{}' -> page {}", point.label, target_page_index);
        entries.push(NavigationEntry {
            label: point.label.clone(),
            target_page_index,
        });
    }

    Ok(entries)
}

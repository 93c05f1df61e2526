//! Bibliographic metadata from the package document.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::Result;
use crate::types::EpubMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Creator,
    Publisher,
    Date,
    Language,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"creator" => Some(Field::Creator),
            b"publisher" => Some(Field::Publisher),
            b"date" => Some(Field::Date),
            b"language" => Some(Field::Language),
            _ => None,
        }
    }
}

/// Reads title, creators, publisher, date and language from `<metadata>`.
///
/// Single-valued fields keep their first occurrence; every creator is kept.
/// Missing or empty elements leave the field unset.
pub fn parse_metadata(opf: &[u8]) -> Result<EpubMetadata> {
    let mut reader = Reader::from_reader(opf);
    reader.config_mut().trim_text(true);

    let mut metadata = EpubMetadata::default();
    let mut in_metadata = false;
    let mut current: Option<(Field, String)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                if name.as_ref() == b"metadata" {
                    in_metadata = true;
                } else if in_metadata {
                    current = Field::from_local_name(name.as_ref()).map(|f| (f, String::new()));
                }
            }
            Event::Text(t) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) => {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"metadata" {
                    break;
                }
                if let Some((field, value)) = current.take() {
                    store(&mut metadata, field, value.trim());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(metadata)
}

fn store(metadata: &mut EpubMetadata, field: Field, value: &str) {
    if value.is_empty() {
        return;
    }
    let first = |slot: &mut Option<String>| {
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    };
    match field {
        Field::Title => first(&mut metadata.title),
        Field::Publisher => first(&mut metadata.publisher),
        Field::Date => first(&mut metadata.date),
        Field::Language => first(&mut metadata.language),
        Field::Creator => metadata.creators.push(value.to_string()),
    }
}

//! Image-to-PDF encoding with `lopdf`.

use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::jpeg::JpegDecoder;
use image::{ExtendedColorType, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};

use super::PageEncoder;
use crate::error::{Error, Result};
use crate::types::PageItem;

/// Resolution assumed for page images when sizing PDF pages.
pub const DEFAULT_DPI: f32 = 96.0;

const IMAGE_RESOURCE: &[u8] = b"Im0";

/// Places each image on its own page, sized to the image.
///
/// JPEG data is embedded unchanged (`DCTDecode`); everything else is decoded to
/// 8-bit gray or RGB samples and stored with `FlateDecode`.
#[derive(Debug, Clone, Copy)]
pub struct ImagePdfEncoder {
    dpi: f32,
}

impl Default for ImagePdfEncoder {
    fn default() -> Self {
        Self { dpi: DEFAULT_DPI }
    }
}

impl ImagePdfEncoder {
    pub fn with_dpi(dpi: f32) -> Self {
        Self {
            dpi: if dpi > 0.0 { dpi } else { DEFAULT_DPI },
        }
    }

    fn points(&self, pixels: u32) -> f32 {
        pixels as f32 * 72.0 / self.dpi
    }
}

impl PageEncoder for ImagePdfEncoder {
    fn encode(&self, pages: &[PageItem]) -> Result<Vec<u8>> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

        for page in pages {
            let (image, width, height) = image_xobject(page)?;
            let image_id = doc.add_object(image);
            let (page_width, page_height) = (self.points(width), self.points(height));

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            Object::Real(page_width),
                            Object::Integer(0),
                            Object::Integer(0),
                            Object::Real(page_height),
                            Object::Integer(0),
                            Object::Integer(0),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(IMAGE_RESOURCE.to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(page_width),
                    Object::Real(page_height),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        "Im0" => image_id,
                    },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn decode_error(page: &PageItem, message: impl ToString) -> Error {
    Error::ImageDecodeError(
        PathBuf::from(format!("page #{}", page.source_index + 1)),
        message.to_string(),
    )
}

/// Builds the image XObject for one page. Returns the stream and the pixel size.
fn image_xobject(page: &PageItem) -> Result<(Stream, u32, u32)> {
    let format = image::guess_format(&page.bytes).map_err(|e| decode_error(page, e))?;
    if format == ImageFormat::Jpeg {
        return jpeg_xobject(page);
    }

    let image = image::load_from_memory_with_format(&page.bytes, format)
        .map_err(|e| decode_error(page, e))?;
    let (width, height) = (image.width(), image.height());

    let (color_space, samples) = if image.color().has_color() {
        ("DeviceRGB", image.to_rgb8().into_raw())
    } else {
        ("DeviceGray", image.to_luma8().into_raw())
    };

    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8_i64,
        },
        samples,
    );
    stream.compress()?;
    Ok((stream, width, height))
}

fn jpeg_xobject(page: &PageItem) -> Result<(Stream, u32, u32)> {
    let decoder = JpegDecoder::new(Cursor::new(&page.bytes)).map_err(|e| decode_error(page, e))?;
    let (width, height) = decoder.dimensions();

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "BitsPerComponent" => 8_i64,
        "Filter" => "DCTDecode",
    };
    match decoder.original_color_type() {
        ExtendedColorType::L8 => dict.set("ColorSpace", "DeviceGray"),
        ExtendedColorType::Cmyk8 => {
            dict.set("ColorSpace", "DeviceCMYK");
            // Adobe CMYK JPEGs store inverted samples.
            let decode: Vec<Object> = [1, 0, 1, 0, 1, 0, 1, 0]
                .into_iter()
                .map(Object::Integer)
                .collect();
            dict.set("Decode", decode);
        }
        _ => dict.set("ColorSpace", "DeviceRGB"),
    }

    Ok((Stream::new(dict, page.bytes.clone()), width, height))
}

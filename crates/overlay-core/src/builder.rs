//! PDF output builder backed by lopdf
//!
//! Overlays are flattened into the page content: every touched page gets one
//! extra content stream holding all of its draw operations. The original
//! content is wrapped in `q`/`Q` first so its graphics state cannot leak into
//! the overlay.

use crate::annotation::ImageFormat;
use crate::compose::{OutputBuilder, TextDraw};
use crate::coords::DocumentRect;
use crate::document::{PageSize, SourceDocument};
use crate::error::EditorError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};

/// Resource name of the overlay font
const FONT_RESOURCE: &str = "OvlF1";

const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Approximate ascent of Helvetica as a fraction of the font size
const ASCENT: f64 = 0.8;

/// Handle to an embedded image XObject
#[derive(Debug, Clone, PartialEq)]
pub struct PdfImage {
    id: ObjectId,
    name: String,
}

#[derive(Debug, Default)]
struct PageOverlay {
    /// Upright page space to user space, when that is not the identity
    transform: Option<[f64; 6]>,
    operations: Vec<Operation>,
    uses_font: bool,
    images: Vec<PdfImage>,
}

pub struct PdfOutputBuilder {
    document: Document,
    pages: Vec<ObjectId>,
    overlays: BTreeMap<u32, PageOverlay>,
    font_id: Option<ObjectId>,
    image_count: usize,
}

impl PdfOutputBuilder {
    /// Start an output document from a copy of `source`
    pub fn new(source: &SourceDocument) -> Self {
        let pages = (0..source.page_count())
            .filter_map(|page| source.page_id(page).ok())
            .collect();
        Self {
            document: source.document().clone(),
            pages,
            overlays: BTreeMap::new(),
            font_id: None,
            image_count: 0,
        }
    }

    fn overlay(&mut self, page: u32) -> Result<&mut PageOverlay, EditorError> {
        if page as usize >= self.pages.len() {
            return Err(EditorError::InvalidPage {
                page,
                page_count: self.pages.len() as u32,
            });
        }
        Ok(self.overlays.entry(page).or_default())
    }

    fn font_id(&mut self) -> ObjectId {
        match self.font_id {
            Some(id) => id,
            None => {
                let id = self.document.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                });
                self.font_id = Some(id);
                id
            }
        }
    }

    fn flush_page(&mut self, page: u32, overlay: PageOverlay) -> Result<(), EditorError> {
        if overlay.operations.is_empty() {
            return Ok(());
        }
        let page_id = self.pages[page as usize];

        let mut resources = page_resources(&self.document, page_id);
        if overlay.uses_font {
            let font_id = self.font_id();
            let mut fonts = sub_dictionary(&self.document, &resources, b"Font");
            fonts.set(FONT_RESOURCE, Object::Reference(font_id));
            resources.set("Font", Object::Dictionary(fonts));
        }
        if !overlay.images.is_empty() {
            let mut xobjects = sub_dictionary(&self.document, &resources, b"XObject");
            for image in &overlay.images {
                xobjects.set(image.name.as_bytes().to_vec(), Object::Reference(image.id));
            }
            resources.set("XObject", Object::Dictionary(xobjects));
        }

        let mut operations = vec![Operation::new("Q", vec![])];
        if let Some(matrix) = overlay.transform {
            operations.push(Operation::new("cm", matrix.iter().copied().map(real).collect()));
        }
        operations.extend(overlay.operations);
        let content = Content { operations }
            .encode()
            .map_err(|e| EditorError::OperationError(e.to_string()))?;

        let save_id = self
            .document
            .add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
        let overlay_id = self.document.add_object(Stream::new(dictionary! {}, content));

        let mut contents = vec![Object::Reference(save_id)];
        contents.extend(existing_contents(&self.document, page_id));
        contents.push(Object::Reference(overlay_id));

        let page_dict = self
            .document
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| EditorError::OperationError(e.to_string()))?;
        page_dict.set("Resources", Object::Dictionary(resources));
        page_dict.set("Contents", Object::Array(contents));
        Ok(())
    }
}

impl OutputBuilder for PdfOutputBuilder {
    type Page = u32;
    type Image = PdfImage;

    fn copy_page(&mut self, page: u32, size: &PageSize) -> Result<u32, EditorError> {
        let matrix = size.user_space_matrix();
        let overlay = self.overlay(page)?;
        overlay.transform = (matrix != IDENTITY).then_some(matrix);
        Ok(page)
    }

    fn draw_text(&mut self, page: u32, draw: &TextDraw<'_>) -> Result<(), EditorError> {
        let ops = text_operations(draw);
        let overlay = self.overlay(page)?;
        overlay.operations.extend(ops);
        overlay.uses_font = true;
        Ok(())
    }

    fn embed_image(&mut self, bytes: &[u8], format: ImageFormat) -> Result<PdfImage, EditorError> {
        let stream = match format {
            ImageFormat::Jpeg => jpeg_stream(bytes)?,
            ImageFormat::Png => png_stream(&mut self.document, bytes)?,
        };
        let id = self.document.add_object(stream);
        self.image_count += 1;
        Ok(PdfImage {
            id,
            name: format!("OvlIm{}", self.image_count),
        })
    }

    fn draw_image(&mut self, page: u32, image: &PdfImage, rect: DocumentRect) -> Result<(), EditorError> {
        let overlay = self.overlay(page)?;
        overlay.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(rect.width),
                    real(0.0),
                    real(0.0),
                    real(rect.height),
                    real(rect.x),
                    real(rect.y),
                ],
            ),
            Operation::new("Do", vec![Object::Name(image.name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        overlay.images.push(image.clone());
        Ok(())
    }

    fn serialize(mut self) -> Result<Vec<u8>, EditorError> {
        let overlays = std::mem::take(&mut self.overlays);
        for (page, overlay) in overlays {
            self.flush_page(page, overlay)?;
        }

        let mut output = Vec::new();
        self.document
            .save_to(&mut output)
            .map_err(|e| EditorError::OperationError(e.to_string()))?;
        Ok(output)
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Content operations for a text box: optional white background, then one
/// `Tj` per line starting from the top of the box
fn text_operations(draw: &TextDraw<'_>) -> Vec<Operation> {
    let rect = draw.rect;
    let layout = draw.layout;
    let leading = draw.font_size + layout.line_spacing;
    let mut ops = Vec::new();

    if draw.opaque {
        ops.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![real(1.0), real(1.0), real(1.0)]),
            Operation::new(
                "re",
                vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    let (r, g, b) = draw.color;
    let baseline = rect.y + rect.height
        - layout.padding_y / 2.0
        - layout.line_spacing / 2.0
        - draw.font_size * ASCENT;

    ops.extend([
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                real(draw.font_size),
            ],
        ),
        Operation::new(
            "rg",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ),
        Operation::new("TL", vec![real(leading)]),
        Operation::new(
            "Td",
            vec![real(rect.x + layout.padding_x / 2.0), real(baseline)],
        ),
    ]);

    for (i, line) in draw.text.split('\n').enumerate() {
        if i > 0 {
            ops.push(Operation::new("T*", vec![]));
        }
        let line = line.trim_end_matches('\r');
        if !line.is_empty() {
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(win_ansi(line), StringFormat::Literal)],
            ));
        }
    }
    ops.push(Operation::new("ET", vec![]));
    ops
}

/// Encode text for the standard Helvetica font with WinAnsiEncoding.
/// Characters outside the encoding become '?'.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            '\t' => b' ',
            _ => b'?',
        })
        .collect()
}

/// JPEG data is embedded as-is with DCTDecode. The stream must decode as
/// an 8-bit image first; anything else is rejected rather than embedded
/// under a header that misdescribes it.
fn jpeg_stream(bytes: &[u8]) -> Result<Stream, EditorError> {
    let decode_err = |e: image::ImageError| EditorError::ImageDecode(e.to_string());

    let decoder = JpegDecoder::new(Cursor::new(bytes)).map_err(decode_err)?;
    let (width, height) = decoder.dimensions();
    let color_space = match decoder.original_color_type() {
        ExtendedColorType::L8 => "DeviceGray",
        ExtendedColorType::Rgb8 => "DeviceRGB",
        ExtendedColorType::Cmyk8 => "DeviceCMYK",
        other => {
            return Err(EditorError::ImageDecode(format!(
                "unsupported JPEG sample format {other:?}"
            )))
        }
    };
    DynamicImage::from_decoder(decoder).map_err(decode_err)?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes.to_vec(),
    ))
}

/// PNG data is decoded to 8-bit samples and re-compressed with FlateDecode.
/// Alpha goes to a separate soft mask.
fn png_stream(document: &mut Document, bytes: &[u8]) -> Result<Stream, EditorError> {
    let decode_err = |e: png::DecodingError| EditorError::ImageDecode(e.to_string());

    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(decode_err)?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buffer).map_err(decode_err)?;
    let pixels = &buffer[..info.buffer_size()];

    let (channels, has_alpha, color_space) = match info.color_type {
        png::ColorType::Grayscale => (1, false, "DeviceGray"),
        png::ColorType::GrayscaleAlpha => (2, true, "DeviceGray"),
        png::ColorType::Rgb => (3, false, "DeviceRGB"),
        png::ColorType::Rgba => (4, true, "DeviceRGB"),
        png::ColorType::Indexed => {
            return Err(EditorError::ImageDecode(
                "indexed PNG was not expanded".to_string(),
            ))
        }
    };

    let (color, alpha) = if has_alpha {
        let color_channels = channels - 1;
        let mut color = Vec::with_capacity(pixels.len() / channels * color_channels);
        let mut alpha = Vec::with_capacity(pixels.len() / channels);
        for pixel in pixels.chunks_exact(channels) {
            color.extend_from_slice(&pixel[..color_channels]);
            alpha.push(pixel[color_channels]);
        }
        (color, Some(alpha))
    } else {
        (pixels.to_vec(), None)
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => info.width as i64,
        "Height" => info.height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if let Some(alpha) = alpha {
        let mask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => info.width as i64,
                "Height" => info.height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(&alpha)?,
        );
        let mask_id = document.add_object(mask);
        dict.set("SMask", Object::Reference(mask_id));
    }

    Ok(Stream::new(dict, deflate(&color)?))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, EditorError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| EditorError::OperationError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| EditorError::OperationError(e.to_string()))
}

/// The page's resource dictionary as an owned copy, including values
/// inherited from the page tree. The copy is written back inline so other
/// pages sharing the same resources are not touched.
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc.get_object(page_id).and_then(Object::as_dict).ok();
    for _ in 0..32 {
        let Some(dict) = current else { break };
        if let Ok(resources) = dict.get(b"Resources") {
            if let Some(resources) = resolve_dict(doc, resources) {
                return resources;
            }
        }
        current = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_object(id))
            .and_then(Object::as_dict)
            .ok();
    }
    Dictionary::new()
}

fn sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_else(Dictionary::new)
}

fn resolve_dict(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .ok()
            .cloned(),
        _ => None,
    }
}

/// Existing content stream references of a page, flattened into a list
fn existing_contents(doc: &Document, page_id: ObjectId) -> Vec<Object> {
    let Ok(page) = doc.get_object(page_id).and_then(Object::as_dict) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

//! Source document loading and page metadata
//!
//! Rendering pages to pixels is done by the host (PDF.js in the browser).
//! The engine only needs each page's native size, which it gets through the
//! [`PageRasterizer`] interface. [`MediaBoxRasterizer`] provides that size
//! straight from the page tree when no renderer is around.

use crate::error::EditorError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

/// A parsed input PDF. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    bytes: Vec<u8>,
    document: Document,
    /// Page object ids in page order
    pages: Vec<ObjectId>,
}

impl SourceDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, EditorError> {
        let document =
            Document::load_mem(bytes).map_err(|e| EditorError::CorruptDocument(e.to_string()))?;
        // get_pages is keyed by 1-based page number, already in order
        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        if pages.is_empty() {
            return Err(EditorError::CorruptDocument(
                "document has no pages".to_string(),
            ));
        }
        tracing::info!(pages = pages.len(), bytes = bytes.len(), "document loaded");
        Ok(Self {
            bytes: bytes.to_vec(),
            document,
            pages,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Object id of the zero-based `page`
    pub fn page_id(&self, page: u32) -> Result<ObjectId, EditorError> {
        self.pages
            .get(page as usize)
            .copied()
            .ok_or(EditorError::InvalidPage {
                page,
                page_count: self.page_count(),
            })
    }
}

/// Page size in document points, as the page is displayed.
///
/// `offset_x`/`offset_y` are the lower-left corner of the MediaBox, usually 0.
/// `rotation` is the page's clockwise `/Rotate` (0, 90, 180 or 270); for 90
/// and 270 `width` and `height` are the MediaBox sides swapped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default)]
    pub rotation: u16,
}

impl PageSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            offset_x: 0.0,
            offset_y: 0.0,
            rotation: 0,
        }
    }

    /// Matrix `[a b c d e f]` taking upright page space (origin at the
    /// lower-left corner of the page as displayed) to PDF user space.
    pub fn user_space_matrix(&self) -> [f64; 6] {
        let (ox, oy) = (self.offset_x, self.offset_y);
        match self.rotation {
            90 => [0.0, 1.0, -1.0, 0.0, self.height + ox, oy],
            180 => [-1.0, 0.0, 0.0, -1.0, self.width + ox, self.height + oy],
            270 => [0.0, -1.0, 1.0, 0.0, ox, self.width + oy],
            _ => [1.0, 0.0, 0.0, 1.0, ox, oy],
        }
    }
}

/// Output of [`PageRasterizer::render_page`]
#[derive(Debug, Clone)]
pub struct RenderedPage<I> {
    pub image: I,
    pub size: PageSize,
}

/// Produces a displayable page image plus the page's native size
pub trait PageRasterizer {
    type Image;

    fn render_page(
        &self,
        document: &SourceDocument,
        page: u32,
        scale: f64,
    ) -> Result<RenderedPage<Self::Image>, EditorError>;
}

/// Metadata-only rasterizer: reads the MediaBox and produces no image
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaBoxRasterizer;

impl PageRasterizer for MediaBoxRasterizer {
    type Image = ();

    fn render_page(
        &self,
        document: &SourceDocument,
        page: u32,
        _scale: f64,
    ) -> Result<RenderedPage<()>, EditorError> {
        let page_id = document.page_id(page)?;
        let doc = document.document();
        let page_dict = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| EditorError::CorruptDocument(e.to_string()))?;

        let [x1, y1, x2, y2] = find_media_box(doc, page_dict).ok_or(EditorError::MissingPageSize(page))?;
        let (width, height) = ((x2 - x1).abs(), (y2 - y1).abs());
        let rotation = find_rotation(doc, page_dict);
        let (width, height) = if rotation % 180 == 90 {
            (height, width)
        } else {
            (width, height)
        };
        Ok(RenderedPage {
            image: (),
            size: PageSize {
                width,
                height,
                offset_x: x1.min(x2),
                offset_y: y1.min(y2),
                rotation,
            },
        })
    }
}

/// Look up an inheritable page attribute, walking up the page tree
fn inherited<'a>(doc: &'a Document, page_dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_dict;
    // Bounded walk so a cyclic Parent chain cannot loop forever
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent_id = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_object(parent_id).and_then(Object::as_dict).ok()?;
    }
    None
}

fn find_media_box(doc: &Document, page_dict: &Dictionary) -> Option<[f64; 4]> {
    let array = inherited(doc, page_dict, b"MediaBox")?.as_array().ok()?;
    parse_box_array(array)
}

/// Clockwise display rotation, normalized to 0, 90, 180 or 270
fn find_rotation(doc: &Document, page_dict: &Dictionary) -> u16 {
    inherited(doc, page_dict, b"Rotate")
        .and_then(|rotate| rotate.as_i64().ok())
        .map(normalize_rotation)
        .unwrap_or(0)
}

/// Rotate must be a multiple of 90; anything else is treated as upright
fn normalize_rotation(angle: i64) -> u16 {
    match angle.rem_euclid(360) {
        90 => 90,
        180 => 180,
        270 => 270,
        _ => 0,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(array: &[Object]) -> Option<[f64; 4]> {
    if array.len() != 4 {
        return None;
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return None,
        };
    }
    Some(result)
}

/// Page sizes recorded at load time, one slot per page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSizes(Vec<Option<PageSize>>);

impl PageSizes {
    pub fn new(page_count: u32) -> Self {
        Self(vec![None; page_count as usize])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, page: u32) -> Option<PageSize> {
        self.0.get(page as usize).copied().flatten()
    }

    pub fn set(&mut self, page: u32, size: PageSize) -> Result<(), EditorError> {
        let page_count = self.0.len() as u32;
        let slot = self
            .0
            .get_mut(page as usize)
            .ok_or(EditorError::InvalidPage { page, page_count })?;
        *slot = Some(size);
        Ok(())
    }

    pub fn require(&self, page: u32) -> Result<PageSize, EditorError> {
        self.get(page).ok_or(EditorError::MissingPageSize(page))
    }
}

/// Rendered pages and their sizes
#[derive(Debug)]
pub struct LoadedPages<I> {
    /// `None` where rendering failed
    pub images: Vec<Option<I>>,
    pub sizes: PageSizes,
}

/// Render every page once. A page that fails to render keeps no size, which
/// makes a later export fail instead of guessing the page height.
pub fn load_pages<R: PageRasterizer>(
    rasterizer: &R,
    document: &SourceDocument,
    scale: f64,
) -> LoadedPages<R::Image> {
    let mut sizes = PageSizes::new(document.page_count());
    let mut images = Vec::with_capacity(document.page_count() as usize);

    for page in 0..document.page_count() {
        match rasterizer.render_page(document, page, scale) {
            Ok(rendered) => {
                // Slot exists: sizes was created with the document's page count
                let _ = sizes.set(page, rendered.size);
                images.push(Some(rendered.image));
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "page failed to render");
                images.push(None);
            }
        }
    }

    LoadedPages { images, sizes }
}

//! Bake annotations into output bytes
//!
//! The composer walks pages in order and turns every annotation on a page
//! into draw calls against an [`OutputBuilder`]. Geometry is converted from
//! display pixels to upright page points here; the builder places those on
//! the page through [`PageSize::user_space_matrix`], which accounts for the
//! MediaBox origin and `/Rotate`.

use crate::annotation::{parse_hex_color, AnnotationKind, ImageFormat};
use crate::config::TextMetricsConfig;
use crate::coords::{rect_to_document, DocumentRect};
use crate::document::{PageSize, PageSizes};
use crate::error::EditorError;
use crate::store::AnnotationStore;

/// Spacing used to lay text out inside its box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayout {
    pub padding_x: f64,
    pub padding_y: f64,
    pub line_spacing: f64,
}

impl From<&TextMetricsConfig> for TextLayout {
    fn from(config: &TextMetricsConfig) -> Self {
        Self {
            padding_x: config.padding_x,
            padding_y: config.padding_y,
            line_spacing: config.line_spacing,
        }
    }
}

/// A text draw call. `rect` is the whole box in document points.
#[derive(Debug, Clone, PartialEq)]
pub struct TextDraw<'a> {
    pub text: &'a str,
    pub rect: DocumentRect,
    pub font_size: f64,
    pub color: (f32, f32, f32),
    /// Fill the box with white behind the text
    pub opaque: bool,
    pub layout: TextLayout,
}

/// Destination document the composer draws into
pub trait OutputBuilder {
    type Page: Copy;
    type Image;

    /// Prepare `page` for drawing. Rects passed for it afterwards are in
    /// upright page space of `size`.
    fn copy_page(&mut self, page: u32, size: &PageSize) -> Result<Self::Page, EditorError>;

    fn draw_text(&mut self, page: Self::Page, draw: &TextDraw<'_>) -> Result<(), EditorError>;

    fn embed_image(&mut self, bytes: &[u8], format: ImageFormat) -> Result<Self::Image, EditorError>;

    fn draw_image(
        &mut self,
        page: Self::Page,
        image: &Self::Image,
        rect: DocumentRect,
    ) -> Result<(), EditorError>;

    fn serialize(self) -> Result<Vec<u8>, EditorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComposeOptions {
    /// Draw text without a background fill
    pub transparent_text: bool,
}

pub struct Composer<'a> {
    sizes: &'a PageSizes,
    layout: TextLayout,
    options: ComposeOptions,
}

impl<'a> Composer<'a> {
    pub fn new(sizes: &'a PageSizes, text_metrics: &TextMetricsConfig, options: ComposeOptions) -> Self {
        Self {
            sizes,
            layout: TextLayout::from(text_metrics),
            options,
        }
    }

    /// Draw every annotation of `store` into `builder` and serialize it.
    ///
    /// Any unsupported image or missing page size aborts the whole export.
    /// The store is only read.
    pub fn compose<B: OutputBuilder>(
        &self,
        store: &AnnotationStore,
        mut builder: B,
    ) -> Result<Vec<u8>, EditorError> {
        for page in 0..store.page_count() {
            let size = self.sizes.require(page)?;
            let handle = builder.copy_page(page, &size)?;
            self.compose_page(store, page, size, handle, &mut builder)?;
        }
        builder.serialize()
    }

    fn compose_page<B: OutputBuilder>(
        &self,
        store: &AnnotationStore,
        page: u32,
        size: PageSize,
        handle: B::Page,
        builder: &mut B,
    ) -> Result<(), EditorError> {
        for annotation in store.list_for_page(page) {
            let rect = rect_to_document(&annotation.rect, size.height);

            match &annotation.kind {
                AnnotationKind::Text(text) => {
                    let draw = TextDraw {
                        text: &text.text,
                        rect,
                        font_size: text.font_size,
                        color: parse_hex_color(&text.color),
                        opaque: !self.options.transparent_text,
                        layout: self.layout,
                    };
                    builder.draw_text(handle, &draw)?;
                }
                AnnotationKind::Image(image) => {
                    let format = ImageFormat::from_mime(&image.mime_type)?;
                    let resource = builder.embed_image(&image.source_bytes, format)?;
                    builder.draw_image(handle, &resource, rect)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationDraft;
    use crate::coords::DisplayRect;
    use pretty_assertions::assert_eq;

    /// Records draw calls instead of producing a PDF
    #[derive(Default)]
    struct RecordingBuilder {
        calls: Vec<String>,
    }

    impl OutputBuilder for RecordingBuilder {
        type Page = u32;
        type Image = ImageFormat;

        fn copy_page(&mut self, page: u32, size: &PageSize) -> Result<u32, EditorError> {
            let matrix = size.user_space_matrix();
            if matrix == PageSize::new(size.width, size.height).user_space_matrix() {
                self.calls.push(format!("page {page}"));
            } else {
                self.calls.push(format!("page {page} cm={matrix:?}"));
            }
            Ok(page)
        }

        fn draw_text(&mut self, page: u32, draw: &TextDraw<'_>) -> Result<(), EditorError> {
            self.calls.push(format!(
                "text {page} {:?} x={} y={} size={} opaque={}",
                draw.text, draw.rect.x, draw.rect.y, draw.font_size, draw.opaque
            ));
            Ok(())
        }

        fn embed_image(&mut self, _bytes: &[u8], format: ImageFormat) -> Result<ImageFormat, EditorError> {
            self.calls.push(format!("embed {format:?}"));
            Ok(format)
        }

        fn draw_image(
            &mut self,
            page: u32,
            image: &ImageFormat,
            rect: DocumentRect,
        ) -> Result<(), EditorError> {
            self.calls.push(format!(
                "image {page} {image:?} x={} y={} w={} h={}",
                rect.x, rect.y, rect.width, rect.height
            ));
            Ok(())
        }

        fn serialize(self) -> Result<Vec<u8>, EditorError> {
            Ok(self.calls.join("\n").into_bytes())
        }
    }

    fn compose(store: &AnnotationStore, sizes: &PageSizes, options: ComposeOptions) -> Result<String, EditorError> {
        let composer = Composer::new(sizes, &TextMetricsConfig::default(), options);
        composer
            .compose(store, RecordingBuilder::default())
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    fn sizes(pages: &[(f64, f64)]) -> PageSizes {
        let mut sizes = PageSizes::new(pages.len() as u32);
        for (i, (w, h)) in pages.iter().enumerate() {
            sizes.set(i as u32, PageSize::new(*w, *h)).unwrap();
        }
        sizes
    }

    #[test]
    fn test_text_y_is_flipped_and_offset_by_height() {
        let mut store = AnnotationStore::new(1);
        store
            .add(
                0,
                AnnotationDraft::text(DisplayRect::new(100.0, 100.0, 200.0, 50.0), "Hello", 12.0, "#000000"),
            )
            .unwrap();
        let out = compose(&store, &sizes(&[(600.0, 1000.0)]), ComposeOptions::default()).unwrap();
        assert_eq!(
            out,
            "page 0\ntext 0 \"Hello\" x=100 y=850 size=12 opaque=true"
        );
    }

    #[test]
    fn test_transparent_mode() {
        let mut store = AnnotationStore::new(1);
        store
            .add(
                0,
                AnnotationDraft::text(DisplayRect::new(0.0, 0.0, 100.0, 30.0), "t", 12.0, "#000000"),
            )
            .unwrap();
        let out = compose(
            &store,
            &sizes(&[(100.0, 100.0)]),
            ComposeOptions {
                transparent_text: true,
            },
        )
        .unwrap();
        assert!(out.contains("opaque=false"));
    }

    #[test]
    fn test_images_embed_with_matching_codec() {
        let mut store = AnnotationStore::new(1);
        let rect = DisplayRect::new(10.0, 20.0, 30.0, 40.0);
        store
            .add(0, AnnotationDraft::image(rect, vec![1], "image/jpeg"))
            .unwrap();
        store
            .add(0, AnnotationDraft::image(rect, vec![2], "image/png"))
            .unwrap();
        let out = compose(&store, &sizes(&[(200.0, 200.0)]), ComposeOptions::default()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "page 0",
                "embed Jpeg",
                "image 0 Jpeg x=10 y=140 w=30 h=40",
                "embed Png",
                "image 0 Png x=10 y=140 w=30 h=40",
            ]
        );
    }

    #[test]
    fn test_images_embed_with_matching_codec_in_any_order() {
        let mut store = AnnotationStore::new(1);
        let rect = DisplayRect::new(10.0, 20.0, 30.0, 40.0);
        store
            .add(0, AnnotationDraft::image(rect, vec![2], "image/png"))
            .unwrap();
        store
            .add(0, AnnotationDraft::image(rect, vec![1], "image/jpg"))
            .unwrap();
        store
            .add(0, AnnotationDraft::image(rect, vec![3], "image/png"))
            .unwrap();
        let out = compose(&store, &sizes(&[(200.0, 200.0)]), ComposeOptions::default()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "page 0",
                "embed Png",
                "image 0 Png x=10 y=140 w=30 h=40",
                "embed Jpeg",
                "image 0 Jpeg x=10 y=140 w=30 h=40",
                "embed Png",
                "image 0 Png x=10 y=140 w=30 h=40",
            ]
        );
    }

    #[test]
    fn test_unsupported_image_aborts_export() {
        let mut store = AnnotationStore::new(1);
        store
            .add(
                0,
                AnnotationDraft::text(DisplayRect::new(0.0, 0.0, 100.0, 30.0), "ok", 12.0, "#000000"),
            )
            .unwrap();
        store
            .add(
                0,
                AnnotationDraft::image(DisplayRect::new(0.0, 0.0, 10.0, 10.0), vec![], "image/gif"),
            )
            .unwrap();
        let result = compose(&store, &sizes(&[(100.0, 100.0)]), ComposeOptions::default());
        assert_eq!(
            result,
            Err(EditorError::UnsupportedImageFormat("image/gif".to_string()))
        );
    }

    #[test]
    fn test_missing_page_size_aborts_export() {
        let store = AnnotationStore::new(2);
        let mut partial = PageSizes::new(2);
        partial.set(0, PageSize::new(100.0, 100.0)).unwrap();
        let result = compose(&store, &partial, ComposeOptions::default());
        assert_eq!(result, Err(EditorError::MissingPageSize(1)));
    }

    #[test]
    fn test_pages_use_their_own_height() {
        let mut store = AnnotationStore::new(2);
        let rect = DisplayRect::new(0.0, 100.0, 100.0, 50.0);
        store
            .add(0, AnnotationDraft::text(rect, "a", 12.0, "#000000"))
            .unwrap();
        store
            .add(1, AnnotationDraft::text(rect, "b", 12.0, "#000000"))
            .unwrap();
        let out = compose(
            &store,
            &sizes(&[(100.0, 1000.0), (100.0, 500.0)]),
            ComposeOptions::default(),
        )
        .unwrap();
        assert!(out.contains("text 0 \"a\" x=0 y=850"));
        assert!(out.contains("text 1 \"b\" x=0 y=350"));
    }

    #[test]
    fn test_media_box_offset_goes_to_page_matrix() {
        let mut store = AnnotationStore::new(1);
        store
            .add(
                0,
                AnnotationDraft::text(DisplayRect::new(10.0, 10.0, 100.0, 30.0), "o", 12.0, "#000000"),
            )
            .unwrap();
        let mut sizes = PageSizes::new(1);
        sizes
            .set(
                0,
                PageSize {
                    width: 200.0,
                    height: 200.0,
                    offset_x: 5.0,
                    offset_y: 7.0,
                    rotation: 0,
                },
            )
            .unwrap();
        let out = compose(&store, &sizes, ComposeOptions::default()).unwrap();
        assert_eq!(
            out,
            "page 0 cm=[1.0, 0.0, 0.0, 1.0, 5.0, 7.0]\ntext 0 \"o\" x=10 y=160 size=12 opaque=true"
        );
    }

    #[test]
    fn test_rotated_page_lays_out_in_displayed_space() {
        let mut store = AnnotationStore::new(1);
        store
            .add(
                0,
                AnnotationDraft::image(DisplayRect::new(0.0, 0.0, 100.0, 50.0), vec![1], "image/png"),
            )
            .unwrap();
        let mut sizes = PageSizes::new(1);
        // 612 x 792 MediaBox shown landscape
        sizes
            .set(
                0,
                PageSize {
                    rotation: 90,
                    ..PageSize::new(792.0, 612.0)
                },
            )
            .unwrap();
        let out = compose(&store, &sizes, ComposeOptions::default()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "page 0 cm=[0.0, 1.0, -1.0, 0.0, 612.0, 0.0]",
                "embed Png",
                "image 0 Png x=0 y=562 w=100 h=50",
            ]
        );
    }
}

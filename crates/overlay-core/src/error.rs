use crate::annotation::AnnotationId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Page {page} is out of range (document has {page_count} pages)")]
    InvalidPage { page: u32, page_count: u32 },

    #[error("Annotation {0} not found")]
    NotFound(AnnotationId),

    #[error("Annotation {0} appears more than once")]
    DuplicateAnnotation(AnnotationId),

    #[error("Annotations were saved for {found} pages but the document has {expected}")]
    PageCountMismatch { expected: u32, found: u32 },

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Failed to parse PDF: {0}")]
    CorruptDocument(String),

    #[error("Page size unavailable for page {0}")]
    MissingPageSize(u32),

    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EditorError {
    /// Whether this error aborts a load/export and must be shown to the user.
    ///
    /// `InvalidPage` and `NotFound` are stale references from the UI layer and
    /// are always recovered where they occur.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EditorError::InvalidPage { .. } | EditorError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Serialization(e.to_string())
    }
}

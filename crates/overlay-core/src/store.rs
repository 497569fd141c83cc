//! Per-page annotation storage
//!
//! Annotations are kept in one vector per page. Insertion order is z-order:
//! later annotations are drawn on top and win hit tests.

use crate::annotation::{Annotation, AnnotationDraft, AnnotationId, AnnotationPatch};
use crate::error::EditorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    pages: Vec<Vec<Annotation>>,
    /// Owning page of every live annotation
    index: HashMap<AnnotationId, u32>,
    selected: Option<AnnotationId>,
}

/// Serialized form of a store, used for session snapshots
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    page_count: u32,
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    pub fn new(page_count: u32) -> Self {
        Self {
            pages: vec![Vec::new(); page_count as usize],
            index: HashMap::new(),
            selected: None,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn check_page(&self, page: u32) -> Result<(), EditorError> {
        if (page as usize) < self.pages.len() {
            Ok(())
        } else {
            Err(EditorError::InvalidPage {
                page,
                page_count: self.page_count(),
            })
        }
    }

    /// Append an annotation on top of `page` and return its new id
    pub fn add(&mut self, page: u32, draft: AnnotationDraft) -> Result<AnnotationId, EditorError> {
        self.check_page(page)?;

        let id = AnnotationId::new();
        let mut annotation = Annotation {
            id,
            page,
            rect: draft.rect,
            kind: draft.kind,
        };
        // Route the initial geometry through the same clamping as updates
        annotation.apply(&AnnotationPatch::geometry(draft.rect));

        self.pages[page as usize].push(annotation);
        self.index.insert(id, page);
        tracing::debug!(%id, page, "annotation added");
        Ok(id)
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        let page = *self.index.get(&id)?;
        self.pages[page as usize].iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        let page = *self.index.get(&id)?;
        self.pages[page as usize].iter_mut().find(|a| a.id == id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.index.contains_key(&id)
    }

    /// Merge `patch` into the annotation with `id`
    pub fn update(&mut self, id: AnnotationId, patch: &AnnotationPatch) -> Result<(), EditorError> {
        match self.get_mut(id) {
            Some(annotation) => {
                annotation.apply(patch);
                Ok(())
            }
            None => {
                tracing::warn!(%id, "update of unknown annotation ignored");
                Err(EditorError::NotFound(id))
            }
        }
    }

    /// Delete an annotation, clearing the selection if it pointed at it
    pub fn remove(&mut self, id: AnnotationId) -> Result<Annotation, EditorError> {
        let Some(page) = self.index.remove(&id) else {
            tracing::warn!(%id, "removal of unknown annotation ignored");
            return Err(EditorError::NotFound(id));
        };

        let annotations = &mut self.pages[page as usize];
        let pos = annotations
            .iter()
            .position(|a| a.id == id)
            .ok_or(EditorError::NotFound(id))?;
        let removed = annotations.remove(pos);

        if self.selected == Some(id) {
            self.selected = None;
        }
        tracing::debug!(%id, page, "annotation removed");
        Ok(removed)
    }

    /// Annotations on `page`, bottom-most first. Out-of-range pages are empty.
    pub fn list_for_page(&self, page: u32) -> &[Annotation] {
        self.pages
            .get(page as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All annotations in page order, then z-order
    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.pages.iter().flatten()
    }

    pub fn selection(&self) -> Option<AnnotationId> {
        self.selected
    }

    /// Select `id`, replacing any previous selection
    pub fn select(&mut self, id: AnnotationId) -> Result<(), EditorError> {
        if !self.contains(id) {
            return Err(EditorError::NotFound(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        let snapshot = StoreSnapshot {
            page_count: self.page_count(),
            annotations: self.iter().cloned().collect(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Restore a store from [`AnnotationStore::to_json`] output.
    ///
    /// Annotation ids are kept. An annotation that references a page outside
    /// the snapshot's page count, or reuses an id, fails the whole restore.
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let snapshot: StoreSnapshot = serde_json::from_str(json)?;
        let mut store = Self::new(snapshot.page_count);
        for annotation in snapshot.annotations {
            store.check_page(annotation.page)?;
            if store.index.insert(annotation.id, annotation.page).is_some() {
                return Err(EditorError::DuplicateAnnotation(annotation.id));
            }
            store.pages[annotation.page as usize].push(annotation);
        }
        Ok(store)
    }
}

//! Side table linking marker nodes to the annotations they render.
//!
//! Tree nodes never hold annotation objects; every lookup from a marker to its
//! annotation goes through this table.

use std::collections::HashMap;

use smol_str::SmolStr;

use crate::tree::NodeId;
use crate::types::Annotation;

#[derive(Debug, Default, Clone)]
pub struct Registry {
    annotations: HashMap<SmolStr, Annotation>,
    markers: HashMap<NodeId, SmolStr>,
    by_annotation: HashMap<SmolStr, Vec<NodeId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `markers` as rendering `annotation`, replacing any stored copy.
    pub fn register(&mut self, annotation: Annotation, markers: &[NodeId]) {
        let id = annotation.id.clone();
        for marker in markers {
            self.markers.insert(*marker, id.clone());
        }
        self.by_annotation
            .entry(id.clone())
            .or_default()
            .extend_from_slice(markers);
        self.annotations.insert(id, annotation);
    }

    /// Forget an annotation, returning it together with its markers.
    pub fn unregister(&mut self, id: &str) -> Option<(Annotation, Vec<NodeId>)> {
        let annotation = self.annotations.remove(id)?;
        let markers = self.by_annotation.remove(id).unwrap_or_default();
        for marker in &markers {
            self.markers.remove(marker);
        }
        Some((annotation, markers))
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.annotations.get(id)
    }

    pub fn annotation_id(&self, marker: NodeId) -> Option<&SmolStr> {
        self.markers.get(&marker)
    }

    pub fn annotation_for_marker(&self, marker: NodeId) -> Option<&Annotation> {
        self.annotation_id(marker)
            .and_then(|id| self.annotations.get(id))
    }

    pub fn is_marker(&self, node: NodeId) -> bool {
        self.markers.contains_key(&node)
    }

    /// Markers of an annotation in creation order.
    pub fn markers_of(&self, id: &str) -> &[NodeId] {
        self.by_annotation
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Move every marker and the stored annotation from `old` to `new`.
    ///
    /// Returns the updated annotation and the markers whose identity changed.
    pub fn rename(&mut self, old: &str, new: &str) -> Option<(Annotation, Vec<NodeId>)> {
        let (mut annotation, markers) = self.unregister(old)?;
        annotation.id = SmolStr::new(new);
        if let Some((_, existing)) = self.unregister(new) {
            tracing::warn!(
                target: "weaver::highlight::registry",
                old,
                new,
                "identity override merges into an existing annotation"
            );
            let mut all = existing;
            all.extend_from_slice(&markers);
            self.register(annotation.clone(), &all);
        } else {
            self.register(annotation.clone(), &markers);
        }
        Some((annotation, markers))
    }

    /// Drop everything, returning the markers that were registered per id.
    pub fn clear(&mut self) -> Vec<(SmolStr, Vec<NodeId>)> {
        self.annotations.clear();
        self.markers.clear();
        self.by_annotation.drain().collect()
    }

    /// Number of annotations with markers.
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

//! The highlighter: annotation lifecycle over one text tree.
//!
//! Owns the tree, the marker side table, the hover state and the render
//! queue. Every mutation goes through `&mut self`, so a selection is mapped,
//! wrapped and checked for duplicates in one uninterrupted call.

use std::collections::HashSet;

use smol_str::SmolStr;

use crate::config::{ConfigError, HighlighterConfig};
use crate::error::{HighlightError, Result, TreeError};
use crate::format::Formatter;
use crate::offset_map::offset_of;
use crate::overlap::{enclosing_annotations, find_exact_duplicate};
use crate::range::{SubRange, decompose_offsets};
use crate::registry::Registry;
use crate::render::{self, HoverChange, HoverState, MarkerSpec};
use crate::scheduler::{self, BatchReport, BatchScheduler, RenderHandle, TickOutcome};
use crate::tree::{NodeId, TextTree};
use crate::types::{
    Annotation, RawSelection, SelectionOutcome, SelectionStub, TextPositionSelector,
};

pub struct Highlighter {
    tree: TextTree,
    root: NodeId,
    config: HighlighterConfig,
    formatter: Option<Box<dyn Formatter>>,
    registry: Registry,
    hover: HoverState,
    scheduler: BatchScheduler,
    /// Markers of the pending selection stub.
    selection: Vec<NodeId>,
}

impl Highlighter {
    /// Highlight the whole tree with a validated config.
    pub fn new(tree: TextTree, config: HighlighterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            root: tree.root(),
            scheduler: BatchScheduler::new(config.chunk_size),
            tree,
            config,
            formatter: None,
            registry: Registry::new(),
            hover: HoverState::default(),
            selection: Vec::new(),
        })
    }

    /// Highlight the whole tree with the default config.
    pub fn from_tree(tree: TextTree) -> Self {
        let config = HighlighterConfig::default();
        Self {
            root: tree.root(),
            scheduler: BatchScheduler::new(config.chunk_size),
            tree,
            config,
            formatter: None,
            registry: Registry::new(),
            hover: HoverState::default(),
            selection: Vec::new(),
        }
    }

    /// Restrict the coordinate space to the subtree under `root`.
    pub fn with_root(mut self, root: NodeId) -> Result<Self> {
        if self.tree.element(root).is_none() {
            return Err(TreeError::NotElement(root).into());
        }
        self.root = root;
        Ok(self)
    }

    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    pub fn tree(&self) -> &TextTree {
        &self.tree
    }

    /// Mutable tree access. Editing text under the root while annotations
    /// are rendered shifts their offsets; clear or re-render afterwards.
    pub fn tree_mut(&mut self) -> &mut TextTree {
        &mut self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &HighlighterConfig {
        &self.config
    }

    /// Queue an annotation set for chunked rendering.
    ///
    /// Shadow annotations lose any markers they had. Any batch still in
    /// flight is cancelled. Drive the batch with [`tick`](Self::tick).
    pub fn render(&mut self, annotations: impl IntoIterator<Item = Annotation>) -> RenderHandle {
        let batch = scheduler::prepare(annotations);
        for id in &batch.shadowed {
            self.unrender(id);
        }
        self.scheduler.submit(batch.annotations)
    }

    /// Render the next chunk of the batch in flight.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(chunk) = self.scheduler.next_chunk() else {
            return TickOutcome::Idle;
        };
        for annotation in chunk {
            let id = annotation.id.clone();
            match self.render_annotation(annotation) {
                Ok(_) => self.scheduler.record_rendered(),
                Err(err) => {
                    tracing::warn!(
                        target: "weaver::highlight",
                        id = %id,
                        error = %err,
                        "skipping annotation"
                    );
                    self.scheduler.record_skipped(id);
                }
            }
        }
        self.scheduler.finish_if_drained()
    }

    /// Tick until the batch in flight is done.
    pub fn run_to_completion(&mut self) -> BatchReport {
        loop {
            match self.tick() {
                TickOutcome::Pending { .. } => continue,
                TickOutcome::Complete(report) => return report,
                TickOutcome::Idle => return BatchReport::default(),
            }
        }
    }

    /// Render one annotation now, replacing markers of `previous` and of the
    /// annotation's own id.
    ///
    /// Shadow annotations are only removed.
    pub fn add_or_update(
        &mut self,
        annotation: Annotation,
        previous: Option<&Annotation>,
    ) -> Result<Vec<NodeId>> {
        if let Some(previous) = previous {
            if previous.id != annotation.id {
                self.unrender(&previous.id);
            }
        }
        if annotation.is_shadow() {
            self.unrender(&annotation.id);
            return Ok(Vec::new());
        }
        self.render_annotation(annotation)
    }

    /// Unwrap every marker of an annotation.
    pub fn remove(&mut self, id: &str) -> Result<Annotation> {
        match self.unrender(id) {
            Some((annotation, _)) => Ok(annotation),
            None => {
                tracing::warn!(
                    target: "weaver::highlight",
                    id,
                    "remove: no markers for annotation"
                );
                Err(HighlightError::NoMatchingMarkers(SmolStr::new(id)))
            }
        }
    }

    /// Unwrap every marker, drop the pending selection and cancel rendering.
    pub fn clear(&mut self) {
        self.scheduler.cancel();
        self.clear_selection();
        let change = self.hover.clear();
        self.apply_hover(&change);
        let mut removed = 0;
        for (id, markers) in self.registry.clear() {
            let spec = MarkerSpec::annotation(&self.config, id, None);
            removed += render::unwrap(
                &mut self.tree,
                &markers,
                &spec,
                self.config.max_nesting_depth,
            );
        }
        tracing::debug!(target: "weaver::highlight", removed, "cleared all markers");
    }

    /// Markers of an annotation in document order.
    pub fn find_markers(&self, id: &str) -> Vec<NodeId> {
        let markers = self.registry.markers_of(id);
        if markers.len() <= 1 {
            return markers.to_vec();
        }
        self.tree
            .descendants(self.root)
            .into_iter()
            .filter(|node| markers.contains(node))
            .collect()
    }

    /// Distinct annotations with markers, in document order.
    pub fn annotations(&self) -> Vec<Annotation> {
        let mut seen = HashSet::new();
        self.tree
            .descendants(self.root)
            .into_iter()
            .filter_map(|node| self.registry.annotation_for_marker(node))
            .filter(|annotation| seen.insert(annotation.id.clone()))
            .cloned()
            .collect()
    }

    pub fn annotation(&self, id: &str) -> Option<&Annotation> {
        self.registry.annotation(id)
    }

    /// The annotation a marker renders.
    pub fn annotation_for_marker(&self, marker: NodeId) -> Option<&Annotation> {
        self.registry.annotation_for_marker(marker)
    }

    /// Replace an annotation's identity on its markers and in the side table.
    ///
    /// Relations held elsewhere by the application are not touched.
    pub fn override_id(&mut self, old: &str, new: &str) -> Result<Annotation> {
        let (annotation, _) = self
            .registry
            .rename(old, new)
            .ok_or_else(|| HighlightError::NoMatchingMarkers(SmolStr::new(old)))?;
        for &marker in self.registry.markers_of(new) {
            if let Some(element) = self.tree.element_mut(marker) {
                element.set_attr(&self.config.id_attribute, annotation.id.clone());
            }
        }
        self.hover.rename(old, new);
        tracing::debug!(target: "weaver::highlight", old, new, "annotation id overridden");
        Ok(annotation)
    }

    /// Turn a user selection into a stub, or find the annotation it repeats.
    ///
    /// The previous stub is dropped first. A `Create` outcome leaves the new
    /// stub highlighted with the selection class until
    /// [`clear_selection`](Self::clear_selection) or the next `select`.
    pub fn select(&mut self, selection: RawSelection) -> Result<SelectionOutcome> {
        if let Some(scope) = selection.scope {
            if !self.tree.is_inclusive_descendant(self.root, scope) {
                return Err(HighlightError::PositionOutsideRoot);
            }
        }
        if selection.is_collapsed() {
            return Err(HighlightError::EmptySelection);
        }

        // Offsets do not depend on stub markers, so map before dropping them.
        let anchor = offset_of(&self.tree, self.root, selection.anchor.node, selection.anchor.offset)?;
        let head = offset_of(&self.tree, self.root, selection.head.node, selection.head.offset)?;
        let (start, end) = (anchor.min(head), anchor.max(head));
        if start == end {
            return Err(HighlightError::EmptySelection);
        }

        self.clear_selection();
        let ranges = decompose_offsets(&self.tree, self.root, start, end)?;
        let quote = self.quote(&ranges);
        let depth = self.config.max_nesting_depth;
        let markers = render::wrap(
            &mut self.tree,
            &ranges,
            &MarkerSpec::selection(&self.config),
            depth,
        )?;

        let selector = TextPositionSelector::new(start, end);
        if let Some(existing) =
            find_exact_duplicate(&self.tree, &self.registry, selector, &markers, depth)
        {
            let spec = MarkerSpec::selection(&self.config);
            render::unwrap(&mut self.tree, &markers, &spec, depth);
            tracing::debug!(
                target: "weaver::highlight",
                id = %existing.id,
                "selection repeats an existing annotation"
            );
            return Ok(SelectionOutcome::Reuse(existing));
        }

        self.selection = markers;
        Ok(SelectionOutcome::Create(SelectionStub { selector, quote }))
    }

    /// Markers of the pending selection stub.
    pub fn selection_markers(&self) -> &[NodeId] {
        &self.selection
    }

    /// Drop the pending selection stub. Returns how many markers were removed.
    pub fn clear_selection(&mut self) -> usize {
        let markers = std::mem::take(&mut self.selection);
        render::unwrap(
            &mut self.tree,
            &markers,
            &MarkerSpec::selection(&self.config),
            self.config.max_nesting_depth,
        )
    }

    /// Annotations covering a marker, most specific first.
    pub fn annotations_at(&self, marker: NodeId) -> Vec<Annotation> {
        enclosing_annotations(
            &self.tree,
            &self.registry,
            marker,
            self.config.max_nesting_depth,
        )
    }

    /// Add the hover class to every marker of `id`.
    pub fn highlight(&mut self, id: &str) -> Result<()> {
        self.set_hover(id, true)
    }

    /// Remove the hover class from every marker of `id`.
    pub fn unhighlight(&mut self, id: &str) -> Result<()> {
        self.set_hover(id, false)
    }

    /// Pointer entered a marker. The deepest entered marker's annotation is
    /// the one highlighted.
    pub fn pointer_enter(&mut self, marker: NodeId) -> HoverChange {
        let change = self.hover.enter(&self.tree, &self.registry, marker);
        self.apply_hover(&change);
        change
    }

    pub fn pointer_leave(&mut self, marker: NodeId) -> HoverChange {
        let change = self.hover.leave(&self.tree, &self.registry, marker);
        self.apply_hover(&change);
        change
    }

    /// Annotation currently hovered through pointer events.
    pub fn hovered(&self) -> Option<&SmolStr> {
        self.hover.active()
    }

    fn set_hover(&mut self, id: &str, on: bool) -> Result<()> {
        let markers = self.registry.markers_of(id);
        if markers.is_empty() {
            tracing::warn!(target: "weaver::highlight", id, "hover: no markers for annotation");
            return Err(HighlightError::NoMatchingMarkers(SmolStr::new(id)));
        }
        render::set_hover(&mut self.tree, markers, &self.config.hover_class, on);
        Ok(())
    }

    fn apply_hover(&mut self, change: &HoverChange) {
        if let Some(id) = &change.unhighlight {
            render::set_hover(
                &mut self.tree,
                self.registry.markers_of(id),
                &self.config.hover_class,
                false,
            );
        }
        if let Some(id) = &change.highlight {
            render::set_hover(
                &mut self.tree,
                self.registry.markers_of(id),
                &self.config.hover_class,
                true,
            );
        }
    }

    fn render_annotation(&mut self, annotation: Annotation) -> Result<Vec<NodeId>> {
        let Some(selector) = annotation.selector else {
            return Err(HighlightError::RenderFailure {
                id: annotation.id,
                reason: SmolStr::new_static("annotation has no position selector"),
            });
        };
        self.unrender(&annotation.id);

        let ranges = decompose_offsets(&self.tree, self.root, selector.start, selector.end)?;
        if ranges.is_empty() {
            return Err(HighlightError::RenderFailure {
                id: annotation.id,
                reason: SmolStr::new_static("span covers no text"),
            });
        }

        let formatted = self
            .formatter
            .as_ref()
            .and_then(|formatter| formatter.format(&annotation));
        let spec = MarkerSpec::annotation(&self.config, annotation.id.clone(), formatted);
        let markers = render::wrap(
            &mut self.tree,
            &ranges,
            &spec,
            self.config.max_nesting_depth,
        )?;

        if self.hover.active() == Some(&annotation.id) {
            render::set_hover(&mut self.tree, &markers, &self.config.hover_class, true);
        }
        tracing::trace!(
            target: "weaver::highlight",
            id = %annotation.id,
            markers = markers.len(),
            "rendered annotation"
        );
        self.registry.register(annotation, &markers);
        Ok(markers)
    }

    /// Unwrap and forget an annotation's markers, if it has any.
    fn unrender(&mut self, id: &str) -> Option<(Annotation, Vec<NodeId>)> {
        let (annotation, markers) = self.registry.unregister(id)?;
        let change = self.hover.forget(&self.tree, &self.registry, &markers);
        self.apply_hover(&change);
        let spec = MarkerSpec::annotation(&self.config, annotation.id.clone(), None);
        render::unwrap(
            &mut self.tree,
            &markers,
            &spec,
            self.config.max_nesting_depth,
        );
        Some((annotation, markers))
    }

    fn quote(&self, ranges: &[SubRange]) -> String {
        ranges
            .iter()
            .filter_map(|range| {
                self.tree
                    .text(range.leaf)
                    .map(|text| text.chars().skip(range.start).take(range.len()))
            })
            .flatten()
            .collect()
    }
}

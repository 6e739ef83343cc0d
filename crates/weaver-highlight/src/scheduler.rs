//! Chunked batch rendering driven by an external tick source.
//!
//! The scheduler owns only the queue. The highlighter pulls one chunk per
//! [`tick`](crate::Highlighter::tick), renders it, records the outcome here,
//! and the completion signal fires once the queue is drained.

use std::collections::VecDeque;

use smol_str::SmolStr;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{HighlightError, Result};
use crate::types::Annotation;

/// Outcome of a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Annotations that produced markers.
    pub rendered: usize,
    /// Ids that failed to render and were skipped.
    pub skipped: Vec<SmolStr>,
}

/// Result of processing one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No batch in flight.
    Idle,
    /// Chunks remain for later ticks.
    Pending { remaining: usize },
    /// The last chunk just ran.
    Complete(BatchReport),
}

/// Annotations split into those to render and shadow ids to clear.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub annotations: Vec<Annotation>,
    pub shadowed: Vec<SmolStr>,
}

/// Filter and order an annotation set for rendering.
///
/// Annotations without a selector are dropped, shadow annotations are set
/// aside, and the rest is sorted by descending start. Equal starts put the
/// longer span first so enclosing markers exist before enclosed ones.
pub fn prepare(annotations: impl IntoIterator<Item = Annotation>) -> PreparedBatch {
    let mut batch = PreparedBatch::default();
    for annotation in annotations {
        if annotation.is_shadow() {
            batch.shadowed.push(annotation.id);
        } else if annotation.selector.is_some() {
            batch.annotations.push(annotation);
        } else {
            tracing::debug!(
                target: "weaver::highlight::scheduler",
                id = %annotation.id,
                "dropping annotation without a position selector"
            );
        }
    }
    batch
        .annotations
        .sort_by(|a, b| b.start().cmp(&a.start()).then(b.end().cmp(&a.end())));
    batch
}

struct RenderBatch {
    chunks: VecDeque<Vec<Annotation>>,
    report: BatchReport,
    done: oneshot::Sender<Result<BatchReport>>,
}

/// Queue of pending chunks for the in-flight batch.
pub struct BatchScheduler {
    chunk_size: usize,
    current: Option<RenderBatch>,
}

impl BatchScheduler {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            current: None,
        }
    }

    /// Queue a sorted annotation list, replacing any batch in flight.
    pub fn submit(&mut self, annotations: Vec<Annotation>) -> RenderHandle {
        self.cancel();

        let (done, rx) = oneshot::channel();
        let total = annotations.len();
        let mut chunks = VecDeque::with_capacity(total.div_ceil(self.chunk_size));
        let mut annotations = annotations.into_iter().peekable();
        while annotations.peek().is_some() {
            chunks.push_back(annotations.by_ref().take(self.chunk_size).collect());
        }

        tracing::debug!(
            target: "weaver::highlight::scheduler",
            annotations = total,
            chunks = chunks.len(),
            "batch submitted"
        );

        if chunks.is_empty() {
            let _ = done.send(Ok(BatchReport::default()));
        } else {
            self.current = Some(RenderBatch {
                chunks,
                report: BatchReport::default(),
                done,
            });
        }
        RenderHandle { rx }
    }

    /// Take the next chunk of the batch in flight.
    pub fn next_chunk(&mut self) -> Option<Vec<Annotation>> {
        self.current.as_mut()?.chunks.pop_front()
    }

    pub fn record_rendered(&mut self) {
        if let Some(batch) = &mut self.current {
            batch.report.rendered += 1;
        }
    }

    pub fn record_skipped(&mut self, id: SmolStr) {
        if let Some(batch) = &mut self.current {
            batch.report.skipped.push(id);
        }
    }

    /// Fire the completion signal if no chunks remain.
    pub fn finish_if_drained(&mut self) -> TickOutcome {
        let Some(batch) = &self.current else {
            return TickOutcome::Idle;
        };
        if !batch.chunks.is_empty() {
            return TickOutcome::Pending {
                remaining: batch.chunks.len(),
            };
        }
        let Some(batch) = self.current.take() else {
            return TickOutcome::Idle;
        };
        tracing::debug!(
            target: "weaver::highlight::scheduler",
            rendered = batch.report.rendered,
            skipped = batch.report.skipped.len(),
            "batch complete"
        );
        let _ = batch.done.send(Ok(batch.report.clone()));
        TickOutcome::Complete(batch.report)
    }

    /// Drop the batch in flight; its handle resolves to `RenderCancelled`.
    pub fn cancel(&mut self) {
        if let Some(batch) = self.current.take() {
            tracing::debug!(
                target: "weaver::highlight::scheduler",
                remaining = batch.chunks.len(),
                "batch cancelled"
            );
            let _ = batch.done.send(Err(HighlightError::RenderCancelled));
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn pending_chunks(&self) -> usize {
        self.current.as_ref().map_or(0, |batch| batch.chunks.len())
    }
}

/// Completion signal of a render batch.
#[derive(Debug)]
pub struct RenderHandle {
    rx: oneshot::Receiver<Result<BatchReport>>,
}

impl RenderHandle {
    /// Wait for the batch to finish.
    pub async fn finished(self) -> Result<BatchReport> {
        self.rx
            .await
            .unwrap_or(Err(HighlightError::RenderCancelled))
    }

    /// Poll for the report without waiting. `None` while chunks remain.
    pub fn try_report(&mut self) -> Option<Result<BatchReport>> {
        match self.rx.try_recv() {
            Ok(report) => Some(report),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(HighlightError::RenderCancelled)),
        }
    }
}

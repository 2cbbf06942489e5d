//! Erase history: a LIFO stack of committed strokes plus a redo buffer.

use std::sync::Arc;

use crate::stroke::MaskStroke;

/// Committed strokes in paint order.
///
/// Strokes are shared behind `Arc` so export snapshots are cheap and never
/// see later mutations.
#[derive(Debug, Clone, Default)]
pub struct EraseHistory {
    strokes: Vec<Arc<MaskStroke>>,
    redo: Vec<Arc<MaskStroke>>,
}

impl EraseHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a stroke. Discards anything that could have been redone.
    pub fn push(&mut self, stroke: MaskStroke) -> Arc<MaskStroke> {
        let stroke = Arc::new(stroke);
        self.strokes.push(Arc::clone(&stroke));
        self.redo.clear();
        stroke
    }

    /// Pop the newest stroke onto the redo buffer.
    pub fn undo(&mut self) -> Option<Arc<MaskStroke>> {
        let stroke = self.strokes.pop()?;
        self.redo.push(Arc::clone(&stroke));
        Some(stroke)
    }

    /// Re-apply the most recently undone stroke.
    pub fn redo(&mut self) -> Option<Arc<MaskStroke>> {
        let stroke = self.redo.pop()?;
        self.strokes.push(Arc::clone(&stroke));
        Some(stroke)
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.redo.clear();
    }

    pub fn strokes(&self) -> &[Arc<MaskStroke>] {
        &self.strokes
    }

    /// Cheap copy of the committed strokes.
    pub fn snapshot(&self) -> Vec<Arc<MaskStroke>> {
        self.strokes.clone()
    }

    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.strokes.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

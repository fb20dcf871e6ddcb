//! Phase layout and drag-and-drop reordering of the middle phases.
//!
//! A project's `phase_order` is always `leading ++ permutation(middle) ++
//! trailing`. Only the middle segment is user-reorderable.

use std::collections::HashMap;

use crate::types::PhaseId;

// ---------------------------------------------------------------------------
// Default phases
// ---------------------------------------------------------------------------

pub const PHASE_INTENT: &str = "intent";
pub const PHASE_RESEARCH: &str = "research";
pub const PHASE_DESIGN_INNER: &str = "design_inner";
pub const PHASE_PRODUCE_INNER: &str = "produce_inner";
pub const PHASE_DESIGN_OUTER: &str = "design_outer";
pub const PHASE_PRODUCE_OUTER: &str = "produce_outer";
pub const PHASE_SIMULATE: &str = "simulate";
pub const PHASE_EVALUATE: &str = "evaluate";

// ---------------------------------------------------------------------------
// PhaseLayout
// ---------------------------------------------------------------------------

/// Partition of phase ids into fixed and reorderable segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseLayout {
    pub leading: Vec<PhaseId>,
    pub middle: Vec<PhaseId>,
    pub trailing: Vec<PhaseId>,
}

impl Default for PhaseLayout {
    fn default() -> Self {
        let ids = |xs: &[&str]| -> Vec<PhaseId> { xs.iter().map(|s| s.to_string()).collect() };
        Self {
            leading: ids(&[PHASE_INTENT, PHASE_RESEARCH]),
            middle: ids(&[
                PHASE_DESIGN_INNER,
                PHASE_PRODUCE_INNER,
                PHASE_DESIGN_OUTER,
                PHASE_PRODUCE_OUTER,
            ]),
            trailing: ids(&[PHASE_SIMULATE, PHASE_EVALUATE]),
        }
    }
}

impl PhaseLayout {
    pub fn new(leading: Vec<PhaseId>, middle: Vec<PhaseId>, trailing: Vec<PhaseId>) -> Self {
        Self {
            leading,
            middle,
            trailing,
        }
    }

    /// Default full order: leading, middle, trailing.
    pub fn default_order(&self) -> Vec<PhaseId> {
        self.leading
            .iter()
            .chain(&self.middle)
            .chain(&self.trailing)
            .cloned()
            .collect()
    }

    /// Whether `phase` belongs to a fixed segment and cannot be dragged.
    pub fn is_fixed(&self, phase: &str) -> bool {
        self.leading.iter().chain(&self.trailing).any(|p| p == phase)
    }

    /// Middle phases of `order`, in their current order.
    pub fn middle_of(&self, order: &[PhaseId]) -> Vec<PhaseId> {
        order
            .iter()
            .filter(|p| self.middle.contains(p))
            .cloned()
            .collect()
    }

    /// Rebuild the full order around `new_middle`.
    ///
    /// Returns `None` (a no-op) unless `new_middle` is a permutation of the
    /// middle phases currently present in `current_order`.
    pub fn reorder(&self, current_order: &[PhaseId], new_middle: &[PhaseId]) -> Option<Vec<PhaseId>> {
        let current_middle = self.middle_of(current_order);
        if !same_multiset(&current_middle, new_middle) {
            return None;
        }
        Some(
            self.leading
                .iter()
                .chain(new_middle)
                .chain(&self.trailing)
                .cloned()
                .collect(),
        )
    }
}

fn same_multiset(a: &[PhaseId], b: &[PhaseId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&str, i32> = HashMap::new();
    for p in a {
        *counts.entry(p.as_str()).or_default() += 1;
    }
    for p in b {
        *counts.entry(p.as_str()).or_default() -= 1;
    }
    counts.values().all(|c| *c == 0)
}

// ---------------------------------------------------------------------------
// Drag and drop
// ---------------------------------------------------------------------------

/// Transient drag state for reordering the middle phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DragState {
    pub dragged: Option<PhaseId>,
    pub over: Option<PhaseId>,
}

impl DragState {
    /// Begin dragging `phase`. Fixed phases are ignored.
    pub fn drag_start(&mut self, layout: &PhaseLayout, phase: &str) -> bool {
        if layout.is_fixed(phase) {
            return false;
        }
        self.dragged = Some(phase.to_string());
        self.over = None;
        true
    }

    /// Hover over `phase`. Fixed phases never become drop targets.
    pub fn drag_over(&mut self, layout: &PhaseLayout, phase: &str) {
        if self.dragged.is_some() && !layout.is_fixed(phase) {
            self.over = Some(phase.to_string());
        }
    }

    /// Drop the dragged phase onto `target`, returning the new full order.
    ///
    /// The dragged id is spliced out of the middle segment and reinserted at
    /// the target's index. State is cleared either way.
    pub fn drop_on(
        &mut self,
        layout: &PhaseLayout,
        current_order: &[PhaseId],
        target: &str,
    ) -> Option<Vec<PhaseId>> {
        let dragged = self.dragged.take();
        self.over = None;
        let dragged = dragged?;
        if dragged == target || layout.is_fixed(target) {
            return None;
        }

        let mut middle = layout.middle_of(current_order);
        let from = middle.iter().position(|p| *p == dragged)?;
        let to = middle.iter().position(|p| p == target)?;
        let moved = middle.remove(from);
        middle.insert(to, moved);
        layout.reorder(current_order, &middle)
    }

    pub fn drag_end(&mut self) {
        self.dragged = None;
        self.over = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragged.is_some()
    }
}

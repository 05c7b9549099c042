use std::collections::VecDeque;

use serde::Serialize;

use crate::canvas::{Cell, CanvasState};
use crate::selection::SelectionBounds;

/// Fixed history capacity.
pub const MAX_HISTORY: usize = 50;

// ============================================================================
// SNAPSHOT - full grid + selection + base offset
// ============================================================================

/// One committed editor state.
///
/// Cells are shared palette handles, so capturing a snapshot copies pointers
/// rather than color data.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    pub base_offset_x: f32,
    pub base_offset_y: f32,
    pub grid: Vec<Cell>,
    pub selection_mask: Option<Vec<bool>>,
    pub selection_width: u32,
    pub selection_height: u32,
    /// Canonical byte form used for equality. `None` never compares equal.
    key: Option<Vec<u8>>,
}

#[derive(Serialize)]
struct CanonicalState<'a> {
    width: u32,
    height: u32,
    base_offset_x: f32,
    base_offset_y: f32,
    grid: Vec<Option<&'a str>>,
    selection_active: bool,
    selection_mask: Option<&'a [bool]>,
    selection_bounds: Option<SelectionBounds>,
}

impl Snapshot {
    pub fn capture(state: &CanvasState) -> Self {
        let (selection_width, selection_height) = state.selection.dimensions();
        let mut snap = Self {
            width: state.width,
            height: state.height,
            base_offset_x: state.base.offset_x,
            base_offset_y: state.base.offset_y,
            grid: state.grid().to_vec(),
            selection_mask: state.selection.mask.clone(),
            selection_width,
            selection_height,
            key: None,
        };
        snap.key = snap.canonical_bytes(state.selection.active, state.selection.bounds);
        snap
    }

    fn canonical_bytes(&self, active: bool, bounds: Option<SelectionBounds>) -> Option<Vec<u8>> {
        let canonical = CanonicalState {
            width: self.width,
            height: self.height,
            base_offset_x: self.base_offset_x,
            base_offset_y: self.base_offset_y,
            grid: self.grid.iter().map(|c| c.as_ref().map(|e| e.code.as_str())).collect(),
            // An inactive selection is canonically "no mask", whatever buffer
            // happens to be allocated.
            selection_active: active,
            selection_mask: self.selection_mask.as_deref().filter(|_| active),
            selection_bounds: bounds,
        };
        match bincode::serialize(&canonical) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                crate::log_err!("history: failed to encode snapshot: {}", e);
                None
            }
        }
    }

    /// Structural equality on codes, dimensions, offsets and selection.
    pub fn same_state(&self, other: &Snapshot) -> bool {
        matches!((&self.key, &other.key), (Some(a), Some(b)) if a == b)
    }

    /// Write this snapshot back into `state` without touching history.
    ///
    /// Inconsistent snapshots are normalized: a short grid is padded with
    /// empty cells and a mismatched selection mask is remapped.
    pub fn restore_into(&self, state: &mut CanvasState) {
        let expected = (self.width as usize) * (self.height as usize);
        if self.grid.len() != expected {
            crate::log_warn!(
                "history: snapshot grid has {} cells, expected {} ({}x{}); normalizing",
                self.grid.len(),
                expected,
                self.width,
                self.height
            );
        }
        state.replace_grid(self.width, self.height, self.grid.clone());
        state.base.offset_x = if self.base_offset_x.is_finite() { self.base_offset_x } else { 0.0 };
        state.base.offset_y = if self.base_offset_y.is_finite() { self.base_offset_y } else { 0.0 };
        state.selection.restore(
            self.selection_mask.as_deref(),
            self.selection_width,
            self.selection_height,
            self.width,
            self.height,
        );
        state.refresh_sizing();
    }

    fn memory_bytes(&self) -> usize {
        self.grid.len() * std::mem::size_of::<Cell>()
            + self.selection_mask.as_ref().map_or(0, |m| m.len())
            + self.key.as_ref().map_or(0, |k| k.len())
    }
}

// ============================================================================
// HISTORY MANAGER - linear snapshot list with a cursor
// ============================================================================

pub struct HistoryManager {
    snapshots: VecDeque<Snapshot>,
    index: usize,
    max_history_size: usize,
    /// Advances on every save, undo, redo and reset.
    revision: u64,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_HISTORY)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            index: 0,
            max_history_size: max_history_size.max(1),
            revision: 0,
        }
    }

    /// Drop everything and start over from `state` as the single baseline.
    pub fn reset(&mut self, state: &CanvasState) {
        self.snapshots.clear();
        self.snapshots.push_back(Snapshot::capture(state));
        self.index = 0;
        self.bump();
    }

    /// Commit the current state. Returns `false` when it matches the snapshot
    /// under the cursor.
    pub fn save(&mut self, state: &CanvasState) -> bool {
        let snap = Snapshot::capture(state);
        if self.snapshots.get(self.index).is_some_and(|cur| cur.same_state(&snap)) {
            return false;
        }

        // Abandon redo branch
        if !self.snapshots.is_empty() {
            self.snapshots.truncate(self.index + 1);
        }
        self.snapshots.push_back(snap);

        while self.snapshots.len() > self.max_history_size {
            if let Some(evicted) = self.snapshots.pop_front() {
                crate::log_info!(
                    "history: evicted oldest snapshot ({}x{}, ~{} bytes)",
                    evicted.width,
                    evicted.height,
                    evicted.memory_bytes()
                );
            }
        }
        self.index = self.snapshots.len() - 1;
        self.bump();
        true
    }

    pub fn undo(&mut self, state: &mut CanvasState) -> bool {
        if self.index == 0 || self.snapshots.is_empty() {
            return false;
        }
        self.index -= 1;
        self.apply_current(state);
        true
    }

    pub fn redo(&mut self, state: &mut CanvasState) -> bool {
        if self.index + 1 >= self.snapshots.len() {
            return false;
        }
        self.index += 1;
        self.apply_current(state);
        true
    }

    fn apply_current(&mut self, state: &mut CanvasState) {
        if let Some(snap) = self.snapshots.get(self.index) {
            snap.restore_into(state);
        }
        self.bump();
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.get(self.index)
    }

    pub fn snapshot(&self, i: usize) -> Option<&Snapshot> {
        self.snapshots.get(i)
    }

    pub fn memory_usage(&self) -> usize {
        self.snapshots.iter().map(|s| s.memory_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::palette::PaletteEntry;
    use egui::Color32;
    use std::sync::Arc;

    fn canvas(w: u32, h: u32) -> CanvasState {
        let mut c = CanvasState::default();
        assert!(c.create(w, h, None, None));
        c
    }

    fn cell(code: &str) -> Cell {
        Some(Arc::new(PaletteEntry::new(code, Color32::RED)))
    }

    #[test]
    fn save_is_idempotent() {
        let mut c = canvas(3, 3);
        let mut h = HistoryManager::default();
        h.reset(&c);
        c.set(0, 0, cell("1"));
        assert!(h.save(&c));
        assert!(!h.save(&c));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn equality_is_by_code_not_reference() {
        let mut c = canvas(2, 2);
        let mut h = HistoryManager::default();
        c.set(1, 1, cell("7"));
        h.reset(&c);
        // Different allocation, same code.
        c.set(1, 1, cell("7"));
        assert!(!h.save(&c));
    }

    #[test]
    fn new_commit_discards_redo_branch() {
        let mut c = canvas(2, 2);
        let mut h = HistoryManager::default();
        h.reset(&c);
        c.set(0, 0, cell("a"));
        h.save(&c);
        c.set(1, 0, cell("b"));
        h.save(&c);
        assert!(h.undo(&mut c));
        c.set(0, 1, cell("c"));
        assert!(h.save(&c));
        assert_eq!(h.len(), 3);
        assert!(!h.can_redo());
        assert_eq!(c.code_at(1, 0), None);
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let mut c = canvas(8, 8);
        let mut h = HistoryManager::default();
        h.reset(&c);
        for i in 0..60u32 {
            c.set(i % 8, i / 8, cell(&format!("{i}")));
            assert!(h.save(&c));
        }
        assert_eq!(h.len(), MAX_HISTORY);
        assert_eq!(h.index(), MAX_HISTORY - 1);
        // Oldest remaining state already has cells 0..=10 painted.
        let oldest = h.snapshot(0).map(|s| s.grid.iter().filter(|c| c.is_some()).count());
        assert_eq!(oldest, Some(11));
    }

    #[test]
    fn undo_restores_selection_and_dimensions() {
        let mut c = canvas(4, 4);
        let mut h = HistoryManager::default();
        c.selection.set_rect(0, 0, 1, 1);
        h.reset(&c);
        c.selection.clear();
        assert!(h.save(&c));
        assert!(h.undo(&mut c));
        assert!(c.selection.active);
        assert!(c.selection.is_selected(1, 1));
        assert!(h.redo(&mut c));
        assert!(!c.selection.active);
        assert!(!h.redo(&mut c));
    }

    #[test]
    fn short_grid_is_normalized_on_restore() {
        let mut c = canvas(2, 2);
        let mut snap = Snapshot::capture(&c);
        snap.grid.truncate(1);
        snap.selection_mask = Some(vec![true]);
        snap.restore_into(&mut c);
        assert_eq!(c.grid().len(), 4);
        assert!(c.selection.is_selected(0, 0));
        assert!(!c.selection.is_selected(1, 1));
    }

    #[test]
    fn revision_advances_on_every_move() {
        let mut c = canvas(2, 2);
        let mut h = HistoryManager::default();
        h.reset(&c);
        let r0 = h.revision();
        c.set(0, 0, cell("x"));
        h.save(&c);
        let r1 = h.revision();
        h.undo(&mut c);
        let r2 = h.revision();
        assert!(r0 < r1 && r1 < r2);
        h.save(&c);
        assert_eq!(h.revision(), r2);
    }
}

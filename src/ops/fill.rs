// ============================================================================
// BUCKET FILL - 4-connected same-code region, selection-aware
// ============================================================================

use crate::canvas::{Cell, CanvasState, same_cell};

/// Flood the region of cells sharing the start cell's code with `fill`.
///
/// With an active selection the fill never leaves the mask, and a start
/// outside the mask does nothing. Returns how many cells changed.
pub fn bucket_fill(canvas: &mut CanvasState, start_x: u32, start_y: u32, fill: &Cell) -> usize {
    if start_x >= canvas.width || start_y >= canvas.height {
        return 0;
    }
    let constrained = canvas.selection.active;
    if constrained && !canvas.selection.is_selected(start_x, start_y) {
        return 0;
    }

    let w = canvas.width as usize;
    let h = canvas.height as usize;
    let seed_idx = start_y as usize * w + start_x as usize;
    let target: Cell = canvas.grid()[seed_idx].clone();
    if same_cell(&target, fill) {
        return 0;
    }

    let region = {
        let grid = canvas.grid();
        let selection = &canvas.selection;
        let eligible = |idx: usize| -> bool {
            if !same_cell(&grid[idx], &target) {
                return false;
            }
            !constrained || selection.is_selected((idx % w) as u32, (idx / w) as u32)
        };

        // `visited` doubles as the output region
        let mut visited = vec![false; w * h];
        let mut stack: Vec<usize> = Vec::with_capacity(256);
        visited[seed_idx] = true;
        stack.push(seed_idx);
        let mut region = Vec::new();

        while let Some(idx) = stack.pop() {
            region.push(idx);
            let x = idx % w;
            let y = idx / w;
            let mut visit = |ni: usize| {
                if !visited[ni] && eligible(ni) {
                    visited[ni] = true;
                    stack.push(ni);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < w {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < h {
                visit(idx + w);
            }
        }
        region
    };

    let mut changed = 0;
    for idx in region {
        if canvas.set((idx % w) as u32, (idx / w) as u32, fill.clone()) {
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::palette::PaletteEntry;
    use egui::Color32;
    use std::sync::Arc;

    fn cell(code: &str) -> Cell {
        Some(Arc::new(PaletteEntry::new(code, Color32::GREEN)))
    }

    fn canvas_with_wall() -> CanvasState {
        // 5x3 with a vertical wall of "W" at x = 2
        let mut c = CanvasState::default();
        c.create(5, 3, None, None);
        for y in 0..3 {
            c.set(2, y, cell("W"));
        }
        c
    }

    #[test]
    fn fill_stops_at_different_codes() {
        let mut c = canvas_with_wall();
        let n = bucket_fill(&mut c, 0, 0, &cell("R"));
        assert_eq!(n, 6);
        assert_eq!(c.code_at(1, 2), Some("R"));
        assert_eq!(c.code_at(2, 1), Some("W"));
        assert_eq!(c.code_at(3, 0), None);
    }

    #[test]
    fn diagonal_neighbours_are_not_connected() {
        let mut c = CanvasState::default();
        c.create(2, 2, None, None);
        c.set(0, 0, cell("X"));
        c.set(1, 1, cell("X"));
        assert_eq!(bucket_fill(&mut c, 0, 0, &cell("Y")), 1);
        assert_eq!(c.code_at(1, 1), Some("X"));
    }

    #[test]
    fn fill_respects_selection() {
        let mut c = canvas_with_wall();
        c.selection.set_rect(0, 0, 0, 2);
        assert_eq!(bucket_fill(&mut c, 0, 1, &cell("R")), 3);
        assert_eq!(c.code_at(1, 1), None);
        // Start outside the mask does nothing.
        assert_eq!(bucket_fill(&mut c, 4, 0, &cell("R")), 0);
    }

    #[test]
    fn same_code_fill_is_a_no_op() {
        let mut c = canvas_with_wall();
        assert_eq!(bucket_fill(&mut c, 2, 0, &cell("W")), 0);
        assert_eq!(bucket_fill(&mut c, 9, 9, &cell("R")), 0);
    }

    #[test]
    fn fill_with_empty_erases_region() {
        let mut c = canvas_with_wall();
        assert_eq!(bucket_fill(&mut c, 2, 1, &None), 3);
        assert_eq!(c.filled_count(), 0);
    }
}

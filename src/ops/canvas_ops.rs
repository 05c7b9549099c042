// ============================================================================
// CANVAS-LEVEL OPERATIONS: flips, rotations, resize, clear, selection move
// ============================================================================
//
// None of these push history themselves; callers commit afterwards so the
// usage cache and history see one change per operation.

use crate::canvas::{Cell, CanvasState, validate_canvas_size};

/// Which part of the old grid stays fixed when resizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ResizeAnchor {
    #[default]
    TopLeft,
    Top,
    TopRight,
    Left,
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl ResizeAnchor {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "top-left" | "nw" => Some(Self::TopLeft),
            "top" | "n" => Some(Self::Top),
            "top-right" | "ne" => Some(Self::TopRight),
            "left" | "w" => Some(Self::Left),
            "center" | "centre" | "c" => Some(Self::Center),
            "right" | "e" => Some(Self::Right),
            "bottom-left" | "sw" => Some(Self::BottomLeft),
            "bottom" | "s" => Some(Self::Bottom),
            "bottom-right" | "se" => Some(Self::BottomRight),
            _ => None,
        }
    }

    /// Horizontal / vertical placement: 0 = start, 1 = middle, 2 = end.
    fn placement(self) -> (u8, u8) {
        match self {
            Self::TopLeft => (0, 0),
            Self::Top => (1, 0),
            Self::TopRight => (2, 0),
            Self::Left => (0, 1),
            Self::Center => (1, 1),
            Self::Right => (2, 1),
            Self::BottomLeft => (0, 2),
            Self::Bottom => (1, 2),
            Self::BottomRight => (2, 2),
        }
    }
}

fn anchor_offset(placement: u8, old: u32, new: u32) -> i64 {
    let diff = new as i64 - old as i64;
    match placement {
        0 => 0,
        1 => diff.div_euclid(2),
        _ => diff,
    }
}

/// Rebuild grid and selection mask at `new_w × new_h`, pulling each new cell
/// from the old position `source(nx, ny)` (or leaving it empty).
fn remap(state: &mut CanvasState, new_w: u32, new_h: u32, source: impl Fn(u32, u32) -> Option<(u32, u32)>) {
    let (old_w, old_h) = (state.width, state.height);
    let old_grid = state.grid();
    let old_mask = state.selection.mask.as_ref().filter(|_| state.selection.active);

    let mut grid: Vec<Cell> = Vec::with_capacity((new_w * new_h) as usize);
    let mut mask = old_mask.map(|_| Vec::with_capacity((new_w * new_h) as usize));
    for ny in 0..new_h {
        for nx in 0..new_w {
            let src = source(nx, ny).filter(|(x, y)| *x < old_w && *y < old_h);
            let idx = src.map(|(x, y)| (y * old_w + x) as usize);
            grid.push(idx.and_then(|i| old_grid[i].clone()));
            if let (Some(mask), Some(old)) = (mask.as_mut(), old_mask) {
                mask.push(idx.is_some_and(|i| old[i]));
            }
        }
    }

    state.replace_grid(new_w, new_h, grid);
    state.selection.replace_mask(new_w, new_h, mask);
    if (new_w, new_h) != (old_w, old_h) {
        state.refresh_sizing();
    }
}

pub fn flip_horizontal(state: &mut CanvasState) {
    let (w, h) = (state.width, state.height);
    remap(state, w, h, |x, y| Some((w - 1 - x, y)));
}

pub fn flip_vertical(state: &mut CanvasState) {
    let (w, h) = (state.width, state.height);
    remap(state, w, h, |x, y| Some((x, h - 1 - y)));
}

/// Rotate 90° clockwise; width and height swap.
pub fn rotate_clockwise(state: &mut CanvasState) {
    let (w, h) = (state.width, state.height);
    remap(state, h, w, |nx, ny| Some((ny, h - 1 - nx)));
}

pub fn rotate_counter_clockwise(state: &mut CanvasState) {
    let (w, h) = (state.width, state.height);
    remap(state, h, w, |nx, ny| Some((w - 1 - ny, nx)));
}

/// Change grid dimensions keeping content pinned to `anchor`. Cells falling
/// outside are dropped and new area is empty. Returns `false` for invalid
/// dimensions.
pub fn resize_grid(state: &mut CanvasState, new_w: u32, new_h: u32, anchor: ResizeAnchor) -> bool {
    if !validate_canvas_size(new_w, new_h) || !state.is_created() {
        return false;
    }
    let (px, py) = anchor.placement();
    let ox = anchor_offset(px, state.width, new_w);
    let oy = anchor_offset(py, state.height, new_h);
    remap(state, new_w, new_h, |nx, ny| {
        let (x, y) = (nx as i64 - ox, ny as i64 - oy);
        (x >= 0 && y >= 0).then_some((x as u32, y as u32))
    });
    true
}

/// Empty every cell (the selection is left alone).
pub fn clear_grid(state: &mut CanvasState) {
    state.fill_all(None);
}

/// Move the selected cells by (dx, dy). Vacated cells become empty and cells
/// pushed past the edge are lost. Returns `false` with no active selection.
pub fn move_selection(state: &mut CanvasState, dx: i32, dy: i32) -> bool {
    if !state.selection.active {
        return false;
    }
    if dx == 0 && dy == 0 {
        return true;
    }
    let (w, h) = (state.width as i64, state.height as i64);
    let mut lifted: Vec<(i64, i64, Cell)> = Vec::new();
    for y in 0..state.height {
        for x in 0..state.width {
            if state.selection.is_selected(x, y) {
                lifted.push((x as i64, y as i64, state.get(x, y).cloned()));
            }
        }
    }
    for (x, y, _) in &lifted {
        state.set(*x as u32, *y as u32, None);
    }
    for (x, y, cell) in lifted {
        let (nx, ny) = (x + dx as i64, y + dy as i64);
        if nx >= 0 && ny >= 0 && nx < w && ny < h {
            state.set(nx as u32, ny as u32, cell);
        }
    }
    state.selection.shift_mask(dx, dy);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::palette::PaletteEntry;
    use egui::Color32;
    use std::sync::Arc;

    fn cell(code: &str) -> Cell {
        Some(Arc::new(PaletteEntry::new(code, Color32::BLACK)))
    }

    /// 3x2 grid with codes "x,y" in every cell.
    fn labelled() -> CanvasState {
        let mut c = CanvasState::default();
        c.create(3, 2, None, None);
        for y in 0..2 {
            for x in 0..3 {
                c.set(x, y, cell(&format!("{x},{y}")));
            }
        }
        c
    }

    #[test]
    fn flips_mirror_content() {
        let mut c = labelled();
        flip_horizontal(&mut c);
        assert_eq!(c.code_at(0, 0), Some("2,0"));
        flip_vertical(&mut c);
        assert_eq!(c.code_at(0, 0), Some("2,1"));
    }

    #[test]
    fn rotations_swap_dimensions_and_invert_each_other() {
        let mut c = labelled();
        rotate_clockwise(&mut c);
        assert_eq!((c.width, c.height), (2, 3));
        // Old bottom-left ends up top-left.
        assert_eq!(c.code_at(0, 0), Some("0,1"));
        assert_eq!(c.code_at(1, 0), Some("0,0"));
        rotate_counter_clockwise(&mut c);
        assert_eq!((c.width, c.height), (3, 2));
        assert_eq!(c.code_at(2, 1), Some("2,1"));
    }

    #[test]
    fn rotation_carries_selection() {
        let mut c = labelled();
        c.selection.set_rect(2, 0, 2, 0);
        rotate_clockwise(&mut c);
        assert!(c.selection.is_selected(1, 2));
        assert_eq!(c.selection.dimensions(), (2, 3));
    }

    #[test]
    fn resize_respects_anchor() {
        let mut c = labelled();
        assert!(resize_grid(&mut c, 5, 4, ResizeAnchor::BottomRight));
        assert_eq!(c.code_at(2, 2), Some("0,0"));
        assert_eq!(c.code_at(0, 0), None);

        let mut c = labelled();
        assert!(resize_grid(&mut c, 1, 2, ResizeAnchor::Center));
        assert_eq!(c.code_at(0, 0), Some("1,0"));
        assert!(!resize_grid(&mut c, 0, 2, ResizeAnchor::Center));
    }

    #[test]
    fn move_selection_drops_cells_past_the_edge() {
        let mut c = labelled();
        c.selection.set_rect(1, 0, 2, 0);
        assert!(move_selection(&mut c, 1, 0));
        assert_eq!(c.code_at(1, 0), None);
        assert_eq!(c.code_at(2, 0), Some("1,0"));
        // "2,0" moved past the right edge and is gone.
        assert_eq!(c.grid().iter().flatten().filter(|e| e.code == "2,0").count(), 0);
        assert!(c.selection.is_selected(2, 0));
        assert!(!c.selection.is_selected(1, 0));
    }

    #[test]
    fn move_without_selection_is_refused() {
        let mut c = labelled();
        assert!(!move_selection(&mut c, 1, 1));
        clear_grid(&mut c);
        assert_eq!(c.filled_count(), 0);
    }
}

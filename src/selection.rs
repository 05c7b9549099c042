// ============================================================================
// SELECTION SYSTEM: boolean cell mask with tight bounds
// ============================================================================

use serde::{Deserialize, Serialize};

/// How a new rectangle interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new rectangle.
    #[default]
    Replace,
    /// Union – add to the existing mask.
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
}

/// Tight axis-aligned rectangle around every selected cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SelectionBounds {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Transient drag feedback drawn on the selection preview layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SelectionPreview {
    Rect { mode: SelectionMode, x1: u32, y1: u32, x2: u32, y2: u32 },
    Move { dx: i32, dy: i32 },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionState {
    pub active: bool,
    /// Row-major, `width * height` long when present.
    pub mask: Option<Vec<bool>>,
    pub bounds: Option<SelectionBounds>,
    pub preview: Option<SelectionPreview>,
    width: u32,
    height: u32,
}

impl SelectionState {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, ..Self::default() }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Drop everything, including the mask allocation.
    pub fn clear(&mut self) {
        self.active = false;
        self.mask = None;
        self.bounds = None;
        self.preview = None;
    }

    /// Resize to new grid dimensions; the mask is discarded.
    pub fn reset(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.clear();
    }

    pub fn is_selected(&self, x: u32, y: u32) -> bool {
        if !self.active || x >= self.width || y >= self.height {
            return false;
        }
        self.mask
            .as_ref()
            .and_then(|m| m.get((y * self.width + x) as usize).copied())
            .unwrap_or(false)
    }

    fn ensure_mask(&mut self) -> &mut Vec<bool> {
        let len = (self.width * self.height) as usize;
        let mask = self.mask.get_or_insert_with(|| vec![false; len]);
        if mask.len() != len {
            *mask = vec![false; len];
        }
        mask
    }

    /// Apply the rectangle spanned by two (possibly unordered) corners.
    /// Corners are clamped to the grid; a rectangle entirely outside is a no-op
    /// for Add/Subtract and clears for Replace.
    pub fn apply_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64, mode: SelectionMode) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let (lx, hx) = (x1.min(x2), x1.max(x2));
        let (ly, hy) = (y1.min(y2), y1.max(y2));
        let outside = hx < 0 || hy < 0 || lx >= w || ly >= h;
        let (lx, hx) = (lx.clamp(0, w - 1) as u32, hx.clamp(0, w - 1) as u32);
        let (ly, hy) = (ly.clamp(0, h - 1) as u32, hy.clamp(0, h - 1) as u32);
        let width = self.width;

        let mask = self.ensure_mask();
        if mode == SelectionMode::Replace {
            mask.iter_mut().for_each(|v| *v = false);
        }
        if !outside {
            let value = mode != SelectionMode::Subtract;
            for y in ly..=hy {
                let row = (y * width) as usize;
                for x in lx..=hx {
                    mask[row + x as usize] = value;
                }
            }
        }
        self.recompute_bounds();
    }

    pub fn set_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) {
        self.apply_rect(x1, y1, x2, y2, SelectionMode::Replace);
    }

    pub fn add_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) {
        self.apply_rect(x1, y1, x2, y2, SelectionMode::Add);
    }

    pub fn subtract_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) {
        self.apply_rect(x1, y1, x2, y2, SelectionMode::Subtract);
    }

    pub fn select_all(&mut self) {
        self.ensure_mask().iter_mut().for_each(|v| *v = true);
        self.recompute_bounds();
    }

    pub fn invert(&mut self) {
        self.ensure_mask().iter_mut().for_each(|v| *v = !*v);
        self.recompute_bounds();
    }

    /// Translate every selected cell; cells leaving the grid are dropped.
    pub fn shift_mask(&mut self, dx: i32, dy: i32) {
        let Some(mask) = self.mask.as_ref() else { return };
        if dx == 0 && dy == 0 {
            return;
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let mut shifted = vec![false; mask.len()];
        for y in 0..h {
            for x in 0..w {
                if !mask[(y * w + x) as usize] {
                    continue;
                }
                let (nx, ny) = (x + dx as i64, y + dy as i64);
                if nx >= 0 && ny >= 0 && nx < w && ny < h {
                    shifted[(ny * w + nx) as usize] = true;
                }
            }
        }
        self.mask = Some(shifted);
        self.recompute_bounds();
    }

    /// Rescan the mask for the minimal enclosing rectangle and sync `active`.
    pub fn recompute_bounds(&mut self) {
        self.bounds = self.mask.as_ref().and_then(|m| mask_bounds(m, self.width, self.height));
        self.active = self.bounds.is_some();
    }

    /// Replace the mask with a stored one of possibly different dimensions.
    /// Cells outside the stored mask default to unselected.
    pub fn restore(&mut self, stored: Option<&[bool]>, stored_w: u32, stored_h: u32, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.preview = None;
        let Some(stored) = stored else {
            self.mask = None;
            self.recompute_bounds();
            return;
        };
        let mut mask = vec![false; (width * height) as usize];
        for y in 0..height.min(stored_h) {
            for x in 0..width.min(stored_w) {
                let src = (y * stored_w + x) as usize;
                if stored.get(src).copied().unwrap_or(false) {
                    mask[(y * width + x) as usize] = true;
                }
            }
        }
        self.mask = Some(mask);
        self.recompute_bounds();
    }

    /// Replace the mask wholesale (used by grid transforms). Wrong-sized masks
    /// are discarded.
    pub fn replace_mask(&mut self, width: u32, height: u32, mask: Option<Vec<bool>>) {
        self.width = width;
        self.height = height;
        self.mask = mask.filter(|m| m.len() == (width * height) as usize);
        self.preview = None;
        self.recompute_bounds();
    }
}

fn mask_bounds(mask: &[bool], w: u32, h: u32) -> Option<SelectionBounds> {
    let mut min_x = w;
    let mut min_y = h;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;
    for y in 0..h {
        let row = &mask[(y * w) as usize..((y + 1) * w) as usize];
        let mut found_in_row = false;
        for (x, &v) in row.iter().enumerate() {
            if v {
                let x = x as u32;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                found_in_row = true;
            }
        }
        if found_in_row {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
            found = true;
        }
    }
    found.then(|| SelectionBounds {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(sel: &SelectionState) {
        assert_eq!(sel.active, sel.bounds.is_some());
        let (w, h) = sel.dimensions();
        if let (Some(mask), Some(b)) = (&sel.mask, sel.bounds) {
            for y in 0..h {
                for x in 0..w {
                    if mask[(y * w + x) as usize] {
                        assert!(b.contains(x, y), "({x},{y}) outside {b:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn replace_add_subtract() {
        let mut sel = SelectionState::new(10, 10);
        sel.set_rect(1, 1, 3, 3);
        assert_eq!(sel.bounds, Some(SelectionBounds { x: 1, y: 1, width: 3, height: 3 }));
        sel.add_rect(8, 8, 6, 6);
        assert_eq!(sel.bounds, Some(SelectionBounds { x: 1, y: 1, width: 8, height: 8 }));
        sel.subtract_rect(0, 0, 9, 5);
        assert_eq!(sel.bounds, Some(SelectionBounds { x: 6, y: 6, width: 3, height: 3 }));
        sel.subtract_rect(6, 6, 8, 8);
        assert!(!sel.active);
        assert_eq!(sel.bounds, None);
        assert_invariant(&sel);
    }

    #[test]
    fn rect_is_clamped_to_grid() {
        let mut sel = SelectionState::new(4, 4);
        sel.set_rect(-5, 2, 10, 2);
        assert_eq!(sel.bounds, Some(SelectionBounds { x: 0, y: 2, width: 4, height: 1 }));
        sel.add_rect(20, 20, 30, 30);
        assert_eq!(sel.bounds, Some(SelectionBounds { x: 0, y: 2, width: 4, height: 1 }));
        assert_invariant(&sel);
    }

    #[test]
    fn invert_flips_every_cell() {
        let mut sel = SelectionState::new(3, 3);
        sel.set_rect(0, 0, 2, 2);
        sel.invert();
        assert!(!sel.active);
        sel.invert();
        assert!(sel.active);
        sel.set_rect(1, 1, 1, 1);
        sel.invert();
        assert!(!sel.is_selected(1, 1));
        assert!(sel.is_selected(0, 0));
        assert_invariant(&sel);
    }

    #[test]
    fn shift_drops_cells_leaving_the_grid() {
        let mut sel = SelectionState::new(5, 5);
        sel.set_rect(3, 0, 4, 1);
        sel.shift_mask(1, 0);
        assert_eq!(sel.bounds, Some(SelectionBounds { x: 4, y: 0, width: 1, height: 2 }));
        sel.shift_mask(5, 0);
        assert!(!sel.active);
        assert_invariant(&sel);
    }

    #[test]
    fn restore_remaps_to_new_dimensions() {
        let stored = vec![true, false, false, true];
        let mut sel = SelectionState::new(0, 0);
        sel.restore(Some(&stored), 2, 2, 3, 1);
        assert!(sel.is_selected(0, 0));
        assert!(!sel.is_selected(1, 0));
        assert!(!sel.is_selected(2, 0));
        assert_invariant(&sel);
    }

    #[test]
    fn out_of_range_queries_are_false() {
        let mut sel = SelectionState::new(2, 2);
        sel.select_all();
        assert!(sel.is_selected(1, 1));
        assert!(!sel.is_selected(2, 0));
    }
}

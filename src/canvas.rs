use std::sync::Arc;

use egui::{Pos2, Vec2};
use image::RgbaImage;

use crate::components::palette::{CellRef, PaletteEntry};
use crate::selection::SelectionState;
use crate::symmetry::SymmetryMode;
use crate::util::{AxisPadding, clamp_f32, compute_axis_padding};

/// Largest accepted grid dimension (per axis).
pub const CANVAS_SIZE_LIMIT: u32 = 1024;
pub const MIN_CELL_SIZE: u32 = 5;
pub const MAX_CELL_SIZE: u32 = 40;
pub const DEFAULT_CELL_SIZE: u32 = 10;
/// Largest backing-surface edge the host can allocate safely.
pub const MAX_SAFE_PIXEL_DIMENSION: u32 = 16384;
/// Canvases at least this many cells get the reduced dynamic zoom limit.
pub const LARGE_CANVAS_AREA: u32 = 512 * 512;

/// One grid position: empty, or a shared reference into the palette.
pub type Cell = Option<CellRef>;

pub fn validate_canvas_size(width: u32, height: u32) -> bool {
    (1..=CANVAS_SIZE_LIMIT).contains(&width) && (1..=CANVAS_SIZE_LIMIT).contains(&height)
}

/// Maximum cell size allowed for a canvas of this area.
pub fn dynamic_zoom_limit(width: u32, height: u32, default_cell_size: u32) -> u32 {
    if width.saturating_mul(height) >= LARGE_CANVAS_AREA {
        let reduced = (default_cell_size as f32 * 1.5).round() as u32;
        reduced.clamp(MIN_CELL_SIZE, MAX_CELL_SIZE)
    } else {
        MAX_CELL_SIZE
    }
}

/// Cell size at which the longest axis still fits the safe pixel dimension.
pub fn safe_cell_cap(width: u32, height: u32) -> u32 {
    (MAX_SAFE_PIXEL_DIMENSION / width.max(height).max(1)).max(1)
}

/// Result of resolving a requested zoom into a backing resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellSizing {
    /// Backing pixels per cell after every safety clamp.
    pub cell_size: u32,
    /// Requested zoom, clamped to the cell-size range.
    pub zoom_value: f32,
    /// Cosmetic scale so the visual size tracks `zoom_value`.
    pub zoom_scale: f32,
}

pub fn resolve_cell_size(requested: f32, width: u32, height: u32, default_cell_size: u32) -> CellSizing {
    let zoom_value = clamp_f32(requested, MIN_CELL_SIZE as f32, MAX_CELL_SIZE as f32);
    let limit = dynamic_zoom_limit(width, height, default_cell_size);
    let safe = safe_cell_cap(width, height);
    let cell_size = (zoom_value.round() as u32).min(limit).min(safe).max(1);
    CellSizing {
        cell_size,
        zoom_value,
        zoom_scale: zoom_value / cell_size as f32,
    }
}

/// What `set_cell_size` had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellSizeChange {
    Unchanged,
    /// Only the cosmetic scale moved; backing surfaces are kept.
    Cosmetic,
    /// Backing resolution changed; surfaces were resized.
    Resolution,
}

// ============================================================================
// BASE IMAGE OVERLAY
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BaseLayerPosition {
    #[default]
    Under,
    Over,
    Hidden,
}

impl BaseLayerPosition {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "under" => Some(Self::Under),
            "over" => Some(Self::Over),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }
}

/// Reference image drawn behind or above the cells.
///
/// `offset_*` are in cells and `scale` is cells per image pixel, so the overlay
/// stays aligned with the grid at every zoom level.
#[derive(Clone, Debug)]
pub struct BaseImage {
    pub image: Option<Arc<RgbaImage>>,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub position: BaseLayerPosition,
    pub editing: bool,
}

impl Default for BaseImage {
    fn default() -> Self {
        Self {
            image: None,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            position: BaseLayerPosition::Under,
            editing: false,
        }
    }
}

pub const MIN_BASE_SCALE: f32 = 0.01;
pub const MAX_BASE_SCALE: f32 = 64.0;

impl BaseImage {
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = clamp_f32(scale, MIN_BASE_SCALE, MAX_BASE_SCALE);
    }

    /// Opaque base pixel under the center of cell (x, y), if any.
    pub fn sample(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let image = self.image.as_ref()?;
        if self.scale <= 0.0 {
            return None;
        }
        let u = (x as f32 + 0.5 - self.offset_x) / self.scale;
        let v = (y as f32 + 0.5 - self.offset_y) / self.scale;
        if u < 0.0 || v < 0.0 {
            return None;
        }
        let (u, v) = (u.floor() as u32, v.floor() as u32);
        if u >= image.width() || v >= image.height() {
            return None;
        }
        let p = image.get_pixel(u, v);
        (p[3] >= 128).then_some([p[0], p[1], p[2]])
    }
}

/// Pixel size shared by every layered drawing surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// CANVAS STATE
// ============================================================================

pub struct CanvasState {
    pub width: u32,
    pub height: u32,
    /// Row-major, `width * height` cells.
    grid: Vec<Cell>,
    pub cell_size: u32,
    pub zoom_value: f32,
    pub zoom_scale: f32,
    /// Viewport translation in device pixels.
    pub pan: Vec2,
    pub axis_padding: AxisPadding,
    pub base: BaseImage,
    pub selection: SelectionState,
    pub symmetry_mode: SymmetryMode,
    pub surface: SurfaceSize,
    pub default_cell_size: u32,
    pub created_at: Option<u64>,
    /// Bumped on every cell write; renderers compare against it.
    pub dirty_generation: u64,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::empty(DEFAULT_CELL_SIZE)
    }
}

impl CanvasState {
    /// A 0×0 canvas; every grid operation on it is a no-op until `create`.
    pub fn empty(default_cell_size: u32) -> Self {
        let default_cell_size = default_cell_size.clamp(MIN_CELL_SIZE, MAX_CELL_SIZE);
        Self {
            width: 0,
            height: 0,
            grid: Vec::new(),
            cell_size: default_cell_size,
            zoom_value: default_cell_size as f32,
            zoom_scale: 1.0,
            pan: Vec2::ZERO,
            axis_padding: AxisPadding::default(),
            base: BaseImage::default(),
            selection: SelectionState::new(0, 0),
            symmetry_mode: SymmetryMode::None,
            surface: SurfaceSize::default(),
            default_cell_size,
            created_at: None,
            dirty_generation: 0,
        }
    }

    /// Allocate an all-empty grid and reset view and selection.
    /// Returns `false` (and changes nothing) for invalid dimensions.
    pub fn create(&mut self, width: u32, height: u32, cell_size: Option<f32>, created_at: Option<u64>) -> bool {
        if !validate_canvas_size(width, height) {
            return false;
        }
        let requested = cell_size.unwrap_or(self.zoom_value);
        let sizing = resolve_cell_size(requested, width, height, self.default_cell_size);

        self.width = width;
        self.height = height;
        self.grid = vec![None; (width * height) as usize];
        self.cell_size = sizing.cell_size;
        self.zoom_value = sizing.zoom_value;
        self.zoom_scale = sizing.zoom_scale;
        self.pan = Vec2::ZERO;
        self.base.offset_x = 0.0;
        self.base.offset_y = 0.0;
        self.selection.reset(width, height);
        self.created_at = created_at;
        self.resize_canvas();
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
        true
    }

    pub fn is_created(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Recompute axis padding and the backing-surface size.
    pub fn resize_canvas(&mut self) {
        self.axis_padding = compute_axis_padding(self.cell_size, self.width, self.height);
        self.surface = SurfaceSize {
            width: self.cell_size * self.width + self.axis_padding.horizontal(),
            height: self.cell_size * self.height + self.axis_padding.vertical(),
        };
    }

    /// Re-resolve the requested zoom. Backing surfaces only change when the
    /// safe cell size does.
    pub fn set_cell_size(&mut self, requested: f32) -> CellSizeChange {
        let sizing = resolve_cell_size(requested, self.width, self.height, self.default_cell_size);
        if sizing.cell_size != self.cell_size {
            self.cell_size = sizing.cell_size;
            self.zoom_value = sizing.zoom_value;
            self.zoom_scale = sizing.zoom_scale;
            self.resize_canvas();
            CellSizeChange::Resolution
        } else if (sizing.zoom_value - self.zoom_value).abs() > f32::EPSILON {
            self.zoom_value = sizing.zoom_value;
            self.zoom_scale = sizing.zoom_scale;
            CellSizeChange::Cosmetic
        } else {
            CellSizeChange::Unchanged
        }
    }

    /// Re-resolve sizing for the current dimensions at the current zoom
    /// (dimensions may have changed under us, e.g. after a history restore).
    pub fn refresh_sizing(&mut self) {
        let sizing = resolve_cell_size(self.zoom_value, self.width, self.height, self.default_cell_size);
        self.cell_size = sizing.cell_size;
        self.zoom_value = sizing.zoom_value;
        self.zoom_scale = sizing.zoom_scale;
        self.resize_canvas();
    }

    /// Visual pixels per cell (backing size times cosmetic scale).
    pub fn visual_cell_size(&self) -> f32 {
        self.cell_size as f32 * self.zoom_scale
    }

    // ---- grid access -------------------------------------------------------

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&CellRef> {
        self.index(x, y).and_then(|i| self.grid[i].as_ref())
    }

    pub fn code_at(&self, x: u32, y: u32) -> Option<&str> {
        self.get(x, y).map(|e| e.code.as_str())
    }

    /// Write a cell. Out-of-bounds writes are ignored. Returns whether the
    /// cell's code changed.
    pub fn set(&mut self, x: u32, y: u32, value: Cell) -> bool {
        let Some(i) = self.index(x, y) else { return false };
        let changed = !same_cell(&self.grid[i], &value);
        self.grid[i] = value;
        if changed {
            self.dirty_generation = self.dirty_generation.wrapping_add(1);
        }
        changed
    }

    pub fn grid(&self) -> &[Cell] {
        &self.grid
    }

    /// Replace dimensions and cells wholesale (history restore, transforms).
    /// A grid of the wrong length is normalized: truncated or padded with empties.
    pub fn replace_grid(&mut self, width: u32, height: u32, mut grid: Vec<Cell>) {
        grid.resize((width * height) as usize, None);
        self.width = width;
        self.height = height;
        self.grid = grid;
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    /// Replace every cell with `entry` (fills the whole grid).
    pub fn fill_all(&mut self, entry: Option<&CellRef>) {
        self.grid.iter_mut().for_each(|c| *c = entry.cloned());
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    pub fn has_transitional_cells(&self) -> bool {
        self.grid.iter().flatten().any(|e| e.is_transitional())
    }

    pub fn filled_count(&self) -> usize {
        self.grid.iter().filter(|c| c.is_some()).count()
    }

    // ---- view geometry -----------------------------------------------------

    /// Top-left of cell (x, y) on the backing surfaces.
    pub fn cell_origin(&self, x: u32, y: u32) -> (u32, u32) {
        (
            self.axis_padding.left + x * self.cell_size,
            self.axis_padding.top + y * self.cell_size,
        )
    }

    /// Map a host-element position (device pixels) to a surface position.
    pub fn screen_to_surface(&self, pos: Pos2) -> Pos2 {
        let scale = if self.zoom_scale > 0.0 { self.zoom_scale } else { 1.0 };
        Pos2::new((pos.x - self.pan.x) / scale, (pos.y - self.pan.y) / scale)
    }

    /// Fractional cell coordinates under a host position (may be out of range).
    pub fn screen_to_cell_f32(&self, pos: Pos2) -> (f32, f32) {
        let p = self.screen_to_surface(pos);
        let cs = self.cell_size.max(1) as f32;
        (
            (p.x - self.axis_padding.left as f32) / cs,
            (p.y - self.axis_padding.top as f32) / cs,
        )
    }

    /// Cell under a host position, `None` outside the grid.
    pub fn screen_to_cell(&self, pos: Pos2) -> Option<(u32, u32)> {
        let (fx, fy) = self.screen_to_cell_f32(pos);
        let (x, y) = (fx.floor() as i64, fy.floor() as i64);
        self.in_bounds(x, y).then_some((x as u32, y as u32))
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.pan += delta;
    }

    /// Zoom while keeping the surface point under `anchor` fixed on screen.
    pub fn zoom_around(&mut self, requested: f32, anchor: Pos2) -> CellSizeChange {
        let before = self.screen_to_cell_f32(anchor);
        let change = self.set_cell_size(requested);
        let vis = self.visual_cell_size();
        let pad = Vec2::new(self.axis_padding.left as f32, self.axis_padding.top as f32) * self.zoom_scale;
        self.pan = Vec2::new(
            anchor.x - pad.x - before.0 * vis,
            anchor.y - pad.y - before.1 * vis,
        );
        change
    }

    /// Default zoom, no pan.
    pub fn reset_view(&mut self) -> CellSizeChange {
        self.pan = Vec2::ZERO;
        self.set_cell_size(self.default_cell_size as f32)
    }
}

/// Two cells are the same when both are empty or both carry the same code.
pub fn same_cell(a: &Cell, b: &Cell) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y) || x.code == y.code,
        _ => false,
    }
}

/// Cell value for a palette entry reference.
pub fn cell_of(entry: &CellRef) -> Cell {
    Some(entry.clone())
}

/// Convenience for tests and scripts: a detached cell for an entry.
pub fn detached_cell(entry: PaletteEntry) -> Cell {
    Some(Arc::new(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_invalid_dimensions() {
        let mut c = CanvasState::default();
        assert!(!c.create(0, 5, None, None));
        assert!(!c.create(5, 1025, None, None));
        assert!(!c.is_created());
        assert!(c.create(1024, 1, None, None));
    }

    #[test]
    fn large_canvas_gets_dynamic_zoom_cap() {
        let mut c = CanvasState::empty(10);
        assert!(c.create(600, 600, Some(40.0), None));
        assert_eq!(c.cell_size, 15);
        assert!(c.cell_size < MAX_CELL_SIZE);
        assert_eq!(c.zoom_value, 40.0);
        assert!((c.zoom_scale - 40.0 / 15.0).abs() < 1e-5);
    }

    #[test]
    fn wide_canvas_is_capped_by_safe_dimension() {
        let mut c = CanvasState::empty(10);
        assert!(c.create(1024, 8, Some(40.0), None));
        assert_eq!(c.cell_size, 16);
        assert!(c.cell_size * c.width <= MAX_SAFE_PIXEL_DIMENSION);
    }

    #[test]
    fn cosmetic_zoom_keeps_backing_size() {
        let mut c = CanvasState::empty(10);
        c.create(600, 600, Some(20.0), None);
        assert_eq!(c.cell_size, 15);
        let surface = c.surface;
        assert_eq!(c.set_cell_size(30.0), CellSizeChange::Cosmetic);
        assert_eq!(c.surface, surface);
        assert_eq!(c.set_cell_size(30.0), CellSizeChange::Unchanged);
        assert_eq!(c.set_cell_size(8.0), CellSizeChange::Resolution);
        assert_eq!(c.cell_size, 8);
        assert!(c.surface.width < surface.width);
    }

    #[test]
    fn surface_includes_axis_padding() {
        let mut c = CanvasState::empty(10);
        c.create(4, 3, Some(10.0), None);
        assert_eq!(c.surface.width, 40 + c.axis_padding.horizontal());
        assert_eq!(c.surface.height, 30 + c.axis_padding.vertical());
    }

    #[test]
    fn out_of_bounds_access_is_ignored() {
        let mut c = CanvasState::default();
        let cell = detached_cell(PaletteEntry::new("01", egui::Color32::RED));
        assert!(!c.set(0, 0, cell.clone()));
        c.create(2, 2, None, None);
        assert!(!c.set(2, 0, cell.clone()));
        assert!(c.set(1, 1, cell.clone()));
        assert!(!c.set(1, 1, cell));
        assert_eq!(c.code_at(1, 1), Some("01"));
        assert_eq!(c.code_at(5, 5), None);
    }

    #[test]
    fn screen_mapping_accounts_for_pan_zoom_and_padding() {
        let mut c = CanvasState::empty(10);
        c.create(8, 8, Some(10.0), None);
        c.pan = Vec2::new(100.0, 50.0);
        let (ox, oy) = c.cell_origin(3, 2);
        let pos = Pos2::new(100.0 + ox as f32 + 1.0, 50.0 + oy as f32 + 1.0);
        assert_eq!(c.screen_to_cell(pos), Some((3, 2)));
        assert_eq!(c.screen_to_cell(Pos2::new(0.0, 0.0)), None);
    }

    #[test]
    fn zoom_around_keeps_anchor_cell() {
        let mut c = CanvasState::empty(10);
        c.create(16, 16, Some(10.0), None);
        let anchor = Pos2::new(120.0, 90.0);
        let before = c.screen_to_cell_f32(anchor);
        c.zoom_around(20.0, anchor);
        let after = c.screen_to_cell_f32(anchor);
        assert!((before.0 - after.0).abs() < 1e-3);
        assert!((before.1 - after.1).abs() < 1e-3);
    }

    #[test]
    fn base_sample_uses_offset_and_scale() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(1, 0, image::Rgba([10, 20, 30, 255]));
        img.put_pixel(0, 1, image::Rgba([1, 2, 3, 0]));
        let base = BaseImage {
            image: Some(Arc::new(img)),
            scale: 2.0,
            offset_x: 1.0,
            ..BaseImage::default()
        };
        // Cell 3 center = 3.5 → (3.5 - 1) / 2 = 1.25 → pixel column 1.
        assert_eq!(base.sample(3, 0), Some([10, 20, 30]));
        // Transparent pixels are not sampled.
        assert_eq!(base.sample(1, 2), None);
        assert_eq!(base.sample(0, 0), None);
    }
}

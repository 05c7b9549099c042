use std::sync::Arc;
use std::sync::mpsc::Receiver;

use egui::{Pos2, Vec2};
use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{BaseLayerPosition, Cell, CanvasState, CellSizeChange};
use crate::components::color_usage::{ColorUsage, ColorUsageCache};
use crate::components::history::{HistoryManager, MAX_HISTORY};
use crate::components::palette::{CellRef, DisplayMode, Palette};
use crate::ops::canvas_ops::{self, ResizeAnchor};
use crate::ops::fill::bucket_fill;
use crate::render::Renderer;
use crate::selection::SelectionPreview;
use crate::settings::EditorSettings;
use crate::signals::{GridUpdated, SignalBus};
use crate::symmetry::{SymmetryMode, compute_symmetry_targets};

/// Optional inputs to `Session::create_canvas`.
#[derive(Clone, Copy, Debug, Default)]
pub struct CreateOptions {
    pub cell_size: Option<f32>,
    pub created_at: Option<u64>,
}

/// One open editor document: grid, history, palette and renderer.
pub struct Session {
    pub id: Uuid,
    /// Display name ("Untitled-X" until named)
    pub name: String,
    pub canvas: CanvasState,
    pub history: HistoryManager,
    pub palette: Palette,
    pub renderer: Renderer,
    pub settings: EditorSettings,
    /// Paint with the palette color nearest to the reference image pixel.
    pub auto_snap: bool,
    pub is_dirty: bool,
    usage: ColorUsageCache,
    signals: SignalBus,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EditorSettings::default(), Palette::builtin())
    }
}

impl Session {
    pub fn new(settings: EditorSettings, palette: Palette) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "Untitled-1".to_string(),
            canvas: CanvasState::empty(settings.default_cell_size),
            history: HistoryManager::new(MAX_HISTORY),
            palette,
            renderer: Renderer::new(settings.render_options(), settings.display_mode, settings.font_family.clone()),
            auto_snap: settings.auto_snap,
            settings,
            is_dirty: false,
            usage: ColorUsageCache::new(),
            signals: SignalBus::new(),
        }
    }

    // ========================================================================
    // CANVAS LIFECYCLE & SIZING
    // ========================================================================

    /// Allocate a fresh empty grid. Returns `false` for dimensions outside
    /// 1..=1024; nothing changes in that case.
    pub fn create_canvas(&mut self, width: u32, height: u32, options: CreateOptions) -> bool {
        if !self.canvas.create(width, height, options.cell_size, options.created_at) {
            crate::log_warn!("create_canvas: refused {}x{}", width, height);
            return false;
        }
        crate::log_info!(
            "create_canvas: {}x{} cell_size={} zoom_scale={:.3}",
            width,
            height,
            self.canvas.cell_size,
            self.canvas.zoom_scale
        );
        self.renderer.cancel_animation();
        self.history.reset(&self.canvas);
        self.is_dirty = false;
        self.resize_canvas();
        true
    }

    /// Re-resolve zoom. Only a change of backing resolution resizes surfaces.
    pub fn set_cell_size(&mut self, requested: f32) -> CellSizeChange {
        let change = self.canvas.set_cell_size(requested);
        if change == CellSizeChange::Resolution {
            self.resize_canvas();
        }
        change
    }

    /// Zoom keeping the cell under `anchor` in place.
    pub fn zoom_around(&mut self, requested: f32, anchor: Pos2) -> CellSizeChange {
        let change = self.canvas.zoom_around(requested, anchor);
        if change == CellSizeChange::Resolution {
            self.resize_canvas();
        }
        change
    }

    pub fn reset_view(&mut self) {
        if self.canvas.reset_view() == CellSizeChange::Resolution {
            self.resize_canvas();
        }
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        self.canvas.pan_by(delta);
    }

    /// Recompute padding and surface size, then repaint every layer.
    pub fn resize_canvas(&mut self) {
        self.canvas.resize_canvas();
        self.renderer.resize(&self.canvas);
        self.renderer.render_base_layer(&self.canvas);
        self.redraw_canvas();
        self.render_grid_layer();
        self.renderer.render_selection_layers(&self.canvas);
    }

    // ========================================================================
    // RENDER & SIGNALS
    // ========================================================================

    pub fn redraw_canvas(&mut self) {
        self.renderer.redraw_canvas(&self.canvas);
    }

    /// Redraw grid lines and axis labels and announce that the grid may have
    /// changed.
    pub fn render_grid_layer(&mut self) {
        self.renderer.render_grid_layer(&self.canvas);
        self.usage.invalidate();
        self.signals.dispatch(GridUpdated {
            width: self.canvas.width,
            height: self.canvas.height,
            revision: self.history.revision(),
        });
    }

    pub fn render_selection(&mut self) {
        self.renderer.render_selection_layers(&self.canvas);
    }

    pub fn subscribe_grid_updated(&mut self) -> Receiver<GridUpdated> {
        self.signals.subscribe()
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode, now_ms: u64) -> bool {
        self.renderer.set_display_mode(mode, now_ms, &self.canvas)
    }

    /// Host frame callback while a display-mode fade is running.
    pub fn step_animation(&mut self, now_ms: u64) -> bool {
        self.renderer.step_animation(now_ms, &self.canvas)
    }

    pub fn set_highlight(&mut self, code: Option<String>) {
        self.renderer.set_highlight(code);
        self.redraw_canvas();
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub fn save_history(&mut self) -> bool {
        self.history.save(&self.canvas)
    }

    pub fn undo(&mut self) -> bool {
        if !self.history.undo(&mut self.canvas) {
            return false;
        }
        crate::log_info!("undo -> {}/{}", self.history.index() + 1, self.history.len());
        self.after_restore();
        true
    }

    pub fn redo(&mut self) -> bool {
        if !self.history.redo(&mut self.canvas) {
            return false;
        }
        crate::log_info!("redo -> {}/{}", self.history.index() + 1, self.history.len());
        self.after_restore();
        true
    }

    fn after_restore(&mut self) {
        self.is_dirty = true;
        self.renderer.resize(&self.canvas);
        self.renderer.render_base_layer(&self.canvas);
        self.redraw_canvas();
        self.render_grid_layer();
        self.render_selection();
    }

    /// Finish a mutation: repaint, push a snapshot and announce the change.
    /// Returns whether a new snapshot was recorded.
    pub fn commit(&mut self) -> bool {
        self.redraw_canvas();
        self.render_selection();
        let saved = self.save_history();
        if saved {
            self.is_dirty = true;
        }
        self.render_grid_layer();
        saved
    }

    // ========================================================================
    // COLOR USAGE
    // ========================================================================

    pub fn get_used_colors(&mut self) -> Vec<ColorUsage> {
        let revision = self.history.revision();
        self.usage.get_used_colors(self.canvas.grid(), revision).to_vec()
    }

    // ========================================================================
    // SYMMETRY & PAINT
    // ========================================================================

    pub fn symmetry_mode(&self) -> SymmetryMode {
        self.canvas.symmetry_mode
    }

    pub fn set_symmetry_mode(&mut self, mode: SymmetryMode) {
        self.canvas.symmetry_mode = mode;
    }

    pub fn compute_symmetry_targets(&self, x: u32, y: u32) -> Vec<(u32, u32)> {
        compute_symmetry_targets(self.canvas.symmetry_mode, x, y, self.canvas.width, self.canvas.height)
    }

    /// Color the pencil lays down at (x, y): the palette color nearest the
    /// reference pixel when auto-snap is on, else the selected color, else the
    /// first enabled one.
    pub fn resolve_paint_color(&self, x: u32, y: u32) -> Option<CellRef> {
        if self.auto_snap
            && let Some(rgb) = self.canvas.base.sample(x, y)
            && let Some(entry) = self.palette.nearest(rgb)
        {
            return Some(entry.clone());
        }
        self.palette
            .selected_entry()
            .filter(|e| self.palette.is_enabled(&e.code))
            .or_else(|| self.palette.first_enabled())
            .cloned()
    }

    /// Write `value` at (x, y) and its symmetry orbit. Returns cells changed.
    pub fn paint_cell(&mut self, x: u32, y: u32, value: &Cell) -> usize {
        if x >= self.canvas.width || y >= self.canvas.height {
            return 0;
        }
        self.compute_symmetry_targets(x, y)
            .into_iter()
            .filter(|(tx, ty)| self.canvas.set(*tx, *ty, value.clone()))
            .count()
    }

    /// Paint with the resolved pencil color. No color, no paint.
    pub fn paint_at(&mut self, x: u32, y: u32) -> usize {
        match self.resolve_paint_color(x, y) {
            Some(entry) => self.paint_cell(x, y, &Some(entry)),
            None => 0,
        }
    }

    /// Paint a specific palette code; unknown codes paint nothing.
    pub fn paint_code(&mut self, x: u32, y: u32, code: &str) -> usize {
        match self.palette.get(code).cloned() {
            Some(entry) => self.paint_cell(x, y, &Some(entry)),
            None => 0,
        }
    }

    pub fn erase_at(&mut self, x: u32, y: u32) -> usize {
        self.paint_cell(x, y, &None)
    }

    pub fn bucket_fill(&mut self, x: u32, y: u32, value: &Cell) -> usize {
        bucket_fill(&mut self.canvas, x, y, value)
    }

    /// Select the code under (x, y). Empty cells leave the selection alone.
    pub fn pick_color(&mut self, x: u32, y: u32) -> Option<String> {
        let code = self.canvas.code_at(x, y)?.to_string();
        self.palette.select(&code).then_some(code)
    }

    // ========================================================================
    // SELECTION
    // ========================================================================

    pub fn set_selection_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) {
        self.canvas.selection.set_rect(x1, y1, x2, y2);
        self.render_selection();
    }

    pub fn add_selection_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) {
        self.canvas.selection.add_rect(x1, y1, x2, y2);
        self.render_selection();
    }

    pub fn subtract_selection_rect(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) {
        self.canvas.selection.subtract_rect(x1, y1, x2, y2);
        self.render_selection();
    }

    pub fn invert_selection(&mut self) {
        self.canvas.selection.invert();
        self.render_selection();
    }

    pub fn clear_selection(&mut self) {
        self.canvas.selection.clear();
        self.render_selection();
    }

    pub fn shift_selection_mask(&mut self, dx: i32, dy: i32) {
        self.canvas.selection.shift_mask(dx, dy);
        self.render_selection();
    }

    pub fn is_cell_selected(&self, x: u32, y: u32) -> bool {
        self.canvas.selection.is_selected(x, y)
    }

    pub fn set_selection_preview(&mut self, preview: Option<SelectionPreview>) {
        self.canvas.selection.preview = preview;
        self.render_selection();
    }

    // ========================================================================
    // GRID TRANSFORMS (each commits)
    // ========================================================================

    pub fn flip_horizontal(&mut self) {
        canvas_ops::flip_horizontal(&mut self.canvas);
        self.commit();
    }

    pub fn flip_vertical(&mut self) {
        canvas_ops::flip_vertical(&mut self.canvas);
        self.commit();
    }

    pub fn rotate_clockwise(&mut self) {
        canvas_ops::rotate_clockwise(&mut self.canvas);
        self.commit_resized();
    }

    pub fn rotate_counter_clockwise(&mut self) {
        canvas_ops::rotate_counter_clockwise(&mut self.canvas);
        self.commit_resized();
    }

    pub fn resize_grid(&mut self, width: u32, height: u32, anchor: ResizeAnchor) -> bool {
        if !canvas_ops::resize_grid(&mut self.canvas, width, height, anchor) {
            crate::log_warn!("resize_grid: refused {}x{}", width, height);
            return false;
        }
        self.commit_resized();
        true
    }

    pub fn clear_grid(&mut self) {
        canvas_ops::clear_grid(&mut self.canvas);
        self.commit();
    }

    /// Move the selected cells; cells pushed off the grid are lost.
    pub fn move_selection(&mut self, dx: i32, dy: i32) -> bool {
        if !canvas_ops::move_selection(&mut self.canvas, dx, dy) {
            return false;
        }
        self.commit();
        true
    }

    fn commit_resized(&mut self) {
        self.renderer.resize(&self.canvas);
        self.renderer.render_base_layer(&self.canvas);
        self.commit();
    }

    // ========================================================================
    // BASE IMAGE
    // ========================================================================

    pub fn set_base_image(&mut self, image: Option<RgbaImage>) {
        self.canvas.base.image = image.map(Arc::new);
        self.canvas.base.offset_x = 0.0;
        self.canvas.base.offset_y = 0.0;
        self.renderer.render_base_layer(&self.canvas);
    }

    /// Scale so the image's longer side spans the grid.
    pub fn fit_base_image(&mut self) {
        let Some((iw, ih)) = self.canvas.base.image.as_ref().map(|i| i.dimensions()) else { return };
        if iw == 0 || ih == 0 || !self.canvas.is_created() {
            return;
        }
        let sx = self.canvas.width as f32 / iw as f32;
        let sy = self.canvas.height as f32 / ih as f32;
        self.canvas.base.set_scale(sx.min(sy));
        self.renderer.render_base_layer(&self.canvas);
    }

    pub fn set_base_position(&mut self, position: BaseLayerPosition) {
        self.canvas.base.position = position;
        self.renderer.render_base_layer(&self.canvas);
    }

    pub fn set_base_editing(&mut self, editing: bool) {
        self.canvas.base.editing = editing;
    }

    /// Shift the reference image by a delta in cells.
    pub fn move_base(&mut self, dx: f32, dy: f32) {
        self.canvas.base.offset_x += dx;
        self.canvas.base.offset_y += dy;
        self.renderer.render_base_layer(&self.canvas);
    }

    /// Rescale the reference image keeping the cell point (cx, cy) fixed.
    pub fn scale_base_around(&mut self, new_scale: f32, cx: f32, cy: f32) {
        let base = &mut self.canvas.base;
        let old = base.scale;
        base.set_scale(new_scale);
        let ratio = base.scale / old;
        base.offset_x = cx - (cx - base.offset_x) * ratio;
        base.offset_y = cy - (cy - base.offset_y) * ratio;
        self.renderer.render_base_layer(&self.canvas);
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(w: u32, h: u32) -> Session {
        let mut s = Session::default();
        s.renderer.set_font(None);
        assert!(s.create_canvas(w, h, CreateOptions { cell_size: Some(5.0), created_at: None }));
        s
    }

    #[test]
    fn refused_dimensions_leave_state_alone() {
        let mut s = session(4, 4);
        s.paint_code(0, 0, "A1");
        s.commit();
        assert!(!s.create_canvas(2000, 4, CreateOptions::default()));
        assert_eq!(s.canvas.code_at(0, 0), Some("A1"));
        assert_eq!(s.history.len(), 2);
    }

    #[test]
    fn paint_follows_symmetry() {
        let mut s = session(4, 4);
        s.set_symmetry_mode(SymmetryMode::Vertical);
        assert_eq!(s.paint_code(0, 1, "A5"), 2);
        assert_eq!(s.canvas.code_at(3, 1), Some("A5"));
        assert_eq!(s.paint_code(9, 9, "A5"), 0);
        assert_eq!(s.paint_code(0, 0, "missing"), 0);
    }

    #[test]
    fn paint_color_falls_back_to_first_enabled() {
        let mut s = session(2, 2);
        s.palette.selected = None;
        s.palette.set_enabled("A1", false);
        assert_eq!(s.resolve_paint_color(0, 0).map(|e| e.code.clone()), Some("A2".to_string()));
        s.palette.select("A7");
        assert_eq!(s.resolve_paint_color(0, 0).map(|e| e.code.clone()), Some("A7".to_string()));
    }

    #[test]
    fn auto_snap_picks_nearest_to_base_pixel() {
        let mut s = session(2, 2);
        let mut img = RgbaImage::new(2, 2);
        for p in img.pixels_mut() {
            *p = image::Rgba([230, 60, 50, 255]);
        }
        s.set_base_image(Some(img));
        s.auto_snap = true;
        s.palette.select("A1");
        assert_eq!(s.resolve_paint_color(1, 1).map(|e| e.code.clone()), Some("A5".to_string()));
    }

    #[test]
    fn commit_dispatches_grid_updated() {
        let mut s = session(3, 3);
        let rx = s.subscribe_grid_updated();
        s.paint_code(1, 1, "A2");
        assert!(s.commit());
        let ev = rx.try_recv().ok();
        assert_eq!(ev.map(|e| (e.width, e.height)), Some((3, 3)));
        assert_eq!(ev.map(|e| e.revision), Some(s.history.revision()));
    }

    #[test]
    fn transforms_are_undoable() {
        let mut s = session(3, 2);
        s.paint_code(0, 0, "A1");
        s.commit();
        s.rotate_clockwise();
        assert_eq!((s.canvas.width, s.canvas.height), (2, 3));
        assert!(s.undo());
        assert_eq!((s.canvas.width, s.canvas.height), (3, 2));
        assert_eq!(s.canvas.code_at(0, 0), Some("A1"));
    }
}

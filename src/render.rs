// ============================================================================
// RENDER PIPELINE - layered surfaces, cell fills, grid/axis and selection
// ============================================================================

use ab_glyph::FontArc;
use egui::Color32;
use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::{BaseLayerPosition, CanvasState, SurfaceSize};
use crate::components::palette::{CellKind, DisplayMode, PaletteEntry};
use crate::ops::text::{draw_text_centered, load_label_font};
use crate::selection::{SelectionMode, SelectionPreview, SelectionState};
use crate::util::{axis_font_size, contrast_text_color, lerp_rgb};

/// RGB multiplier applied to non-glow cells in night mode.
pub const NIGHT_FACTOR: f32 = 0.4;
pub const TRANSPARENT_ALPHA: f32 = 0.5;
/// Alpha multiplier for cells that do not match the highlighted code.
pub const HIGHLIGHT_DIM_ALPHA: f32 = 0.25;
pub const CROSS_FADE_MS: u64 = 300;
/// Cells smaller than this never get a code label.
pub const LABEL_MIN_CELL: u32 = 12;

const GRID_MINOR: ([u8; 3], f32) = ([0, 0, 0], 0.16);
const GRID_MAJOR: ([u8; 3], f32) = ([0, 0, 0], 0.38);
const AXIS_TEXT: [u8; 3] = [75, 85, 99];
const SELECTION_FILL: ([u8; 3], f32) = ([59, 130, 246], 0.22);
const SELECTION_EDGE: [u8; 3] = [37, 99, 235];
const PREVIEW_SUBTRACT: [u8; 3] = [220, 38, 38];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PixelShape {
    #[default]
    Square,
    Circle,
}

impl PixelShape {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "square" => Some(Self::Square),
            "circle" | "round" => Some(Self::Circle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Circle => "circle",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOptions {
    pub pixel_shape: PixelShape,
    pub show_codes: bool,
    pub show_grid: bool,
    pub show_axis: bool,
    pub grid_major_every: u32,
    /// Translucent fill behind the cells, if any.
    pub background: Option<Color32>,
    pub base_opacity: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            pixel_shape: PixelShape::Square,
            show_codes: false,
            show_grid: true,
            show_axis: true,
            grid_major_every: 5,
            background: None,
            base_opacity: 0.5,
        }
    }
}

// ============================================================================
// CELL FILL RESOLUTION
// ============================================================================

/// Final paint parameters for one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellFill {
    pub rgb: [u8; 3],
    pub alpha: f32,
    pub pearlescent: bool,
}

impl CellFill {
    /// Channel-wise blend between two fills; `t` in 0..1.
    pub fn lerp(&self, other: &CellFill, t: f32) -> CellFill {
        let t = t.clamp(0.0, 1.0);
        CellFill {
            rgb: lerp_rgb(self.rgb, other.rgb, t),
            alpha: self.alpha + (other.alpha - self.alpha) * t,
            pearlescent: if t < 0.5 { self.pearlescent } else { other.pearlescent },
        }
    }

    pub fn to_color(&self) -> Color32 {
        let a = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Color32::from_rgba_unmultiplied(self.rgb[0], self.rgb[1], self.rgb[2], a)
    }
}

/// Fill for `entry` under `mode`, before highlight dimming.
pub fn resolve_cell_fill(entry: &PaletteEntry, mode: DisplayMode) -> CellFill {
    let stage = entry.stage_for(mode);
    let mut rgb = stage.rgb;
    let mut alpha = stage.alpha;
    if entry.kind == CellKind::Transparent {
        alpha *= TRANSPARENT_ALPHA;
    }
    if mode == DisplayMode::Night && entry.kind != CellKind::Glow {
        rgb = rgb.map(|c| (c as f32 * NIGHT_FACTOR).round() as u8);
    }
    CellFill {
        rgb,
        alpha,
        pearlescent: entry.kind == CellKind::Pearlescent,
    }
}

// ============================================================================
// CROSS-FADE ANIMATION
// ============================================================================

/// Display-mode transition driven by host timestamps (milliseconds).
///
/// A fade that interrupts another one keeps the interrupted fade, frozen at
/// its last progress, as `seed`; its frame is the starting point instead of
/// the plain `from` stage.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossFade {
    pub from: DisplayMode,
    pub to: DisplayMode,
    pub started_at: u64,
    pub duration_ms: u64,
    pub progress: f32,
    pub seed: Option<Box<CrossFade>>,
}

impl CrossFade {
    pub fn start(from: DisplayMode, to: DisplayMode, now_ms: u64) -> Self {
        Self {
            from,
            to,
            started_at: now_ms,
            duration_ms: CROSS_FADE_MS,
            progress: 0.0,
            seed: None,
        }
    }

    /// New fade towards `to` that picks up from whatever `running` shows now.
    pub fn replacing(running: CrossFade, to: DisplayMode, now_ms: u64) -> Self {
        let mut fade = Self::start(running.to, to, now_ms);
        if !running.is_finished() {
            fade.seed = Some(Box::new(running));
        }
        fade
    }

    /// Advance to `now_ms`; returns the new linear progress.
    pub fn step(&mut self, now_ms: u64) -> f32 {
        let elapsed = now_ms.saturating_sub(self.started_at);
        self.progress = if self.duration_ms == 0 {
            1.0
        } else {
            (elapsed as f32 / self.duration_ms as f32).min(1.0)
        };
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.progress >= 1.0
    }

    pub fn fill_for(&self, entry: &PaletteEntry) -> CellFill {
        let start = match &self.seed {
            Some(seed) => seed.fill_for(entry),
            None => resolve_cell_fill(entry, self.from),
        };
        start.lerp(&resolve_cell_fill(entry, self.to), self.progress)
    }
}

// ============================================================================
// SURFACES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Base,
    Main,
    Grid,
    /// Committed selection tint.
    Selection,
    /// Drag feedback (rectangle or move ghost).
    SelectionPreview,
    SelectionOutline,
}

impl LayerKind {
    pub const ALL: [LayerKind; 6] = [
        LayerKind::Base,
        LayerKind::Main,
        LayerKind::Grid,
        LayerKind::Selection,
        LayerKind::SelectionPreview,
        LayerKind::SelectionOutline,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Six same-sized drawing layers. A layer's pixels are only allocated the
/// first time something draws on it.
#[derive(Default)]
pub struct Surfaces {
    size: SurfaceSize,
    layers: [Option<RgbaImage>; 6],
}

impl Surfaces {
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Set the common size. Allocated layers are reallocated to match.
    pub fn resize(&mut self, size: SurfaceSize) {
        if size == self.size {
            return;
        }
        self.size = size;
        for layer in self.layers.iter_mut().flatten() {
            *layer = RgbaImage::new(size.width, size.height);
        }
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&RgbaImage> {
        self.layers[kind.slot()].as_ref()
    }

    /// Cleared layer, allocated at the common size.
    fn clear_layer(&mut self, kind: LayerKind) -> &mut RgbaImage {
        let size = self.size;
        let layer = self.layers[kind.slot()].get_or_insert_with(|| RgbaImage::new(size.width, size.height));
        if layer.dimensions() != (size.width, size.height) {
            *layer = RgbaImage::new(size.width, size.height);
        } else {
            layer.fill(0);
        }
        layer
    }

    /// Clear a layer without allocating one that was never drawn.
    fn wipe(&mut self, kind: LayerKind) {
        if let Some(layer) = self.layers[kind.slot()].as_mut() {
            layer.fill(0);
        }
    }
}

// ============================================================================
// RENDERER
// ============================================================================

pub struct Renderer {
    pub surfaces: Surfaces,
    pub options: RenderOptions,
    display_mode: DisplayMode,
    highlight: Option<String>,
    animation: Option<CrossFade>,
    font_family: String,
    /// `None` until first needed; `Some(None)` when no font could be loaded.
    font: Option<Option<FontArc>>,
    frames_drawn: u64,
}

impl Renderer {
    pub fn new(options: RenderOptions, display_mode: DisplayMode, font_family: impl Into<String>) -> Self {
        Self {
            surfaces: Surfaces::default(),
            options,
            display_mode,
            highlight: None,
            animation: None,
            font_family: font_family.into(),
            font: None,
            frames_drawn: 0,
        }
    }

    fn font(&mut self) -> Option<FontArc> {
        if self.font.is_none() {
            let loaded = load_label_font(&self.font_family);
            if loaded.is_none() {
                crate::log_warn!("render: no usable font for labels (wanted '{}')", self.font_family);
            }
            self.font = Some(loaded);
        }
        self.font.clone().flatten()
    }

    /// Use an already-loaded font for labels.
    pub fn set_font(&mut self, font: Option<FontArc>) {
        self.font = Some(font);
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    // ---- display mode & animation -----------------------------------------

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn animation(&self) -> Option<&CrossFade> {
        self.animation.as_ref()
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Switch display mode. Returns `true` if a cross-fade was started; the
    /// host then calls `step_animation` once per frame. Only grids holding
    /// transitional cells fade, every other switch is instantaneous.
    ///
    /// A fade already in flight is replaced by one starting from its current
    /// frame. Re-selecting the mode a fade is heading to settles it at once.
    pub fn set_display_mode(&mut self, mode: DisplayMode, now_ms: u64, canvas: &CanvasState) -> bool {
        let previous = self.display_mode;
        let running = self.animation.take();
        if mode == previous {
            if running.is_some() {
                self.redraw_canvas(canvas);
            }
            return false;
        }
        self.display_mode = mode;
        if !canvas.has_transitional_cells() {
            self.redraw_canvas(canvas);
            return false;
        }
        let fade = match running {
            Some(running) => CrossFade::replacing(running, mode, now_ms),
            None => CrossFade::start(previous, mode, now_ms),
        };
        self.animation = Some(fade);
        self.redraw_canvas(canvas);
        true
    }

    /// Advance the cross-fade and redraw. Returns whether it is still running.
    pub fn step_animation(&mut self, now_ms: u64, canvas: &CanvasState) -> bool {
        let Some(anim) = self.animation.as_mut() else { return false };
        anim.step(now_ms);
        let finished = anim.is_finished();
        if finished {
            self.animation = None;
        }
        self.redraw_canvas(canvas);
        !finished
    }

    pub fn cancel_animation(&mut self) {
        self.animation = None;
    }

    // ---- highlight --------------------------------------------------------

    pub fn highlight(&self) -> Option<&str> {
        self.highlight.as_deref()
    }

    pub fn set_highlight(&mut self, code: Option<String>) {
        self.highlight = code.filter(|c| !c.is_empty());
    }

    /// Fill for a cell under the current mode, fade and highlight.
    pub fn cell_fill(&self, entry: &PaletteEntry) -> CellFill {
        let mut fill = match &self.animation {
            Some(anim) => anim.fill_for(entry),
            None => resolve_cell_fill(entry, self.display_mode),
        };
        if let Some(code) = &self.highlight
            && entry.code != *code
        {
            fill.alpha *= HIGHLIGHT_DIM_ALPHA;
        }
        fill
    }

    // ---- layers -----------------------------------------------------------

    pub fn resize(&mut self, canvas: &CanvasState) {
        self.surfaces.resize(canvas.surface);
    }

    /// Repaint every cell onto the main layer.
    pub fn redraw_canvas(&mut self, canvas: &CanvasState) {
        self.surfaces.resize(canvas.surface);
        let font = if self.options.show_codes && canvas.cell_size >= LABEL_MIN_CELL {
            self.font()
        } else {
            None
        };
        let fills: Vec<Option<(CellFill, &str)>> = canvas
            .grid()
            .iter()
            .map(|c| c.as_ref().map(|e| (self.cell_fill(e), e.code.as_str())))
            .collect();
        let options = self.options.clone();

        let stride = canvas.surface.width;
        let cs = canvas.cell_size;
        let pad = canvas.axis_padding;
        let grid_w = canvas.width as usize;
        let layer = self.surfaces.clear_layer(LayerKind::Main);
        if canvas.width == 0 || canvas.height == 0 {
            return;
        }
        let band_bytes = (cs * stride * 4) as usize;
        let start = (pad.top * stride * 4) as usize;
        let buf: &mut [u8] = &mut **layer;
        let Some(cell_area) = buf.get_mut(start..) else { return };

        cell_area
            .par_chunks_mut(band_bytes)
            .take(canvas.height as usize)
            .enumerate()
            .for_each(|(y, band)| {
                let band_h = (band.len() / (stride as usize * 4)) as u32;
                if let Some(bg) = options.background {
                    let row_x0 = pad.left;
                    let row_x1 = pad.left + cs * grid_w as u32;
                    fill_rect(band, stride, row_x0, 0, row_x1 - row_x0, band_h, [bg.r(), bg.g(), bg.b()], bg.a() as f32 / 255.0);
                }
                for x in 0..grid_w {
                    let Some((fill, code)) = &fills[y * grid_w + x] else { continue };
                    let x0 = pad.left + x as u32 * cs;
                    draw_cell(band, stride, band_h, x0, cs, fill, options.pixel_shape);
                    if let Some(font) = &font {
                        let text_rgb = contrast_text_color(fill.rgb);
                        let size = (cs as f32 * 0.42).max(6.0);
                        let cx = x0 as f32 + cs as f32 * 0.5;
                        let cy = cs as f32 * 0.5;
                        draw_text_centered(
                            band,
                            stride,
                            band_h,
                            font,
                            code,
                            size,
                            cx,
                            cy,
                            [text_rgb.r(), text_rgb.g(), text_rgb.b()],
                            fill.alpha,
                        );
                    }
                }
            });
        self.frames_drawn += 1;
    }

    /// Grid lines and axis tick labels.
    pub fn render_grid_layer(&mut self, canvas: &CanvasState) {
        self.surfaces.resize(canvas.surface);
        if !self.options.show_grid && !self.options.show_axis {
            self.surfaces.wipe(LayerKind::Grid);
            return;
        }
        let font = if self.options.show_axis { self.font() } else { None };
        let options = self.options.clone();
        let layer = self.surfaces.clear_layer(LayerKind::Grid);
        if canvas.width == 0 || canvas.height == 0 {
            return;
        }
        let cs = canvas.cell_size;
        let pad = canvas.axis_padding;
        let (gw, gh) = (canvas.width, canvas.height);
        let x_end = pad.left + gw * cs;
        let y_end = pad.top + gh * cs;
        let major = options.grid_major_every.max(1);

        if options.show_grid {
            for i in 0..=gw {
                let (rgb, a) = if i % major == 0 || i == gw { GRID_MAJOR } else { GRID_MINOR };
                let x = (pad.left + i * cs).min(x_end.saturating_sub(1));
                for y in pad.top..y_end {
                    blend_at(layer, x, y, rgb, a);
                }
            }
            for j in 0..=gh {
                let (rgb, a) = if j % major == 0 || j == gh { GRID_MAJOR } else { GRID_MINOR };
                let y = (pad.top + j * cs).min(y_end.saturating_sub(1));
                for x in pad.left..x_end {
                    blend_at(layer, x, y, rgb, a);
                }
            }
        }

        if let Some(font) = font {
            let size = axis_font_size(cs);
            let (lw, lh) = layer.dimensions();
            let buf: &mut [u8] = &mut **layer;
            for i in 0..gw {
                if !is_tick(i, gw, major) {
                    continue;
                }
                let label = (i + 1).to_string();
                let cx = (pad.left + i * cs) as f32 + cs as f32 * 0.5;
                draw_text_centered(buf, lw, lh, &font, &label, size, cx, pad.top as f32 * 0.5, AXIS_TEXT, 1.0);
                let by = y_end as f32 + pad.bottom as f32 * 0.5;
                draw_text_centered(buf, lw, lh, &font, &label, size, cx, by, AXIS_TEXT, 1.0);
            }
            for j in 0..gh {
                if !is_tick(j, gh, major) {
                    continue;
                }
                let label = (j + 1).to_string();
                let cy = (pad.top + j * cs) as f32 + cs as f32 * 0.5;
                draw_text_centered(buf, lw, lh, &font, &label, size, pad.left as f32 * 0.5, cy, AXIS_TEXT, 1.0);
                let rx = x_end as f32 + pad.right as f32 * 0.5;
                draw_text_centered(buf, lw, lh, &font, &label, size, rx, cy, AXIS_TEXT, 1.0);
            }
        }
    }

    /// Selection tint, outline, and drag preview.
    pub fn render_selection_layers(&mut self, canvas: &CanvasState) {
        self.surfaces.resize(canvas.surface);
        let sel = &canvas.selection;

        if sel.active {
            let layer = self.surfaces.clear_layer(LayerKind::Selection);
            for_each_selected(sel, |x, y| {
                let (x0, y0) = canvas.cell_origin(x, y);
                fill_image_rect(layer, x0, y0, canvas.cell_size, canvas.cell_size, SELECTION_FILL.0, SELECTION_FILL.1);
            });
            let outline = self.surfaces.clear_layer(LayerKind::SelectionOutline);
            draw_mask_outline(outline, canvas, sel, 0, 0, SELECTION_EDGE, 1.0);
        } else {
            self.surfaces.wipe(LayerKind::Selection);
            self.surfaces.wipe(LayerKind::SelectionOutline);
        }

        match sel.preview {
            Some(SelectionPreview::Rect { mode, x1, y1, x2, y2 }) => {
                let layer = self.surfaces.clear_layer(LayerKind::SelectionPreview);
                let rgb = if mode == SelectionMode::Subtract { PREVIEW_SUBTRACT } else { SELECTION_EDGE };
                let (lx, hx) = (x1.min(x2), x1.max(x2));
                let (ly, hy) = (y1.min(y2), y1.max(y2));
                let (x0, y0) = canvas.cell_origin(lx, ly);
                let w = (hx - lx + 1) * canvas.cell_size;
                let h = (hy - ly + 1) * canvas.cell_size;
                fill_image_rect(layer, x0, y0, w, h, rgb, 0.18);
                stroke_image_rect(layer, x0, y0, w, h, rgb, 0.9);
            }
            Some(SelectionPreview::Move { dx, dy }) => {
                let layer = self.surfaces.clear_layer(LayerKind::SelectionPreview);
                draw_mask_outline(layer, canvas, sel, dx, dy, SELECTION_EDGE, 0.7);
            }
            None => self.surfaces.wipe(LayerKind::SelectionPreview),
        }
    }

    /// Reference image scaled and offset onto the base layer.
    pub fn render_base_layer(&mut self, canvas: &CanvasState) {
        self.surfaces.resize(canvas.surface);
        let base = &canvas.base;
        let Some(image) = base.image.as_ref().filter(|_| base.position != BaseLayerPosition::Hidden) else {
            self.surfaces.wipe(LayerKind::Base);
            return;
        };
        let stride = canvas.surface.width;
        let cs = canvas.cell_size.max(1) as f32;
        let pad = canvas.axis_padding;
        let (iw, ih) = image.dimensions();
        let scale = base.scale.max(f32::EPSILON);
        let (off_x, off_y) = (base.offset_x, base.offset_y);
        let x_end = pad.left + canvas.width * canvas.cell_size;
        let layer = self.surfaces.clear_layer(LayerKind::Base);
        let buf: &mut [u8] = &mut **layer;

        buf.par_chunks_mut(stride as usize * 4)
            .enumerate()
            .skip(pad.top as usize)
            .take((canvas.height * canvas.cell_size) as usize)
            .for_each(|(py, row)| {
                let v = ((py as f32 - pad.top as f32 + 0.5) / cs - off_y) / scale;
                if v < 0.0 || v >= ih as f32 {
                    return;
                }
                for px in pad.left..x_end {
                    let u = ((px as f32 - pad.left as f32 + 0.5) / cs - off_x) / scale;
                    if u < 0.0 || u >= iw as f32 {
                        continue;
                    }
                    let p = image.get_pixel(u as u32, v as u32);
                    let o = px as usize * 4;
                    row[o..o + 4].copy_from_slice(&p.0);
                }
            });
    }

    /// Every layer, in order.
    pub fn render_all(&mut self, canvas: &CanvasState) {
        self.render_base_layer(canvas);
        self.redraw_canvas(canvas);
        self.render_grid_layer(canvas);
        self.render_selection_layers(canvas);
    }
}

fn is_tick(i: u32, count: u32, major: u32) -> bool {
    i == 0 || (i + 1) % major == 0 || i + 1 == count
}

// ============================================================================
// PIXEL HELPERS
// ============================================================================

/// Source-over blend of a straight-alpha color onto one RGBA pixel.
pub fn blend_pixel(dst: &mut [u8], rgb: [u8; 3], alpha: f32) {
    let a = alpha.clamp(0.0, 1.0);
    if a <= 0.0 || dst.len() < 4 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = a + da * (1.0 - a);
    if out_a <= 0.0 {
        return;
    }
    for i in 0..3 {
        let c = (rgb[i] as f32 * a + dst[i] as f32 * da * (1.0 - a)) / out_a;
        dst[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

fn blend_at(img: &mut RgbaImage, x: u32, y: u32, rgb: [u8; 3], alpha: f32) {
    if x < img.width() && y < img.height() {
        blend_pixel(&mut img.get_pixel_mut(x, y).0, rgb, alpha);
    }
}

#[allow(clippy::too_many_arguments)]
fn fill_rect(buf: &mut [u8], stride: u32, x0: u32, y0: u32, w: u32, h: u32, rgb: [u8; 3], alpha: f32) {
    for y in y0..y0 + h {
        for x in x0..(x0 + w).min(stride) {
            let o = (y as usize * stride as usize + x as usize) * 4;
            if let Some(dst) = buf.get_mut(o..o + 4) {
                blend_pixel(dst, rgb, alpha);
            }
        }
    }
}

fn fill_image_rect(img: &mut RgbaImage, x0: u32, y0: u32, w: u32, h: u32, rgb: [u8; 3], alpha: f32) {
    let stride = img.width();
    let buf: &mut [u8] = &mut **img;
    fill_rect(buf, stride, x0, y0, w, h, rgb, alpha);
}

fn stroke_image_rect(img: &mut RgbaImage, x0: u32, y0: u32, w: u32, h: u32, rgb: [u8; 3], alpha: f32) {
    if w == 0 || h == 0 {
        return;
    }
    for x in x0..x0 + w {
        blend_at(img, x, y0, rgb, alpha);
        blend_at(img, x, y0 + h - 1, rgb, alpha);
    }
    for y in y0 + 1..y0 + h - 1 {
        blend_at(img, x0, y, rgb, alpha);
        blend_at(img, x0 + w - 1, y, rgb, alpha);
    }
}

/// Paint one cell into a band that is exactly one cell row tall.
fn draw_cell(band: &mut [u8], stride: u32, band_h: u32, x0: u32, cs: u32, fill: &CellFill, shape: PixelShape) {
    let half = cs as f32 * 0.5;
    let radius = half - 0.5;
    let gloss_cx = cs as f32 * 0.35;
    let gloss_cy = cs as f32 * 0.3;
    let gloss_r = cs as f32 * 0.5;

    for py in 0..cs.min(band_h) {
        for px in 0..cs {
            let fx = px as f32 + 0.5;
            let fy = py as f32 + 0.5;
            let coverage = match shape {
                PixelShape::Square => 1.0,
                PixelShape::Circle => {
                    let d = ((fx - half).powi(2) + (fy - half).powi(2)).sqrt();
                    (radius - d + 0.5).clamp(0.0, 1.0)
                }
            };
            if coverage <= 0.0 {
                continue;
            }
            let rgb = if fill.pearlescent {
                let d = ((fx - gloss_cx).powi(2) + (fy - gloss_cy).powi(2)).sqrt();
                let gloss = (1.0 - d / gloss_r).max(0.0) * 0.55;
                lerp_rgb(fill.rgb, [255, 255, 255], gloss)
            } else {
                fill.rgb
            };
            let o = (py as usize * stride as usize + (x0 + px) as usize) * 4;
            if let Some(dst) = band.get_mut(o..o + 4) {
                blend_pixel(dst, rgb, fill.alpha * coverage);
            }
        }
    }
}

fn for_each_selected(sel: &SelectionState, mut f: impl FnMut(u32, u32)) {
    let Some(b) = sel.bounds else { return };
    for y in b.y..b.y + b.height {
        for x in b.x..b.x + b.width {
            if sel.is_selected(x, y) {
                f(x, y);
            }
        }
    }
}

/// Stroke the cell edges where the mask meets unselected space, shifted by
/// (dx, dy) cells.
fn draw_mask_outline(
    img: &mut RgbaImage,
    canvas: &CanvasState,
    sel: &SelectionState,
    dx: i32,
    dy: i32,
    rgb: [u8; 3],
    alpha: f32,
) {
    let cs = canvas.cell_size as i64;
    let pad = canvas.axis_padding;
    let selected = |x: i64, y: i64| x >= 0 && y >= 0 && sel.is_selected(x as u32, y as u32);
    for_each_selected(sel, |x, y| {
        let (x, y) = (x as i64, y as i64);
        let sx = pad.left as i64 + (x + dx as i64) * cs;
        let sy = pad.top as i64 + (y + dy as i64) * cs;
        let mut line = |x0: i64, y0: i64, horizontal: bool| {
            for k in 0..cs {
                let (px, py) = if horizontal { (x0 + k, y0) } else { (x0, y0 + k) };
                if px >= 0 && py >= 0 {
                    blend_at(img, px as u32, py as u32, rgb, alpha);
                }
            }
        };
        if !selected(x, y - 1) {
            line(sx, sy, true);
        }
        if !selected(x, y + 1) {
            line(sx, sy + cs - 1, true);
        }
        if !selected(x - 1, y) {
            line(sx, sy, false);
        }
        if !selected(x + 1, y) {
            line(sx + cs - 1, sy, false);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::palette::{PaletteEntry, Stage};
    use std::sync::Arc;

    fn headless() -> Renderer {
        let mut r = Renderer::new(RenderOptions::default(), DisplayMode::Standard, "");
        r.set_font(None);
        r
    }

    fn light_entry() -> PaletteEntry {
        PaletteEntry::new("L", Color32::GRAY).with_kind(CellKind::Light).with_transition(
            Stage { rgb: [0, 0, 0], alpha: 1.0 },
            Stage { rgb: [200, 100, 0], alpha: 1.0 },
        )
    }

    #[test]
    fn night_darkens_everything_but_glow() {
        let plain = PaletteEntry::new("P", Color32::from_rgb(100, 200, 50));
        let glow = plain.clone().with_kind(CellKind::Glow);
        assert_eq!(resolve_cell_fill(&plain, DisplayMode::Night).rgb, [40, 80, 20]);
        assert_eq!(resolve_cell_fill(&glow, DisplayMode::Night).rgb, [100, 200, 50]);
    }

    #[test]
    fn transparent_cells_are_half_alpha() {
        let e = PaletteEntry::new("T", Color32::WHITE).with_kind(CellKind::Transparent);
        assert_eq!(resolve_cell_fill(&e, DisplayMode::Standard).alpha, 0.5);
    }

    #[test]
    fn cross_fade_interpolates_linearly() {
        let mut fade = CrossFade::start(DisplayMode::Standard, DisplayMode::Light, 1000);
        fade.step(1150);
        let mid = fade.fill_for(&light_entry());
        assert_eq!(mid.rgb, [100, 50, 0]);
        fade.step(5000);
        assert!(fade.is_finished());
        assert_eq!(fade.fill_for(&light_entry()).rgb, [200, 100, 0]);
    }

    #[test]
    fn mode_switch_only_animates_when_needed() {
        let mut canvas = CanvasState::default();
        canvas.create(2, 2, Some(5.0), None);
        let mut r = headless();
        assert!(!r.set_display_mode(DisplayMode::Light, 0, &canvas));

        // Night darkens plain cells but switches without a fade.
        canvas.set(1, 1, Some(Arc::new(PaletteEntry::new("P", Color32::from_rgb(100, 200, 50)))));
        assert!(!r.set_display_mode(DisplayMode::Night, 5, &canvas));
        assert!(!r.is_animating());
        assert!(!r.set_display_mode(DisplayMode::Light, 6, &canvas));

        canvas.set(0, 0, Some(Arc::new(light_entry())));
        assert!(r.set_display_mode(DisplayMode::Standard, 10, &canvas));
        assert!(r.step_animation(100, &canvas));
        // Switching again replaces the running fade.
        assert!(r.set_display_mode(DisplayMode::Special, 120, &canvas));
        assert_eq!(r.animation().map(|a| a.started_at), Some(120));
        assert!(!r.step_animation(420, &canvas));
        assert!(!r.is_animating());
    }

    fn main_pixel(r: &Renderer, canvas: &CanvasState, x: u32, y: u32) -> Option<[u8; 4]> {
        let layer = r.surfaces.layer(LayerKind::Main)?;
        let (px, py) = canvas.cell_origin(x, y);
        Some(layer.get_pixel(px + 2, py + 2).0)
    }

    #[test]
    fn reselecting_target_mode_settles_the_fade() {
        let mut canvas = CanvasState::default();
        canvas.create(2, 2, Some(6.0), None);
        canvas.set(0, 0, Some(Arc::new(light_entry())));
        let mut r = headless();
        r.redraw_canvas(&canvas);
        assert_eq!(main_pixel(&r, &canvas, 0, 0), Some([0, 0, 0, 255]));

        assert!(r.set_display_mode(DisplayMode::Light, 0, &canvas));
        assert!(r.step_animation(150, &canvas));
        assert_eq!(main_pixel(&r, &canvas, 0, 0), Some([100, 50, 0, 255]));

        assert!(!r.set_display_mode(DisplayMode::Light, 160, &canvas));
        assert!(!r.is_animating());
        assert_eq!(r.display_mode(), DisplayMode::Light);
        assert_eq!(main_pixel(&r, &canvas, 0, 0), Some([200, 100, 0, 255]));
    }

    #[test]
    fn interrupted_fade_continues_from_the_shown_frame() {
        let mut canvas = CanvasState::default();
        canvas.create(2, 2, Some(6.0), None);
        let light = Arc::new(light_entry());
        canvas.set(0, 0, Some(light.clone()));
        let mut r = headless();

        assert!(r.set_display_mode(DisplayMode::Light, 0, &canvas));
        assert!(r.step_animation(150, &canvas));
        assert_eq!(r.cell_fill(&light).rgb, [100, 50, 0]);

        // Turning back halfway starts from the half-faded color, not from Light.
        assert!(r.set_display_mode(DisplayMode::Standard, 150, &canvas));
        assert_eq!(r.cell_fill(&light).rgb, [100, 50, 0]);
        assert_eq!(main_pixel(&r, &canvas, 0, 0), Some([100, 50, 0, 255]));
        assert!(r.step_animation(300, &canvas));
        assert_eq!(r.cell_fill(&light).rgb, [50, 25, 0]);
        assert!(!r.step_animation(450, &canvas));
        assert_eq!(r.cell_fill(&light).rgb, [0, 0, 0]);
    }

    #[test]
    fn highlight_dims_other_codes() {
        let mut r = headless();
        let a = PaletteEntry::new("A", Color32::RED);
        let b = PaletteEntry::new("B", Color32::RED);
        r.set_highlight(Some("A".into()));
        assert_eq!(r.cell_fill(&a).alpha, 1.0);
        assert_eq!(r.cell_fill(&b).alpha, HIGHLIGHT_DIM_ALPHA);
        r.set_highlight(Some(String::new()));
        assert_eq!(r.highlight(), None);
    }

    #[test]
    fn main_layer_paints_cells_inside_padding() {
        let mut canvas = CanvasState::default();
        canvas.create(3, 2, Some(6.0), None);
        canvas.set(1, 1, Some(Arc::new(PaletteEntry::new("X", Color32::from_rgb(10, 20, 30)))));
        let mut r = headless();
        r.redraw_canvas(&canvas);
        let main = r.surfaces.layer(LayerKind::Main).map(|l| l.dimensions());
        assert_eq!(main, Some((canvas.surface.width, canvas.surface.height)));
        let Some(layer) = r.surfaces.layer(LayerKind::Main) else { return };
        let (x0, y0) = canvas.cell_origin(1, 1);
        assert_eq!(layer.get_pixel(x0 + 2, y0 + 2).0, [10, 20, 30, 255]);
        let (ex, ey) = canvas.cell_origin(0, 0);
        assert_eq!(layer.get_pixel(ex + 2, ey + 2).0[3], 0);
    }

    #[test]
    fn layers_are_lazily_allocated_and_same_size() {
        let mut canvas = CanvasState::default();
        canvas.create(4, 4, Some(5.0), None);
        let mut r = headless();
        r.render_all(&canvas);
        assert!(r.surfaces.layer(LayerKind::Selection).is_none());
        canvas.selection.set_rect(0, 0, 1, 1);
        r.render_selection_layers(&canvas);
        let sizes: Vec<_> = LayerKind::ALL
            .iter()
            .filter_map(|k| r.surfaces.layer(*k).map(|l| l.dimensions()))
            .collect();
        assert!(sizes.iter().all(|s| *s == (canvas.surface.width, canvas.surface.height)));
    }
}

use std::fmt;

use egui::{Pos2, Vec2};

use crate::project::Session;
use crate::selection::{SelectionMode, SelectionPreview};
use crate::settings::EditorSettings;
use crate::util::line_cells;

/// Zoom factor per wheel notch.
pub const WHEEL_ZOOM_STEP: f32 = 1.1;

// ============================================================================
// TOOLS & INPUT EVENTS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Pencil,
    Bucket,
    Eyedropper,
    Selection,
}

impl Tool {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pencil" => Some(Tool::Pencil),
            "bucket" | "fill" => Some(Tool::Bucket),
            "eyedropper" | "picker" => Some(Tool::Eyedropper),
            "selection" | "select" => Some(Tool::Selection),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
    Pen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointerButton {
    #[default]
    Primary,
    Middle,
    Secondary,
}

impl PointerButton {
    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
}

/// A normalized pointer sample in host-element device pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u64,
    pub kind: PointerKind,
    pub button: PointerButton,
    pub pos: Pos2,
    pub time_ms: u64,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(pointer_id: u64, kind: PointerKind, button: PointerButton, pos: Pos2, time_ms: u64) -> Self {
        Self {
            pointer_id,
            kind,
            button,
            pos,
            time_ms,
            modifiers: Modifiers::default(),
        }
    }

    pub fn mouse(button: PointerButton, pos: Pos2, time_ms: u64) -> Self {
        Self::new(1, PointerKind::Mouse, button, pos, time_ms)
    }

    pub fn touch(pointer_id: u64, pos: Pos2, time_ms: u64) -> Self {
        Self::new(pointer_id, PointerKind::Touch, PointerButton::Primary, pos, time_ms)
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerEvent),
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    PointerCancel(PointerEvent),
    Wheel { pos: Pos2, delta: Vec2, modifiers: Modifiers },
    SpaceDown,
    SpaceUp,
}

// ============================================================================
// HOST SEAM
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The pointer is no longer active on the host element.
    UnknownPointer(u64),
    Rejected(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::UnknownPointer(id) => write!(f, "pointer {} is not active", id),
            HostError::Rejected(msg) => write!(f, "host rejected capture: {}", msg),
        }
    }
}

impl std::error::Error for HostError {}

/// The element receiving pointer input. Capture is best-effort: failures are
/// logged and otherwise ignored.
pub trait PointerHost {
    fn set_pointer_capture(&mut self, pointer_id: u64) -> Result<(), HostError>;
    fn release_pointer_capture(&mut self, pointer_id: u64) -> Result<(), HostError>;
}

/// Host without capture support (headless drivers, scripts).
pub struct NoCapture;

impl PointerHost for NoCapture {
    fn set_pointer_capture(&mut self, _pointer_id: u64) -> Result<(), HostError> {
        Ok(())
    }

    fn release_pointer_capture(&mut self, _pointer_id: u64) -> Result<(), HostError> {
        Ok(())
    }
}

fn capture(host: &mut dyn PointerHost, pointer_id: u64) {
    if let Err(e) = host.set_pointer_capture(pointer_id) {
        crate::log_warn!("pointer capture ignored: {}", e);
    }
}

fn release(host: &mut dyn PointerHost, pointer_id: u64) {
    if let Err(e) = host.release_pointer_capture(pointer_id) {
        crate::log_warn!("pointer release ignored: {}", e);
    }
}

// ============================================================================
// INTERACTION STATE
// ============================================================================

type CellPos = (i64, i64);

/// The single interaction in progress.
#[derive(Clone, Debug, PartialEq)]
pub enum Interaction {
    Idle,
    Paint {
        pointer: u64,
        last: CellPos,
        changed: bool,
    },
    Pan {
        pointer: u64,
        last: Pos2,
    },
    BaseMove {
        pointer: u64,
        last: Pos2,
        moved: bool,
    },
    /// Touch down, waiting to see whether it becomes a paint, a tap or a
    /// long-press pan.
    Pending {
        pointer: u64,
        origin: Pos2,
        started_at: u64,
        modifiers: Modifiers,
    },
    SelectionAdd {
        pointer: u64,
        anchor: CellPos,
        current: CellPos,
        mode: SelectionMode,
    },
    SelectionSubtract {
        pointer: u64,
        anchor: CellPos,
        current: CellPos,
    },
    SelectionMove {
        pointer: u64,
        anchor: CellPos,
        dx: i32,
        dy: i32,
    },
    Pinch {
        first: (u64, Pos2),
        second: (u64, Pos2),
        start_distance: f32,
        start_value: f32,
        /// Scaling the reference image rather than zooming.
        base: bool,
    },
}

impl Interaction {
    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Idle => "idle",
            Interaction::Paint { .. } => "paint",
            Interaction::Pan { .. } => "pan",
            Interaction::BaseMove { .. } => "baseMove",
            Interaction::Pending { .. } => "pending",
            Interaction::SelectionAdd { .. } => "selection-add",
            Interaction::SelectionSubtract { .. } => "selection-subtract",
            Interaction::SelectionMove { .. } => "selection-move",
            Interaction::Pinch { .. } => "pinch",
        }
    }

    fn owns(&self, pointer_id: u64) -> bool {
        match self {
            Interaction::Idle => false,
            Interaction::Paint { pointer, .. }
            | Interaction::Pan { pointer, .. }
            | Interaction::BaseMove { pointer, .. }
            | Interaction::Pending { pointer, .. }
            | Interaction::SelectionAdd { pointer, .. }
            | Interaction::SelectionSubtract { pointer, .. }
            | Interaction::SelectionMove { pointer, .. } => *pointer == pointer_id,
            Interaction::Pinch { first, second, .. } => first.0 == pointer_id || second.0 == pointer_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureConfig {
    pub long_press_ms: u64,
    pub move_tolerance_px: f32,
    pub double_tap_ms: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press_ms: 450,
            move_tolerance_px: 8.0,
            double_tap_ms: 350,
        }
    }
}

impl From<&EditorSettings> for GestureConfig {
    fn from(s: &EditorSettings) -> Self {
        Self {
            long_press_ms: s.long_press_ms,
            move_tolerance_px: s.move_tolerance_px,
            double_tap_ms: s.double_tap_ms,
        }
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Turns abstract pointer input into edits on a `Session`.
pub struct InteractionController {
    pub tool: Tool,
    pub config: GestureConfig,
    state: Interaction,
    space_held: bool,
    /// Active touch points, in arrival order.
    touches: Vec<(u64, Pos2)>,
    last_click: [Option<u64>; 3],
    last_tap: Option<u64>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

impl InteractionController {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            tool: Tool::Pencil,
            config,
            state: Interaction::Idle,
            space_held: false,
            touches: Vec::new(),
            last_click: [None; 3],
            last_tap: None,
        }
    }

    pub fn state(&self) -> &Interaction {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == Interaction::Idle
    }

    pub fn handle(&mut self, session: &mut Session, host: &mut dyn PointerHost, event: InputEvent) {
        match event {
            InputEvent::PointerDown(ev) => self.on_down(session, host, ev),
            InputEvent::PointerMove(ev) => self.on_move(session, host, ev),
            InputEvent::PointerUp(ev) => self.on_up(session, host, ev, false),
            InputEvent::PointerCancel(ev) => self.on_up(session, host, ev, true),
            InputEvent::Wheel { pos, delta, modifiers } => self.on_wheel(session, pos, delta, modifiers),
            InputEvent::SpaceDown => self.space_held = true,
            InputEvent::SpaceUp => self.space_held = false,
        }
    }

    /// Timer hook: turns an expired long-press into a pan. Returns whether it
    /// did.
    pub fn tick(&mut self, now_ms: u64) -> bool {
        if let Interaction::Pending { pointer, origin, started_at, .. } = self.state
            && now_ms.saturating_sub(started_at) >= self.config.long_press_ms
        {
            self.state = Interaction::Pan { pointer, last: origin };
            return true;
        }
        false
    }

    // ---- down --------------------------------------------------------------

    fn on_down(&mut self, s: &mut Session, host: &mut dyn PointerHost, ev: PointerEvent) {
        if ev.kind == PointerKind::Touch {
            self.touches.retain(|(id, _)| *id != ev.pointer_id);
            self.touches.push((ev.pointer_id, ev.pos));
            if self.touches.len() >= 2 {
                self.start_pinch(s, host);
                return;
            }
        }
        if self.state != Interaction::Idle {
            return;
        }

        let double = self.register_click(&ev);
        match ev.button {
            PointerButton::Middle => {
                if double {
                    s.reset_view();
                } else {
                    self.begin_pan(host, ev);
                }
                return;
            }
            PointerButton::Secondary => {
                self.begin_pan(host, ev);
                return;
            }
            PointerButton::Primary => {}
        }

        if self.space_held {
            self.begin_pan(host, ev);
            return;
        }
        if s.canvas.base.editing && s.canvas.base.image.is_some() {
            capture(host, ev.pointer_id);
            self.state = Interaction::BaseMove { pointer: ev.pointer_id, last: ev.pos, moved: false };
            return;
        }
        if ev.kind == PointerKind::Touch {
            if double {
                s.reset_view();
                return;
            }
            capture(host, ev.pointer_id);
            self.state = Interaction::Pending {
                pointer: ev.pointer_id,
                origin: ev.pos,
                started_at: ev.time_ms,
                modifiers: ev.modifiers,
            };
            return;
        }
        self.state = self.begin_tool(s, host, ev.pointer_id, ev.pos, ev.modifiers, double);
    }

    /// Record a press and report whether it completes a double-click (or
    /// double-tap for touch) on the same button.
    fn register_click(&mut self, ev: &PointerEvent) -> bool {
        let window = self.config.double_tap_ms;
        let slot = if ev.kind == PointerKind::Touch {
            &mut self.last_tap
        } else {
            &mut self.last_click[ev.button.slot()]
        };
        let double = slot.is_some_and(|t| ev.time_ms.saturating_sub(t) <= window);
        *slot = if double { None } else { Some(ev.time_ms) };
        double
    }

    fn begin_pan(&mut self, host: &mut dyn PointerHost, ev: PointerEvent) {
        capture(host, ev.pointer_id);
        self.state = Interaction::Pan { pointer: ev.pointer_id, last: ev.pos };
    }

    /// Start the current tool's action at `pos`; returns the new state.
    fn begin_tool(
        &mut self,
        s: &mut Session,
        host: &mut dyn PointerHost,
        pointer: u64,
        pos: Pos2,
        modifiers: Modifiers,
        double: bool,
    ) -> Interaction {
        let cell = cell_at(s, pos);
        match self.tool {
            Tool::Pencil => {
                capture(host, pointer);
                let changed = paint_cell(s, cell) > 0;
                if changed {
                    s.redraw_canvas();
                }
                Interaction::Paint { pointer, last: cell, changed }
            }
            Tool::Bucket => {
                if let Some((x, y)) = in_bounds(s, cell)
                    && let Some(entry) = s.resolve_paint_color(x, y)
                    && s.bucket_fill(x, y, &Some(entry)) > 0
                {
                    s.commit();
                }
                Interaction::Idle
            }
            Tool::Eyedropper => {
                if let Some((x, y)) = in_bounds(s, cell) {
                    s.pick_color(x, y);
                }
                Interaction::Idle
            }
            Tool::Selection => {
                if double {
                    if s.canvas.selection.active {
                        s.clear_selection();
                        s.commit();
                    }
                    return Interaction::Idle;
                }
                capture(host, pointer);
                if modifiers.alt {
                    set_rect_preview(s, SelectionMode::Subtract, cell, cell);
                    Interaction::SelectionSubtract { pointer, anchor: cell, current: cell }
                } else if !modifiers.shift && in_bounds(s, cell).is_some_and(|(x, y)| s.is_cell_selected(x, y)) {
                    s.set_selection_preview(Some(SelectionPreview::Move { dx: 0, dy: 0 }));
                    Interaction::SelectionMove { pointer, anchor: cell, dx: 0, dy: 0 }
                } else {
                    let mode = if modifiers.shift { SelectionMode::Add } else { SelectionMode::Replace };
                    set_rect_preview(s, mode, cell, cell);
                    Interaction::SelectionAdd { pointer, anchor: cell, current: cell, mode }
                }
            }
        }
    }

    fn start_pinch(&mut self, s: &mut Session, host: &mut dyn PointerHost) {
        // Whatever was running is cancelled first.
        let previous = std::mem::replace(&mut self.state, Interaction::Idle);
        if let Some(pointer) = single_pointer(&previous) {
            self.finish(s, host, previous, pointer, true);
        }
        let (Some(&first), Some(&second)) = (self.touches.first(), self.touches.get(1)) else { return };
        let base = s.canvas.base.editing && s.canvas.base.image.is_some();
        let start_value = if base { s.canvas.base.scale } else { s.canvas.zoom_value };
        self.state = Interaction::Pinch {
            first,
            second,
            start_distance: first.1.distance(second.1).max(1.0),
            start_value,
            base,
        };
    }

    // ---- move --------------------------------------------------------------

    fn on_move(&mut self, s: &mut Session, host: &mut dyn PointerHost, ev: PointerEvent) {
        if ev.kind == PointerKind::Touch
            && let Some(t) = self.touches.iter_mut().find(|(id, _)| *id == ev.pointer_id)
        {
            t.1 = ev.pos;
        }
        if !self.state.owns(ev.pointer_id) {
            return;
        }
        let state = std::mem::replace(&mut self.state, Interaction::Idle);
        self.state = match state {
            Interaction::Paint { pointer, last, changed } => {
                let cell = cell_at(s, ev.pos);
                let mut painted = 0;
                if cell != last {
                    let line = line_cells(clamp_i32(last.0), clamp_i32(last.1), clamp_i32(cell.0), clamp_i32(cell.1));
                    for (x, y) in line.into_iter().skip(1) {
                        painted += paint_cell(s, (x as i64, y as i64));
                    }
                }
                if painted > 0 {
                    s.redraw_canvas();
                }
                Interaction::Paint { pointer, last: cell, changed: changed || painted > 0 }
            }
            Interaction::Pan { pointer, last } => {
                s.pan_by(ev.pos - last);
                Interaction::Pan { pointer, last: ev.pos }
            }
            Interaction::BaseMove { pointer, last, .. } => {
                let delta = (ev.pos - last) / s.canvas.visual_cell_size().max(f32::EPSILON);
                s.move_base(delta.x, delta.y);
                Interaction::BaseMove { pointer, last: ev.pos, moved: true }
            }
            Interaction::Pending { pointer, origin, modifiers, .. } => {
                if ev.pos.distance(origin) > self.config.move_tolerance_px {
                    // Early movement: this is a stroke, not a long-press.
                    self.state = self.begin_tool(s, host, pointer, origin, modifiers, false);
                    self.on_move(s, host, ev);
                    return;
                }
                state
            }
            Interaction::SelectionAdd { pointer, anchor, mode, .. } => {
                let current = cell_at(s, ev.pos);
                set_rect_preview(s, mode, anchor, current);
                Interaction::SelectionAdd { pointer, anchor, current, mode }
            }
            Interaction::SelectionSubtract { pointer, anchor, .. } => {
                let current = cell_at(s, ev.pos);
                set_rect_preview(s, SelectionMode::Subtract, anchor, current);
                Interaction::SelectionSubtract { pointer, anchor, current }
            }
            Interaction::SelectionMove { pointer, anchor, .. } => {
                let cell = cell_at(s, ev.pos);
                let dx = clamp_i32(cell.0 - anchor.0);
                let dy = clamp_i32(cell.1 - anchor.1);
                s.set_selection_preview(Some(SelectionPreview::Move { dx, dy }));
                Interaction::SelectionMove { pointer, anchor, dx, dy }
            }
            Interaction::Pinch { mut first, mut second, start_distance, start_value, base } => {
                if first.0 == ev.pointer_id {
                    first.1 = ev.pos;
                } else {
                    second.1 = ev.pos;
                }
                let ratio = first.1.distance(second.1) / start_distance;
                let mid = Pos2::new((first.1.x + second.1.x) * 0.5, (first.1.y + second.1.y) * 0.5);
                if base {
                    let (cx, cy) = s.canvas.screen_to_cell_f32(mid);
                    s.scale_base_around(start_value * ratio, cx, cy);
                } else {
                    s.zoom_around(start_value * ratio, mid);
                }
                Interaction::Pinch { first, second, start_distance, start_value, base }
            }
            Interaction::Idle => Interaction::Idle,
        };
    }

    // ---- up / cancel -------------------------------------------------------

    fn on_up(&mut self, s: &mut Session, host: &mut dyn PointerHost, ev: PointerEvent, cancelled: bool) {
        if ev.kind == PointerKind::Touch {
            self.touches.retain(|(id, _)| *id != ev.pointer_id);
        }
        if !self.state.owns(ev.pointer_id) {
            return;
        }
        let state = std::mem::replace(&mut self.state, Interaction::Idle);

        // A touch released before the long-press deadline is a tap.
        if let Interaction::Pending { pointer, origin, modifiers, .. } = state {
            if cancelled {
                release(host, pointer);
                return;
            }
            let next = self.begin_tool(s, host, pointer, origin, modifiers, false);
            self.finish(s, host, next, pointer, false);
            return;
        }
        self.finish(s, host, state, ev.pointer_id, cancelled);
    }

    /// End `state`, committing what it produced (or discarding drags when
    /// cancelled), and return to idle.
    fn finish(&mut self, s: &mut Session, host: &mut dyn PointerHost, state: Interaction, pointer: u64, cancelled: bool) {
        match state {
            // Painted cells are already on the grid; keep history in step.
            Interaction::Paint { changed, .. } => {
                if changed {
                    s.commit();
                }
            }
            Interaction::BaseMove { moved, .. } => {
                if moved {
                    s.commit();
                }
            }
            Interaction::SelectionAdd { anchor, current, mode, .. } => {
                s.canvas.selection.preview = None;
                if !cancelled {
                    s.canvas.selection.apply_rect(anchor.0, anchor.1, current.0, current.1, mode);
                    s.commit();
                }
                s.render_selection();
            }
            Interaction::SelectionSubtract { anchor, current, .. } => {
                s.canvas.selection.preview = None;
                if !cancelled {
                    s.canvas.selection.subtract_rect(anchor.0, anchor.1, current.0, current.1);
                    s.commit();
                }
                s.render_selection();
            }
            Interaction::SelectionMove { dx, dy, .. } => {
                s.canvas.selection.preview = None;
                if !cancelled && (dx != 0 || dy != 0) {
                    s.move_selection(dx, dy);
                }
                s.render_selection();
            }
            Interaction::Pinch { base, .. } => {
                if base {
                    s.commit();
                }
            }
            Interaction::Pan { .. } | Interaction::Pending { .. } | Interaction::Idle => {}
        }
        release(host, pointer);
        self.state = Interaction::Idle;
    }

    // ---- wheel -------------------------------------------------------------

    fn on_wheel(&mut self, s: &mut Session, pos: Pos2, delta: Vec2, modifiers: Modifiers) {
        if !modifiers.ctrl {
            s.pan_by(-delta);
            return;
        }
        let factor = if delta.y < 0.0 {
            WHEEL_ZOOM_STEP
        } else if delta.y > 0.0 {
            1.0 / WHEEL_ZOOM_STEP
        } else {
            return;
        };
        if s.canvas.base.editing && s.canvas.base.image.is_some() {
            let (cx, cy) = s.canvas.screen_to_cell_f32(pos);
            let scale = s.canvas.base.scale * factor;
            s.scale_base_around(scale, cx, cy);
        } else {
            let zoom = s.canvas.zoom_value * factor;
            s.zoom_around(zoom, pos);
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn cell_at(s: &Session, pos: Pos2) -> CellPos {
    let (fx, fy) = s.canvas.screen_to_cell_f32(pos);
    (fx.floor() as i64, fy.floor() as i64)
}

fn in_bounds(s: &Session, cell: CellPos) -> Option<(u32, u32)> {
    s.canvas.in_bounds(cell.0, cell.1).then_some((cell.0 as u32, cell.1 as u32))
}

fn paint_cell(s: &mut Session, cell: CellPos) -> usize {
    match in_bounds(s, cell) {
        Some((x, y)) => s.paint_at(x, y),
        None => 0,
    }
}

fn clamp_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn clamp_cell(s: &Session, cell: CellPos) -> (u32, u32) {
    let max_x = s.canvas.width.saturating_sub(1) as i64;
    let max_y = s.canvas.height.saturating_sub(1) as i64;
    (cell.0.clamp(0, max_x) as u32, cell.1.clamp(0, max_y) as u32)
}

fn set_rect_preview(s: &mut Session, mode: SelectionMode, a: CellPos, b: CellPos) {
    let (x1, y1) = clamp_cell(s, a);
    let (x2, y2) = clamp_cell(s, b);
    s.set_selection_preview(Some(SelectionPreview::Rect { mode, x1, y1, x2, y2 }));
}

fn single_pointer(state: &Interaction) -> Option<u64> {
    match state {
        Interaction::Idle | Interaction::Pinch { .. } => None,
        Interaction::Paint { pointer, .. }
        | Interaction::Pan { pointer, .. }
        | Interaction::BaseMove { pointer, .. }
        | Interaction::Pending { pointer, .. }
        | Interaction::SelectionAdd { pointer, .. }
        | Interaction::SelectionSubtract { pointer, .. }
        | Interaction::SelectionMove { pointer, .. } => Some(*pointer),
    }
}

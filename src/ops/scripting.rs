// ============================================================================
// Scripting: Rhai-based sandboxed driving of an editor session
// ============================================================================
//
// Scripts run synchronously on the calling thread against a `Session`. Grid
// edits (paint/erase/fill/selection) accumulate until `commit()`; transforms
// and undo/redo commit on their own. Anything left uncommitted when the
// script ends is committed by the runner.

use std::sync::{Arc, Mutex};

use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, Scope};

use crate::components::palette::DisplayMode;
use crate::ops::canvas_ops::ResizeAnchor;
use crate::project::Session;
use crate::render::CROSS_FADE_MS;
use crate::symmetry::SymmetryMode;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ScriptError {
    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|l| *l > 0),
            column: pos.position().filter(|c| *c > 0),
        }
    }

    /// Error explanation with line/column context and a hint where one helps.
    pub fn friendly_message(&self) -> String {
        let raw = &self.message;
        let mut parts = Vec::new();

        match (self.line, self.column) {
            (Some(line), Some(col)) => parts.push(format!("Error on line {}, column {}:", line, col)),
            (Some(line), None) => parts.push(format!("Error on line {}:", line)),
            _ => parts.push("Script error:".to_string()),
        }

        let cleaned = raw.split(" (line ").next().unwrap_or(raw);
        if raw.contains("Function not found:") {
            parts.push(format!("  Could not find function: {}", cleaned.trim_start_matches("Function not found: ")));
            parts.push(String::new());
            parts.push("  Tip: grid functions take integer coordinates, e.g. paint(3, 4, \"A1\").".to_string());
        } else if raw.contains("Variable not found:") {
            if let Some(var_part) = raw.split("Variable not found:").nth(1) {
                let var_name = var_part.split('(').next().unwrap_or(var_part).trim();
                parts.push(format!("  Variable '{}' is not defined.", var_name));
                parts.push(String::new());
                parts.push("  Tip: Make sure you declared it with 'let' before using it.".to_string());
            } else {
                parts.push(format!("  {}", cleaned));
            }
        } else if raw.contains("Syntax error") || raw.contains("Expected") {
            parts.push(format!("  Syntax error: {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: Check for missing semicolons, brackets, or typos near this line.".to_string());
        } else if raw.contains("Too many operations") {
            parts.push("  Script exceeded the maximum operation limit (50 million ops).".to_string());
            parts.push(String::new());
            parts.push("  Tip: Your script may have an infinite loop.".to_string());
        } else if raw.contains("Unknown palette code") {
            parts.push(format!("  {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: used_colors() lists the codes on the grid; palette codes are case-sensitive.".to_string());
        } else {
            parts.push(format!("  {}", cleaned));
        }

        parts.join("\n")
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

/// What a finished script leaves behind besides its edits.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    pub console_output: Vec<String>,
    pub elapsed_ms: u64,
}

// ============================================================================
// Script context: shared mutable state between engine and host functions
// ============================================================================

struct ScriptContext {
    session: Session,
    console_output: Vec<String>,
    /// Virtual clock driving display-mode fades, in milliseconds.
    clock_ms: u64,
}

type SharedContext = Arc<Mutex<ScriptContext>>;

type HostResult<T> = Result<T, Box<EvalAltResult>>;

fn host_error<T>(msg: String) -> HostResult<T> {
    Err(msg.into())
}

fn coord(v: i64) -> Option<u32> {
    u32::try_from(v).ok()
}

// ============================================================================
// Engine construction with sandbox + API registration
// ============================================================================

fn create_engine(ctx: SharedContext) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(50_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(1_000);

    register_grid_api(&mut engine, ctx.clone());
    register_selection_api(&mut engine, ctx.clone());
    register_view_api(&mut engine, ctx.clone());
    register_transform_api(&mut engine, ctx.clone());
    register_utility_api(&mut engine, ctx);

    engine
}

// ============================================================================
// Grid API
// ============================================================================

fn register_grid_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("width", move || -> i64 {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.canvas.width as i64
    });

    let c = ctx.clone();
    engine.register_fn("height", move || -> i64 {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.canvas.height as i64
    });

    // cell(x, y) → code string, or () for an empty / out-of-range cell
    let c = ctx.clone();
    engine.register_fn("cell", move |x: i64, y: i64| -> Dynamic {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        match (coord(x), coord(y)) {
            (Some(x), Some(y)) => lock
                .session
                .canvas
                .code_at(x, y)
                .map(|code| Dynamic::from(code.to_string()))
                .unwrap_or(Dynamic::UNIT),
            _ => Dynamic::UNIT,
        }
    });

    // paint(x, y, code) → number of cells changed (symmetry included)
    let c = ctx.clone();
    engine.register_fn("paint", move |x: i64, y: i64, code: ImmutableString| -> HostResult<i64> {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        if lock.session.palette.get(code.as_str()).is_none() {
            return host_error(format!("Unknown palette code '{}'", code));
        }
        let (Some(x), Some(y)) = (coord(x), coord(y)) else { return Ok(0) };
        Ok(lock.session.paint_code(x, y, code.as_str()) as i64)
    });

    let c = ctx.clone();
    engine.register_fn("erase", move |x: i64, y: i64| -> i64 {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(x), Some(y)) = (coord(x), coord(y)) else { return 0 };
        lock.session.erase_at(x, y) as i64
    });

    // fill(x, y, code) → cells filled; respects the selection
    let c = ctx.clone();
    engine.register_fn("fill", move |x: i64, y: i64, code: ImmutableString| -> HostResult<i64> {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = lock.session.palette.get(code.as_str()).cloned() else {
            return host_error(format!("Unknown palette code '{}'", code));
        };
        let (Some(x), Some(y)) = (coord(x), coord(y)) else { return Ok(0) };
        Ok(lock.session.bucket_fill(x, y, &Some(entry)) as i64)
    });

    let c = ctx.clone();
    engine.register_fn("set_symmetry", move |name: ImmutableString| -> HostResult<()> {
        let Some(mode) = SymmetryMode::parse(name.as_str()) else {
            return host_error(format!("Unknown symmetry mode '{}'", name));
        };
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.set_symmetry_mode(mode);
        Ok(())
    });

    // used_colors() → [#{code, count}, ...] sorted by code
    let c = ctx;
    engine.register_fn("used_colors", move || -> Array {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session
            .get_used_colors()
            .into_iter()
            .map(|u| {
                let mut m = Map::new();
                m.insert("code".into(), Dynamic::from(u.code));
                m.insert("count".into(), Dynamic::from(u.count as i64));
                Dynamic::from_map(m)
            })
            .collect()
    });
}

// ============================================================================
// Selection API
// ============================================================================

fn register_selection_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("select_rect", move |x1: i64, y1: i64, x2: i64, y2: i64| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.set_selection_rect(x1, y1, x2, y2);
    });

    let c = ctx.clone();
    engine.register_fn("add_selection", move |x1: i64, y1: i64, x2: i64, y2: i64| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.add_selection_rect(x1, y1, x2, y2);
    });

    let c = ctx.clone();
    engine.register_fn("subtract_selection", move |x1: i64, y1: i64, x2: i64, y2: i64| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.subtract_selection_rect(x1, y1, x2, y2);
    });

    let c = ctx.clone();
    engine.register_fn("invert_selection", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.invert_selection();
    });

    let c = ctx.clone();
    engine.register_fn("clear_selection", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.clear_selection();
    });

    let c = ctx.clone();
    engine.register_fn("is_selected", move |x: i64, y: i64| -> bool {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        match (coord(x), coord(y)) {
            (Some(x), Some(y)) => lock.session.is_cell_selected(x, y),
            _ => false,
        }
    });

    // move_selection(dx, dy) → false without an active selection
    let c = ctx;
    engine.register_fn("move_selection", move |dx: i64, dy: i64| -> bool {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        lock.session.move_selection(clamp(dx), clamp(dy))
    });
}

// ============================================================================
// View API
// ============================================================================

fn register_view_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("set_zoom", move |value: i64| -> i64 {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.set_cell_size(value as f32);
        lock.session.canvas.cell_size as i64
    });

    let c = ctx.clone();
    engine.register_fn("set_zoom", move |value: f64| -> i64 {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.set_cell_size(value as f32);
        lock.session.canvas.cell_size as i64
    });

    // Fades run to completion on the script's virtual clock.
    let c = ctx;
    engine.register_fn("set_display_mode", move |name: ImmutableString| -> HostResult<()> {
        let Some(mode) = DisplayMode::parse(name.as_str()) else {
            return host_error(format!("Unknown display mode '{}'", name));
        };
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        let now = lock.clock_ms;
        if lock.session.set_display_mode(mode, now) {
            lock.clock_ms += CROSS_FADE_MS;
            let end = lock.clock_ms;
            lock.session.step_animation(end);
        }
        Ok(())
    });
}

// ============================================================================
// Transform & history API
// ============================================================================

fn register_transform_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("flip_h", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.flip_horizontal();
    });

    let c = ctx.clone();
    engine.register_fn("flip_v", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.flip_vertical();
    });

    let c = ctx.clone();
    engine.register_fn("rotate_cw", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.rotate_clockwise();
    });

    let c = ctx.clone();
    engine.register_fn("rotate_ccw", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.rotate_counter_clockwise();
    });

    let c = ctx.clone();
    engine.register_fn("resize", move |w: i64, h: i64| -> bool {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(w), Some(h)) = (coord(w), coord(h)) else { return false };
        lock.session.resize_grid(w, h, ResizeAnchor::TopLeft)
    });

    let c = ctx.clone();
    engine.register_fn("resize", move |w: i64, h: i64, anchor: ImmutableString| -> HostResult<bool> {
        let Some(anchor) = ResizeAnchor::parse(anchor.as_str()) else {
            return host_error(format!("Unknown anchor '{}'", anchor));
        };
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(w), Some(h)) = (coord(w), coord(h)) else { return Ok(false) };
        Ok(lock.session.resize_grid(w, h, anchor))
    });

    let c = ctx.clone();
    engine.register_fn("clear", move || {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.clear_grid();
    });

    let c = ctx.clone();
    engine.register_fn("commit", move || -> bool {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.commit()
    });

    let c = ctx.clone();
    engine.register_fn("undo", move || -> bool {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.undo()
    });

    let c = ctx;
    engine.register_fn("redo", move || -> bool {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.session.redo()
    });
}

// ============================================================================
// Utility API
// ============================================================================

fn register_utility_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.on_print(move |msg| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.console_output.push(msg.to_string());
    });

    let c = ctx;
    engine.on_debug(move |msg, _src, pos| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.console_output.push(format!("[debug {}] {}", pos, msg));
    });

    engine.register_fn("clamp", |v: i64, lo: i64, hi: i64| -> i64 { v.max(lo).min(hi) });
    engine.register_fn("abs", |x: i64| -> i64 { x.abs() });
    engine.register_fn("min", |a: i64, b: i64| -> i64 { a.min(b) });
    engine.register_fn("max", |a: i64, b: i64| -> i64 { a.max(b) });
}

// ============================================================================
// Public execution API
// ============================================================================

/// Check a script for syntax errors without running it.
pub fn compile_script(source: &str) -> Result<(), ScriptError> {
    let engine = Engine::new();
    engine
        .compile(source)
        .map(|_| ())
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))
}

/// Run `source` against `session` on the calling thread.
///
/// Edits made before an error stay on the grid and are committed, so a
/// failed script can still be undone in one step.
pub fn run_script(session: &mut Session, source: &str) -> Result<ScriptOutput, ScriptError> {
    let start = std::time::Instant::now();
    let ctx = Arc::new(Mutex::new(ScriptContext {
        session: std::mem::take(session),
        console_output: Vec::new(),
        clock_ms: 0,
    }));

    let result = {
        let engine = create_engine(ctx.clone());
        let mut scope = Scope::new();
        engine
            .compile(source)
            .map_err(|e| ScriptError::at(e.to_string(), e.position()))
            .and_then(|ast| {
                engine
                    .run_ast_with_scope(&mut scope, &ast)
                    .map_err(|e| ScriptError::at(e.to_string(), e.position()))
            })
    };

    let mut lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    *session = std::mem::take(&mut lock.session);
    let console_output = std::mem::take(&mut lock.console_output);
    drop(lock);

    session.commit();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => {
            crate::log_info!("script: finished in {} ms ({} console lines)", elapsed_ms, console_output.len());
            Ok(ScriptOutput { console_output, elapsed_ms })
        }
        Err(e) => {
            crate::log_err!("script: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::CreateOptions;

    fn session() -> Session {
        let mut s = Session::default();
        s.renderer.set_font(None);
        s.create_canvas(6, 4, CreateOptions { cell_size: Some(5.0), created_at: None });
        s
    }

    #[test]
    fn paints_and_reports_usage() {
        let mut s = session();
        let out = run_script(
            &mut s,
            r#"
                for x in 0..3 { paint(x, 0, "A5"); }
                paint(5, 3, "A1");
                commit();
                for u in used_colors() { print(u.code + "=" + u.count); }
            "#,
        )
        .unwrap();
        assert_eq!(out.console_output, vec!["A1=1".to_string(), "A5=3".to_string()]);
        assert_eq!(s.canvas.code_at(2, 0), Some("A5"));
        assert!(s.history.can_undo());
    }

    #[test]
    fn uncommitted_edits_are_committed_at_the_end() {
        let mut s = session();
        let before = s.history.len();
        run_script(&mut s, r#"paint(0, 0, "A2"); erase(0, 0); paint(1, 1, "A3");"#).unwrap();
        assert_eq!(s.history.len(), before + 1);
        assert_eq!(s.canvas.code_at(1, 1), Some("A3"));
    }

    #[test]
    fn cell_reads_back_codes_and_unit() {
        let mut s = session();
        let out = run_script(
            &mut s,
            r#"
                paint(1, 2, "A7");
                print(cell(1, 2));
                print(type_of(cell(0, 0)));
                print(type_of(cell(-1, 99)));
            "#,
        )
        .unwrap();
        assert_eq!(out.console_output, vec!["A7", "()", "()"]);
    }

    #[test]
    fn unknown_code_is_a_located_error() {
        let mut s = session();
        let err = run_script(&mut s, "let a = 1;\npaint(0, 0, \"ZZ\");").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("Unknown palette code"));
        assert!(err.friendly_message().starts_with("Error on line 2"));
    }

    #[test]
    fn syntax_errors_are_reported_before_running() {
        assert!(compile_script("let x = ;").is_err());
        assert!(compile_script("paint(0, 0, \"A1\");").is_ok());
        let mut s = session();
        assert!(run_script(&mut s, "paint(0, 0 \"A1\");").is_err());
        assert_eq!(s.canvas.filled_count(), 0);
    }

    #[test]
    fn transforms_selection_and_history() {
        let mut s = session();
        run_script(
            &mut s,
            r#"
                paint(0, 0, "A5");
                commit();
                rotate_cw();
                if width() != 4 || height() != 6 { throw "rotate failed"; }
                undo();
                select_rect(0, 0, 0, 0);
                move_selection(2, 1);
                commit();
            "#,
        )
        .unwrap();
        assert_eq!((s.canvas.width, s.canvas.height), (6, 4));
        assert_eq!(s.canvas.code_at(2, 1), Some("A5"));
        assert_eq!(s.canvas.code_at(0, 0), None);
    }

    #[test]
    fn runaway_script_hits_operation_limit() {
        let mut s = session();
        let err = run_script(&mut s, "loop { }").unwrap_err();
        assert!(err.friendly_message().contains("maximum operation limit"));
    }
}

//! Integration tests for grid-level properties
//!
//! Zoom caps on large canvases, symmetry orbits, selection bookkeeping,
//! bucket-fill containment, the color-usage cache and display-mode switches.

use std::sync::Arc;

use beadcanvas::canvas::{Cell, CanvasState, MAX_CELL_SIZE, MIN_CELL_SIZE, dynamic_zoom_limit};
use beadcanvas::components::color_usage::{ColorUsage, count_codes};
use beadcanvas::symmetry::{SymmetryMode, compute_symmetry_targets};
use beadcanvas::{CreateOptions, DisplayMode, PaletteEntry, Session};
use egui::Color32;

fn setup_session(width: u32, height: u32) -> Session {
    let mut session = Session::default();
    session.renderer.set_font(None);
    assert!(session.create_canvas(width, height, CreateOptions { cell_size: Some(5.0), created_at: None }));
    session
}

fn usage(code: &str, count: usize) -> ColorUsage {
    ColorUsage { code: code.to_string(), count }
}

fn assert_selection_consistent(s: &Session) {
    let sel = &s.canvas.selection;
    assert_eq!(sel.active, sel.bounds.is_some());
    if let (Some(bounds), Some(mask)) = (sel.bounds, sel.mask.as_ref()) {
        for (i, selected) in mask.iter().enumerate() {
            if *selected {
                let x = i as u32 % s.canvas.width;
                let y = i as u32 / s.canvas.width;
                assert!(bounds.contains(x, y), "({}, {}) outside {:?}", x, y, bounds);
            }
        }
    }
}

#[test]
fn test_large_canvas_caps_cell_size() {
    let mut canvas = CanvasState::default();
    assert!(canvas.create(600, 600, Some(40.0), None));
    let cap = ((canvas.default_cell_size as f32 * 1.5).round() as u32).clamp(MIN_CELL_SIZE, MAX_CELL_SIZE);
    assert!(canvas.cell_size <= cap);
    assert!(canvas.cell_size < MAX_CELL_SIZE);
    assert_eq!(dynamic_zoom_limit(600, 600, canvas.default_cell_size), cap);

    // Small canvases keep the full range.
    let mut small = CanvasState::default();
    assert!(small.create(16, 16, Some(40.0), None));
    assert_eq!(small.cell_size, MAX_CELL_SIZE);
}

#[test]
fn test_invalid_dimensions_are_refused() {
    let mut s = setup_session(4, 4);
    assert!(!s.create_canvas(0, 10, CreateOptions::default()));
    assert!(!s.create_canvas(1025, 10, CreateOptions::default()));
    assert_eq!((s.canvas.width, s.canvas.height), (4, 4));
    assert!(s.create_canvas(1024, 1, CreateOptions::default()));
}

#[test]
fn test_octagonal_orbit_of_corner_is_the_four_corners() {
    let mut targets = compute_symmetry_targets(SymmetryMode::Octagonal, 0, 0, 8, 8);
    targets.sort();
    assert_eq!(targets, vec![(0, 0), (0, 7), (7, 0), (7, 7)]);

    // Every orbit contains its seed and stays on the grid.
    for (x, y) in [(3, 1), (5, 6), (2, 2)] {
        let orbit = compute_symmetry_targets(SymmetryMode::Octagonal, x, y, 8, 8);
        assert!(orbit.contains(&(x, y)));
        assert!(orbit.iter().all(|(tx, ty)| *tx < 8 && *ty < 8));
        assert!(orbit.len() <= 8);
    }
}

#[test]
fn test_selection_invariant_holds_through_mutations() {
    let mut s = setup_session(8, 6);
    assert_selection_consistent(&s);
    s.set_selection_rect(1, 1, 3, 3);
    assert_selection_consistent(&s);
    s.add_selection_rect(6, 4, 7, 5);
    assert_selection_consistent(&s);
    s.subtract_selection_rect(0, 0, 7, 3);
    assert_selection_consistent(&s);
    assert!(!s.is_cell_selected(2, 2));
    s.invert_selection();
    assert_selection_consistent(&s);
    s.shift_selection_mask(-3, 2);
    assert_selection_consistent(&s);
    s.subtract_selection_rect(-10, -10, 20, 20);
    assert_selection_consistent(&s);
    assert!(!s.canvas.selection.active);
    s.set_selection_rect(-5, -5, 1, 1);
    assert_selection_consistent(&s);
    assert!(s.is_cell_selected(0, 0));
    s.clear_selection();
    assert_selection_consistent(&s);
}

#[test]
fn test_bucket_fill_stays_in_region_and_selection() {
    let mut s = setup_session(6, 6);
    // A vertical wall of A2 at x = 3 splits the grid.
    for y in 0..6 {
        s.paint_code(3, y, "A2");
    }
    s.commit();
    let before: Vec<Cell> = s.canvas.grid().to_vec();

    let fill = s.palette.get("A7").cloned();
    s.set_selection_rect(0, 0, 5, 2);
    let filled = s.bucket_fill(0, 0, &fill);
    assert_eq!(filled, 9);

    for y in 0..6 {
        for x in 0..6 {
            let was = before[(y * 6 + x) as usize].as_ref().map(|e| e.code.as_str());
            let now = s.canvas.code_at(x, y);
            if now != was {
                assert_eq!(was, None, "changed a cell of another code at ({}, {})", x, y);
                assert!(s.is_cell_selected(x, y), "painted outside selection at ({}, {})", x, y);
            }
        }
    }

    // Start outside the selection: nothing happens.
    assert_eq!(s.bucket_fill(0, 5, &fill), 0);
}

#[test]
fn test_used_colors_match_a_rescan() {
    let mut s = setup_session(3, 3);
    let a = s.palette.insert(PaletteEntry::new("A", Color32::RED));
    let b = s.palette.insert(PaletteEntry::new("B", Color32::BLUE));
    for (x, y) in [(0, 0), (1, 0), (2, 0), (0, 1), (1, 1)] {
        s.paint_cell(x, y, &Some(a.clone()));
    }
    for (x, y) in [(2, 1), (0, 2)] {
        s.paint_cell(x, y, &Some(b.clone()));
    }
    s.commit();
    assert_eq!(s.get_used_colors(), vec![usage("A", 5), usage("B", 2)]);

    s.erase_at(0, 0);
    s.paint_cell(2, 2, &Some(Arc::clone(&b)));
    s.commit();
    let cached = s.get_used_colors();
    assert_eq!(cached, count_codes(s.canvas.grid()));
    assert_eq!(cached, vec![usage("A", 4), usage("B", 3)]);

    assert!(s.undo());
    assert_eq!(s.get_used_colors(), vec![usage("A", 5), usage("B", 2)]);
}

#[test]
fn test_used_colors_sort_codes_numerically() {
    let mut s = setup_session(4, 1);
    for (x, code) in ["A10", "A2", "A1", "A10"].iter().enumerate() {
        s.paint_code(x as u32, 0, code);
    }
    s.commit();
    let codes: Vec<String> = s.get_used_colors().into_iter().map(|u| u.code).collect();
    assert_eq!(codes, vec!["A1", "A2", "A10"]);
}

#[test]
fn test_night_switch_without_transitional_cells_is_instant() {
    let mut s = setup_session(2, 2);
    s.paint_code(0, 0, "A5");
    s.commit();
    assert!(!s.set_display_mode(DisplayMode::Night, 0));
    assert!(!s.renderer.is_animating());
    assert_eq!(s.renderer.display_mode(), DisplayMode::Night);
    assert!(!s.set_display_mode(DisplayMode::Standard, 10));
    assert!(!s.step_animation(20));
}

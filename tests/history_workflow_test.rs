//! Integration tests for history on a live session
//!
//! Covers the paint/undo/redo scenario on codes "01"/"02", dedup of
//! unchanged saves, long undo/redo walks and the 50-entry cap.

use beadcanvas::components::history::MAX_HISTORY;
use beadcanvas::{CreateOptions, Palette, PaletteEntry, Session};
use beadcanvas::settings::EditorSettings;

/// Session with a two-color palette ("01" white, "02" red) on a w×h grid
fn setup_session(width: u32, height: u32) -> Session {
    let mut palette = Palette::new();
    for (code, css) in [("01", "#ffffff"), ("02", "#e53935")] {
        palette.insert(PaletteEntry::from_css(code, css).expect("valid css"));
    }
    let mut session = Session::new(EditorSettings::default(), palette);
    session.renderer.set_font(None);
    assert!(session.create_canvas(width, height, CreateOptions::default()));
    session
}

fn codes(session: &Session) -> Vec<Option<String>> {
    session
        .canvas
        .grid()
        .iter()
        .map(|c| c.as_ref().map(|e| e.code.clone()))
        .collect()
}

#[test]
fn test_paint_undo_redo_scenario() {
    let mut s = setup_session(4, 4);

    s.paint_code(0, 0, "01");
    s.save_history();
    s.paint_code(3, 3, "02");
    s.save_history();

    assert!(s.undo());
    assert_eq!(s.canvas.code_at(0, 0), Some("01"));
    assert_eq!(s.canvas.code_at(3, 3), None);

    assert!(s.redo());
    assert_eq!(s.canvas.code_at(3, 3), Some("02"));
    assert_eq!(s.canvas.code_at(0, 0), Some("01"));
}

#[test]
fn test_save_without_mutation_is_idempotent() {
    let mut s = setup_session(4, 4);
    s.paint_code(1, 2, "02");
    assert!(s.save_history());
    let len = s.history.len();

    assert!(!s.save_history());
    assert!(!s.save_history());
    assert_eq!(s.history.len(), len);

    // Re-painting the same code is not a mutation either.
    s.paint_code(1, 2, "02");
    assert!(!s.save_history());
    assert_eq!(s.history.len(), len);
}

#[test]
fn test_undo_redo_walk_restores_final_grid() {
    let mut s = setup_session(6, 5);
    let steps = 12;
    for i in 0..steps {
        let code = if i % 2 == 0 { "01" } else { "02" };
        s.paint_code(i % 6, i / 6, code);
        assert!(s.save_history(), "step {} should be a new state", i);
    }
    let final_grid = codes(&s);

    for _ in 0..steps {
        assert!(s.undo());
    }
    assert!(!s.undo());
    assert_eq!(s.canvas.filled_count(), 0);

    for _ in 0..steps {
        assert!(s.redo());
    }
    assert!(!s.redo());
    assert_eq!(codes(&s), final_grid);
}

#[test]
fn test_history_is_capped_and_evicts_oldest_first() {
    let mut s = setup_session(10, 10);
    // Baseline + 60 distinct states: cell i gets painted at step i.
    for i in 0..60u32 {
        s.paint_code(i % 10, i / 10, "01");
        s.commit();
    }
    assert!(s.history.len() <= MAX_HISTORY);
    assert_eq!(s.history.len(), MAX_HISTORY);

    // The survivors are the newest 50 states: filled counts 11..=60.
    let oldest = s.history.snapshot(0).expect("oldest snapshot");
    assert_eq!(oldest.grid.iter().filter(|c| c.is_some()).count(), 11);

    let mut undos = 0;
    while s.undo() {
        undos += 1;
    }
    assert_eq!(undos, MAX_HISTORY - 1);
    assert_eq!(s.canvas.filled_count(), 11);
}

#[test]
fn test_new_edit_after_undo_drops_redo_branch() {
    let mut s = setup_session(3, 3);
    s.paint_code(0, 0, "01");
    s.commit();
    s.paint_code(1, 0, "01");
    s.commit();
    assert!(s.undo());
    assert!(s.history.can_redo());

    s.paint_code(2, 2, "02");
    s.commit();
    assert!(!s.history.can_redo());
    assert_eq!(s.canvas.code_at(1, 0), None);
    assert_eq!(s.canvas.code_at(2, 2), Some("02"));
}

#[test]
fn test_undo_restores_selection_with_grid() {
    let mut s = setup_session(5, 5);
    s.set_selection_rect(1, 1, 2, 2);
    s.commit();
    s.clear_selection();
    s.commit();
    assert!(!s.canvas.selection.active);

    assert!(s.undo());
    assert!(s.canvas.selection.active);
    assert!(s.is_cell_selected(2, 2));
    assert!(!s.is_cell_selected(3, 3));
}

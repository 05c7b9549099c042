use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use egui::Color32;

use crate::util::{color_distance, compare_codes, parse_color};

// ============================================================================
// DISPLAY MODE
// ============================================================================

/// Global rendering mode. Transitional entries pick their visual stage from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    #[default]
    Standard,
    Light,
    Temperature,
    Special,
    Night,
}

impl DisplayMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(DisplayMode::Standard),
            "light" => Some(DisplayMode::Light),
            "temperature" | "temperatrue" => Some(DisplayMode::Temperature),
            "special" => Some(DisplayMode::Special),
            "night" => Some(DisplayMode::Night),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Standard => "standard",
            DisplayMode::Light => "light",
            DisplayMode::Temperature => "temperature",
            DisplayMode::Special => "special",
            DisplayMode::Night => "night",
        }
    }

    pub fn all() -> &'static [DisplayMode] {
        &[
            DisplayMode::Standard,
            DisplayMode::Light,
            DisplayMode::Temperature,
            DisplayMode::Special,
            DisplayMode::Night,
        ]
    }
}

// ============================================================================
// PALETTE ENTRY
// ============================================================================

/// Material of a bead/cell color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CellKind {
    #[default]
    Normal,
    Pearlescent,
    /// Changes appearance under light (transitional).
    Light,
    /// Changes appearance with temperature (transitional).
    Temperature,
    Transparent,
    Glow,
}

impl CellKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Some(CellKind::Normal),
            "pearlescent" => Some(CellKind::Pearlescent),
            "light" => Some(CellKind::Light),
            // Palette files in the wild spell it "temperatrue".
            "temperature" | "temperatrue" => Some(CellKind::Temperature),
            "transparent" => Some(CellKind::Transparent),
            "glow" => Some(CellKind::Glow),
            _ => None,
        }
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self, CellKind::Light | CellKind::Temperature)
    }
}

/// One resolved visual state of a color.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stage {
    pub rgb: [u8; 3],
    pub alpha: f32,
}

impl Stage {
    pub fn from_color(color: Color32) -> Self {
        Self {
            rgb: [color.r(), color.g(), color.b()],
            alpha: color.a() as f32 / 255.0,
        }
    }

    pub fn to_color(&self) -> Color32 {
        let a = (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Color32::from_rgba_unmultiplied(self.rgb[0], self.rgb[1], self.rgb[2], a)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
}

/// A named palette color. Cells hold shared references to these.
#[derive(Clone, Debug, PartialEq)]
pub struct PaletteEntry {
    pub code: String,
    /// Source CSS color string as imported.
    pub css: String,
    pub rgb: [u8; 3],
    pub kind: CellKind,
    pub transition: Option<Transition>,
}

impl PaletteEntry {
    pub fn new(code: impl Into<String>, color: Color32) -> Self {
        Self {
            code: code.into(),
            css: crate::util::to_hex(color),
            rgb: [color.r(), color.g(), color.b()],
            kind: CellKind::Normal,
            transition: None,
        }
    }

    /// Build from a CSS color string; `None` if the color does not parse.
    pub fn from_css(code: impl Into<String>, css: &str) -> Option<Self> {
        let color = parse_color(css)?;
        let mut entry = Self::new(code, color);
        entry.css = css.trim().to_string();
        Some(entry)
    }

    pub fn with_kind(mut self, kind: CellKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach two stages; only meaningful for transitional kinds.
    pub fn with_transition(mut self, from: Stage, to: Stage) -> Self {
        self.transition = Some(Transition { from, to });
        self
    }

    pub fn is_transitional(&self) -> bool {
        self.kind.is_transitional() && self.transition.is_some()
    }

    /// Stage shown under `mode`, before night darkening and kind effects.
    pub fn stage_for(&self, mode: DisplayMode) -> Stage {
        let base = Stage { rgb: self.rgb, alpha: 1.0 };
        let Some(t) = self.transition.filter(|_| self.kind.is_transitional()) else {
            return base;
        };
        let use_to = match self.kind {
            CellKind::Light => matches!(mode, DisplayMode::Light | DisplayMode::Special),
            CellKind::Temperature => matches!(mode, DisplayMode::Temperature | DisplayMode::Special),
            _ => false,
        };
        if use_to { t.to } else { t.from }
    }
}

/// Shared handle stored in grid cells.
pub type CellRef = Arc<PaletteEntry>;

// ============================================================================
// PALETTE
// ============================================================================

/// Palette table: `code → entry`, with codes kept in locale-numeric order.
#[derive(Clone, Debug, Default)]
pub struct Palette {
    entries: HashMap<String, CellRef>,
    keys: Vec<String>,
    disabled: HashSet<String>,
    pub selected: Option<String>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// 16 neutral-to-saturated colors, `A1`..`A16`.
    pub fn builtin() -> Self {
        const COLORS: [&str; 16] = [
            "#ffffff", "#000000", "#7f7f7f", "#c3c3c3", "#e53935", "#fb8c00", "#fdd835", "#43a047",
            "#00897b", "#1e88e5", "#3949ab", "#8e24aa", "#d81b60", "#6d4c41", "#f8bbd0", "#b3e5fc",
        ];
        let mut palette = Self::new();
        for (i, css) in COLORS.iter().enumerate() {
            if let Some(entry) = PaletteEntry::from_css(format!("A{}", i + 1), css) {
                palette.insert(entry);
            }
        }
        palette
    }

    /// Insert or replace an entry. Replacing creates a new shared reference, so
    /// cells painted earlier keep pointing at the old entry.
    pub fn insert(&mut self, entry: PaletteEntry) -> CellRef {
        let code = entry.code.clone();
        let handle = Arc::new(entry);
        if self.entries.insert(code.clone(), handle.clone()).is_none() {
            let pos = self
                .keys
                .binary_search_by(|k| compare_codes(k, &code))
                .unwrap_or_else(|p| p);
            self.keys.insert(pos, code);
        }
        handle
    }

    pub fn remove(&mut self, code: &str) -> Option<CellRef> {
        let removed = self.entries.remove(code)?;
        self.keys.retain(|k| k != code);
        self.disabled.remove(code);
        if self.selected.as_deref() == Some(code) {
            self.selected = None;
        }
        Some(removed)
    }

    pub fn get(&self, code: &str) -> Option<&CellRef> {
        self.entries.get(code)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_enabled(&self, code: &str) -> bool {
        self.entries.contains_key(code) && !self.disabled.contains(code)
    }

    pub fn set_enabled(&mut self, code: &str, enabled: bool) {
        if enabled {
            self.disabled.remove(code);
        } else if self.entries.contains_key(code) {
            self.disabled.insert(code.to_string());
        }
    }

    pub fn select(&mut self, code: &str) -> bool {
        if self.entries.contains_key(code) {
            self.selected = Some(code.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected_entry(&self) -> Option<&CellRef> {
        self.selected.as_deref().and_then(|c| self.entries.get(c))
    }

    pub fn first_enabled(&self) -> Option<&CellRef> {
        self.keys
            .iter()
            .find(|k| !self.disabled.contains(*k))
            .and_then(|k| self.entries.get(k))
    }

    /// Nearest enabled entry by weighted RGB distance. Ties keep the first key.
    pub fn nearest(&self, rgb: [u8; 3]) -> Option<&CellRef> {
        let mut best: Option<(&CellRef, f32)> = None;
        for key in &self.keys {
            if self.disabled.contains(key) {
                continue;
            }
            let Some(entry) = self.entries.get(key) else { continue };
            let d = color_distance(entry.rgb, rgb);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((entry, d));
            }
        }
        best.map(|(e, _)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_stay_sorted() {
        let mut p = Palette::new();
        for code in ["10", "2", "B1", "1"] {
            p.insert(PaletteEntry::new(code, Color32::BLACK));
        }
        assert_eq!(p.keys(), &["1", "2", "10", "B1"]);
    }

    #[test]
    fn replacing_entry_does_not_touch_old_handles() {
        let mut p = Palette::new();
        let old = p.insert(PaletteEntry::new("01", Color32::RED));
        p.insert(PaletteEntry::new("01", Color32::BLUE));
        assert_eq!(old.rgb, [255, 0, 0]);
        assert_eq!(p.get("01").map(|e| e.rgb), Some([0, 0, 255]));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn nearest_skips_disabled_entries() {
        let mut p = Palette::new();
        p.insert(PaletteEntry::new("red", Color32::from_rgb(250, 0, 0)));
        p.insert(PaletteEntry::new("dark", Color32::from_rgb(90, 0, 0)));
        assert_eq!(p.nearest([240, 10, 10]).map(|e| e.code.as_str()), Some("red"));
        p.set_enabled("red", false);
        assert_eq!(p.nearest([240, 10, 10]).map(|e| e.code.as_str()), Some("dark"));
        assert_eq!(p.first_enabled().map(|e| e.code.as_str()), Some("dark"));
    }

    #[test]
    fn transitional_stage_follows_display_mode() {
        let from = Stage { rgb: [10, 10, 10], alpha: 1.0 };
        let to = Stage { rgb: [200, 200, 0], alpha: 0.8 };
        let light = PaletteEntry::new("L1", Color32::GRAY)
            .with_kind(CellKind::Light)
            .with_transition(from, to);
        assert_eq!(light.stage_for(DisplayMode::Standard), from);
        assert_eq!(light.stage_for(DisplayMode::Light), to);
        assert_eq!(light.stage_for(DisplayMode::Special), to);
        assert_eq!(light.stage_for(DisplayMode::Temperature), from);

        let temp = PaletteEntry::new("T1", Color32::GRAY)
            .with_kind(CellKind::parse("temperatrue").unwrap_or_default())
            .with_transition(from, to);
        assert_eq!(temp.stage_for(DisplayMode::Temperature), to);
        assert_eq!(temp.stage_for(DisplayMode::Light), from);
    }
}

use std::path::{Path, PathBuf};

use egui::Color32;

use crate::canvas::{DEFAULT_CELL_SIZE, MAX_CELL_SIZE, MIN_CELL_SIZE};
use crate::components::palette::DisplayMode;
use crate::render::{PixelShape, RenderOptions};

/// Editor settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Cell size a new canvas starts at; also drives the large-canvas zoom cap
    pub default_cell_size: u32,
    pub pixel_shape: PixelShape,
    /// Draw palette codes inside cells
    pub show_codes: bool,
    pub show_grid: bool,
    pub show_axis: bool,
    /// Every Nth grid line is drawn heavier
    pub grid_major_every: u32,
    /// Translucent fill behind cells (`None` = transparent)
    pub background: Option<Color32>,
    /// Opacity of the reference image when drawn over the cells
    pub base_opacity: f32,
    /// Paint with the palette color nearest to the reference image pixel
    pub auto_snap: bool,
    pub display_mode: DisplayMode,

    // Pointer gestures
    pub long_press_ms: u64,
    pub move_tolerance_px: f32,
    pub double_tap_ms: u64,

    /// Label font family; empty = system sans-serif
    pub font_family: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            default_cell_size: DEFAULT_CELL_SIZE,
            pixel_shape: PixelShape::Square,
            show_codes: false,
            show_grid: true,
            show_axis: true,
            grid_major_every: 5,
            background: None,
            base_opacity: 0.5,
            auto_snap: false,
            display_mode: DisplayMode::Standard,
            long_press_ms: 450,
            move_tolerance_px: 8.0,
            double_tap_ms: 350,
            font_family: String::new(),
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/beadcanvas/beadcanvas_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\BeadCanvas\beadcanvas_settings.cfg
    /// On macOS:   ~/Library/Application Support/BeadCanvas/beadcanvas_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("beadcanvas");
            return Some(config_dir.join("beadcanvas_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("BeadCanvas").join("beadcanvas_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("BeadCanvas")
                    .join("beadcanvas_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("beadcanvas_settings.cfg")))
        }
    }

    /// Serialize a Color32 as "r,g,b,a"
    fn color_to_str(c: Option<Color32>) -> String {
        match c {
            Some(c) => format!("{},{},{},{}", c.r(), c.g(), c.b(), c.a()),
            None => "none".to_string(),
        }
    }

    /// Parse "r,g,b,a" (or "none")
    fn str_to_color(s: &str) -> Option<Option<Color32>> {
        if s.eq_ignore_ascii_case("none") {
            return Some(None);
        }
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != 4 {
            return None;
        }
        let r = parts[0].trim().parse::<u8>().ok()?;
        let g = parts[1].trim().parse::<u8>().ok()?;
        let b = parts[2].trim().parse::<u8>().ok()?;
        let a = parts[3].trim().parse::<u8>().ok()?;
        Some(Some(Color32::from_rgba_unmultiplied(r, g, b, a)))
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "default_cell_size={}\n\
             pixel_shape={}\n\
             show_codes={}\n\
             show_grid={}\n\
             show_axis={}\n\
             grid_major_every={}\n\
             background={}\n\
             base_opacity={}\n\
             auto_snap={}\n\
             display_mode={}\n\
             long_press_ms={}\n\
             move_tolerance_px={}\n\
             double_tap_ms={}\n\
             font_family={}\n",
            self.default_cell_size,
            self.pixel_shape.as_str(),
            self.show_codes,
            self.show_grid,
            self.show_axis,
            self.grid_major_every,
            Self::color_to_str(self.background),
            self.base_opacity,
            self.auto_snap,
            self.display_mode.as_str(),
            self.long_press_ms,
            self.move_tolerance_px,
            self.double_tap_ms,
            self.font_family,
        )
    }

    /// Parse `key=value` lines over the defaults. Unknown keys and bad values
    /// are skipped.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "default_cell_size" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.default_cell_size = v.clamp(MIN_CELL_SIZE, MAX_CELL_SIZE);
                    }
                }
                "pixel_shape" => {
                    if let Some(shape) = PixelShape::parse(val) {
                        s.pixel_shape = shape;
                    }
                }
                "show_codes" => s.show_codes = val == "true",
                "show_grid" => s.show_grid = val == "true",
                "show_axis" => s.show_axis = val == "true",
                "grid_major_every" => {
                    s.grid_major_every = val.parse::<u32>().ok().filter(|v| *v > 0).unwrap_or(5);
                }
                "background" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.background = c;
                    }
                }
                "base_opacity" => {
                    s.base_opacity = val.parse::<f32>().map(|v| v.clamp(0.0, 1.0)).unwrap_or(0.5);
                }
                "auto_snap" => s.auto_snap = val == "true",
                "display_mode" => {
                    if let Some(mode) = DisplayMode::parse(val) {
                        s.display_mode = mode;
                    }
                }
                "long_press_ms" => s.long_press_ms = val.parse().unwrap_or(450),
                "move_tolerance_px" => s.move_tolerance_px = val.parse().unwrap_or(8.0),
                "double_tap_ms" => s.double_tap_ms = val.parse().unwrap_or(350),
                "font_family" => s.font_family = val.to_string(),
                _ => {}
            }
        }
        s
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        if let Some(path) = Self::settings_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = std::fs::write(path, self.to_config_string()) {
            crate::log_warn!("settings: could not write {}: {}", path.display(), e);
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            pixel_shape: self.pixel_shape,
            show_codes: self.show_codes,
            show_grid: self.show_grid,
            show_axis: self.show_axis,
            grid_major_every: self.grid_major_every.max(1),
            background: self.background,
            base_opacity: self.base_opacity,
        }
    }
}

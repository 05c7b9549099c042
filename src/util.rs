// ============================================================================
// SHARED HELPERS: clamps, axis padding, color parsing and distance
// ============================================================================

use std::cmp::Ordering;

use egui::Color32;

/// Gap in device pixels between the grid edge and the axis tick labels.
pub const AXIS_GAP: u32 = 4;
/// Smallest / largest font size used for axis tick labels.
pub const AXIS_FONT_MIN: f32 = 8.0;
pub const AXIS_FONT_MAX: f32 = 16.0;

/// Clamp that maps NaN to `min` instead of propagating it.
pub fn clamp_f32(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Padding around the cell area, reserved for axis tick labels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxisPadding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl AxisPadding {
    pub fn horizontal(&self) -> u32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> u32 {
        self.top + self.bottom
    }
}

/// Font size of the axis labels for a given cell size.
pub fn axis_font_size(cell_size: u32) -> f32 {
    clamp_f32((cell_size as f32 * 0.5).round(), AXIS_FONT_MIN, AXIS_FONT_MAX)
}

/// Padding big enough to hold the widest tick label (the largest index on
/// either axis) on every side of the grid.
pub fn compute_axis_padding(cell_size: u32, width: u32, height: u32) -> AxisPadding {
    let font = axis_font_size(cell_size);
    let digits = width.max(height).max(1).to_string().len() as f32;
    let label_w = (digits * font * 0.62).ceil() as u32 + AXIS_GAP * 2;
    let label_h = font.ceil() as u32 + AXIS_GAP * 2;
    AxisPadding {
        top: label_h,
        right: label_w,
        bottom: label_h,
        left: label_w,
    }
}

// ----------------------------------------------------------------------------
// Colors
// ----------------------------------------------------------------------------

/// Parse a CSS color string: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`,
/// `rgb(r, g, b)`, `rgba(r, g, b, a)` or `transparent`.
pub fn parse_color(input: &str) -> Option<Color32> {
    let s = input.trim().to_ascii_lowercase();
    if s == "transparent" {
        return Some(Color32::TRANSPARENT);
    }
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    let (body, has_alpha) = if let Some(b) = s.strip_prefix("rgba(") {
        (b, true)
    } else if let Some(b) = s.strip_prefix("rgb(") {
        (b, false)
    } else {
        return None;
    };
    let body = body.strip_suffix(')')?;
    let parts: Vec<&str> = body.split(',').map(|p| p.trim()).collect();
    let expected = if has_alpha { 4 } else { 3 };
    if parts.len() != expected {
        return None;
    }
    let channel = |p: &str| -> Option<u8> {
        let v = p.parse::<f32>().ok()?;
        Some(clamp_f32(v.round(), 0.0, 255.0) as u8)
    };
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = if has_alpha {
        let a = parts[3].parse::<f32>().ok()?;
        (clamp_f32(a, 0.0, 1.0) * 255.0).round() as u8
    } else {
        255
    };
    Some(Color32::from_rgba_unmultiplied(r, g, b, a))
}

fn parse_hex(hex: &str) -> Option<Color32> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Color32::from_rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        4 => Some(Color32::from_rgba_unmultiplied(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
        6 => Some(Color32::from_rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color32::from_rgba_unmultiplied(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

/// `#rrggbb` form of a color (alpha dropped).
pub fn to_hex(color: Color32) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}

/// Weighted squared RGB distance (0.3 / 0.59 / 0.11 luma weights).
pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let dr = a[0] as f32 - b[0] as f32;
    let dg = a[1] as f32 - b[1] as f32;
    let db = a[2] as f32 - b[2] as f32;
    0.3 * dr * dr + 0.59 * dg * dg + 0.11 * db * db
}

/// Rec.601 luminance in 0..1.
pub fn luminance(rgb: [u8; 3]) -> f32 {
    (0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32) / 255.0
}

pub const LABEL_DARK: Color32 = Color32::from_rgb(31, 41, 55);
pub const LABEL_LIGHT: Color32 = Color32::from_rgb(255, 255, 255);

/// Pick the label color that contrasts with a cell fill.
pub fn contrast_text_color(fill: [u8; 3]) -> Color32 {
    if luminance(fill) > 0.55 { LABEL_DARK } else { LABEL_LIGHT }
}

/// Channel-wise linear interpolation between two RGB triples.
pub fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = clamp_f32(t, 0.0, 1.0);
    let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * t).round() as u8;
    [mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2])]
}

// ----------------------------------------------------------------------------
// Palette code ordering
// ----------------------------------------------------------------------------

/// Locale-style numeric comparison: digit runs compare by value, other runs
/// case-insensitively ("A2" < "A10", "02" == "2" falls back to raw order).
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    let mut ia = a.chars().peekable();
    let mut ib = b.chars().peekable();
    loop {
        match (ia.peek().copied(), ib.peek().copied()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let na = take_digits(&mut ia);
                    let nb = take_digits(&mut ib);
                    let ta = na.trim_start_matches('0');
                    let tb = nb.trim_start_matches('0');
                    let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                } else {
                    let la = ca.to_lowercase().next().unwrap_or(ca);
                    let lb = cb.to_lowercase().next().unwrap_or(cb);
                    if la != lb {
                        return la.cmp(&lb);
                    }
                    ia.next();
                    ib.next();
                }
            }
        }
    }
    a.cmp(b)
}

fn take_digits(it: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut out = String::new();
    while let Some(&c) = it.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        out.push(c);
        it.next();
    }
    out
}

// ----------------------------------------------------------------------------
// Integer line walk
// ----------------------------------------------------------------------------

/// Bresenham walk from (x0, y0) to (x1, y1), both ends included.
pub fn line_cells(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    loop {
        out.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    out
}

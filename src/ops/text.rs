use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};

use crate::render::blend_pixel;

/// Families tried, in order, when the configured label font is missing.
const FALLBACK_FAMILIES: [&str; 4] = ["DejaVu Sans", "Liberation Sans", "Arial", "Helvetica"];

/// Lay out a single line of text at x = 0.
/// Returns `(glyphs, total_width, ascent, descent)`.
pub fn layout_text(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32)>, f32, f32, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::with_capacity(text.len());
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x, scaled.ascent(), scaled.descent())
}

pub fn text_width(font: &FontArc, text: &str, font_size: f32) -> f32 {
    layout_text(font, text, font_size).1
}

/// Rasterize `text` centered on (cx, cy) into a raw RGBA buffer of
/// `buf_w × buf_h` pixels. Pixels outside the buffer are clipped.
#[allow(clippy::too_many_arguments)]
pub fn draw_text_centered(
    buf: &mut [u8],
    buf_w: u32,
    buf_h: u32,
    font: &FontArc,
    text: &str,
    font_size: f32,
    cx: f32,
    cy: f32,
    rgb: [u8; 3],
    alpha: f32,
) {
    if text.is_empty() || font_size <= 0.0 || alpha <= 0.0 {
        return;
    }
    let (glyphs, total_width, ascent, descent) = layout_text(font, text, font_size);
    let origin_x = cx - total_width * 0.5;
    // descent is negative
    let baseline = cy + (ascent + descent) * 0.5;

    for (glyph_id, gx) in glyphs {
        let glyph = glyph_id.with_scale_and_position(font_size, point(origin_x + gx, baseline));
        let Some(outlined) = font.outline_glyph(glyph) else { continue };
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, cov| {
            let ix = bounds.min.x as i32 + px as i32;
            let iy = bounds.min.y as i32 + py as i32;
            if ix < 0 || iy < 0 || ix >= buf_w as i32 || iy >= buf_h as i32 {
                return;
            }
            let o = (iy as usize * buf_w as usize + ix as usize) * 4;
            if let Some(dst) = buf.get_mut(o..o + 4) {
                blend_pixel(dst, rgb, alpha * cov);
            }
        });
    }
}

/// Load a font by family name from the system.
pub fn load_system_font(family: &str) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::Properties;
    use font_kit::source::SystemSource;

    let name = if family.trim().is_empty() {
        FamilyName::SansSerif
    } else {
        FamilyName::Title(family.to_string())
    };
    let handle = SystemSource::new()
        .select_best_match(&[name], &Properties::new())
        .ok()?;

    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// The configured family, then common sans families, then any sans-serif.
pub fn load_label_font(family: &str) -> Option<FontArc> {
    std::iter::once(family)
        .chain(FALLBACK_FAMILIES)
        .chain(std::iter::once(""))
        .find_map(load_system_font)
}

use std::fmt::Write as _;
use std::path::Path;

use image::RgbaImage;

use crate::canvas::BaseLayerPosition;
use crate::project::Session;
use crate::render::{LayerKind, PixelShape, blend_pixel};

/// SVG user units per cell.
pub const SVG_CELL: u32 = 20;
const LEGEND_ROW: u32 = 24;

/// Error type for export operations
#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Image(image::ImageError),
    /// Nothing to export: no canvas has been created.
    Empty,
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
            ExportError::Image(e) => write!(f, "Image encoding error: {}", e),
            ExportError::Empty => write!(f, "No canvas to export"),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<image::ImageError> for ExportError {
    fn from(e: image::ImageError) -> Self {
        ExportError::Image(e)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositeOptions {
    /// Include grid lines and axis labels.
    pub include_grid: bool,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self { include_grid: true }
    }
}

// ============================================================================
// RASTER
// ============================================================================

fn composite_layer(dst: &mut RgbaImage, src: Option<&RgbaImage>, opacity: f32) {
    let Some(src) = src.filter(|s| s.dimensions() == dst.dimensions()) else { return };
    for (d, s) in dst.pixels_mut().zip(src.pixels()) {
        if s.0[3] == 0 {
            continue;
        }
        blend_pixel(&mut d.0, [s.0[0], s.0[1], s.0[2]], s.0[3] as f32 / 255.0 * opacity);
    }
}

/// Flatten the session's layers into one image: the reference image under
/// the cells (or over them at `base_opacity`), then the grid overlay.
pub fn render_composite(session: &mut Session, options: &CompositeOptions) -> Result<RgbaImage, ExportError> {
    if !session.canvas.is_created() {
        return Err(ExportError::Empty);
    }
    session.renderer.render_all(&session.canvas);
    let size = session.canvas.surface;
    let mut out = RgbaImage::new(size.width, size.height);
    let surfaces = &session.renderer.surfaces;
    let base_opacity = session.renderer.options.base_opacity.clamp(0.0, 1.0);

    match session.canvas.base.position {
        BaseLayerPosition::Under => {
            composite_layer(&mut out, surfaces.layer(LayerKind::Base), 1.0);
            composite_layer(&mut out, surfaces.layer(LayerKind::Main), 1.0);
        }
        BaseLayerPosition::Over => {
            composite_layer(&mut out, surfaces.layer(LayerKind::Main), 1.0);
            composite_layer(&mut out, surfaces.layer(LayerKind::Base), base_opacity);
        }
        BaseLayerPosition::Hidden => {
            composite_layer(&mut out, surfaces.layer(LayerKind::Main), 1.0);
        }
    }
    if options.include_grid {
        composite_layer(&mut out, surfaces.layer(LayerKind::Grid), 1.0);
    }
    Ok(out)
}

pub fn export_png(session: &mut Session, path: &Path, options: &CompositeOptions) -> Result<(), ExportError> {
    let image = render_composite(session, options)?;
    image.save_with_format(path, image::ImageFormat::Png)?;
    crate::log_info!(
        "export: wrote {}x{} PNG to {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok(())
}

// ============================================================================
// SVG
// ============================================================================

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn rgb_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// One shape per filled cell, plus an optional legend of used colors below.
pub fn export_svg(session: &mut Session, legend: bool) -> Result<String, ExportError> {
    if !session.canvas.is_created() {
        return Err(ExportError::Empty);
    }
    let usage = if legend { session.get_used_colors() } else { Vec::new() };
    let (w, h) = (session.canvas.width, session.canvas.height);
    let grid_h = h * SVG_CELL;
    let total_w = w * SVG_CELL;
    let total_h = grid_h + usage.len() as u32 * LEGEND_ROW;
    let shape = session.renderer.options.pixel_shape;

    let mut svg = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{total_w}" height="{total_h}" viewBox="0 0 {total_w} {total_h}">"#
    );
    if let Some(bg) = session.renderer.options.background {
        let _ = writeln!(
            svg,
            r#"  <rect x="0" y="0" width="{total_w}" height="{grid_h}" fill="{}" fill-opacity="{:.3}"/>"#,
            rgb_hex([bg.r(), bg.g(), bg.b()]),
            bg.a() as f32 / 255.0
        );
    }

    for y in 0..h {
        for x in 0..w {
            let Some(entry) = session.canvas.get(x, y) else { continue };
            let fill = session.renderer.cell_fill(entry);
            let color = rgb_hex(fill.rgb);
            let (px, py) = (x * SVG_CELL, y * SVG_CELL);
            match shape {
                PixelShape::Square => {
                    let _ = writeln!(
                        svg,
                        r#"  <rect x="{px}" y="{py}" width="{SVG_CELL}" height="{SVG_CELL}" fill="{color}" fill-opacity="{:.3}" data-code="{}"/>"#,
                        fill.alpha,
                        xml_escape(&entry.code)
                    );
                }
                PixelShape::Circle => {
                    let r = SVG_CELL as f32 * 0.5;
                    let _ = writeln!(
                        svg,
                        r#"  <circle cx="{}" cy="{}" r="{}" fill="{color}" fill-opacity="{:.3}" data-code="{}"/>"#,
                        px as f32 + r,
                        py as f32 + r,
                        r - 0.5,
                        fill.alpha,
                        xml_escape(&entry.code)
                    );
                }
            }
        }
    }

    for (i, u) in usage.iter().enumerate() {
        let top = grid_h + i as u32 * LEGEND_ROW;
        let swatch = session
            .palette
            .get(&u.code)
            .map(|e| rgb_hex(session.renderer.cell_fill(e).rgb))
            .unwrap_or_else(|| "#000000".to_string());
        let _ = writeln!(
            svg,
            r#"  <rect x="4" y="{}" width="16" height="16" fill="{swatch}"/>"#,
            top + 4
        );
        let _ = writeln!(
            svg,
            r#"  <text x="26" y="{}" font-family="sans-serif" font-size="14">{} × {}</text>"#,
            top + 17,
            xml_escape(&u.code),
            u.count
        );
    }
    svg.push_str("</svg>\n");
    Ok(svg)
}

pub fn export_svg_to(session: &mut Session, path: &Path, legend: bool) -> Result<(), ExportError> {
    let svg = export_svg(session, legend)?;
    std::fs::write(path, svg)?;
    crate::log_info!("export: wrote SVG to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::CreateOptions;

    fn session() -> Session {
        let mut s = Session::default();
        s.renderer.set_font(None);
        s.renderer.options.show_axis = false;
        s.create_canvas(3, 2, CreateOptions { cell_size: Some(10.0), created_at: None });
        s
    }

    #[test]
    fn empty_session_refuses_export() {
        let mut s = Session::default();
        assert!(matches!(render_composite(&mut s, &CompositeOptions::default()), Err(ExportError::Empty)));
        assert!(matches!(export_svg(&mut s, true), Err(ExportError::Empty)));
    }

    #[test]
    fn composite_contains_cell_color() {
        let mut s = session();
        s.paint_code(1, 1, "A5");
        s.commit();
        let img = render_composite(&mut s, &CompositeOptions { include_grid: false }).unwrap();
        let (ox, oy) = s.canvas.cell_origin(1, 1);
        let p = img.get_pixel(ox + 5, oy + 5);
        assert_eq!([p.0[0], p.0[1], p.0[2], p.0[3]], [0xe5, 0x39, 0x35, 255]);
        let (ex, ey) = s.canvas.cell_origin(0, 0);
        assert_eq!(img.get_pixel(ex + 5, ey + 5).0[3], 0);
    }

    #[test]
    fn svg_lists_cells_and_legend() {
        let mut s = session();
        s.paint_code(0, 0, "A5");
        s.paint_code(2, 1, "A5");
        s.paint_code(1, 0, "A1");
        s.commit();
        let svg = export_svg(&mut s, true).unwrap();
        assert_eq!(svg.matches("data-code=").count(), 3);
        assert!(svg.contains("A5 × 2"));
        assert!(svg.contains("A1 × 1"));
        assert!(svg.contains("#e53935"));

        s.renderer.options.pixel_shape = PixelShape::Circle;
        let svg = export_svg(&mut s, false).unwrap();
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(!svg.contains("<text"));
    }
}

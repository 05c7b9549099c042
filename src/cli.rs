// ============================================================================
// BeadCanvas CLI: headless pattern runner via command-line arguments
// ============================================================================
//
// Usage examples:
//   BeadCanvas --width 32 --height 32 --script heart.rhai --output heart.png
//   BeadCanvas -W 29 -H 29 --color 01=#ffffff --color 02=#e53935 --script s.rhai --svg s.svg --legend
//   BeadCanvas -W 48 -H 48 --base photo.jpg --script trace.rhai --output out.png
//
// Everything runs synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::BaseLayerPosition;
use crate::components::palette::{DisplayMode, Palette, PaletteEntry};
use crate::ops::export::{CompositeOptions, export_png, export_svg_to};
use crate::ops::scripting::run_script;
use crate::project::{CreateOptions, Session};
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// BeadCanvas headless pattern runner.
///
/// Creates a grid, drives it with a Rhai script and writes PNG / SVG output.
#[derive(Parser, Debug)]
#[command(
    name = "BeadCanvas",
    about = "BeadCanvas headless bead-pattern runner",
    long_about = "Create a bead grid, run a Rhai script against it and export the\n\
                  result as a composited PNG and/or an SVG pattern sheet.\n\n\
                  Example:\n  \
                  BeadCanvas --width 32 --height 32 --script heart.rhai --output heart.png"
)]
pub struct CliArgs {
    /// Grid width in cells (1-1024).
    #[arg(short = 'W', long)]
    pub width: u32,

    /// Grid height in cells (1-1024).
    #[arg(short = 'H', long)]
    pub height: u32,

    /// Requested cell size in pixels (clamped to the canvas limits).
    #[arg(long, value_name = "PX")]
    pub cell_size: Option<f32>,

    /// Palette entry as CODE=#RRGGBB. Repeatable. Without any, the built-in
    /// 16-color palette A1..A16 is used.
    #[arg(short, long = "color", value_name = "CODE=#RRGGBB")]
    pub colors: Vec<String>,

    /// Reference image, fitted to the grid and drawn under the cells.
    #[arg(long, value_name = "IMAGE")]
    pub base: Option<PathBuf>,

    /// Where the reference image is drawn: under, over, hidden.
    #[arg(long, default_value = "under", value_name = "POSITION")]
    pub base_position: String,

    /// Rhai script to run against the grid.
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// Composited PNG output.
    #[arg(short, long, value_name = "FILE.png")]
    pub output: Option<PathBuf>,

    /// SVG pattern output.
    #[arg(long, value_name = "FILE.svg")]
    pub svg: Option<PathBuf>,

    /// Display mode: standard, light, temperature, special, night.
    #[arg(long, value_name = "MODE")]
    pub display_mode: Option<String>,

    /// Draw palette codes inside the cells.
    #[arg(long)]
    pub show_codes: bool,

    /// Append a used-color legend to the SVG.
    #[arg(long)]
    pub legend: bool,

    /// Leave grid lines and axis labels out of the PNG.
    #[arg(long)]
    pub no_grid: bool,

    /// Settings file to use instead of the per-user one.
    #[arg(long, value_name = "FILE.cfg")]
    pub settings: Option<PathBuf>,

    /// Print script console output and timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the pattern job and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match run_job(&args) {
        Ok(()) => {
            if args.verbose {
                println!("done ({:.0}ms)", start.elapsed().as_secs_f64() * 1000.0);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            crate::log_err!("cli: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_job(args: &CliArgs) -> Result<(), String> {
    // -- Step 1: Settings & palette --------------------------------------
    let mut settings = match &args.settings {
        Some(path) => EditorSettings::load_from(path),
        None => EditorSettings::load(),
    };
    if args.show_codes {
        settings.show_codes = true;
    }
    if let Some(mode) = &args.display_mode {
        settings.display_mode = DisplayMode::parse(mode).ok_or_else(|| format!("unknown display mode '{}'", mode))?;
    }
    let palette = build_palette(&args.colors)?;

    // -- Step 2: Canvas ---------------------------------------------------
    let mut session = Session::new(settings, palette);
    let options = CreateOptions {
        cell_size: args.cell_size,
        created_at: None,
    };
    if !session.create_canvas(args.width, args.height, options) {
        return Err(format!(
            "invalid canvas size {}x{} (both sides must be 1-1024)",
            args.width, args.height
        ));
    }

    if let Some(path) = &args.base {
        let image = image::open(path)
            .map_err(|e| format!("could not load base image '{}': {}", path.display(), e))?
            .to_rgba8();
        let position = BaseLayerPosition::parse(&args.base_position)
            .ok_or_else(|| format!("unknown base position '{}'", args.base_position))?;
        session.set_base_image(Some(image));
        session.fit_base_image();
        session.set_base_position(position);
    }

    // -- Step 3: Script (optional) ---------------------------------------
    if let Some(path) = &args.script {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("could not read script '{}': {}", path.display(), e))?;
        let output = run_script(&mut session, &source).map_err(|e| format!("script error:\n{}", e.friendly_message()))?;
        if args.verbose {
            for line in &output.console_output {
                println!("  [script] {}", line);
            }
            println!("  script ran in {}ms", output.elapsed_ms);
        }
    }

    // -- Step 4: Export ---------------------------------------------------
    if let Some(path) = &args.output {
        let options = CompositeOptions { include_grid: !args.no_grid };
        export_png(&mut session, path, &options).map_err(|e| format!("PNG export failed: {}", e))?;
        report_written(path, args.verbose);
    }
    if let Some(path) = &args.svg {
        export_svg_to(&mut session, path, args.legend).map_err(|e| format!("SVG export failed: {}", e))?;
        report_written(path, args.verbose);
    }

    // -- Step 5: Usage summary -------------------------------------------
    let usage = session.get_used_colors();
    if usage.is_empty() {
        println!("no cells filled");
    }
    for u in usage {
        println!("{}\t{}", u.code, u.count);
    }
    Ok(())
}

fn report_written(path: &Path, verbose: bool) {
    if verbose {
        println!("  → {}", path.display());
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse one `CODE=#RRGGBB` argument.
pub fn parse_color_arg(arg: &str) -> Result<PaletteEntry, String> {
    let (code, css) = arg
        .split_once('=')
        .ok_or_else(|| format!("color '{}' must look like CODE=#RRGGBB", arg))?;
    let code = code.trim();
    if code.is_empty() {
        return Err(format!("color '{}' has an empty code", arg));
    }
    PaletteEntry::from_css(code, css.trim()).ok_or_else(|| format!("color '{}' has an unreadable value", arg))
}

fn build_palette(colors: &[String]) -> Result<Palette, String> {
    if colors.is_empty() {
        return Ok(Palette::builtin());
    }
    let mut palette = Palette::new();
    for arg in colors {
        palette.insert(parse_color_arg(arg)?);
    }
    if let Some(first) = palette.keys().first().cloned() {
        palette.select(&first);
    }
    Ok(palette)
}

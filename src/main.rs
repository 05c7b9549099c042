use clap::Parser;

use beadcanvas::cli::{self, CliArgs};
use beadcanvas::logger;

fn main() -> std::process::ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();
    let args = CliArgs::parse();
    beadcanvas::log_info!("cli: {}x{} grid, script={:?}", args.width, args.height, args.script);
    cli::run(args)
}

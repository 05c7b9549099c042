//! Session logger: one file per run in the OS data directory.
//!
//! The file is truncated by `init()`, so it only ever holds the latest run.
//! Before `init()` (library use, tests) every macro is a silent no-op.
//!
//! Log location:
//!   Windows:  `%APPDATA%\BeadCanvas\beadcanvas.log`
//!   Linux:    `~/.local/share/BeadCanvas/beadcanvas.log`
//!   macOS:    `~/Library/Application Support/BeadCanvas/beadcanvas.log`
//!
//! Lines look like `[HH:MM:SS] [WARN] message`. Panics are mirrored to the
//! file by a hook installed in `init()`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Path of the open log file, once `init` succeeded.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Append a raw line. I/O errors are ignored; logging never fails a caller.
pub fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn write(level: Level, msg: &str) {
    if LOG_FILE.get().is_none() {
        return;
    }
    write_line(&format_line(&clock_time(), level, msg));
}

fn format_line(clock: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", clock, level.as_str(), msg)
}

/// Open the per-user log file and install the panic hook.
pub fn init() -> Option<PathBuf> {
    init_at(&data_dir().join("BeadCanvas").join("beadcanvas.log"))
}

/// Like `init`, with an explicit file. Only the first successful call in a
/// process takes effect.
pub fn init_at(path: &Path) -> Option<PathBuf> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] could not open {}: {}", path.display(), e);
            return None;
        }
    };
    if LOG_FILE.set(Mutex::new(file)).is_err() {
        return LOG_PATH.get().cloned();
    }
    let _ = LOG_PATH.set(path.to_path_buf());

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    write_line(&format!("=== BeadCanvas session started (unix {}) ===", started));
    write_line(&format!("Log file: {}", path.display()));
    write_line("");

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format_line(&clock_time(), Level::Panic, &info.to_string()));
        prev(info);
    }));
    Some(path.to_path_buf())
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata);
    }
    #[cfg(target_os = "macos")]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join("Library").join("Application Support");
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// `HH:MM:SS` (UTC) within the current day.
fn clock_time() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format() {
        assert_eq!(format_line("01:02:03", Level::Warn, "low on beads"), "[01:02:03] [WARN] low on beads");
        assert_eq!(Level::Error.as_str(), "ERROR");
    }

    #[test]
    fn clock_has_three_fields() {
        let ts = clock_time();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.split(':').count(), 3);
    }

    #[test]
    fn macros_are_quiet_before_init() {
        crate::log_info!("nothing to see {}", 1);
        crate::log_err!("still nothing");
        assert!(log_path().is_none());
    }
}

// src/logging.rs
//
// Timestamped stderr logging with an optional mirrored log file.
//
//   tlog!("session"; "Connected to {}", port)  -> 12:00:01.250 [session] Connected to ...
//   tlog!("plain message")                     -> 12:00:01.250 plain message
//
// Each `init_file_logging` starts a new timestamped file and prunes the
// oldest ones so the directory keeps at most `MAX_LOG_FILES`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

const LOG_LINK_NAME: &str = "canbus-serial.log";
const LOG_FILE_SUFFIX: &str = "-canbus-serial.log";
const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Timestamped log files kept per directory, including the current one
pub const MAX_LOG_FILES: usize = 10;

fn timestamp() -> impl fmt::Display {
    chrono::Local::now().format(TIMESTAMP_FORMAT)
}

fn compose(time: impl fmt::Display, component: Option<&str>, args: fmt::Arguments<'_>) -> String {
    match component {
        Some(component) => format!("{} [{}] {}", time, component, args),
        None => format!("{} {}", time, args),
    }
}

/// Backend of `tlog!`; not meant to be called directly.
#[doc(hidden)]
pub fn write_line(component: Option<&str>, args: fmt::Arguments<'_>) {
    use std::io::Write as _;

    let msg = compose(timestamp(), component, args);
    eprintln!("{}", msg);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut f) = *guard {
            let _ = writeln!(f, "{}", msg);
        }
    }
}

/// Initialise file logging to the given directory.
/// Creates a timestamped log file and a `canbus-serial.log` symlink (Unix only).
/// Returns the path of the new log file.
pub fn init_file_logging(log_dir: &Path) -> Result<PathBuf, String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format(&format!("%Y%m%d-%H%M%S{}", LOG_FILE_SUFFIX))
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LOG_LINK_NAME);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create {} symlink: {}",
                timestamp(),
                LOG_LINK_NAME,
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // eprintln directly: tlog! would lock LOG_FILE again
    eprintln!(
        "{} [logging] File logging started: {}",
        timestamp(),
        log_path.display()
    );

    match prune_old_logs(log_dir, MAX_LOG_FILES) {
        Ok(0) => {}
        Ok(n) => eprintln!("{} [logging] Removed {} old log files", timestamp(), n),
        Err(e) => eprintln!("{} [logging] Failed to prune old logs: {}", timestamp(), e),
    }

    Ok(log_path)
}

/// Delete the oldest timestamped log files in `log_dir` until at most `keep`
/// remain. Other files, and the `canbus-serial.log` link, are left alone.
/// Returns how many files were removed.
pub fn prune_old_logs(log_dir: &Path, keep: usize) -> Result<usize, String> {
    let entries = std::fs::read_dir(log_dir)
        .map_err(|e| format!("Failed to read log dir: {}", e))?;

    // File names start with %Y%m%d-%H%M%S, so name order is age order
    let mut logs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(LOG_FILE_SUFFIX))
        })
        .collect();
    logs.sort();

    let excess = logs.len().saturating_sub(keep);
    let mut removed = 0;
    for path in logs.into_iter().take(excess) {
        if std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!("{} [logging] File logging stopped", timestamp());
        }
    }
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr,
/// and `[component]` when the message starts with a component literal.
/// Also writes to the log file when file logging is enabled.
#[macro_export]
macro_rules! tlog {
    ($component:literal; $($arg:tt)*) => {
        $crate::logging::write_line(Some($component), format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::logging::write_line(None, format_args!($($arg)*))
    };
}

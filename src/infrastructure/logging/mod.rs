//! Logger bootstrap: console output plus an optional per-process log file.

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use std::time::{Duration, SystemTime};

const ENABLE_LOGS_VAR: &str = "TREEDECK_ENABLE_LOGS";
const RETENTION_VAR: &str = "TREEDECK_LOG_RETENTION_HOURS";
const DEFAULT_RETENTION_HOURS: u64 = 72;
const HOUR: Duration = Duration::from_secs(3_600);

static FILE_SINK: Mutex<Option<FileSink>> = Mutex::new(None);
static INIT: Once = Once::new();

struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

/// Resolved from the environment before the logger exists, so problems are
/// collected in `notes` and logged once it does.
#[derive(Debug, PartialEq, Eq)]
struct LogSettings {
    write_file: bool,
    retention: Duration,
    notes: Vec<String>,
}

impl LogSettings {
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut notes = Vec::new();

        let retention = match lookup(RETENTION_VAR) {
            None => HOUR * DEFAULT_RETENTION_HOURS as u32,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(hours) => HOUR.saturating_mul(hours),
                Err(_) => {
                    notes.push(format!(
                        "Ignoring {RETENTION_VAR}={raw:?}; keeping logs for {DEFAULT_RETENTION_HOURS} hours"
                    ));
                    HOUR * DEFAULT_RETENTION_HOURS as u32
                }
            },
        };

        let default_write = cfg!(debug_assertions);
        let write_file = match lookup(ENABLE_LOGS_VAR) {
            None => default_write,
            Some(raw) => flag(&raw).unwrap_or_else(|| {
                notes.push(format!(
                    "Ignoring {ENABLE_LOGS_VAR}={raw:?}; expected a boolean, using {default_write}"
                ));
                default_write
            }),
        };

        Self {
            write_file,
            retention,
            notes,
        }
    }
}

fn flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("treedeck")
        .join("logs")
}

/// Path of the file this process is logging to, if file logging is active.
pub fn current_log_path() -> Option<PathBuf> {
    FILE_SINK
        .lock()
        .ok()
        .and_then(|sink| sink.as_ref().map(|sink| sink.path.clone()))
}

/// Installs the global logger once. Later calls are no-ops.
pub fn init_logging() {
    INIT.call_once(|| install(LogSettings::from_lookup(|key| env::var(key).ok())));
}

fn install(mut settings: LogSettings) {
    if settings.write_file {
        let dir = log_dir();
        settings.notes.extend(prune_logs(&dir, settings.retention));
        match open_sink(&dir) {
            Ok(sink) => {
                if let Ok(mut slot) = FILE_SINK.lock() {
                    *slot = Some(sink);
                }
            }
            Err(note) => settings.notes.push(note),
        }
    }

    let mut builder = Builder::new();
    builder.is_test(cfg!(test));
    builder.target(env_logger::Target::Stderr);
    match env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            builder.filter_level(LevelFilter::Warn);
            if settings.write_file {
                builder.filter_module("treedeck", LevelFilter::Debug);
            }
        }
    }
    builder.format(|buf, record| {
        let line = format!(
            "[{} {:<5} {}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        if let Ok(mut slot) = FILE_SINK.lock() {
            if let Some(sink) = slot.as_mut() {
                let _ = writeln!(sink.writer, "{line}").and_then(|()| sink.writer.flush());
            }
        }
        writeln!(buf, "{line}")
    });

    if builder.try_init().is_err() {
        // A test harness installed its logger first.
        return;
    }

    log::info!(
        "treedeck {} (pid {})",
        env!("CARGO_PKG_VERSION"),
        std::process::id()
    );
    match current_log_path() {
        Some(path) => log::info!("Logging to {}", path.display()),
        None => log::info!("File logging disabled"),
    }
    for note in settings.notes {
        log::warn!("{note}");
    }
}

fn open_sink(dir: &Path) -> Result<FileSink, String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("Cannot create log directory {}: {e}", dir.display()))?;
    let path = dir.join(format!(
        "treedeck-{}.log",
        Local::now().format("%Y%m%d-%H%M%S")
    ));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Cannot open {}: {e}; logging to stderr only", path.display()))?;
    Ok(FileSink {
        path,
        writer: BufWriter::new(file),
    })
}

/// Removes `.log` files last modified before `now - retention` and returns a
/// note per file that could not be handled. Zero retention disables pruning.
fn prune_logs(dir: &Path, retention: Duration) -> Vec<String> {
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(cutoff) if !retention.is_zero() => cutoff,
        _ => return Vec::new(),
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut notes = Vec::new();
    for path in entries.flatten().map(|entry| entry.path()) {
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("log") {
            continue;
        }
        let stale = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified < cutoff,
            Err(e) => {
                notes.push(format!("Cannot read age of {}: {e}", path.display()));
                false
            }
        };
        if stale {
            if let Err(e) = fs::remove_file(&path) {
                notes.push(format!("Cannot remove old log {}: {e}", path.display()));
            }
        }
    }
    notes
}

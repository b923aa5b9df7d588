//! Dual-sink logging, in the manner of the teacher's `log/logger.rs`: every record
//! captured through the `log` facade lands in the driver log file, while a narrower
//! set of operator-facing messages is also echoed to the terminal (the "UI log").
//!
//! The two sinks exist because spec §7 distinguishes them: per-node failures are
//! logged only to the driver log unless the whole run comes up empty, in which case
//! the aggregate failure must surface on the console too.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::OnceCell;

use crate::prelude::*;

static DRIVER_LOG: OnceCell<Mutex<File>> = OnceCell::new();

pub struct DriverLogger {
    level: Level,
}

impl DriverLogger {
    /// Initializes the global `log` facade logger. `log_path` is the driver log file
    /// (also archived under `root/logs/`); `level` mirrors the teacher's
    /// debug/release split in `main.rs` (`debug` in debug builds, `info` otherwise),
    /// overridable with `RUST_LOG`.
    pub fn init(log_path: &Path) -> anyhow::Result<()> {
        let level = std::env::var("RUST_LOG")
            .ok()
            .and_then(|v| v.parse::<Level>().ok())
            .unwrap_or(if cfg!(debug_assertions) {
                Level::Debug
            } else {
                Level::Info
            });

        let file = File::options()
            .create(true)
            .append(true)
            .open(log_path)
            .with_context(|| format!("opening driver log at {}", log_path.display()))?;

        DRIVER_LOG
            .set(Mutex::new(file))
            .map_err(|_| anyhow::anyhow!("logger already initialized"))?;

        log::set_boxed_logger(Box::new(DriverLogger { level }))
            .context("installing driver logger")?;
        log::set_max_level(LevelFilter::Trace);
        Ok(())
    }

    fn write_line(line: &str) {
        if let Some(lock) = DRIVER_LOG.get() {
            if let Ok(mut file) = lock.lock() {
                let _ = writeln!(file, "{line}");
            }
        }
    }
}

impl Log for DriverLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{time} {level:<5} {target}] {args}",
            time = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            level = record.level(),
            target = record.target(),
            args = record.args(),
        );
        Self::write_line(&line);
    }

    fn flush(&self) {
        if let Some(lock) = DRIVER_LOG.get() {
            if let Ok(mut file) = lock.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// The operator-facing console log. Every message sent here is also duplicated into
/// the driver log via the `log` facade, matching the original's `ui_log` semantics
/// (a second logger with its own file + a stream handler to the console).
pub struct UiLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl UiLog {
    pub fn create(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening UI log at {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        println!("{msg}");
        self.append(msg);
        info!("{msg}");
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        eprintln!("{msg}");
        self.append(msg);
        error!("{msg}");
    }

    fn append(&self, msg: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{msg}");
        }
    }
}

/// Ensures the directory holding `path` exists, matching the teacher's
/// `context`/temp-dir scaffolding convention of creating parent directories eagerly
/// rather than failing on first write.
pub fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

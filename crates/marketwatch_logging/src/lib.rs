//! Shared logging setup for the Marketwatch binary.
//!
//! Everything goes to a size-rotated file under `~/.marketwatch/logs`.
//! Scheduler runs also echo to stderr; one-shot commands only echo warnings
//! unless `--verbose` is given.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "marketwatch=info,marketwatch_db=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for Marketwatch processes.
pub struct LogConfig<'a> {
    /// Base name of the log file (`<app_name>.log`)
    pub app_name: &'a str,
    /// Echo the file filter to stderr instead of warnings only
    pub verbose: bool,
    /// Long-running scheduler mode: always echo at the file level
    pub daemon: bool,
    /// Override for the log directory
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with a rolling file writer and stderr output.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir(),
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;

    let file_writer = SizeRotatedFile::open(&log_dir, config.app_name, RotationPolicy::default())
        .with_context(|| format!("Failed to open log file for {}", config.app_name))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose || config.daemon {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file_writer))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Get the Marketwatch home directory: ~/.marketwatch
///
/// `MARKETWATCH_HOME` overrides the location.
pub fn marketwatch_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("MARKETWATCH_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marketwatch")
}

/// Get the logs directory: ~/.marketwatch/logs
pub fn logs_dir() -> PathBuf {
    marketwatch_home().join("logs")
}

/// When the active log file is rolled over and how many archives survive.
#[derive(Debug, Clone, Copy)]
struct RotationPolicy {
    max_bytes: u64,
    /// Archived generations kept next to the active file
    keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_LOG_FILE_SIZE,
            keep: MAX_LOG_FILES - 1,
        }
    }
}

/// `<name>.log` plus archives `<name>.log.1` (newest) to `<name>.log.<keep>`.
struct SizeRotatedFile {
    active: PathBuf,
    policy: RotationPolicy,
    file: File,
    written: u64,
}

impl SizeRotatedFile {
    fn open(dir: &Path, name: &str, policy: RotationPolicy) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let active = dir.join(format!("{}.log", sanitize_name(name)));
        let (file, written) = open_append(&active)?;
        let mut this = Self {
            active,
            policy,
            file,
            written,
        };
        if this.written > this.policy.max_bytes {
            this.roll()?;
        }
        Ok(this)
    }

    fn archive(&self, generation: usize) -> PathBuf {
        let mut path = self.active.clone().into_os_string();
        path.push(format!(".{}", generation));
        PathBuf::from(path)
    }

    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.policy.keep == 0 {
            File::create(&self.active)?;
        } else {
            let oldest = self.archive(self.policy.keep);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for generation in (1..self.policy.keep).rev() {
                let from = self.archive(generation);
                if from.exists() {
                    fs::rename(&from, self.archive(generation + 1))?;
                }
            }
            fs::rename(&self.active, self.archive(1))?;
        }

        let (file, written) = open_append(&self.active)?;
        self.file = file;
        self.written = written;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    Ok((file, len))
}

impl Write for SizeRotatedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.policy.max_bytes {
            self.roll()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

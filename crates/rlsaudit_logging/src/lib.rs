//! Logging setup for the rlsaudit binary.
//!
//! Everything goes to stderr (cron mails it). When a log directory is
//! configured, the same events are also appended to a size-capped file that
//! rotates into `<name>.log.1`, `<name>.log.2`, ...

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "rlsaudit=info";
const VERBOSE_LOG_FILTER: &str = "rlsaudit=debug";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for one process.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Directory for the rotating log file; stderr only when `None`.
    pub log_dir: Option<&'a Path>,
}

/// Build the filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Initialize tracing with stderr output and an optional rotating file.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let file_layer = match config.log_dir {
        Some(dir) => {
            let writer = RotatingWriter::open(dir, config.app_name)
                .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(default_filter(config.verbose)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(default_filter(config.verbose)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(log_dir = ?config.log_dir, "Logging initialized");
    Ok(())
}

struct LogFile {
    dir: PathBuf,
    stem: String,
    file: File,
    written: u64,
}

impl LogFile {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = sanitize_name(app_name);
        let path = dir.join(format!("{stem}.log"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            file,
            written,
        })
    }

    fn numbered(&self, index: usize) -> PathBuf {
        if index == 0 {
            self.dir.join(format!("{}.log", self.stem))
        } else {
            self.dir.join(format!("{}.log.{}", self.stem, index))
        }
    }

    /// Shift `name.log.N` to `name.log.N+1`, dropping the oldest, and start
    /// a fresh `name.log`.
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let oldest = self.numbered(MAX_LOG_FILES - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (0..MAX_LOG_FILES - 1).rev() {
            let from = self.numbered(index);
            if from.exists() {
                fs::rename(&from, self.numbered(index + 1))?;
            }
        }
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.numbered(0))?;
        self.written = 0;
        Ok(())
    }

    fn append(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > MAX_LOG_FILE_SIZE {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

#[derive(Clone)]
struct RotatingWriter {
    inner: Arc<Mutex<LogFile>>,
}

impl RotatingWriter {
    fn open(dir: &Path, app_name: &str) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(LogFile::open(dir, app_name)?)),
        })
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut LogFile) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut guard)
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.append(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.file.flush())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

//! Append-only operation log (`logs/update.log`).
//!
//! Lines look like `[2024-05-01T10:00:00.000Z] [INFO] Update started`. Every
//! entry is mirrored to `tracing`. A failed append never fails the caller.

use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpLog {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl OpLog {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: &str) {
        tracing::info!(target: "boxkeeper::oplog", "{message}");
        self.append(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(target: "boxkeeper::oplog", "{message}");
        self.append(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(target: "boxkeeper::oplog", "{message}");
        self.append(Level::Error, message);
    }

    fn append(&self, level: Level, message: &str) {
        let line = format!(
            "[{}] [{}] {message}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level.as_str()
        );

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.write_line(&line) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append to update log");
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

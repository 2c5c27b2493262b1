use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{Result, SinkResult};
use crate::logger::{ChannelBase, LogChannel, LogEntry, LogFormat, LogLevel};

/// Appends uncolored lines to a file.
#[derive(Debug)]
pub struct FileChannel {
    base: ChannelBase,
    path: PathBuf,
    file: Mutex<File>,
    detail: bool,
}

impl FileChannel {
    /// Open `path` for appending, creating it and its parent directories.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>, level: LogLevel) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            base: ChannelBase::new(name, level),
            path,
            file: Mutex::new(file),
            detail: true,
        })
    }

    /// Include logger name and source location in each line.
    pub fn detail(mut self, detail: bool) -> Self {
        self.detail = detail;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogChannel for FileChannel {
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn write(&self, logger_name: &str, entry: &LogEntry) -> SinkResult {
        let Some(mut line) = LogFormat::format(logger_name, entry, false, self.detail) else {
            return Ok(());
        };
        line.push('\n');
        self.file.lock().write_all(line.as_bytes())?;
        Ok(())
    }
}

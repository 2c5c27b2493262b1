use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::SinkResult;
use crate::logger::{ChannelBase, LogChannel, LogEntry, LogLevel};

const SYSLOG_PATHS: [&str; 2] = ["/dev/log", "/var/run/syslog"];

/// `LOG_USER` facility.
const FACILITY_USER: u8 = 1;

/// Sends entries to the local syslog daemon.
///
/// The socket is opened on first write and reopened after a send failure.
#[derive(Debug)]
pub struct SyslogChannel {
    base: ChannelBase,
    paths: Vec<PathBuf>,
    socket: Mutex<Option<UnixDatagram>>,
}

impl SyslogChannel {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            base: ChannelBase::new(name, level),
            paths: SYSLOG_PATHS.iter().map(PathBuf::from).collect(),
            socket: Mutex::new(None),
        }
    }

    /// Use a specific syslog socket path instead of the platform defaults.
    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.paths = vec![path.as_ref().to_path_buf()];
        self
    }

    /// Syslog severity for a level.
    pub fn severity(level: LogLevel) -> u8 {
        match level {
            LogLevel::Trace => 7, // LOG_DEBUG
            LogLevel::Debug => 6, // LOG_INFO
            LogLevel::Info => 5,  // LOG_NOTICE
            LogLevel::Warn => 4,  // LOG_WARNING
            LogLevel::Error => 3, // LOG_ERR
        }
    }

    /// Render the datagram for one entry.
    pub fn render(logger_name: &str, entry: &LogEntry) -> String {
        let loc = entry.location();
        format!(
            "<{}>{}: {}:{} {} | {}",
            FACILITY_USER * 8 + Self::severity(entry.level()),
            logger_name,
            loc.file(),
            loc.line(),
            loc.function(),
            entry.message()
        )
    }

    fn connect(&self) -> io::Result<UnixDatagram> {
        let socket = UnixDatagram::unbound()?;
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no syslog socket");
        for path in &self.paths {
            match socket.connect(path) {
                Ok(()) => return Ok(socket),
                Err(err) => last_err = err,
            }
        }
        Err(last_err)
    }
}

impl LogChannel for SyslogChannel {
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn write(&self, logger_name: &str, entry: &LogEntry) -> SinkResult {
        let message = Self::render(logger_name, entry);
        let mut guard = self.socket.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        if let Some(socket) = guard.as_ref()
            && let Err(err) = socket.send(message.as_bytes())
        {
            *guard = None;
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::SourceLocation;

    #[test]
    fn test_priority_mapping() {
        let severities: Vec<u8> = LogLevel::ALL.iter().map(|l| SyslogChannel::severity(*l)).collect();
        assert_eq!(severities, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_render() {
        let entry = LogEntry::with_timestamps(LogLevel::Warn, SourceLocation::new("a/b.rs", "run", 9), 0, 0, "late");
        assert_eq!(SyslogChannel::render("svc", &entry), "<12>svc: b.rs:9 run | late");
    }

    #[test]
    fn test_delivers_to_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.sock");
        let server = UnixDatagram::bind(&path).unwrap();

        let channel = SyslogChannel::new("syslog", LogLevel::Trace).socket_path(&path);
        let entry = LogEntry::with_timestamps(LogLevel::Error, SourceLocation::new("x.rs", "f", 1), 0, 0, "boom");
        channel.write("svc", &entry).unwrap();

        let mut buf = [0u8; 256];
        let n = server.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"<11>svc: x.rs:1 f | boom");
    }

    #[test]
    fn test_missing_socket_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let channel = SyslogChannel::new("syslog", LogLevel::Trace).socket_path(dir.path().join("absent"));
        let entry = LogEntry::with_timestamps(LogLevel::Info, SourceLocation::new("x.rs", "f", 1), 0, 0, "m");
        assert!(channel.write("svc", &entry).is_err());
    }
}

// Application logger handle

use crate::{LogConfig, LogGuard, LogLevel};
use std::io;
use std::path::PathBuf;

/// The installed application logger.
///
/// Owns the writer guards so records keep flowing for as long as the logger
/// is alive. Registered once in the service container.
#[derive(Debug)]
pub struct Logger {
    name: String,
    level: LogLevel,
    file: Option<PathBuf>,
    stderr: bool,
    _guard: LogGuard,
}

impl Logger {
    /// Install the subscriber described by `config`.
    pub fn install(config: LogConfig) -> io::Result<Self> {
        let name = config.get_app_name().to_string();
        let level = config.get_level();
        let file = config.get_file().map(PathBuf::from);
        let stderr = config.has_stderr();
        let guard = config.init()?;

        Ok(Self {
            name,
            level,
            file,
            stderr,
            _guard: guard,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum level this logger was configured with.
    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn file(&self) -> Option<&PathBuf> {
        self.file.as_ref()
    }

    pub fn writes_to_stderr(&self) -> bool {
        self.stderr
    }

    /// Record a message at a runtime-chosen level.
    pub fn log(&self, level: LogLevel, message: &str) {
        crate::log_at!(level, logger = %self.name, "{}", message);
    }
}

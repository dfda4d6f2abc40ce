// Subscriber configuration and installation

use crate::LogLevel;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::MakeWriter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Line format used by every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human readable single line
    #[default]
    Plain,
    /// Shorter single line
    Compact,
}

/// Logger configuration.
///
/// The file sink is the primary destination; the stderr sink is meant for
/// containers and command-line runs where stderr is collected.
#[derive(Debug, Clone)]
pub struct LogConfig {
    app_name: String,
    level: LogLevel,
    format: LogFormat,
    file: Option<PathBuf>,
    stderr: bool,
    targets: bool,
    env_filter: Option<String>,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset used by the application kernel: INFO in production and DEBUG
    /// otherwise, always writing to `{temp_dir}/app.log`.
    pub fn for_environment(
        app_name: impl Into<String>,
        production: bool,
        temp_dir: impl AsRef<Path>,
        stderr: bool,
    ) -> Self {
        Self::new()
            .app_name(app_name)
            .level(if production {
                LogLevel::Info
            } else {
                LogLevel::Debug
            })
            .file(temp_dir.as_ref().join("app.log"))
            .stderr(stderr)
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Append records to this file, creating parent directories as needed.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Also write records to stderr.
    pub fn stderr(mut self, enable: bool) -> Self {
        self.stderr = enable;
        self
    }

    pub fn with_targets(mut self, enable: bool) -> Self {
        self.targets = enable;
        self
    }

    /// Explicit filter directives, e.g. `"azura=debug,hyper=info"`.
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn get_app_name(&self) -> &str {
        &self.app_name
    }

    pub fn get_level(&self) -> LogLevel {
        self.level
    }

    pub fn get_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn has_stderr(&self) -> bool {
        self.stderr
    }

    /// Install the global subscriber.
    ///
    /// The returned guard flushes the background writers when dropped and must
    /// be kept alive for as long as the application logs. If a global
    /// subscriber already exists it is left in place.
    pub fn init(self) -> io::Result<LogGuard> {
        let filter = self.build_filter();
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guards = Vec::new();

        if let Some(path) = &self.file {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            layers.push(self.build_layer(writer, false));
            guards.push(guard);
        }

        if self.stderr {
            let (writer, guard) = tracing_appender::non_blocking(io::stderr());
            layers.push(self.build_layer(writer, true));
            guards.push(guard);
        }

        let installed = tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(
                app = %self.app_name,
                log_level = %self.level,
                file = ?self.file,
                stderr = self.stderr,
                "Logger initialized"
            );
        } else {
            tracing::debug!(app = %self.app_name, "Global subscriber already set, keeping it");
        }

        Ok(LogGuard {
            _guards: guards,
            installed,
        })
    }

    fn build_filter(&self) -> EnvFilter {
        match &self.env_filter {
            Some(directives) => EnvFilter::try_new(directives)
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str())),
        }
    }

    fn build_layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        match self.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(self.targets)
                .boxed(),
            LogFormat::Plain => fmt::layer()
                .with_writer(writer)
                .with_target(self.targets)
                .with_ansi(ansi)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_writer(writer)
                .with_target(self.targets)
                .with_ansi(ansi)
                .boxed(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "app".to_string(),
            level: LogLevel::Info,
            format: LogFormat::Plain,
            file: None,
            stderr: false,
            targets: true,
            env_filter: None,
        }
    }
}

/// Keeps the non-blocking writers alive.
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
    installed: bool,
}

impl std::fmt::Debug for LogGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGuard")
            .field("writers", &self._guards.len())
            .field("installed", &self.installed)
            .finish()
    }
}

impl LogGuard {
    /// Whether this configuration became the global subscriber.
    pub fn is_installed(&self) -> bool {
        self.installed
    }
}

//! Leveled diagnostics for the `objrt` runtime.
//!
//! The runtime reports registry events, state transitions and fatal
//! configuration errors through this crate. Output goes to a pluggable
//! [`Sink`]; the default sink writes to stderr with the same
//! `[objrt @ file:line]` prefix the runtime uses for fatal diagnostics.
//!
//! The initial level comes from the `OBJRT_LOG` environment variable
//! (`error`, `warn`, `info`, `debug` or `trace`) and defaults to `warn`.
//!
//! # Example
//!
//! ```
//! use objrt_log::{debug, warn, Level};
//!
//! objrt_log::set_level(Level::Debug);
//!
//! let class = "Derived";
//! debug!("registered class {}", class);
//! warn!("class {} registered twice", class);
//! ```

use std::fmt::Arguments;
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

/// Environment variable consulted for the initial log level.
pub const ENV_VAR: &str = "OBJRT_LOG";

/// Severity of a log record. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Fatal configuration errors and locking misuse.
    Error = 0,
    /// Suspicious but tolerated input, such as duplicate class names.
    Warn = 1,
    /// Module-level milestones.
    Info = 2,
    /// Registry events: registrations, parked categories, rebuilds.
    Debug = 3,
    /// Per-class state transitions.
    Trace = 4,
}

impl Level {
    /// Returns the upper-case name used in rendered records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            _ => Err(format!("invalid log level: {s}")),
        }
    }
}

/// A single log event handed to a [`Sink`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    pub level: Level,
    /// Module path of the call site.
    pub target: &'a str,
    pub file: &'static str,
    pub line: u32,
    pub args: Arguments<'a>,
}

/// Destination for log records.
pub trait Sink: Send + Sync {
    fn write(&self, record: &Record<'_>);
}

/// Writes records to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn write(&self, record: &Record<'_>) {
        let mut err = std::io::stderr().lock();
        // stderr going away is not something a logger can report
        let _ = writeln!(
            err,
            "[objrt @ {}:{}] {} {}: {}",
            record.file,
            record.line,
            record.level.as_str(),
            record.target,
            record.args
        );
    }
}

/// Level filter plus sink.
pub struct Logger {
    level: AtomicU8,
    sink: RwLock<Arc<dyn Sink>>,
}

impl Logger {
    /// Creates a logger writing to `sink` at `level`.
    pub fn new(level: Level, sink: Arc<dyn Sink>) -> Self {
        Logger {
            level: AtomicU8::new(level as u8),
            sink: RwLock::new(sink),
        }
    }

    fn from_env() -> Self {
        let level = std::env::var(ENV_VAR)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(Level::Warn);
        Logger::new(level, Arc::new(StderrSink))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    #[must_use]
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        level as u8 <= self.level.load(Ordering::Relaxed)
    }

    /// Replaces the sink. Records already in flight finish on the old one.
    pub fn set_sink(&self, sink: Arc<dyn Sink>) {
        // a poisoned sink slot still holds a usable Arc
        let mut slot = self.sink.write().unwrap_or_else(|e| e.into_inner());
        *slot = sink;
    }

    pub fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.level) {
            return;
        }
        let sink = {
            let slot = self.sink.read().unwrap_or_else(|e| e.into_inner());
            Arc::clone(&slot)
        };
        sink.write(record);
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Returns the process-wide logger, reading `OBJRT_LOG` on first use.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::from_env)
}

pub fn set_level(level: Level) {
    get_logger().set_level(level);
}

/// Sets the global level from its textual name.
///
/// # Errors
///
/// Returns the rejected input wrapped in a message if it is not a level name.
pub fn set_level_from_str(s: &str) -> Result<(), String> {
    set_level(s.parse()?);
    Ok(())
}

/// Routes global records to `sink`.
pub fn set_sink(sink: Arc<dyn Sink>) {
    get_logger().set_sink(sink);
}

#[doc(hidden)]
pub fn __log(
    level: Level,
    target: &str,
    file: &'static str,
    line: u32,
    args: Arguments<'_>,
) {
    get_logger().log(&Record {
        level,
        target,
        file,
        line,
        args,
    });
}

/// Logs at an explicit level.
///
/// ```
/// use objrt_log::{log, Level};
///
/// log!(level: Level::Info, "loaded {} classes", 3);
/// ```
#[macro_export]
macro_rules! log {
    (level: $level:expr, $($arg:tt)*) => {{
        let level = $level;
        if $crate::get_logger().enabled(level) {
            $crate::__log(level, module_path!(), file!(), line!(), format_args!($($arg)*));
        }
    }};
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Error, $($arg)*) };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Info, $($arg)*) };
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::log!(level: $crate::Level::Trace, $($arg)*) };
}

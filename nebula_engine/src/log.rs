//! Logging facade for the renderer and its backends
//!
//! The core crate and the Vulkan backend never print directly. They call the
//! `engine_*` macros with a source path (`nebula::renderer`,
//! `nebula::vulkan::swapchain`, ...), and `Engine` hands the resulting
//! `LogEntry` to the installed `Logger`. Validation layer messages arrive the
//! same way. Errors carry the file and line they were raised at, so a failed
//! frame can be traced back to the recording step that broke it.

use chrono::{DateTime, Local};
use colored::*;
use std::time::SystemTime;

/// Destination of engine log entries, installed with `Engine::set_logger`
///
/// Called from whichever thread logged, possibly while a frame is being
/// recorded; implementations should return quickly.
///
/// ```no_run
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use nebula_engine::nebula::log::{LogEntry, LogSeverity, Logger};
///
/// /// Counts renderer errors so the application can show a status badge
/// #[derive(Default)]
/// struct FrameErrorCounter {
///     errors: AtomicUsize,
/// }
///
/// impl Logger for FrameErrorCounter {
///     fn log(&self, entry: &LogEntry) {
///         if entry.severity == LogSeverity::Error && entry.source.starts_with("nebula::renderer") {
///             self.errors.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

/// One message as handed to the logger
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub timestamp: SystemTime,
    /// Subsystem path, `nebula::<subsystem>[::<detail>]`
    pub source: String,
    pub message: String,
    /// Set for `engine_error!`, `engine_err!` and `engine_bail!` only
    pub file: Option<&'static str>,
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    /// Very verbose information (per-draw, per-barrier)
    Trace,
    /// Development information (per-frame events, resource creation)
    Debug,
    /// Important lifecycle events
    Info,
    /// Recoverable problems (swapchain recreation, skipped passes)
    Warn,
    /// Errors, logged with file:line
    Error,
}

impl LogSeverity {
    /// Fixed-width label used by the console logger
    pub fn label(self) -> &'static str {
        match self {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        }
    }

    fn colored_label(self) -> ColoredString {
        let label = self.label();
        match self {
            LogSeverity::Trace => label.bright_black(),
            LogSeverity::Debug => label.cyan(),
            LogSeverity::Info => label.green(),
            LogSeverity::Warn => label.yellow(),
            LogSeverity::Error => label.red().bold(),
        }
    }
}

/// Console logger installed until the application replaces it
///
/// `[timestamp] [SEVERITY] [source] message`, with ` (file:line)` appended
/// for errors. Errors go to stderr, everything else to stdout.
pub struct DefaultLogger;

impl DefaultLogger {
    /// The console line without colors
    pub fn format_plain(entry: &LogEntry) -> String {
        Self::format(entry, entry.severity.label(), &entry.source)
    }

    fn format(entry: &LogEntry, severity: impl std::fmt::Display, source: impl std::fmt::Display) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let mut line = format!(
            "[{}] [{}] [{}] {}",
            datetime.format("%Y-%m-%d %H:%M:%S%.3f"),
            severity,
            source,
            entry.message
        );
        if let (Some(file), Some(at)) = (entry.file, entry.line) {
            line.push_str(&format!(" ({}:{})", file, at));
        }
        line
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let line = Self::format(entry, entry.severity.colored_label(), entry.source.bright_blue());
        if entry.severity == LogSeverity::Error {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

// ===== LOGGING MACROS =====

#[doc(hidden)]
#[macro_export]
macro_rules! __engine_log {
    ($severity:ident, $source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log(
            $crate::nebula::log::LogSeverity::$severity,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a TRACE message
#[macro_export]
macro_rules! engine_trace {
    ($source:expr, $($arg:tt)*) => { $crate::__engine_log!(Trace, $source, $($arg)*) };
}

/// Log a DEBUG message
#[macro_export]
macro_rules! engine_debug {
    ($source:expr, $($arg:tt)*) => { $crate::__engine_log!(Debug, $source, $($arg)*) };
}

/// Log an INFO message
///
/// ```no_run
/// # use nebula_engine::engine_info;
/// engine_info!("nebula::renderer", "Swapchain recreated at {}x{}", 1280, 720);
/// ```
#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => { $crate::__engine_log!(Info, $source, $($arg)*) };
}

/// Log a WARN message
#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => { $crate::__engine_log!(Warn, $source, $($arg)*) };
}

/// Log an ERROR message with the caller's file and line
#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::nebula::Engine::log_detailed(
            $crate::nebula::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR and evaluate to `Error::BackendError` with the same message
///
/// ```no_run
/// # use nebula_engine::engine_err;
/// # use nebula_engine::nebula::Error;
/// let err: Error = engine_err!("nebula::vulkan", "vkQueueSubmit failed: {}", -4);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::nebula::Engine::log_detailed(
            $crate::nebula::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::nebula::Error::BackendError(message)
    }};
}

/// Log an ERROR and return `Err(Error::BackendError(..))` from the enclosing function
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;

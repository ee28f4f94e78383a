//! Structured logging for the VireoOS kernel
//!
//! Provides logging with format: [subsys][LEVEL] message
//! Supports log levels: ERROR, WARN, INFO, DEBUG
//!
//! Output goes through a sink registered once at boot. Until a sink is
//! registered, messages are dropped, which keeps host-side unit tests
//! silent by default.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Log levels for kernel logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Critical errors that may leave the system unstable
    Error = 0,
    /// Warning conditions that should be addressed
    Warn = 1,
    /// Informational messages about important events
    Info = 2,
    /// Detailed debugging information
    Debug = 3,
}

impl LogLevel {
    /// Get the string representation of the log level
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Destination for formatted log lines.
pub trait LogSink: Send + Sync {
    fn write_line(&self, args: fmt::Arguments<'_>);
}

/// Global log sink, registered once at boot.
static SINK: spin::Once<&'static dyn LogSink> = spin::Once::new();

/// Global log level filter.
/// Only messages at or below this level are logged.
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

/// Register the boot log sink. Later registrations are ignored.
pub fn init(sink: &'static dyn LogSink) {
    SINK.call_once(|| sink);
}

/// Set the global log level
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Get the current global log level
pub fn get_log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        3 => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

/// Check if a log level should be logged
#[inline]
pub fn should_log(level: LogLevel) -> bool {
    level <= get_log_level()
}

/// Internal logging function
/// Format: [subsys][LEVEL] message
#[doc(hidden)]
pub fn _log(level: LogLevel, subsys: &str, args: fmt::Arguments) {
    if !should_log(level) {
        return;
    }
    if let Some(sink) = SINK.get() {
        sink.write_line(format_args!("[{}][{}] {}", subsys, level.as_str(), args));
    }
}

/// Log an error message
/// Format: [subsys][ERROR] message
#[macro_export]
macro_rules! log_error {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Error,
            $subsys,
            format_args!($($arg)*)
        )
    };
}

/// Log a warning message
/// Format: [subsys][WARN] message
#[macro_export]
macro_rules! log_warn {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Warn,
            $subsys,
            format_args!($($arg)*)
        )
    };
}

/// Log an informational message
/// Format: [subsys][INFO] message
#[macro_export]
macro_rules! log_info {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Info,
            $subsys,
            format_args!($($arg)*)
        )
    };
}

/// Log a debug message
/// Format: [subsys][DEBUG] message
#[macro_export]
macro_rules! log_debug {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Debug,
            $subsys,
            format_args!($($arg)*)
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_ordering() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn default_level_admits_info_but_not_debug() {
        assert!(should_log(LogLevel::Error));
        assert!(should_log(LogLevel::Info));
        assert!(!should_log(LogLevel::Debug));
    }
}

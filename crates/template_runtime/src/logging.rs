//! Host logging hook.
//!
//! Templates and helpers report through [`Logger`]; hosts replace the
//! default [`TracingLogger`] when they want messages routed elsewhere.

use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

/// Severity of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    /// Maps a numeric level, `0..=3`, to its severity.
    ///
    /// Unknown levels are treated as errors.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Receiver of log messages emitted through an environment.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards messages to `tracing` under the `template_runtime` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: "template_runtime", "{}", message),
            LogLevel::Info => info!(target: "template_runtime", "{}", message),
            LogLevel::Warn => warn!(target: "template_runtime", "{}", message),
            LogLevel::Error => error!(target: "template_runtime", "{}", message),
        }
    }
}

//! Leveled diagnostics for bindings and schedules.
//!
//! Every level has its own switch so callers can opt into exactly the
//! output they want. Nothing here affects control flow.

use serde::Deserialize;

/// Which diagnostic levels a binding or schedule emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Plain informational messages (`info`).
    pub console_mode: bool,
    /// Per-change detail (`debug`), including the previous value.
    pub debug_mode: bool,
    /// Error-level detail (`error`).
    pub error_mode: bool,
}

/// A diagnostic level gated by [`LogOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Debug,
    Error,
}

impl LogOptions {
    /// Every level enabled.
    pub const fn verbose() -> Self {
        Self {
            console_mode: true,
            debug_mode: true,
            error_mode: true,
        }
    }

    pub const fn any(&self) -> bool {
        self.console_mode || self.debug_mode || self.error_mode
    }

    pub const fn enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Log => self.console_mode,
            LogLevel::Debug => self.debug_mode,
            LogLevel::Error => self.error_mode,
        }
    }

    /// Emit `message` at `level` if that level is switched on.
    pub fn log(&self, level: LogLevel, target: &str, message: &str) {
        if !self.enabled(level) {
            return;
        }
        match level {
            LogLevel::Log => tracing::info!(target: "stowage", source = target, "{message}"),
            LogLevel::Debug => tracing::debug!(target: "stowage", source = target, "{message}"),
            LogLevel::Error => tracing::error!(target: "stowage", source = target, "{message}"),
        }
    }

    /// Report a labelled state transition on every enabled level.
    ///
    /// The informational line carries only the new value, the debug and
    /// error lines carry both sides of the transition.
    pub fn state_change(&self, target: &str, label: &str, prev: Option<&str>, next: &str) {
        for level in [LogLevel::Log, LogLevel::Debug, LogLevel::Error] {
            if !self.enabled(level) {
                continue;
            }
            let message = match (level, prev) {
                (LogLevel::Log, _) | (_, None) => format!("[{target}] {label}: {next}"),
                (_, Some(prev)) => format!("[{target}] {label}: {prev} -> {next}"),
            };
            self.log(level, target, &message);
        }
    }
}

//! Injected logging sink with level filters, no process-global state.
//!
//! Collapses the tag taxonomy of the original prototype's `log.py`
//! (`*E1`/`*W`/`*I`/`*V`/`*O`/`*D`, plus the per-area verbose sub-tags) into a
//! single `LogLevel` enum. A `LogSink` is constructed once and handed by value
//! into `Session`/`Transceiver` rather than reached for through a global.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Verbose,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Debug => "D",
            LogLevel::Verbose => "V",
            LogLevel::Info => "I",
            LogLevel::Warning => "W",
            LogLevel::Error => "E",
        }
    }
}

/// Injected at session/transceiver construction. Cheaply `Clone`able (an
/// `Arc` around the filter), so every thread spawned for a session shares the
/// same sink without needing a global.
#[derive(Clone)]
pub struct LogSink {
    min_level: Arc<LogLevel>,
}

impl LogSink {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level: Arc::new(min_level) }
    }

    /// Matches `--disable-log`: only errors get through.
    pub fn disabled() -> Self {
        Self::new(LogLevel::Error)
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= *self.min_level
    }

    pub fn log(&self, level: LogLevel, area: &str, msg: &str) {
        if !self.enabled(level) {
            return;
        }

        let line = format!("[{}][{}] {}", level.tag(), area, msg);

        if level >= LogLevel::Warning {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    pub fn error(&self, area: &str, msg: &str) {
        self.log(LogLevel::Error, area, msg);
    }

    pub fn warning(&self, area: &str, msg: &str) {
        self.log(LogLevel::Warning, area, msg);
    }

    pub fn info(&self, area: &str, msg: &str) {
        self.log(LogLevel::Info, area, msg);
    }

    pub fn verbose(&self, area: &str, msg: &str) {
        self.log(LogLevel::Verbose, area, msg);
    }

    pub fn debug(&self, area: &str, msg: &str) {
        self.log(LogLevel::Debug, area, msg);
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

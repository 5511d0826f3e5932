use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
}

/// Receiver for diagnostic events raised by the core.
///
/// Components take an `Arc<dyn DiagnosticSink>` at construction instead of
/// reaching a global logger, so hosts decide where events go.
pub trait DiagnosticSink: Send + Sync + 'static {
    fn emit(&self, level: Level, target: &'static str, args: fmt::Arguments);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, level: Level, target: &'static str, args: fmt::Arguments) {
        match level {
            Level::Trace => log::trace!(target: target, "{args}"),
            Level::Debug => log::debug!(target: target, "{args}"),
            Level::Info => log::info!(target: target, "{args}"),
            Level::Warn => log::warn!(target: target, "{args}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _level: Level, _target: &'static str, _args: fmt::Arguments) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub level: Level,
    pub target: &'static str,
    pub message: String,
}

/// Keeps every event in memory. Mostly useful for asserting on warnings.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, level: Level, target: &'static str, args: fmt::Arguments) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Event {
                level,
                target,
                message: args.to_string(),
            });
    }
}

pub fn default_sink() -> Arc<dyn DiagnosticSink> {
    Arc::new(LogSink)
}

macro_rules! diag {
    ($sink:expr, $level:ident, $target:expr, $($arg:tt)*) => {
        $sink.emit($crate::diagnostics::Level::$level, $target, format_args!($($arg)*))
    };
}

pub(crate) use diag;

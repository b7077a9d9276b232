//! Print and log message routing.
//!
//! Two sinks: a *print* sink for user-facing solver output, filtered by a
//! message-level bitmask, and a *log* sink for single-line INFO / WARNING /
//! ERROR records. Either slot may carry an installed callback; without one,
//! messages go to the configured writer (stdout by default).
//!
//! The engine owns a sink instance per solve. The process-wide sink at the
//! bottom of this module is a convenience wrapper over the same type.

use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Instant;

/// No messages.
pub const ML_NONE: u32 = 0;
/// Verbose output.
pub const ML_VERBOSE: u32 = 1;
/// Detailed output.
pub const ML_DETAILED: u32 = 2;
/// Minimal output; the default level.
pub const ML_MINIMAL: u32 = 4;
/// Matches every nonzero mask.
pub const ML_ALWAYS: u32 = ML_VERBOSE | ML_DETAILED | ML_MINIMAL;

/// Log record classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Info,
    Warning,
    Error,
}

impl MessageType {
    fn tag(self) -> &'static str {
        match self {
            MessageType::Info => "INFO",
            MessageType::Warning => "WARNING",
            MessageType::Error => "ERROR",
        }
    }
}

/// Installed print callback: (level, message).
pub type PrintCallback = Box<dyn Fn(u32, &str) + Send>;
/// Installed log callback: (type, message).
pub type LogCallback = Box<dyn Fn(MessageType, &str) + Send>;

/// A pair of message destinations with level filtering.
pub struct MessageSink {
    message_level: u32,
    print_callback: Option<PrintCallback>,
    log_callback: Option<LogCallback>,
    output: Box<dyn Write + Send>,
    logfile: Box<dyn Write + Send>,
    started: Instant,
}

impl Default for MessageSink {
    fn default() -> Self {
        Self::new(ML_MINIMAL)
    }
}

impl std::fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSink")
            .field("message_level", &self.message_level)
            .field("print_callback", &self.print_callback.is_some())
            .field("log_callback", &self.log_callback.is_some())
            .finish()
    }
}

impl MessageSink {
    pub fn new(message_level: u32) -> Self {
        MessageSink {
            message_level,
            print_callback: None,
            log_callback: None,
            output: Box::new(io::stdout()),
            logfile: Box::new(io::stdout()),
            started: Instant::now(),
        }
    }

    /// A sink that discards everything; used by tests and by callers that
    /// want a silent solve.
    pub fn quiet() -> Self {
        MessageSink {
            message_level: ML_NONE,
            print_callback: None,
            log_callback: None,
            output: Box::new(io::sink()),
            logfile: Box::new(io::sink()),
            started: Instant::now(),
        }
    }

    pub fn message_level(&self) -> u32 {
        self.message_level
    }

    pub fn set_message_level(&mut self, level: u32) {
        self.message_level = level;
    }

    /// Redirect print output. Replaces any earlier writer.
    pub fn set_output(&mut self, output: Box<dyn Write + Send>) {
        self.output = output;
    }

    /// Redirect log output. Replaces any earlier writer.
    pub fn set_logfile(&mut self, logfile: Box<dyn Write + Send>) {
        self.logfile = logfile;
    }

    /// Install (or with `None`, reset) the print and log callbacks.
    pub fn set_callbacks(
        &mut self,
        print_callback: Option<PrintCallback>,
        log_callback: Option<LogCallback>,
    ) {
        self.print_callback = print_callback;
        self.log_callback = log_callback;
    }

    /// Emit a user-facing message when `level` is enabled by the mask.
    pub fn print(&mut self, level: u32, message: &str) {
        if level & self.message_level == 0 {
            return;
        }
        if let Some(cb) = &self.print_callback {
            cb(level, message);
        } else {
            let _ = writeln!(self.output, "{}", message);
        }
    }

    /// Emit a single-line log record with elapsed time and type tag.
    /// Log records are not filtered by the message level.
    pub fn log(&mut self, message_type: MessageType, message: &str) {
        if let Some(cb) = &self.log_callback {
            cb(message_type, message);
        } else {
            let elapsed = self.started.elapsed().as_secs_f64();
            let _ = writeln!(
                self.logfile,
                "{:11.6} [{}] {}",
                elapsed,
                message_type.tag(),
                message
            );
        }
    }
}

static GLOBAL_SINK: Mutex<Option<MessageSink>> = Mutex::new(None);

/// Install the process-wide sink, replacing any earlier one.
pub fn install_global_sink(sink: MessageSink) {
    *GLOBAL_SINK.lock().unwrap() = Some(sink);
}

/// Remove the process-wide sink, restoring default stdout behaviour.
pub fn reset_global_sink() {
    *GLOBAL_SINK.lock().unwrap() = None;
}

/// Print through the process-wide sink, or a default sink if none is
/// installed.
pub fn print_message(level: u32, message: &str) {
    let mut guard = GLOBAL_SINK.lock().unwrap();
    match guard.as_mut() {
        Some(sink) => sink.print(level, message),
        None => MessageSink::default().print(level, message),
    }
}

/// Log through the process-wide sink, or a default sink if none is
/// installed.
pub fn log_message(message_type: MessageType, message: &str) {
    let mut guard = GLOBAL_SINK.lock().unwrap();
    match guard.as_mut() {
        Some(sink) => sink.log(message_type, message),
        None => MessageSink::default().log(message_type, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_level_mask_filters_print() {
        let (tx, rx) = mpsc::channel();
        let mut sink = MessageSink::new(ML_MINIMAL);
        sink.set_callbacks(
            Some(Box::new(move |level, msg| {
                tx.send((level, msg.to_string())).unwrap();
            })),
            None,
        );
        sink.print(ML_VERBOSE, "hidden");
        sink.print(ML_MINIMAL, "shown");
        sink.print(ML_ALWAYS, "always shown");
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].1, "shown");
        assert_eq!(got[1].1, "always shown");
    }

    #[test]
    fn test_log_ignores_mask() {
        let (tx, rx) = mpsc::channel();
        let mut sink = MessageSink::new(ML_NONE);
        sink.set_callbacks(
            None,
            Some(Box::new(move |ty, msg| {
                tx.send((ty, msg.to_string())).unwrap();
            })),
        );
        sink.log(MessageType::Warning, "still logged");
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, MessageType::Warning);
    }
}

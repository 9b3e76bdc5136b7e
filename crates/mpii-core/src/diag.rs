//! Verbosity-gated diagnostics.
//!
//! Every message is a [`DiagEvent`]. Text output keeps the classic one-line
//! layout; JSON output writes one object per line with `rank`, `size`,
//! `level` and the event fields. Output goes to stderr, or to an in-memory
//! buffer for tests.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::LogFormat;
use crate::metrics::MetricsSnapshot;

/// One diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagEvent {
    Entering {
        function: &'static str,
    },
    Leaving {
        function: &'static str,
    },
    Instrumenting {
        function: &'static str,
    },
    Unavailable {
        function: &'static str,
    },
    Overlap {
        thread: u64,
        function: &'static str,
        other_thread: u64,
        other_function: Option<&'static str>,
        active: i32,
    },
    OverlappedExit {
        thread: u64,
        function: &'static str,
        other_thread: u64,
        other_function: Option<&'static str>,
        active: i32,
    },
    Initialized {
        flavor: &'static str,
        provided: &'static str,
        reported: &'static str,
        serialize: bool,
    },
    LifecycleMisuse {
        function: &'static str,
        detail: String,
    },
    OutsideActivePhase {
        function: &'static str,
        phase: &'static str,
    },
    Summary {
        metrics: MetricsSnapshot,
    },
}

impl DiagEvent {
    /// Minimum verbosity at which the event is shown.
    #[must_use]
    pub const fn level(&self) -> u8 {
        match self {
            Self::Overlap { .. }
            | Self::OverlappedExit { .. }
            | Self::Unavailable { .. }
            | Self::LifecycleMisuse { .. } => 0,
            Self::Instrumenting { .. } | Self::Initialized { .. } | Self::Summary { .. } => 1,
            Self::Entering { .. } | Self::Leaving { .. } | Self::OutsideActivePhase { .. } => 2,
        }
    }

    fn render_text(&self, rank: i32, size: i32) -> String {
        match self {
            Self::Entering { function } => format!("[{rank}/{size}]\tEntering {function}"),
            Self::Leaving { function } => format!("[{rank}/{size}]\tLeaving {function}"),
            Self::Instrumenting { function } => format!("Instrumenting {function} using dlsym"),
            Self::Unavailable { function } => format!(
                "Error: {function} is unavailable: no native implementation was found"
            ),
            Self::Overlap {
                thread,
                function,
                other_thread,
                other_function,
                active,
            } => format!(
                "Warning: thread {thread:x} calls {function} while thread {other_thread:x} calls {}! {active}",
                other_function.unwrap_or("(unknown)")
            ),
            Self::OverlappedExit {
                thread,
                function,
                other_thread,
                other_function,
                active,
            } => format!(
                "Warning: thread {thread:x} leaves {function} while thread {other_thread:x} is in {}! {active}",
                other_function.unwrap_or("(unknown)")
            ),
            Self::Initialized {
                flavor,
                provided,
                reported,
                serialize,
            } => format!(
                "[{rank}/{size}]\tMPI initialized: abi={flavor} provided={provided} reported={reported} serialize={serialize}"
            ),
            Self::LifecycleMisuse { function, detail } => {
                format!("Warning: {function}: {detail}")
            }
            Self::OutsideActivePhase { function, phase } => {
                format!("[{rank}/{size}]\t{function} called while MPI is {phase}")
            }
            Self::Summary { metrics } => format!("[{rank}/{size}]\tSummary: {metrics}"),
        }
    }
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    rank: i32,
    size: i32,
    level: u8,
    #[serde(flatten)]
    event: &'a DiagEvent,
}

#[derive(Debug, Clone)]
enum Sink {
    Stderr,
    Buffer(Arc<Mutex<Vec<u8>>>),
}

/// Diagnostic writer.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    verbose: u8,
    format: LogFormat,
    sink: Sink,
}

impl Diagnostics {
    #[must_use]
    pub fn stderr(verbose: u8, format: LogFormat) -> Self {
        Self {
            verbose,
            format,
            sink: Sink::Stderr,
        }
    }

    /// Writer that collects output in memory; returns the shared buffer.
    #[must_use]
    pub fn capture(verbose: u8, format: LogFormat) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let diag = Self {
            verbose,
            format,
            sink: Sink::Buffer(Arc::clone(&buffer)),
        };
        (diag, buffer)
    }

    #[must_use]
    pub const fn verbose(&self) -> u8 {
        self.verbose
    }

    #[must_use]
    pub const fn enabled(&self, level: u8) -> bool {
        self.verbose >= level
    }

    /// Render `event` as one line, or `None` if it is below the verbosity.
    #[must_use]
    pub fn render(&self, rank: i32, size: i32, event: &DiagEvent) -> Option<String> {
        let level = event.level();
        if !self.enabled(level) {
            return None;
        }
        let line = match self.format {
            LogFormat::Text => event.render_text(rank, size),
            LogFormat::Json => serde_json::to_string(&JsonRecord {
                rank,
                size,
                level,
                event,
            })
            .unwrap_or_else(|err| format!("{{\"event\":\"encode_error\",\"error\":\"{err}\"}}")),
        };
        Some(line)
    }

    pub fn emit(&self, rank: i32, size: i32, event: &DiagEvent) {
        let Some(mut line) = self.render(rank, size, event) else {
            return;
        };
        line.push('\n');
        match &self.sink {
            Sink::Stderr => {
                let _ = std::io::stderr().lock().write_all(line.as_bytes());
            }
            Sink::Buffer(buffer) => buffer.lock().extend_from_slice(line.as_bytes()),
        }
    }
}

//! Operator-facing progress lines.
//!
//! Every step of an analysis or repair reports one human-readable line.
//! The console sink prints it and logs it; tests record it.

use tracing::{info, warn};

pub trait Progress {
    fn line(&mut self, message: &str);

    fn warning(&mut self, message: &str) {
        self.line(&format!("WARNING: {message}"));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

/// Prints progress lines and mirrors them into the log.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleProgress {
    stream: ConsoleStream,
}

impl ConsoleProgress {
    pub fn new(stream: ConsoleStream) -> Self {
        Self { stream }
    }

    fn emit(&self, text: &str) {
        match self.stream {
            ConsoleStream::Stdout => println!("{text}"),
            ConsoleStream::Stderr => eprintln!("{text}"),
        }
    }
}

impl Progress for ConsoleProgress {
    fn line(&mut self, message: &str) {
        self.emit(message);
        info!(target: "quadfix::progress", "{message}");
    }

    fn warning(&mut self, message: &str) {
        self.emit(&format!("WARNING: {message}"));
        warn!(target: "quadfix::progress", "{message}");
    }
}

/// Collects lines in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordedProgress {
    pub lines: Vec<String>,
}

impl RecordedProgress {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl Progress for RecordedProgress {
    fn line(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }
}

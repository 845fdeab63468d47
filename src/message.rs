use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::SolveError;

/// Messages carried to the host UI. The solver core never prints; everything
/// user-visible flows through a `Report` implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Status(String),
    InProgress {
        entry: usize,
        examined: usize,
        total: usize,
        inserted: usize,
    },
    Success {
        positions: usize,
    },
    Error(String),
    Abort(String),
}

pub trait Report: Send + Sync {
    fn report(&self, message: Message);
}

/// Prints messages to stdout and appends `Status` lines to the configured
/// output file.
pub struct ConsoleReporter {
    output: Option<Mutex<std::fs::File>>,
}

impl ConsoleReporter {
    pub fn new(output_file: Option<&PathBuf>) -> Result<Self, SolveError> {
        let output = match output_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|_| SolveError::InvalidFile(path.display().to_string()))?;
                Some(Mutex::new(file))
            }
            None => None,
        };
        Ok(Self { output })
    }
}

impl Report for ConsoleReporter {
    fn report(&self, message: Message) {
        match &message {
            Message::Status(text) => {
                println!("{}", text);
                if let Some(file) = &self.output {
                    let mut file = file.lock().unwrap();
                    let _ = writeln!(file, "{}", text);
                }
            }
            Message::InProgress {
                entry,
                examined,
                total,
                inserted,
            } => {
                eprintln!(
                    "entry {}: {}/{} positions examined, {} inserted",
                    entry, examined, total, inserted
                );
            }
            Message::Success { positions } => {
                println!("done: {} position(s)", positions);
            }
            Message::Error(text) => eprintln!("error: {}", text),
            Message::Abort(text) => eprintln!("aborted: {}", text),
        }
    }
}

/// Swallows everything. Used by tests that only care about the frontier.
pub struct SilentReporter;

impl Report for SilentReporter {
    fn report(&self, _message: Message) {}
}

/// Records every message for later inspection.
pub struct RecordingReporter {
    pub messages: Mutex<Vec<Message>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }
}

impl Default for RecordingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Report for RecordingReporter {
    fn report(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }
}

//! IPC bridge: stdin reader and stdout event emitter.
//!
//! A blocking stdin reader thread sends deserialized commands through an
//! mpsc channel into the async main loop, and a helper emits JSON-line
//! events to stdout. stderr carries the tracing output so stdout stays a
//! clean protocol channel.

use std::io::{self, BufRead, Write};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{ShellCommand, ShellEvent};

/// Emit a `ShellEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &ShellEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Ignore write/flush errors — pipe may be closed.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

/// Convenience helper for emitting error events.
pub fn emit_error(message: &str) {
    emit_event(&ShellEvent::Error {
        message: message.to_string(),
    });
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `ShellCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (shell process gone) or on
/// unrecoverable read error. Invalid lines are reported back to the shell
/// and skipped — a typo in one command never takes the core down.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<ShellCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        let reader = stdin.lock();
        for line in reader.lines() {
            match line {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ShellCommand>(trimmed) {
                        Ok(cmd) => {
                            debug!(?cmd, "Received command from shell");
                            if tx.send(cmd).is_err() {
                                break; // Receiver dropped — main task is gone.
                            }
                        }
                        Err(e) => {
                            error!("Invalid JSON command: {} — input: {}", e, trimmed);
                            emit_error(&format!("Invalid JSON command: {}", e));
                        }
                    }
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break; // stdin closed
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}

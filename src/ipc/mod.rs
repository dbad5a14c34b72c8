//! IPC protocol types for communication with the mobile shell.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> shell).
//! Commands use `{"command": "<name>", ...}` format (shell -> core).
//!
//! The shell is a thin collaborator: it renders the screens, owns the
//! platform Bluetooth socket and the accelerometer, and forwards taps and
//! sensor samples here. Everything stateful lives on this side.

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::robot::{Accessory, Direction, SpeedLevel};

// ---------------------------------------------------------------------------
// Events: core -> shell (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the shell via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ShellEvent {
    Starting {},
    Ready {},
    /// Session lifecycle edge; `state` is the lowercase state name.
    SessionState { state: String },
    /// The user is (or stopped) being heard by the service.
    Listening { active: bool },
    /// The assistant is (or stopped) speaking.
    Speaking { active: bool },
    /// Incremental assistant transcript text for the activity log.
    Transcript { delta: String },
    /// A tool call was recognized; shown in the activity log.
    FunctionCall { name: String },
    /// One encoded robot command; the shell writes `payload` verbatim to
    /// its Bluetooth serial socket.
    RobotCommand { payload: String },
    /// A debounced accelerometer trigger fired ("fall" or "pickup").
    SensorTrigger { kind: String },
    /// The session ended; the shell should stop local media capture.
    StopCapture {},
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: shell -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the shell via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum ShellCommand {
    /// Start a realtime session (connect button).
    Connect {},
    /// Tear the session down (disconnect button, screen exit).
    Disconnect {},
    /// D-pad press: timed move with optional overrides.
    ManualMove {
        direction: Direction,
        #[serde(default)]
        speed: Option<u8>,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    /// All-stop button.
    Stop {},
    SetColor {
        color: String,
    },
    SetSpeed {
        level: SpeedLevel,
    },
    SetAccessory {
        kind: Accessory,
        on: bool,
    },
    PlayPattern {
        name: String,
    },
    /// Text typed in the chat box, injected as a user turn.
    Say {
        text: String,
    },
    /// One accelerometer reading (m/s² per axis) at the shell's sampling
    /// interval.
    SensorSample {
        x: f64,
        y: f64,
        z: f64,
    },
    /// Replace the runtime configuration (applies to the next session).
    ConfigUpdate {
        #[serde(default)]
        config: serde_json::Value,
    },
    Ping {},
    Shutdown {},
}

//! Robot wire protocol types and the Bluetooth link seam.
//!
//! The PicoGo firmware reads JSON objects off its serial UART, one or a few
//! key/value pairs per object, values always strings: `{"Forward":"Down"}`,
//! `{"RGB":"(255,0,0)"}`, `{"BZ":"on"}`. Writes are fire-and-forget — the
//! robot sends status lines back but never acknowledges a command.
//!
//! The shell process owns the actual Bluetooth socket (scan/pair/connect are
//! platform UX, out of scope here); the core hands it encoded commands
//! through the [`RobotLink`] seam.

pub mod encoder;
pub mod sequencer;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One atomic actuator instruction: a single key/value pair in the PicoGo
/// wire protocol. Immutable; both halves come from fixed tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub key: &'static str,
    pub value: &'static str,
}

impl Command {
    pub const fn new(key: &'static str, value: &'static str) -> Self {
        Self { key, value }
    }

    /// Serialize to the single-pair JSON object the firmware expects.
    pub fn wire_json(&self) -> String {
        serde_json::json!({ (self.key): self.value }).to_string()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// The four motion axes plus the all-stop pseudo-direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    /// Parse a spoken/typed direction name. Unknown names are an error —
    /// the caller decides the fallback, the parser never guesses.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "backward" | "back" => Ok(Self::Backward),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "stop" => Ok(Self::Stop),
            other => Err(BridgeError::InvalidDirection(other.to_string())),
        }
    }

    /// Wire key for this axis. `Stop` has no key of its own — it is
    /// expressed as Up on all four axes.
    pub fn axis_key(&self) -> Option<&'static str> {
        match self {
            Self::Forward => Some("Forward"),
            Self::Backward => Some("Backward"),
            Self::Left => Some("Left"),
            Self::Right => Some("Right"),
            Self::Stop => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Backward => write!(f, "backward"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// The robot's discrete speed settings. The firmware only understands three
/// levels (30/50/80 percent duty internally); numeric speeds from the AI or
/// the shell are quantized onto them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedLevel {
    Low,
    Medium,
    High,
}

impl SpeedLevel {
    /// Parse a level name; unknown names default to Medium, not an error.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" | "slow" => Self::Low,
            "high" | "fast" => Self::High,
            _ => Self::Medium,
        }
    }

    /// Quantize a 0-100 speed onto the three wire levels.
    pub fn for_percent(percent: u8) -> Self {
        match percent {
            0..=39 => Self::Low,
            40..=64 => Self::Medium,
            _ => Self::High,
        }
    }

    /// The nominal percentage this level runs at on the firmware side.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Low => 30,
            Self::Medium => 50,
            Self::High => 80,
        }
    }
}

/// Non-motion actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accessory {
    Buzzer,
    Led,
    Toy,
}

/// Write seam to the Bluetooth serial socket. Exactly one owner (the motion
/// sequencer) holds this; nothing else touches the robot.
pub trait RobotLink: Send + Sync {
    /// Fire-and-forget write of one command. No acknowledgement framing.
    fn send(&self, cmd: &Command) -> Result<()>;
}

/// Production link: hands the encoded command to the shell, which owns the
/// paired Bluetooth socket and writes the payload to the robot verbatim.
pub struct ShellRobotLink;

impl RobotLink for ShellRobotLink {
    fn send(&self, cmd: &Command) -> Result<()> {
        crate::ipc::bridge::emit_event(&crate::ipc::ShellEvent::RobotCommand {
            payload: cmd.wire_json(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_json_is_single_pair() {
        let cmd = Command::new("Forward", "Down");
        assert_eq!(cmd.wire_json(), r#"{"Forward":"Down"}"#);
    }

    #[test]
    fn test_direction_from_name_rejects_unknown() {
        assert!(matches!(
            Direction::from_name("sideways"),
            Err(BridgeError::InvalidDirection(_))
        ));
        assert_eq!(Direction::from_name("  Forward ").unwrap(), Direction::Forward);
        assert_eq!(Direction::from_name("back").unwrap(), Direction::Backward);
    }

    #[test]
    fn test_speed_level_quantization() {
        assert_eq!(SpeedLevel::for_percent(0), SpeedLevel::Low);
        assert_eq!(SpeedLevel::for_percent(39), SpeedLevel::Low);
        assert_eq!(SpeedLevel::for_percent(50), SpeedLevel::Medium);
        assert_eq!(SpeedLevel::for_percent(100), SpeedLevel::High);
    }

    #[test]
    fn test_unknown_speed_name_defaults_to_medium() {
        assert_eq!(SpeedLevel::from_name("ludicrous"), SpeedLevel::Medium);
    }
}

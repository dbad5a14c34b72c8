//! Actuator command encoder: pure lookup tables, no I/O.
//!
//! Every function here is deterministic and side-effect free; the wire keys
//! and values mirror the PicoGo firmware's UART handler exactly.

use crate::error::{BridgeError, Result};
use crate::robot::{Accessory, Command, Direction, SpeedLevel};

/// Press/release pair for one motion axis. The firmware treats `Down` as
/// "button held" and `Up` as "button released" on the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionPair {
    pub press: Command,
    pub release: Command,
}

/// Encode a motion direction into its press/release command pair.
///
/// `Direction::Stop` has no pair — all-stop is four releases, handled by
/// the sequencer — so it fails here like any other non-axis value.
pub fn encode_motion(direction: Direction) -> Result<MotionPair> {
    let key = direction
        .axis_key()
        .ok_or_else(|| BridgeError::InvalidDirection(direction.to_string()))?;
    Ok(MotionPair {
        press: Command::new(key, "Down"),
        release: Command::new(key, "Up"),
    })
}

/// Release commands for all four axes, in a fixed order. Sent together they
/// are the unconditional all-stop.
pub const ALL_STOP: [Command; 4] = [
    Command::new("Forward", "Up"),
    Command::new("Backward", "Up"),
    Command::new("Left", "Up"),
    Command::new("Right", "Up"),
];

const COLOR_TABLE: &[(&str, &str)] = &[
    ("red", "(255,0,0)"),
    ("green", "(0,255,0)"),
    ("blue", "(0,0,255)"),
    ("yellow", "(255,255,0)"),
    ("cyan", "(0,255,255)"),
    ("magenta", "(255,0,255)"),
    ("white", "(255,255,255)"),
    ("off", "(0,0,0)"),
];

/// Encode a color name into an RGB strip command.
///
/// Unknown names fall back to white, deliberately not an error — the light
/// always ends up in a known state.
pub fn encode_color(name: &str) -> Command {
    let wanted = name.trim().to_ascii_lowercase();
    let value = COLOR_TABLE
        .iter()
        .find(|(n, _)| *n == wanted)
        .map(|(_, v)| *v)
        .unwrap_or("(255,255,255)");
    Command::new("RGB", value)
}

/// Encode a speed level. The firmware latches the level until changed.
pub fn encode_speed(level: SpeedLevel) -> Command {
    match level {
        SpeedLevel::Low => Command::new("Low", "Down"),
        SpeedLevel::Medium => Command::new("Medium", "Down"),
        SpeedLevel::High => Command::new("High", "Down"),
    }
}

/// Encode an accessory on/off toggle.
pub fn encode_accessory(kind: Accessory, on: bool) -> Command {
    let value = if on { "on" } else { "off" };
    match kind {
        Accessory::Buzzer => Command::new("BZ", value),
        Accessory::Led => Command::new("LED", value),
        Accessory::Toy => Command::new("ToyGPIO15", value),
    }
}

/// Encode the toy GPIO pulse cycle (release, press, release on the K2 pin —
/// timed on the firmware side).
pub fn encode_toy_pulse() -> Command {
    Command::new("ToyGPIO15Pulse", "pulse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_pairs_are_down_up_on_same_key() {
        for direction in [
            Direction::Forward,
            Direction::Backward,
            Direction::Left,
            Direction::Right,
        ] {
            let pair = encode_motion(direction).unwrap();
            assert_eq!(pair.press.key, pair.release.key);
            assert_eq!(pair.press.value, "Down");
            assert_eq!(pair.release.value, "Up");
        }
    }

    #[test]
    fn test_stop_has_no_motion_pair() {
        assert!(matches!(
            encode_motion(Direction::Stop),
            Err(BridgeError::InvalidDirection(_))
        ));
    }

    #[test]
    fn test_all_stop_covers_every_axis_with_up() {
        let keys: Vec<&str> = ALL_STOP.iter().map(|c| c.key).collect();
        assert_eq!(keys, ["Forward", "Backward", "Left", "Right"]);
        assert!(ALL_STOP.iter().all(|c| c.value == "Up"));
    }

    #[test]
    fn test_color_table() {
        assert_eq!(encode_color("red"), Command::new("RGB", "(255,0,0)"));
        assert_eq!(encode_color(" Cyan "), Command::new("RGB", "(0,255,255)"));
        assert_eq!(encode_color("off"), Command::new("RGB", "(0,0,0)"));
    }

    #[test]
    fn test_unknown_color_falls_back_to_white() {
        assert_eq!(encode_color("mauve"), Command::new("RGB", "(255,255,255)"));
    }

    #[test]
    fn test_speed_and_accessory_encoding() {
        assert_eq!(encode_speed(SpeedLevel::Low), Command::new("Low", "Down"));
        assert_eq!(
            encode_accessory(Accessory::Buzzer, true),
            Command::new("BZ", "on")
        );
        assert_eq!(
            encode_accessory(Accessory::Led, false),
            Command::new("LED", "off")
        );
        assert_eq!(encode_toy_pulse(), Command::new("ToyGPIO15Pulse", "pulse"));
    }
}

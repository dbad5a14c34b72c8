//! Bridge configuration: one JSON file, every field defaulted.
//!
//! The shell's settings screens write `bridge_config.json` into the data
//! directory; the core only ever reads it. Voice-controller variants differ
//! only in these values, so they are configuration, not separate code paths.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::get_data_dir;

const DEFAULT_SYSTEM_PROMPT: &str = "You are the voice of a small tracked toy robot. \
You can drive around, change your light color, beep, and perform little dance patterns. \
Keep replies short and playful, and use your movement functions whenever the user asks \
you to do something physical.";

/// Everything the bridge needs to run one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Free-text instructions sent in the session configuration message.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Speed used when a function call omits `speed` (0-100).
    #[serde(default = "default_speed")]
    pub default_speed: u8,
    /// Hold time used when a function call omits `duration` (ms).
    #[serde(default = "default_duration_ms")]
    pub default_duration_ms: u64,
    /// Whether the tool schema is sent at all. Off makes the session
    /// conversation-only.
    #[serde(default = "default_true")]
    pub tools_enabled: bool,
    /// HTTP endpoint that mints the short-lived realtime credential.
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    /// Realtime service URL the transport dials.
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    /// Voice preset for spoken replies.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Feature gate: inject a conversational turn when the robot falls.
    #[serde(default)]
    pub fall_detection: bool,
    /// Feature gate: inject a conversational turn when the robot is
    /// picked up.
    #[serde(default)]
    pub pickup_detection: bool,
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_speed() -> u8 {
    50
}

fn default_duration_ms() -> u64 {
    1500
}

fn default_true() -> bool {
    true
}

fn default_token_endpoint() -> String {
    "http://localhost:3000/session".to_string()
}

fn default_realtime_url() -> String {
    "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        // Serde defaults are the single source of truth.
        serde_json::from_str("{}").expect("empty config object must deserialize")
    }
}

/// Read bridge_config.json from the data directory; missing or unreadable
/// files yield the defaults.
pub fn read_bridge_config() -> BridgeConfig {
    read_json_file(&get_config_path()).unwrap_or_default()
}

/// Path to bridge_config.json.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("bridge_config.json")
}

/// Generic helper: read a JSON file and deserialize it.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.default_speed, 50);
        assert_eq!(cfg.default_duration_ms, 1500);
        assert!(cfg.tools_enabled);
        assert!(!cfg.fall_detection);
        assert!(cfg.realtime_url.starts_with("wss://"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let cfg: BridgeConfig =
            serde_json::from_str(r#"{"defaultSpeed": 80, "fallDetection": true}"#).unwrap();
        assert_eq!(cfg.default_speed, 80);
        assert!(cfg.fall_detection);
        assert_eq!(cfg.default_duration_ms, 1500);
    }
}

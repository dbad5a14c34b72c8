//! Outbound client event builders for the realtime data channel.
//!
//! One concrete wire contract: `session.update` configures the session,
//! `conversation.item.create` adds user messages and function results, and
//! `response.create` asks for the next assistant turn.

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::BridgeConfig;
use crate::dispatch::tool_schema;

/// The structured body of a `function_call_output` item, serialized to a
/// JSON string per the wire format.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FunctionOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FunctionOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// The single session-configuration message, sent once before any function
/// dispatch is allowed.
pub fn session_update(config: &BridgeConfig) -> Value {
    let mut session = json!({
        "instructions": config.system_prompt,
        "voice": config.voice,
        "modalities": ["text", "audio"],
    });
    if config.tools_enabled {
        session["tools"] = Value::Array(tool_schema());
        session["tool_choice"] = json!("auto");
    }
    json!({ "type": "session.update", "session": session })
}

/// A synthesized user turn (typed text, or a sensor-trigger phrase injected
/// as if spoken by the user).
pub fn user_message(text: &str) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": "user",
            "content": [{ "type": "input_text", "text": text }]
        }
    })
}

/// The one structured result for a function call, correlated by `call_id`.
pub fn function_output(call_id: &str, output: &FunctionOutput) -> Value {
    json!({
        "type": "conversation.item.create",
        "item": {
            "type": "function_call_output",
            "call_id": call_id,
            "output": serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string()),
        }
    })
}

/// Request the next assistant turn.
pub fn response_create() -> Value {
    json!({ "type": "response.create" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_carries_tools_when_enabled() {
        let config = BridgeConfig::default();
        let update = session_update(&config);
        assert_eq!(update["type"], "session.update");
        assert_eq!(update["session"]["modalities"][0], "text");
        assert!(update["session"]["tools"].as_array().unwrap().len() > 5);
    }

    #[test]
    fn test_session_update_omits_tools_when_disabled() {
        let config = BridgeConfig {
            tools_enabled: false,
            ..BridgeConfig::default()
        };
        let update = session_update(&config);
        assert!(update["session"].get("tools").is_none());
    }

    #[test]
    fn test_function_output_is_json_string_payload() {
        let out = function_output("call_9", &FunctionOutput::ok("moving forward"));
        assert_eq!(out["item"]["call_id"], "call_9");
        let embedded: Value =
            serde_json::from_str(out["item"]["output"].as_str().unwrap()).unwrap();
        assert_eq!(embedded["success"], true);
        assert_eq!(embedded["message"], "moving forward");
        assert!(embedded.get("error").is_none());
    }

    #[test]
    fn test_user_message_shape() {
        let msg = user_message("I just fell over!");
        assert_eq!(msg["type"], "conversation.item.create");
        assert_eq!(msg["item"]["role"], "user");
        assert_eq!(msg["item"]["content"][0]["text"], "I just fell over!");
    }
}

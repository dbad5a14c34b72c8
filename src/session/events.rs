//! Inbound event decoder for the realtime data channel.
//!
//! Each raw message is classified into one of a closed set of kinds and
//! routed from a single place — no scattered inline handlers, and the state
//! machine stays testable without a live transport.
//!
//! Unknown event types are expected: the service adds kinds over time.
//! They decode to [`DecodedEvent::Unknown`] and are logged and ignored,
//! never fatal. Only malformed JSON (or a missing `type` field) is a
//! protocol error, and even that just drops the one message.

use serde_json::Value;

use crate::error::{BridgeError, Result};

/// A tool invocation extracted from a completed response. `arguments` is
/// kept as the raw JSON string the wire carries; the dispatcher parses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub call_id: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Created,
    Updated,
}

/// The closed classification of inbound events.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    SessionLifecycle {
        kind: LifecycleKind,
        session_id: Option<String>,
    },
    /// The service's VAD heard the user start/stop talking.
    SpeechBoundary { started: bool },
    /// Incremental assistant transcript text.
    TranscriptDelta { delta: String },
    /// Assistant audio playback started/stopped.
    AudioBoundary { speaking: bool },
    /// A full response finished; carries zero or more function calls in
    /// array order.
    ResponseComplete { calls: Vec<FunctionCall> },
    /// Service-reported error. Non-fatal by default.
    ServiceError { message: String },
    Unknown { event_type: String },
}

/// Decode one raw data-channel message.
pub fn decode(raw: &str) -> Result<DecodedEvent> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| BridgeError::Protocol(format!("malformed event JSON: {}", e)))?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Protocol("event missing type field".to_string()))?;

    let decoded = match event_type {
        "session.created" => DecodedEvent::SessionLifecycle {
            kind: LifecycleKind::Created,
            session_id: session_id_of(&value),
        },
        "session.updated" => DecodedEvent::SessionLifecycle {
            kind: LifecycleKind::Updated,
            session_id: session_id_of(&value),
        },
        "input_audio_buffer.speech_started" => DecodedEvent::SpeechBoundary { started: true },
        "input_audio_buffer.speech_stopped" => DecodedEvent::SpeechBoundary { started: false },
        "response.audio_transcript.delta" => DecodedEvent::TranscriptDelta {
            delta: value
                .get("delta")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        "output_audio_buffer.started" => DecodedEvent::AudioBoundary { speaking: true },
        "output_audio_buffer.stopped" | "output_audio_buffer.cleared" => {
            DecodedEvent::AudioBoundary { speaking: false }
        }
        "response.done" => DecodedEvent::ResponseComplete {
            calls: extract_function_calls(&value),
        },
        "error" => DecodedEvent::ServiceError {
            message: value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified service error")
                .to_string(),
        },
        other => DecodedEvent::Unknown {
            event_type: other.to_string(),
        },
    };
    Ok(decoded)
}

fn session_id_of(value: &Value) -> Option<String> {
    value
        .pointer("/session/id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pull function-call items out of `response.output[]`, preserving array
/// order. Items of other types (messages, audio) are skipped.
fn extract_function_calls(value: &Value) -> Vec<FunctionCall> {
    let Some(items) = value.pointer("/response/output").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
        .filter_map(|item| {
            let name = item.get("name").and_then(Value::as_str)?;
            let call_id = item.get("call_id").and_then(Value::as_str)?;
            let arguments = item
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            Some(FunctionCall {
                name: name.to_string(),
                call_id: call_id.to_string(),
                arguments: arguments.to_string(),
            })
        })
        .collect()
}

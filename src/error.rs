//! Error taxonomy for the bridge core.
//!
//! Only transport-level failures are fatal to a session. Everything else is
//! caught at its origin, logged, and the session continues — no handler may
//! let an error escape its boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Token endpoint unreachable, non-2xx, or response missing the
    /// credential field. Aborts `connect()`.
    #[error("token fetch failed: {0}")]
    TokenFetch(String),

    /// Transit-level failure on the realtime transport. Fatal to the
    /// session; forces the Failed state, no auto-retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected inbound event payload. The event is dropped
    /// and the session continues.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Missing or invalid function-call arguments. The call still responds
    /// with `success:false`.
    #[error("invalid function arguments: {0}")]
    FunctionValidation(String),

    /// Bluetooth serial write failure. Logged; the motion sequence
    /// continues best-effort and the dropped command is not retried.
    #[error("actuator send failed: {0}")]
    ActuatorSend(String),

    /// An operation was requested in a session state that forbids it.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    /// Direction name outside the four motion axes.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

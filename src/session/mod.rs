//! Session manager: lifecycle of one realtime AI session.
//!
//! Exactly one session exists at a time, owned here and mutated only
//! through these transitions:
//!
//! ```text
//! Idle -> Connecting -> Configuring -> Active -> Closing -> Idle
//!            \______________\___________/
//!                        Failed   (any transport error; explicit
//!                                  reconnect required, never automatic)
//! ```
//!
//! After a successful connect, a spawned task owns the transport and pumps
//! both directions: outbound client events arrive on a channel, inbound raw
//! messages are forwarded as [`SessionSignal`]s to the main loop. Nothing
//! else holds the data-channel handle.

pub mod client;
pub mod events;
pub mod token;
pub mod transport;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use transport::RealtimeTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Configuring,
    Active,
    Closing,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Configuring => write!(f, "configuring"),
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What the transport task reports back to the main loop.
#[derive(Debug)]
pub enum SessionSignal {
    /// One raw inbound data-channel message, in arrival order.
    Message(String),
    /// The transport failed; the session is dead.
    TransportError(String),
    /// The remote closed the stream.
    Closed,
}

pub struct SessionManager {
    config: BridgeConfig,
    http: reqwest::Client,
    state: SessionState,
    session_id: Option<String>,
    listening: bool,
    speaking: bool,
    signals_tx: mpsc::UnboundedSender<SessionSignal>,
    /// Present only while a session task is running. Dropping it tells the
    /// task to close the transport and exit.
    outbound: Option<mpsc::UnboundedSender<Value>>,
}

impl SessionManager {
    /// `signals_tx` feeds the main loop; the matching receiver is selected
    /// on alongside shell commands.
    pub fn new(config: BridgeConfig, signals_tx: mpsc::UnboundedSender<SessionSignal>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            state: SessionState::Idle,
            session_id: None,
            listening: false,
            speaking: false,
            signals_tx,
            outbound: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn listening(&self) -> bool {
        self.listening
    }

    pub fn speaking(&self) -> bool {
        self.speaking
    }

    /// Swap the configuration used by the next `connect()`. Does not touch
    /// a session already in flight.
    pub fn set_config(&mut self, config: BridgeConfig) {
        self.config = config;
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Connect: fetch a credential, open the transport, push the session
    /// configuration, then hand the transport to its pump task.
    ///
    /// Valid only from Idle or Failed (Failed requires this explicit new
    /// connect — there is no auto-reconnect). The configuration message is
    /// not acknowledged synchronously by the service; we transition to
    /// Active right after sending it and log the later `session.updated`
    /// echo when it arrives.
    pub async fn connect<T>(&mut self, mut transport: T) -> Result<()>
    where
        T: RealtimeTransport + 'static,
    {
        if !matches!(self.state, SessionState::Idle | SessionState::Failed) {
            return Err(BridgeError::InvalidState(
                "connect is only valid from idle",
            ));
        }
        self.state = SessionState::Connecting;

        let token = match token::fetch_ephemeral_token(&self.http, &self.config.token_endpoint)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                self.state = SessionState::Failed;
                return Err(e);
            }
        };

        if let Err(e) = transport.open(&self.config.realtime_url, &token).await {
            self.state = SessionState::Failed;
            return Err(e);
        }

        // Data channel is open: configure before any dispatch is allowed.
        self.state = SessionState::Configuring;
        let update = client::session_update(&self.config);
        if let Err(e) = transport.send_json(&update).await {
            self.state = SessionState::Failed;
            let _ = transport.close().await;
            return Err(e);
        }
        self.state = SessionState::Active;
        info!("Session configured and active");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.outbound = Some(outbound_tx);
        tokio::spawn(pump_transport(
            transport,
            outbound_rx,
            self.signals_tx.clone(),
        ));
        Ok(())
    }

    /// Tear the session down. Idempotent: a second call from Idle is a
    /// no-op. Always lands in Idle, even from Failed.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Closing;
        // Dropping the sender makes the pump task close the transport.
        self.outbound = None;
        info!(session_id = ?self.session_id, "Session closed");
        self.session_id = None;
        self.listening = false;
        self.speaking = false;
        self.state = SessionState::Idle;
    }

    /// Transport failure observed by the main loop: session is dead, keep
    /// the Failed state until the user explicitly reconnects.
    pub fn mark_failed(&mut self) {
        self.outbound = None;
        self.session_id = None;
        self.listening = false;
        self.speaking = false;
        self.state = SessionState::Failed;
    }

    pub fn set_session_id(&mut self, id: Option<String>) {
        if let Some(id) = id {
            debug!(session_id = %id, "Session id assigned");
            self.session_id = Some(id);
        }
    }

    pub fn set_listening(&mut self, listening: bool) {
        self.listening = listening;
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        self.speaking = speaking;
    }

    /// Queue one client event for the transport task.
    pub fn send(&self, event: Value) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(BridgeError::InvalidState("no open session"))?;
        outbound
            .send(event)
            .map_err(|_| BridgeError::Transport("session task gone".to_string()))
    }

    /// Clone of the outbound sender, for the dispatcher worker. `None`
    /// when no session is open.
    pub fn outbound(&self) -> Option<mpsc::UnboundedSender<Value>> {
        self.outbound.clone()
    }

    /// Inject a synthesized user turn (typed text or a sensor trigger
    /// phrase) and request the next assistant turn. Active sessions only;
    /// triggers without a session are the caller's to discard.
    pub fn inject_user_turn(&self, text: &str) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(BridgeError::InvalidState(
                "user turns need an active session",
            ));
        }
        self.send(client::user_message(text))?;
        self.send(client::response_create())
    }
}

/// Owns the transport after connect: forwards queued client events out and
/// inbound messages in, until either side ends the session.
async fn pump_transport<T: RealtimeTransport>(
    mut transport: T,
    mut outbound_rx: mpsc::UnboundedReceiver<Value>,
    signals: mpsc::UnboundedSender<SessionSignal>,
) {
    enum Turn {
        Outbound(Option<Value>),
        Inbound(Option<Result<String>>),
    }

    loop {
        // Resolve the select before touching the transport again; the recv
        // future borrows it.
        let turn = tokio::select! {
            queued = outbound_rx.recv() => Turn::Outbound(queued),
            inbound = transport.recv() => Turn::Inbound(inbound),
        };
        match turn {
            Turn::Outbound(Some(event)) => {
                if let Err(e) = transport.send_json(&event).await {
                    warn!("Outbound send failed: {}", e);
                    let _ = signals.send(SessionSignal::TransportError(e.to_string()));
                    break;
                }
            }
            // Manager dropped the sender: deliberate disconnect.
            Turn::Outbound(None) => {
                let _ = transport.close().await;
                break;
            }
            Turn::Inbound(Some(Ok(raw))) => {
                let _ = signals.send(SessionSignal::Message(raw));
            }
            Turn::Inbound(Some(Err(e))) => {
                let _ = signals.send(SessionSignal::TransportError(e.to_string()));
                break;
            }
            Turn::Inbound(None) => {
                let _ = signals.send(SessionSignal::Closed);
                break;
            }
        }
    }
    debug!("Transport pump exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Scripted transport: records sends, plays back queued inbound
    /// messages, can be told to fail on open.
    #[derive(Clone, Default)]
    struct FakeTransport {
        fail_open: bool,
        sent: Arc<Mutex<Vec<Value>>>,
        inbound: Arc<Mutex<Vec<String>>>,
    }

    impl RealtimeTransport for FakeTransport {
        async fn open(&mut self, _url: &str, _token: &str) -> Result<()> {
            if self.fail_open {
                Err(BridgeError::Transport("refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn send_json(&mut self, event: &Value) -> Result<()> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            let next = self.inbound.lock().unwrap().pop();
            match next {
                Some(raw) => Some(Ok(raw)),
                // Park forever: keeps the pump alive in tests.
                None => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn manager_with_endpoint(endpoint: &str) -> (SessionManager, mpsc::UnboundedReceiver<SessionSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = BridgeConfig {
            token_endpoint: endpoint.to_string(),
            ..BridgeConfig::default()
        };
        (SessionManager::new(config, tx), rx)
    }

    /// Minimal one-shot HTTP server so the token fetch path is exercised
    /// for real.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}/session", addr)
    }

    #[tokio::test]
    async fn test_connect_sends_session_update_then_goes_active() {
        let endpoint =
            serve_once("200 OK", r#"{"client_secret":{"value":"ek_test"}}"#).await;
        let (mut manager, _rx) = manager_with_endpoint(&endpoint);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();

        manager.connect(transport).await.unwrap();

        assert_eq!(manager.state(), SessionState::Active);
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["type"], "session.update");
    }

    #[tokio::test]
    async fn test_token_500_lands_in_failed_before_any_transport_io() {
        let endpoint = serve_once("500 Internal Server Error", "").await;
        let (mut manager, _rx) = manager_with_endpoint(&endpoint);
        let transport = FakeTransport::default();
        let sent = transport.sent.clone();

        let err = manager.connect(transport).await.unwrap_err();

        assert!(matches!(err, BridgeError::TokenFetch(_)));
        assert_eq!(manager.state(), SessionState::Failed);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_failure_lands_in_failed() {
        let endpoint =
            serve_once("200 OK", r#"{"client_secret":{"value":"ek_test"}}"#).await;
        let (mut manager, _rx) = manager_with_endpoint(&endpoint);
        let transport = FakeTransport {
            fail_open: true,
            ..FakeTransport::default()
        };

        let err = manager.connect(transport).await.unwrap_err();

        assert!(matches!(err, BridgeError::Transport(_)));
        assert_eq!(manager.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let endpoint =
            serve_once("200 OK", r#"{"client_secret":{"value":"ek_test"}}"#).await;
        let (mut manager, _rx) = manager_with_endpoint(&endpoint);
        manager.connect(FakeTransport::default()).await.unwrap();

        manager.disconnect();
        assert_eq!(manager.state(), SessionState::Idle);
        manager.disconnect();
        assert_eq!(manager.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_rejected_while_active() {
        let endpoint =
            serve_once("200 OK", r#"{"client_secret":{"value":"ek_test"}}"#).await;
        let (mut manager, _rx) = manager_with_endpoint(&endpoint);
        manager.connect(FakeTransport::default()).await.unwrap();

        let err = manager.connect(FakeTransport::default()).await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidState(_)));
        // The live session is untouched.
        assert_eq!(manager.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_inbound_messages_surface_as_signals() {
        let endpoint =
            serve_once("200 OK", r#"{"client_secret":{"value":"ek_test"}}"#).await;
        let (mut manager, mut rx) = manager_with_endpoint(&endpoint);
        let transport = FakeTransport::default();
        transport
            .inbound
            .lock()
            .unwrap()
            .push(r#"{"type":"session.created","session":{"id":"s1"}}"#.to_string());

        manager.connect(transport).await.unwrap();

        let signal = rx.recv().await.unwrap();
        match signal {
            SessionSignal::Message(raw) => assert!(raw.contains("session.created")),
            other => panic!("unexpected signal: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inject_requires_active_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = SessionManager::new(BridgeConfig::default(), tx);
        assert!(matches!(
            manager.inject_user_turn("hello"),
            Err(BridgeError::InvalidState(_))
        ));
    }
}

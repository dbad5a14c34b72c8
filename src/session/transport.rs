//! Realtime transport seam and the WebSocket implementation.
//!
//! The session manager only sees this trait: open with a credential, send
//! JSON, receive raw text frames, close. The shipped implementation is the
//! service's WebSocket endpoint; audio media rides on the shell's own peer
//! connection and never passes through here.

use futures_util::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{BridgeError, Result};

/// Data-channel seam for one realtime session.
pub trait RealtimeTransport: Send {
    /// Open the stream using the ephemeral credential.
    fn open(
        &mut self,
        url: &str,
        token: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Send one client event.
    fn send_json(
        &mut self,
        event: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Next inbound message. `None` means the stream closed cleanly;
    /// `Some(Err(_))` is a transport failure.
    fn recv(&mut self) -> impl std::future::Future<Output = Option<Result<String>>> + Send;

    /// Close the stream. Safe to call on an unopened transport.
    fn close(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client against the realtime service.
#[derive(Default)]
pub struct WsTransport {
    stream: Option<WsStream>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_mut(&mut self) -> Result<&mut WsStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| BridgeError::Transport("transport not open".to_string()))
    }
}

impl RealtimeTransport for WsTransport {
    async fn open(&mut self, url: &str, token: &str) -> Result<()> {
        let mut request = url
            .into_client_request()
            .map_err(|e| BridgeError::Transport(format!("bad realtime url: {}", e)))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| BridgeError::Transport(format!("bad credential header: {}", e)))?;
        request.headers_mut().insert("Authorization", auth);
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| BridgeError::Transport(format!("websocket handshake failed: {}", e)))?;
        debug!(status = %response.status(), "Realtime data channel open");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send_json(&mut self, event: &serde_json::Value) -> Result<()> {
        let text = event.to_string();
        self.stream_mut()?
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| BridgeError::Transport(format!("send failed: {}", e)))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                // Control frames and binary audio frames are not data
                // events; skip them.
                Some(Ok(Message::Ping(_)))
                | Some(Ok(Message::Pong(_)))
                | Some(Ok(Message::Binary(_)))
                | Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => {
                    return Some(Err(BridgeError::Transport(format!("recv failed: {}", e))))
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
        Ok(())
    }
}

//! Object model subscription over WebSocket.
//!
//! The control service sends the full model as the first message, then one
//! JSON patch per change. Each message must be acknowledged with `OK\n`
//! before the next one is sent. `PING\n` from the client is answered with
//! `PONG\n`.
//!
//! There is no automatic reconnection here: a dropped socket surfaces as
//! an error and the sync engine decides how to recover.

use futures_util::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

use crate::error::Error;
use crate::rest::client::RestClient;
use crate::transport::decode_json;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live model subscription.
pub struct ModelSubscription {
    stream: WsStream,
}

impl RestClient {
    /// Open the model WebSocket for the current session.
    pub async fn subscribe_model(&self) -> Result<ModelSubscription, Error> {
        let mut url = self.transport.url("/machine")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| Error::WebSocket(format!("cannot derive WebSocket URL from {url}")))?;
        if let Some(key) = self
            .session()
            .as_deref()
            .and_then(|s| s.session_key.as_ref())
        {
            url.query_pairs_mut()
                .append_pair("sessionKey", key.expose_secret());
        }

        info!(host = %self.transport.hostname(), "connecting model WebSocket");
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        debug!("model WebSocket connected");

        Ok(ModelSubscription { stream })
    }
}

impl ModelSubscription {
    /// Wait for the next model message without acknowledging it. The first
    /// message is the full model, later ones are patches.
    ///
    /// Safe to use as a `select!` branch: dropping the future before it
    /// completes loses no message. Call [`ack`](Self::ack) once the
    /// message has been applied.
    pub async fn recv(&mut self) -> Result<Value, Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.trim() == "PONG" {
                        trace!("WebSocket pong");
                        continue;
                    }
                    return decode_json(text.as_bytes());
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map_or_else(
                        || "model WebSocket closed".to_owned(),
                        |f| format!("model WebSocket closed: {}", f.reason),
                    );
                    return Err(Error::Disconnected { reason });
                }
                Some(Ok(_)) => {
                    // Binary, Ping, Pong, Frame -- ignore
                }
                Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                None => {
                    return Err(Error::Disconnected {
                        reason: "model WebSocket ended".into(),
                    });
                }
            }
        }
    }

    /// Ask the service for the next patch.
    pub async fn ack(&mut self) -> Result<(), Error> {
        self.send_text("OK\n").await
    }

    /// Send an application-level keep-alive.
    pub async fn ping(&mut self) -> Result<(), Error> {
        self.send_text("PING\n").await
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
    }

    async fn send_text(&mut self, text: &'static str) -> Result<(), Error> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

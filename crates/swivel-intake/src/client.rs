//! WebSocket intake client.
//!
//! [`IntakeClient`] keeps one subscription to the command topics alive for
//! the life of the process. The broker being down is not an error: dialing
//! is retried forever with a fixed delay, and a connection that drops
//! mid-stream goes back through the same dial loop. Decoded commands feed
//! straight into the [`CommandArbiter`].

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use swivel_kernel::CommandArbiter;
use swivel_types::InboundMessage;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::codec::{DecodedCommand, decode};

type BrokerStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Upper bound on one inbound command payload. Directional commands are a
/// handful of bytes; anything larger is junk on the topic.
pub const MAX_PAYLOAD_BYTES: usize = 1024;

/// Broker connection parameters.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// WebSocket URL of the command broker, e.g. `"ws://localhost:9090"`.
    pub broker_url: String,
    /// Identifier sent with every subscription frame.
    pub client_id: String,
    /// Topics carrying directional commands.
    pub topics: Vec<String>,
    /// Pause between dial attempts while the broker is unreachable.
    pub retry_delay: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// IntakeClient
// ────────────────────────────────────────────────────────────────────────────

/// Subscriber half of the bridge.
pub struct IntakeClient {
    config: IntakeConfig,
    arbiter: Arc<CommandArbiter>,
}

impl IntakeClient {
    pub fn new(config: IntakeConfig, arbiter: Arc<CommandArbiter>) -> Self {
        Self { config, arbiter }
    }

    /// Run until the shutdown channel fires.
    ///
    /// Never gives up on the broker. Every failure, a dial that does not
    /// land, a subscription the broker refuses, or an established stream
    /// that drops, sleeps out the retry delay and dials again. Shutdown is
    /// honored at every await point, a dial still in flight included.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let dialed = tokio::select! {
                _ = shutdown.recv() => return,
                dialed = connect_async(&self.config.broker_url) => dialed,
            };
            match dialed {
                Ok((ws, _response)) => {
                    info!(url = %self.config.broker_url, "connected to broker");
                    if self.serve(ws, &mut shutdown).await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(url = %self.config.broker_url, error = %e, "broker unreachable, retrying");
                }
            }
            tokio::select! {
                _ = shutdown.recv() => return,
                _ = sleep(self.config.retry_delay) => {}
            }
        }
    }

    /// Subscribe and pump one established connection until it drops.
    ///
    /// Returns `true` when shutdown ended the stream, `false` when the
    /// connection is gone and the caller should redial.
    async fn serve(&self, mut ws: BrokerStream, shutdown: &mut broadcast::Receiver<()>) -> bool {
        for topic in &self.config.topics {
            let frame = subscribe_frame(&self.config.client_id, topic);
            if ws.send(Message::Text(frame.into())).await.is_err() {
                warn!(topic = %topic, "subscribe failed, reconnecting");
                let _ = ws.close(None).await;
                return false;
            }
            info!(topic = %topic, "subscribed");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = ws.close(None).await;
                    return true;
                }
                frame = ws.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(text.as_str());
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("broker closed the connection, reconnecting");
                            return false;
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "broker stream failed, reconnecting");
                            return false;
                        }
                        // Ping/pong/binary frames carry no commands.
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Classify one text frame from the broker.
    ///
    /// Only `publish` frames carrying a string payload are acted on:
    ///
    /// * a recognized direction replaces the active command,
    /// * `"stop"` clears it,
    /// * unknown text is logged and changes nothing.
    ///
    /// Any frame that does not match the pattern is dropped at debug level;
    /// junk on the topic must never take the intake loop down.
    fn handle_frame(&self, text: &str) {
        let Ok(json) = serde_json::from_str::<serde_json::Value>(text) else {
            debug!("ignoring non-JSON frame");
            return;
        };
        if json.get("op").and_then(|op| op.as_str()) != Some("publish") {
            debug!("ignoring non-publish frame");
            return;
        }
        let topic = json.get("topic").and_then(|t| t.as_str()).unwrap_or("");
        let Some(payload) = json
            .get("msg")
            .and_then(|m| m.get("data"))
            .and_then(|d| d.as_str())
        else {
            debug!(topic = %topic, "ignoring publish without a string payload");
            return;
        };
        if payload.len() > MAX_PAYLOAD_BYTES {
            warn!(topic = %topic, bytes = payload.len(), "oversized payload ignored");
            return;
        }

        let message = InboundMessage::new(topic, payload);
        info!(
            id = %message.id,
            topic = %message.topic,
            payload = %message.payload,
            "command received"
        );
        match decode(&message.payload) {
            DecodedCommand::Move(direction) => self.arbiter.set(direction),
            DecodedCommand::Halt => self.arbiter.clear(),
            DecodedCommand::Unknown(other) => {
                warn!(payload = %other, "unknown command ignored");
            }
        }
    }
}

/// The subscription frame for one topic.
fn subscribe_frame(client_id: &str, topic: &str) -> String {
    json!({
        "op": "subscribe",
        "id": client_id,
        "topic": topic,
    })
    .to_string()
}

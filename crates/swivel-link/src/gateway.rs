//! WebSocket transport to the companion BLE gateway process.
//!
//! Swivel does not run a BLE stack in-process. [`GatewayRadio`] instead
//! speaks a small JSON request/reply dialect to a gateway that owns the
//! actual radio hardware:
//!
//! | Request | Success reply |
//! |---|---|
//! | `{"op":"open","address":…}` | `{"op":"opened"}` |
//! | `{"op":"resolve","service":…,"characteristic":…}` | `{"op":"resolved","handle":N}` |
//! | `{"op":"write","handle":N,"payload":"<hex>"}` | `{"op":"ack"}` |
//! | `{"op":"close"}` | none expected |
//!
//! Failures come back as `{"op":"error","kind":"not_found"|"io","message":…}`.
//! A `not_found` kind carries the missing service/characteristic id in
//! `message` and maps to [`SwivelError::CapabilityNotFound`]; everything else
//! maps to [`SwivelError::Link`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use swivel_types::{SwivelError, hex_string};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::debug;

use crate::radio::{GimbalRadio, RadioLink, WriteTarget};

/// Maximum byte length of one gateway reply.
///
/// Replies in this dialect are tiny; anything longer is treated as a protocol
/// violation rather than parsed.
const MAX_REPLY_BYTES: usize = 4 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport that reaches the gimbal through the BLE gateway's WebSocket
/// endpoint.
pub struct GatewayRadio {
    url: String,
}

impl GatewayRadio {
    /// Create a radio dialing the gateway at `url`, e.g. `ws://localhost:9230`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GimbalRadio for GatewayRadio {
    async fn open(&self, address: &str) -> Result<Box<dyn RadioLink>, SwivelError> {
        let (ws, _) = connect_async(&self.url)
            .await
            .map_err(|e| SwivelError::Link {
                device: address.to_string(),
                details: format!("gateway {} unreachable: {e}", self.url),
            })?;
        let mut link = GatewayLink {
            ws,
            device: address.to_string(),
        };
        let reply = link.request(open_frame(address)).await?;
        expect_op(&reply, "opened", &link.device)?;
        debug!(device = %address, gateway = %self.url, "gateway link open");
        Ok(Box::new(link))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GatewayLink
// ────────────────────────────────────────────────────────────────────────────

/// One gateway-mediated connection.
struct GatewayLink {
    ws: WsStream,
    device: String,
}

impl GatewayLink {
    /// Send `frame` and wait for the next text reply.
    ///
    /// Control frames are skipped; a socket that errors or closes
    /// mid-request is a link error.
    async fn request(&mut self, frame: Value) -> Result<Value, SwivelError> {
        self.ws
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| SwivelError::Link {
                device: self.device.clone(),
                details: format!("gateway send failed: {e}"),
            })?;
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    return parse_reply(&self.device, text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(SwivelError::Link {
                        device: self.device.clone(),
                        details: "gateway closed the connection mid-request".to_string(),
                    });
                }
                // Ping/pong/binary frames are not part of the dialect.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(SwivelError::Link {
                        device: self.device.clone(),
                        details: format!("gateway receive failed: {e}"),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl RadioLink for GatewayLink {
    async fn resolve_write_target(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<WriteTarget, SwivelError> {
        let reply = self.request(resolve_frame(service_id, characteristic_id)).await?;
        expect_op(&reply, "resolved", &self.device)?;
        reply_handle(&reply).ok_or_else(|| {
            SwivelError::Serialization(format!(
                "gateway 'resolved' reply carries no usable handle: {reply}"
            ))
        })
    }

    async fn write(&mut self, target: WriteTarget, payload: &[u8]) -> Result<(), SwivelError> {
        let outcome = self.request(write_frame(target.0, payload)).await;
        let outcome = outcome.and_then(|reply| expect_op(&reply, "ack", &self.device));
        // Any trouble while a write is in flight condemns the frame.
        outcome.map_err(|e| match e {
            SwivelError::WriteFailed { .. } => e,
            SwivelError::Link { device, details } => SwivelError::WriteFailed { device, details },
            other => SwivelError::WriteFailed {
                device: self.device.clone(),
                details: other.to_string(),
            },
        })
    }

    async fn close(&mut self) {
        // Best effort: tell the gateway, then drop the socket.
        let _ = self
            .ws
            .send(Message::Text(close_frame().to_string().into()))
            .await;
        let _ = self.ws.close(None).await;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire dialect
// ────────────────────────────────────────────────────────────────────────────

fn open_frame(address: &str) -> Value {
    json!({ "op": "open", "address": address })
}

fn resolve_frame(service_id: &str, characteristic_id: &str) -> Value {
    json!({
        "op": "resolve",
        "service": service_id,
        "characteristic": characteristic_id,
    })
}

fn write_frame(handle: u16, payload: &[u8]) -> Value {
    json!({
        "op": "write",
        "handle": handle,
        "payload": hex_string(payload),
    })
}

fn close_frame() -> Value {
    json!({ "op": "close" })
}

/// Parse one reply, turning `error` ops into the matching [`SwivelError`].
fn parse_reply(device: &str, text: &str) -> Result<Value, SwivelError> {
    if text.len() > MAX_REPLY_BYTES {
        return Err(SwivelError::Serialization(format!(
            "gateway reply is {} bytes, exceeding the limit of {}",
            text.len(),
            MAX_REPLY_BYTES,
        )));
    }
    let Ok(reply) = serde_json::from_str::<Value>(text) else {
        return Err(SwivelError::Serialization(format!(
            "gateway reply is not JSON: {text}"
        )));
    };
    if reply_op(&reply) == Some("error") {
        let kind = reply.get("kind").and_then(|k| k.as_str()).unwrap_or("io");
        let message = reply
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unspecified gateway error")
            .to_string();
        return Err(match kind {
            "not_found" => SwivelError::CapabilityNotFound {
                device: device.to_string(),
                capability: message,
            },
            _ => SwivelError::Link {
                device: device.to_string(),
                details: message,
            },
        });
    }
    Ok(reply)
}

fn reply_op(reply: &Value) -> Option<&str> {
    reply.get("op").and_then(|op| op.as_str())
}

fn expect_op(reply: &Value, want: &str, device: &str) -> Result<(), SwivelError> {
    match reply_op(reply) {
        Some(op) if op == want => Ok(()),
        other => Err(SwivelError::Link {
            device: device.to_string(),
            details: format!("gateway replied with {other:?}, expected '{want}'"),
        }),
    }
}

fn reply_handle(reply: &Value) -> Option<WriteTarget> {
    let handle = reply.get("handle")?.as_u64()?;
    u16::try_from(handle).ok().map(WriteTarget)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_replies_pass_through() {
        let reply = parse_reply("dev", r#"{"op":"opened"}"#).unwrap();
        assert_eq!(reply_op(&reply), Some("opened"));
    }

    #[test]
    fn not_found_reply_maps_to_capability_error() {
        let result = parse_reply(
            "dev",
            r#"{"op":"error","kind":"not_found","message":"0000ffe5-0000-1000-8000-00805f9a34fb"}"#,
        );
        match result {
            Err(SwivelError::CapabilityNotFound { device, capability }) => {
                assert_eq!(device, "dev");
                assert!(capability.contains("ffe5"));
            }
            other => panic!("expected CapabilityNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn io_error_reply_maps_to_link_error() {
        let result = parse_reply("dev", r#"{"op":"error","kind":"io","message":"device went away"}"#);
        assert!(
            matches!(result, Err(SwivelError::Link { .. })),
            "expected Link error, got: {result:?}"
        );
    }

    #[test]
    fn non_json_reply_is_rejected() {
        let result = parse_reply("dev", "opened");
        assert!(
            matches!(result, Err(SwivelError::Serialization(_))),
            "expected Serialization error, got: {result:?}"
        );
    }

    #[test]
    fn oversized_reply_is_rejected() {
        let text = format!(r#"{{"op":"opened","pad":"{}"}}"#, "x".repeat(MAX_REPLY_BYTES));
        let result = parse_reply("dev", &text);
        assert!(
            matches!(result, Err(SwivelError::Serialization(_))),
            "expected Serialization error, got: {result:?}"
        );
    }

    #[test]
    fn resolved_reply_yields_handle() {
        let reply = parse_reply("dev", r#"{"op":"resolved","handle":18}"#).unwrap();
        assert_eq!(reply_handle(&reply), Some(WriteTarget(18)));
    }

    #[test]
    fn handle_outside_u16_is_unusable() {
        let reply = parse_reply("dev", r#"{"op":"resolved","handle":70000}"#).unwrap();
        assert_eq!(reply_handle(&reply), None);
    }

    #[test]
    fn mismatched_op_is_flagged() {
        let reply = parse_reply("dev", r#"{"op":"opened"}"#).unwrap();
        let result = expect_op(&reply, "ack", "dev");
        assert!(
            matches!(result, Err(SwivelError::Link { .. })),
            "expected Link error, got: {result:?}"
        );
    }

    #[test]
    fn write_frame_hex_encodes_payload() {
        let frame = write_frame(0x2a, &[0x24, 0x3a, 0xff]);
        assert_eq!(frame["op"], "write");
        assert_eq!(frame["handle"], 0x2a);
        assert_eq!(frame["payload"], "243aff");
    }

    #[test]
    fn open_frame_carries_address() {
        let frame = open_frame("C8:47:8C:12:34:56");
        assert_eq!(frame["op"], "open");
        assert_eq!(frame["address"], "C8:47:8C:12:34:56");
    }
}

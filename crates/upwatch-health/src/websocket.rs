//! WebSocket probe over a hyper HTTP/1.1 upgrade.
//!
//! The site timeout bounds connecting and the opening handshake only. Once
//! the server answers `101` with a valid `Sec-WebSocket-Accept`, the probe
//! sends the site body (or an empty string) as a single masked text frame,
//! waits briefly for any inbound frame, then sends a close frame.
//!
//! A completed handshake is what makes the site "up". Whether a message
//! came back is only logged, and a silent or slow peer after the upgrade
//! cannot turn the result into a failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::StatusCode;
use hyper::header::{
    CONNECTION, HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE,
    USER_AGENT,
};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;
use tracing::debug;

use upwatch_core::{RawProbeResult, SiteSpec};

use crate::checker::{connect, CheckStrategy, Target, USER_AGENT_VALUE};
use crate::error::ProbeError;

const OPCODE_TEXT: u8 = 0x1;
const OPCODE_CLOSE: u8 = 0x8;

/// Appended to the client key before hashing (RFC 6455 section 4.2.2).
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on sending the close frame and shutting down.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

type Socket = TokioIo<Upgraded>;

#[derive(Clone)]
pub struct WebSocketCheck {
    tls: TlsConnector,
    message_wait: Duration,
}

impl WebSocketCheck {
    pub fn new(tls: Arc<rustls::ClientConfig>, message_wait: Duration) -> Self {
        Self {
            tls: TlsConnector::from(tls),
            message_wait,
        }
    }
}

#[async_trait]
impl CheckStrategy for WebSocketCheck {
    async fn probe(&self, site: &SiteSpec) -> RawProbeResult {
        let started = Instant::now();
        let opened = tokio::time::timeout(site.timeout(), open_socket(site, &self.tls)).await;

        let mut socket = match opened {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                debug!(slug = %site.slug, error = %e, url = %site.url, "websocket probe failed");
                return RawProbeResult {
                    total_time: started.elapsed(),
                    ..RawProbeResult::failed()
                };
            }
            Err(_) => {
                debug!(slug = %site.slug, url = %site.url, "websocket handshake timed out");
                return RawProbeResult {
                    total_time: started.elapsed(),
                    ..RawProbeResult::failed()
                };
            }
        };
        let handshake = started.elapsed();

        let payload = site.body.as_deref().unwrap_or_default();
        let message_received = exchange(&mut socket, payload.as_bytes(), self.message_wait).await;
        close(&mut socket).await;

        debug!(
            slug = %site.slug,
            message_received,
            ms = handshake.as_millis() as u64,
            "websocket handshake completed"
        );
        RawProbeResult {
            http_code: 200,
            total_time: handshake,
            body: None,
        }
    }
}

/// Connect and complete the opening handshake.
async fn open_socket(site: &SiteSpec, tls: &TlsConnector) -> Result<Socket, ProbeError> {
    let target = Target::parse(&site.url)?;
    let io = connect(&target, tls).await?;

    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(io)).await?;
    tokio::spawn(async move {
        let _ = conn.with_upgrades().await;
    });

    let key = handshake_key()?;
    let req = http::Request::builder()
        .method("GET")
        .uri(target.path.as_str())
        .header(HOST, target.authority.as_str())
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .header(SEC_WEBSOCKET_VERSION, "13")
        .header(SEC_WEBSOCKET_KEY, key.as_str())
        .body(Empty::<Bytes>::new())?;

    let resp = sender.send_request(req).await?;
    if resp.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(ProbeError::Upgrade(format!("server answered {}", resp.status())));
    }
    let accept = resp
        .headers()
        .get(SEC_WEBSOCKET_ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if accept != accept_key(&key) {
        return Err(ProbeError::Upgrade(format!(
            "bad Sec-WebSocket-Accept {accept:?}"
        )));
    }

    let upgraded = hyper::upgrade::on(resp).await?;
    Ok(TokioIo::new(upgraded))
}

/// Send one text frame and wait up to `wait` for any inbound frame.
/// Each step is bounded by `wait`.
async fn exchange(socket: &mut Socket, payload: &[u8], wait: Duration) -> bool {
    let Ok(mask) = random_mask() else {
        return false;
    };
    let frame = encode_frame(OPCODE_TEXT, payload, mask);
    if !matches!(
        tokio::time::timeout(wait, socket.write_all(&frame)).await,
        Ok(Ok(()))
    ) {
        return false;
    }

    let mut header = [0u8; 2];
    matches!(
        tokio::time::timeout(wait, socket.read(&mut header)).await,
        Ok(Ok(n)) if n > 0
    )
}

async fn close(socket: &mut Socket) {
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        if let Ok(mask) = random_mask() {
            let _ = socket.write_all(&encode_frame(OPCODE_CLOSE, &[], mask)).await;
        }
        let _ = socket.shutdown().await;
    })
    .await;
}

/// `Sec-WebSocket-Accept` the server must answer for `key`.
fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Base64 of 16 random bytes.
fn handshake_key() -> Result<String, ProbeError> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| ProbeError::Entropy(e.to_string()))?;
    Ok(STANDARD.encode(nonce))
}

fn random_mask() -> Result<[u8; 4], ProbeError> {
    let mut mask = [0u8; 4];
    getrandom::getrandom(&mut mask).map_err(|e| ProbeError::Entropy(e.to_string()))?;
    Ok(mask)
}

/// Single final client frame. Client frames are always masked.
fn encode_frame(opcode: u8, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 14);
    frame.push(0x80 | opcode);
    match payload.len() {
        n if n < 126 => frame.push(0x80 | n as u8),
        n if n <= u16::MAX as usize => {
            frame.push(0x80 | 126);
            frame.extend_from_slice(&(n as u16).to_be_bytes());
        }
        n => {
            frame.push(0x80 | 127);
            frame.extend_from_slice(&(n as u64).to_be_bytes());
        }
    }
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    frame
}

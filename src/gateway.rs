//! Gateway (WebSocket) transport.
//!
//! A single driver task owns the socket. It performs HELLO, IDENTIFY or
//! RESUME, heartbeats on the interval Discord asks for, tracks the sequence
//! number, and reconnects with backoff. Parsed events are handed to the bot
//! through a bounded channel.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::events::{opcode, GatewayEvent};
use crate::types::GatewayPayload;

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg";
const GATEWAY_QUERY: &str = "v=10&encoding=json";

/// At most 120 sends per rolling 60 s.
const SEND_BUDGET: usize = 120;
const SEND_WINDOW: Duration = Duration::from_secs(60);

const MAX_RECONNECT_ATTEMPTS: u32 = 8;
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

/// GUILDS | GUILD_MEMBERS
pub const INTENTS: u32 = 1 | 1 << 1;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode gateway payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("timed out waiting for HELLO")]
    HelloTimeout,

    #[error("connection closed before HELLO")]
    ClosedBeforeHello,

    #[error("expected HELLO, got {0}")]
    UnexpectedFirstEvent(String),
}

// ---------------------------------------------------------------------------
// Send rate limiter
// ---------------------------------------------------------------------------

/// Sliding-window limiter for outbound gateway frames.
#[derive(Debug)]
struct SendRateLimiter {
    sent: VecDeque<Instant>,
    budget: usize,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: usize, window: Duration) -> Self {
        Self {
            sent: VecDeque::with_capacity(budget),
            budget,
            window,
        }
    }

    /// How long to wait at `now` before the next send is allowed.
    fn delay_at(&mut self, now: Instant) -> Option<Duration> {
        while self
            .sent
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            self.sent.pop_front();
        }
        if self.sent.len() < self.budget {
            return None;
        }
        self.sent
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
    }

    fn record_at(&mut self, now: Instant) {
        self.sent.push_back(now);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Options for connecting to the gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: u32,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: INTENTS,
        }
    }
}

/// Resume bookkeeping carried across reconnects.
#[derive(Debug, Clone, Default)]
struct Session {
    session_id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
}

impl Session {
    fn url(&self) -> String {
        let base = self
            .resume_url
            .as_deref()
            .unwrap_or(DEFAULT_GATEWAY_URL)
            .trim_end_matches('/');
        if base.contains('?') {
            format!("{}&{}", base, GATEWAY_QUERY)
        } else {
            format!("{}/?{}", base, GATEWAY_QUERY)
        }
    }

    /// RESUME when we have both a session and a sequence, else IDENTIFY.
    fn handshake(&self, config: &GatewayConfig) -> serde_json::Value {
        match (&self.session_id, self.sequence) {
            (Some(session_id), Some(seq)) => json!({
                "op": opcode::RESUME,
                "d": { "token": config.token, "session_id": session_id, "seq": seq }
            }),
            _ => json!({
                "op": opcode::IDENTIFY,
                "d": {
                    "token": config.token,
                    "intents": config.intents,
                    "properties": {
                        "os": std::env::consts::OS,
                        "browser": env!("CARGO_PKG_NAME"),
                        "device": env!("CARGO_PKG_NAME")
                    }
                }
            }),
        }
    }

    fn heartbeat(&self) -> serde_json::Value {
        json!({ "op": opcode::HEARTBEAT, "d": self.sequence })
    }

    fn forget(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }
}

// ---------------------------------------------------------------------------
// Close codes
// ---------------------------------------------------------------------------

/// What to do after the connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconnect {
    Resume,
    Reidentify,
    /// Authentication, sharding, or intent problems. Retrying cannot help.
    Stop,
}

fn classify_close_code(code: u16) -> Reconnect {
    match code {
        4004 | 4010..=4014 => Reconnect::Stop,
        4007 | 4009 => Reconnect::Reidentify,
        _ => Reconnect::Resume,
    }
}

fn close_reason(code: u16) -> &'static str {
    match code {
        4004 => "authentication failed",
        4007 => "invalid sequence",
        4009 => "session timed out",
        4010 => "invalid shard",
        4011 => "sharding required",
        4012 => "invalid API version",
        4013 => "invalid intents",
        4014 => "disallowed intents",
        _ => "connection closed",
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A running gateway connection.
pub struct GatewayHandle {
    pub events: async_channel::Receiver<GatewayEvent>,
    pub driver: tokio::task::JoinHandle<()>,
}

/// Spawn the driver task. It runs until a fatal close code, too many failed
/// reconnects, or the event receiver is dropped.
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (tx, rx) = async_channel::bounded(EVENT_BUFFER);
    let driver = tokio::spawn(drive(config, tx));
    GatewayHandle { events: rx, driver }
}

async fn drive(config: GatewayConfig, events: async_channel::Sender<GatewayEvent>) {
    let mut session = Session::default();
    let mut limiter = SendRateLimiter::new(SEND_BUDGET, SEND_WINDOW);
    let mut attempts: u32 = 0;

    loop {
        let outcome = run_connection(&config, &mut session, &mut limiter, &events, &mut attempts).await;

        let next = match outcome {
            Ok(Some(next)) => next,
            Ok(None) => {
                info!("event receiver dropped, stopping gateway");
                return;
            }
            Err(e) => {
                warn!(error = %e, "gateway connection failed");
                Reconnect::Resume
            }
        };

        match next {
            Reconnect::Stop => {
                error!("unrecoverable gateway close, stopping");
                events.close();
                return;
            }
            Reconnect::Reidentify => {
                info!("session invalidated, will identify again");
                session.forget();
            }
            Reconnect::Resume => {}
        }

        attempts += 1;
        if attempts > MAX_RECONNECT_ATTEMPTS {
            error!(attempts, "giving up on the gateway");
            events.close();
            return;
        }
        let delay = backoff_delay(attempts);
        warn!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = attempts,
            "reconnecting after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}

/// One socket lifetime. `Ok(None)` means the consumer went away.
async fn run_connection(
    config: &GatewayConfig,
    session: &mut Session,
    limiter: &mut SendRateLimiter,
    events: &async_channel::Sender<GatewayEvent>,
    attempts: &mut u32,
) -> Result<Option<Reconnect>, GatewayError> {
    let url = session.url();
    info!(url = %url, "connecting to gateway");
    let (mut ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

    let interval = read_hello(&mut ws).await?;
    info!(interval_ms = interval, "received HELLO");

    let resuming = session.session_id.is_some();
    send(&mut ws, limiter, &session.handshake(config)).await?;
    info!(resuming, "sent handshake");

    let period = Duration::from_millis(interval);
    let first = period.mul_f64(rand::random::<f64>());
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + first, period);
    let mut acked = true;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !acked {
                    warn!("no heartbeat ACK since last beat, reconnecting");
                    let _ = ws.close(None).await;
                    return Ok(Some(Reconnect::Resume));
                }
                send(&mut ws, limiter, &session.heartbeat()).await?;
                acked = false;
                debug!(seq = ?session.sequence, "sent heartbeat");
            }

            frame = ws.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map_or(1000, |f| u16::from(f.code));
                        let next = classify_close_code(code);
                        warn!(code, reason = close_reason(code), ?next, "gateway closed");
                        return Ok(Some(next));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        info!("gateway stream ended");
                        return Ok(Some(Reconnect::Resume));
                    }
                };

                let payload: GatewayPayload = match serde_json::from_str(&text) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "unparseable gateway frame");
                        continue;
                    }
                };
                if let Some(seq) = payload.s {
                    session.sequence = Some(seq);
                }

                let event = GatewayEvent::from_payload(payload);
                match &event {
                    GatewayEvent::Ready(ready) => {
                        session.session_id = Some(ready.session_id.clone());
                        session.resume_url = Some(ready.resume_gateway_url.clone());
                        *attempts = 0;
                        info!(session_id = %ready.session_id, user = %ready.user.tag(), "gateway READY");
                    }
                    GatewayEvent::Unknown { event_name: Some(name), .. } if name == "RESUMED" => {
                        *attempts = 0;
                        info!("session resumed");
                    }
                    GatewayEvent::HeartbeatAck => {
                        acked = true;
                        continue;
                    }
                    GatewayEvent::HeartbeatRequest => {
                        send(&mut ws, limiter, &session.heartbeat()).await?;
                        continue;
                    }
                    GatewayEvent::Reconnect => {
                        info!("gateway asked us to reconnect");
                        let _ = ws.close(None).await;
                        return Ok(Some(Reconnect::Resume));
                    }
                    GatewayEvent::InvalidSession(resumable) => {
                        warn!(resumable, "session invalidated");
                        let _ = ws.close(None).await;
                        return Ok(Some(if *resumable {
                            Reconnect::Resume
                        } else {
                            Reconnect::Reidentify
                        }));
                    }
                    _ => {}
                }

                if events.send(event).await.is_err() {
                    let _ = ws.close(None).await;
                    return Ok(None);
                }
            }
        }
    }
}

async fn read_hello(ws: &mut WsStream) -> Result<u64, GatewayError> {
    loop {
        let frame = tokio::time::timeout(HELLO_TIMEOUT, ws.next())
            .await
            .map_err(|_| GatewayError::HelloTimeout)?
            .ok_or(GatewayError::ClosedBeforeHello)??;

        let Message::Text(text) = frame else {
            continue;
        };
        let payload: GatewayPayload = serde_json::from_str(&text)?;
        return match GatewayEvent::from_payload(payload) {
            GatewayEvent::Hello(interval) => Ok(interval),
            other => Err(GatewayError::UnexpectedFirstEvent(other.name())),
        };
    }
}

async fn send(
    ws: &mut WsStream,
    limiter: &mut SendRateLimiter,
    payload: &serde_json::Value,
) -> Result<(), GatewayError> {
    while let Some(wait) = limiter.delay_at(Instant::now()) {
        debug!(wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX), "gateway send rate-limited");
        tokio::time::sleep(wait).await;
    }
    limiter.record_at(Instant::now());
    let text = serde_json::to_string(payload)?;
    ws.send(Message::Text(text)).await?;
    Ok(())
}

/// Exponential backoff from 1 s, +/-25% jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1u64 << attempt.min(6));
    base.mul_f64(0.75 + rand::random::<f64>() * 0.5)
        .min(Duration::from_secs(60))
}

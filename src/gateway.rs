//! Gateway (WebSocket) transport for the Discord API.
//!
//! Owns the connection lifecycle:
//!   - connect, receive HELLO, send IDENTIFY (or RESUME)
//!   - background heartbeat task
//!   - sequence number and session tracking
//!   - reconnect with backoff on disconnect
//!   - outbound send rate limiting (120 events / 60s)
//!
//! Consumers only see a channel of [`GatewayEvent`] values.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::types::GatewayPayload;

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILDS only. Interactions arrive regardless of intents.
pub const INTENTS: u32 = 1;

/// Discord allows at most 120 gateway sends per 60 seconds.
const SEND_BUDGET_MAX: u32 = 120;
const SEND_BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// Consecutive failed connection attempts before the driver gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timed out waiting for HELLO")]
    HelloTimeout,
    #[error("connection closed before HELLO")]
    ClosedBeforeHello,
    #[error("unexpected payload while waiting for HELLO: {0}")]
    UnexpectedHello(String),
}

// ---------------------------------------------------------------------------
// Send rate limiter
// ---------------------------------------------------------------------------

/// Sliding-window limiter for outbound gateway messages.
struct SendRateLimiter {
    sent: Vec<Instant>,
    budget: usize,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: u32, window: Duration) -> Self {
        Self {
            sent: Vec::with_capacity(budget as usize),
            budget: budget as usize,
            window,
        }
    }

    /// How long to wait before the next send at `now`, if at all.
    fn delay_at(&self, now: Instant) -> Option<Duration> {
        let mut in_window = self
            .sent
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window);
        let oldest = in_window.clone().min()?;
        if in_window.by_ref().count() < self.budget {
            return None;
        }
        Some((*oldest + self.window).saturating_duration_since(now))
    }

    fn record_at(&mut self, now: Instant) {
        let window = self.window;
        self.sent.retain(|&t| now.duration_since(t) < window);
        self.sent.push(now);
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: u32,
    /// `[shard_id, num_shards]`.
    pub shard: Option<[u32; 2]>,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"[redacted]")
            .field("intents", &self.intents)
            .field("shard", &self.shard)
            .finish()
    }
}

/// Running gateway connection. The event channel closes when the driver
/// stops for good.
pub struct GatewayHandle {
    pub events: async_channel::Receiver<GatewayEvent>,
    pub driver: tokio::task::JoinHandle<()>,
}

/// Spawn the gateway driver and hand back its event stream.
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (event_tx, events) = async_channel::bounded(256);
    let driver = tokio::spawn(gateway_driver(config, event_tx));
    GatewayHandle { events, driver }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    sequence: Option<u64>,
}

impl SessionState {
    fn resume_payload(&self, token: &str) -> Option<serde_json::Value> {
        let (Some(session_id), Some(seq)) = (&self.session_id, self.sequence) else {
            return None;
        };
        Some(json!({
            "op": 6,
            "d": { "token": token, "session_id": session_id, "seq": seq }
        }))
    }

    fn url(&self) -> String {
        match &self.resume_gateway_url {
            Some(url) if url.contains("v=10") => url.clone(),
            Some(url) if url.contains('?') => format!("{url}&v=10&encoding=json"),
            Some(url) => format!("{url}?v=10&encoding=json"),
            None => DEFAULT_GATEWAY_URL.to_string(),
        }
    }
}

fn identify_payload(config: &GatewayConfig) -> serde_json::Value {
    let mut identify = json!({
        "op": 2,
        "d": {
            "token": config.token,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "fishing-discord",
                "device": "fishing-discord"
            },
            "intents": config.intents,
        }
    });
    if let Some([id, count]) = config.shard {
        identify["d"]["shard"] = json!([id, count]);
    }
    identify
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsRead = futures_util::stream::SplitStream<WsStream>;

/// Shared write half plus its limiter.
#[derive(Clone)]
struct Writer {
    sink: Arc<Mutex<WsSink>>,
    limiter: Arc<Mutex<SendRateLimiter>>,
}

impl Writer {
    async fn send(&self, payload: &serde_json::Value) -> Result<(), GatewayError> {
        loop {
            let delay = self.limiter.lock().await.delay_at(Instant::now());
            match delay {
                Some(d) => {
                    debug!(delay_ms = d.as_millis() as u64, "gateway send rate-limited");
                    tokio::time::sleep(d).await;
                }
                None => break,
            }
        }
        self.limiter.lock().await.record_at(Instant::now());

        let text = serde_json::to_string(payload)?;
        self.sink.lock().await.send(Message::Text(text)).await?;
        Ok(())
    }
}

async fn gateway_driver(config: GatewayConfig, event_tx: async_channel::Sender<GatewayEvent>) {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut attempts: u32 = 0;

    loop {
        if attempts > 0 {
            if attempts > MAX_RECONNECT_ATTEMPTS {
                error!(attempts, "exceeded max reconnect attempts, giving up");
                return;
            }
            let delay = backoff_delay(attempts);
            warn!(delay_ms = delay.as_millis() as u64, attempt = attempts, "reconnecting after backoff");
            tokio::time::sleep(delay).await;
        }

        let url = session.lock().await.url();
        info!(url = %url, "connecting to Discord gateway");

        let (ws, _) = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "failed to connect to gateway");
                attempts += 1;
                continue;
            }
        };

        let (sink, mut read) = ws.split();
        let writer = Writer {
            sink: Arc::new(Mutex::new(sink)),
            limiter: Arc::new(Mutex::new(SendRateLimiter::new(
                SEND_BUDGET_MAX,
                SEND_BUDGET_WINDOW,
            ))),
        };

        let heartbeat_interval = match read_hello(&mut read).await {
            Ok(interval) => interval,
            Err(e) => {
                error!(error = %e, "failed to read HELLO");
                attempts += 1;
                continue;
            }
        };
        debug!(interval_ms = heartbeat_interval, "received HELLO");

        let resume = session.lock().await.resume_payload(&config.token);
        let (handshake, kind) = match resume {
            Some(resume) => (resume, "RESUME"),
            None => (identify_payload(&config), "IDENTIFY"),
        };
        if let Err(e) = writer.send(&handshake).await {
            error!(error = %e, kind, "failed to send handshake");
            attempts += 1;
            continue;
        }
        info!(kind, "sent handshake");
        attempts = 0;

        let (stop_heartbeat, stopped) = oneshot::channel();
        let heartbeat = tokio::spawn(heartbeat_task(
            heartbeat_interval,
            writer.clone(),
            Arc::clone(&session),
            stopped,
        ));

        let reason = read_loop(&mut read, &writer, &event_tx, &session).await;

        let _ = stop_heartbeat.send(());
        heartbeat.abort();
        let _ = writer.sink.lock().await.send(Message::Close(None)).await;

        match reason {
            DisconnectReason::Resume => info!("will attempt RESUME"),
            DisconnectReason::Reidentify => {
                info!("session invalidated, will re-IDENTIFY");
                let mut s = session.lock().await;
                s.session_id = None;
                s.sequence = None;
            }
            DisconnectReason::Fatal => {
                error!("fatal gateway error, shutting down");
                return;
            }
            DisconnectReason::EventChannelClosed => {
                info!("event consumer gone, shutting down gateway driver");
                return;
            }
        }
        attempts += 1;
    }
}

async fn heartbeat_task(
    interval_ms: u64,
    writer: Writer,
    session: Arc<Mutex<SessionState>>,
    mut stop: oneshot::Receiver<()>,
) {
    // First beat after interval * jitter, jitter in [0, 1).
    let first = Duration::from_millis((interval_ms as f64 * rand::random::<f64>()) as u64);
    tokio::select! {
        _ = tokio::time::sleep(first) => {}
        _ = &mut stop => return,
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let seq = session.lock().await.sequence;
                if let Err(e) = writer.send(&json!({ "op": 1, "d": seq })).await {
                    warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
                    return;
                }
                debug!(?seq, "sent heartbeat");
            }
            _ = &mut stop => return,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    Resume,
    Reidentify,
    Fatal,
    EventChannelClosed,
}

/// What to do after the server closes the socket with `code`.
fn classify_close(code: u16) -> DisconnectReason {
    match code {
        // authentication failed, invalid shard, sharding required,
        // invalid API version, invalid intents, disallowed intents
        4004 | 4010..=4014 => DisconnectReason::Fatal,
        // invalid seq, session timed out
        4007 | 4009 => DisconnectReason::Reidentify,
        _ => DisconnectReason::Resume,
    }
}

async fn read_loop(
    read: &mut WsRead,
    writer: &Writer,
    event_tx: &async_channel::Sender<GatewayEvent>,
    session: &Arc<Mutex<SessionState>>,
) -> DisconnectReason {
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                let code = frame.map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return code.map_or(DisconnectReason::Resume, classify_close);
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                return DisconnectReason::Resume;
            }
        };

        let payload: GatewayPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse gateway payload");
                continue;
            }
        };
        if let Some(seq) = payload.s {
            session.lock().await.sequence = Some(seq);
        }

        let event = GatewayEvent::from_payload(payload);
        match &event {
            GatewayEvent::Ready(ready) => {
                let mut s = session.lock().await;
                s.session_id = Some(ready.session_id.clone());
                s.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                info!(user = %ready.user.tag(), "gateway READY");
            }
            GatewayEvent::Resumed => info!("session resumed"),
            GatewayEvent::HeartbeatRequest => {
                let seq = session.lock().await.sequence;
                if let Err(e) = writer.send(&json!({ "op": 1, "d": seq })).await {
                    warn!(error = %e, "failed to send requested heartbeat");
                }
                continue;
            }
            GatewayEvent::HeartbeatAck => {
                debug!("heartbeat acknowledged");
                continue;
            }
            GatewayEvent::Reconnect => {
                info!("gateway requested reconnect");
                return DisconnectReason::Resume;
            }
            GatewayEvent::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated");
                // Discord asks for a 1-5s pause before the next handshake.
                tokio::time::sleep(Duration::from_secs(if *resumable { 2 } else { 3 })).await;
                return if *resumable {
                    DisconnectReason::Resume
                } else {
                    DisconnectReason::Reidentify
                };
            }
            GatewayEvent::Unknown { .. } | GatewayEvent::InteractionCreate(_) => {}
        }

        if event_tx.send(event).await.is_err() {
            return DisconnectReason::EventChannelClosed;
        }
    }
    info!("WebSocket stream ended");
    DisconnectReason::Resume
}

/// Read the HELLO payload and return its heartbeat interval in ms.
async fn read_hello(read: &mut WsRead) -> Result<u64, GatewayError> {
    let msg = tokio::time::timeout(HELLO_TIMEOUT, read.next())
        .await
        .map_err(|_| GatewayError::HelloTimeout)?
        .ok_or(GatewayError::ClosedBeforeHello)??;

    let Message::Text(text) = msg else {
        return Err(GatewayError::UnexpectedHello(format!("{msg:?}")));
    };
    heartbeat_interval(&serde_json::from_str(&text)?)
}

fn heartbeat_interval(payload: &GatewayPayload) -> Result<u64, GatewayError> {
    if payload.op != 10 {
        return Err(GatewayError::UnexpectedHello(format!("op {}", payload.op)));
    }
    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| GatewayError::UnexpectedHello("missing heartbeat_interval".to_string()))
}

/// Exponential backoff with jitter, capped at 60s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jittered = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jittered.min(60_000.0) as u64)
}

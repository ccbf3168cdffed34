//! Realtime change notifications fanned out to WebSocket clients.

use crate::types::{Car, CarWorkSession, DeleteAllOutcome, Mechanic, Punch, Task};
use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::SharedState;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// A change clients may want to react to.
///
/// Serialized as `{"event": "<kebab-name>", "data": <payload>}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Event {
    TaskAdded(Task),
    TaskUpdated(Task),
    TaskDeleted { id: i64 },
    MechanicAdded(Mechanic),
    MechanicUpdated(Mechanic),
    CarAdded(Car),
    PunchAdded(Punch),
    PunchUpdated(Punch),
    PunchDeleted { id: i64 },
    CarSessionStarted(CarWorkSession),
    CarSessionEnded(CarWorkSession),
    CarSessionUpdated(CarWorkSession),
    HoursReset { mechanic_name: String },
    AllHoursReset,
    CarHoursReset { deleted_sessions: usize },
    CarHoursUpdated { car_id: i64, new_total: f64 },
    AllDataCleared(DeleteAllOutcome),
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskAdded(_) => "task-added",
            Event::TaskUpdated(_) => "task-updated",
            Event::TaskDeleted { .. } => "task-deleted",
            Event::MechanicAdded(_) => "mechanic-added",
            Event::MechanicUpdated(_) => "mechanic-updated",
            Event::CarAdded(_) => "car-added",
            Event::PunchAdded(_) => "punch-added",
            Event::PunchUpdated(_) => "punch-updated",
            Event::PunchDeleted { .. } => "punch-deleted",
            Event::CarSessionStarted(_) => "car-session-started",
            Event::CarSessionEnded(_) => "car-session-ended",
            Event::CarSessionUpdated(_) => "car-session-updated",
            Event::HoursReset { .. } => "hours-reset",
            Event::AllHoursReset => "all-hours-reset",
            Event::CarHoursReset { .. } => "car-hours-reset",
            Event::CarHoursUpdated { .. } => "car-hours-updated",
            Event::AllDataCleared(_) => "all-data-cleared",
        }
    }
}

/// Publish-capable sink for change events.
///
/// Publishing is best-effort and never fails the caller.
pub trait Notifier: Send + Sync {
    fn publish(&self, event: Event);

    /// A fresh stream of serialized events, for notifiers that can fan out.
    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}

/// Notifier that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn publish(&self, _event: Event) {}
}

/// Fans serialized events out to every subscribed socket.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<String>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Notifier for Broadcaster {
    fn publish(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => {
                // No receivers is fine.
                let receivers = self.tx.send(json).unwrap_or(0);
                debug!(event = event.name(), receivers, "Published event");
            }
            Err(e) => {
                warn!(event = event.name(), error = %e, "Failed to serialize event");
            }
        }
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.tx.subscribe())
    }
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let rx = state.notifier.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn handle_socket(socket: WebSocket, rx: Option<broadcast::Receiver<String>>) {
    let Some(rx) = rx else {
        debug!("Realtime disabled; closing socket");
        let mut socket = socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };
    debug!("WebSocket client connected");
    let (sender, receiver) = socket.split();
    run_socket_loop(sender, receiver, rx).await;
    debug!("WebSocket client disconnected");
}

/// Ping bookkeeping for one socket.
#[derive(Debug, Clone, Copy)]
struct Keepalive {
    last_pong: Instant,
    awaiting_pong: bool,
}

impl Keepalive {
    fn new(now: Instant) -> Self {
        Self {
            last_pong: now,
            awaiting_pong: false,
        }
    }

    /// True once a Ping has gone unanswered for longer than [`PONG_TIMEOUT`].
    fn is_dead(&self, now: Instant) -> bool {
        self.awaiting_pong && now.duration_since(self.last_pong) > PONG_TIMEOUT
    }

    fn ping_sent(&mut self) {
        self.awaiting_pong = true;
    }

    fn pong_received(&mut self, now: Instant) {
        self.last_pong = now;
        self.awaiting_pong = false;
    }
}

/// What a frame from the client means for the loop.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Pong,
    Closed,
    Ignored,
}

impl Inbound {
    fn classify(frame: Option<Result<Message, axum::Error>>) -> Self {
        match frame {
            Some(Ok(Message::Pong(_))) => Inbound::Pong,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Inbound::Closed,
            // Clients only listen; their text, binary and pings carry nothing.
            Some(Ok(_)) => Inbound::Ignored,
        }
    }
}

/// Push ledger events to one client until it leaves or stops answering pings.
///
/// A client that falls more than the channel capacity behind skips the
/// missed events and keeps receiving from the newest one.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // Consume the immediate first tick so the first ping waits a full interval.
    ping_interval.tick().await;

    let mut keepalive = Keepalive::new(Instant::now());

    loop {
        tokio::select! {
            // ── Keepalive ───────────────────────────────────────────
            _ = ping_interval.tick() => {
                if keepalive.is_dead(Instant::now()) {
                    debug!("WebSocket client missed its pong; dropping");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                keepalive.ping_sent();
            }

            // ── Ledger events ───────────────────────────────────────
            event = rx.recv() => {
                let json = match event {
                    Ok(json) => json,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "WebSocket client lagged behind ledger events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            // ── Client frames ───────────────────────────────────────
            frame = receiver.next() => {
                match Inbound::classify(frame) {
                    Inbound::Pong => keepalive.pong_received(Instant::now()),
                    Inbound::Closed => break,
                    Inbound::Ignored => {}
                }
            }
        }
    }

    // Best effort; the peer may already be gone.
    let _ = sender.send(Message::Close(None)).await;
}

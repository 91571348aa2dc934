//! WebSocket subscriber: owns the push connection for one session.
//!
//! The subscriber connects to `{ws_url}/ws/{client_id}`, binds the
//! session to a business topic with a subscribe message, forwards
//! inbound progress messages into the session's ingestion channel, and
//! sends a periodic `ping` keepalive. On disconnect it retries with
//! exponential backoff (capped) and re-sends the subscribe message
//! after every successful reconnect. Connection
//! loss is never surfaced as a pipeline error; the status poller keeps
//! the session consistent while the channel is down.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::channel::{ClientMessage, ServerMessage};
use crate::progress::PipelineEvent;

/// Cadence of the application-level `ping` keepalive. The first ping
/// goes out right after the subscribe binding.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Exponential backoff schedule for reconnect attempts.
///
/// Delays double from `initial` up to `max` and reset after a
/// successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The delay to wait before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

/// Handle to a running subscriber task. Dropping the handle leaves the
/// task running; call [`SubscriberHandle::stop`] to tear it down.
pub struct SubscriberHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SubscriberHandle {
    /// Close the connection and cancel any pending reconnect timer.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Spawns and supervises the push connection for one session.
pub struct ChannelSubscriber;

impl ChannelSubscriber {
    /// Start the subscriber task.
    ///
    /// `ws_url` is the backend's WebSocket base (e.g.
    /// `ws://localhost:8000`); the per-session endpoint and subscribe
    /// binding are derived from `client_id` and `business_id`.
    pub fn spawn(
        ws_url: &str,
        business_id: &str,
        client_id: &str,
        backoff: Backoff,
        tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> SubscriberHandle {
        let url = format!("{}/ws/{}", ws_url.trim_end_matches('/'), client_id);
        let business_id = business_id.to_string();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(run(url, business_id, backoff, tx, shutdown_rx));

        SubscriberHandle {
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }
}

async fn run(
    url: String,
    business_id: String,
    mut backoff: Backoff,
    tx: mpsc::UnboundedSender<PipelineEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    'outer: loop {
        let connected = tokio::select! {
            _ = &mut shutdown_rx => break 'outer,
            conn = connect_async(&url) => conn,
        };

        match connected {
            Ok((mut ws, _)) => {
                info!(%url, "progress channel connected");
                backoff.reset();

                let subscribed = subscribe(&mut ws, &business_id).await;
                if subscribed {
                    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
                    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    'inner: loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => {
                                let _ = ws.close(None).await;
                                break 'outer;
                            }
                            _ = keepalive.tick() => {
                                if !ping(&mut ws).await {
                                    debug!(%url, "keepalive send failed");
                                    break 'inner;
                                }
                            }
                            msg = ws.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    if !forward(&text, &tx) {
                                        // Receiver gone: the session was destroyed.
                                        break 'outer;
                                    }
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    let _ = ws.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!(%url, "progress channel closed by peer");
                                    break 'inner;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!(%url, error = %e, "progress channel read failed");
                                    break 'inner;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(%url, error = %e, "progress channel connect failed");
            }
        }

        let delay = backoff.next_delay();
        debug!(%url, ?delay, "scheduling channel reconnect");
        tokio::select! {
            _ = &mut shutdown_rx => break 'outer,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!(%url, "progress channel subscriber stopped");
}

/// Send the subscribe control message; returns false on a send failure
/// (treated as a disconnect).
async fn subscribe<S>(ws: &mut S, business_id: &str) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let msg = ClientMessage::Subscribe {
        business_id: business_id.to_string(),
    };
    let Ok(payload) = serde_json::to_string(&msg) else {
        return false;
    };
    match ws.send(Message::Text(payload)).await {
        Ok(()) => true,
        Err(_) => {
            warn!(%business_id, "failed to send subscribe message");
            false
        }
    }
}

/// Send the application-level keepalive; the backend answers with a
/// `pong` message, which `forward` swallows.
async fn ping<S>(ws: &mut S) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let Ok(payload) = serde_json::to_string(&ClientMessage::Ping) else {
        return false;
    };
    ws.send(Message::Text(payload)).await.is_ok()
}

/// Parse one inbound text frame and forward it if it is a progress
/// message. Returns false only when the ingestion channel is closed.
fn forward(text: &str, tx: &mpsc::UnboundedSender<PipelineEvent>) -> bool {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => {
            if let Some(event) = msg.into_pipeline_event() {
                return tx.send(event).is_ok();
            }
        }
        Err(e) => {
            debug!(error = %e, "ignoring unrecognized channel message");
        }
    }
    true
}

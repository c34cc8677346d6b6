//! Websocket session handling for the push feed.
//!
//! The session loop is generic over the transport so it can be driven
//! by an in-memory stream in tests; production connections come from
//! `tokio_tungstenite::connect_async`.

use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{error, info, warn};

use curvepad_types::{FeedEnvelope, HEARTBEAT_FRAME};

use crate::protocol::{FeedConfig, FeedTopic, KeepaliveTracker};

/// Event delivered to feed consumers
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A well-formed success message arrived on the topic
    Update {
        topic: FeedTopic,
        data: serde_json::Value,
    },
    /// The reconnect budget is exhausted; the feed is gone for good
    Lost { topic: FeedTopic },
}

/// Why a live session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Keepalive silence exceeded the configured threshold
    Dead,
    /// The peer closed or the transport failed
    Closed,
    /// The consumer dropped its receiver; stop entirely
    Dropped,
}

/// Push-feed client; one subscription per logical topic
pub struct FeedClient {
    config: FeedConfig,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    /// Open a topic subscription. The connection task runs until the
    /// subscription is dropped or the reconnect budget is exhausted.
    pub fn subscribe(&self, topic: FeedTopic) -> FeedSubscription {
        let (tx, rx) = mpsc::channel(64);
        let last_seen = Arc::new(Mutex::new(None));
        let handle = tokio::spawn(run(
            self.config.clone(),
            topic,
            tx,
            Arc::clone(&last_seen),
        ));
        FeedSubscription {
            topic,
            events: rx,
            last_seen,
            handle,
        }
    }
}

/// A live topic subscription
pub struct FeedSubscription {
    pub topic: FeedTopic,
    pub events: mpsc::Receiver<FeedEvent>,
    last_seen: Arc<Mutex<Option<FeedEnvelope>>>,
    handle: JoinHandle<()>,
}

impl FeedSubscription {
    /// Last envelope seen on this topic, success or not
    pub async fn last_seen(&self) -> Option<FeedEnvelope> {
        self.last_seen.lock().await.clone()
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Connect/reconnect loop for one topic
async fn run(
    config: FeedConfig,
    topic: FeedTopic,
    tx: mpsc::Sender<FeedEvent>,
    last_seen: Arc<Mutex<Option<FeedEnvelope>>>,
) {
    let url = config.url(topic);
    let mut attempt: u32 = 0;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                info!(%topic, %url, "feed connected");
                attempt = 0;
                match drive_session(stream, &config, topic, &tx, &last_seen).await {
                    SessionEnd::Dropped => return,
                    SessionEnd::Dead => {
                        warn!(%topic, "feed keepalive missed, reconnecting");
                    }
                    SessionEnd::Closed => {
                        warn!(%topic, "feed connection closed, reconnecting");
                    }
                }
            }
            Err(e) => {
                warn!(%topic, error = %e, "feed connect failed");
            }
        }

        attempt += 1;
        if attempt > config.max_reconnect_attempts {
            error!(%topic, attempts = attempt - 1, "feed reconnect budget exhausted");
            let _ = tx.send(FeedEvent::Lost { topic }).await;
            return;
        }

        let delay = config.retry.delay_for_attempt(attempt - 1);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// Drive one live connection until it dies, closes, or the consumer
/// goes away.
async fn drive_session<S>(
    stream: S,
    config: &FeedConfig,
    topic: FeedTopic,
    tx: &mpsc::Sender<FeedEvent>,
    last_seen: &Mutex<Option<FeedEnvelope>>,
) -> SessionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    let (mut sink, mut source) = stream.split();

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // consume the immediate first tick so heartbeats are spaced from connect
    heartbeat.tick().await;

    let mut keepalive = KeepaliveTracker::new(config.dead_after());

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if keepalive.is_dead() {
                    return SessionEnd::Dead;
                }
                if sink.send(Message::Text(HEARTBEAT_FRAME.to_string())).await.is_err() {
                    return SessionEnd::Closed;
                }
            }
            inbound = source.next() => match inbound {
                Some(Ok(message)) => {
                    // any inbound frame counts as the connection's keep-alive
                    keepalive.touch();
                    if let Message::Text(text) = message {
                        if let Some(envelope) = FeedEnvelope::parse(&text) {
                            let update = if envelope.is_success() {
                                envelope.data.clone()
                            } else {
                                None
                            };
                            *last_seen.lock().await = Some(envelope);
                            if let Some(data) = update {
                                if tx.send(FeedEvent::Update { topic, data }).await.is_err() {
                                    return SessionEnd::Dropped;
                                }
                            }
                        }
                        // empty or unparsable payloads are "no update"
                    }
                }
                Some(Err(e)) => {
                    warn!(%topic, error = %e, "feed read error");
                    return SessionEnd::Closed;
                }
                None => return SessionEnd::Closed,
            }
        }
    }
}

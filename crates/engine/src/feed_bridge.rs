//! Bridge between the push feed and the curve oracle.
//!
//! Feed updates are advisory only: they invalidate the cached curve
//! state so the next read refetches, but the poll loop stays the source
//! of truth since push delivery is not guaranteed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use curvepad_feed::FeedEvent;

use crate::oracle::CurveOracle;

/// Consume feed events for a token, invalidating the oracle cache on
/// every update. Ends when the feed is lost or the sender goes away.
pub fn spawn_feed_bridge(
    oracle: Arc<CurveOracle>,
    token_address: String,
    mut events: mpsc::Receiver<FeedEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                FeedEvent::Update { topic, .. } => {
                    debug!(%topic, token = %token_address, "feed update, invalidating curve cache");
                    oracle.invalidate(&token_address).await;
                }
                FeedEvent::Lost { topic } => {
                    warn!(%topic, "feed lost after exhausting reconnect budget");
                    break;
                }
            }
        }
    })
}

/// Realtime push-feed client for the Curvepad settlement engine
///
/// Maintains one websocket connection per logical topic, sends the
/// protocol heartbeat while connected, reconnects with bounded backoff
/// when the connection goes quiet, and forwards only well-formed
/// success messages. Feed updates are advisory: consumers invalidate
/// caches, they never treat the feed as the source of truth.

pub mod client;
pub mod protocol;

pub use client::*;
pub use protocol::*;

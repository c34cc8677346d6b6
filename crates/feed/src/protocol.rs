//! Feed protocol pieces kept separate from the websocket transport:
//! topics, reconnect policy, and keepalive tracking.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use curvepad_types::HEARTBEAT_INTERVAL_MS;

// ============================================================================
// Topics
// ============================================================================

/// Logical feed topics, one connection each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedTopic {
    TradeLogs,
    TokenInfo,
    TradeRecords,
}

impl FeedTopic {
    /// Path of the topic's websocket endpoint
    pub fn path(&self) -> &'static str {
        match self {
            FeedTopic::TradeLogs => "/chat/trade_log",
            FeedTopic::TokenInfo => "/chat/coin_info",
            FeedTopic::TradeRecords => "/chat/trade_record",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedTopic::TradeLogs => "trade_logs",
            FeedTopic::TokenInfo => "token_info",
            FeedTopic::TradeRecords => "trade_records",
        }
    }
}

impl std::fmt::Display for FeedTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Feed connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Websocket base URL, e.g. `ws://host:port`
    pub base_url: String,

    /// Heartbeat cadence while connected (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// How many silent heartbeat intervals mark the connection dead
    pub missed_multiple: u32,

    /// Maximum reconnect attempts before the feed is reported lost
    pub max_reconnect_attempts: u32,

    /// Reconnect backoff
    pub retry: RetryConfig,
}

impl FeedConfig {
    /// Endpoint URL for a topic
    pub fn url(&self, topic: FeedTopic) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), topic.path())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence threshold after which the connection counts as dead
    pub fn dead_after(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms * u64::from(self.missed_multiple))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if self.heartbeat_interval_ms == 0 {
            return Err("heartbeat_interval_ms must be greater than 0".to_string());
        }
        if self.missed_multiple == 0 {
            return Err("missed_multiple must be greater than 0".to_string());
        }
        if self.max_reconnect_attempts == 0 {
            return Err("max_reconnect_attempts must be greater than 0".to_string());
        }
        self.retry.validate()
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:9000".to_string(),
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
            missed_multiple: 3,
            max_reconnect_attempts: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Validate retry configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be greater than 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "max_delay_ms must be at least base_delay_ms ({})",
                self.base_delay_ms
            ));
        }
        if self.backoff_multiplier <= 1.0 {
            return Err("backoff_multiplier must be greater than 1.0".to_string());
        }
        Ok(())
    }

    /// Calculate delay for retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return self.base_delay_ms;
        }

        let exponential_delay =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (exponential_delay as u64).min(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

// ============================================================================
// Keepalive
// ============================================================================

/// Tracks the connection's own keep-alive. Any inbound frame refreshes
/// the clock; silence past the threshold marks the connection dead.
#[derive(Debug)]
pub struct KeepaliveTracker {
    last_seen: Instant,
    dead_after: Duration,
}

impl KeepaliveTracker {
    pub fn new(dead_after: Duration) -> Self {
        Self {
            last_seen: Instant::now(),
            dead_after,
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_dead(&self) -> bool {
        self.last_seen.elapsed() > self.dead_after
    }
}

//! Reconciliation recorder: posts confirmed on-chain results to the
//! off-chain ledger.
//!
//! The backend keys records by tx hash, so a retried post with the same
//! hash must not double-count. A failed post leaves the chain-side
//! effect intact and the off-chain projection behind; that divergence is
//! surfaced as `BackendSyncFailed` on the ticket, never swallowed.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use curvepad_types::{EngineError, EngineResult, RecordResult, TradeRecord};

use crate::config::BackendConfig;
use crate::ports::RecordSink;

/// Success code of the backend's response envelope
const API_CODE_SUCCESS: i64 = 200;

/// Response envelope of the record API: `{code, message, data}`
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

/// HTTP implementation of the record sink
pub struct HttpRecorder {
    client: reqwest::Client,
    records_url: String,
}

impl HttpRecorder {
    pub fn new(config: &BackendConfig) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::backend_error(&e.to_string(), None))?;

        let records_url = format!(
            "{}/api/v1/coin/trades/",
            config.base_url.trim_end_matches('/')
        );

        Ok(Self {
            client,
            records_url,
        })
    }
}

#[async_trait]
impl RecordSink for HttpRecorder {
    async fn record(&self, record: &TradeRecord) -> EngineResult<RecordResult> {
        let response = self
            .client
            .post(&self.records_url)
            .json(record)
            .send()
            .await
            .map_err(|e| EngineError::backend_error(&e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            warn!(tx_hash = %record.tx_hash, %status, "record endpoint returned error status");
            return Err(EngineError::backend_error(
                &format!("record endpoint returned {status}"),
                Some(status.as_u16() as i64),
            ));
        }

        let body: ApiResponse<RecordResult> = response
            .json()
            .await
            .map_err(|e| EngineError::backend_error(&e.to_string(), None))?;

        if body.code != API_CODE_SUCCESS {
            return Err(EngineError::backend_error(&body.message, Some(body.code)));
        }

        let result = body.data.ok_or_else(|| {
            EngineError::backend_error("record response missing data", Some(body.code))
        })?;

        info!(tx_hash = %record.tx_hash, record_id = %result.record_id, "trade record synced");
        Ok(result)
    }
}

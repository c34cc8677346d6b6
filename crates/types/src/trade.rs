/// Trade requests, settlement tickets, and reconciliation records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ChainFailure, EngineError, EngineResult};

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// Immutable value created per user trade action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub side: TradeSide,
    pub amount: Decimal,
    pub wallet: String,
    pub token_address: String,
    pub chain_id: u64,
}

impl TradeRequest {
    /// Pre-I/O validation: caught locally, never thrown past the caller
    pub fn validate(&self) -> EngineResult<()> {
        if self.wallet.trim().is_empty() {
            return Err(EngineError::validation("wallet", "must not be empty"));
        }
        if self.token_address.trim().is_empty() {
            return Err(EngineError::validation("token_address", "must not be empty"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(EngineError::validation("amount", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Launchpad claim request (no amount: the ledger pays out the allocation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub wallet: String,
    pub token_address: String,
    pub chain_id: u64,
}

impl ClaimRequest {
    pub fn validate(&self) -> EngineResult<()> {
        if self.wallet.trim().is_empty() {
            return Err(EngineError::validation("wallet", "must not be empty"));
        }
        if self.token_address.trim().is_empty() {
            return Err(EngineError::validation("token_address", "must not be empty"));
        }
        Ok(())
    }
}

/// What a settlement ticket is settling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementRequest {
    Trade(TradeRequest),
    Claim(ClaimRequest),
}

impl SettlementRequest {
    pub fn wallet(&self) -> &str {
        match self {
            SettlementRequest::Trade(r) => &r.wallet,
            SettlementRequest::Claim(r) => &r.wallet,
        }
    }

    pub fn token_address(&self) -> &str {
        match self {
            SettlementRequest::Trade(r) => &r.token_address,
            SettlementRequest::Claim(r) => &r.token_address,
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            SettlementRequest::Trade(r) => r.chain_id,
            SettlementRequest::Claim(r) => r.chain_id,
        }
    }
}

// ============================================================================
// Settlement Ticket
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TicketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Settlement lifecycle state.
///
/// Transitions are strictly forward; a ticket never leaves a terminal
/// state. The single exception is the manual reconciliation retry,
/// `BackendSyncFailed -> BackendSynced`, which reuses the original tx
/// hash as idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TicketState {
    Validating,
    Submitted,
    Confirming,
    Confirmed,
    ChainFailed { cause: ChainFailure },
    BackendSynced { record_id: String },
    BackendSyncFailed { message: String },
    Superseded,
}

impl TicketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::Validating => "validating",
            TicketState::Submitted => "submitted",
            TicketState::Confirming => "confirming",
            TicketState::Confirmed => "confirmed",
            TicketState::ChainFailed { .. } => "chain_failed",
            TicketState::BackendSynced { .. } => "backend_synced",
            TicketState::BackendSyncFailed { .. } => "backend_sync_failed",
            TicketState::Superseded => "superseded",
        }
    }

    /// Terminal states accept no further pipeline transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TicketState::ChainFailed { .. }
                | TicketState::BackendSynced { .. }
                | TicketState::BackendSyncFailed { .. }
                | TicketState::Superseded
        )
    }

    pub fn can_advance_to(&self, next: &TicketState) -> bool {
        use TicketState::*;
        match (self, next) {
            (Validating, Submitted)
            | (Validating, ChainFailed { .. })
            | (Submitted, Confirming)
            | (Submitted, ChainFailed { .. })
            | (Confirming, Confirmed)
            | (Confirming, ChainFailed { .. })
            | (Confirmed, BackendSynced { .. })
            | (Confirmed, BackendSyncFailed { .. }) => true,
            // manual retry of the off-chain write, same idempotency key
            (BackendSyncFailed { .. }, BackendSynced { .. }) => true,
            // supersession parks any in-flight ticket
            (current, Superseded) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// The tracked unit of a single trade/claim attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementTicket {
    pub id: TicketId,
    pub request: SettlementRequest,
    pub state: TicketState,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SettlementTicket {
    pub fn new(request: SettlementRequest) -> Self {
        Self {
            id: TicketId::new(),
            request,
            state: TicketState::Validating,
            tx_hash: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a transition if the state machine allows it.
    ///
    /// Returns false (leaving the ticket untouched) on a refused
    /// transition; late results of a superseded ticket land here.
    pub fn advance(&mut self, next: TicketState) -> bool {
        if !self.state.can_advance_to(&next) {
            return false;
        }
        self.state = next;
        true
    }
}

// ============================================================================
// Ledger Receipts and Backend Records
// ============================================================================

/// Outcome of awaiting a transaction receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub status: ReceiptStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted { reason: String },
}

/// Side tag carried on the off-chain record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSide {
    Buy,
    Sell,
    Claim,
}

impl From<TradeSide> for RecordSide {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => RecordSide::Buy,
            TradeSide::Sell => RecordSide::Sell,
        }
    }
}

/// Payload posted to the off-chain record endpoint, idempotent on `tx_hash`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub wallet: String,
    pub token_address: String,
    pub tx_hash: String,
    pub amount: Decimal,
    pub side: RecordSide,
}

/// Canonical record handle returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    pub record_id: String,
}

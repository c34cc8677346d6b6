//! Port abstractions over the engine's external collaborators
//!
//! The external ledger, the wallet provider, and the backend record API
//! are injected through these traits; nothing in the engine talks to a
//! concrete chain or HTTP endpoint directly.

use async_trait::async_trait;
use rust_decimal::Decimal;

use curvepad_types::{
    CurveState, EngineResult, RecordResult, TradeRecord, TxReceipt, WalletParticipation,
};

/// Read port over the external ledger's bonding-curve and sale state
#[async_trait]
pub trait CurveLedger: Send + Sync {
    /// Current curve/sale state for a token
    async fn curve_state(&self, token_address: &str) -> EngineResult<CurveState>;

    /// Per-wallet participation for a sale
    async fn participation(
        &self,
        token_address: &str,
        wallet: &str,
    ) -> EngineResult<WalletParticipation>;
}

/// Write port over the external ledger.
///
/// Each write returns a transaction hash; confirmation is awaited
/// separately through `confirm`.
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    async fn submit_buy(&self, token_address: &str, amount: Decimal) -> EngineResult<String>;

    async fn submit_sell(&self, token_address: &str, amount: Decimal) -> EngineResult<String>;

    async fn submit_claim(&self, token_address: &str, wallet: &str) -> EngineResult<String>;

    /// Await the transaction receipt. Resolves with a reverted receipt on
    /// an on-chain failure; transport problems surface as errors.
    async fn confirm(&self, tx_hash: &str) -> EngineResult<TxReceipt>;
}

/// Wallet provider port, used for the chain-switch prompt
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt the wallet to switch to the given chain. An error means the
    /// user declined or the switch failed.
    async fn switch_chain(&self, chain_id: u64) -> EngineResult<()>;
}

/// Off-chain record sink, idempotent on the record's tx hash
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn record(&self, record: &TradeRecord) -> EngineResult<RecordResult>;
}

//! Settlement coordinator: submit → confirm → reconcile.
//!
//! Owns the active settlement ticket and its cancellation handle. At
//! most one ticket is live per coordinator; a new submit supersedes the
//! previous one instead of racing it, which is the engine's substitute
//! for locking across awaits. Backend reconciliation only ever runs
//! after chain confirmation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use curvepad_math::{
    amount_to_tokens, claim_allocation, clamp, cost_to_reach_target, tokens_to_amount, Clamped,
};
use curvepad_types::{
    ChainFailure, ClaimRequest, EngineError, EngineResult, ReceiptStatus, RecordResult,
    RecordSide, SettlementRequest, SettlementTicket, TicketId, TicketState, TradeRecord,
    TradeRequest, TradeSide,
};

use crate::cancel::{cancel_pair, CancelHandle, CancelToken};
use crate::config::EngineConfig;
use crate::oracle::CurveOracle;
use crate::ports::{RecordSink, SettlementLedger, WalletProvider};

/// Settlement pipeline limits and chain binding
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Chain the sale/token is bound to
    pub required_chain_id: u64,

    /// Bounded wait for a transaction receipt
    pub confirm_timeout: Duration,

    /// Tokens claimable per minimum-contribution ticket
    pub claim_per_ticket: Decimal,
}

impl CoordinatorConfig {
    pub fn from_engine(config: &EngineConfig) -> Self {
        Self {
            required_chain_id: config.chain.required_chain_id,
            confirm_timeout: config.settlement.confirm_timeout(),
            claim_per_ticket: config.sale.claim_per_ticket,
        }
    }
}

/// The single live ticket and its cancellation handle
struct ActiveSlot {
    id: TicketId,
    cancel: CancelHandle,
}

/// Bookkeeping shared with settlement tasks
struct SharedState {
    tickets: Mutex<HashMap<TicketId, SettlementTicket>>,
    /// Exact record payload per ticket, retained for manual retry with
    /// the same idempotency key
    records: Mutex<HashMap<TicketId, TradeRecord>>,
    active: Mutex<Option<ActiveSlot>>,
}

/// What the settlement task has to do once the request is validated
struct SettlementJob {
    write: LedgerWrite,
    wallet: String,
    token: String,
    record_side: RecordSide,
    record_amount: Decimal,
}

enum LedgerWrite {
    Buy { amount: Decimal },
    Sell { amount: Decimal },
    Claim,
}

/// Everything a spawned settlement task needs
struct TaskCtx {
    oracle: Arc<CurveOracle>,
    ledger: Arc<dyn SettlementLedger>,
    recorder: Arc<dyn RecordSink>,
    shared: Arc<SharedState>,
    confirm_timeout: Duration,
}

pub struct TransactionCoordinator {
    oracle: Arc<CurveOracle>,
    ledger: Arc<dyn SettlementLedger>,
    wallet: Arc<dyn WalletProvider>,
    recorder: Arc<dyn RecordSink>,
    config: CoordinatorConfig,
    shared: Arc<SharedState>,
}

impl TransactionCoordinator {
    pub fn new(
        oracle: Arc<CurveOracle>,
        ledger: Arc<dyn SettlementLedger>,
        wallet: Arc<dyn WalletProvider>,
        recorder: Arc<dyn RecordSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            oracle,
            ledger,
            wallet,
            recorder,
            config,
            shared: Arc::new(SharedState {
                tickets: Mutex::new(HashMap::new()),
                records: Mutex::new(HashMap::new()),
                active: Mutex::new(None),
            }),
        }
    }

    /// Submit a trade. Validates, clamps, quotes, supersedes any active
    /// ticket, then drives the settlement pipeline in the background.
    ///
    /// Exactly one external-ledger write happens per non-superseded
    /// submit.
    pub async fn submit(&self, request: TradeRequest) -> EngineResult<TicketId> {
        request.validate()?;
        self.ensure_chain(request.chain_id).await?;

        let state = self.oracle.state(&request.token_address).await?;

        let effective = match request.side {
            TradeSide::Buy => {
                if !state.value.is_buy_active {
                    return Err(EngineError::validation(
                        "side",
                        "buying is not active for this sale",
                    ));
                }
                let participation = self
                    .oracle
                    .participation(&request.token_address, &request.wallet)
                    .await?;
                let clamped = clamp(request.amount, &participation.value, &state.value);
                if let Some(reason) = clamped.reason {
                    debug!(
                        requested = %request.amount,
                        value = %clamped.value,
                        reason = reason.as_str(),
                        "contribution clamped"
                    );
                }
                if clamped.value <= Decimal::ZERO {
                    return Err(EngineError::validation(
                        "amount",
                        "no remaining allocation for this wallet",
                    ));
                }
                clamped.value
            }
            TradeSide::Sell => request.amount,
        };

        let quote = match request.side {
            TradeSide::Buy => amount_to_tokens(effective, &state.value)?,
            TradeSide::Sell => tokens_to_amount(effective, &state.value)?,
        };
        info!(
            side = request.side.as_str(),
            amount = %effective,
            quote = %quote,
            "submitting trade"
        );

        let request = TradeRequest {
            amount: effective,
            ..request
        };
        let job = SettlementJob {
            write: match request.side {
                TradeSide::Buy => LedgerWrite::Buy { amount: effective },
                TradeSide::Sell => LedgerWrite::Sell { amount: effective },
            },
            wallet: request.wallet.clone(),
            token: request.token_address.clone(),
            record_side: request.side.into(),
            record_amount: effective,
        };

        self.launch(SettlementRequest::Trade(request), job).await
    }

    /// Submit a launchpad claim for the wallet's full allocation
    pub async fn submit_claim(&self, request: ClaimRequest) -> EngineResult<TicketId> {
        request.validate()?;
        self.ensure_chain(request.chain_id).await?;

        let state = self.oracle.state(&request.token_address).await?;
        if !state.value.is_claim_active {
            return Err(EngineError::validation(
                "claim",
                "claiming is not active for this sale",
            ));
        }

        let participation = self
            .oracle
            .participation(&request.token_address, &request.wallet)
            .await?;
        if participation.value.has_claimed {
            return Err(EngineError::validation(
                "claim",
                "allocation already claimed",
            ));
        }
        if participation.value.contributed <= Decimal::ZERO {
            return Err(EngineError::validation(
                "claim",
                "nothing to claim for this wallet",
            ));
        }

        let claimable = claim_allocation(
            participation.value.contributed,
            state.value.min_contribution,
            self.config.claim_per_ticket,
        )?;
        info!(wallet = %request.wallet, tokens = %claimable, "submitting claim");

        let job = SettlementJob {
            write: LedgerWrite::Claim,
            wallet: request.wallet.clone(),
            token: request.token_address.clone(),
            record_side: RecordSide::Claim,
            record_amount: claimable,
        };

        self.launch(SettlementRequest::Claim(request), job).await
    }

    /// Read-only quote: tokens received for a buy amount, or funding
    /// received for a sell amount
    pub async fn quote(
        &self,
        side: TradeSide,
        token_address: &str,
        amount: Decimal,
    ) -> EngineResult<Decimal> {
        let state = self.oracle.state(token_address).await?;
        match side {
            TradeSide::Buy => amount_to_tokens(amount, &state.value),
            TradeSide::Sell => tokens_to_amount(amount, &state.value),
        }
    }

    /// Funding required to end up holding `target_tokens`
    pub async fn cost_for_tokens(
        &self,
        token_address: &str,
        target_tokens: Decimal,
    ) -> EngineResult<Decimal> {
        let state = self.oracle.state(token_address).await?;
        cost_to_reach_target(target_tokens, &state.value)
    }

    /// Clamp a contribution the way `submit` would, for input widgets
    pub async fn clamp_contribution(
        &self,
        token_address: &str,
        wallet: &str,
        requested: Decimal,
    ) -> EngineResult<Clamped> {
        let state = self.oracle.state(token_address).await?;
        let participation = self.oracle.participation(token_address, wallet).await?;
        Ok(clamp(requested, &participation.value, &state.value))
    }

    /// Look up a ticket, active or historical
    pub async fn ticket(&self, id: TicketId) -> Option<SettlementTicket> {
        self.shared.tickets.lock().await.get(&id).cloned()
    }

    /// The currently active ticket, if any
    pub async fn active_ticket(&self) -> Option<SettlementTicket> {
        let active = self.shared.active.lock().await;
        let id = active.as_ref()?.id;
        drop(active);
        self.ticket(id).await
    }

    /// Manually retry the off-chain record of a `BackendSyncFailed`
    /// ticket, reusing the original tx hash as idempotency key.
    pub async fn retry_record(&self, id: TicketId) -> EngineResult<RecordResult> {
        {
            let tickets = self.shared.tickets.lock().await;
            let ticket = tickets
                .get(&id)
                .ok_or_else(|| EngineError::validation("ticket", "unknown ticket id"))?;
            if !matches!(ticket.state, TicketState::BackendSyncFailed { .. }) {
                return Err(EngineError::validation(
                    "ticket",
                    "only failed backend syncs can be retried",
                ));
            }
        }

        let record = self
            .shared
            .records
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::validation("ticket", "no record payload retained"))?;

        let result = self.recorder.record(&record).await?;

        let mut tickets = self.shared.tickets.lock().await;
        if let Some(ticket) = tickets.get_mut(&id) {
            ticket.advance(TicketState::BackendSynced {
                record_id: result.record_id.clone(),
            });
        }
        info!(ticket = %id, record_id = %result.record_id, "backend sync completed on retry");
        Ok(result)
    }

    /// Cancel any active settlement. Used on route/session teardown.
    pub async fn shutdown(&self) {
        let mut active = self.shared.active.lock().await;
        if let Some(slot) = active.take() {
            info!(ticket = %slot.id, "cancelling active settlement");
            slot.cancel.cancel();
            let mut tickets = self.shared.tickets.lock().await;
            if let Some(ticket) = tickets.get_mut(&slot.id) {
                ticket.advance(TicketState::Superseded);
            }
        }
    }

    /// Check the request's chain against the sale's chain, prompting a
    /// wallet switch when they differ
    async fn ensure_chain(&self, chain_id: u64) -> EngineResult<()> {
        if chain_id == self.config.required_chain_id {
            return Ok(());
        }
        info!(
            required = self.config.required_chain_id,
            actual = chain_id,
            "prompting wallet to switch chain"
        );
        self.wallet
            .switch_chain(self.config.required_chain_id)
            .await
            .map_err(|e| {
                warn!(error = %e, "chain switch declined");
                EngineError::wrong_chain(self.config.required_chain_id, chain_id)
            })
    }

    /// Supersede the active ticket, register the new one, and spawn its
    /// settlement task
    async fn launch(
        &self,
        request: SettlementRequest,
        job: SettlementJob,
    ) -> EngineResult<TicketId> {
        let ticket = SettlementTicket::new(request);
        let id = ticket.id;
        let (handle, token) = cancel_pair();

        {
            let mut active = self.shared.active.lock().await;
            if let Some(previous) = active.take() {
                info!(previous = %previous.id, next = %id, "superseding active ticket");
                previous.cancel.cancel();
                let mut tickets = self.shared.tickets.lock().await;
                if let Some(superseded) = tickets.get_mut(&previous.id) {
                    superseded.advance(TicketState::Superseded);
                }
            }
            self.shared.tickets.lock().await.insert(id, ticket);
            *active = Some(ActiveSlot { id, cancel: handle });
        }

        let ctx = TaskCtx {
            oracle: Arc::clone(&self.oracle),
            ledger: Arc::clone(&self.ledger),
            recorder: Arc::clone(&self.recorder),
            shared: Arc::clone(&self.shared),
            confirm_timeout: self.config.confirm_timeout,
        };
        tokio::spawn(run_settlement(ctx, id, job, token));

        Ok(id)
    }
}

/// Drive one ticket through the pipeline. Every await that can outlive
/// a supersession races the cancellation token; a cancelled task's late
/// result is discarded, never applied.
async fn run_settlement(ctx: TaskCtx, id: TicketId, job: SettlementJob, mut cancel: CancelToken) {
    // ledger write
    let write = async {
        match &job.write {
            LedgerWrite::Buy { amount } => ctx.ledger.submit_buy(&job.token, *amount).await,
            LedgerWrite::Sell { amount } => ctx.ledger.submit_sell(&job.token, *amount).await,
            LedgerWrite::Claim => ctx.ledger.submit_claim(&job.token, &job.wallet).await,
        }
    };
    let written = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(ticket = %id, "cancelled while submitting ledger write");
            return;
        }
        result = write => result,
    };

    let tx_hash = match written {
        Ok(hash) => hash,
        Err(e) => {
            warn!(ticket = %id, error = %e, "ledger write rejected");
            transition(
                &ctx,
                id,
                TicketState::ChainFailed {
                    cause: ChainFailure::Rejected {
                        reason: e.to_string(),
                    },
                },
            )
            .await;
            return;
        }
    };

    {
        let mut tickets = ctx.shared.tickets.lock().await;
        match tickets.get_mut(&id) {
            Some(ticket) => {
                // `advance` mutates, so it can't run in a pattern guard; branch in the body.
                if ticket.advance(TicketState::Submitted) {
                    ticket.tx_hash = Some(tx_hash.clone());
                } else {
                    debug!(ticket = %id, "discarding submission result for superseded ticket");
                    return;
                }
            }
            _ => {
                debug!(ticket = %id, "discarding submission result for superseded ticket");
                return;
            }
        }
    }
    if !transition(&ctx, id, TicketState::Confirming).await {
        return;
    }

    // bounded receipt wait
    let confirmed = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(ticket = %id, "cancelled while awaiting confirmation");
            return;
        }
        outcome = timeout(ctx.confirm_timeout, ctx.ledger.confirm(&tx_hash)) => outcome,
    };

    let failure = match confirmed {
        Err(_elapsed) => Some(ChainFailure::ConfirmationTimeout {
            timeout_ms: ctx.confirm_timeout.as_millis() as u64,
        }),
        Ok(Err(e)) => Some(ChainFailure::Network {
            message: e.to_string(),
        }),
        Ok(Ok(receipt)) => match receipt.status {
            ReceiptStatus::Reverted { reason } => Some(ChainFailure::Reverted { reason }),
            ReceiptStatus::Success => None,
        },
    };
    if let Some(cause) = failure {
        warn!(ticket = %id, %cause, "settlement failed on chain");
        transition(&ctx, id, TicketState::ChainFailed { cause }).await;
        return;
    }

    if !transition(&ctx, id, TicketState::Confirmed).await {
        return;
    }
    info!(ticket = %id, %tx_hash, "settlement confirmed");

    // forced refresh so callers never see pre-trade caps
    if let Err(e) = ctx.oracle.refresh_state(&job.token).await {
        warn!(ticket = %id, error = %e, "post-settlement curve refresh failed");
    }
    if let Err(e) = ctx
        .oracle
        .refresh_participation(&job.token, &job.wallet)
        .await
    {
        warn!(ticket = %id, error = %e, "post-settlement participation refresh failed");
    }

    // off-chain reconciliation, idempotent on the tx hash
    let record = TradeRecord {
        wallet: job.wallet.clone(),
        token_address: job.token.clone(),
        tx_hash: tx_hash.clone(),
        amount: job.record_amount,
        side: job.record_side,
    };
    ctx.shared.records.lock().await.insert(id, record.clone());

    let recorded = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(ticket = %id, "cancelled while recording settlement");
            return;
        }
        outcome = ctx.recorder.record(&record) => outcome,
    };

    match recorded {
        Ok(result) => {
            transition(
                &ctx,
                id,
                TicketState::BackendSynced {
                    record_id: result.record_id,
                },
            )
            .await;
        }
        Err(e) => {
            // not retried automatically: retrying a financial write
            // risks duplication, so this surfaces for manual retry
            warn!(ticket = %id, error = %e, "backend sync failed");
            transition(
                &ctx,
                id,
                TicketState::BackendSyncFailed {
                    message: e.to_string(),
                },
            )
            .await;
        }
    }
}

/// Apply a ticket transition; release the active slot once terminal.
/// Returns false when the transition was refused (superseded ticket).
async fn transition(ctx: &TaskCtx, id: TicketId, next: TicketState) -> bool {
    let outcome = {
        let mut tickets = ctx.shared.tickets.lock().await;
        match tickets.get_mut(&id) {
            Some(ticket) => {
                if ticket.advance(next) {
                    Some(ticket.state.is_terminal())
                } else {
                    None
                }
            }
            None => None,
        }
    };

    match outcome {
        Some(true) => {
            let mut active = ctx.shared.active.lock().await;
            if active.as_ref().map(|slot| slot.id) == Some(id) {
                *active = None;
            }
            true
        }
        Some(false) => true,
        None => {
            debug!(ticket = %id, "discarding transition for settled or superseded ticket");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use curvepad_types::{CurveState, TxReceipt, WalletParticipation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const TOKEN: &str = "0xtoken";
    const WALLET: &str = "0xwallet";
    const CHAIN: u64 = 97;

    // ------------------------------------------------------------------
    // Stub ports
    // ------------------------------------------------------------------

    struct StubCurve {
        state: StdMutex<CurveState>,
        participation: StdMutex<WalletParticipation>,
        state_reads: AtomicUsize,
        participation_reads: AtomicUsize,
    }

    impl StubCurve {
        fn new() -> Self {
            Self {
                state: StdMutex::new(CurveState {
                    price: Decimal::ONE,
                    total_raised: Decimal::from(40),
                    target_cap: Decimal::from(100),
                    min_contribution: Decimal::ONE,
                    max_contribution: Decimal::from(10),
                    is_buy_active: true,
                    is_claim_active: false,
                }),
                participation: StdMutex::new(WalletParticipation {
                    wallet: WALLET.to_string(),
                    contributed: Decimal::from(2),
                    is_whitelisted: true,
                    has_claimed: false,
                }),
                state_reads: AtomicUsize::new(0),
                participation_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl crate::ports::CurveLedger for StubCurve {
        async fn curve_state(&self, _token: &str) -> EngineResult<CurveState> {
            self.state_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.state.lock().unwrap().clone())
        }

        async fn participation(
            &self,
            _token: &str,
            _wallet: &str,
        ) -> EngineResult<WalletParticipation> {
            self.participation_reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.participation.lock().unwrap().clone())
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum ConfirmMode {
        Success,
        Revert,
        NetworkError,
        Never,
    }

    struct StubChain {
        submissions: StdMutex<Vec<(String, Decimal)>>,
        confirm_mode: StdMutex<ConfirmMode>,
        next_hash: AtomicUsize,
    }

    impl StubChain {
        fn new(mode: ConfirmMode) -> Self {
            Self {
                submissions: StdMutex::new(Vec::new()),
                confirm_mode: StdMutex::new(mode),
                next_hash: AtomicUsize::new(1),
            }
        }

        fn set_mode(&self, mode: ConfirmMode) {
            *self.confirm_mode.lock().unwrap() = mode;
        }

        fn hash(&self) -> String {
            format!("0xhash{}", self.next_hash.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl SettlementLedger for StubChain {
        async fn submit_buy(&self, _token: &str, amount: Decimal) -> EngineResult<String> {
            self.submissions
                .lock()
                .unwrap()
                .push(("buy".to_string(), amount));
            Ok(self.hash())
        }

        async fn submit_sell(&self, _token: &str, amount: Decimal) -> EngineResult<String> {
            self.submissions
                .lock()
                .unwrap()
                .push(("sell".to_string(), amount));
            Ok(self.hash())
        }

        async fn submit_claim(&self, _token: &str, _wallet: &str) -> EngineResult<String> {
            self.submissions
                .lock()
                .unwrap()
                .push(("claim".to_string(), Decimal::ZERO));
            Ok(self.hash())
        }

        async fn confirm(&self, tx_hash: &str) -> EngineResult<TxReceipt> {
            let mode = *self.confirm_mode.lock().unwrap();
            match mode {
                ConfirmMode::Success => Ok(TxReceipt {
                    tx_hash: tx_hash.to_string(),
                    status: ReceiptStatus::Success,
                }),
                ConfirmMode::Revert => Ok(TxReceipt {
                    tx_hash: tx_hash.to_string(),
                    status: ReceiptStatus::Reverted {
                        reason: "sale closed".to_string(),
                    },
                }),
                ConfirmMode::NetworkError => Err(EngineError::rpc_error("connection reset")),
                ConfirmMode::Never => std::future::pending().await,
            }
        }
    }

    struct StubWallet {
        accept_switch: bool,
        switches: AtomicUsize,
    }

    #[async_trait]
    impl WalletProvider for StubWallet {
        async fn switch_chain(&self, _chain_id: u64) -> EngineResult<()> {
            self.switches.fetch_add(1, Ordering::SeqCst);
            if self.accept_switch {
                Ok(())
            } else {
                Err(EngineError::rpc_error("user rejected the request"))
            }
        }
    }

    /// In-memory record sink, idempotent on tx hash like the backend
    struct MemorySink {
        fail_first: AtomicUsize,
        calls: AtomicUsize,
        by_hash: StdMutex<HashMap<String, String>>,
        recorded: StdMutex<Vec<TradeRecord>>,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                fail_first: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                by_hash: StdMutex::new(HashMap::new()),
                recorded: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn record(&self, record: &TradeRecord) -> EngineResult<RecordResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first.load(Ordering::SeqCst) {
                return Err(EngineError::backend_error("service unavailable", Some(503)));
            }
            self.recorded.lock().unwrap().push(record.clone());
            let mut by_hash = self.by_hash.lock().unwrap();
            let next_id = format!("rec-{}", by_hash.len() + 1);
            let id = by_hash
                .entry(record.tx_hash.clone())
                .or_insert(next_id)
                .clone();
            Ok(RecordResult { record_id: id })
        }
    }

    // ------------------------------------------------------------------
    // Harness
    // ------------------------------------------------------------------

    struct Harness {
        coordinator: TransactionCoordinator,
        curve: Arc<StubCurve>,
        chain: Arc<StubChain>,
        wallet: Arc<StubWallet>,
        sink: Arc<MemorySink>,
    }

    fn harness(mode: ConfirmMode) -> Harness {
        harness_with_timeout(mode, Duration::from_secs(60))
    }

    fn harness_with_timeout(mode: ConfirmMode, confirm_timeout: Duration) -> Harness {
        let curve = Arc::new(StubCurve::new());
        let chain = Arc::new(StubChain::new(mode));
        let wallet = Arc::new(StubWallet {
            accept_switch: true,
            switches: AtomicUsize::new(0),
        });
        let sink = Arc::new(MemorySink::new());
        let oracle = Arc::new(CurveOracle::new(
            Arc::clone(&curve) as Arc<dyn crate::ports::CurveLedger>,
            Duration::from_secs(10),
        ));
        let coordinator = TransactionCoordinator::new(
            oracle,
            Arc::clone(&chain) as Arc<dyn SettlementLedger>,
            Arc::clone(&wallet) as Arc<dyn WalletProvider>,
            Arc::clone(&sink) as Arc<dyn RecordSink>,
            CoordinatorConfig {
                required_chain_id: CHAIN,
                confirm_timeout,
                claim_per_ticket: Decimal::from(1_000),
            },
        );
        Harness {
            coordinator,
            curve,
            chain,
            wallet,
            sink,
        }
    }

    fn buy(amount: &str) -> TradeRequest {
        TradeRequest {
            side: TradeSide::Buy,
            amount: amount.parse().unwrap(),
            wallet: WALLET.to_string(),
            token_address: TOKEN.to_string(),
            chain_id: CHAIN,
        }
    }

    async fn wait_terminal(h: &Harness, id: TicketId) -> SettlementTicket {
        for _ in 0..500 {
            if let Some(ticket) = h.coordinator.ticket(id).await {
                if ticket.state.is_terminal() {
                    return ticket;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ticket {id} never reached a terminal state");
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn coordinator_config_derives_from_engine_config() {
        let engine = EngineConfig::default();
        let config = CoordinatorConfig::from_engine(&engine);
        assert_eq!(config.required_chain_id, engine.chain.required_chain_id);
        assert_eq!(config.confirm_timeout, Duration::from_secs(60));
        assert_eq!(config.claim_per_ticket, engine.sale.claim_per_ticket);
    }

    #[tokio::test]
    async fn buy_settles_end_to_end() {
        let h = harness(ConfirmMode::Success);
        let id = h.coordinator.submit(buy("5")).await.unwrap();
        let ticket = wait_terminal(&h, id).await;

        assert!(matches!(ticket.state, TicketState::BackendSynced { .. }));
        assert!(ticket.tx_hash.is_some());

        let submissions = h.chain.submissions.lock().unwrap().clone();
        assert_eq!(submissions, vec![("buy".to_string(), Decimal::from(5))]);

        let recorded = h.sink.recorded.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].amount, Decimal::from(5));
        assert_eq!(recorded[0].side, RecordSide::Buy);
        assert_eq!(recorded[0].wallet, WALLET);

        // the active slot is released once the ticket settles
        assert!(h.coordinator.active_ticket().await.is_none());
    }

    #[tokio::test]
    async fn oversized_buy_is_clamped_before_submission() {
        let h = harness(ConfirmMode::Success);
        // wallet already contributed 2 of its 10 max, so headroom is 8
        let id = h.coordinator.submit(buy("50")).await.unwrap();
        let ticket = wait_terminal(&h, id).await;

        assert!(matches!(ticket.state, TicketState::BackendSynced { .. }));
        let submissions = h.chain.submissions.lock().unwrap().clone();
        assert_eq!(submissions, vec![("buy".to_string(), Decimal::from(8))]);

        match ticket.request {
            SettlementRequest::Trade(request) => assert_eq!(request.amount, Decimal::from(8)),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_chain_fails_without_a_ledger_write() {
        let h = harness(ConfirmMode::Success);
        let wallet = Arc::new(StubWallet {
            accept_switch: false,
            switches: AtomicUsize::new(0),
        });
        let coordinator = TransactionCoordinator::new(
            Arc::new(CurveOracle::new(
                Arc::clone(&h.curve) as Arc<dyn crate::ports::CurveLedger>,
                Duration::from_secs(10),
            )),
            Arc::clone(&h.chain) as Arc<dyn SettlementLedger>,
            Arc::clone(&wallet) as Arc<dyn WalletProvider>,
            Arc::clone(&h.sink) as Arc<dyn RecordSink>,
            CoordinatorConfig {
                required_chain_id: CHAIN,
                confirm_timeout: Duration::from_secs(60),
                claim_per_ticket: Decimal::from(1_000),
            },
        );

        let mut request = buy("5");
        request.chain_id = 1;
        let err = coordinator.submit(request).await.unwrap_err();

        assert_eq!(err, EngineError::wrong_chain(CHAIN, 1));
        assert_eq!(wallet.switches.load(Ordering::SeqCst), 1);
        assert!(h.chain.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepted_chain_switch_lets_the_trade_through() {
        let h = harness(ConfirmMode::Success);
        let mut request = buy("5");
        request.chain_id = 1;
        let id = h.coordinator.submit(request).await.unwrap();
        let ticket = wait_terminal(&h, id).await;

        assert!(matches!(ticket.state, TicketState::BackendSynced { .. }));
        assert_eq!(h.wallet.switches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_requests_never_reach_the_ledger() {
        let h = harness(ConfirmMode::Success);

        let err = h.coordinator.submit(buy("0")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        let mut request = buy("5");
        request.wallet = String::new();
        let err = h.coordinator.submit(request).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));

        assert!(h.chain.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn inactive_sale_rejects_buys() {
        let h = harness(ConfirmMode::Success);
        h.curve.state.lock().unwrap().is_buy_active = false;
        let err = h.coordinator.submit(buy("5")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(h.chain.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_pool_rejects_buys() {
        let h = harness(ConfirmMode::Success);
        h.curve.state.lock().unwrap().total_raised = Decimal::from(100);
        let err = h.coordinator.submit(buy("5")).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
        assert!(h.chain.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_submit_supersedes_the_first() {
        let h = harness(ConfirmMode::Never);
        let first = h.coordinator.submit(buy("5")).await.unwrap();

        // let the first write land and start confirming
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            h.coordinator.ticket(first).await.unwrap().state,
            TicketState::Confirming
        );

        h.chain.set_mode(ConfirmMode::Success);
        let second = h.coordinator.submit(buy("3")).await.unwrap();

        let superseded = wait_terminal(&h, first).await;
        assert_eq!(superseded.state, TicketState::Superseded);

        let settled = wait_terminal(&h, second).await;
        assert!(matches!(settled.state, TicketState::BackendSynced { .. }));

        // the superseded ticket never reached the backend: one record only
        let recorded = h.sink.recorded.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].amount, Decimal::from(3));
    }

    #[tokio::test]
    async fn reverted_transaction_fails_the_ticket() {
        let h = harness(ConfirmMode::Revert);
        let id = h.coordinator.submit(buy("5")).await.unwrap();
        let ticket = wait_terminal(&h, id).await;

        match ticket.state {
            TicketState::ChainFailed { cause } => {
                assert!(matches!(cause, ChainFailure::Reverted { .. }));
            }
            other => panic!("unexpected state: {other:?}"),
        }
        // the backend is never written for an unconfirmed settlement
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn network_error_fails_the_ticket() {
        let h = harness(ConfirmMode::NetworkError);
        let id = h.coordinator.submit(buy("5")).await.unwrap();
        let ticket = wait_terminal(&h, id).await;

        match ticket.state {
            TicketState::ChainFailed { cause } => {
                assert!(matches!(cause, ChainFailure::Network { .. }));
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_is_distinct_from_rejection() {
        let h = harness_with_timeout(ConfirmMode::Never, Duration::from_millis(200));
        let id = h.coordinator.submit(buy("5")).await.unwrap();
        let ticket = wait_terminal(&h, id).await;

        match ticket.state {
            TicketState::ChainFailed { cause } => assert!(cause.is_timeout()),
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn backend_sync_failure_surfaces_and_retries_manually() {
        let h = harness(ConfirmMode::Success);
        h.sink.fail_first.store(1, Ordering::SeqCst);

        let id = h.coordinator.submit(buy("5")).await.unwrap();
        let ticket = wait_terminal(&h, id).await;
        assert!(matches!(
            ticket.state,
            TicketState::BackendSyncFailed { .. }
        ));

        // no automatic retry happened
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 1);

        // manual retry reuses the same tx hash, yielding one canonical record
        let result = h.coordinator.retry_record(id).await.unwrap();
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.sink.by_hash.lock().unwrap().len(), 1);

        let ticket = h.coordinator.ticket(id).await.unwrap();
        assert_eq!(
            ticket.state,
            TicketState::BackendSynced {
                record_id: result.record_id,
            }
        );

        // a second retry is refused now that the ticket is synced
        assert!(h.coordinator.retry_record(id).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_record_posts_share_one_canonical_record() {
        let h = harness(ConfirmMode::Success);
        let record = TradeRecord {
            wallet: WALLET.to_string(),
            token_address: TOKEN.to_string(),
            tx_hash: "0xsame".to_string(),
            amount: Decimal::from(5),
            side: RecordSide::Buy,
        };

        let first = h.sink.record(&record).await.unwrap();
        let second = h.sink.record(&record).await.unwrap();
        assert_eq!(first.record_id, second.record_id);
        assert_eq!(h.sink.by_hash.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_settlement_forces_an_oracle_refresh() {
        let h = harness(ConfirmMode::Success);
        let id = h.coordinator.submit(buy("5")).await.unwrap();
        wait_terminal(&h, id).await;

        // one read filling the cache at submit, one forced refresh after
        // confirmation
        assert_eq!(h.curve.state_reads.load(Ordering::SeqCst), 2);
        assert_eq!(h.curve.participation_reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_cancels_the_active_settlement() {
        let h = harness(ConfirmMode::Never);
        let id = h.coordinator.submit(buy("5")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        h.coordinator.shutdown().await;

        let ticket = wait_terminal(&h, id).await;
        assert_eq!(ticket.state, TicketState::Superseded);
        assert!(h.coordinator.active_ticket().await.is_none());
        assert_eq!(h.sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn claim_settles_with_the_wallet_allocation() {
        let h = harness(ConfirmMode::Success);
        {
            let mut state = h.curve.state.lock().unwrap();
            state.is_claim_active = true;
        }
        {
            let mut participation = h.curve.participation.lock().unwrap();
            participation.contributed = Decimal::from(3);
        }

        let id = h
            .coordinator
            .submit_claim(ClaimRequest {
                wallet: WALLET.to_string(),
                token_address: TOKEN.to_string(),
                chain_id: CHAIN,
            })
            .await
            .unwrap();
        let ticket = wait_terminal(&h, id).await;

        assert!(matches!(ticket.state, TicketState::BackendSynced { .. }));
        let submissions = h.chain.submissions.lock().unwrap().clone();
        assert_eq!(submissions[0].0, "claim");

        // 3 contributed at min ticket 1 with 1000 tokens per ticket
        let recorded = h.sink.recorded.lock().unwrap().clone();
        assert_eq!(recorded[0].side, RecordSide::Claim);
        assert_eq!(recorded[0].amount, Decimal::from(3_000));
    }

    #[tokio::test]
    async fn claim_is_rejected_when_inactive_or_already_claimed() {
        let h = harness(ConfirmMode::Success);
        let request = ClaimRequest {
            wallet: WALLET.to_string(),
            token_address: TOKEN.to_string(),
            chain_id: CHAIN,
        };

        // claim phase not open
        assert!(h.coordinator.submit_claim(request.clone()).await.is_err());

        h.curve.state.lock().unwrap().is_claim_active = true;
        h.curve.participation.lock().unwrap().has_claimed = true;
        assert!(h.coordinator.submit_claim(request).await.is_err());

        assert!(h.chain.submissions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quotes_round_against_the_user() {
        let h = harness(ConfirmMode::Success);
        h.curve.state.lock().unwrap().price = "0.3".parse().unwrap();

        let tokens = h
            .coordinator
            .quote(TradeSide::Buy, TOKEN, Decimal::ONE)
            .await
            .unwrap();
        let back = h
            .coordinator
            .quote(TradeSide::Sell, TOKEN, tokens)
            .await
            .unwrap();
        assert!(back <= Decimal::ONE);

        let cost = h
            .coordinator
            .cost_for_tokens(TOKEN, tokens)
            .await
            .unwrap();
        assert!(cost >= back);
    }

    #[tokio::test]
    async fn clamp_contribution_mirrors_submit() {
        let h = harness(ConfirmMode::Success);
        h.curve.state.lock().unwrap().total_raised = "99.5".parse().unwrap();
        h.curve.participation.lock().unwrap().contributed = Decimal::ZERO;

        let clamped = h
            .coordinator
            .clamp_contribution(TOKEN, WALLET, Decimal::from(5))
            .await
            .unwrap();
        assert_eq!(clamped.value, "0.5".parse::<Decimal>().unwrap());
        assert_eq!(
            clamped.reason,
            Some(curvepad_math::ClampReason::CapExhausted)
        );
    }
}

//! Read-through cache over the external ledger's curve state
//!
//! Reads are served from cache when possible; a fixed-interval poll loop
//! keeps the cache warm and a forced refresh runs after every confirmed
//! settlement so callers never see pre-trade caps right after trading.
//! The cache is written only by the refresh routines here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use curvepad_types::{CurveState, EngineError, EngineResult, Snapshot, WalletParticipation};

use crate::ports::CurveLedger;

pub struct CurveOracle {
    ledger: Arc<dyn CurveLedger>,
    poll_interval: Duration,
    states: RwLock<HashMap<String, Snapshot<CurveState>>>,
    participation: RwLock<HashMap<(String, String), Snapshot<WalletParticipation>>>,
}

impl CurveOracle {
    pub fn new(ledger: Arc<dyn CurveLedger>, poll_interval: Duration) -> Self {
        Self {
            ledger,
            poll_interval,
            states: RwLock::new(HashMap::new()),
            participation: RwLock::new(HashMap::new()),
        }
    }

    /// Curve state for a token, served from cache when present
    pub async fn state(&self, token_address: &str) -> EngineResult<Snapshot<CurveState>> {
        if let Some(snapshot) = self.states.read().await.get(token_address) {
            return Ok(snapshot.clone());
        }
        self.refresh_state(token_address).await
    }

    /// Wallet participation for a sale, served from cache when present
    pub async fn participation(
        &self,
        token_address: &str,
        wallet: &str,
    ) -> EngineResult<Snapshot<WalletParticipation>> {
        let key = (token_address.to_string(), wallet.to_string());
        if let Some(snapshot) = self.participation.read().await.get(&key) {
            return Ok(snapshot.clone());
        }
        self.refresh_participation(token_address, wallet).await
    }

    /// Force a ledger read for a token's curve state.
    ///
    /// On failure the last cached value is served, marked stale; with no
    /// cache the call fails with `OracleUnavailable`.
    pub async fn refresh_state(&self, token_address: &str) -> EngineResult<Snapshot<CurveState>> {
        match self.ledger.curve_state(token_address).await {
            Ok(state) => {
                state.validate()?;
                let snapshot = Snapshot::fresh(state);
                self.states
                    .write()
                    .await
                    .insert(token_address.to_string(), snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                let mut states = self.states.write().await;
                match states.get_mut(token_address) {
                    Some(snapshot) => {
                        warn!(token = token_address, error = %e, "curve read failed, serving stale cache");
                        snapshot.stale = true;
                        Ok(snapshot.clone())
                    }
                    None => {
                        warn!(token = token_address, error = %e, "curve read failed with no cache");
                        Err(EngineError::oracle_unavailable(token_address))
                    }
                }
            }
        }
    }

    /// Force a ledger read for a wallet's participation
    pub async fn refresh_participation(
        &self,
        token_address: &str,
        wallet: &str,
    ) -> EngineResult<Snapshot<WalletParticipation>> {
        let key = (token_address.to_string(), wallet.to_string());
        match self.ledger.participation(token_address, wallet).await {
            Ok(participation) => {
                let snapshot = Snapshot::fresh(participation);
                self.participation
                    .write()
                    .await
                    .insert(key, snapshot.clone());
                Ok(snapshot)
            }
            Err(e) => {
                let mut cache = self.participation.write().await;
                match cache.get_mut(&key) {
                    Some(snapshot) => {
                        warn!(token = token_address, wallet, error = %e, "participation read failed, serving stale cache");
                        snapshot.stale = true;
                        Ok(snapshot.clone())
                    }
                    None => Err(EngineError::oracle_unavailable(token_address)),
                }
            }
        }
    }

    /// Drop a token's cached state so the next read refetches.
    ///
    /// Used by the feed bridge: push updates are advisory and only ever
    /// invalidate, they never write state themselves.
    pub async fn invalidate(&self, token_address: &str) {
        debug!(token = token_address, "invalidating cached curve state");
        self.states.write().await.remove(token_address);
    }

    /// Fixed-interval refresh loop over a set of tokens.
    ///
    /// Individual failures are logged and skipped; the loop keeps
    /// running.
    pub fn spawn_refresh(self: &Arc<Self>, tokens: Vec<String>) -> JoinHandle<()> {
        let oracle = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(oracle.poll_interval);
            // the first tick fires immediately
            loop {
                interval.tick().await;
                for token in &tokens {
                    if let Err(e) = oracle.refresh_state(token).await {
                        warn!(token, error = %e, "scheduled curve refresh failed");
                    }
                }
                debug!(tokens = tokens.len(), "curve refresh iteration complete");
            }
        })
    }
}

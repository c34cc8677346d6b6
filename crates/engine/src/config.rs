use std::fs;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use curvepad_feed::FeedConfig;
use curvepad_types::{EngineError, EngineResult};

/// Engine configuration loaded from TOML file.
///
/// The surrounding application owns these values; the engine only
/// consumes them.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Sale parameters mirrored from the deployment
    pub sale: SaleConfig,

    /// Chain binding for the sale/token
    pub chain: ChainConfig,

    /// Curve oracle refresh policy
    pub oracle: OracleConfig,

    /// Settlement pipeline limits
    pub settlement: SettlementConfig,

    /// Off-chain record API
    pub backend: BackendConfig,

    /// Push feed connection
    pub feed: FeedConfig,
}

/// Launchpad sale parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SaleConfig {
    /// Minimum single contribution in funding currency
    pub min_contribution: Decimal,

    /// Maximum total contribution per wallet
    pub max_contribution: Decimal,

    /// Global funding target of the sale
    pub target_cap: Decimal,

    /// Tokens claimable per minimum-contribution ticket
    pub claim_per_ticket: Decimal,
}

/// Chain the token/sale is bound to
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub required_chain_id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OracleConfig {
    /// Fixed poll interval for curve state refresh (seconds)
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
    /// Bounded wait for a transaction receipt (seconds)
    pub confirm_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the record API
    pub base_url: String,

    /// Per-request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::invalid_parameter("config_path", path, &format!("readable file: {e}"))
        })?;

        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            EngineError::invalid_parameter("config", path, &format!("valid TOML: {e}"))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        self.sale.validate()?;

        if self.oracle.poll_interval_secs == 0 {
            return Err(EngineError::invalid_parameter(
                "poll_interval_secs",
                "0",
                "greater than 0",
            ));
        }

        if self.settlement.confirm_timeout_secs == 0 {
            return Err(EngineError::invalid_parameter(
                "confirm_timeout_secs",
                "0",
                "greater than 0",
            ));
        }

        if self.backend.base_url.is_empty() {
            return Err(EngineError::invalid_parameter(
                "backend.base_url",
                "empty",
                "non-empty URL",
            ));
        }

        self.feed
            .validate()
            .map_err(|reason| EngineError::invalid_parameter("feed", "config", &reason))?;

        Ok(())
    }
}

impl SaleConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.target_cap <= Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "target_cap",
                &self.target_cap.to_string(),
                "greater than 0",
            ));
        }

        if self.min_contribution <= Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "min_contribution",
                &self.min_contribution.to_string(),
                "greater than 0",
            ));
        }

        if self.min_contribution > self.max_contribution {
            return Err(EngineError::invalid_parameter(
                "max_contribution",
                &self.max_contribution.to_string(),
                &format!(
                    "greater than or equal to min_contribution ({})",
                    self.min_contribution
                ),
            ));
        }

        if self.claim_per_ticket < Decimal::ZERO {
            return Err(EngineError::invalid_parameter(
                "claim_per_ticket",
                &self.claim_per_ticket.to_string(),
                "non-negative",
            ));
        }

        Ok(())
    }
}

impl OracleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl SettlementConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            min_contribution: Decimal::new(1, 1), // 0.1
            max_contribution: Decimal::from(2),
            target_cap: Decimal::from(100),
            claim_per_ticket: Decimal::from(1_000),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            required_chain_id: 97, // BSC testnet
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: 60,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

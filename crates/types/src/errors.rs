use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Main Error Enum
// ============================================================================

/// Error enum for the Curvepad settlement engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Request rejected before any I/O
    #[error("Invalid request field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Invalid parameter (configuration or call site)
    #[error("Invalid parameter '{parameter}': got '{value}', expected '{expected}'")]
    InvalidParameter { parameter: String, value: String, expected: String },

    /// Wallet is on the wrong chain and declined (or failed) the switch
    #[error("Wrong chain: required {required}, wallet on {actual}")]
    WrongChain { required: u64, actual: u64 },

    // ========================================================================
    // Math Errors
    // ========================================================================

    /// Division by zero
    #[error("Division by zero in context: {context}")]
    DivisionByZero { context: String },

    /// Arithmetic overflow occurred
    #[error("Math overflow in '{operation}'")]
    MathOverflow { operation: String },

    // ========================================================================
    // Oracle and Ledger Errors
    // ========================================================================

    /// No usable curve state: the ledger is down and nothing is cached
    #[error("Curve oracle unavailable for token {token}")]
    OracleUnavailable { token: String },

    /// Ledger transport error
    #[error("Ledger RPC error: {message}")]
    Rpc { message: String },

    /// Operation exceeded its deadline
    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ========================================================================
    // Backend Errors
    // ========================================================================

    /// Off-chain record endpoint rejected or failed the write
    #[error("Backend error (code {code:?}): {message}")]
    Backend { message: String, code: Option<i64> },
}

impl EngineError {
    /// Create a validation error
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: &str, value: &str, expected: &str) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }

    /// Create a wrong chain error
    pub fn wrong_chain(required: u64, actual: u64) -> Self {
        Self::WrongChain { required, actual }
    }

    /// Create a division by zero error
    pub fn division_by_zero(context: &str) -> Self {
        Self::DivisionByZero {
            context: context.to_string(),
        }
    }

    /// Create a math overflow error with context
    pub fn math_overflow(operation: &str) -> Self {
        Self::MathOverflow {
            operation: operation.to_string(),
        }
    }

    /// Create an oracle unavailable error
    pub fn oracle_unavailable(token: &str) -> Self {
        Self::OracleUnavailable {
            token: token.to_string(),
        }
    }

    /// Create an RPC error
    pub fn rpc_error(message: &str) -> Self {
        Self::Rpc {
            message: message.to_string(),
        }
    }

    /// Create a backend error
    pub fn backend_error(message: &str, code: Option<i64>) -> Self {
        Self::Backend {
            message: message.to_string(),
            code,
        }
    }
}

// ============================================================================
// Chain Failure Causes
// ============================================================================

/// Causal detail preserved inside a `ChainFailed` settlement ticket.
///
/// A confirmation timeout is deliberately distinct from an explicit
/// rejection so callers can tell "the chain said no" apart from "we
/// stopped waiting".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainFailure {
    /// The transaction was mined and reverted
    Reverted { reason: String },
    /// The write was rejected before inclusion (user or node)
    Rejected { reason: String },
    /// Transport-level failure while submitting or confirming
    Network { message: String },
    /// Receipt did not arrive within the bounded confirmation window
    ConfirmationTimeout { timeout_ms: u64 },
}

impl ChainFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChainFailure::ConfirmationTimeout { .. })
    }
}

impl std::fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainFailure::Reverted { reason } => write!(f, "reverted: {reason}"),
            ChainFailure::Rejected { reason } => write!(f, "rejected: {reason}"),
            ChainFailure::Network { message } => write!(f, "network: {message}"),
            ChainFailure::ConfirmationTimeout { timeout_ms } => {
                write!(f, "confirmation timeout after {timeout_ms}ms")
            }
        }
    }
}

/// Curvepad settlement engine
///
/// The core that takes a user's trade or claim from request to durable
/// record:
/// - `CurveOracle`: cached view of the external ledger's curve state
/// - `TransactionCoordinator`: the submit → confirm → reconcile state
///   machine, with supersession of stale in-flight attempts
/// - `HttpRecorder`: idempotent off-chain record writes
/// - configuration and the ports the surrounding application implements

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod feed_bridge;
pub mod oracle;
pub mod ports;
pub mod recorder;

pub use cancel::*;
pub use config::*;
pub use coordinator::*;
pub use feed_bridge::*;
pub use oracle::*;
pub use ports::*;
pub use recorder::*;

// Re-export the shared types and math the engine's API surfaces
pub use curvepad_math::{
    amount_to_tokens, claim_allocation, clamp, cost_to_reach_target, tokens_to_amount,
};
pub use curvepad_math::{ClampReason, Clamped};
pub use curvepad_types::*;

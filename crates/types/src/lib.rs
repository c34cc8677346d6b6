/// Shared types for the Curvepad settlement engine
///
/// This crate provides the common data model, error taxonomy, and wire
/// formats that are used across the math, engine, and feed components.

pub mod curve;
pub mod errors;
pub mod feed;
pub mod trade;

// Re-export all public types
pub use curve::*;
pub use errors::*;
pub use feed::*;
pub use trade::*;

/// Result type alias using the shared error type
pub type EngineResult<T> = std::result::Result<T, EngineError>;

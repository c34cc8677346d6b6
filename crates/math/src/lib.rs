/// Mathematical core of the Curvepad settlement engine
///
/// This crate provides the pure, I/O-free pieces of the engine: bonding
/// curve conversions between funding and token amounts, and the
/// allocation clamp applied to every contribution before submission.
/// All monetary math runs on decimals, never binary floating point.

pub mod allocation;
pub mod curve;

// Re-export commonly used functions
pub use allocation::*;
pub use curve::*;

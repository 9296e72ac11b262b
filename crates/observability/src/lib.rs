//! Process-wide tracing setup shared by every binary and test harness.

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::{LogFormat, init, init_with};

//! Storage hydration contract.
//!
//! Aggregates are rebuilt from a fixed, ordered tuple of columns. The order is
//! a wire contract with storage adapters, which fill rows through
//! [`RowBuilder`] and hand them back through a [`Scanner`].

mod discriminated;
mod scanner;

pub use discriminated::DiscriminatedMapper;
pub use scanner::{RowBuilder, RowScanner, ScanError, Scanner};

//! `dockyard-core`: domain foundation building blocks.
//!
//! Pure primitives shared by every aggregate: the event emitter kernel, the
//! sentinel error codes, identifiers and the storage hydration contract.

pub mod action;
pub mod aggregate;
pub mod error;
pub mod id;
pub mod storage;
pub mod value_object;

pub use action::Action;
pub use aggregate::{AggregateRoot, Emitter, EventSourced, ExpectedVersion, VersionMismatch};
pub use error::{DomainError, DomainResult};
pub use id::UserId;
pub use storage::{DiscriminatedMapper, RowBuilder, RowScanner, ScanError, Scanner};
pub use value_object::ValueObject;

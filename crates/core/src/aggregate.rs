//! Aggregate root contract and the event emitter kernel.
//!
//! Aggregates never expose their pending event log directly. Every state change
//! goes through [`store`], which applies the event and buffers it; storage
//! adapters then [`drain`] the buffer when persisting and [`hydrate`] the
//! optimistic concurrency counter when loading.

use thiserror::Error;

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Storage version the aggregate was hydrated at.
    ///
    /// This is the optimistic concurrency counter, incremented by the storage
    /// layer once per persisted event batch. It has nothing to do with any
    /// business-level versioning an aggregate may carry.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for an aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking.
    Any,
    /// Require the stored aggregate to be at an exact version.
    Exact(u64),
}

/// Raised when a writer presents a stale version.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("optimistic concurrency check failed (expected: {expected:?}, actual: {actual})")]
pub struct VersionMismatch {
    pub expected: ExpectedVersion,
    pub actual: u64,
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> Result<(), VersionMismatch> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(VersionMismatch {
                expected: self,
                actual,
            })
        }
    }
}

/// Private, append-only buffer of events raised by an aggregate.
///
/// Embedded by value in every aggregate. Only the free functions of this module
/// can touch its content.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitter<E> {
    pending: Vec<E>,
    version: u64,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            version: 0,
        }
    }
}

impl<E> Emitter<E> {
    /// Storage version, see [`AggregateRoot::version`].
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// An aggregate whose state evolves only by applying its own events.
pub trait EventSourced: AggregateRoot {
    type Event: Clone + core::fmt::Debug;

    fn emitter(&self) -> &Emitter<Self::Event>;

    fn emitter_mut(&mut self) -> &mut Emitter<Self::Event>;

    /// Evolve in-memory state from a single event. Must stay deterministic.
    fn apply(&mut self, event: &Self::Event);
}

/// Apply `event` to the aggregate and append it to its pending log.
pub fn store<A: EventSourced>(aggregate: &mut A, event: A::Event) {
    aggregate.apply(&event);
    aggregate.emitter_mut().pending.push(event);
}

/// Pending events, oldest first, without consuming them.
pub fn unwrap<A: EventSourced>(aggregate: &A) -> &[A::Event] {
    &aggregate.emitter().pending
}

/// Take every pending event out of the aggregate, leaving the log empty.
pub fn drain<A: EventSourced>(aggregate: &mut A) -> Vec<A::Event> {
    std::mem::take(&mut aggregate.emitter_mut().pending)
}

/// Restore the storage version of a freshly loaded (or just persisted) aggregate.
pub fn hydrate<A: EventSourced>(aggregate: &mut A, version: u64) {
    aggregate.emitter_mut().version = version;
}

//! In-memory adapters for the deployment readers and writers.
//!
//! Aggregates are kept as hydration rows, the same columns a relational adapter
//! would persist, and rebuilt through their scanner on every read. Writes check
//! the storage version the aggregate was loaded at, bump it once per batch and
//! publish the batch on the event bus once the row is stored.

mod apps;
mod deployments;
mod registries;
mod targets;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use dockyard_core::aggregate::{drain, hydrate};
use dockyard_core::{AggregateRoot, EventSourced, ExpectedVersion, RowScanner, ScanError, Scanner};
use dockyard_deployment::{
    App, AppEvent, Deployment, DeploymentEvent, DomainEvent, Registry, RegistryEvent, StoreError,
    StoreResult, Target, TargetEvent,
};
use dockyard_events::{EventBus, EventEnvelope, InMemoryEventBus};

pub type DomainEventBus = InMemoryEventBus<EventEnvelope<DomainEvent>>;

/// Aggregate persisted as a single row.
pub(crate) trait Record: EventSourced + Sized {
    const TYPE: &'static str;

    fn stream_id(&self) -> String;

    fn encode(&self) -> Result<Vec<Value>, ScanError>;

    fn decode(columns: Vec<Value>) -> Result<Self, ScanError>;

    fn published(event: Self::Event) -> DomainEvent;

    /// Whether persisting this event removes the row.
    fn is_removal(_event: &Self::Event) -> bool {
        false
    }
}

fn decode_with<T>(
    columns: Vec<Value>,
    from_scanner: impl FnOnce(&mut RowScanner) -> Result<T, ScanError>,
) -> Result<T, ScanError> {
    let mut scanner = RowScanner::new(columns);
    let value = from_scanner(&mut scanner)?;
    scanner.finish()?;
    Ok(value)
}

impl Record for App {
    const TYPE: &'static str = "app";

    fn stream_id(&self) -> String {
        self.id().to_string()
    }

    fn published(event: AppEvent) -> DomainEvent {
        event.into()
    }

    fn encode(&self) -> Result<Vec<Value>, ScanError> {
        self.to_row()
    }

    fn decode(columns: Vec<Value>) -> Result<Self, ScanError> {
        decode_with(columns, App::from_scanner)
    }

    fn is_removal(event: &AppEvent) -> bool {
        matches!(event, AppEvent::AppDeleted(_))
    }
}

impl Record for Target {
    const TYPE: &'static str = "target";

    fn stream_id(&self) -> String {
        self.id().to_string()
    }

    fn published(event: TargetEvent) -> DomainEvent {
        event.into()
    }

    fn encode(&self) -> Result<Vec<Value>, ScanError> {
        self.to_row()
    }

    fn decode(columns: Vec<Value>) -> Result<Self, ScanError> {
        decode_with(columns, Target::from_scanner)
    }

    fn is_removal(event: &TargetEvent) -> bool {
        matches!(event, TargetEvent::TargetDeleted(_))
    }
}

impl Record for Deployment {
    const TYPE: &'static str = "deployment";

    fn stream_id(&self) -> String {
        self.id().to_string()
    }

    fn published(event: DeploymentEvent) -> DomainEvent {
        event.into()
    }

    fn encode(&self) -> Result<Vec<Value>, ScanError> {
        self.to_row()
    }

    fn decode(columns: Vec<Value>) -> Result<Self, ScanError> {
        decode_with(columns, Deployment::from_scanner)
    }
}

impl Record for Registry {
    const TYPE: &'static str = "registry";

    fn stream_id(&self) -> String {
        self.id().to_string()
    }

    fn published(event: RegistryEvent) -> DomainEvent {
        event.into()
    }

    fn encode(&self) -> Result<Vec<Value>, ScanError> {
        self.to_row()
    }

    fn decode(columns: Vec<Value>) -> Result<Self, ScanError> {
        decode_with(columns, Registry::from_scanner)
    }

    fn is_removal(event: &RegistryEvent) -> bool {
        matches!(event, RegistryEvent::RegistryDeleted(_))
    }
}

#[derive(Debug, Clone)]
struct Row {
    version: u64,
    columns: Vec<Value>,
}

/// Rows of one aggregate type, keyed by aggregate id.
#[derive(Debug)]
pub(crate) struct Table<R: Record> {
    rows: RwLock<HashMap<R::Id, Row>>,
}

impl<R: Record> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: Record> Table<R> {
    pub(crate) fn get(&self, id: &R::Id) -> StoreResult<R> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;
        let row = rows.get(id).ok_or(StoreError::NotFound)?;

        Ok(R::decode(row.columns.clone())?)
    }

    /// Every stored aggregate, in no particular order.
    pub(crate) fn all(&self) -> StoreResult<Vec<R>> {
        let rows = self.rows.read().map_err(|_| StoreError::Poisoned)?;

        rows.values()
            .map(|row| R::decode(row.columns.clone()).map_err(StoreError::from))
            .collect()
    }

    /// Remove every row matching `predicate` without raising any event.
    pub(crate) fn purge(&self, predicate: impl Fn(&R::Id) -> bool) -> StoreResult<usize> {
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;
        let before = rows.len();
        rows.retain(|id, _| !predicate(id));
        Ok(before - rows.len())
    }

    /// Persist pending events of `aggregate` and return them wrapped in envelopes.
    fn commit(&self, aggregate: &mut R) -> StoreResult<Vec<EventEnvelope<DomainEvent>>> {
        if !aggregate.emitter().has_pending() {
            return Ok(Vec::new());
        }

        let id = aggregate.id().clone();
        let stream_id = aggregate.stream_id();
        let mut rows = self.rows.write().map_err(|_| StoreError::Poisoned)?;

        let current = rows.get(&id).map_or(0, |row| row.version);
        ExpectedVersion::Exact(aggregate.version()).check(current)?;

        let version = current + 1;
        let removed = dockyard_core::aggregate::unwrap(aggregate)
            .iter()
            .any(R::is_removal);

        hydrate(aggregate, version);

        if removed {
            rows.remove(&id);
        } else {
            match aggregate.encode() {
                Ok(columns) => {
                    rows.insert(id.clone(), Row { version, columns });
                }
                Err(err) => {
                    hydrate(aggregate, current);
                    return Err(err.into());
                }
            }
        }

        Ok(drain(aggregate)
            .into_iter()
            .map(|event| EventEnvelope::new(stream_id.clone(), R::TYPE, version, R::published(event)))
            .collect())
    }
}

/// Every table, plus the bus events are published on once committed.
#[derive(Debug)]
pub struct InMemoryStore {
    apps: Table<App>,
    targets: Table<Target>,
    deployments: Table<Deployment>,
    registries: Table<Registry>,
    bus: Arc<DomainEventBus>,
}

impl InMemoryStore {
    pub fn new(bus: Arc<DomainEventBus>) -> Self {
        Self {
            apps: Table::default(),
            targets: Table::default(),
            deployments: Table::default(),
            registries: Table::default(),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<DomainEventBus> {
        &self.bus
    }

    fn commit<R: Record>(&self, table: &Table<R>, aggregate: &mut R) -> StoreResult<()> {
        let envelopes = table.commit(aggregate)?;

        if let Some(first) = envelopes.first() {
            tracing::debug!(
                aggregate_type = R::TYPE,
                aggregate_id = first.aggregate_id(),
                version = first.sequence_number(),
                events = envelopes.len(),
                "aggregate persisted"
            );
        }

        // Rows are already stored: a publication failure must not fail the write.
        for envelope in envelopes {
            if let Err(err) = self.bus.publish(envelope) {
                tracing::warn!(error = ?err, "could not publish domain event");
            }
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use dockyard_events::Event;

use crate::app::AppEvent;
use crate::deployment::DeploymentEvent;
use crate::registry::RegistryEvent;
use crate::target::TargetEvent;

/// Every event raised by the deployment aggregates, as published on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    App(AppEvent),
    Target(TargetEvent),
    Deployment(DeploymentEvent),
    Registry(RegistryEvent),
}

impl Event for DomainEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::App(e) => e.event_type(),
            DomainEvent::Target(e) => e.event_type(),
            DomainEvent::Deployment(e) => e.event_type(),
            DomainEvent::Registry(e) => e.event_type(),
        }
    }
}

impl From<AppEvent> for DomainEvent {
    fn from(event: AppEvent) -> Self {
        DomainEvent::App(event)
    }
}

impl From<TargetEvent> for DomainEvent {
    fn from(event: TargetEvent) -> Self {
        DomainEvent::Target(event)
    }
}

impl From<DeploymentEvent> for DomainEvent {
    fn from(event: DeploymentEvent) -> Self {
        DomainEvent::Deployment(event)
    }
}

impl From<RegistryEvent> for DomainEvent {
    fn from(event: RegistryEvent) -> Self {
        DomainEvent::Registry(event)
    }
}

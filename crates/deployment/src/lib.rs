//! `dockyard-deployment`: the deployment domain model.
//!
//! Event-sourced aggregates ([`App`], [`Target`], [`Deployment`], [`Registry`]),
//! the value objects they are made of, the requirement objects produced by the
//! read side, and the capability traits the application layer implements.

pub mod app;
pub mod app_name;
pub mod config;
pub mod credentials;
pub mod deployment;
pub mod entrypoints;
pub mod environment;
pub mod event;
pub mod ids;
pub mod ports;
pub mod provider;
pub mod registry;
pub mod requirement;
pub mod service;
pub mod source;
pub mod state;
pub mod target;
pub mod url;
pub mod version_control;

#[cfg(test)]
pub(crate) mod fixture;

pub use app::{App, AppEvent, AppTargetHistory};
pub use app_name::AppName;
pub use config::DeploymentConfig;
pub use credentials::Credentials;
pub use deployment::{Deployment, DeploymentEvent};
pub use entrypoints::{EntrypointKey, TargetEntrypoints, TargetEntrypointsAssigned};
pub use environment::{EnvVars, Environment, EnvironmentConfig, ServicesEnv};
pub use event::DomainEvent;
pub use ids::{AppId, DeploymentId, DeploymentNumber, RegistryId, TargetId};
pub use ports::{
    AppsReader, AppsWriter, DeploymentsReader, DeploymentsWriter, FailCriteria, JobPolicy,
    RegistriesReader, RegistriesWriter, Scheduler, StoreError, StoreResult, TargetsReader,
    TargetsWriter,
};
pub use provider::{DockerConfig, Provider, ProviderConfig};
pub use registry::{Registry, RegistryEvent};
pub use requirement::{
    EnvironmentConfigRequirement, ProviderConfigRequirement, RegistryUrlRequirement,
    TargetUrlRequirement,
};
pub use service::{
    Entrypoint, EntrypointName, HttpEntrypointOptions, Port, Router, Service, Services,
};
pub use source::SourceData;
pub use state::{DeploymentState, DeploymentStatus, TargetState, TargetStatus};
pub use target::{CleanupStrategy, Target, TargetEvent};
pub use self::url::Url;
pub use version_control::VersionControl;

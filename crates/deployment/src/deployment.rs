use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::aggregate::{self, hydrate};
use dockyard_core::{
    Action, AggregateRoot, DomainError, DomainResult, Emitter, EventSourced, RowBuilder,
    ScanError, Scanner, UserId,
};
use dockyard_events::Event;

use crate::app::App;
use crate::app_name::AppName;
use crate::config::DeploymentConfig;
use crate::environment::{Environment, ServicesEnv};
use crate::ids::{AppId, DeploymentId, DeploymentNumber, TargetId};
use crate::service::Services;
use crate::source::SourceData;
use crate::state::{DeploymentState, DeploymentStatus};

/// A single run of an app environment on its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    emitter: Emitter<DeploymentEvent>,
    id: DeploymentId,
    config: DeploymentConfig,
    state: DeploymentState,
    source: SourceData,
    requested: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCreated {
    pub id: DeploymentId,
    pub config: DeploymentConfig,
    pub state: DeploymentState,
    pub source: SourceData,
    pub requested: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStateChanged {
    pub id: DeploymentId,
    pub config: DeploymentConfig,
    pub state: DeploymentState,
}

impl DeploymentStateChanged {
    pub fn has_succeeded(&self) -> bool {
        self.state.status() == DeploymentStatus::Succeeded
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentEvent {
    DeploymentCreated(DeploymentCreated),
    DeploymentStateChanged(DeploymentStateChanged),
}

impl Event for DeploymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DeploymentEvent::DeploymentCreated(_) => "deployment.deployment.created",
            DeploymentEvent::DeploymentStateChanged(_) => "deployment.deployment.state_changed",
        }
    }
}

impl App {
    /// Create a new deployment of this app for an environment.
    pub fn new_deployment(
        &self,
        number: DeploymentNumber,
        source: SourceData,
        environment: Environment,
        requested_by: UserId,
    ) -> DomainResult<Deployment> {
        self.ensure_not_cleaning_up()?;

        if source.needs_version_control() && self.version_control().is_none() {
            return Err(DomainError::VcsNotConfigured);
        }

        let mut deployment = Deployment::empty();
        aggregate::store(
            &mut deployment,
            DeploymentEvent::DeploymentCreated(DeploymentCreated {
                id: DeploymentId::new(self.id().clone(), number),
                config: self.config_snapshot_for(environment),
                state: DeploymentState::default(),
                source,
                requested: Action::new(requested_by),
            }),
        );

        Ok(deployment)
    }

    /// Deploy the same source again, on the same environment.
    pub fn redeploy(
        &self,
        source: &Deployment,
        number: DeploymentNumber,
        requested_by: UserId,
    ) -> DomainResult<Deployment> {
        self.ensure_source_deployment(source)?;

        self.new_deployment(
            number,
            source.source.clone(),
            source.config.environment(),
            requested_by,
        )
    }

    /// Deploy the source of a staging deployment on production.
    pub fn promote(
        &self,
        source: &Deployment,
        number: DeploymentNumber,
        requested_by: UserId,
    ) -> DomainResult<Deployment> {
        self.ensure_source_deployment(source)?;

        if source.config.environment().is_production() {
            return Err(DomainError::CouldNotPromoteProductionDeployment);
        }

        self.new_deployment(
            number,
            source.source.clone(),
            Environment::Production,
            requested_by,
        )
    }

    fn ensure_source_deployment(&self, source: &Deployment) -> DomainResult<()> {
        if source.id.app_id() != self.id() {
            return Err(DomainError::InvalidSourceDeployment);
        }

        Ok(())
    }
}

impl Deployment {
    fn empty() -> Self {
        Self {
            emitter: Emitter::default(),
            id: DeploymentId::default(),
            config: DeploymentConfig::default(),
            state: DeploymentState::default(),
            source: SourceData::default(),
            requested: Action::default(),
        }
    }

    /// Rebuild a persisted deployment.
    pub fn from_scanner<S: Scanner>(scanner: &mut S) -> Result<Self, ScanError> {
        let app_id: AppId = scanner.scan("app_id")?;
        let number: DeploymentNumber = scanner.scan("deployment_number")?;
        let app_name: AppName = scanner.scan("config_appname")?;
        let environment: Environment = scanner.scan("config_environment")?;
        let target: TargetId = scanner.scan("config_target")?;
        let vars: Option<ServicesEnv> = scanner.scan("config_vars")?;
        let status: DeploymentStatus = scanner.scan("state_status")?;
        let errcode: Option<String> = scanner.scan("state_errcode")?;
        let services: Option<Services> = scanner.scan("state_services")?;
        let started_at: Option<DateTime<Utc>> = scanner.scan("state_started_at")?;
        let finished_at: Option<DateTime<Utc>> = scanner.scan("state_finished_at")?;
        let discriminator: String = scanner.scan("source_discriminator")?;
        let source_data: Value = scanner.scan("source_data")?;
        let requested_at: DateTime<Utc> = scanner.scan("requested_at")?;
        let requested_by: UserId = scanner.scan("requested_by")?;
        let version: u64 = scanner.scan("version")?;
        scanner.finish()?;

        let mut deployment = Self {
            emitter: Emitter::default(),
            id: DeploymentId::new(app_id.clone(), number),
            config: DeploymentConfig::new(app_id, app_name, environment, target, vars),
            state: DeploymentState::from_parts(status, errcode, services, started_at, finished_at),
            source: SourceData::from_parts(&discriminator, source_data)?,
            requested: Action::from_parts(requested_by, requested_at),
        };
        hydrate(&mut deployment, version);

        Ok(deployment)
    }

    /// Columns in the order read by [`Deployment::from_scanner`].
    pub fn to_row(&self) -> Result<Vec<Value>, ScanError> {
        let source_data = self
            .source
            .payload()
            .map_err(|source| ScanError::Encode { index: 12, source })?;

        Ok(RowBuilder::new()
            .push(self.id.app_id())?
            .push(&self.id.deployment_number())?
            .push(self.config.app_name())?
            .push(&self.config.environment())?
            .push(self.config.target())?
            .push(&self.config.vars())?
            .push(&self.state.status())?
            .push(&self.state.errcode())?
            .push(&self.state.services())?
            .push(&self.state.started_at())?
            .push(&self.state.finished_at())?
            .push(self.source.discriminator())?
            .push(&source_data)?
            .push(&self.requested.at())?
            .push(self.requested.by())?
            .push(&self.version())?
            .build())
    }

    pub fn has_started(&mut self) -> DomainResult<()> {
        let mut state = self.state.clone();
        state.started()?;

        self.state_changed(state);

        Ok(())
    }

    /// Mark the deployment as ended. Without services nor error, it succeeded
    /// with nothing to expose.
    pub fn has_ended(&mut self, services: Option<Services>, err: Option<String>) -> DomainResult<()> {
        let mut state = self.state.clone();

        match err {
            Some(code) => state.failed(code)?,
            None => state.succeeded(services.unwrap_or_default())?,
        }

        self.state_changed(state);

        Ok(())
    }

    /// Fail a deployment which will never run to completion, started or not.
    pub fn fail(&mut self, code: impl Into<String>) -> DomainResult<()> {
        if self.state.status() == DeploymentStatus::Pending {
            self.has_started()?;
        }

        self.has_ended(None, Some(code.into()))
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    pub fn source(&self) -> &SourceData {
        &self.source
    }

    pub fn requested(&self) -> &Action<UserId> {
        &self.requested
    }

    fn state_changed(&mut self, state: DeploymentState) {
        aggregate::store(
            self,
            DeploymentEvent::DeploymentStateChanged(DeploymentStateChanged {
                id: self.id.clone(),
                config: self.config.clone(),
                state,
            }),
        );
    }
}

impl AggregateRoot for Deployment {
    type Id = DeploymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.emitter.version()
    }
}

impl EventSourced for Deployment {
    type Event = DeploymentEvent;

    fn emitter(&self) -> &Emitter<DeploymentEvent> {
        &self.emitter
    }

    fn emitter_mut(&mut self) -> &mut Emitter<DeploymentEvent> {
        &mut self.emitter
    }

    fn apply(&mut self, event: &DeploymentEvent) {
        match event {
            DeploymentEvent::DeploymentCreated(e) => {
                self.id = e.id.clone();
                self.config = e.config.clone();
                self.state = e.state.clone();
                self.source = e.source.clone();
                self.requested = e.requested.clone();
            }
            DeploymentEvent::DeploymentStateChanged(e) => self.state = e.state.clone(),
        }
    }
}

//! Capabilities the application layer provides to the domain: storage per
//! aggregate and the job scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dockyard_core::{ScanError, VersionMismatch};
use dockyard_events::Request;

use crate::app::App;
use crate::app_name::AppName;
use crate::deployment::Deployment;
use crate::environment::{Environment, EnvironmentConfig};
use crate::ids::{AppId, DeploymentId, DeploymentNumber, RegistryId, TargetId};
use crate::provider::ProviderConfig;
use crate::registry::Registry;
use crate::requirement::{
    EnvironmentConfigRequirement, ProviderConfigRequirement, RegistryUrlRequirement,
    TargetUrlRequirement,
};
use crate::state::DeploymentStatus;
use crate::target::Target;
use crate::url::Url;

/// Storage failure. Never a domain error, except `NotFound` which callers map.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Conflict(#[from] VersionMismatch),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("store lock poisoned")]
    Poisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait AppsReader: Send + Sync {
    /// Check that no other app with this name uses the same targets.
    async fn check_app_naming_availability(
        &self,
        name: &AppName,
        production: EnvironmentConfig,
        staging: EnvironmentConfig,
    ) -> StoreResult<(EnvironmentConfigRequirement, EnvironmentConfigRequirement)>;

    /// Same as [`check_app_naming_availability`](Self::check_app_naming_availability)
    /// for an existing app, where each environment config is optional.
    async fn check_app_naming_availability_by_id(
        &self,
        id: &AppId,
        production: Option<EnvironmentConfig>,
        staging: Option<EnvironmentConfig>,
    ) -> StoreResult<(
        Option<EnvironmentConfigRequirement>,
        Option<EnvironmentConfigRequirement>,
    )>;

    async fn has_apps_on_target(&self, target: &TargetId) -> StoreResult<bool>;

    async fn get_by_id(&self, id: &AppId) -> StoreResult<App>;
}

#[async_trait::async_trait]
pub trait AppsWriter: Send + Sync {
    /// Persist pending events. Fails with a conflict if the app was written since
    /// it was loaded.
    async fn write(&self, app: &mut App) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait TargetsReader: Send + Sync {
    async fn check_url_availability(
        &self,
        url: &Url,
        excluding: Option<&TargetId>,
    ) -> StoreResult<TargetUrlRequirement>;

    async fn check_config_availability(
        &self,
        config: &ProviderConfig,
        excluding: Option<&TargetId>,
    ) -> StoreResult<ProviderConfigRequirement>;

    async fn get_by_id(&self, id: &TargetId) -> StoreResult<Target>;
}

#[async_trait::async_trait]
pub trait TargetsWriter: Send + Sync {
    async fn write(&self, target: &mut Target) -> StoreResult<()>;
}

#[async_trait::async_trait]
pub trait DeploymentsReader: Send + Sync {
    async fn get_by_id(&self, id: &DeploymentId) -> StoreResult<Deployment>;

    async fn get_next_deployment_number(&self, app: &AppId) -> StoreResult<DeploymentNumber>;

    async fn get_running_or_pending_deployments_count(&self, app: &AppId) -> StoreResult<u32>;

    async fn has_running_or_pending_deployments_on_target(
        &self,
        target: &TargetId,
    ) -> StoreResult<bool>;

    /// Whether deployments of an app environment requested on a target between
    /// `from` and `to` are still ongoing, and whether one of them succeeded.
    async fn has_deployments_on_app_target_env(
        &self,
        app: &AppId,
        target: &TargetId,
        environment: Environment,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<(bool, bool)>;
}

/// Which deployments to fail. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailCriteria {
    pub status: Option<DeploymentStatus>,
    pub app: Option<AppId>,
    pub target: Option<TargetId>,
    pub environment: Option<Environment>,
}

impl FailCriteria {
    pub fn matches(&self, deployment: &Deployment) -> bool {
        let config = deployment.config();

        self.status
            .is_none_or(|status| deployment.state().status() == status)
            && self.app.as_ref().is_none_or(|app| config.app_id() == app)
            && self.target.as_ref().is_none_or(|target| config.target() == target)
            && self
                .environment
                .is_none_or(|environment| config.environment() == environment)
    }
}

#[async_trait::async_trait]
pub trait DeploymentsWriter: Send + Sync {
    async fn write(&self, deployment: &mut Deployment) -> StoreResult<()>;

    /// Fail every matching deployment with `reason` as error code. Returns how many were.
    async fn fail_deployments(&self, reason: &str, criteria: &FailCriteria) -> StoreResult<usize>;
}

#[async_trait::async_trait]
pub trait RegistriesReader: Send + Sync {
    async fn check_url_availability(
        &self,
        url: &Url,
        excluding: Option<&RegistryId>,
    ) -> StoreResult<RegistryUrlRequirement>;

    async fn get_by_id(&self, id: &RegistryId) -> StoreResult<Registry>;

    async fn get_all(&self) -> StoreResult<Vec<Registry>>;
}

#[async_trait::async_trait]
pub trait RegistriesWriter: Send + Sync {
    async fn write(&self, registry: &mut Registry) -> StoreResult<()>;
}

/// How a queued job relates to the other jobs of the same resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPolicy {
    #[default]
    Default,
    /// Wait for every job queued before on the same resource to complete.
    WaitForOthersResourceId,
    /// Replace the payload of a pending job with the same name and resource.
    Merge,
}

/// Background job queue.
#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    async fn queue(&self, request: Request, policy: JobPolicy) -> anyhow::Result<()>;
}

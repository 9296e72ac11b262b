use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use dockyard_core::{DomainError, DomainResult, ValueObject};

use crate::service::Services;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    #[default]
    Configuring,
    Failed,
    Ready,
}

/// Reconciliation state of a target.
///
/// `version` is the epoch of the configuration being applied. Reports made for
/// any other epoch are outdated and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    status: TargetStatus,
    version: DateTime<Utc>,
    errcode: Option<String>,
    last_ready_version: Option<DateTime<Utc>>,
}

impl Default for TargetState {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetState {
    pub fn new() -> Self {
        Self {
            status: TargetStatus::Configuring,
            version: Utc::now(),
            errcode: None,
            last_ready_version: None,
        }
    }

    pub(crate) fn from_parts(
        status: TargetStatus,
        version: DateTime<Utc>,
        errcode: Option<String>,
        last_ready_version: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status,
            version,
            errcode,
            last_ready_version,
        }
    }

    /// Back to configuring with a new epoch, always later than the previous one.
    pub fn reconfigure(&mut self) {
        let now = Utc::now();

        self.status = TargetStatus::Configuring;
        self.version = if now > self.version {
            now
        } else {
            self.version + Duration::nanoseconds(1)
        };
        self.errcode = None;
    }

    /// Record the outcome of the configuration made for `version`. Returns false,
    /// leaving the state untouched, if that outcome is outdated.
    pub fn configured(&mut self, version: DateTime<Utc>, err: Option<String>) -> bool {
        if self.is_outdated(version) {
            return false;
        }

        match err {
            Some(code) => {
                self.status = TargetStatus::Failed;
                self.errcode = Some(code);
            }
            None => {
                self.status = TargetStatus::Ready;
                self.last_ready_version = Some(version);
                self.errcode = None;
            }
        }

        true
    }

    /// True if `version` is not the epoch being configured right now.
    pub fn is_outdated(&self, version: DateTime<Utc>) -> bool {
        version != self.version || self.status != TargetStatus::Configuring
    }

    pub fn status(&self) -> TargetStatus {
        self.status
    }

    pub fn version(&self) -> DateTime<Utc> {
        self.version
    }

    pub fn errcode(&self) -> Option<&str> {
        self.errcode.as_deref()
    }

    pub fn last_ready_version(&self) -> Option<DateTime<Utc>> {
        self.last_ready_version
    }
}

impl ValueObject for TargetState {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Running,
    Failed,
    Succeeded,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentStatus::Failed | DeploymentStatus::Succeeded)
    }
}

/// Forward only state of a deployment. The default value is pending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    status: DeploymentStatus,
    errcode: Option<String>,
    services: Option<Services>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl DeploymentState {
    pub(crate) fn from_parts(
        status: DeploymentStatus,
        errcode: Option<String>,
        services: Option<Services>,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status,
            errcode,
            services,
            started_at,
            finished_at,
        }
    }

    pub fn started(&mut self) -> DomainResult<()> {
        if self.status != DeploymentStatus::Pending {
            return Err(DomainError::NotInPendingState);
        }

        self.status = DeploymentStatus::Running;
        self.started_at = Some(Utc::now());

        Ok(())
    }

    pub fn failed(&mut self, errcode: String) -> DomainResult<()> {
        if self.status != DeploymentStatus::Running {
            return Err(DomainError::NotInRunningState);
        }

        self.status = DeploymentStatus::Failed;
        self.errcode = Some(errcode);
        self.finished_at = Some(Utc::now());

        Ok(())
    }

    pub fn succeeded(&mut self, services: Services) -> DomainResult<()> {
        if self.status != DeploymentStatus::Running {
            return Err(DomainError::NotInRunningState);
        }

        self.status = DeploymentStatus::Succeeded;
        self.services = Some(services);
        self.finished_at = Some(Utc::now());

        Ok(())
    }

    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    pub fn errcode(&self) -> Option<&str> {
        self.errcode.as_deref()
    }

    pub fn services(&self) -> Option<&Services> {
        self.services.as_ref()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }
}

impl ValueObject for DeploymentState {}

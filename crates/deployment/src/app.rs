use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::aggregate::{self, hydrate};
use dockyard_core::{
    Action, AggregateRoot, DomainError, DomainResult, Emitter, EventSourced, RowBuilder,
    ScanError, Scanner, UserId,
};
use dockyard_events::Event;

use crate::app_name::AppName;
use crate::config::DeploymentConfig;
use crate::environment::{Environment, EnvironmentConfig, ServicesEnv};
use crate::ids::{AppId, TargetId};
use crate::requirement::EnvironmentConfigRequirement;
use crate::url::Url;
use crate::version_control::VersionControl;

/// Every target an app environment has pointed to, oldest first.
///
/// Entries are removed once the app resources have been cleaned up from the
/// target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppTargetHistory(BTreeMap<Environment, Vec<TargetId>>);

impl AppTargetHistory {
    fn push(&mut self, environment: Environment, target: TargetId) {
        self.0.entry(environment).or_default().push(target);
    }

    /// Remove the first occurrence of `target` for `environment`. Returns true
    /// if something was removed.
    fn remove(&mut self, environment: Environment, target: &TargetId) -> bool {
        let Some(targets) = self.0.get_mut(&environment) else {
            return false;
        };

        let Some(idx) = targets.iter().position(|t| t == target) else {
            return false;
        };

        targets.remove(idx);

        if targets.is_empty() {
            self.0.remove(&environment);
        }

        true
    }

    pub fn targets(&self, environment: Environment) -> &[TargetId] {
        self.0.get(&environment).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Environment, &TargetId)> {
        self.0
            .iter()
            .flat_map(|(env, targets)| targets.iter().map(move |t| (*env, t)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Application deployable on a production and a staging environment.
#[derive(Debug, Clone, PartialEq)]
pub struct App {
    emitter: Emitter<AppEvent>,
    id: AppId,
    name: AppName,
    version_control: Option<VersionControl>,
    history: AppTargetHistory,
    production: EnvironmentConfig,
    staging: EnvironmentConfig,
    cleanup_requested: Option<Action<UserId>>,
    created: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCreated {
    pub id: AppId,
    pub name: AppName,
    pub production: EnvironmentConfig,
    pub staging: EnvironmentConfig,
    pub history: AppTargetHistory,
    pub created: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEnvChanged {
    pub id: AppId,
    pub environment: Environment,
    pub config: EnvironmentConfig,
    /// Previous config, needed to clean the old target up.
    pub old_config: EnvironmentConfig,
}

impl AppEnvChanged {
    pub fn target_has_changed(&self) -> bool {
        self.config.target() != self.old_config.target()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppVersionControlConfigured {
    pub id: AppId,
    pub config: VersionControl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppVersionControlRemoved {
    pub id: AppId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCleanupRequested {
    pub id: AppId,
    pub production_config: EnvironmentConfig,
    pub staging_config: EnvironmentConfig,
    pub requested: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppHistoryChanged {
    pub id: AppId,
    pub history: AppTargetHistory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDeleted {
    pub id: AppId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppEvent {
    AppCreated(AppCreated),
    AppEnvChanged(AppEnvChanged),
    AppVersionControlConfigured(AppVersionControlConfigured),
    AppVersionControlRemoved(AppVersionControlRemoved),
    AppCleanupRequested(AppCleanupRequested),
    AppHistoryChanged(AppHistoryChanged),
    AppDeleted(AppDeleted),
}

impl Event for AppEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AppEvent::AppCreated(_) => "deployment.app.created",
            AppEvent::AppEnvChanged(_) => "deployment.app.env_changed",
            AppEvent::AppVersionControlConfigured(_) => "deployment.app.version_control_configured",
            AppEvent::AppVersionControlRemoved(_) => "deployment.app.version_control_removed",
            AppEvent::AppCleanupRequested(_) => "deployment.app.cleanup_requested",
            AppEvent::AppHistoryChanged(_) => "deployment.app.history_changed",
            AppEvent::AppDeleted(_) => "deployment.app.deleted",
        }
    }
}

impl App {
    fn empty() -> Self {
        Self {
            emitter: Emitter::default(),
            id: AppId::default(),
            name: AppName::default(),
            version_control: None,
            history: AppTargetHistory::default(),
            production: EnvironmentConfig::default(),
            staging: EnvironmentConfig::default(),
            cleanup_requested: None,
            created: Action::default(),
        }
    }

    /// Create an app whose name is available on both environment targets.
    pub fn new(
        name: AppName,
        production_requirement: EnvironmentConfigRequirement,
        staging_requirement: EnvironmentConfigRequirement,
        created_by: UserId,
    ) -> DomainResult<Self> {
        let production = production_requirement.met()?;
        let staging = staging_requirement.met()?;

        let mut history = AppTargetHistory::default();
        history.push(Environment::Production, production.target().clone());
        history.push(Environment::Staging, staging.target().clone());

        let mut app = Self::empty();
        aggregate::store(
            &mut app,
            AppEvent::AppCreated(AppCreated {
                id: AppId::new(),
                name,
                production,
                staging,
                history,
                created: Action::new(created_by),
            }),
        );

        Ok(app)
    }

    /// Rebuild a persisted app.
    pub fn from_scanner<S: Scanner>(scanner: &mut S) -> Result<Self, ScanError> {
        let id: AppId = scanner.scan("id")?;
        let name: AppName = scanner.scan("name")?;
        let vcs_url: Option<Url> = scanner.scan("vcs_url")?;
        let vcs_token: Option<String> = scanner.scan("vcs_token")?;
        let production = scan_environment_config(
            scanner,
            ["production_target", "production_version", "production_vars"],
        )?;
        let staging = scan_environment_config(
            scanner,
            ["staging_target", "staging_version", "staging_vars"],
        )?;
        let cleanup_requested_at: Option<DateTime<Utc>> = scanner.scan("cleanup_requested_at")?;
        let cleanup_requested_by: Option<UserId> = scanner.scan("cleanup_requested_by")?;
        let history: AppTargetHistory = scanner.scan("history")?;
        let created_at: DateTime<Utc> = scanner.scan("created_at")?;
        let created_by: UserId = scanner.scan("created_by")?;
        let version: u64 = scanner.scan("version")?;
        scanner.finish()?;

        let version_control = vcs_url.map(|url| {
            let mut vcs = VersionControl::new(url);
            if let Some(token) = vcs_token {
                vcs.authenticated(token);
            }
            vcs
        });

        let mut app = Self {
            emitter: Emitter::default(),
            id,
            name,
            version_control,
            history,
            production,
            staging,
            cleanup_requested: cleanup_requested_by
                .zip(cleanup_requested_at)
                .map(|(by, at)| Action::from_parts(by, at)),
            created: Action::from_parts(created_by, created_at),
        };
        hydrate(&mut app, version);

        Ok(app)
    }

    /// Columns in the order read by [`App::from_scanner`].
    pub fn to_row(&self) -> Result<Vec<Value>, ScanError> {
        let vcs = self.version_control.as_ref();

        Ok(RowBuilder::new()
            .push(&self.id)?
            .push(&self.name)?
            .push(&vcs.map(VersionControl::url))?
            .push(&vcs.and_then(VersionControl::token))?
            .push(self.production.target())?
            .push(&self.production.version())?
            .push(&self.production.vars())?
            .push(self.staging.target())?
            .push(&self.staging.version())?
            .push(&self.staging.vars())?
            .push(&self.cleanup_requested.as_ref().map(Action::at))?
            .push(&self.cleanup_requested.as_ref().map(Action::by))?
            .push(&self.history)?
            .push(&self.created.at())?
            .push(self.created.by())?
            .push(&self.version())?
            .build())
    }

    pub fn use_version_control(&mut self, config: VersionControl) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        if self.version_control.as_ref() == Some(&config) {
            return Ok(());
        }

        aggregate::store(
            self,
            AppEvent::AppVersionControlConfigured(AppVersionControlConfigured {
                id: self.id.clone(),
                config,
            }),
        );

        Ok(())
    }

    pub fn remove_version_control(&mut self) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        if self.version_control.is_none() {
            return Ok(());
        }

        aggregate::store(
            self,
            AppEvent::AppVersionControlRemoved(AppVersionControlRemoved {
                id: self.id.clone(),
            }),
        );

        Ok(())
    }

    pub fn has_production_config(
        &mut self,
        requirement: EnvironmentConfigRequirement,
    ) -> DomainResult<()> {
        self.try_update_environment_config(Environment::Production, requirement)
    }

    pub fn has_staging_config(
        &mut self,
        requirement: EnvironmentConfigRequirement,
    ) -> DomainResult<()> {
        self.try_update_environment_config(Environment::Staging, requirement)
    }

    pub fn has_environment_variables(
        &mut self,
        environment: Environment,
        vars: ServicesEnv,
    ) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        let existing = self.environment_config(environment).clone();
        let mut config = existing.clone();
        config.has_environment_variables(vars);

        self.store_env_changed(environment, config, existing);

        Ok(())
    }

    pub fn remove_environment_variables(&mut self, environment: Environment) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        let existing = self.environment_config(environment).clone();
        let mut config = existing.clone();
        config.remove_environment_variables();

        self.store_env_changed(environment, config, existing);

        Ok(())
    }

    /// First step of the deletion: every resource of the app should be removed.
    pub fn request_cleanup(&mut self, requested_by: UserId) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        aggregate::store(
            self,
            AppEvent::AppCleanupRequested(AppCleanupRequested {
                id: self.id.clone(),
                production_config: self.production.clone(),
                staging_config: self.staging.clone(),
                requested: Action::new(requested_by),
            }),
        );

        Ok(())
    }

    /// Resources of an environment have been removed from a target.
    pub fn cleaned_up(&mut self, environment: Environment, target: &TargetId) {
        let mut history = self.history.clone();

        if !history.remove(environment, target) {
            return;
        }

        aggregate::store(
            self,
            AppEvent::AppHistoryChanged(AppHistoryChanged {
                id: self.id.clone(),
                history,
            }),
        );
    }

    pub fn delete(&mut self, running_or_pending_deployments: u32) -> DomainResult<()> {
        if self.cleanup_requested.is_none() {
            return Err(DomainError::AppCleanupNeeded);
        }

        if running_or_pending_deployments > 0 {
            return Err(DomainError::AppHasRunningOrPendingDeployments);
        }

        aggregate::store(
            self,
            AppEvent::AppDeleted(AppDeleted {
                id: self.id.clone(),
            }),
        );

        Ok(())
    }

    /// Snapshot of the environment configuration used by a new deployment.
    pub fn config_snapshot_for(&self, environment: Environment) -> DeploymentConfig {
        let config = self.environment_config(environment);

        DeploymentConfig::new(
            self.id.clone(),
            self.name.clone(),
            environment,
            config.target().clone(),
            config.vars().cloned(),
        )
    }

    pub fn name(&self) -> &AppName {
        &self.name
    }

    pub fn version_control(&self) -> Option<&VersionControl> {
        self.version_control.as_ref()
    }

    pub fn history(&self) -> &AppTargetHistory {
        &self.history
    }

    pub fn production(&self) -> &EnvironmentConfig {
        &self.production
    }

    pub fn staging(&self) -> &EnvironmentConfig {
        &self.staging
    }

    pub fn environment_config(&self, environment: Environment) -> &EnvironmentConfig {
        match environment {
            Environment::Production => &self.production,
            Environment::Staging => &self.staging,
        }
    }

    pub fn cleanup_requested(&self) -> Option<&Action<UserId>> {
        self.cleanup_requested.as_ref()
    }

    pub fn created(&self) -> &Action<UserId> {
        &self.created
    }

    pub(crate) fn ensure_not_cleaning_up(&self) -> DomainResult<()> {
        match self.cleanup_requested {
            Some(_) => Err(DomainError::AppCleanupRequested),
            None => Ok(()),
        }
    }

    fn try_update_environment_config(
        &mut self,
        environment: Environment,
        requirement: EnvironmentConfigRequirement,
    ) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        let mut config = requirement.met()?;
        let existing = self.environment_config(environment).clone();

        if config.equals(&existing) {
            return Ok(());
        }

        let target_changed = config.consolidate(&existing);
        let target = config.target().clone();

        self.store_env_changed(environment, config, existing);

        if target_changed {
            let mut history = self.history.clone();
            history.push(environment, target);

            aggregate::store(
                self,
                AppEvent::AppHistoryChanged(AppHistoryChanged {
                    id: self.id.clone(),
                    history,
                }),
            );
        }

        Ok(())
    }

    fn store_env_changed(
        &mut self,
        environment: Environment,
        config: EnvironmentConfig,
        old_config: EnvironmentConfig,
    ) {
        if config == old_config {
            return;
        }

        aggregate::store(
            self,
            AppEvent::AppEnvChanged(AppEnvChanged {
                id: self.id.clone(),
                environment,
                config,
                old_config,
            }),
        );
    }
}

fn scan_environment_config<S: Scanner>(
    scanner: &mut S,
    columns: [&'static str; 3],
) -> Result<EnvironmentConfig, ScanError> {
    let [target, version, vars] = columns;

    Ok(EnvironmentConfig::from_parts(
        scanner.scan(target)?,
        scanner.scan(version)?,
        scanner.scan(vars)?,
    ))
}

impl AggregateRoot for App {
    type Id = AppId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.emitter.version()
    }
}

impl EventSourced for App {
    type Event = AppEvent;

    fn emitter(&self) -> &Emitter<AppEvent> {
        &self.emitter
    }

    fn emitter_mut(&mut self) -> &mut Emitter<AppEvent> {
        &mut self.emitter
    }

    fn apply(&mut self, event: &AppEvent) {
        match event {
            AppEvent::AppCreated(e) => {
                self.id = e.id.clone();
                self.name = e.name.clone();
                self.production = e.production.clone();
                self.staging = e.staging.clone();
                self.history = e.history.clone();
                self.created = e.created.clone();
            }
            AppEvent::AppEnvChanged(e) => match e.environment {
                Environment::Production => self.production = e.config.clone(),
                Environment::Staging => self.staging = e.config.clone(),
            },
            AppEvent::AppVersionControlConfigured(e) => {
                self.version_control = Some(e.config.clone())
            }
            AppEvent::AppVersionControlRemoved(_) => self.version_control = None,
            AppEvent::AppCleanupRequested(e) => self.cleanup_requested = Some(e.requested.clone()),
            AppEvent::AppHistoryChanged(e) => self.history = e.history.clone(),
            AppEvent::AppDeleted(_) => {}
        }
    }
}

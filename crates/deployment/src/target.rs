//! Deployment target and its reconciliation protocol.
//!
//! Any change to what a target exposes (url, provider payload, custom
//! entrypoints) moves it back to [`TargetStatus::Configuring`] under a new
//! epoch. The provider reports the outcome of its work with
//! [`Target::configured`], and reports made for a superseded epoch are
//! rejected as outdated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::aggregate::{self, hydrate};
use dockyard_core::{
    Action, AggregateRoot, DomainError, DomainResult, Emitter, EventSourced, RowBuilder,
    ScanError, Scanner, UserId,
};
use dockyard_events::Event;

use crate::entrypoints::{TargetEntrypoints, TargetEntrypointsAssigned};
use crate::environment::Environment;
use crate::ids::{AppId, TargetId};
use crate::provider::ProviderConfig;
use crate::requirement::{ProviderConfigRequirement, TargetUrlRequirement};
use crate::service::Services;
use crate::state::{TargetState, TargetStatus};
use crate::url::Url;

/// How resources left on a target should be handled when removing them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupStrategy {
    /// Remove the resources, failing if that is not possible.
    #[default]
    Default,
    /// Nothing was ever deployed or the target cannot be reached anymore.
    Skip,
}

/// Place where apps are deployed, reached through a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    emitter: Emitter<TargetEvent>,
    id: TargetId,
    name: String,
    url: Option<Url>,
    provider: ProviderConfig,
    state: TargetState,
    custom_entrypoints: TargetEntrypoints,
    cleanup_requested: Option<Action<UserId>>,
    created: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCreated {
    pub id: TargetId,
    pub name: String,
    pub url: Option<Url>,
    pub provider: ProviderConfig,
    pub state: TargetState,
    pub entrypoints: TargetEntrypoints,
    pub created: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRenamed {
    pub id: TargetId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUrlChanged {
    pub id: TargetId,
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetUrlRemoved {
    pub id: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProviderChanged {
    pub id: TargetId,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntrypointsChanged {
    pub id: TargetId,
    pub entrypoints: TargetEntrypoints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetStateChanged {
    pub id: TargetId,
    pub state: TargetState,
}

impl TargetStateChanged {
    pub fn went_to_configuring_state(&self) -> bool {
        self.state.status() == TargetStatus::Configuring
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCleanupRequested {
    pub id: TargetId,
    pub requested: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDeleted {
    pub id: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetEvent {
    TargetCreated(TargetCreated),
    TargetRenamed(TargetRenamed),
    TargetUrlChanged(TargetUrlChanged),
    TargetUrlRemoved(TargetUrlRemoved),
    TargetProviderChanged(TargetProviderChanged),
    TargetEntrypointsChanged(TargetEntrypointsChanged),
    TargetStateChanged(TargetStateChanged),
    TargetCleanupRequested(TargetCleanupRequested),
    TargetDeleted(TargetDeleted),
}

impl Event for TargetEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TargetEvent::TargetCreated(_) => "deployment.target.created",
            TargetEvent::TargetRenamed(_) => "deployment.target.renamed",
            TargetEvent::TargetUrlChanged(_) => "deployment.target.url_changed",
            TargetEvent::TargetUrlRemoved(_) => "deployment.target.url_removed",
            TargetEvent::TargetProviderChanged(_) => "deployment.target.provider_changed",
            TargetEvent::TargetEntrypointsChanged(_) => "deployment.target.entrypoints_changed",
            TargetEvent::TargetStateChanged(_) => "deployment.target.state_changed",
            TargetEvent::TargetCleanupRequested(_) => "deployment.target.cleanup_requested",
            TargetEvent::TargetDeleted(_) => "deployment.target.deleted",
        }
    }
}

impl Target {
    fn empty() -> Self {
        Self {
            emitter: Emitter::default(),
            id: TargetId::default(),
            name: String::new(),
            url: None,
            provider: ProviderConfig::default(),
            state: TargetState::new(),
            custom_entrypoints: TargetEntrypoints::new(),
            cleanup_requested: None,
            created: Action::default(),
        }
    }

    /// Declare a new target. Without url, services are exposed manually and the
    /// target never needs reconfiguring when entrypoints change.
    pub fn new(
        name: impl Into<String>,
        url_requirement: Option<TargetUrlRequirement>,
        provider_requirement: ProviderConfigRequirement,
        created_by: UserId,
    ) -> DomainResult<Self> {
        let url = url_requirement
            .map(TargetUrlRequirement::met)
            .transpose()?
            .map(|url| url.root());
        let provider = provider_requirement.met()?;

        let mut target = Self::empty();
        aggregate::store(
            &mut target,
            TargetEvent::TargetCreated(TargetCreated {
                id: TargetId::new(),
                name: name.into(),
                url,
                provider,
                state: TargetState::new(),
                entrypoints: TargetEntrypoints::new(),
                created: Action::new(created_by),
            }),
        );

        Ok(target)
    }

    /// Rebuild a persisted target.
    pub fn from_scanner<S: Scanner>(scanner: &mut S) -> Result<Self, ScanError> {
        let id: TargetId = scanner.scan("id")?;
        let name: String = scanner.scan("name")?;
        let url: Option<Url> = scanner.scan("url")?;
        let provider_kind: String = scanner.scan("provider_kind")?;
        let provider_data: Value = scanner.scan("provider_data")?;
        let status: TargetStatus = scanner.scan("state_status")?;
        let state_version: DateTime<Utc> = scanner.scan("state_version")?;
        let errcode: Option<String> = scanner.scan("state_errcode")?;
        let last_ready_version: Option<DateTime<Utc>> =
            scanner.scan("state_last_ready_version")?;
        let custom_entrypoints: TargetEntrypoints = scanner.scan("custom_entrypoints")?;
        let cleanup_requested_at: Option<DateTime<Utc>> = scanner.scan("cleanup_requested_at")?;
        let cleanup_requested_by: Option<UserId> = scanner.scan("cleanup_requested_by")?;
        let created_at: DateTime<Utc> = scanner.scan("created_at")?;
        let created_by: UserId = scanner.scan("created_by")?;
        let version: u64 = scanner.scan("version")?;
        scanner.finish()?;

        let mut target = Self {
            emitter: Emitter::default(),
            id,
            name,
            url,
            provider: ProviderConfig::from_parts(&provider_kind, provider_data)?,
            state: TargetState::from_parts(status, state_version, errcode, last_ready_version),
            custom_entrypoints,
            cleanup_requested: cleanup_requested_by
                .zip(cleanup_requested_at)
                .map(|(by, at)| Action::from_parts(by, at)),
            created: Action::from_parts(created_by, created_at),
        };
        hydrate(&mut target, version);

        Ok(target)
    }

    /// Columns in the order read by [`Target::from_scanner`].
    pub fn to_row(&self) -> Result<Vec<Value>, ScanError> {
        let provider_data = self
            .provider
            .payload()
            .map_err(|source| ScanError::Encode { index: 4, source })?;

        Ok(RowBuilder::new()
            .push(&self.id)?
            .push(&self.name)?
            .push(&self.url)?
            .push(self.provider.kind())?
            .push(&provider_data)?
            .push(&self.state.status())?
            .push(&self.state.version())?
            .push(&self.state.errcode())?
            .push(&self.state.last_ready_version())?
            .push(&self.custom_entrypoints)?
            .push(&self.cleanup_requested.as_ref().map(Action::at))?
            .push(&self.cleanup_requested.as_ref().map(Action::by))?
            .push(&self.created.at())?
            .push(self.created.by())?
            .push(&self.version())?
            .build())
    }

    pub fn rename(&mut self, name: impl Into<String>) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        let name = name.into();

        if self.name == name {
            return Ok(());
        }

        aggregate::store(
            self,
            TargetEvent::TargetRenamed(TargetRenamed {
                id: self.id.clone(),
                name,
            }),
        );

        Ok(())
    }

    /// Let the target expose services on subdomains of the given url.
    pub fn expose_services_automatically(
        &mut self,
        url_requirement: TargetUrlRequirement,
    ) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        let url = url_requirement.met()?.root();

        if self.url.as_ref() == Some(&url) {
            return Ok(());
        }

        aggregate::store(
            self,
            TargetEvent::TargetUrlChanged(TargetUrlChanged {
                id: self.id.clone(),
                url,
            }),
        );
        self.raise_reconfigure();

        Ok(())
    }

    /// Services are exposed by the user, the target has no url anymore.
    pub fn expose_services_manually(&mut self) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        if self.url.is_none() {
            return Ok(());
        }

        aggregate::store(
            self,
            TargetEvent::TargetUrlRemoved(TargetUrlRemoved {
                id: self.id.clone(),
            }),
        );
        self.raise_reconfigure();

        Ok(())
    }

    /// Update the provider payload. The host it points to cannot change.
    pub fn has_provider(&mut self, provider_requirement: ProviderConfigRequirement) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        let provider = provider_requirement.met()?;

        if !self.provider.same_host(&provider) {
            return Err(DomainError::TargetProviderUpdateNotPermitted);
        }

        if self.provider.equals(&provider) {
            return Ok(());
        }

        aggregate::store(
            self,
            TargetEvent::TargetProviderChanged(TargetProviderChanged {
                id: self.id.clone(),
                provider,
            }),
        );
        self.raise_reconfigure();

        Ok(())
    }

    /// Fail fast when the target cannot receive deployments right now.
    pub fn check_availability(&self) -> DomainResult<()> {
        if self.state.status() == TargetStatus::Configuring {
            return Err(DomainError::TargetConfigurationInProgress);
        }

        self.ensure_not_cleaning_up()?;

        if self.state.status() != TargetStatus::Ready {
            return Err(DomainError::TargetConfigurationFailed);
        }

        Ok(())
    }

    /// Manually trigger a new configuration.
    pub fn reconfigure(&mut self) -> DomainResult<()> {
        self.ensure_not_cleaning_up()?;

        if self.state.status() == TargetStatus::Configuring {
            return Err(DomainError::TargetConfigurationInProgress);
        }

        self.raise_reconfigure();

        Ok(())
    }

    /// Report the outcome of the configuration made for `version`.
    ///
    /// Assigned ports are only kept on success, and only for entrypoints still
    /// waiting for one.
    pub fn configured(
        &mut self,
        version: DateTime<Utc>,
        assigned: &TargetEntrypointsAssigned,
        err: Option<String>,
    ) -> DomainResult<()> {
        let mut state = self.state.clone();

        if !state.configured(version, err) {
            return Err(DomainError::TargetConfigurationOutdated);
        }

        if state.status() == TargetStatus::Ready {
            let mut entrypoints = self.custom_entrypoints.clone();

            if entrypoints.assign(assigned) {
                aggregate::store(
                    self,
                    TargetEvent::TargetEntrypointsChanged(TargetEntrypointsChanged {
                        id: self.id.clone(),
                        entrypoints,
                    }),
                );
            }
        }

        aggregate::store(
            self,
            TargetEvent::TargetStateChanged(TargetStateChanged {
                id: self.id.clone(),
                state,
            }),
        );

        Ok(())
    }

    /// Make the custom entrypoints of `services` exposed for an app environment.
    pub fn expose_entrypoints(&mut self, app: &AppId, environment: Environment, services: &Services) {
        if self.cleanup_requested.is_some() {
            return;
        }

        let mut entrypoints = self.custom_entrypoints.clone();

        if entrypoints.merge(app, environment, services.custom_entrypoints()) {
            self.raise_entrypoints_changed(entrypoints);
        }
    }

    /// Stop exposing entrypoints of an app, for the given environments or all of
    /// them if none is given.
    pub fn un_expose_entrypoints(&mut self, app: &AppId, environments: &[Environment]) {
        if self.cleanup_requested.is_some() {
            return;
        }

        let mut entrypoints = self.custom_entrypoints.clone();

        if entrypoints.remove(app, environments) {
            self.raise_entrypoints_changed(entrypoints);
        }
    }

    /// First step of the deletion. Does nothing if already requested.
    pub fn request_cleanup(&mut self, has_apps: bool, by: UserId) -> DomainResult<()> {
        if self.cleanup_requested.is_some() {
            return Ok(());
        }

        if has_apps {
            return Err(DomainError::TargetInUse);
        }

        if self.state.status() == TargetStatus::Configuring {
            return Err(DomainError::TargetConfigurationInProgress);
        }

        aggregate::store(
            self,
            TargetEvent::TargetCleanupRequested(TargetCleanupRequested {
                id: self.id.clone(),
                requested: Action::new(by),
            }),
        );

        Ok(())
    }

    /// How the provider should handle the target resources before deleting it.
    pub fn cleanup_strategy(
        &self,
        has_running_or_pending_deployments: bool,
    ) -> DomainResult<CleanupStrategy> {
        if self.cleanup_requested.is_none() {
            return Err(DomainError::TargetCleanupNeeded);
        }

        if has_running_or_pending_deployments {
            return Err(DomainError::RunningOrPendingDeployments);
        }

        match self.state.status() {
            TargetStatus::Configuring => Err(DomainError::TargetConfigurationInProgress),
            TargetStatus::Ready => Ok(CleanupStrategy::Default),
            // Unreachable and about to be deleted, nothing can be done anymore.
            TargetStatus::Failed => Ok(CleanupStrategy::Skip),
        }
    }

    /// How the provider should handle what an app environment left on this target.
    pub fn app_cleanup_strategy(
        &self,
        ongoing: bool,
        successful: bool,
    ) -> DomainResult<CleanupStrategy> {
        if self.cleanup_requested.is_some() {
            return Ok(CleanupStrategy::Skip);
        }

        if ongoing {
            return Err(DomainError::RunningOrPendingDeployments);
        }

        if !successful {
            return Ok(CleanupStrategy::Skip);
        }

        match self.state.status() {
            TargetStatus::Configuring => Err(DomainError::TargetConfigurationInProgress),
            TargetStatus::Ready => Ok(CleanupStrategy::Default),
            TargetStatus::Failed => Err(DomainError::TargetConfigurationFailed),
        }
    }

    pub fn delete(&mut self, cleaned_up: bool) -> DomainResult<()> {
        if self.cleanup_requested.is_none() || !cleaned_up {
            return Err(DomainError::TargetCleanupNeeded);
        }

        aggregate::store(
            self,
            TargetEvent::TargetDeleted(TargetDeleted {
                id: self.id.clone(),
            }),
        );

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn state(&self) -> &TargetState {
        &self.state
    }

    pub fn custom_entrypoints(&self) -> &TargetEntrypoints {
        &self.custom_entrypoints
    }

    pub fn cleanup_requested(&self) -> Option<&Action<UserId>> {
        self.cleanup_requested.as_ref()
    }

    pub fn created(&self) -> &Action<UserId> {
        &self.created
    }

    /// Epoch of the configuration currently expected.
    pub fn current_version(&self) -> DateTime<Utc> {
        self.state.version()
    }

    pub fn is_outdated(&self, version: DateTime<Utc>) -> bool {
        self.state.is_outdated(version)
    }

    fn ensure_not_cleaning_up(&self) -> DomainResult<()> {
        match self.cleanup_requested {
            Some(_) => Err(DomainError::TargetCleanupRequested),
            None => Ok(()),
        }
    }

    fn raise_reconfigure(&mut self) {
        let mut state = self.state.clone();
        state.reconfigure();

        aggregate::store(
            self,
            TargetEvent::TargetStateChanged(TargetStateChanged {
                id: self.id.clone(),
                state,
            }),
        );
    }

    fn raise_entrypoints_changed(&mut self, entrypoints: TargetEntrypoints) {
        aggregate::store(
            self,
            TargetEvent::TargetEntrypointsChanged(TargetEntrypointsChanged {
                id: self.id.clone(),
                entrypoints,
            }),
        );

        // Manual targets are configured by the user.
        if self.url.is_some() {
            self.raise_reconfigure();
        }
    }
}

impl AggregateRoot for Target {
    type Id = TargetId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.emitter.version()
    }
}

impl EventSourced for Target {
    type Event = TargetEvent;

    fn emitter(&self) -> &Emitter<TargetEvent> {
        &self.emitter
    }

    fn emitter_mut(&mut self) -> &mut Emitter<TargetEvent> {
        &mut self.emitter
    }

    fn apply(&mut self, event: &TargetEvent) {
        match event {
            TargetEvent::TargetCreated(e) => {
                self.id = e.id.clone();
                self.name = e.name.clone();
                self.url = e.url.clone();
                self.provider = e.provider.clone();
                self.state = e.state.clone();
                self.custom_entrypoints = e.entrypoints.clone();
                self.created = e.created.clone();
            }
            TargetEvent::TargetRenamed(e) => self.name = e.name.clone(),
            TargetEvent::TargetUrlChanged(e) => self.url = Some(e.url.clone()),
            TargetEvent::TargetUrlRemoved(_) => self.url = None,
            TargetEvent::TargetProviderChanged(e) => self.provider = e.provider.clone(),
            TargetEvent::TargetEntrypointsChanged(e) => {
                self.custom_entrypoints = e.entrypoints.clone()
            }
            TargetEvent::TargetStateChanged(e) => self.state = e.state.clone(),
            TargetEvent::TargetCleanupRequested(e) => {
                self.cleanup_requested = Some(e.requested.clone())
            }
            TargetEvent::TargetDeleted(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture;
    use crate::provider::DockerConfig;
    use crate::service::Port;
    use chrono::Duration;
    use dockyard_core::RowScanner;
    use dockyard_core::aggregate::{drain, unwrap};
    use proptest::prelude::*;

    fn remote(host: &str, key: Option<&str>) -> ProviderConfig {
        ProviderConfig::Docker(DockerConfig {
            host: Some(host.into()),
            private_key: key.map(str::to_string),
            ..Default::default()
        })
    }

    fn state_changes(target: &Target) -> Vec<&TargetState> {
        unwrap(target)
            .iter()
            .filter_map(|e| match e {
                TargetEvent::TargetStateChanged(e) => Some(&e.state),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn should_require_available_url_and_config() {
        let url = fixture::url("http://docker.localhost");

        let taken_url = Target::new(
            "target",
            Some(TargetUrlRequirement::new(url.clone(), false)),
            ProviderConfigRequirement::new(ProviderConfig::default(), true),
            fixture::user(),
        );
        assert_eq!(taken_url.err(), Some(DomainError::UrlAlreadyTaken));

        let taken_config = Target::new(
            "target",
            Some(TargetUrlRequirement::new(url, true)),
            ProviderConfigRequirement::new(ProviderConfig::default(), false),
            fixture::user(),
        );
        assert_eq!(taken_config.err(), Some(DomainError::ConfigAlreadyTaken));
    }

    #[test]
    fn should_be_created_configuring_with_the_root_url() {
        let target = Target::new(
            "my-target",
            Some(TargetUrlRequirement::new(
                fixture::url("http://docker.localhost/some/path"),
                true,
            )),
            ProviderConfigRequirement::new(ProviderConfig::default(), true),
            fixture::user(),
        )
        .unwrap();

        assert_eq!(target.name(), "my-target");
        assert_eq!(target.url(), Some(&fixture::url("http://docker.localhost")));
        assert_eq!(target.state().status(), TargetStatus::Configuring);

        match unwrap(&target) {
            [TargetEvent::TargetCreated(e)] => {
                assert_eq!(&e.id, target.id());
                assert_eq!(e.state.status(), TargetStatus::Configuring);
                assert!(e.entrypoints.is_empty());
            }
            other => panic!("Expected TargetCreated, got {other:?}"),
        }
    }

    #[test]
    fn reconciliation_scenario() {
        let mut target = fixture::target();

        target
            .configured(target.current_version(), &TargetEntrypointsAssigned::new(), None)
            .unwrap();
        assert_eq!(target.state().status(), TargetStatus::Ready);
        assert_eq!(unwrap(&target).len(), 1);

        target.rename("x").unwrap();
        assert_eq!(target.state().status(), TargetStatus::Ready);
        assert!(matches!(unwrap(&target)[1], TargetEvent::TargetRenamed(_)));

        assert_eq!(
            target.has_provider(ProviderConfigRequirement::new(remote("other.com", None), true)),
            Err(DomainError::TargetProviderUpdateNotPermitted)
        );
        assert_eq!(unwrap(&target).len(), 2);
    }

    #[test]
    fn rename_is_a_no_op_with_the_same_name() {
        let mut target = fixture::target();

        target.rename("my-target").unwrap();
        assert!(unwrap(&target).is_empty());
    }

    #[test]
    fn changing_the_url_reconfigures() {
        let mut target = fixture::ready_target();
        let before = target.current_version();

        target
            .expose_services_automatically(TargetUrlRequirement::new(
                fixture::url("http://docker.localhost"),
                true,
            ))
            .unwrap();
        assert!(unwrap(&target).is_empty());

        target
            .expose_services_automatically(TargetUrlRequirement::new(
                fixture::url("https://example.com"),
                true,
            ))
            .unwrap();

        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetUrlChanged(_), TargetEvent::TargetStateChanged(_)]
        ));
        assert!(target.current_version() > before);
        assert_eq!(target.state().status(), TargetStatus::Configuring);
    }

    #[test]
    fn switching_to_manual_removes_the_url() {
        let mut target = fixture::ready_target();

        target.expose_services_manually().unwrap();
        target.expose_services_manually().unwrap();

        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetUrlRemoved(_), TargetEvent::TargetStateChanged(_)]
        ));
        assert!(target.url().is_none());
    }

    #[test]
    fn url_must_be_available() {
        let mut target = fixture::ready_target();

        assert_eq!(
            target.expose_services_automatically(TargetUrlRequirement::new(
                fixture::url("https://example.com"),
                false,
            )),
            Err(DomainError::UrlAlreadyTaken)
        );
    }

    #[test]
    fn provider_payload_can_change_on_the_same_host() {
        let mut target = fixture::target_with(
            Some("http://docker.localhost"),
            remote("example.com", None),
        );
        target
            .configured(target.current_version(), &TargetEntrypointsAssigned::new(), None)
            .unwrap();
        drain(&mut target);

        target
            .has_provider(ProviderConfigRequirement::new(remote("example.com", None), true))
            .unwrap();
        assert!(unwrap(&target).is_empty());

        target
            .has_provider(ProviderConfigRequirement::new(
                remote("example.com", Some("key")),
                true,
            ))
            .unwrap();
        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetProviderChanged(_), TargetEvent::TargetStateChanged(_)]
        ));
    }

    #[test]
    fn reconfigure_is_rejected_while_configuring() {
        let mut target = fixture::target();

        assert_eq!(target.reconfigure(), Err(DomainError::TargetConfigurationInProgress));

        let mut target = fixture::ready_target();
        target.reconfigure().unwrap();
        assert_eq!(state_changes(&target).len(), 1);
        assert_eq!(target.state().status(), TargetStatus::Configuring);
    }

    #[test]
    fn configured_rejects_outdated_reports() {
        let mut target = fixture::target();
        let version = target.current_version();

        assert_eq!(
            target.configured(
                version - Duration::seconds(1),
                &TargetEntrypointsAssigned::new(),
                None
            ),
            Err(DomainError::TargetConfigurationOutdated)
        );

        target
            .configured(version, &TargetEntrypointsAssigned::new(), None)
            .unwrap();
        assert_eq!(
            target.configured(version, &TargetEntrypointsAssigned::new(), None),
            Err(DomainError::TargetConfigurationOutdated)
        );
        assert_eq!(unwrap(&target).len(), 1);
    }

    #[test]
    fn configured_with_an_error_discards_assigned_ports() {
        let app = fixture::app_on(&fixture::target());
        let deployment = fixture::deployment(&app, Environment::Production);
        let services = fixture::services(deployment.config());
        let mut target = fixture::ready_target();
        target.expose_entrypoints(app.id(), Environment::Production, &services);
        drain(&mut target);

        let assigned = fixture::assign_all(&target, 8000);
        target
            .configured(target.current_version(), &assigned, Some("boom".into()))
            .unwrap();

        assert!(matches!(unwrap(&target), [TargetEvent::TargetStateChanged(_)]));
        assert_eq!(target.state().status(), TargetStatus::Failed);
        assert_eq!(target.state().errcode(), Some("boom"));
        assert_eq!(target.custom_entrypoints().unassigned().count(), 2);
        assert_eq!(target.check_availability(), Err(DomainError::TargetConfigurationFailed));
    }

    #[test]
    fn configured_assigns_ports_to_desired_entrypoints() {
        let app = fixture::app_on(&fixture::target());
        let deployment = fixture::deployment(&app, Environment::Production);
        let services = fixture::services(deployment.config());
        let mut target = fixture::ready_target();
        target.expose_entrypoints(app.id(), Environment::Production, &services);
        drain(&mut target);

        let mut assigned = fixture::assign_all(&target, 8000);
        assigned.set(
            app.id().clone(),
            Environment::Staging,
            "unknown".into(),
            Port::new(1),
        );
        target
            .configured(target.current_version(), &assigned, None)
            .unwrap();

        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetEntrypointsChanged(_), TargetEvent::TargetStateChanged(_)]
        ));
        assert_eq!(target.custom_entrypoints().len(), 2);
        assert_eq!(target.custom_entrypoints().unassigned().count(), 0);
        assert!(target.state().last_ready_version().is_some());
        assert_eq!(target.check_availability(), Ok(()));
    }

    #[test]
    fn exposing_entrypoints_reconfigures_targets_with_url() {
        let app = fixture::app_on(&fixture::target());
        let deployment = fixture::deployment(&app, Environment::Production);
        let services = fixture::services(deployment.config());
        let mut target = fixture::ready_target();

        target.expose_entrypoints(app.id(), Environment::Production, &services);
        target.expose_entrypoints(app.id(), Environment::Production, &services);

        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetEntrypointsChanged(_), TargetEvent::TargetStateChanged(_)]
        ));

        target.un_expose_entrypoints(app.id(), &[Environment::Staging]);
        assert_eq!(unwrap(&target).len(), 2);

        target.un_expose_entrypoints(app.id(), &[]);
        assert_eq!(unwrap(&target).len(), 4);
        assert!(target.custom_entrypoints().is_empty());
    }

    #[test]
    fn exposing_entrypoints_does_not_reconfigure_manual_targets() {
        let app = fixture::app_on(&fixture::target());
        let deployment = fixture::deployment(&app, Environment::Production);
        let mut target = fixture::target_with(None, ProviderConfig::default());

        target.expose_entrypoints(
            app.id(),
            Environment::Production,
            &fixture::services(deployment.config()),
        );

        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetEntrypointsChanged(_)]
        ));
    }

    #[test]
    fn request_cleanup_checks_apps_then_state() {
        let mut target = fixture::target();
        assert_eq!(
            target.request_cleanup(true, fixture::user()),
            Err(DomainError::TargetInUse)
        );
        assert_eq!(
            target.request_cleanup(false, fixture::user()),
            Err(DomainError::TargetConfigurationInProgress)
        );

        let mut target = fixture::ready_target();
        target.request_cleanup(false, fixture::user()).unwrap();
        target.request_cleanup(true, fixture::user()).unwrap();

        assert!(matches!(
            unwrap(&target),
            [TargetEvent::TargetCleanupRequested(_)]
        ));
    }

    #[test]
    fn cleanup_requested_blocks_structural_changes() {
        let app = fixture::app_on(&fixture::target());
        let deployment = fixture::deployment(&app, Environment::Production);
        let mut target = fixture::ready_target();
        target.request_cleanup(false, fixture::user()).unwrap();
        drain(&mut target);

        assert_eq!(target.rename("other"), Err(DomainError::TargetCleanupRequested));
        assert_eq!(
            target.expose_services_automatically(TargetUrlRequirement::new(
                fixture::url("https://example.com"),
                true
            )),
            Err(DomainError::TargetCleanupRequested)
        );
        assert_eq!(target.expose_services_manually(), Err(DomainError::TargetCleanupRequested));
        assert_eq!(
            target.has_provider(ProviderConfigRequirement::new(ProviderConfig::default(), true)),
            Err(DomainError::TargetCleanupRequested)
        );
        assert_eq!(target.reconfigure(), Err(DomainError::TargetCleanupRequested));
        assert_eq!(target.check_availability(), Err(DomainError::TargetCleanupRequested));

        target.expose_entrypoints(
            app.id(),
            Environment::Production,
            &fixture::services(deployment.config()),
        );
        assert!(unwrap(&target).is_empty());
    }

    #[test]
    fn cleanup_strategy_requires_a_cleanup_request() {
        let mut target = fixture::ready_target();
        assert_eq!(target.cleanup_strategy(false), Err(DomainError::TargetCleanupNeeded));

        target.request_cleanup(false, fixture::user()).unwrap();
        assert_eq!(
            target.cleanup_strategy(true),
            Err(DomainError::RunningOrPendingDeployments)
        );
        assert_eq!(target.cleanup_strategy(false), Ok(CleanupStrategy::Default));
    }

    #[test]
    fn cleanup_strategy_skips_failed_targets() {
        let mut target = fixture::target();
        target
            .configured(
                target.current_version(),
                &TargetEntrypointsAssigned::new(),
                Some("unreachable".into()),
            )
            .unwrap();
        target.request_cleanup(false, fixture::user()).unwrap();

        assert_eq!(target.cleanup_strategy(false), Ok(CleanupStrategy::Skip));
    }

    #[test]
    fn app_cleanup_strategy() {
        let mut target = fixture::target();
        assert_eq!(
            target.app_cleanup_strategy(true, true),
            Err(DomainError::RunningOrPendingDeployments)
        );
        assert_eq!(target.app_cleanup_strategy(false, false), Ok(CleanupStrategy::Skip));
        assert_eq!(
            target.app_cleanup_strategy(false, true),
            Err(DomainError::TargetConfigurationInProgress)
        );

        target
            .configured(
                target.current_version(),
                &TargetEntrypointsAssigned::new(),
                Some("boom".into()),
            )
            .unwrap();
        assert_eq!(
            target.app_cleanup_strategy(false, true),
            Err(DomainError::TargetConfigurationFailed)
        );

        let mut target = fixture::ready_target();
        assert_eq!(target.app_cleanup_strategy(false, true), Ok(CleanupStrategy::Default));

        target.request_cleanup(false, fixture::user()).unwrap();
        assert_eq!(target.app_cleanup_strategy(true, true), Ok(CleanupStrategy::Skip));
    }

    #[test]
    fn delete_requires_cleanup_requested_and_done() {
        let mut target = fixture::ready_target();
        assert_eq!(target.delete(true), Err(DomainError::TargetCleanupNeeded));

        target.request_cleanup(false, fixture::user()).unwrap();
        assert_eq!(target.delete(false), Err(DomainError::TargetCleanupNeeded));

        target.delete(true).unwrap();
        assert!(matches!(
            unwrap(&target).last(),
            Some(TargetEvent::TargetDeleted(_))
        ));
    }

    #[test]
    fn should_round_trip_through_a_row() {
        let app = fixture::app_on(&fixture::target());
        let deployment = fixture::deployment(&app, Environment::Production);
        let mut target = fixture::ready_target();
        target.expose_entrypoints(
            app.id(),
            Environment::Production,
            &fixture::services(deployment.config()),
        );
        drain(&mut target);
        hydrate(&mut target, 4);

        let loaded = Target::from_scanner(&mut RowScanner::new(target.to_row().unwrap())).unwrap();

        assert_eq!(loaded, target);
    }

    proptest! {
        #[test]
        fn configured_with_another_epoch_is_always_outdated(offset in 1i64..1_000_000_000) {
            let mut target = fixture::target();
            let current = target.current_version();

            for reported in [current + Duration::nanoseconds(offset), current - Duration::nanoseconds(offset)] {
                prop_assert_eq!(
                    target.configured(reported, &TargetEntrypointsAssigned::new(), None),
                    Err(DomainError::TargetConfigurationOutdated)
                );
            }

            prop_assert_eq!(target.state().status(), TargetStatus::Configuring);
            prop_assert!(unwrap(&target).is_empty());
        }

        #[test]
        fn renaming_twice_emits_once(name in "[a-z]{1,12}") {
            let mut target = fixture::ready_target();
            prop_assume!(name != target.name());

            target.rename(name.clone()).unwrap();
            target.rename(name).unwrap();

            prop_assert_eq!(unwrap(&target).len(), 1);
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::aggregate::{self, hydrate};
use dockyard_core::{
    Action, AggregateRoot, DomainResult, Emitter, EventSourced, RowBuilder, ScanError, Scanner,
    UserId,
};
use dockyard_events::Event;

use crate::credentials::Credentials;
use crate::ids::RegistryId;
use crate::requirement::RegistryUrlRequirement;
use crate::url::Url;

/// Custom registry images are pulled from.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    emitter: Emitter<RegistryEvent>,
    id: RegistryId,
    name: String,
    url: Url,
    credentials: Option<Credentials>,
    created: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCreated {
    pub id: RegistryId,
    pub name: String,
    pub url: Url,
    pub created: Action<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRenamed {
    pub id: RegistryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryUrlChanged {
    pub id: RegistryId,
    pub url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentialsChanged {
    pub id: RegistryId,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentialsRemoved {
    pub id: RegistryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDeleted {
    pub id: RegistryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    RegistryCreated(RegistryCreated),
    RegistryRenamed(RegistryRenamed),
    RegistryUrlChanged(RegistryUrlChanged),
    RegistryCredentialsChanged(RegistryCredentialsChanged),
    RegistryCredentialsRemoved(RegistryCredentialsRemoved),
    RegistryDeleted(RegistryDeleted),
}

impl Event for RegistryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RegistryEvent::RegistryCreated(_) => "deployment.registry.created",
            RegistryEvent::RegistryRenamed(_) => "deployment.registry.renamed",
            RegistryEvent::RegistryUrlChanged(_) => "deployment.registry.url_changed",
            RegistryEvent::RegistryCredentialsChanged(_) => {
                "deployment.registry.credentials_changed"
            }
            RegistryEvent::RegistryCredentialsRemoved(_) => {
                "deployment.registry.credentials_removed"
            }
            RegistryEvent::RegistryDeleted(_) => "deployment.registry.deleted",
        }
    }
}

impl Registry {
    /// Declare a new registry at an available url.
    pub fn new(
        name: impl Into<String>,
        url_requirement: RegistryUrlRequirement,
        created_by: UserId,
    ) -> DomainResult<Self> {
        let url = url_requirement.met()?;
        let created = RegistryCreated {
            id: RegistryId::new(),
            name: name.into(),
            url,
            created: Action::new(created_by),
        };

        let mut registry = Self::from_created(&created);
        aggregate::store(&mut registry, RegistryEvent::RegistryCreated(created));

        Ok(registry)
    }

    fn from_created(e: &RegistryCreated) -> Self {
        Self {
            emitter: Emitter::default(),
            id: e.id.clone(),
            name: e.name.clone(),
            url: e.url.clone(),
            credentials: None,
            created: e.created.clone(),
        }
    }

    /// Rebuild a persisted registry.
    ///
    /// Columns: id, name, url, username, password, created_at, created_by, version.
    pub fn from_scanner<S: Scanner>(scanner: &mut S) -> Result<Self, ScanError> {
        let id: RegistryId = scanner.scan("id")?;
        let name: String = scanner.scan("name")?;
        let url: Url = scanner.scan("url")?;
        let username: Option<String> = scanner.scan("username")?;
        let password: Option<String> = scanner.scan("password")?;
        let created_at: DateTime<Utc> = scanner.scan("created_at")?;
        let created_by: UserId = scanner.scan("created_by")?;
        let version: u64 = scanner.scan("version")?;
        scanner.finish()?;

        let mut registry = Self {
            emitter: Emitter::default(),
            id,
            name,
            url,
            credentials: username.map(|u| Credentials::new(u, password.unwrap_or_default())),
            created: Action::from_parts(created_by, created_at),
        };
        hydrate(&mut registry, version);

        Ok(registry)
    }

    /// Columns in the order read by [`Registry::from_scanner`].
    pub fn to_row(&self) -> Result<Vec<Value>, ScanError> {
        Ok(RowBuilder::new()
            .push(&self.id)?
            .push(&self.name)?
            .push(&self.url)?
            .push(&self.credentials.as_ref().map(Credentials::username))?
            .push(&self.credentials.as_ref().map(Credentials::password))?
            .push(&self.created.at())?
            .push(self.created.by())?
            .push(&self.version())?
            .build())
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        let name = name.into();

        if self.name == name {
            return;
        }

        aggregate::store(
            self,
            RegistryEvent::RegistryRenamed(RegistryRenamed {
                id: self.id.clone(),
                name,
            }),
        );
    }

    pub fn has_url(&mut self, url_requirement: RegistryUrlRequirement) -> DomainResult<()> {
        let url = url_requirement.met()?;

        if self.url == url {
            return Ok(());
        }

        aggregate::store(
            self,
            RegistryEvent::RegistryUrlChanged(RegistryUrlChanged {
                id: self.id.clone(),
                url,
            }),
        );

        Ok(())
    }

    pub fn use_authentication(&mut self, credentials: Credentials) {
        if self.credentials.as_ref() == Some(&credentials) {
            return;
        }

        aggregate::store(
            self,
            RegistryEvent::RegistryCredentialsChanged(RegistryCredentialsChanged {
                id: self.id.clone(),
                credentials,
            }),
        );
    }

    pub fn remove_authentication(&mut self) {
        if self.credentials.is_none() {
            return;
        }

        aggregate::store(
            self,
            RegistryEvent::RegistryCredentialsRemoved(RegistryCredentialsRemoved {
                id: self.id.clone(),
            }),
        );
    }

    pub fn delete(&mut self) {
        aggregate::store(
            self,
            RegistryEvent::RegistryDeleted(RegistryDeleted {
                id: self.id.clone(),
            }),
        );
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn created(&self) -> &Action<UserId> {
        &self.created
    }
}

impl AggregateRoot for Registry {
    type Id = RegistryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.emitter.version()
    }
}

impl EventSourced for Registry {
    type Event = RegistryEvent;

    fn emitter(&self) -> &Emitter<RegistryEvent> {
        &self.emitter
    }

    fn emitter_mut(&mut self) -> &mut Emitter<RegistryEvent> {
        &mut self.emitter
    }

    fn apply(&mut self, event: &RegistryEvent) {
        match event {
            RegistryEvent::RegistryCreated(e) => {
                let emitter = std::mem::take(&mut self.emitter);
                *self = Self {
                    emitter,
                    ..Self::from_created(e)
                };
            }
            RegistryEvent::RegistryRenamed(e) => self.name = e.name.clone(),
            RegistryEvent::RegistryUrlChanged(e) => self.url = e.url.clone(),
            RegistryEvent::RegistryCredentialsChanged(e) => {
                self.credentials = Some(e.credentials.clone())
            }
            RegistryEvent::RegistryCredentialsRemoved(_) => self.credentials = None,
            RegistryEvent::RegistryDeleted(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::{DomainError, RowScanner};
    use dockyard_core::aggregate::unwrap;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    fn registry() -> Registry {
        let mut registry = Registry::new(
            "registry",
            RegistryUrlRequirement::new(url("https://registry.example.com"), true),
            UserId::from("uid"),
        )
        .unwrap();
        aggregate::drain(&mut registry);
        registry
    }

    #[test]
    fn should_require_an_available_url() {
        let result = Registry::new(
            "registry",
            RegistryUrlRequirement::new(url("https://registry.example.com"), false),
            UserId::from("uid"),
        );

        assert_eq!(result.err(), Some(DomainError::UrlAlreadyTaken));
    }

    #[test]
    fn should_be_created() {
        let registry = Registry::new(
            "registry",
            RegistryUrlRequirement::new(url("https://registry.example.com"), true),
            UserId::from("uid"),
        )
        .unwrap();

        assert_eq!(registry.name(), "registry");
        assert_eq!(registry.url(), &url("https://registry.example.com"));
        assert!(registry.credentials().is_none());

        match unwrap(&registry) {
            [RegistryEvent::RegistryCreated(e)] => {
                assert_eq!(&e.id, registry.id());
                assert_eq!(e.created.by(), &UserId::from("uid"));
            }
            other => panic!("Expected RegistryCreated, got {other:?}"),
        }
    }

    #[test]
    fn should_rename_only_when_different() {
        let mut registry = registry();

        registry.rename("registry");
        assert!(unwrap(&registry).is_empty());

        registry.rename("new name");
        registry.rename("new name");
        assert_eq!(unwrap(&registry).len(), 1);
        assert_eq!(registry.name(), "new name");
    }

    #[test]
    fn should_change_the_url_only_when_different_and_available() {
        let mut registry = registry();

        assert_eq!(
            registry.has_url(RegistryUrlRequirement::new(url("https://other.com"), false)),
            Err(DomainError::UrlAlreadyTaken)
        );
        registry
            .has_url(RegistryUrlRequirement::new(url("https://registry.example.com"), true))
            .unwrap();
        assert!(unwrap(&registry).is_empty());

        registry
            .has_url(RegistryUrlRequirement::new(url("https://other.com"), true))
            .unwrap();
        assert!(matches!(
            unwrap(&registry),
            [RegistryEvent::RegistryUrlChanged(_)]
        ));
    }

    #[test]
    fn should_manage_authentication() {
        let mut registry = registry();

        registry.remove_authentication();
        assert!(unwrap(&registry).is_empty());

        registry.use_authentication(Credentials::new("user", "pass"));
        registry.use_authentication(Credentials::new("user", "pass"));
        assert_eq!(unwrap(&registry).len(), 1);

        registry.use_authentication(Credentials::new("user", "other"));
        registry.remove_authentication();
        registry.remove_authentication();
        assert_eq!(unwrap(&registry).len(), 3);
        assert!(registry.credentials().is_none());
    }

    #[test]
    fn should_be_deleted() {
        let mut registry = registry();

        registry.delete();

        assert!(matches!(unwrap(&registry), [RegistryEvent::RegistryDeleted(_)]));
    }

    #[test]
    fn should_round_trip_through_a_row() {
        let mut registry = registry();
        registry.use_authentication(Credentials::new("user", "pass"));
        aggregate::drain(&mut registry);
        hydrate(&mut registry, 3);

        let loaded = Registry::from_scanner(&mut RowScanner::new(registry.to_row().unwrap())).unwrap();

        assert_eq!(loaded, registry);
        assert_eq!(loaded.version(), 3);
    }
}

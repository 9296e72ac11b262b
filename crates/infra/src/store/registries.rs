use dockyard_core::AggregateRoot;
use dockyard_deployment::{
    RegistriesReader, RegistriesWriter, Registry, RegistryId, RegistryUrlRequirement,
    StoreResult, Url,
};

use super::InMemoryStore;

#[async_trait::async_trait]
impl RegistriesReader for InMemoryStore {
    async fn check_url_availability(
        &self,
        url: &Url,
        excluding: Option<&RegistryId>,
    ) -> StoreResult<RegistryUrlRequirement> {
        let taken = self
            .registries
            .all()?
            .iter()
            .filter(|r| Some(r.id()) != excluding)
            .any(|r| r.url() == url);

        Ok(RegistryUrlRequirement::new(url.clone(), !taken))
    }

    async fn get_by_id(&self, id: &RegistryId) -> StoreResult<Registry> {
        self.registries.get(id)
    }

    async fn get_all(&self) -> StoreResult<Vec<Registry>> {
        let mut registries = self.registries.all()?;
        registries.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(registries)
    }
}

#[async_trait::async_trait]
impl RegistriesWriter for InMemoryStore {
    async fn write(&self, registry: &mut Registry) -> StoreResult<()> {
        self.commit(&self.registries, registry)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dockyard_core::{DomainError, UserId};
    use dockyard_deployment::StoreError;

    use super::*;
    use crate::store::DomainEventBus;

    async fn registry(store: &InMemoryStore, name: &str, raw_url: &str) -> Registry {
        let url = Url::parse(raw_url).unwrap();
        let requirement = store.check_url_availability(&url, None).await.unwrap();
        let mut registry = Registry::new(name, requirement, UserId::from("john")).unwrap();
        store.write(&mut registry).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn urls_are_unique_among_registries() {
        let store = InMemoryStore::new(Arc::new(DomainEventBus::new()));
        let existing = registry(&store, "docker hub", "https://index.docker.io").await;
        let url = Url::parse("https://index.docker.io").unwrap();

        let requirement = store.check_url_availability(&url, None).await.unwrap();
        assert_eq!(requirement.check(), Err(DomainError::UrlAlreadyTaken));

        let requirement = store
            .check_url_availability(&url, Some(existing.id()))
            .await
            .unwrap();
        assert!(requirement.check().is_ok());
    }

    #[tokio::test]
    async fn registries_are_listed_by_name_and_removed_once_deleted() {
        let store = InMemoryStore::new(Arc::new(DomainEventBus::new()));
        registry(&store, "quay", "https://quay.io").await;
        let mut hub = registry(&store, "docker hub", "https://index.docker.io").await;

        let names: Vec<String> = store
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["docker hub", "quay"]);

        hub.delete();
        store.write(&mut hub).await.unwrap();

        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert!(matches!(
            store.get_by_id(hub.id()).await,
            Err(StoreError::NotFound)
        ));
    }
}

use dockyard_core::AggregateRoot;
use dockyard_deployment::{
    ProviderConfig, ProviderConfigRequirement, StoreResult, Target, TargetId,
    TargetUrlRequirement, TargetsReader, TargetsWriter, Url,
};

use super::InMemoryStore;

#[async_trait::async_trait]
impl TargetsReader for InMemoryStore {
    async fn check_url_availability(
        &self,
        url: &Url,
        excluding: Option<&TargetId>,
    ) -> StoreResult<TargetUrlRequirement> {
        let root = url.root();
        let taken = self
            .targets
            .all()?
            .iter()
            .filter(|t| Some(t.id()) != excluding)
            .any(|t| t.url() == Some(&root));

        Ok(TargetUrlRequirement::new(url.clone(), !taken))
    }

    async fn check_config_availability(
        &self,
        config: &ProviderConfig,
        excluding: Option<&TargetId>,
    ) -> StoreResult<ProviderConfigRequirement> {
        let taken = self
            .targets
            .all()?
            .iter()
            .filter(|t| Some(t.id()) != excluding)
            .any(|t| t.provider().same_host(config));

        Ok(ProviderConfigRequirement::new(config.clone(), !taken))
    }

    async fn get_by_id(&self, id: &TargetId) -> StoreResult<Target> {
        self.targets.get(id)
    }
}

#[async_trait::async_trait]
impl TargetsWriter for InMemoryStore {
    async fn write(&self, target: &mut Target) -> StoreResult<()> {
        self.commit(&self.targets, target)
    }
}

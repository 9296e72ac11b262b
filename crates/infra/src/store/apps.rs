use dockyard_core::AggregateRoot;
use dockyard_deployment::{
    App, AppId, AppName, AppsReader, AppsWriter, Environment, EnvironmentConfig,
    EnvironmentConfigRequirement, StoreError, StoreResult, TargetId,
};

use super::InMemoryStore;

impl InMemoryStore {
    /// A name is available for an environment as long as no other app with the
    /// same name runs that environment on the same target. Targets being
    /// cleaned up do not count as existing.
    fn naming_requirement(
        &self,
        apps: &[App],
        name: &AppName,
        excluding: Option<&AppId>,
        environment: Environment,
        config: EnvironmentConfig,
    ) -> StoreResult<EnvironmentConfigRequirement> {
        let target_exists = match self.targets.get(config.target()) {
            Ok(target) => target.cleanup_requested().is_none(),
            Err(StoreError::NotFound) => false,
            Err(err) => return Err(err),
        };
        let available = !apps
            .iter()
            .filter(|app| Some(app.id()) != excluding && app.name() == name)
            .any(|app| app.environment_config(environment).target() == config.target());

        Ok(EnvironmentConfigRequirement::new(
            config,
            target_exists,
            available,
        ))
    }
}

#[async_trait::async_trait]
impl AppsReader for InMemoryStore {
    async fn check_app_naming_availability(
        &self,
        name: &AppName,
        production: EnvironmentConfig,
        staging: EnvironmentConfig,
    ) -> StoreResult<(EnvironmentConfigRequirement, EnvironmentConfigRequirement)> {
        let apps = self.apps.all()?;

        Ok((
            self.naming_requirement(&apps, name, None, Environment::Production, production)?,
            self.naming_requirement(&apps, name, None, Environment::Staging, staging)?,
        ))
    }

    async fn check_app_naming_availability_by_id(
        &self,
        id: &AppId,
        production: Option<EnvironmentConfig>,
        staging: Option<EnvironmentConfig>,
    ) -> StoreResult<(
        Option<EnvironmentConfigRequirement>,
        Option<EnvironmentConfigRequirement>,
    )> {
        let app = self.apps.get(id)?;
        let apps = self.apps.all()?;

        let requirement = |environment, config| {
            self.naming_requirement(&apps, app.name(), Some(id), environment, config)
        };

        let production = production
            .map(|config| requirement(Environment::Production, config))
            .transpose()?;
        let staging = staging
            .map(|config| requirement(Environment::Staging, config))
            .transpose()?;

        Ok((production, staging))
    }

    async fn has_apps_on_target(&self, target: &TargetId) -> StoreResult<bool> {
        Ok(self.apps.all()?.iter().any(|app| {
            app.production().target() == target
                || app.staging().target() == target
                || app.history().iter().any(|(_, t)| t == target)
        }))
    }

    async fn get_by_id(&self, id: &AppId) -> StoreResult<App> {
        self.apps.get(id)
    }
}

#[async_trait::async_trait]
impl AppsWriter for InMemoryStore {
    async fn write(&self, app: &mut App) -> StoreResult<()> {
        let id = app.id().clone();
        let deleted = dockyard_core::aggregate::unwrap(app)
            .iter()
            .any(|event| matches!(event, dockyard_deployment::AppEvent::AppDeleted(_)));

        self.commit(&self.apps, app)?;

        if deleted {
            let purged = self.deployments.purge(|deployment| deployment.app_id() == &id)?;
            tracing::debug!(app_id = %id, purged, "deployments of deleted app removed");
        }

        Ok(())
    }
}

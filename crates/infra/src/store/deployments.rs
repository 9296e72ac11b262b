use chrono::{DateTime, Utc};

use dockyard_core::AggregateRoot;
use dockyard_deployment::{
    AppId, Deployment, DeploymentId, DeploymentNumber, DeploymentsReader, DeploymentsWriter,
    Environment, FailCriteria, StoreResult, TargetId,
};

use super::InMemoryStore;

fn is_ongoing(deployment: &Deployment) -> bool {
    !deployment.state().status().is_terminal()
}

#[async_trait::async_trait]
impl DeploymentsReader for InMemoryStore {
    async fn get_by_id(&self, id: &DeploymentId) -> StoreResult<Deployment> {
        self.deployments.get(id)
    }

    async fn get_next_deployment_number(&self, app: &AppId) -> StoreResult<DeploymentNumber> {
        let last = self
            .deployments
            .all()?
            .iter()
            .filter(|d| d.config().app_id() == app)
            .map(|d| d.id().deployment_number())
            .max();

        Ok(last.map_or(DeploymentNumber::FIRST, DeploymentNumber::next))
    }

    async fn get_running_or_pending_deployments_count(&self, app: &AppId) -> StoreResult<u32> {
        let count = self
            .deployments
            .all()?
            .iter()
            .filter(|d| d.config().app_id() == app && is_ongoing(d))
            .count();

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn has_running_or_pending_deployments_on_target(
        &self,
        target: &TargetId,
    ) -> StoreResult<bool> {
        Ok(self
            .deployments
            .all()?
            .iter()
            .any(|d| d.config().target() == target && is_ongoing(d)))
    }

    async fn has_deployments_on_app_target_env(
        &self,
        app: &AppId,
        target: &TargetId,
        environment: Environment,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<(bool, bool)> {
        let deployments = self.deployments.all()?;
        let matching = deployments.iter().filter(|d| {
            let config = d.config();
            let at = d.requested().at();

            config.app_id() == app
                && config.target() == target
                && config.environment() == environment
                && at >= from
                && at <= to
        });

        let (mut ongoing, mut successful) = (false, false);

        for deployment in matching {
            ongoing |= is_ongoing(deployment);
            successful |= deployment.state().status()
                == dockyard_deployment::DeploymentStatus::Succeeded;
        }

        Ok((ongoing, successful))
    }
}

#[async_trait::async_trait]
impl DeploymentsWriter for InMemoryStore {
    async fn write(&self, deployment: &mut Deployment) -> StoreResult<()> {
        self.commit(&self.deployments, deployment)
    }

    async fn fail_deployments(&self, reason: &str, criteria: &FailCriteria) -> StoreResult<usize> {
        let mut failed = 0;

        for mut deployment in self.deployments.all()? {
            if !criteria.matches(&deployment) {
                continue;
            }

            // Only reached by deployments which already ended.
            if deployment.fail(reason).is_err() {
                continue;
            }

            self.commit(&self.deployments, &mut deployment)?;
            failed += 1;
        }

        if failed > 0 {
            tracing::info!(reason, failed, ?criteria, "deployments failed");
        }

        Ok(failed)
    }
}

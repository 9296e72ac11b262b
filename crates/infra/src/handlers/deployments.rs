use serde::{Deserialize, Serialize};

use dockyard_core::{AggregateRoot, DomainError, UserId};
use dockyard_deployment::{
    App, AppId, AppsReader, Deployment, DeploymentId, DeploymentNumber, DeploymentStatus,
    DeploymentsReader, DeploymentsWriter, Environment, FailCriteria, Provider, RegistriesReader,
    SourceData, TargetsReader,
};
use dockyard_events::Command;

use super::{Context, found};
use crate::error::{HandlerError, HandlerResult};
use crate::scheduler::JobOutcome;

/// Error code of deployments still running when the runtime starts.
pub const SERVER_RESET: &str = "server_reset";

/// Error code of deployments whose job stopped halfway and was retried.
pub const INTERRUPTED: &str = "deployment_interrupted";

/// Fail fast if the target of `environment` cannot take a deployment now.
async fn ensure_target_available(
    ctx: &Context,
    app: &App,
    environment: Environment,
) -> HandlerResult<()> {
    let target = ctx
        .targets
        .get_by_id(app.environment_config(environment).target())
        .await?;

    Ok(target.check_availability()?)
}

async fn persist(ctx: &Context, mut deployment: Deployment) -> HandlerResult<DeploymentId> {
    ctx.deployments.write(&mut deployment).await?;

    tracing::info!(
        deployment_id = %deployment.id(),
        environment = %deployment.config().environment(),
        target_id = %deployment.config().target(),
        "deployment queued"
    );

    Ok(deployment.id().clone())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDeployment {
    pub app_id: AppId,
    pub environment: Environment,
    pub source: SourceData,
    pub requested_by: UserId,
}

impl QueueDeployment {
    pub const NAME: &'static str = "deployment.command.queue_deployment";
}

impl Command for QueueDeployment {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.app_id.to_string()
    }
}

pub async fn queue_deployment(
    ctx: &Context,
    cmd: QueueDeployment,
) -> HandlerResult<DeploymentId> {
    let app = ctx.apps.get_by_id(&cmd.app_id).await?;
    ensure_target_available(ctx, &app, cmd.environment).await?;

    let number = ctx.deployments.get_next_deployment_number(&cmd.app_id).await?;
    let deployment = app.new_deployment(number, cmd.source, cmd.environment, cmd.requested_by)?;

    persist(ctx, deployment).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Redeploy {
    pub app_id: AppId,
    pub deployment_number: DeploymentNumber,
    pub requested_by: UserId,
}

impl Redeploy {
    pub const NAME: &'static str = "deployment.command.redeploy";
}

impl Command for Redeploy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.app_id.to_string()
    }
}

async fn load_source(
    ctx: &Context,
    app_id: &AppId,
    number: DeploymentNumber,
) -> HandlerResult<(App, Deployment)> {
    let app = ctx.apps.get_by_id(app_id).await?;
    let source = ctx
        .deployments
        .get_by_id(&DeploymentId::new(app_id.clone(), number))
        .await
        .map_err(HandlerError::from)
        .map_err(|err| {
            if err.is(DomainError::NotFound) {
                HandlerError::Domain(DomainError::InvalidSourceDeployment)
            } else {
                err
            }
        })?;

    Ok((app, source))
}

pub async fn redeploy(ctx: &Context, cmd: Redeploy) -> HandlerResult<DeploymentId> {
    let (app, source) = load_source(ctx, &cmd.app_id, cmd.deployment_number).await?;
    ensure_target_available(ctx, &app, source.config().environment()).await?;

    let number = ctx.deployments.get_next_deployment_number(&cmd.app_id).await?;
    let deployment = app.redeploy(&source, number, cmd.requested_by)?;

    persist(ctx, deployment).await
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promote {
    pub app_id: AppId,
    pub deployment_number: DeploymentNumber,
    pub requested_by: UserId,
}

impl Promote {
    pub const NAME: &'static str = "deployment.command.promote";
}

impl Command for Promote {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.app_id.to_string()
    }
}

pub async fn promote(ctx: &Context, cmd: Promote) -> HandlerResult<DeploymentId> {
    let (app, source) = load_source(ctx, &cmd.app_id, cmd.deployment_number).await?;
    ensure_target_available(ctx, &app, Environment::Production).await?;

    let number = ctx.deployments.get_next_deployment_number(&cmd.app_id).await?;
    let deployment = app.promote(&source, number, cmd.requested_by)?;

    persist(ctx, deployment).await
}

/// Run a pending deployment on its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deploy {
    pub id: DeploymentId,
}

impl Deploy {
    pub const NAME: &'static str = "deployment.command.deploy";
}

impl Command for Deploy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    // Shares the app resource so cleanups wait for running deployments.
    fn resource_id(&self) -> String {
        self.id.app_id().to_string()
    }
}

pub async fn deploy(ctx: &Context, cmd: Deploy) -> HandlerResult<JobOutcome> {
    let Some(mut deployment) = found(ctx.deployments.get_by_id(&cmd.id).await)? else {
        return Ok(JobOutcome::Success);
    };

    match deployment.state().status() {
        DeploymentStatus::Pending => {}
        // A previous attempt stopped before recording how it ended.
        DeploymentStatus::Running => {
            deployment.fail(INTERRUPTED)?;
            ctx.deployments.write(&mut deployment).await?;

            tracing::warn!(deployment_id = %cmd.id, "interrupted deployment failed");
            return Ok(JobOutcome::Success);
        }
        _ => {
            tracing::debug!(deployment_id = %cmd.id, "deployment already handled");
            return Ok(JobOutcome::Success);
        }
    }

    let cleaning_up = found(ctx.apps.get_by_id(cmd.id.app_id()).await)?
        .is_none_or(|app| app.cleanup_requested().is_some());
    let target = found(ctx.targets.get_by_id(deployment.config().target()).await)?;
    let availability = match (&target, cleaning_up) {
        (_, true) => Err(DomainError::AppCleanupRequested),
        (Some(target), false) => target.check_availability(),
        (None, false) => Err(DomainError::NotFound),
    };

    let target = match (availability, target) {
        (Err(DomainError::TargetConfigurationInProgress), _) => {
            return Ok(JobOutcome::Delay(ctx.retry_later));
        }
        (Err(error), _) => {
            deployment.fail(error.code())?;
            ctx.deployments.write(&mut deployment).await?;

            tracing::warn!(deployment_id = %cmd.id, code = error.code(), "deployment cannot run, failed");
            return Ok(JobOutcome::Success);
        }
        (Ok(()), Some(target)) => target,
        (Ok(()), None) => return Err(DomainError::NotFound.into()),
    };

    let registries = ctx.registries.get_all().await?;

    deployment.has_started()?;
    ctx.deployments.write(&mut deployment).await?;

    let result = ctx.provider.deploy(&deployment, &target, &registries).await;

    match result {
        Ok(services) => {
            deployment.has_ended(Some(services), None)?;
            tracing::info!(deployment_id = %cmd.id, "deployment succeeded");
        }
        Err(err) => {
            tracing::warn!(deployment_id = %cmd.id, error = %err, "deployment failed");
            deployment.has_ended(None, Some(err.to_string()))?;
        }
    }

    ctx.deployments.write(&mut deployment).await?;

    Ok(JobOutcome::Success)
}

/// Fail every running deployment. Nothing can still be running them when the
/// runtime starts, so they will need a redeploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailRunningDeployments {
    pub reason: String,
}

impl Default for FailRunningDeployments {
    fn default() -> Self {
        Self {
            reason: SERVER_RESET.to_string(),
        }
    }
}

impl FailRunningDeployments {
    pub const NAME: &'static str = "deployment.command.fail_running_deployments";
}

impl Command for FailRunningDeployments {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        String::new()
    }
}

pub async fn fail_running_deployments(
    ctx: &Context,
    cmd: FailRunningDeployments,
) -> HandlerResult<usize> {
    let criteria = FailCriteria {
        status: Some(DeploymentStatus::Running),
        ..FailCriteria::default()
    };

    Ok(ctx.deployments.fail_deployments(&cmd.reason, &criteria).await?)
}

/// Fail the pending deployments matching `criteria` because of `reason`.
pub async fn fail_pending_deployments(
    ctx: &Context,
    reason: DomainError,
    criteria: FailCriteria,
) -> HandlerResult<usize> {
    let criteria = FailCriteria {
        status: Some(DeploymentStatus::Pending),
        ..criteria
    };

    Ok(ctx.deployments.fail_deployments(reason.code(), &criteria).await?)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::{AggregateRoot, DomainError, UserId};
use dockyard_deployment::{
    AppsReader, DeploymentsReader, Provider, Target, TargetEntrypointsAssigned, TargetId,
    TargetsReader, TargetsWriter, Url,
};
use dockyard_events::Command;

use super::{Context, Patch, found};
use crate::error::{HandlerError, HandlerResult};
use crate::scheduler::JobOutcome;

/// Map a provider failure, keeping domain errors raised while reading the payload.
fn provider_error(err: anyhow::Error) -> HandlerError {
    match err.downcast::<DomainError>() {
        Ok(error) => HandlerError::on_field("provider")(error),
        Err(err) => HandlerError::Infrastructure(err),
    }
}

fn parse_url(raw: &str) -> HandlerResult<Url> {
    Url::parse(raw).map_err(HandlerError::on_field("url"))
}

async fn load(ctx: &Context, id: &TargetId) -> HandlerResult<Target> {
    Ok(ctx.targets.get_by_id(id).await?)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTarget {
    pub name: String,
    pub url: Option<String>,
    /// Raw provider payload, validated by the provider.
    pub provider: Value,
    pub created_by: UserId,
}

impl CreateTarget {
    pub const NAME: &'static str = "deployment.command.create_target";
}

impl Command for CreateTarget {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.name.clone()
    }
}

pub async fn create_target(ctx: &Context, cmd: CreateTarget) -> HandlerResult<TargetId> {
    let url_requirement = match cmd.url.as_deref() {
        Some(raw) => {
            let requirement = ctx
                .targets
                .check_url_availability(&parse_url(raw)?, None)
                .await?;
            requirement.check().map_err(HandlerError::on_field("url"))?;
            Some(requirement)
        }
        None => None,
    };

    let config = ctx
        .provider
        .prepare(cmd.provider, None)
        .await
        .map_err(provider_error)?;
    let config_requirement = ctx.targets.check_config_availability(&config, None).await?;
    config_requirement
        .check()
        .map_err(HandlerError::on_field("provider"))?;

    let mut target = Target::new(cmd.name, url_requirement, config_requirement, cmd.created_by)?;
    ctx.targets.write(&mut target).await?;

    tracing::info!(target_id = %target.id(), provider = %target.provider(), "target created");

    Ok(target.id().clone())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTarget {
    pub id: TargetId,
    pub name: Option<String>,
    pub url: Option<Patch<String>>,
    pub provider: Option<Value>,
}

impl UpdateTarget {
    pub const NAME: &'static str = "deployment.command.update_target";
}

impl Command for UpdateTarget {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn update_target(ctx: &Context, cmd: UpdateTarget) -> HandlerResult<()> {
    let mut target = load(ctx, &cmd.id).await?;

    if let Some(name) = cmd.name {
        target.rename(name)?;
    }

    match cmd.url {
        Some(Patch::Set(raw)) => {
            let requirement = ctx
                .targets
                .check_url_availability(&parse_url(&raw)?, Some(&cmd.id))
                .await?;
            requirement.check().map_err(HandlerError::on_field("url"))?;
            target.expose_services_automatically(requirement)?;
        }
        Some(Patch::Remove) => target.expose_services_manually()?,
        None => {}
    }

    if let Some(payload) = cmd.provider {
        let config = ctx
            .provider
            .prepare(payload, Some(target.provider()))
            .await
            .map_err(provider_error)?;
        let requirement = ctx
            .targets
            .check_config_availability(&config, Some(&cmd.id))
            .await?;
        requirement
            .check()
            .map_err(HandlerError::on_field("provider"))?;
        target.has_provider(requirement)?;
    }

    ctx.targets.write(&mut target).await?;

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconfigureTarget {
    pub id: TargetId,
}

impl ReconfigureTarget {
    pub const NAME: &'static str = "deployment.command.reconfigure_target";
}

impl Command for ReconfigureTarget {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn reconfigure_target(ctx: &Context, cmd: ReconfigureTarget) -> HandlerResult<()> {
    let mut target = load(ctx, &cmd.id).await?;
    target.reconfigure()?;
    ctx.targets.write(&mut target).await?;
    Ok(())
}

/// Apply the target configuration for the given epoch through the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureTarget {
    pub id: TargetId,
    pub version: DateTime<Utc>,
}

impl ConfigureTarget {
    pub const NAME: &'static str = "deployment.command.configure_target";
}

impl Command for ConfigureTarget {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn configure_target(ctx: &Context, cmd: ConfigureTarget) -> HandlerResult<JobOutcome> {
    let Some(target) = found(ctx.targets.get_by_id(&cmd.id).await)? else {
        return Ok(JobOutcome::Success);
    };

    if target.is_outdated(cmd.version) {
        tracing::debug!(target_id = %cmd.id, "configuration already superseded, skipped");
        return Ok(JobOutcome::Success);
    }

    let (assigned, err) = match ctx.provider.setup(&target).await {
        Ok(assigned) => (assigned, None),
        Err(err) => {
            tracing::warn!(target_id = %cmd.id, error = %err, "target configuration failed");
            (TargetEntrypointsAssigned::new(), Some(err.to_string()))
        }
    };

    // The provider may have been slow: report on a fresh copy.
    let mut target = load(ctx, &cmd.id).await?;

    match target.configured(cmd.version, &assigned, err) {
        Ok(()) => {}
        Err(DomainError::TargetConfigurationOutdated) => {
            tracing::warn!(target_id = %cmd.id, version = %cmd.version, "outdated configuration report discarded");
            return Ok(JobOutcome::Success);
        }
        Err(err) => return Err(err.into()),
    }

    ctx.targets.write(&mut target).await?;

    tracing::info!(target_id = %cmd.id, status = ?target.state().status(), "target configured");

    Ok(JobOutcome::Success)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTargetCleanup {
    pub id: TargetId,
    pub requested_by: UserId,
}

impl RequestTargetCleanup {
    pub const NAME: &'static str = "deployment.command.request_target_cleanup";
}

impl Command for RequestTargetCleanup {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn request_target_cleanup(
    ctx: &Context,
    cmd: RequestTargetCleanup,
) -> HandlerResult<()> {
    let mut target = load(ctx, &cmd.id).await?;
    let has_apps = ctx.apps.has_apps_on_target(&cmd.id).await?;

    target.request_cleanup(has_apps, cmd.requested_by)?;
    ctx.targets.write(&mut target).await?;

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupTarget {
    pub id: TargetId,
}

impl CleanupTarget {
    pub const NAME: &'static str = "deployment.command.cleanup_target";
}

impl Command for CleanupTarget {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn cleanup_target(ctx: &Context, cmd: CleanupTarget) -> HandlerResult<JobOutcome> {
    let Some(target) = found(ctx.targets.get_by_id(&cmd.id).await)? else {
        return Ok(JobOutcome::Success);
    };

    let has_running = ctx
        .deployments
        .has_running_or_pending_deployments_on_target(&cmd.id)
        .await?;

    let strategy = target.cleanup_strategy(has_running)?;

    ctx.provider.cleanup_target(&target, strategy).await?;

    tracing::info!(target_id = %cmd.id, ?strategy, "target cleaned up");

    Ok(JobOutcome::Success)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteTarget {
    pub id: TargetId,
}

impl DeleteTarget {
    pub const NAME: &'static str = "deployment.command.delete_target";
}

impl Command for DeleteTarget {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

/// Queued after the cleanup with `WaitForOthersResourceId`, so every job on the
/// target has completed by the time it runs.
pub async fn delete_target(ctx: &Context, cmd: DeleteTarget) -> HandlerResult<JobOutcome> {
    let Some(mut target) = found(ctx.targets.get_by_id(&cmd.id).await)? else {
        return Ok(JobOutcome::Success);
    };

    ctx.provider.remove_configuration(&target).await?;

    target.delete(true)?;
    ctx.targets.write(&mut target).await?;

    tracing::info!(target_id = %cmd.id, "target deleted");

    Ok(JobOutcome::Success)
}

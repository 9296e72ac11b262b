use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dockyard_core::{AggregateRoot, UserId};
use dockyard_deployment::{
    App, AppId, AppName, AppsReader, AppsWriter, DeploymentsReader, Environment,
    EnvironmentConfig, Provider, ServicesEnv, TargetId, TargetsReader, Url, VersionControl,
};
use dockyard_events::Command;

use super::{Context, Patch, found};
use crate::error::{HandlerError, HandlerResult};
use crate::scheduler::JobOutcome;

/// Where an environment runs, with optional variables per service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInput {
    pub target: TargetId,
    #[serde(default)]
    pub vars: Option<ServicesEnv>,
}

impl EnvironmentInput {
    fn into_config(self) -> EnvironmentConfig {
        let mut config = EnvironmentConfig::new(self.target);

        if let Some(vars) = self.vars {
            config.has_environment_variables(vars);
        }

        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionControlInput {
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl VersionControlInput {
    fn into_version_control(self) -> HandlerResult<VersionControl> {
        let url = Url::parse(&self.url).map_err(HandlerError::on_field("version_control"))?;
        let mut vcs = VersionControl::new(url);

        if let Some(token) = self.token {
            vcs.authenticated(token);
        }

        Ok(vcs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApp {
    pub name: String,
    pub production: EnvironmentInput,
    pub staging: EnvironmentInput,
    pub created_by: UserId,
}

impl CreateApp {
    pub const NAME: &'static str = "deployment.command.create_app";
}

impl Command for CreateApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.name.clone()
    }
}

pub async fn create_app(ctx: &Context, cmd: CreateApp) -> HandlerResult<AppId> {
    let name: AppName = cmd.name.parse().map_err(HandlerError::on_field("name"))?;

    let (production, staging) = ctx
        .apps
        .check_app_naming_availability(
            &name,
            cmd.production.into_config(),
            cmd.staging.into_config(),
        )
        .await?;

    production
        .check()
        .map_err(HandlerError::on_field("production"))?;
    staging.check().map_err(HandlerError::on_field("staging"))?;

    let mut app = App::new(name, production, staging, cmd.created_by)?;
    ctx.apps.write(&mut app).await?;

    tracing::info!(app_id = %app.id(), name = %app.name(), "app created");

    Ok(app.id().clone())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateApp {
    pub id: AppId,
    #[serde(default)]
    pub production: Option<EnvironmentInput>,
    #[serde(default)]
    pub staging: Option<EnvironmentInput>,
    #[serde(default)]
    pub version_control: Option<Patch<VersionControlInput>>,
}

impl UpdateApp {
    pub const NAME: &'static str = "deployment.command.update_app";
}

impl Command for UpdateApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn update_app(ctx: &Context, cmd: UpdateApp) -> HandlerResult<()> {
    let mut app = ctx.apps.get_by_id(&cmd.id).await?;

    match cmd.version_control {
        Some(Patch::Set(input)) => app.use_version_control(input.into_version_control()?)?,
        Some(Patch::Remove) => app.remove_version_control()?,
        None => {}
    }

    let (production, staging) = ctx
        .apps
        .check_app_naming_availability_by_id(
            &cmd.id,
            cmd.production.map(EnvironmentInput::into_config),
            cmd.staging.map(EnvironmentInput::into_config),
        )
        .await?;

    if let Some(requirement) = production {
        requirement
            .check()
            .map_err(HandlerError::on_field("production"))?;
        app.has_production_config(requirement)?;
    }

    if let Some(requirement) = staging {
        requirement
            .check()
            .map_err(HandlerError::on_field("staging"))?;
        app.has_staging_config(requirement)?;
    }

    ctx.apps.write(&mut app).await?;

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAppCleanup {
    pub id: AppId,
    pub requested_by: UserId,
}

impl RequestAppCleanup {
    pub const NAME: &'static str = "deployment.command.request_app_cleanup";
}

impl Command for RequestAppCleanup {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn request_app_cleanup(ctx: &Context, cmd: RequestAppCleanup) -> HandlerResult<()> {
    let mut app = ctx.apps.get_by_id(&cmd.id).await?;
    app.request_cleanup(cmd.requested_by)?;
    ctx.apps.write(&mut app).await?;
    Ok(())
}

/// Remove what an app environment left on a target, for deployments requested
/// between `from` and `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupApp {
    pub app_id: AppId,
    pub target_id: TargetId,
    pub environment: Environment,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl CleanupApp {
    pub const NAME: &'static str = "deployment.command.cleanup_app";
}

impl Command for CleanupApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    // Serialized with the other jobs of the app so deletion waits for it.
    fn resource_id(&self) -> String {
        self.app_id.to_string()
    }
}

pub async fn cleanup_app(ctx: &Context, cmd: CleanupApp) -> HandlerResult<JobOutcome> {
    let Some(mut app) = found(ctx.apps.get_by_id(&cmd.app_id).await)? else {
        return Ok(JobOutcome::Success);
    };

    // A deleted target took every resource with it.
    if let Some(target) = found(ctx.targets.get_by_id(&cmd.target_id).await)? {
        let (ongoing, successful) = ctx
            .deployments
            .has_deployments_on_app_target_env(
                &cmd.app_id,
                &cmd.target_id,
                cmd.environment,
                cmd.from,
                cmd.to,
            )
            .await?;

        let strategy = target.app_cleanup_strategy(ongoing, successful)?;

        ctx.provider
            .cleanup(&cmd.app_id, &target, cmd.environment, strategy)
            .await?;

        tracing::info!(
            app_id = %cmd.app_id,
            target_id = %cmd.target_id,
            environment = %cmd.environment,
            ?strategy,
            "app environment cleaned up"
        );
    }

    app.cleaned_up(cmd.environment, &cmd.target_id);
    ctx.apps.write(&mut app).await?;

    Ok(JobOutcome::Success)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteApp {
    pub id: AppId,
}

impl DeleteApp {
    pub const NAME: &'static str = "deployment.command.delete_app";
}

impl Command for DeleteApp {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn delete_app(ctx: &Context, cmd: DeleteApp) -> HandlerResult<JobOutcome> {
    let Some(mut app) = found(ctx.apps.get_by_id(&cmd.id).await)? else {
        return Ok(JobOutcome::Success);
    };

    let count = ctx
        .deployments
        .get_running_or_pending_deployments_count(&cmd.id)
        .await?;

    app.delete(count)?;
    ctx.apps.write(&mut app).await?;

    tracing::info!(app_id = %cmd.id, "app deleted");

    Ok(JobOutcome::Success)
}

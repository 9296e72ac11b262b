use serde::{Deserialize, Serialize};

use dockyard_core::{AggregateRoot, UserId};
use dockyard_deployment::{
    Credentials, RegistriesReader, RegistriesWriter, Registry, RegistryId, RegistryUrlRequirement,
    Url,
};
use dockyard_events::Command;

use super::{Context, Patch};
use crate::error::{HandlerError, HandlerResult};

async fn check_url(
    ctx: &Context,
    raw: &str,
    excluding: Option<&RegistryId>,
) -> HandlerResult<RegistryUrlRequirement> {
    let url = Url::parse(raw).map_err(HandlerError::on_field("url"))?;
    let requirement = ctx.registries.check_url_availability(&url, excluding).await?;
    requirement.check().map_err(HandlerError::on_field("url"))?;
    Ok(requirement)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRegistry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    pub created_by: UserId,
}

impl CreateRegistry {
    pub const NAME: &'static str = "deployment.command.create_registry";
}

impl Command for CreateRegistry {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.url.clone()
    }
}

pub async fn create_registry(ctx: &Context, cmd: CreateRegistry) -> HandlerResult<RegistryId> {
    let requirement = check_url(ctx, &cmd.url, None).await?;

    let mut registry = Registry::new(cmd.name, requirement, cmd.created_by)?;

    if let Some(credentials) = cmd.credentials {
        registry.use_authentication(credentials);
    }

    ctx.registries.write(&mut registry).await?;

    tracing::info!(registry_id = %registry.id(), url = %registry.url(), "registry created");

    Ok(registry.id().clone())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRegistry {
    pub id: RegistryId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub credentials: Option<Patch<Credentials>>,
}

impl UpdateRegistry {
    pub const NAME: &'static str = "deployment.command.update_registry";
}

impl Command for UpdateRegistry {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn update_registry(ctx: &Context, cmd: UpdateRegistry) -> HandlerResult<()> {
    let mut registry = ctx.registries.get_by_id(&cmd.id).await?;

    if let Some(name) = cmd.name {
        registry.rename(name);
    }

    if let Some(raw) = cmd.url.as_deref() {
        let requirement = check_url(ctx, raw, Some(&cmd.id)).await?;
        registry.has_url(requirement)?;
    }

    match cmd.credentials {
        Some(Patch::Set(credentials)) => registry.use_authentication(credentials),
        Some(Patch::Remove) => registry.remove_authentication(),
        None => {}
    }

    ctx.registries.write(&mut registry).await?;

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRegistry {
    pub id: RegistryId,
}

impl DeleteRegistry {
    pub const NAME: &'static str = "deployment.command.delete_registry";
}

impl Command for DeleteRegistry {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resource_id(&self) -> String {
        self.id.to_string()
    }
}

pub async fn delete_registry(ctx: &Context, cmd: DeleteRegistry) -> HandlerResult<()> {
    let mut registry = ctx.registries.get_by_id(&cmd.id).await?;
    registry.delete();
    ctx.registries.write(&mut registry).await?;

    tracing::info!(registry_id = %cmd.id, "registry deleted");

    Ok(())
}

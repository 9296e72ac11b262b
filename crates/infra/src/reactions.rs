//! Side effects of domain events: queue the jobs they call for, fail deployments
//! which can no longer run and keep target entrypoints in sync with what
//! deployments expose.

use chrono::{DateTime, Utc};

use dockyard_core::DomainError;
use dockyard_deployment::{
    AppEvent, AppId, AppsReader, DeploymentEvent, DomainEvent, Environment, FailCriteria,
    JobPolicy, StoreError, Target, TargetEvent, TargetId, TargetsReader, TargetsWriter,
};
use dockyard_events::EventEnvelope;

use crate::error::HandlerResult;
use crate::handlers::apps::{CleanupApp, DeleteApp};
use crate::handlers::deployments::{Deploy, fail_pending_deployments};
use crate::handlers::targets::{CleanupTarget, ConfigureTarget, DeleteTarget};
use crate::handlers::{Context, found};

const MAX_CONFLICT_RETRIES: usize = 3;

/// React to a single published event.
pub async fn react(ctx: &Context, envelope: &EventEnvelope<DomainEvent>) -> HandlerResult<()> {
    match envelope.payload() {
        DomainEvent::Target(TargetEvent::TargetCreated(e)) => {
            configure(ctx, &e.id, e.state.version()).await
        }
        DomainEvent::Target(TargetEvent::TargetStateChanged(e)) if e.went_to_configuring_state() => {
            configure(ctx, &e.id, e.state.version()).await
        }
        DomainEvent::Target(TargetEvent::TargetCleanupRequested(e)) => {
            let criteria = FailCriteria {
                target: Some(e.id.clone()),
                ..FailCriteria::default()
            };
            fail_pending_deployments(ctx, DomainError::TargetCleanupRequested, criteria).await?;

            ctx.queue(&CleanupTarget { id: e.id.clone() }, JobPolicy::Default)
                .await?;
            ctx.queue(
                &DeleteTarget { id: e.id.clone() },
                JobPolicy::WaitForOthersResourceId,
            )
            .await
        }
        DomainEvent::Deployment(DeploymentEvent::DeploymentCreated(e)) => {
            ctx.queue(&Deploy { id: e.id.clone() }, JobPolicy::Default)
                .await
        }
        DomainEvent::Deployment(DeploymentEvent::DeploymentStateChanged(e))
            if e.has_succeeded() =>
        {
            let Some(services) = e.state.services() else {
                return Ok(());
            };
            let app = e.config.app_id();
            let environment = e.config.environment();

            update_target(ctx, e.config.target(), |target| {
                target.expose_entrypoints(app, environment, services)
            })
            .await
        }
        DomainEvent::App(AppEvent::AppEnvChanged(e)) if e.target_has_changed() => {
            let old_target = e.old_config.target();
            let criteria = FailCriteria {
                app: Some(e.id.clone()),
                target: Some(old_target.clone()),
                environment: Some(e.environment),
                ..FailCriteria::default()
            };
            fail_pending_deployments(ctx, DomainError::AppTargetChanged, criteria).await?;

            update_target(ctx, old_target, |target| {
                target.un_expose_entrypoints(&e.id, &[e.environment])
            })
            .await?;

            ctx.queue(
                &CleanupApp {
                    app_id: e.id.clone(),
                    target_id: old_target.clone(),
                    environment: e.environment,
                    from: e.old_config.version(),
                    to: e.config.version(),
                },
                JobPolicy::Default,
            )
            .await
        }
        DomainEvent::App(AppEvent::AppCleanupRequested(e)) => {
            let criteria = FailCriteria {
                app: Some(e.id.clone()),
                ..FailCriteria::default()
            };
            fail_pending_deployments(ctx, DomainError::AppCleanupRequested, criteria).await?;

            cleanup_app(ctx, &e.id, e.requested.at()).await
        }
        _ => Ok(()),
    }
}

async fn configure(ctx: &Context, id: &TargetId, version: DateTime<Utc>) -> HandlerResult<()> {
    ctx.queue(
        &ConfigureTarget {
            id: id.clone(),
            version,
        },
        JobPolicy::Merge,
    )
    .await
}

/// Clean every target the app has ever run on, then delete it.
async fn cleanup_app(ctx: &Context, id: &AppId, requested_at: DateTime<Utc>) -> HandlerResult<()> {
    let Some(app) = found(ctx.apps.get_by_id(id).await)? else {
        return Ok(());
    };

    let entries: Vec<(Environment, TargetId)> = app
        .history()
        .iter()
        .map(|(environment, target)| (environment, target.clone()))
        .collect();

    let mut targets: Vec<&TargetId> = entries.iter().map(|(_, target)| target).collect();
    targets.sort();
    targets.dedup();

    for target in targets {
        update_target(ctx, target, |t| t.un_expose_entrypoints(id, &[])).await?;
    }

    for (environment, target) in &entries {
        ctx.queue(
            &CleanupApp {
                app_id: id.clone(),
                target_id: target.clone(),
                environment: *environment,
                from: DateTime::<Utc>::MIN_UTC,
                to: requested_at,
            },
            JobPolicy::Default,
        )
        .await?;
    }

    ctx.queue(&DeleteApp { id: id.clone() }, JobPolicy::WaitForOthersResourceId)
        .await
}

/// Load, change and write a target, reloading it when a concurrent writer got there first.
async fn update_target<F>(ctx: &Context, id: &TargetId, change: F) -> HandlerResult<()>
where
    F: Fn(&mut Target) + Send + Sync,
{
    let mut attempt = 1;

    loop {
        let Some(mut target) = found(ctx.targets.get_by_id(id).await)? else {
            return Ok(());
        };

        change(&mut target);

        match ctx.targets.write(&mut target).await {
            Err(StoreError::Conflict(mismatch)) if attempt < MAX_CONFLICT_RETRIES => {
                tracing::debug!(target_id = %id, %mismatch, attempt, "target changed meanwhile, retrying");
                attempt += 1;
            }
            result => return Ok(result?),
        }
    }
}

//! Command handlers: load aggregates through the readers, gather requirements,
//! call the domain and persist through the writers.
//!
//! Synchronous commands are plain async functions returning the identifier of
//! what they created. Asynchronous ones are queued on the scheduler and run by
//! [`dispatch`] when their job comes up.

pub mod apps;
pub mod deployments;
pub mod registries;
pub mod targets;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dockyard_core::DomainError;
use dockyard_deployment::{
    AppsReader, AppsWriter, DeploymentsReader, DeploymentsWriter, JobPolicy, Provider,
    RegistriesReader, RegistriesWriter, Scheduler, StoreError, StoreResult, TargetsReader,
    TargetsWriter,
};
use dockyard_events::{Command, Request};

use crate::error::{HandlerError, HandlerResult};
use crate::scheduler::JobOutcome;
use crate::store::InMemoryStore;

pub trait AppsStore: AppsReader + AppsWriter {}
impl<T: AppsReader + AppsWriter + ?Sized> AppsStore for T {}

pub trait TargetsStore: TargetsReader + TargetsWriter {}
impl<T: TargetsReader + TargetsWriter + ?Sized> TargetsStore for T {}

pub trait DeploymentsStore: DeploymentsReader + DeploymentsWriter {}
impl<T: DeploymentsReader + DeploymentsWriter + ?Sized> DeploymentsStore for T {}

pub trait RegistriesStore: RegistriesReader + RegistriesWriter {}
impl<T: RegistriesReader + RegistriesWriter + ?Sized> RegistriesStore for T {}

/// Change applied to an optional field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum Patch<T> {
    Set(T),
    Remove,
}

/// Capabilities handed to every handler.
#[derive(Clone)]
pub struct Context {
    pub apps: Arc<dyn AppsStore>,
    pub targets: Arc<dyn TargetsStore>,
    pub deployments: Arc<dyn DeploymentsStore>,
    pub registries: Arc<dyn RegistriesStore>,
    pub scheduler: Arc<dyn Scheduler>,
    pub provider: Arc<dyn Provider>,
    /// How long a job waits when its preconditions are not met yet.
    pub retry_later: Duration,
}

impl Context {
    pub fn new(
        store: Arc<InMemoryStore>,
        scheduler: Arc<dyn Scheduler>,
        provider: Arc<dyn Provider>,
        retry_later: Duration,
    ) -> Self {
        Self {
            apps: store.clone(),
            targets: store.clone(),
            deployments: store.clone(),
            registries: store,
            scheduler,
            provider,
            retry_later,
        }
    }

    /// Serialize `command` and hand it to the scheduler.
    pub async fn queue<C>(&self, command: &C, policy: JobPolicy) -> HandlerResult<()>
    where
        C: Command + Serialize,
    {
        let request = Request::from_command(command).map_err(anyhow::Error::from)?;
        self.scheduler.queue(request, policy).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("retry_later", &self.retry_later)
            .finish_non_exhaustive()
    }
}

/// Treat a missing aggregate as `None`, any other failure as an error.
pub(crate) fn found<T>(result: StoreResult<T>) -> HandlerResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Errors meaning "not yet" rather than "never".
pub(crate) fn is_transient(error: DomainError) -> bool {
    matches!(
        error,
        DomainError::RunningOrPendingDeployments
            | DomainError::TargetConfigurationInProgress
            | DomainError::AppHasRunningOrPendingDeployments
    )
}

/// Why a job could not be handed to its handler.
#[derive(Debug, Error)]
enum RouteError {
    #[error("no handler for {0}")]
    Unknown(String),

    #[error("undecodable payload for {name}: {source}")]
    Undecodable {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

fn decode<C: DeserializeOwned>(request: &Request) -> Result<C, RouteError> {
    request.decode().map_err(|source| RouteError::Undecodable {
        name: request.name().to_string(),
        source,
    })
}

async fn route(ctx: &Context, request: &Request) -> Result<HandlerResult<JobOutcome>, RouteError> {
    let result = match request.name() {
        targets::ConfigureTarget::NAME => {
            targets::configure_target(ctx, decode(request)?).await
        }
        targets::CleanupTarget::NAME => targets::cleanup_target(ctx, decode(request)?).await,
        targets::DeleteTarget::NAME => targets::delete_target(ctx, decode(request)?).await,
        apps::CleanupApp::NAME => apps::cleanup_app(ctx, decode(request)?).await,
        apps::DeleteApp::NAME => apps::delete_app(ctx, decode(request)?).await,
        deployments::Deploy::NAME => deployments::deploy(ctx, decode(request)?).await,
        name => return Err(RouteError::Unknown(name.to_string())),
    };

    Ok(result)
}

/// Run the job carried by `request`.
///
/// Transient domain errors postpone the job instead of failing it.
pub async fn dispatch(ctx: &Context, request: &Request) -> JobOutcome {
    let result = match route(ctx, request).await {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(
                name = request.name(),
                resource_id = request.resource_id(),
                error = %err,
                "job cannot be routed"
            );
            return JobOutcome::Failure(err.to_string());
        }
    };

    match result {
        Ok(outcome) => outcome,
        Err(HandlerError::Domain(error)) if is_transient(error) => {
            tracing::debug!(name = request.name(), %error, "job postponed");
            JobOutcome::Delay(ctx.retry_later)
        }
        Err(err) => {
            tracing::warn!(
                name = request.name(),
                resource_id = request.resource_id(),
                error = %err,
                "job failed"
            );
            JobOutcome::Failure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Settings;
    use crate::runtime::Runtime;
    use crate::testing::RecordingProvider;

    #[derive(Debug, Clone, Serialize)]
    struct Named {
        name: &'static str,
    }

    impl Command for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn resource_id(&self) -> String {
            "resource".to_string()
        }
    }

    fn runtime() -> Runtime {
        Runtime::new(&Settings::default(), Arc::new(RecordingProvider::new()))
    }

    #[tokio::test]
    async fn unknown_jobs_fail() {
        let runtime = runtime();
        let request = Request::from_command(&Named {
            name: "deployment.command.unknown",
        })
        .unwrap();

        let outcome = dispatch(runtime.context(), &request).await;

        assert_eq!(
            outcome,
            JobOutcome::Failure("no handler for deployment.command.unknown".into())
        );
    }

    #[tokio::test]
    async fn undecodable_payloads_are_reported_as_such() {
        let runtime = runtime();
        let request = Request::from_command(&Named {
            name: deployments::Deploy::NAME,
        })
        .unwrap();

        match dispatch(runtime.context(), &request).await {
            JobOutcome::Failure(error) => {
                assert!(
                    error.starts_with("undecodable payload for deployment.command.deploy"),
                    "{error}"
                );
            }
            other => panic!("Expected a failure, got {other:?}"),
        }
    }
}

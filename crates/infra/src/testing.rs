//! Provider double recording what it was asked to do.

use std::sync::Mutex;

use serde_json::Value;

use dockyard_core::{AggregateRoot, DomainError};
use dockyard_deployment::{
    AppId, CleanupStrategy, Deployment, DeploymentId, Environment, HttpEntrypointOptions, Port,
    Provider, ProviderConfig, Registry, Services, Target, TargetEntrypointsAssigned, TargetId,
};

#[derive(Debug, Default)]
pub struct Recorded {
    pub fail_setup: bool,
    pub fail_deploy: bool,
    pub setups: Vec<TargetId>,
    pub deploys: Vec<DeploymentId>,
    pub app_cleanups: Vec<(AppId, TargetId, Environment, CleanupStrategy)>,
    pub target_cleanups: Vec<(TargetId, CleanupStrategy)>,
    pub removed: Vec<TargetId>,
    next_port: u16,
}

#[derive(Debug)]
pub struct RecordingProvider {
    state: Mutex<Recorded>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Recorded {
                next_port: 9000,
                ..Default::default()
            }),
        }
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }
}

/// An `app` service exposing 80 on the default subdomain, plus postgres over tcp.
pub fn services_of(deployment: &Deployment) -> Services {
    let config = deployment.config();

    let mut app = config.new_service("app", "");
    app.add_http_entrypoint(
        config,
        80,
        HttpEntrypointOptions {
            managed: true,
            use_default_subdomain: true,
        },
    );

    let mut db = config.new_service("db", "postgres:14-alpine");
    db.add_tcp_entrypoint(5432);

    Services::new(vec![app, db])
}

#[async_trait::async_trait]
impl Provider for RecordingProvider {
    async fn prepare(
        &self,
        payload: Value,
        existing: Option<&ProviderConfig>,
    ) -> anyhow::Result<ProviderConfig> {
        let config: ProviderConfig = serde_json::from_value(payload)
            .map_err(|_| anyhow::Error::new(DomainError::InvalidProviderPayload))?;

        Ok(match (config, existing) {
            (ProviderConfig::Docker(mut docker), Some(ProviderConfig::Docker(previous)))
                if docker.private_key.is_none() =>
            {
                docker.private_key = previous.private_key.clone();
                ProviderConfig::Docker(docker)
            }
            (config, _) => config,
        })
    }

    async fn deploy(
        &self,
        deployment: &Deployment,
        _target: &Target,
        _registries: &[Registry],
    ) -> anyhow::Result<Services> {
        self.with(|state| {
            state.deploys.push(deployment.id().clone());

            if state.fail_deploy {
                anyhow::bail!("compose up failed");
            }

            Ok(services_of(deployment))
        })
    }

    async fn setup(&self, target: &Target) -> anyhow::Result<TargetEntrypointsAssigned> {
        self.with(|state| {
            state.setups.push(target.id().clone());

            if state.fail_setup {
                anyhow::bail!("ssh: connection refused");
            }

            let mut assigned = TargetEntrypointsAssigned::new();
            for key in target.custom_entrypoints().unassigned() {
                assigned.set(
                    key.app.clone(),
                    key.environment,
                    key.name.clone(),
                    Port::new(state.next_port),
                );
                state.next_port += 1;
            }

            Ok(assigned)
        })
    }

    async fn remove_configuration(&self, target: &Target) -> anyhow::Result<()> {
        self.with(|state| state.removed.push(target.id().clone()));
        Ok(())
    }

    async fn cleanup_target(
        &self,
        target: &Target,
        strategy: CleanupStrategy,
    ) -> anyhow::Result<()> {
        self.with(|state| state.target_cleanups.push((target.id().clone(), strategy)));
        Ok(())
    }

    async fn cleanup(
        &self,
        app: &AppId,
        target: &Target,
        environment: Environment,
        strategy: CleanupStrategy,
    ) -> anyhow::Result<()> {
        self.with(|state| {
            state
                .app_cleanups
                .push((app.clone(), target.id().clone(), environment, strategy))
        });
        Ok(())
    }
}

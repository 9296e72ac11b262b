use serde::{Deserialize, Serialize};

use dockyard_core::ValueObject;

use crate::app_name::AppName;
use crate::environment::{EnvVars, Environment, ServicesEnv};
use crate::ids::{AppId, TargetId};
use crate::service::Service;

/// Snapshot of an app configuration taken when a deployment is created.
///
/// Holds everything a provider needs to name services and images. It is never
/// refreshed from the app afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    app_id: AppId,
    app_name: AppName,
    environment: Environment,
    target: TargetId,
    vars: Option<ServicesEnv>,
}

impl DeploymentConfig {
    pub(crate) fn new(
        app_id: AppId,
        app_name: AppName,
        environment: Environment,
        target: TargetId,
        vars: Option<ServicesEnv>,
    ) -> Self {
        Self {
            app_id,
            app_name,
            environment,
            target,
            vars,
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn app_name(&self) -> &AppName {
        &self.app_name
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn vars(&self) -> Option<&ServicesEnv> {
        self.vars.as_ref()
    }

    pub fn env_vars_for(&self, service: &str) -> Option<&EnvVars> {
        self.vars.as_ref()?.get(service)
    }

    /// Subdomain used to expose `service`. When the default one is already taken,
    /// the service name is prepended.
    pub fn sub_domain(&self, service: &str, is_default: bool) -> String {
        let mut subdomain = self.app_name.to_string();

        if !self.environment.is_production() {
            subdomain.push('-');
            subdomain.push_str(self.environment.as_str());
        }

        if is_default {
            subdomain
        } else {
            format!("{service}.{subdomain}")
        }
    }

    pub fn image_name(&self, service: &str) -> String {
        format!(
            "{}-{}/{}:{}",
            self.app_name,
            self.app_id.as_str().to_lowercase(),
            service,
            self.environment
        )
    }

    /// Combination of app name, environment and app id.
    pub fn project_name(&self) -> String {
        format!(
            "{}-{}-{}",
            self.app_name,
            self.environment,
            self.app_id.as_str().to_lowercase()
        )
    }

    pub fn qualified_name(&self, service: &str) -> String {
        format!("{}-{}", self.project_name(), service)
    }

    /// New service of this configuration. An empty image falls back to the built one.
    pub fn new_service(&self, name: &str, image: &str) -> Service {
        let image = if image.is_empty() {
            self.image_name(name)
        } else {
            image.to_string()
        };

        Service::new(name.to_string(), self.qualified_name(name), image)
    }
}

impl ValueObject for DeploymentConfig {}

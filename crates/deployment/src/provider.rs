use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::{DiscriminatedMapper, ScanError, ValueObject};

use crate::entrypoints::TargetEntrypointsAssigned;
use crate::environment::Environment;
use crate::ids::AppId;
use crate::{CleanupStrategy, Deployment, Registry, Services, Target};

const DOCKER: &str = "docker";
const DEFAULT_DOCKER_USER: &str = "docker";
const DEFAULT_SSH_PORT: u16 = 22;

static PROVIDER_CONFIG_TYPES: LazyLock<DiscriminatedMapper<ProviderConfig>> =
    LazyLock::new(|| {
        DiscriminatedMapper::new()
            .register(DOCKER, |v| serde_json::from_value(v).map(ProviderConfig::Docker))
    });

/// Docker engine reachable locally or through ssh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub private_key: Option<String>,
}

impl fmt::Display for DockerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(host) = &self.host else {
            return f.write_str("local");
        };

        write!(
            f,
            "{}@{}:{}",
            self.user.as_deref().unwrap_or(DEFAULT_DOCKER_USER),
            host,
            self.port.unwrap_or(DEFAULT_SSH_PORT)
        )
    }
}

/// Provider specific configuration of a target.
///
/// `kind` and `fingerprint` identify the remote host and can never change once a
/// target has been created; only the rest of the payload may.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum ProviderConfig {
    Docker(DockerConfig),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Docker(DockerConfig::default())
    }
}

impl ProviderConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderConfig::Docker(_) => DOCKER,
        }
    }

    /// Uniquely identifies the host targeted by this config.
    pub fn fingerprint(&self) -> &str {
        match self {
            ProviderConfig::Docker(config) => config.host.as_deref().unwrap_or_default(),
        }
    }

    pub fn equals(&self, other: &ProviderConfig) -> bool {
        self == other
    }

    /// Same kind and fingerprint, payload aside.
    pub fn same_host(&self, other: &ProviderConfig) -> bool {
        self.kind() == other.kind() && self.fingerprint() == other.fingerprint()
    }

    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            ProviderConfig::Docker(config) => serde_json::to_value(config),
        }
    }

    pub fn from_parts(kind: &str, payload: Value) -> Result<Self, ScanError> {
        PROVIDER_CONFIG_TYPES.from(kind, payload)
    }
}

impl ValueObject for ProviderConfig {}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderConfig::Docker(config) => config.fmt(f),
        }
    }
}

/// Backend able to run deployments on targets.
///
/// Every call may hit a remote host, failures are infrastructure errors and are
/// never mapped to domain codes.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Build a config from a raw payload, merging sensitive fields from `existing`
    /// when the payload omits them.
    async fn prepare(
        &self,
        payload: Value,
        existing: Option<&ProviderConfig>,
    ) -> anyhow::Result<ProviderConfig>;

    /// Run a deployment on its target and return the services it exposes.
    async fn deploy(
        &self,
        deployment: &Deployment,
        target: &Target,
        registries: &[Registry],
    ) -> anyhow::Result<Services>;

    /// Configure the target and return ports assigned to its custom entrypoints.
    async fn setup(&self, target: &Target) -> anyhow::Result<TargetEntrypointsAssigned>;

    /// Remove the target configuration written on this machine.
    async fn remove_configuration(&self, target: &Target) -> anyhow::Result<()>;

    /// Tear down everything the target holds.
    async fn cleanup_target(&self, target: &Target, strategy: CleanupStrategy)
    -> anyhow::Result<()>;

    /// Tear down what an app environment left on a target.
    async fn cleanup(
        &self,
        app: &AppId,
        target: &Target,
        environment: Environment,
        strategy: CleanupStrategy,
    ) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(host: &str) -> ProviderConfig {
        ProviderConfig::Docker(DockerConfig {
            host: Some(host.into()),
            ..Default::default()
        })
    }

    #[test]
    fn should_fingerprint_the_host() {
        assert_eq!(ProviderConfig::default().fingerprint(), "");
        assert_eq!(remote("example.com").fingerprint(), "example.com");
        assert_eq!(ProviderConfig::default().kind(), "docker");
    }

    #[test]
    fn should_display_local_or_ssh_host() {
        assert_eq!(ProviderConfig::default().to_string(), "local");
        assert_eq!(remote("example.com").to_string(), "docker@example.com:22");

        let custom = ProviderConfig::Docker(DockerConfig {
            host: Some("example.com".into()),
            port: Some(2222),
            user: Some("admin".into()),
            private_key: None,
        });
        assert_eq!(custom.to_string(), "admin@example.com:2222");
    }

    #[test]
    fn should_compare_payloads_and_hosts() {
        let a = remote("example.com");
        let mut b = remote("example.com");
        assert!(a.equals(&b));

        if let ProviderConfig::Docker(config) = &mut b {
            config.private_key = Some("key".into());
        }
        assert!(!a.equals(&b));
        assert!(a.same_host(&b));
        assert!(!a.same_host(&remote("other.com")));
    }

    #[test]
    fn should_rebuild_from_kind_and_payload() {
        let config = remote("example.com");

        let rebuilt = ProviderConfig::from_parts(config.kind(), config.payload().unwrap()).unwrap();

        assert_eq!(rebuilt, config);
        assert!(matches!(
            ProviderConfig::from_parts("kubernetes", Value::Null),
            Err(ScanError::UnknownDiscriminator(_))
        ));
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dockyard_core::{DomainError, ValueObject};

use crate::ids::TargetId;

/// Deployment environment. Production has a special meaning when building domains.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Staging,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Production, Environment::Staging];

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
        }
    }
}

impl ValueObject for Environment {}

impl FromStr for Environment {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            _ => Err(DomainError::InvalidEnvironmentName),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment variables key pairs.
pub type EnvVars = BTreeMap<String, String>;

/// Environment variables per service name.
pub type ServicesEnv = BTreeMap<String, EnvVars>;

/// Per-environment configuration of an app: where it runs and with which variables.
///
/// `version` is the epoch at which the app started to target `target`, used to
/// bound the deployments considered when cleaning an old target up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    target: TargetId,
    version: DateTime<Utc>,
    vars: Option<ServicesEnv>,
}

impl EnvironmentConfig {
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            version: Utc::now(),
            vars: None,
        }
    }

    pub(crate) fn from_parts(
        target: TargetId,
        version: DateTime<Utc>,
        vars: Option<ServicesEnv>,
    ) -> Self {
        Self {
            target,
            version,
            vars,
        }
    }

    pub fn has_environment_variables(&mut self, vars: ServicesEnv) {
        self.vars = Some(vars);
    }

    pub fn remove_environment_variables(&mut self) {
        self.vars = None;
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn version(&self) -> DateTime<Utc> {
        self.version
    }

    pub fn vars(&self) -> Option<&ServicesEnv> {
        self.vars.as_ref()
    }

    /// Compare target and variables, ignoring the version.
    pub fn equals(&self, other: &EnvironmentConfig) -> bool {
        self.target == other.target && self.vars == other.vars
    }

    /// Keep the existing version if the target did not change. Returns true if it did.
    pub(crate) fn consolidate(&mut self, existing: &EnvironmentConfig) -> bool {
        if self.target == existing.target {
            self.version = existing.version;
            return false;
        }

        true
    }
}

impl ValueObject for EnvironmentConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(service: &str, key: &str, value: &str) -> ServicesEnv {
        ServicesEnv::from([(
            service.to_string(),
            EnvVars::from([(key.to_string(), value.to_string())]),
        )])
    }

    #[test]
    fn should_parse_known_environments_only() {
        assert_eq!("production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("staging".parse::<Environment>(), Ok(Environment::Staging));
        assert_eq!(
            "dev".parse::<Environment>(),
            Err(DomainError::InvalidEnvironmentName)
        );
        assert!(Environment::Production.is_production());
        assert!(!Environment::Staging.is_production());
    }

    #[test]
    fn should_serialize_environments_in_lowercase() {
        assert_eq!(
            serde_json::to_value(Environment::Staging).unwrap(),
            serde_json::json!("staging")
        );
    }

    #[test]
    fn should_build_a_config_without_variables() {
        let config = EnvironmentConfig::new("target".into());

        assert_eq!(config.target(), &TargetId::from("target"));
        assert!(config.vars().is_none());
    }

    #[test]
    fn should_compare_target_and_variables_only() {
        let mut a = EnvironmentConfig::new("1".into());
        let mut b = EnvironmentConfig::new("1".into());
        assert!(a.equals(&b));

        a.has_environment_variables(vars("app", "DEBUG", "false"));
        assert!(!a.equals(&b));
        assert!(!b.equals(&a));

        b.has_environment_variables(vars("app", "DEBUG", "false"));
        assert!(a.equals(&b));

        b.has_environment_variables(vars("app", "DEBUG", "true"));
        assert!(!a.equals(&b));

        assert!(!EnvironmentConfig::new("1".into()).equals(&EnvironmentConfig::new("2".into())));
    }

    #[test]
    fn should_keep_the_version_when_the_target_is_unchanged() {
        let existing = EnvironmentConfig::from_parts("1".into(), DateTime::<Utc>::MIN_UTC, None);

        let mut same_target = EnvironmentConfig::new("1".into());
        assert!(!same_target.consolidate(&existing));
        assert_eq!(same_target.version(), existing.version());

        let mut other_target = EnvironmentConfig::new("2".into());
        assert!(other_target.consolidate(&existing));
        assert_ne!(other_target.version(), existing.version());
    }
}

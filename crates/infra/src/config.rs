//! Runtime settings, read from `DOCKYARD_*` environment variables.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use dockyard_deployment::Url;

use crate::scheduler::RetryPolicy;

const PREFIX: &str = "DOCKYARD_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Url of the target seeded on first start, if any.
    pub default_target_url: Option<Url>,
    pub scheduler: SchedulerSettings,
    pub log_filter: String,
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SchedulerSettings {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            max_attempts: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl SchedulerSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.retry_delay, self.retry_delay * 64)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_target_url: None,
            scheduler: SchedulerSettings::default(),
            log_filter: "info".to_string(),
            log_json: true,
        }
    }
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables. Unknown keys are ignored.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| key.strip_prefix(PREFIX).map(|k| (k.to_string(), value)))
            .collect();

        let mut settings = Settings::default();

        if let Some(raw) = non_empty(&vars, "DEFAULT_TARGET_URL") {
            let url = Url::parse(raw).map_err(|err| invalid("DEFAULT_TARGET_URL", raw, err))?;
            settings.default_target_url = Some(url);
        }

        if let Some(raw) = non_empty(&vars, "SCHEDULER_POLL_INTERVAL_MS") {
            settings.scheduler.poll_interval = millis("SCHEDULER_POLL_INTERVAL_MS", raw)?;
        }

        if let Some(raw) = non_empty(&vars, "SCHEDULER_MAX_ATTEMPTS") {
            settings.scheduler.max_attempts = raw
                .parse()
                .map_err(|err| invalid("SCHEDULER_MAX_ATTEMPTS", raw, err))?;
        }

        if let Some(raw) = non_empty(&vars, "SCHEDULER_RETRY_DELAY_MS") {
            settings.scheduler.retry_delay = millis("SCHEDULER_RETRY_DELAY_MS", raw)?;
        }

        if let Some(raw) = non_empty(&vars, "LOG") {
            settings.log_filter = raw.to_string();
        }

        if let Some(raw) = non_empty(&vars, "LOG_JSON") {
            settings.log_json = raw.parse().map_err(|err| invalid("LOG_JSON", raw, err))?;
        }

        Ok(settings)
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn millis(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|err| invalid(key, raw, err))
}

fn invalid(key: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key: format!("{PREFIX}{key}"),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = Settings::from_vars(vars(&[("HOME", "/root")])).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.scheduler.poll_interval, Duration::from_millis(1000));
        assert_eq!(settings.scheduler.max_attempts, 5);
        assert_eq!(settings.scheduler.retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn reads_prefixed_variables() {
        let settings = Settings::from_vars(vars(&[
            ("DOCKYARD_DEFAULT_TARGET_URL", "http://docker.localhost"),
            ("DOCKYARD_SCHEDULER_POLL_INTERVAL_MS", "250"),
            ("DOCKYARD_SCHEDULER_MAX_ATTEMPTS", "2"),
            ("DOCKYARD_SCHEDULER_RETRY_DELAY_MS", "10"),
            ("DOCKYARD_LOG", "debug"),
            ("DOCKYARD_LOG_JSON", "false"),
        ]))
        .unwrap();

        assert_eq!(
            settings.default_target_url,
            Some(Url::parse("http://docker.localhost").unwrap())
        );
        assert_eq!(settings.scheduler.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.scheduler.max_attempts, 2);
        assert_eq!(settings.scheduler.retry_delay, Duration::from_millis(10));
        assert_eq!(settings.log_filter, "debug");
        assert!(!settings.log_json);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let settings =
            Settings::from_vars(vars(&[("DOCKYARD_SCHEDULER_MAX_ATTEMPTS", "  ")])).unwrap();

        assert_eq!(settings.scheduler.max_attempts, 5);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        match Settings::from_vars(vars(&[("DOCKYARD_SCHEDULER_MAX_ATTEMPTS", "many")])) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, "DOCKYARD_SCHEDULER_MAX_ATTEMPTS");
                assert_eq!(value, "many");
            }
            other => panic!("Expected invalid value, got {other:?}"),
        }

        assert!(Settings::from_vars(vars(&[("DOCKYARD_DEFAULT_TARGET_URL", "nope")])).is_err());
    }
}

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use dockyard_core::{DomainError, ValueObject};

// Used as a subdomain, so stay restrictive.
static ALLOWED_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new("^[a-z0-9_-]+$").ok());

// Would collide with the staging domain of another app.
const STAGING_SUFFIX: &str = "-staging";

/// Application name, unique per target and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppName(String);

impl AppName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for AppName {}

impl FromStr for AppName {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let allowed = ALLOWED_CHARS
            .as_ref()
            .is_some_and(|re| re.is_match(value));

        if !allowed || value.ends_with(STAGING_SUFFIX) {
            return Err(DomainError::InvalidAppName);
        }

        Ok(Self(value.to_string()))
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_reject_invalid_app_names() {
        for name in ["", "my app", "MyApp", "my.app", "app-staging", "é"] {
            assert_eq!(
                name.parse::<AppName>(),
                Err(DomainError::InvalidAppName),
                "{name}"
            );
        }
    }

    #[test]
    fn should_accept_valid_app_names() {
        for name in ["my-app", "app_1", "staging", "my-staging-app"] {
            assert_eq!(name.parse::<AppName>().unwrap().as_str(), name);
        }
    }
}

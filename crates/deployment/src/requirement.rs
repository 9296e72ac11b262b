//! Availability proofs computed by the read side and handed to aggregates.
//!
//! Each requirement wraps a candidate value and whether storage found it free.
//! Aggregates only call [`met`](TargetUrlRequirement::met) and never query storage.

use dockyard_core::{DomainError, DomainResult};

use crate::environment::EnvironmentConfig;
use crate::provider::ProviderConfig;
use crate::url::Url;

/// Environment config of an app, checked for app name uniqueness on its target.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentConfigRequirement {
    config: EnvironmentConfig,
    target_exists: bool,
    available: bool,
}

impl EnvironmentConfigRequirement {
    pub fn new(config: EnvironmentConfig, target_exists: bool, available: bool) -> Self {
        Self {
            config,
            target_exists,
            available,
        }
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn check(&self) -> DomainResult<()> {
        if !self.target_exists {
            return Err(DomainError::NotFound);
        }

        if !self.available {
            return Err(DomainError::AppNameAlreadyTaken);
        }

        Ok(())
    }

    pub fn met(self) -> DomainResult<EnvironmentConfig> {
        self.check()?;
        Ok(self.config)
    }
}

/// Target url checked for uniqueness among targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetUrlRequirement {
    url: Url,
    unique: bool,
}

impl TargetUrlRequirement {
    pub fn new(url: Url, unique: bool) -> Self {
        Self { url, unique }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn check(&self) -> DomainResult<()> {
        if self.unique {
            Ok(())
        } else {
            Err(DomainError::UrlAlreadyTaken)
        }
    }

    pub fn met(self) -> DomainResult<Url> {
        self.check()?;
        Ok(self.url)
    }
}

/// Provider config checked for fingerprint uniqueness among targets.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfigRequirement {
    config: ProviderConfig,
    unique: bool,
}

impl ProviderConfigRequirement {
    pub fn new(config: ProviderConfig, unique: bool) -> Self {
        Self { config, unique }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn check(&self) -> DomainResult<()> {
        if self.unique {
            Ok(())
        } else {
            Err(DomainError::ConfigAlreadyTaken)
        }
    }

    pub fn met(self) -> DomainResult<ProviderConfig> {
        self.check()?;
        Ok(self.config)
    }
}

/// Registry url checked for uniqueness among registries.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryUrlRequirement {
    url: Url,
    unique: bool,
}

impl RegistryUrlRequirement {
    pub fn new(url: Url, unique: bool) -> Self {
        Self { url, unique }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn check(&self) -> DomainResult<()> {
        if self.unique {
            Ok(())
        } else {
            Err(DomainError::UrlAlreadyTaken)
        }
    }

    pub fn met(self) -> DomainResult<Url> {
        self.check()?;
        Ok(self.url)
    }
}

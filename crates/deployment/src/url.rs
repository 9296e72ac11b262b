use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use dockyard_core::{DomainError, DomainResult, ValueObject};

const SCHEME_HTTPS: &str = "https";

/// Absolute url, scheme mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url(::url::Url);

impl Url {
    /// Parse a raw url, rejecting anything without a scheme.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = ::url::Url::parse(raw).map_err(|_| DomainError::InvalidUrl)?;

        if value.scheme().is_empty() || value.cannot_be_a_base() {
            return Err(DomainError::InvalidUrl);
        }

        Ok(Self(value))
    }

    /// Host, with the port when one is explicitly set.
    pub fn host(&self) -> String {
        let host = self.0.host_str().unwrap_or_default();

        match self.0.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn use_ssl(&self) -> bool {
        self.0.scheme() == SCHEME_HTTPS
    }

    /// Same url with `subdomain` prepended to the host.
    pub fn sub_domain(&self, subdomain: &str) -> DomainResult<Self> {
        let host = self.0.host_str().ok_or(DomainError::InvalidUrl)?;
        let mut value = self.0.clone();

        value
            .set_host(Some(&format!("{subdomain}.{host}")))
            .map_err(|_| DomainError::InvalidUrl)?;

        Ok(Self(value))
    }

    /// Scheme, host and port only.
    pub fn root(&self) -> Self {
        let mut value = self.0.clone();
        value.set_path("");
        value.set_query(None);
        value.set_fragment(None);
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl ValueObject for Url {}

impl FromStr for Url {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Serialize for Url {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Url {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

use serde::{Deserialize, Serialize};

use dockyard_core::ValueObject;

use crate::url::Url;

/// Version control configuration of an app: repository url and optional access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionControl {
    url: Url,
    token: Option<String>,
}

impl VersionControl {
    pub fn new(url: Url) -> Self {
        Self { url, token: None }
    }

    /// The repository needs authentication with this token.
    pub fn authenticated(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// The repository is public.
    pub fn public(&mut self) {
        self.token = None;
    }

    pub fn has_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl ValueObject for VersionControl {}

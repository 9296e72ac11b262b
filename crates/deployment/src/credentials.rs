use serde::{Deserialize, Serialize};

use dockyard_core::ValueObject;

/// Basic credentials used by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn has_username(&mut self, username: impl Into<String>) {
        self.username = username.into();
    }

    pub fn has_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl ValueObject for Credentials {}

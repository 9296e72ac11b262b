use std::fmt;

use serde::{Deserialize, Serialize};

use dockyard_core::string_id;

string_id!(
    /// Identifier of an application.
    AppId
);

string_id!(
    /// Identifier of a deployment target.
    TargetId
);

string_id!(
    /// Identifier of a custom image registry.
    RegistryId
);

/// Sequential number of a deployment, starting at 1 for each app.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeploymentNumber(u32);

impl DeploymentNumber {
    pub const FIRST: DeploymentNumber = DeploymentNumber(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DeploymentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Composite identity of a deployment: owning app and deployment number.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeploymentId {
    app_id: AppId,
    deployment_number: DeploymentNumber,
}

impl DeploymentId {
    pub fn new(app_id: AppId, deployment_number: DeploymentNumber) -> Self {
        Self {
            app_id,
            deployment_number,
        }
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn deployment_number(&self) -> DeploymentNumber {
        self.deployment_number
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.app_id, self.deployment_number)
    }
}

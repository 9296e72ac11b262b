use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who did something, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action<U> {
    by: U,
    at: DateTime<Utc>,
}

impl<U> Action<U> {
    /// Record an action made right now.
    pub fn new(by: U) -> Self {
        Self { by, at: Utc::now() }
    }

    /// Rebuild an action from persisted parts.
    pub fn from_parts(by: U, at: DateTime<Utc>) -> Self {
        Self { by, at }
    }

    pub fn by(&self) -> &U {
        &self.by
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Intent to change the system, addressed to a single resource.
///
/// Commands are transient. Asynchronous ones are serialized into a [`Request`]
/// and handed to a scheduler, which uses `resource_id` to sequence jobs touching
/// the same resource.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable command name (e.g. "deployment.command.cleanup_target").
    fn name(&self) -> &'static str;

    /// Identifier of the resource this command acts on.
    fn resource_id(&self) -> String;
}

/// Serialized command, as stored by a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    name: String,
    resource_id: String,
    payload: Value,
}

impl Request {
    pub fn from_command<C>(command: &C) -> Result<Self, serde_json::Error>
    where
        C: Command + Serialize,
    {
        Ok(Self {
            name: command.name().to_string(),
            resource_id: command.resource_id(),
            payload: serde_json::to_value(command)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Replace the payload, keeping name and resource.
    pub fn merge(&mut self, other: Request) {
        self.payload = other.payload;
    }

    /// Decode the payload back into its command.
    pub fn decode<C: DeserializeOwned>(&self) -> Result<C, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        target: String,
    }

    impl Command for Ping {
        fn name(&self) -> &'static str {
            "test.ping"
        }

        fn resource_id(&self) -> String {
            self.target.clone()
        }
    }

    #[test]
    fn request_carries_name_resource_and_payload() {
        let cmd = Ping {
            target: "t1".into(),
        };

        let request = Request::from_command(&cmd).unwrap();

        assert_eq!(request.name(), "test.ping");
        assert_eq!(request.resource_id(), "t1");
        assert_eq!(request.decode::<Ping>().unwrap(), cmd);
    }
}

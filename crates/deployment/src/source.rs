use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use dockyard_core::{DiscriminatedMapper, ScanError};

const RAW: &str = "raw";
const ARCHIVE: &str = "archive";
const GIT: &str = "git";

static SOURCE_DATA_TYPES: LazyLock<DiscriminatedMapper<SourceData>> = LazyLock::new(|| {
    DiscriminatedMapper::new()
        .register(RAW, |v| serde_json::from_value(v).map(SourceData::Raw))
        .register(ARCHIVE, |v| serde_json::from_value(v).map(SourceData::Archive))
        .register(GIT, |v| serde_json::from_value(v).map(SourceData::Git))
});

/// Git reference to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub branch: String,
    pub hash: Option<String>,
}

/// How the files of a deployment were obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum SourceData {
    /// Raw service file content.
    Raw(String),
    /// Path of an uploaded archive.
    Archive(String),
    /// Checkout of a git repository.
    Git(GitSource),
}

impl Default for SourceData {
    fn default() -> Self {
        SourceData::Raw(String::new())
    }
}

impl SourceData {
    pub fn discriminator(&self) -> &'static str {
        match self {
            SourceData::Raw(_) => RAW,
            SourceData::Archive(_) => ARCHIVE,
            SourceData::Git(_) => GIT,
        }
    }

    /// Only git sources require the app to have a version control config.
    pub fn needs_version_control(&self) -> bool {
        matches!(self, SourceData::Git(_))
    }

    /// Payload without the discriminator, as persisted next to it.
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            SourceData::Raw(content) => serde_json::to_value(content),
            SourceData::Archive(path) => serde_json::to_value(path),
            SourceData::Git(git) => serde_json::to_value(git),
        }
    }

    /// Rebuild a source from its persisted discriminator and payload.
    pub fn from_parts(discriminator: &str, payload: Value) -> Result<Self, ScanError> {
        SOURCE_DATA_TYPES.from(discriminator, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_git_sources_need_version_control() {
        assert!(!SourceData::Raw("services: {}".into()).needs_version_control());
        assert!(!SourceData::Archive("/tmp/app.tar.gz".into()).needs_version_control());
        assert!(
            SourceData::Git(GitSource {
                branch: "main".into(),
                hash: None,
            })
            .needs_version_control()
        );
    }

    #[test]
    fn should_rebuild_from_discriminator_and_payload() {
        let source = SourceData::Git(GitSource {
            branch: "main".into(),
            hash: Some("abc123".into()),
        });

        let rebuilt =
            SourceData::from_parts(source.discriminator(), source.payload().unwrap()).unwrap();

        assert_eq!(rebuilt, source);
        assert!(SourceData::from_parts("svn", Value::Null).is_err());
    }
}

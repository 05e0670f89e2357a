//! Decoded distribution notifications.
use serde::{Deserialize, Serialize};

/// An artifact announced by a distribution notification.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Artifact {
    /// Artifact name.
    pub name: String,

    /// Artifact type, such as `TOSCA_CSAR` or `HEAT`.
    pub artifact_type: String,

    /// Location the artifact can be downloaded from.
    pub url: String,

    /// Checksum of the artifact contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Artifact version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Unique identifier of the artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// How long consumers should wait for the artifact, in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,
}

impl Artifact {
    /// Creates a new `Artifact` with only the required fields set.
    pub fn new<N, T, U>(name: N, artifact_type: T, url: U) -> Self
    where
        N: Into<String>,
        T: Into<String>,
        U: Into<String>,
    {
        Self {
            name: name.into(),
            artifact_type: artifact_type.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

/// A decoded notification that a distribution has new or changed artifacts.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArtifactNotification {
    /// Identifier of the distribution this notification belongs to.
    pub distribution_id: String,

    /// Name of the service the artifacts belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Unique identifier of the service the artifacts belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_uuid: Option<String>,

    /// Announced artifacts, in notification order.
    pub artifacts: Vec<Artifact>,
}

impl ArtifactNotification {
    /// Creates a new `ArtifactNotification` for the given distribution and artifacts.
    pub fn new<D: Into<String>>(distribution_id: D, artifacts: Vec<Artifact>) -> Self {
        Self {
            distribution_id: distribution_id.into(),
            artifacts,
            ..Default::default()
        }
    }
}

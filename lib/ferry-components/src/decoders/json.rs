use ferry_config::validation::validate_string_parameter;
use ferry_core::{
    decoding::{DecodingError, NotificationDecoder},
    model::{Artifact, ArtifactNotification},
};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationDocument {
    #[serde(rename = "distributionID", default)]
    distribution_id: String,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(rename = "serviceUUID", default)]
    service_uuid: Option<String>,
    #[serde(default)]
    service_artifacts: Vec<ArtifactDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactDocument {
    #[serde(default)]
    artifact_name: String,
    #[serde(default)]
    artifact_type: String,
    #[serde(rename = "artifactURL", default)]
    artifact_url: String,
    #[serde(default)]
    artifact_checksum: Option<String>,
    #[serde(default)]
    artifact_version: Option<String>,
    #[serde(rename = "artifactUUID", default)]
    artifact_uuid: Option<String>,
    #[serde(default)]
    artifact_description: Option<String>,
    #[serde(default)]
    artifact_timeout: Option<u64>,
}

impl ArtifactDocument {
    fn into_artifact(self, index: usize) -> Result<Artifact, DecodingError> {
        let required = [
            ("artifactName", &self.artifact_name),
            ("artifactType", &self.artifact_type),
            ("artifactURL", &self.artifact_url),
        ];
        if let Some((field, _)) = required
            .iter()
            .find(|(_, value)| !validate_string_parameter(value.as_str()))
        {
            return Err(DecodingError::MissingField {
                field: format!("serviceArtifacts[{}].{}", index, field),
            });
        }

        Ok(Artifact {
            name: self.artifact_name,
            artifact_type: self.artifact_type,
            url: self.artifact_url,
            checksum: self.artifact_checksum,
            version: self.artifact_version,
            uuid: self.artifact_uuid,
            description: self.artifact_description,
            timeout_minutes: self.artifact_timeout,
        })
    }
}

/// Decodes JSON distribution notifications.
///
/// When artifact types are configured, artifacts of any other type are dropped from the decoded notification.
#[derive(Clone, Debug, Default)]
pub struct JsonNotificationDecoder {
    artifact_types: Vec<String>,
}

impl JsonNotificationDecoder {
    /// Creates a new `JsonNotificationDecoder` that keeps every artifact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keeps artifacts of the given types.
    pub fn with_artifact_types<I, S>(mut self, artifact_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.artifact_types = artifact_types.into_iter().map(Into::into).collect();
        self
    }

    fn is_wanted(&self, artifact: &Artifact) -> bool {
        self.artifact_types.is_empty() || self.artifact_types.contains(&artifact.artifact_type)
    }
}

impl NotificationDecoder for JsonNotificationDecoder {
    fn decode(&self, raw: &[u8]) -> Result<ArtifactNotification, DecodingError> {
        let document: NotificationDocument = serde_json::from_slice(raw).map_err(|e| DecodingError::Malformed {
            reason: e.to_string(),
        })?;

        if !validate_string_parameter(document.distribution_id.as_str()) {
            return Err(DecodingError::MissingField {
                field: "distributionID".to_string(),
            });
        }

        let mut artifacts = Vec::with_capacity(document.service_artifacts.len());
        for (index, artifact) in document.service_artifacts.into_iter().enumerate() {
            let artifact = artifact.into_artifact(index)?;
            if self.is_wanted(&artifact) {
                artifacts.push(artifact);
            }
        }

        // A notification with nothing to forward is never dispatched.
        if artifacts.is_empty() {
            return Err(DecodingError::NoMatchingArtifacts {
                distribution_id: document.distribution_id,
            });
        }

        Ok(ArtifactNotification {
            distribution_id: document.distribution_id,
            service_name: document.service_name,
            service_uuid: document.service_uuid,
            artifacts,
        })
    }
}

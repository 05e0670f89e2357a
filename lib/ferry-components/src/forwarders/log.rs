use ferry_core::{
    forwarding::{ArtifactForwarder, ForwarderContext, ForwardingError},
    model::Artifact,
};
use serde::Deserialize;
use tracing::info;

#[derive(Default, Deserialize)]
#[serde(default)]
struct LogForwarderConfiguration {
    label: Option<String>,
}

/// Log forwarder.
///
/// Logs every artifact it receives. The optional `label` setting replaces the forwarder name in log output.
#[derive(Default)]
pub struct LogForwarder {
    label: String,
}

impl ArtifactForwarder for LogForwarder {
    fn configure(&mut self, context: &ForwarderContext<'_>) -> Result<(), ForwardingError> {
        let configuration = context.typed_configuration::<LogForwarderConfiguration>()?;
        self.label = configuration
            .label
            .unwrap_or_else(|| context.forwarder_name().to_string());
        Ok(())
    }

    fn forward(&self, artifacts: &[Artifact]) -> Result<(), ForwardingError> {
        for artifact in artifacts {
            info!(
                forwarder = %self.label,
                artifact = %artifact.name,
                artifact_type = %artifact.artifact_type,
                url = %artifact.url,
                version = artifact.version.as_deref().unwrap_or("-"),
                "Artifact received."
            );
        }
        Ok(())
    }
}

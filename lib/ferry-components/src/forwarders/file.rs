use std::{
    fs::{File, OpenOptions},
    io::Write as _,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use ferry_config::validation::validate_string_parameter;
use ferry_core::{
    forwarding::{ArtifactForwarder, ForwarderContext, ForwardingError},
    model::Artifact,
};
use ferry_error::{generic_error, GenericError};
use serde::Deserialize;
use tracing::debug;

#[derive(Default, Deserialize)]
#[serde(default)]
struct FileForwarderConfiguration {
    path: String,
}

/// File forwarder.
///
/// Appends every artifact it receives to a file, as one JSON document per line. The file is named by the required `path`
/// setting, and is created, along with any missing parent directories, when the forwarder is configured.
#[derive(Default)]
pub struct FileForwarder {
    path: PathBuf,
    file: Option<Mutex<File>>,
}

impl FileForwarder {
    fn write_artifacts(&self, artifacts: &[Artifact]) -> Result<(), GenericError> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| generic_error!("file forwarder has not been configured"))?;

        let mut buffer = Vec::new();
        for artifact in artifacts {
            serde_json::to_writer(&mut buffer, artifact)?;
            buffer.push(b'\n');
        }

        let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&buffer)?;
        file.flush()?;
        Ok(())
    }
}

impl ArtifactForwarder for FileForwarder {
    fn configure(&mut self, context: &ForwarderContext<'_>) -> Result<(), ForwardingError> {
        let configuration = context.typed_configuration::<FileForwarderConfiguration>()?;
        if !validate_string_parameter(configuration.path.as_str()) {
            return Err(ForwardingError::InvalidConfiguration {
                reason: format!("forwarder '{}' requires a non-blank 'path'", context.forwarder_name()),
            });
        }

        let path = PathBuf::from(configuration.path);
        let open = || -> std::io::Result<File> {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(&path)
        };
        let file = open().map_err(|e| ForwardingError::InvalidConfiguration {
            reason: format!("failed to open '{}': {}", path.display(), e),
        })?;

        debug!(forwarder = context.forwarder_name(), path = %path.display(), "Opened artifact file.");
        self.path = path;
        self.file = Some(Mutex::new(file));
        Ok(())
    }

    fn forward(&self, artifacts: &[Artifact]) -> Result<(), ForwardingError> {
        self.write_artifacts(artifacts)
            .map_err(|source| ForwardingError::Delivery {
                artifacts: artifacts.len(),
                source: source.context(format!("failed to append to '{}'", self.path.display())),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ferry_core::parameters::ArtifactForwarderConfigurationParameterGroup;
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn configured(path: &std::path::Path) -> FileForwarder {
        let group = Arc::new(ArtifactForwarderConfigurationParameterGroup::new(
            "archive-config",
            "file",
            json!({ "path": path.to_string_lossy() }),
        ));
        let mut forwarder = FileForwarder::default();
        forwarder
            .configure(&ForwarderContext::new("archive", Some("archive-config"), Some(group)))
            .expect("configure should succeed");
        forwarder
    }

    #[test]
    fn appends_one_line_per_artifact() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("nested").join("artifacts.jsonl");
        let forwarder = configured(&path);

        forwarder
            .forward(&[Artifact::new("a", "HEAT", "http://sdc/a")])
            .expect("first forward should succeed");
        forwarder
            .forward(&[Artifact::new("b", "HEAT_ENV", "http://sdc/b")])
            .expect("second forward should succeed");

        let contents = std::fs::read_to_string(&path).expect("file should exist");
        let artifacts = contents
            .lines()
            .map(|line| serde_json::from_str::<Artifact>(line).expect("line should be an artifact"))
            .collect::<Vec<_>>();
        assert_eq!(
            artifacts,
            vec![
                Artifact::new("a", "HEAT", "http://sdc/a"),
                Artifact::new("b", "HEAT_ENV", "http://sdc/b")
            ]
        );
    }

    #[test]
    fn missing_path_is_invalid_configuration() {
        let mut forwarder = FileForwarder::default();
        let result = forwarder.configure(&ForwarderContext::new("archive", None, None));
        assert!(matches!(result, Err(ForwardingError::InvalidConfiguration { .. })));
    }

    #[test]
    fn unconfigured_forwarder_fails_delivery() {
        let forwarder = FileForwarder::default();
        let result = forwarder.forward(&[Artifact::new("a", "HEAT", "http://sdc/a")]);
        assert!(matches!(result, Err(ForwardingError::Delivery { artifacts: 1, .. })));
    }
}

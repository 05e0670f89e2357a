use std::sync::{Arc, Mutex, PoisonError};

use ferry_error::generic_error;
use serde::Deserialize;

use crate::{
    forwarding::{ArtifactForwarder, ForwarderContext, ForwarderRegistry, ForwardingError},
    model::Artifact,
};

#[derive(Default)]
struct Calls {
    configured: Vec<(String, Option<String>)>,
    forwarded: Vec<(String, Vec<String>)>,
}

/// Shared record of every call made to the recording forwarders created from it.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Calls>>,
}

impl Recorder {
    /// Forwarders configured so far, with the label from their configuration.
    pub fn configured(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).configured.clone()
    }

    /// Forward calls so far, in call order, with the names of the forwarded artifacts.
    pub fn forwarded(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).forwarded.clone()
    }

    /// Names of the forwarders invoked so far, in call order.
    pub fn invoked(&self) -> Vec<String> {
        self.forwarded().into_iter().map(|(name, _)| name).collect()
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RecordingSettings {
    label: Option<String>,
    fail_configure: bool,
    fail_forward: bool,
}

pub struct RecordingForwarder {
    recorder: Recorder,
    name: String,
    fail_forward: bool,
}

impl RecordingForwarder {
    pub fn new(recorder: &Recorder, name: &str, fail_forward: bool) -> Self {
        Self {
            recorder: recorder.clone(),
            name: name.to_string(),
            fail_forward,
        }
    }

    pub fn boxed(recorder: &Recorder, name: &str, fail_forward: bool) -> (String, Box<dyn ArtifactForwarder>) {
        (name.to_string(), Box::new(Self::new(recorder, name, fail_forward)))
    }
}

impl ArtifactForwarder for RecordingForwarder {
    fn configure(&mut self, context: &ForwarderContext<'_>) -> Result<(), ForwardingError> {
        let settings = context.typed_configuration::<RecordingSettings>()?;
        if settings.fail_configure {
            return Err(ForwardingError::InvalidConfiguration {
                reason: "configured to fail".to_string(),
            });
        }

        self.name = context.forwarder_name().to_string();
        self.fail_forward = settings.fail_forward;
        self.recorder
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .configured
            .push((self.name.clone(), settings.label));
        Ok(())
    }

    fn forward(&self, artifacts: &[Artifact]) -> Result<(), ForwardingError> {
        self.recorder
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .forwarded
            .push((self.name.clone(), artifacts.iter().map(|a| a.name.clone()).collect()));

        if self.fail_forward {
            Err(ForwardingError::Delivery {
                artifacts: artifacts.len(),
                source: generic_error!("sink '{}' is unavailable", self.name),
            })
        } else {
            Ok(())
        }
    }
}

/// Forwarder registry with a single `recording` type writing to `recorder`.
pub fn forwarder_registry(recorder: &Recorder) -> ForwarderRegistry {
    let recorder = recorder.clone();
    let mut registry = ForwarderRegistry::new("forwarder");
    registry.register("recording", move || {
        Ok(Box::new(RecordingForwarder::new(&recorder, "", false)) as Box<dyn ArtifactForwarder>)
    });
    registry
}

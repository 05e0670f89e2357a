use std::sync::{Arc, Mutex, PoisonError};

use ferry_core::{
    forwarding::{ArtifactForwarder, ForwarderContext, ForwarderRegistry, ForwardingError},
    model::Artifact,
};

/// Collects the names of every artifact forwarded to the forwarders created from it.
#[derive(Clone, Default)]
pub struct Collector {
    artifacts: Arc<Mutex<Vec<String>>>,
}

impl Collector {
    pub fn artifacts(&self) -> Vec<String> {
        self.artifacts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn boxed(&self, name: &str) -> (String, Box<dyn ArtifactForwarder>) {
        (name.to_string(), Box::new(self.clone()))
    }
}

impl ArtifactForwarder for Collector {
    fn configure(&mut self, _context: &ForwarderContext<'_>) -> Result<(), ForwardingError> {
        Ok(())
    }

    fn forward(&self, artifacts: &[Artifact]) -> Result<(), ForwardingError> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(artifacts.iter().map(|artifact| artifact.name.clone()));
        Ok(())
    }
}

/// Forwarder registry with a single `collecting` type writing to `collector`.
pub fn collecting_registry(collector: &Collector) -> ForwarderRegistry {
    let collector = collector.clone();
    let mut registry = ForwarderRegistry::new("forwarder");
    registry.register("collecting", move || Ok(Box::new(collector.clone()) as Box<dyn ArtifactForwarder>));
    registry
}

//! Reception plugin implementations.

use ferry_core::reception::{ArtifactReception, ReceptionRegistry};

mod file_drop;
pub use self::file_drop::FileDropReception;

/// Registers every built-in reception plugin: `file_drop`.
pub fn register_builtin_receptions(registry: &mut ReceptionRegistry) {
    registry.register("file_drop", || {
        Ok(Box::new(FileDropReception::default()) as Box<dyn ArtifactReception>)
    });
}

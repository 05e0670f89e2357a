use std::path::Path;

use figment::{
    providers::{Data, Format, Json, Yaml},
    value::{Dict, Map},
    Error, Metadata, Profile, Provider,
};

/// A provider whose data was read and parsed eagerly, so that file errors surface when the source is added.
pub struct ResolvedProvider {
    data: Map<Profile, Dict>,
    metadata: Metadata,
}

impl ResolvedProvider {
    pub fn from_yaml<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_file::<Yaml>("YAML file", path.as_ref())
    }

    pub fn from_json<P>(path: P) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        Self::from_file::<Json>("JSON file", path.as_ref())
    }

    fn from_file<F: Format>(source_name: &'static str, path: &Path) -> Result<Self, Error> {
        let file_data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        let data = Data::<F>::string(&file_data).data()?;

        Ok(Self {
            data,
            metadata: Metadata::from(source_name, path),
        })
    }
}

impl Provider for ResolvedProvider {
    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        Ok(self.data.clone())
    }
}

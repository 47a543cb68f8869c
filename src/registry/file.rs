// JSON document registry
// One `<project_id>.json` document per project inside a directory

use super::{validate_project_id, CustomDomainSet, DomainRegistry};
use crate::error::RegistryError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct JsonFileRegistry {
    root: PathBuf,
}

impl JsonFileRegistry {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn document_path(&self, project_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", project_id))
    }

    fn io_error(path: &Path, source: std::io::Error) -> RegistryError {
        RegistryError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn parse(project_id: &str, contents: &str) -> Result<CustomDomainSet, RegistryError> {
        let mut set: CustomDomainSet =
            serde_json::from_str(contents).map_err(|source| RegistryError::Parse {
                project_id: project_id.to_string(),
                source,
            })?;
        set.project_id = project_id.to_string();
        Ok(set)
    }
}

#[async_trait]
impl DomainRegistry for JsonFileRegistry {
    async fn get_all(&self) -> Result<BTreeMap<String, CustomDomainSet>, RegistryError> {
        let mut result = BTreeMap::new();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.root.display(), "Registry directory does not exist");
                return Ok(result);
            }
            Err(e) => return Err(Self::io_error(&self.root, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(&self.root, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(project_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_project_id(project_id).is_err() {
                debug!(path = %path.display(), "Skipping document with invalid project id");
                continue;
            }

            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Self::io_error(&path, e))?;

            // A broken document only takes its own project out of the sweep
            match Self::parse(project_id, &contents) {
                Ok(set) => {
                    result.insert(project_id.to_string(), set);
                }
                Err(e) => {
                    warn!(project_id = %project_id, error = %e, "Skipping unreadable domain set");
                }
            }
        }

        Ok(result)
    }

    async fn get(&self, project_id: &str) -> Result<CustomDomainSet, RegistryError> {
        validate_project_id(project_id)?;
        let path = self.document_path(project_id);

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(project_id.to_string()));
            }
            Err(e) => return Err(Self::io_error(&path, e)),
        };

        Self::parse(project_id, &contents)
    }

    async fn put(&self, project_id: &str, set: &CustomDomainSet) -> Result<(), RegistryError> {
        validate_project_id(project_id)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::io_error(&self.root, e))?;

        let path = self.document_path(project_id);
        let tmp = self.root.join(format!(".{}.json.tmp", project_id));
        let body = serde_json::to_vec_pretty(set).map_err(|source| RegistryError::Parse {
            project_id: project_id.to_string(),
            source,
        })?;

        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| Self::io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Self::io_error(&path, e))?;

        debug!(project_id = %project_id, path = %path.display(), "Domain set written");
        Ok(())
    }
}

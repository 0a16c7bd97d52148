//! Filesystem-backed artifact store and model registry
//!
//! Artifacts live at `{root}/{bucket}/{key}`; metadata documents at
//! `{metadata_dir}/{model_id}.yaml` (or `.yml` / `.json`).

use async_trait::async_trait;
use bytes::Bytes;
use serve_core::{ArtifactPath, ArtifactStore, Error, ModelMetadata, ModelRegistry, Result};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Reads artifacts from a local directory tree
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local file for `path`; keys may not escape the root
    pub fn resolve(&self, path: &ArtifactPath) -> Result<PathBuf> {
        let relative = Path::new(&path.bucket).join(&path.key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::download(format!(
                "artifact path {} leaves the store root",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn fetch(&self, path: &ArtifactPath) -> Result<Bytes> {
        let file = self.resolve(path)?;
        debug!("Reading artifact {} from {}", path, file.display());

        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::download(format!("no such object: {}", path)))
            }
            Err(e) => Err(Error::download(format!("failed to read {}: {}", path, e))),
        }
    }
}

const METADATA_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Reads model metadata documents from a directory
#[derive(Debug, Clone)]
pub struct FileModelRegistry {
    dir: PathBuf,
}

impl FileModelRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `metadata` as `{model_id}.yaml`
    pub async fn save(&self, metadata: &ModelMetadata) -> Result<PathBuf> {
        metadata.validate()?;
        Self::check_id(&metadata.model_id)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let file = self.dir.join(format!("{}.yaml", metadata.model_id));
        tokio::fs::write(&file, serde_yaml::to_string(metadata)?).await?;
        Ok(file)
    }

    fn check_id(model_id: &str) -> Result<()> {
        if model_id.is_empty() || model_id.contains(['/', '\\']) || model_id.starts_with('.') {
            return Err(Error::invalid_request(format!(
                "'{}' cannot be used as a metadata file name",
                model_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRegistry for FileModelRegistry {
    async fn get_metadata(&self, model_id: &str) -> Result<ModelMetadata> {
        Self::check_id(model_id)?;

        for extension in METADATA_EXTENSIONS {
            let file = self.dir.join(format!("{}.{}", model_id, extension));
            let raw = match tokio::fs::read_to_string(&file).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            debug!("Read metadata for {} from {}", model_id, file.display());
            let metadata = if extension == "json" {
                ModelMetadata::from_json(&raw)?
            } else {
                ModelMetadata::from_yaml(&raw)?
            };
            return Ok(metadata);
        }

        Err(Error::not_found(format!(
            "no metadata for {} in {}",
            model_id,
            self.dir.display()
        )))
    }
}

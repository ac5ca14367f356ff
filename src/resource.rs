//! Resource identifiers and their backing files
//!
//! The URL path is the resource ID. A resource `/user/me` is backed by
//! `<root>/user/me.braid`.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;

/// Default extension of mock resource files
pub const DEFAULT_EXTENSION: &str = "braid";

/// Resource mapping errors
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Path {0} is outside the resource root")]
    OutsideRoot(PathBuf),

    #[error("Path {0} does not have the resource extension")]
    WrongExtension(PathBuf),

    #[error("Path {0} is not valid UTF-8")]
    NonUtf8(PathBuf),

    #[error("Resource ID {0} escapes the resource root")]
    Traversal(String),
}

/// Canonical resource identifier, always starting with a single `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(String);

impl ResourceId {
    /// Normalize a path-like string into a resource ID
    pub fn new(raw: &str) -> Self {
        let normalized = raw.replace('\\', "/");
        let trimmed = normalized.trim_start_matches('/');
        Self(format!("/{}", trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether any segment would walk out of the root directory
    fn has_traversal(&self) -> bool {
        self.0.split('/').any(|segment| segment == "..")
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Maps resource IDs to files under a root directory
#[derive(Debug, Clone)]
pub struct ResourceStore {
    root: PathBuf,
    extension: String,
}

impl ResourceStore {
    /// Create a store rooted at `root`
    ///
    /// The root is canonicalized when possible so that absolute paths
    /// reported by the filesystem watcher strip cleanly.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        let root = root.into();
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self {
            root,
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Whether `path` carries the recognized resource extension
    pub fn is_resource_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.extension)
    }

    /// Backing file path for a resource ID
    pub fn path_for(&self, id: &ResourceId) -> Result<PathBuf, ResourceError> {
        if id.has_traversal() {
            return Err(ResourceError::Traversal(id.to_string()));
        }

        let relative = id.as_str().trim_start_matches('/');
        Ok(self
            .root
            .join(format!("{}.{}", relative, self.extension)))
    }

    /// Canonical resource ID for a file under the root
    pub fn resource_id_for(&self, path: &Path) -> Result<ResourceId, ResourceError> {
        if !self.is_resource_file(path) {
            return Err(ResourceError::WrongExtension(path.to_path_buf()));
        }

        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| ResourceError::OutsideRoot(path.to_path_buf()))?
            .with_extension("");

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(
                    segment
                        .to_str()
                        .ok_or_else(|| ResourceError::NonUtf8(path.to_path_buf()))?,
                ),
                Component::CurDir => {}
                _ => return Err(ResourceError::OutsideRoot(path.to_path_buf())),
            }
        }

        Ok(ResourceId::new(&segments.join("/")))
    }

    /// Whether a backing file exists for the resource
    pub async fn exists(&self, id: &ResourceId) -> bool {
        match self.path_for(id) {
            Ok(path) => tokio::fs::metadata(&path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Read the current bytes of the resource
    pub async fn read(&self, id: &ResourceId) -> std::io::Result<Bytes> {
        let path = self
            .path_for(id)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?;
        tokio::fs::read(&path).await.map(Bytes::from)
    }
}

// Static file serving for the built browser assets

use crate::{HostError, Result};
use prerender_bridge::HttpResponse;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Serves files below the static root
#[derive(Debug, Clone)]
pub struct StaticFileService {
    root_dir: PathBuf,
}

impl StaticFileService {
    /// The root may not exist yet in development; lookups then miss
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        if !root_dir.is_dir() {
            tracing::warn!(root = %root_dir.display(), "static root does not exist");
        }
        Self { root_dir }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Respond with the file at `path`
    pub async fn serve(&self, path: &str) -> Result<HttpResponse> {
        let full_path = self.root_dir.join(self.sanitize_path(path)?);

        if !full_path.is_file() {
            return Err(HostError::FileNotFound(path.to_string()));
        }

        let content = fs::read(&full_path).await?;
        Ok(HttpResponse::ok()
            .with_header("Content-Type", self.get_content_type(path))
            .with_body(content))
    }

    /// Whether a regular file exists for `path`
    pub fn exists(&self, path: &str) -> bool {
        self.sanitize_path(path)
            .map(|p| self.root_dir.join(p).is_file())
            .unwrap_or(false)
    }

    pub fn get_content_type(&self, path: &str) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string()
    }

    /// Reject traversal and absolute components
    fn sanitize_path(&self, path: &str) -> Result<PathBuf> {
        let path = path.trim_start_matches('/');
        let decoded = percent_encoding::percent_decode_str(path)
            .decode_utf8()
            .map_err(|_| HostError::InvalidPath("Invalid UTF-8 in path".to_string()))?;

        let path = Path::new(decoded.as_ref());
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(HostError::InvalidPath(
                        "Directory traversal not allowed".to_string(),
                    ));
                }
            }
        }

        Ok(path.to_path_buf())
    }
}

/// Whether the last path segment has a file extension
pub fn has_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

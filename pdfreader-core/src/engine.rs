use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// 1-based page number. `0` is reserved for "no page" (an empty bookmark).
pub type PageIndex = usize;

static FINGERPRINT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f6d2a9e-41c7-5b0e-9d8a-7c15e2b4f063").expect("valid namespace UUID")
});

/// Fingerprint for engines whose documents carry no identifier of their own.
/// Equal bytes always produce the same value.
pub fn content_fingerprint(bytes: &[u8]) -> String {
    Uuid::new_v5(&FINGERPRINT_NAMESPACE, bytes).to_string()
}

/// Key under which a document's bookmark is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Joins the engine-reported fingerprints. Returns `None` when the engine
    /// reported nothing usable.
    pub fn from_engine(parts: &[String]) -> Option<Self> {
        let joined = parts
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if joined.is_empty() {
            None
        } else {
            Some(Self(joined))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Where a document comes from. Dropped files are held in memory until the
/// session replaces them.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes { name: String, data: Bytes },
}

impl DocumentSource {
    pub fn display_name(&self) -> String {
        match self {
            DocumentSource::Path(path) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
                .unwrap_or_else(|| path.display().to_string()),
            DocumentSource::Bytes { name, .. } => name.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name} contains no pages")]
    Empty { name: String },
    #[error("{name} reported no fingerprint")]
    MissingFingerprint { name: String },
    #[error("failed to parse {name}: {message}")]
    Engine { name: String, message: String },
}

/// A loaded document. Page numbers passed to it are 1-based.
pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;
    fn fingerprints(&self) -> &[String];
    fn metadata(&self) -> &DocumentMetadata;
    fn page_viewport(&self, page: PageIndex, scale: f32) -> Result<PageViewport>;
    fn render_page(&self, page: PageIndex, scale: f32) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn load(&self, source: &DocumentSource) -> Result<Arc<dyn DocumentHandle>, LoadError>;
}

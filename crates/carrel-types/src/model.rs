//! Content model types.
//!
//! These are the serializable results and requests shared by every
//! backend: what a `get` returns, what a `save` accepts, and the stamp
//! identifying a checkpoint. Payloads are typed per content kind rather
//! than carried as opaque blobs so hosts never guess at formats.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::path::CanonicalPath;

/// Default bound on retained checkpoints per file.
pub const DEFAULT_MAX_CHECKPOINTS: usize = 5;

/// Unix-millisecond clock used for model timestamps.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// What occupies a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// A tree node that may contain children.
    Directory,
    /// A structurally validated notebook document.
    Notebook,
    /// A UTF-8 text file.
    Text,
    /// An opaque binary file.
    Binary,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Directory => "directory",
            ContentKind::Notebook => "notebook",
            ContentKind::Text => "text",
            ContentKind::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "directory" => Some(ContentKind::Directory),
            "notebook" => Some(ContentKind::Notebook),
            "text" => Some(ContentKind::Text),
            "binary" => Some(ContentKind::Binary),
            _ => None,
        }
    }

    /// True for anything stored as a file row (not a directory).
    pub fn is_file(&self) -> bool {
        !matches!(self, ContentKind::Directory)
    }
}

/// Typed content returned by `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentPayload {
    /// Parsed notebook JSON.
    Notebook(serde_json::Value),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Immediate children of a directory, name-ordered, content-free.
    Listing(Vec<ContentModel>),
}

/// Typed content accepted by `save`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePayload {
    Directory,
    Notebook(serde_json::Value),
    Text(String),
    Binary(Vec<u8>),
}

impl SavePayload {
    /// The content kind this payload stores as.
    pub fn kind(&self) -> ContentKind {
        match self {
            SavePayload::Directory => ContentKind::Directory,
            SavePayload::Notebook(_) => ContentKind::Notebook,
            SavePayload::Text(_) => ContentKind::Text,
            SavePayload::Binary(_) => ContentKind::Binary,
        }
    }
}

/// A path-addressed entry plus metadata, optionally carrying content.
///
/// Paths are backend-relative canonical strings; the router rewrites
/// them to full virtual-tree paths before results reach the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentModel {
    /// Canonical path of the entry.
    pub path: String,
    /// Final path segment (`""` for the root).
    pub name: String,
    pub kind: ContentKind,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub modified_at: i64,
    /// Stored byte size; `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Monotonic revision counter; `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
    /// Present only on `get`; `save`/`rename` return metadata alone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentPayload>,
}

impl ContentModel {
    /// Metadata-only model for the given path.
    pub fn new(path: &CanonicalPath, kind: ContentKind, created_at: i64, modified_at: i64) -> Self {
        Self {
            path: path.as_str().to_owned(),
            name: path.name().to_owned(),
            kind,
            created_at,
            modified_at,
            size: None,
            revision: None,
            content: None,
        }
    }

    /// Metadata-only directory model.
    pub fn directory(path: &CanonicalPath, created_at: i64, modified_at: i64) -> Self {
        Self::new(path, ContentKind::Directory, created_at, modified_at)
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn with_content(mut self, content: ContentPayload) -> Self {
        self.content = Some(content);
        self
    }

    /// Rewrite this model's path (and every listed child's path) to sit
    /// under `prefix`. Names are unaffected.
    pub fn apply_prefix(&mut self, prefix: &CanonicalPath) {
        if prefix.is_root() {
            return;
        }
        self.path = if self.path.is_empty() {
            prefix.as_str().to_owned()
        } else {
            format!("{}/{}", prefix.as_str(), self.path)
        };
        if let Some(ContentPayload::Listing(children)) = &mut self.content {
            for child in children {
                child.apply_prefix(prefix);
            }
        }
    }
}

/// Decode stored bytes into the typed payload for `kind`.
///
/// `path` is only used for error context. Stored notebooks that no
/// longer parse surface as `InvalidNotebook`; undecodable text means
/// the store itself is damaged.
pub fn decode_content(kind: ContentKind, bytes: &[u8], path: &str) -> crate::ContentsResult<ContentPayload> {
    use crate::ContentsError;
    match kind {
        ContentKind::Notebook => {
            let value = serde_json::from_slice(bytes).map_err(|e| {
                ContentsError::invalid_notebook(format!(
                    "stored notebook at {path} is not valid JSON: {e}"
                ))
            })?;
            Ok(ContentPayload::Notebook(value))
        }
        ContentKind::Text => {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                ContentsError::backend_unavailable(format!(
                    "stored text at {path} is not valid UTF-8"
                ))
            })?;
            Ok(ContentPayload::Text(text.to_owned()))
        }
        ContentKind::Binary => Ok(ContentPayload::Binary(bytes.to_vec())),
        ContentKind::Directory => Err(ContentsError::backend_unavailable(format!(
            "directory kind stored as file at {path}"
        ))),
    }
}

/// Validate and encode a file payload to stored bytes.
///
/// Notebook payloads are structurally validated before anything is
/// encoded, so a rejected save cannot leave partial state behind.
/// Directory payloads have no byte encoding; callers branch on
/// [`SavePayload::Directory`] before encoding.
pub fn encode_content(payload: SavePayload) -> crate::ContentsResult<(ContentKind, Vec<u8>)> {
    use crate::ContentsError;
    match payload {
        SavePayload::Directory => Err(ContentsError::backend_unavailable(
            "directory payload has no byte encoding",
        )),
        SavePayload::Notebook(value) => {
            crate::notebook::validate_notebook(&value)?;
            let bytes = serde_json::to_vec(&value)
                .map_err(|e| ContentsError::backend_unavailable(e.to_string()))?;
            Ok((ContentKind::Notebook, bytes))
        }
        SavePayload::Text(text) => Ok((ContentKind::Text, text.into_bytes())),
        SavePayload::Binary(bytes) => Ok((ContentKind::Binary, bytes)),
    }
}

/// Identity and creation time of one checkpoint.
///
/// Ids are per-file, monotonically increasing, and never reused;
/// ordering by id is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointStamp {
    pub id: i64,
    /// Unix milliseconds.
    pub created_at: i64,
}

//! Contents error types.

use thiserror::Error;

/// Error type shared by every contents backend and the router.
#[derive(Debug, Error)]
pub enum ContentsError {
    /// Malformed or traversal path. Caller error, never retried.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The parent directory for the target path does not exist.
    #[error("parent directory not found for: {0}")]
    ParentNotFound(String),

    /// A file or directory already occupies the path.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Non-recursive delete of a populated directory.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// No checkpoint with the given id for the file.
    #[error("no checkpoint {id} for file: {path}")]
    CheckpointNotFound { path: String, id: i64 },

    /// Content failed structural notebook validation. Stored data is
    /// never modified by a failed validation.
    #[error("invalid notebook: {0}")]
    InvalidNotebook(String),

    /// Transactional conflict with a concurrent operation. Transient;
    /// retry is the caller's policy.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No mount prefix matches the path and no fallback mount exists.
    #[error("no backend configured for path: {0}")]
    NoBackendConfigured(String),

    /// A mount validator rejected the path.
    #[error("path rejected by mount: {0}")]
    PathRejected(String),

    /// The underlying database or a delegated backend is unreachable or
    /// timed out. Transient; retry is the caller's policy.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl ContentsError {
    /// Create an InvalidPath error.
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a ParentNotFound error.
    pub fn parent_not_found(path: impl Into<String>) -> Self {
        Self::ParentNotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a CheckpointNotFound error.
    pub fn checkpoint_not_found(path: impl Into<String>, id: i64) -> Self {
        Self::CheckpointNotFound {
            path: path.into(),
            id,
        }
    }

    /// Create an InvalidNotebook error.
    pub fn invalid_notebook(msg: impl Into<String>) -> Self {
        Self::InvalidNotebook(msg.into())
    }

    /// Create a Conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a NoBackendConfigured error.
    pub fn no_backend(path: impl Into<String>) -> Self {
        Self::NoBackendConfigured(path.into())
    }

    /// Create a PathRejected error.
    pub fn path_rejected(msg: impl Into<String>) -> Self {
        Self::PathRejected(msg.into())
    }

    /// Create a BackendUnavailable error.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Whether retrying the same call may succeed without caller changes.
    ///
    /// Only `Conflict` and `BackendUnavailable` are transient; everything
    /// else reports a caller error and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::BackendUnavailable(_))
    }
}

/// Contents result type.
pub type ContentsResult<T> = Result<T, ContentsError>;

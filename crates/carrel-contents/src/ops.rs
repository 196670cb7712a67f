//! Contents operations trait.
//!
//! The capability set every storage backend implements. Operations are
//! path-based and synchronous per call: one logical call maps to one
//! backend action, with no handle state between calls. Paths are always
//! relative to the backend's own root; the [`ContentsRouter`] handles
//! mount resolution and path translation.
//!
//! [`ContentsRouter`]: crate::router::ContentsRouter

use async_trait::async_trait;

use carrel_types::{CheckpointStamp, ContentKind, ContentModel, ContentsResult, SavePayload};

/// Core contents operations trait.
///
/// Implementations are independently owned resources: the router never
/// assumes two backends share a transaction scope or a clock.
#[async_trait]
pub trait ContentsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get entry metadata without content.
    async fn stat(&self, path: &str) -> ContentsResult<ContentModel>;

    /// Get an entry with its content.
    ///
    /// For directories the payload is a name-ordered listing of
    /// immediate children (content-free). `want` pins the expected
    /// entry class: `Some(Directory)` fails with `NotFound` when a file
    /// occupies the path, any file kind fails when a directory does.
    /// The stored kind always decides the payload shape.
    async fn get(&self, path: &str, want: Option<ContentKind>) -> ContentsResult<ContentModel>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Create or overwrite an entry.
    ///
    /// Directories are create-only (`AlreadyExists` when occupied);
    /// file payloads upsert, bumping the revision counter on overwrite.
    /// Returns the saved entry's metadata without content.
    async fn save(&self, path: &str, payload: SavePayload) -> ContentsResult<ContentModel>;

    /// Delete an entry.
    ///
    /// Deleting a populated directory without `recursive` fails with
    /// `DirectoryNotEmpty`; with it, the whole subtree (and every owned
    /// checkpoint) goes in one atomic step.
    async fn delete(&self, path: &str, recursive: bool) -> ContentsResult<()>;

    /// Move an entry, rewriting every descendant path atomically.
    ///
    /// Returns the destination entry's metadata.
    async fn rename(&self, src: &str, dst: &str) -> ContentsResult<ContentModel>;

    // ========================================================================
    // Checkpoints
    // ========================================================================

    /// Snapshot the file's current content.
    ///
    /// When the per-file checkpoint count exceeds the backend's
    /// configured maximum, the oldest checkpoints are evicted in the
    /// same step.
    async fn create_checkpoint(&self, path: &str) -> ContentsResult<CheckpointStamp>;

    /// List a file's checkpoints, newest first.
    ///
    /// A file with no checkpoints (or no file at all) yields an empty
    /// list.
    async fn list_checkpoints(&self, path: &str) -> ContentsResult<Vec<CheckpointStamp>>;

    /// Overwrite the file's content with a checkpoint's content.
    ///
    /// Bumps the revision; the checkpoint list is unchanged.
    async fn restore_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()>;

    /// Delete one checkpoint.
    async fn delete_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()>;

    // ========================================================================
    // Convenience (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }
}

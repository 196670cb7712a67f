//! SQLite-backed contents manager.
//!
//! The document-level façade over [`ContentsDb`]: notebook-aware
//! save/get, kind resolution, listing assembly, and bounded checkpoint
//! history. Implements [`ContentsOps`], so it mounts directly into a
//! `ContentsRouter` or serves a host on its own.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use carrel_contents::ContentsOps;
use carrel_types::{
    decode_content, encode_content, CanonicalPath, CheckpointStamp, ContentKind, ContentModel,
    ContentPayload, ContentsError, ContentsResult, SavePayload, DEFAULT_MAX_CHECKPOINTS,
};

use crate::db::{ContentsDb, DirectoryRow, FileRow};

/// Thread-safe database handle.
type DbHandle = Arc<Mutex<ContentsDb>>;

/// Configuration for a SQLite contents manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteContentsConfig {
    /// Retained checkpoints per file; the oldest are evicted beyond
    /// this bound.
    pub max_checkpoints: usize,
}

impl Default for SqliteContentsConfig {
    fn default() -> Self {
        Self {
            max_checkpoints: DEFAULT_MAX_CHECKPOINTS,
        }
    }
}

/// Notebook-aware contents manager persisting to SQLite.
pub struct SqliteContents {
    db: DbHandle,
    config: SqliteContentsConfig,
}

impl SqliteContents {
    /// Open or create a store at the given database path.
    pub fn open<P: AsRef<Path>>(path: P) -> ContentsResult<Self> {
        Ok(Self::new(ContentsDb::open(path)?))
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> ContentsResult<Self> {
        Ok(Self::new(ContentsDb::in_memory()?))
    }

    /// Wrap an already opened database with default configuration.
    pub fn new(db: ContentsDb) -> Self {
        Self::with_config(db, SqliteContentsConfig::default())
    }

    /// Wrap an already opened database.
    pub fn with_config(db: ContentsDb, config: SqliteContentsConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config,
        }
    }

    fn db(&self) -> ContentsResult<MutexGuard<'_, ContentsDb>> {
        self.db
            .lock()
            .map_err(|_| ContentsError::backend_unavailable("database handle poisoned"))
    }

    fn dir_model(row: &DirectoryRow) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(&row.path)?;
        Ok(ContentModel::directory(
            &path,
            row.created_at,
            row.modified_at,
        ))
    }

    fn file_model(row: &FileRow) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(&row.path)?;
        Ok(
            ContentModel::new(&path, row.kind, row.created_at, row.modified_at)
                .with_size(row.size as u64)
                .with_revision(row.revision),
        )
    }

    /// Assemble a directory model with its listing payload.
    fn listing_model(db: &mut ContentsDb, path: &CanonicalPath) -> ContentsResult<ContentModel> {
        let row = db.get_directory(path)?;
        let (dirs, files) = db.list_directory(path)?;
        let mut children = Vec::with_capacity(dirs.len() + files.len());
        for dir in &dirs {
            children.push(Self::dir_model(dir)?);
        }
        for file in &files {
            children.push(Self::file_model(file)?);
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self::dir_model(&row)?.with_content(ContentPayload::Listing(children)))
    }

    /// A file model carrying its decoded payload.
    fn file_with_payload(db: &mut ContentsDb, path: &CanonicalPath) -> ContentsResult<ContentModel> {
        let row = db.get_file(path, true)?;
        let bytes = row.content.as_deref().unwrap_or_default();
        let payload = decode_content(row.kind, bytes, path.as_str())?;
        Ok(Self::file_model(&row)?.with_content(payload))
    }
}

#[async_trait]
impl ContentsOps for SqliteContents {
    async fn stat(&self, path: &str) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        let mut db = self.db()?;
        match db.get_file(&path, false) {
            Ok(row) => Self::file_model(&row),
            Err(ContentsError::NotFound(_)) => Self::dir_model(&db.get_directory(&path)?),
            Err(err) => Err(err),
        }
    }

    async fn get(&self, path: &str, want: Option<ContentKind>) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        let mut db = self.db()?;
        match want {
            Some(ContentKind::Directory) => Self::listing_model(&mut db, &path),
            Some(_) => Self::file_with_payload(&mut db, &path),
            None => match Self::file_with_payload(&mut db, &path) {
                Err(ContentsError::NotFound(_)) => Self::listing_model(&mut db, &path),
                other => other,
            },
        }
    }

    async fn save(&self, path: &str, payload: SavePayload) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        let mut db = self.db()?;
        let model = match payload {
            SavePayload::Directory => {
                let row = db.create_directory(&path)?;
                Self::dir_model(&row)?
            }
            file_payload => {
                // Validation happens before any row is touched.
                let (kind, bytes) = encode_content(file_payload)?;
                let row = db.save_file(&path, &bytes, kind)?;
                Self::file_model(&row)?
            }
        };
        debug!(path = path.as_str(), kind = model.kind.as_str(), "saved entry");
        Ok(model)
    }

    async fn delete(&self, path: &str, recursive: bool) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        let mut db = self.db()?;
        let result = match db.delete_file(&path) {
            Err(ContentsError::NotFound(_)) => db.delete_directory(&path, recursive),
            other => other,
        };
        if result.is_ok() {
            debug!(path = path.as_str(), recursive, "deleted entry");
        }
        result
    }

    async fn rename(&self, src: &str, dst: &str) -> ContentsResult<ContentModel> {
        let src = CanonicalPath::parse(src)?;
        let dst = CanonicalPath::parse(dst)?;
        let mut db = self.db()?;
        db.move_entry(&src, &dst)?;
        debug!(src = src.as_str(), dst = dst.as_str(), "moved entry");
        match db.get_file(&dst, false) {
            Ok(row) => Self::file_model(&row),
            Err(ContentsError::NotFound(_)) => Self::dir_model(&db.get_directory(&dst)?),
            Err(err) => Err(err),
        }
    }

    async fn create_checkpoint(&self, path: &str) -> ContentsResult<CheckpointStamp> {
        let path = CanonicalPath::parse(path)?;
        let mut db = self.db()?;
        let stamp = db.create_checkpoint(&path, self.config.max_checkpoints)?;
        debug!(path = path.as_str(), id = stamp.id, "created checkpoint");
        Ok(stamp)
    }

    async fn list_checkpoints(&self, path: &str) -> ContentsResult<Vec<CheckpointStamp>> {
        let path = CanonicalPath::parse(path)?;
        self.db()?.list_checkpoints(&path)
    }

    async fn restore_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        self.db()?.restore_checkpoint(&path, checkpoint_id)
    }

    async fn delete_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        self.db()?.delete_checkpoint(&path, checkpoint_id)
    }
}

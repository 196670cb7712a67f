//! SQLite persistence for the contents tree and checkpoints.
//!
//! Directories and files are rows keyed by canonical path with an
//! explicit parent-path column; subtrees are addressed by prefix
//! matching. Every public operation runs in exactly one transaction,
//! so multi-row mutations (subtree delete, subtree rename, checkpoint
//! eviction) are atomic end-to-end and concurrent writers are resolved
//! by SQLite's locking, surfaced to callers as `Conflict`.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use carrel_types::{
    now_millis, CanonicalPath, CheckpointStamp, ContentKind, ContentsError, ContentsResult,
};

/// How long a writer waits on a locked database before the call fails
/// with `Conflict`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
-- Tree nodes that may contain children. The root is the '' row with a
-- NULL parent; every other row's parent_path names an existing
-- directory, so the tree stays acyclic by construction.
CREATE TABLE IF NOT EXISTS directories (
    path TEXT PRIMARY KEY,
    parent_path TEXT,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_directories_parent ON directories(parent_path);

-- Leaf documents, owned by their parent directory.
CREATE TABLE IF NOT EXISTS files (
    path TEXT PRIMARY KEY,
    parent_path TEXT NOT NULL,
    content BLOB NOT NULL,
    kind TEXT NOT NULL,
    size INTEGER NOT NULL,
    revision INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_parent ON files(parent_path);

-- Immutable content snapshots, bounded per file. Ids are per-file and
-- monotonically increasing; ordering by id is creation order.
CREATE TABLE IF NOT EXISTS checkpoints (
    file_path TEXT NOT NULL,
    checkpoint_id INTEGER NOT NULL,
    content BLOB NOT NULL,
    kind TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (file_path, checkpoint_id)
);
"#;

/// A directory row.
#[derive(Debug, Clone)]
pub struct DirectoryRow {
    pub path: String,
    pub created_at: i64,
    pub modified_at: i64,
}

/// A file row, optionally carrying its content blob.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub path: String,
    pub kind: ContentKind,
    pub size: i64,
    pub revision: i64,
    pub created_at: i64,
    pub modified_at: i64,
    pub content: Option<Vec<u8>>,
}

/// Map a low-level SQLite failure onto the shared taxonomy.
///
/// Busy/locked means a concurrent transaction held us past the busy
/// timeout; a constraint violation after our own in-transaction checks
/// can only be a concurrent racer. Both are `Conflict`. Everything
/// else at this layer means the database itself is unhealthy.
fn db_err(err: rusqlite::Error) -> ContentsError {
    use rusqlite::ErrorCode;
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                ContentsError::conflict(err.to_string())
            }
            ErrorCode::ConstraintViolation => ContentsError::conflict(err.to_string()),
            _ => ContentsError::backend_unavailable(err.to_string()),
        },
        _ => ContentsError::backend_unavailable(err.to_string()),
    }
}

/// LIKE pattern matching strict descendants of a canonical path.
///
/// `%`, `_`, and `\` in segment names are escaped so they cannot widen
/// the match; pair with `ESCAPE '\'` in the query.
fn descendants_pattern(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len() + 2);
    for ch in path.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push_str("/%");
    escaped
}

fn dir_exists_tx(tx: &Transaction<'_>, path: &str) -> ContentsResult<bool> {
    let n: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM directories WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(n != 0)
}

fn file_exists_tx(tx: &Transaction<'_>, path: &str) -> ContentsResult<bool> {
    let n: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM files WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(n != 0)
}

fn occupied_tx(tx: &Transaction<'_>, path: &str) -> ContentsResult<bool> {
    Ok(dir_exists_tx(tx, path)? || file_exists_tx(tx, path)?)
}

/// Map a row from a content-free file query.
///
/// Column order: path, kind, size, revision, created_at, modified_at.
fn file_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRow> {
    let kind: String = row.get(1)?;
    Ok(FileRow {
        path: row.get(0)?,
        kind: ContentKind::parse(&kind).unwrap_or(ContentKind::Binary),
        size: row.get(2)?,
        revision: row.get(3)?,
        created_at: row.get(4)?,
        modified_at: row.get(5)?,
        content: None,
    })
}

/// Database handle for the contents tree.
///
/// Owns its connection; open at startup, drop at shutdown. There is no
/// ambient global handle.
pub struct ContentsDb {
    conn: Connection,
}

impl ContentsDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> ContentsResult<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> ContentsResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> ContentsResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        let now = now_millis();
        conn.execute(
            "INSERT OR IGNORE INTO directories (path, parent_path, created_at, modified_at)
             VALUES ('', NULL, ?1, ?1)",
            params![now],
        )
        .map_err(db_err)?;
        Ok(Self { conn })
    }

    fn read_tx(&mut self) -> ContentsResult<Transaction<'_>> {
        self.conn.transaction().map_err(db_err)
    }

    fn write_tx(&mut self) -> ContentsResult<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)
    }

    // =========================================================================
    // Directories
    // =========================================================================

    pub fn dir_exists(&mut self, path: &CanonicalPath) -> ContentsResult<bool> {
        let tx = self.read_tx()?;
        dir_exists_tx(&tx, path.as_str())
    }

    /// Create a directory. The parent must already exist.
    pub fn create_directory(&mut self, path: &CanonicalPath) -> ContentsResult<DirectoryRow> {
        let tx = self.write_tx()?;
        if path.is_root() || occupied_tx(&tx, path.as_str())? {
            return Err(ContentsError::already_exists(path.as_str()));
        }
        // Non-root paths always have a parent.
        let parent = path.parent().unwrap_or_else(CanonicalPath::root);
        if !dir_exists_tx(&tx, parent.as_str())? {
            return Err(ContentsError::parent_not_found(path.as_str()));
        }
        let now = now_millis();
        tx.execute(
            "INSERT INTO directories (path, parent_path, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![path.as_str(), parent.as_str(), now],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(DirectoryRow {
            path: path.as_str().to_owned(),
            created_at: now,
            modified_at: now,
        })
    }

    /// Get a directory row, failing with `NotFound` when absent.
    pub fn get_directory(&mut self, path: &CanonicalPath) -> ContentsResult<DirectoryRow> {
        let tx = self.read_tx()?;
        tx.query_row(
            "SELECT path, created_at, modified_at FROM directories WHERE path = ?1",
            params![path.as_str()],
            |row| {
                Ok(DirectoryRow {
                    path: row.get(0)?,
                    created_at: row.get(1)?,
                    modified_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| ContentsError::not_found(path.as_str()))
    }

    /// Immediate children of a directory, each list ordered by name.
    pub fn list_directory(
        &mut self,
        path: &CanonicalPath,
    ) -> ContentsResult<(Vec<DirectoryRow>, Vec<FileRow>)> {
        let tx = self.read_tx()?;
        if !dir_exists_tx(&tx, path.as_str())? {
            return Err(ContentsError::not_found(path.as_str()));
        }

        let mut stmt = tx
            .prepare(
                "SELECT path, created_at, modified_at FROM directories
                 WHERE parent_path = ?1 ORDER BY path",
            )
            .map_err(db_err)?;
        let dirs = stmt
            .query_map(params![path.as_str()], |row| {
                Ok(DirectoryRow {
                    path: row.get(0)?,
                    created_at: row.get(1)?,
                    modified_at: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut stmt = tx
            .prepare(
                "SELECT path, kind, size, revision, created_at, modified_at FROM files
                 WHERE parent_path = ?1 ORDER BY path",
            )
            .map_err(db_err)?;
        let files = stmt
            .query_map(params![path.as_str()], file_row)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        Ok((dirs, files))
    }

    /// Delete a directory.
    ///
    /// Without `recursive`, a populated directory fails with
    /// `DirectoryNotEmpty` and nothing changes. With it, the whole
    /// subtree — descendant directories, files, and their checkpoints —
    /// goes in one transaction.
    pub fn delete_directory(
        &mut self,
        path: &CanonicalPath,
        recursive: bool,
    ) -> ContentsResult<()> {
        if path.is_root() {
            return Err(ContentsError::invalid_path("cannot delete the root"));
        }
        let tx = self.write_tx()?;
        if !dir_exists_tx(&tx, path.as_str())? {
            return Err(ContentsError::not_found(path.as_str()));
        }
        let children: i64 = tx
            .query_row(
                "SELECT (SELECT COUNT(*) FROM directories WHERE parent_path = ?1)
                      + (SELECT COUNT(*) FROM files WHERE parent_path = ?1)",
                params![path.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if children > 0 && !recursive {
            return Err(ContentsError::directory_not_empty(path.as_str()));
        }

        let pattern = descendants_pattern(path.as_str());
        tx.execute(
            r"DELETE FROM checkpoints WHERE file_path LIKE ?1 ESCAPE '\'",
            params![pattern],
        )
        .map_err(db_err)?;
        tx.execute(
            r"DELETE FROM files WHERE path LIKE ?1 ESCAPE '\'",
            params![pattern],
        )
        .map_err(db_err)?;
        tx.execute(
            r"DELETE FROM directories WHERE path LIKE ?1 ESCAPE '\'",
            params![pattern],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM directories WHERE path = ?1",
            params![path.as_str()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    // =========================================================================
    // Files
    // =========================================================================

    pub fn file_exists(&mut self, path: &CanonicalPath) -> ContentsResult<bool> {
        let tx = self.read_tx()?;
        file_exists_tx(&tx, path.as_str())
    }

    /// Create a file with revision 1. Fails when anything occupies the
    /// path or the parent directory is missing.
    pub fn create_file(
        &mut self,
        path: &CanonicalPath,
        content: &[u8],
        kind: ContentKind,
    ) -> ContentsResult<FileRow> {
        let tx = self.write_tx()?;
        if path.is_root() || occupied_tx(&tx, path.as_str())? {
            return Err(ContentsError::already_exists(path.as_str()));
        }
        let parent = path.parent().unwrap_or_else(CanonicalPath::root);
        if !dir_exists_tx(&tx, parent.as_str())? {
            return Err(ContentsError::parent_not_found(path.as_str()));
        }
        let now = now_millis();
        tx.execute(
            "INSERT INTO files (path, parent_path, content, kind, size, revision, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                path.as_str(),
                parent.as_str(),
                content,
                kind.as_str(),
                content.len() as i64,
                now
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(FileRow {
            path: path.as_str().to_owned(),
            kind,
            size: content.len() as i64,
            revision: 1,
            created_at: now,
            modified_at: now,
            content: None,
        })
    }

    /// Create or overwrite a file. Overwriting bumps the revision and
    /// keeps the creation timestamp; a directory at the path still
    /// fails with `AlreadyExists`.
    pub fn save_file(
        &mut self,
        path: &CanonicalPath,
        content: &[u8],
        kind: ContentKind,
    ) -> ContentsResult<FileRow> {
        let tx = self.write_tx()?;
        if path.is_root() || dir_exists_tx(&tx, path.as_str())? {
            return Err(ContentsError::already_exists(path.as_str()));
        }
        let now = now_millis();
        let existing = tx
            .query_row(
                "SELECT revision, created_at FROM files WHERE path = ?1",
                params![path.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let row = match existing {
            Some((revision, created_at)) => {
                tx.execute(
                    "UPDATE files SET content = ?2, kind = ?3, size = ?4, revision = revision + 1,
                                      modified_at = ?5
                     WHERE path = ?1",
                    params![
                        path.as_str(),
                        content,
                        kind.as_str(),
                        content.len() as i64,
                        now
                    ],
                )
                .map_err(db_err)?;
                FileRow {
                    path: path.as_str().to_owned(),
                    kind,
                    size: content.len() as i64,
                    revision: revision + 1,
                    created_at,
                    modified_at: now,
                    content: None,
                }
            }
            None => {
                let parent = path.parent().unwrap_or_else(CanonicalPath::root);
                if !dir_exists_tx(&tx, parent.as_str())? {
                    return Err(ContentsError::parent_not_found(path.as_str()));
                }
                tx.execute(
                    "INSERT INTO files (path, parent_path, content, kind, size, revision, created_at, modified_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
                    params![
                        path.as_str(),
                        parent.as_str(),
                        content,
                        kind.as_str(),
                        content.len() as i64,
                        now
                    ],
                )
                .map_err(db_err)?;
                FileRow {
                    path: path.as_str().to_owned(),
                    kind,
                    size: content.len() as i64,
                    revision: 1,
                    created_at: now,
                    modified_at: now,
                    content: None,
                }
            }
        };
        tx.commit().map_err(db_err)?;
        Ok(row)
    }

    /// Get a file row, optionally with its content blob.
    pub fn get_file(
        &mut self,
        path: &CanonicalPath,
        with_content: bool,
    ) -> ContentsResult<FileRow> {
        let tx = self.read_tx()?;
        let row = if with_content {
            tx.query_row(
                "SELECT path, kind, size, revision, created_at, modified_at, content
                 FROM files WHERE path = ?1",
                params![path.as_str()],
                |row| {
                    let mut file = file_row(row)?;
                    file.content = Some(row.get(6)?);
                    Ok(file)
                },
            )
        } else {
            tx.query_row(
                "SELECT path, kind, size, revision, created_at, modified_at
                 FROM files WHERE path = ?1",
                params![path.as_str()],
                file_row,
            )
        };
        row.optional()
            .map_err(db_err)?
            .ok_or_else(|| ContentsError::not_found(path.as_str()))
    }

    /// Replace a file's content in place, bumping the revision.
    pub fn update_file(
        &mut self,
        path: &CanonicalPath,
        content: &[u8],
        kind: ContentKind,
    ) -> ContentsResult<()> {
        let tx = self.write_tx()?;
        let changed = tx
            .execute(
                "UPDATE files SET content = ?2, kind = ?3, size = ?4, revision = revision + 1,
                                  modified_at = ?5
                 WHERE path = ?1",
                params![
                    path.as_str(),
                    content,
                    kind.as_str(),
                    content.len() as i64,
                    now_millis()
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ContentsError::not_found(path.as_str()));
        }
        tx.commit().map_err(db_err)
    }

    /// Delete a file and its checkpoints.
    pub fn delete_file(&mut self, path: &CanonicalPath) -> ContentsResult<()> {
        let tx = self.write_tx()?;
        let removed = tx
            .execute("DELETE FROM files WHERE path = ?1", params![path.as_str()])
            .map_err(db_err)?;
        if removed == 0 {
            return Err(ContentsError::not_found(path.as_str()));
        }
        tx.execute(
            "DELETE FROM checkpoints WHERE file_path = ?1",
            params![path.as_str()],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Move a file or directory, rewriting every descendant path (and
    /// checkpoint ownership) in one transaction. No intermediate state
    /// is ever observable.
    pub fn move_entry(
        &mut self,
        src: &CanonicalPath,
        dst: &CanonicalPath,
    ) -> ContentsResult<()> {
        if src.is_root() {
            return Err(ContentsError::invalid_path("cannot rename the root"));
        }
        let tx = self.write_tx()?;
        let src_is_dir = dir_exists_tx(&tx, src.as_str())?;
        if !src_is_dir && !file_exists_tx(&tx, src.as_str())? {
            return Err(ContentsError::not_found(src.as_str()));
        }
        if occupied_tx(&tx, dst.as_str())? {
            return Err(ContentsError::already_exists(dst.as_str()));
        }
        if src.is_ancestor_of(dst) {
            return Err(ContentsError::invalid_path(format!(
                "destination {dst} is inside source {src}"
            )));
        }
        // dst is not the root here: the root always exists, so it was
        // caught by the occupation check above.
        let dst_parent = dst.parent().unwrap_or_else(CanonicalPath::root);
        if !dir_exists_tx(&tx, dst_parent.as_str())? {
            return Err(ContentsError::parent_not_found(dst.as_str()));
        }

        let now = now_millis();
        if src_is_dir {
            tx.execute(
                "UPDATE directories SET path = ?2, parent_path = ?3, modified_at = ?4
                 WHERE path = ?1",
                params![src.as_str(), dst.as_str(), dst_parent.as_str(), now],
            )
            .map_err(db_err)?;

            // Descendants carry the source prefix in both path columns,
            // so a single prefix rewrite covers each table.
            let pattern = descendants_pattern(src.as_str());
            tx.execute(
                r"UPDATE directories
                     SET path = ?2 || substr(path, length(?1) + 1),
                         parent_path = ?2 || substr(parent_path, length(?1) + 1)
                   WHERE path LIKE ?3 ESCAPE '\'",
                params![src.as_str(), dst.as_str(), pattern],
            )
            .map_err(db_err)?;
            tx.execute(
                r"UPDATE files
                     SET path = ?2 || substr(path, length(?1) + 1),
                         parent_path = ?2 || substr(parent_path, length(?1) + 1)
                   WHERE path LIKE ?3 ESCAPE '\'",
                params![src.as_str(), dst.as_str(), pattern],
            )
            .map_err(db_err)?;
            tx.execute(
                r"UPDATE checkpoints
                     SET file_path = ?2 || substr(file_path, length(?1) + 1)
                   WHERE file_path LIKE ?3 ESCAPE '\'",
                params![src.as_str(), dst.as_str(), pattern],
            )
            .map_err(db_err)?;
        } else {
            tx.execute(
                "UPDATE files SET path = ?2, parent_path = ?3, modified_at = ?4
                 WHERE path = ?1",
                params![src.as_str(), dst.as_str(), dst_parent.as_str(), now],
            )
            .map_err(db_err)?;
            tx.execute(
                "UPDATE checkpoints SET file_path = ?2 WHERE file_path = ?1",
                params![src.as_str(), dst.as_str()],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)
    }

    // =========================================================================
    // Checkpoints
    // =========================================================================

    /// Snapshot a file's current content, evicting the oldest
    /// checkpoints beyond `max` in the same transaction.
    pub fn create_checkpoint(
        &mut self,
        path: &CanonicalPath,
        max: usize,
    ) -> ContentsResult<CheckpointStamp> {
        let tx = self.write_tx()?;
        let current = tx
            .query_row(
                "SELECT content, kind FROM files WHERE path = ?1",
                params![path.as_str()],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((content, kind)) = current else {
            return Err(ContentsError::not_found(path.as_str()));
        };

        let id: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(checkpoint_id), 0) + 1 FROM checkpoints WHERE file_path = ?1",
                params![path.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        let now = now_millis();
        tx.execute(
            "INSERT INTO checkpoints (file_path, checkpoint_id, content, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![path.as_str(), id, content, kind, now],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM checkpoints
              WHERE file_path = ?1
                AND checkpoint_id NOT IN (
                    SELECT checkpoint_id FROM checkpoints WHERE file_path = ?1
                    ORDER BY checkpoint_id DESC LIMIT ?2)",
            params![path.as_str(), max as i64],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(CheckpointStamp {
            id,
            created_at: now,
        })
    }

    /// List a file's checkpoints, newest first. A missing file yields
    /// an empty list.
    pub fn list_checkpoints(
        &mut self,
        path: &CanonicalPath,
    ) -> ContentsResult<Vec<CheckpointStamp>> {
        let tx = self.read_tx()?;
        let mut stmt = tx
            .prepare(
                "SELECT checkpoint_id, created_at FROM checkpoints
                 WHERE file_path = ?1 ORDER BY checkpoint_id DESC",
            )
            .map_err(db_err)?;
        let stamps = stmt
            .query_map(params![path.as_str()], |row| {
                Ok(CheckpointStamp {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(stamps)
    }

    /// Overwrite the file's content with a checkpoint's content,
    /// bumping the revision. The checkpoint itself is untouched.
    pub fn restore_checkpoint(
        &mut self,
        path: &CanonicalPath,
        checkpoint_id: i64,
    ) -> ContentsResult<()> {
        let tx = self.write_tx()?;
        let snapshot = tx
            .query_row(
                "SELECT content, kind FROM checkpoints
                 WHERE file_path = ?1 AND checkpoint_id = ?2",
                params![path.as_str(), checkpoint_id],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        let Some((content, kind)) = snapshot else {
            return Err(ContentsError::checkpoint_not_found(
                path.as_str(),
                checkpoint_id,
            ));
        };
        let changed = tx
            .execute(
                "UPDATE files SET content = ?2, kind = ?3, size = ?4, revision = revision + 1,
                                  modified_at = ?5
                 WHERE path = ?1",
                params![
                    path.as_str(),
                    content,
                    kind,
                    content.len() as i64,
                    now_millis()
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(ContentsError::not_found(path.as_str()));
        }
        tx.commit().map_err(db_err)
    }

    /// Delete one checkpoint.
    pub fn delete_checkpoint(
        &mut self,
        path: &CanonicalPath,
        checkpoint_id: i64,
    ) -> ContentsResult<()> {
        let tx = self.write_tx()?;
        let removed = tx
            .execute(
                "DELETE FROM checkpoints WHERE file_path = ?1 AND checkpoint_id = ?2",
                params![path.as_str(), checkpoint_id],
            )
            .map_err(db_err)?;
        if removed == 0 {
            return Err(ContentsError::checkpoint_not_found(
                path.as_str(),
                checkpoint_id,
            ));
        }
        tx.commit().map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> CanonicalPath {
        CanonicalPath::parse(s).unwrap()
    }

    fn db_with_tree() -> ContentsDb {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_directory(&path("a")).unwrap();
        db.create_directory(&path("a/x")).unwrap();
        db.create_file(&path("a/f.txt"), b"top", ContentKind::Text)
            .unwrap();
        db.create_file(&path("a/x/deep.txt"), b"deep", ContentKind::Text)
            .unwrap();
        db
    }

    #[test]
    fn root_exists_after_open() {
        let mut db = ContentsDb::in_memory().unwrap();
        assert!(db.dir_exists(&CanonicalPath::root()).unwrap());
        let (dirs, files) = db.list_directory(&CanonicalPath::root()).unwrap();
        assert!(dirs.is_empty());
        assert!(files.is_empty());
    }

    #[test]
    fn create_directory_contract() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_directory(&path("docs")).unwrap();

        let err = db.create_directory(&path("docs")).unwrap_err();
        assert!(matches!(err, ContentsError::AlreadyExists(_)));

        let err = db.create_directory(&path("missing/child")).unwrap_err();
        assert!(matches!(err, ContentsError::ParentNotFound(_)));

        let err = db.create_directory(&CanonicalPath::root()).unwrap_err();
        assert!(matches!(err, ContentsError::AlreadyExists(_)));
    }

    #[test]
    fn create_file_requires_parent_row() {
        let mut db = ContentsDb::in_memory().unwrap();
        let err = db
            .create_file(&path("nodir/f.txt"), b"x", ContentKind::Text)
            .unwrap_err();
        assert!(matches!(err, ContentsError::ParentNotFound(_)));
        // The failed create left nothing behind.
        assert!(!db.file_exists(&path("nodir/f.txt")).unwrap());
    }

    #[test]
    fn file_and_directory_share_the_namespace() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_directory(&path("taken")).unwrap();
        let err = db
            .create_file(&path("taken"), b"x", ContentKind::Text)
            .unwrap_err();
        assert!(matches!(err, ContentsError::AlreadyExists(_)));

        db.create_file(&path("f"), b"x", ContentKind::Text).unwrap();
        let err = db.create_directory(&path("f")).unwrap_err();
        assert!(matches!(err, ContentsError::AlreadyExists(_)));
    }

    #[test]
    fn save_file_upserts() {
        let mut db = ContentsDb::in_memory().unwrap();
        let first = db
            .save_file(&path("f.txt"), b"one", ContentKind::Text)
            .unwrap();
        let second = db
            .save_file(&path("f.txt"), b"twotwo", ContentKind::Text)
            .unwrap();
        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(second.size, 6);
        assert_eq!(second.created_at, first.created_at);

        let fetched = db.get_file(&path("f.txt"), true).unwrap();
        assert_eq!(fetched.content.as_deref(), Some(b"twotwo".as_slice()));
    }

    #[test]
    fn listing_is_immediate_children_only() {
        let mut db = db_with_tree();
        let (dirs, files) = db.list_directory(&path("a")).unwrap();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].path, "a/x");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a/f.txt");

        let err = db.list_directory(&path("missing")).unwrap_err();
        assert!(matches!(err, ContentsError::NotFound(_)));
    }

    #[test]
    fn non_recursive_delete_leaves_tree_unchanged() {
        let mut db = db_with_tree();
        let err = db.delete_directory(&path("a"), false).unwrap_err();
        assert!(matches!(err, ContentsError::DirectoryNotEmpty(_)));
        assert!(db.dir_exists(&path("a")).unwrap());
        assert!(db.dir_exists(&path("a/x")).unwrap());
        assert!(db.file_exists(&path("a/f.txt")).unwrap());
        assert!(db.file_exists(&path("a/x/deep.txt")).unwrap());
    }

    #[test]
    fn recursive_delete_removes_subtree_and_checkpoints() {
        let mut db = db_with_tree();
        db.create_checkpoint(&path("a/x/deep.txt"), 5).unwrap();

        db.delete_directory(&path("a"), true).unwrap();
        assert!(!db.dir_exists(&path("a")).unwrap());
        assert!(!db.dir_exists(&path("a/x")).unwrap());
        assert!(!db.file_exists(&path("a/f.txt")).unwrap());
        assert!(!db.file_exists(&path("a/x/deep.txt")).unwrap());
        assert!(db
            .list_checkpoints(&path("a/x/deep.txt"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn delete_root_refused() {
        let mut db = ContentsDb::in_memory().unwrap();
        let err = db
            .delete_directory(&CanonicalPath::root(), true)
            .unwrap_err();
        assert!(matches!(err, ContentsError::InvalidPath(_)));
    }

    #[test]
    fn move_directory_rewrites_descendants() {
        let mut db = db_with_tree();
        db.create_checkpoint(&path("a/x/deep.txt"), 5).unwrap();

        db.move_entry(&path("a"), &path("b")).unwrap();

        for gone in ["a", "a/x"] {
            assert!(!db.dir_exists(&path(gone)).unwrap(), "{gone} lingers");
        }
        assert!(db.dir_exists(&path("b")).unwrap());
        assert!(db.dir_exists(&path("b/x")).unwrap());
        assert!(db.file_exists(&path("b/f.txt")).unwrap());
        assert!(db.file_exists(&path("b/x/deep.txt")).unwrap());

        // Checkpoint ownership followed the move.
        assert_eq!(db.list_checkpoints(&path("b/x/deep.txt")).unwrap().len(), 1);
        assert!(db.list_checkpoints(&path("a/x/deep.txt")).unwrap().is_empty());

        // Listing of the new root sees re-parented children.
        let (dirs, files) = db.list_directory(&path("b")).unwrap();
        assert_eq!(dirs[0].path, "b/x");
        assert_eq!(files[0].path, "b/f.txt");
    }

    #[test]
    fn move_error_contract() {
        let mut db = db_with_tree();
        db.create_directory(&path("other")).unwrap();

        assert!(matches!(
            db.move_entry(&path("missing"), &path("m")).unwrap_err(),
            ContentsError::NotFound(_)
        ));
        assert!(matches!(
            db.move_entry(&path("a"), &path("other")).unwrap_err(),
            ContentsError::AlreadyExists(_)
        ));
        assert!(matches!(
            db.move_entry(&path("a"), &path("a/x/in")).unwrap_err(),
            ContentsError::InvalidPath(_)
        ));
        assert!(matches!(
            db.move_entry(&path("a"), &path("missing/m")).unwrap_err(),
            ContentsError::ParentNotFound(_)
        ));
        assert!(matches!(
            db.move_entry(&CanonicalPath::root(), &path("m")).unwrap_err(),
            ContentsError::InvalidPath(_)
        ));
    }

    #[test]
    fn move_file_carries_checkpoints() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_file(&path("f.txt"), b"v1", ContentKind::Text)
            .unwrap();
        db.create_checkpoint(&path("f.txt"), 5).unwrap();

        db.move_entry(&path("f.txt"), &path("g.txt")).unwrap();
        assert!(!db.file_exists(&path("f.txt")).unwrap());
        assert_eq!(db.list_checkpoints(&path("g.txt")).unwrap().len(), 1);
    }

    #[test]
    fn wildcard_characters_in_names_do_not_widen_subtree_matches() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_directory(&path("da%ta")).unwrap();
        db.create_directory(&path("daxta")).unwrap();
        db.create_file(&path("da%ta/inside.txt"), b"1", ContentKind::Text)
            .unwrap();
        db.create_file(&path("daxta/other.txt"), b"2", ContentKind::Text)
            .unwrap();

        db.delete_directory(&path("da%ta"), true).unwrap();

        // The sibling whose name merely matches the wildcard survives.
        assert!(db.dir_exists(&path("daxta")).unwrap());
        assert!(db.file_exists(&path("daxta/other.txt")).unwrap());
    }

    #[test]
    fn checkpoints_bound_is_enforced_fifo() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_file(&path("f.txt"), b"v0", ContentKind::Text)
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..7 {
            db.update_file(&path("f.txt"), format!("v{i}").as_bytes(), ContentKind::Text)
                .unwrap();
            ids.push(db.create_checkpoint(&path("f.txt"), 5).unwrap().id);
        }

        let listed: Vec<i64> = db
            .list_checkpoints(&path("f.txt"))
            .unwrap()
            .iter()
            .map(|s| s.id)
            .collect();
        // Exactly the 5 most recent, newest first, oldest two evicted.
        assert_eq!(listed, ids[2..].iter().rev().copied().collect::<Vec<_>>());
    }

    #[test]
    fn restore_checkpoint_replays_content() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_file(&path("f.txt"), b"old", ContentKind::Text)
            .unwrap();
        let stamp = db.create_checkpoint(&path("f.txt"), 5).unwrap();
        db.update_file(&path("f.txt"), b"new", ContentKind::Text)
            .unwrap();

        db.restore_checkpoint(&path("f.txt"), stamp.id).unwrap();

        let row = db.get_file(&path("f.txt"), true).unwrap();
        assert_eq!(row.content.as_deref(), Some(b"old".as_slice()));
        assert_eq!(row.revision, 3);
        // Restoring consumes nothing.
        assert_eq!(db.list_checkpoints(&path("f.txt")).unwrap().len(), 1);
    }

    #[test]
    fn checkpoint_not_found_contract() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_file(&path("f.txt"), b"x", ContentKind::Text)
            .unwrap();

        assert!(matches!(
            db.restore_checkpoint(&path("f.txt"), 9).unwrap_err(),
            ContentsError::CheckpointNotFound { .. }
        ));
        assert!(matches!(
            db.delete_checkpoint(&path("f.txt"), 9).unwrap_err(),
            ContentsError::CheckpointNotFound { .. }
        ));
        assert!(matches!(
            db.create_checkpoint(&path("missing.txt"), 5).unwrap_err(),
            ContentsError::NotFound(_)
        ));
    }

    #[test]
    fn checkpoint_ids_restart_per_file() {
        let mut db = ContentsDb::in_memory().unwrap();
        db.create_file(&path("a.txt"), b"a", ContentKind::Text)
            .unwrap();
        db.create_file(&path("b.txt"), b"b", ContentKind::Text)
            .unwrap();

        assert_eq!(db.create_checkpoint(&path("a.txt"), 5).unwrap().id, 1);
        assert_eq!(db.create_checkpoint(&path("a.txt"), 5).unwrap().id, 2);
        assert_eq!(db.create_checkpoint(&path("b.txt"), 5).unwrap().id, 1);
    }

    #[test]
    fn busy_and_constraint_failures_map_to_conflict() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(db_err(busy), ContentsError::Conflict(_)));

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(matches!(db_err(constraint), ContentsError::Conflict(_)));

        let cantopen = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            None,
        );
        assert!(matches!(
            db_err(cantopen),
            ContentsError::BackendUnavailable(_)
        ));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("contents.db");

        {
            let mut db = ContentsDb::open(&db_path).unwrap();
            db.create_directory(&path("docs")).unwrap();
            db.create_file(&path("docs/f.txt"), b"persisted", ContentKind::Text)
                .unwrap();
        }

        let mut db = ContentsDb::open(&db_path).unwrap();
        let row = db.get_file(&path("docs/f.txt"), true).unwrap();
        assert_eq!(row.content.as_deref(), Some(b"persisted".as_slice()));
    }
}

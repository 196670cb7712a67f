//! In-memory contents backend.
//!
//! A scratch tree for tests and ephemeral mounts. All data is lost on
//! drop. Honors the same contracts as the persistent backends: parent
//! checks, occupation checks, atomic subtree renames, and bounded
//! checkpoint history with insertion-order eviction.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use carrel_types::{
    decode_content, encode_content, now_millis, CanonicalPath, CheckpointStamp, ContentKind,
    ContentModel, ContentPayload, ContentsError, ContentsResult, SavePayload,
    DEFAULT_MAX_CHECKPOINTS,
};

use crate::ops::ContentsOps;

/// One retained snapshot of a file's content.
#[derive(Debug, Clone)]
struct MemCheckpoint {
    id: i64,
    kind: ContentKind,
    content: Vec<u8>,
    created_at: i64,
}

/// A file entry with its checkpoint history.
#[derive(Debug, Clone)]
struct FileNode {
    kind: ContentKind,
    content: Vec<u8>,
    revision: i64,
    created_at: i64,
    modified_at: i64,
    checkpoints: Vec<MemCheckpoint>,
    next_checkpoint_id: i64,
}

/// Entry in the memory tree.
#[derive(Debug, Clone)]
enum Node {
    Directory { created_at: i64, modified_at: i64 },
    File(FileNode),
}

/// In-memory contents backend.
///
/// Thread-safe via internal `RwLock`; keyed by canonical path string so
/// listings fall out of map order.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Node>>,
    max_checkpoints: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// True when `key` lies strictly beneath `prefix` on a segment boundary.
fn key_is_under(key: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return !key.is_empty();
    }
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Containing directory of a canonical key (`""` for top-level names).
fn key_parent(key: &str) -> &str {
    key.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

impl MemoryBackend {
    /// Create an empty tree holding only the root directory.
    pub fn new() -> Self {
        Self::with_max_checkpoints(DEFAULT_MAX_CHECKPOINTS)
    }

    /// Create an empty tree with a custom checkpoint bound.
    pub fn with_max_checkpoints(max_checkpoints: usize) -> Self {
        let mut entries = BTreeMap::new();
        let now = now_millis();
        entries.insert(
            String::new(),
            Node::Directory {
                created_at: now,
                modified_at: now,
            },
        );
        Self {
            entries: RwLock::new(entries),
            max_checkpoints,
        }
    }

    fn read_entries(&self) -> ContentsResult<RwLockReadGuard<'_, BTreeMap<String, Node>>> {
        self.entries
            .read()
            .map_err(|_| ContentsError::backend_unavailable("lock poisoned"))
    }

    fn write_entries(&self) -> ContentsResult<RwLockWriteGuard<'_, BTreeMap<String, Node>>> {
        self.entries
            .write()
            .map_err(|_| ContentsError::backend_unavailable("lock poisoned"))
    }

    /// Content-free model for an entry.
    fn model_for(path: &CanonicalPath, node: &Node) -> ContentModel {
        match node {
            Node::Directory {
                created_at,
                modified_at,
            } => ContentModel::directory(path, *created_at, *modified_at),
            Node::File(f) => ContentModel::new(path, f.kind, f.created_at, f.modified_at)
                .with_size(f.content.len() as u64)
                .with_revision(f.revision),
        }
    }

    fn create_directory(&self, path: &CanonicalPath) -> ContentsResult<ContentModel> {
        let mut entries = self.write_entries()?;
        if entries.contains_key(path.as_str()) {
            return Err(ContentsError::already_exists(path.as_str()));
        }
        // Non-root paths always have a parent; root is always occupied.
        let parent = path.parent().unwrap_or_else(CanonicalPath::root);
        match entries.get(parent.as_str()) {
            Some(Node::Directory { .. }) => {}
            _ => return Err(ContentsError::parent_not_found(path.as_str())),
        }
        let now = now_millis();
        let node = Node::Directory {
            created_at: now,
            modified_at: now,
        };
        let model = Self::model_for(path, &node);
        entries.insert(path.as_str().to_owned(), node);
        Ok(model)
    }

    fn save_file(&self, path: &CanonicalPath, payload: SavePayload) -> ContentsResult<ContentModel> {
        // Validate and encode before touching any state so a rejected
        // payload leaves the stored entry unmodified.
        let (kind, bytes) = encode_content(payload)?;

        let mut entries = self.write_entries()?;
        let now = now_millis();
        match entries.get_mut(path.as_str()) {
            Some(Node::Directory { .. }) => Err(ContentsError::already_exists(path.as_str())),
            Some(Node::File(f)) => {
                f.kind = kind;
                f.content = bytes;
                f.revision += 1;
                f.modified_at = now;
                Ok(ContentModel::new(path, f.kind, f.created_at, f.modified_at)
                    .with_size(f.content.len() as u64)
                    .with_revision(f.revision))
            }
            None => {
                // Non-root here: the root is always occupied by a
                // directory and was caught above.
                let parent = path.parent().unwrap_or_else(CanonicalPath::root);
                match entries.get(parent.as_str()) {
                    Some(Node::Directory { .. }) => {}
                    _ => return Err(ContentsError::parent_not_found(path.as_str())),
                }
                let node = Node::File(FileNode {
                    kind,
                    content: bytes,
                    revision: 1,
                    created_at: now,
                    modified_at: now,
                    checkpoints: Vec::new(),
                    next_checkpoint_id: 1,
                });
                let model = Self::model_for(path, &node);
                entries.insert(path.as_str().to_owned(), node);
                Ok(model)
            }
        }
    }
}

#[async_trait]
impl ContentsOps for MemoryBackend {
    async fn stat(&self, path: &str) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        let entries = self.read_entries()?;
        entries
            .get(path.as_str())
            .map(|node| Self::model_for(&path, node))
            .ok_or_else(|| ContentsError::not_found(path.as_str()))
    }

    async fn get(&self, path: &str, want: Option<ContentKind>) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        let entries = self.read_entries()?;
        match entries.get(path.as_str()) {
            None => Err(ContentsError::not_found(path.as_str())),
            Some(node @ Node::Directory { .. }) => {
                if want.is_some_and(|k| k.is_file()) {
                    return Err(ContentsError::not_found(path.as_str()));
                }
                let children = entries
                    .iter()
                    .filter(|(key, _)| !key.is_empty() && key_parent(key) == path.as_str())
                    .map(|(key, child)| {
                        let child_path = CanonicalPath::parse(key)?;
                        Ok(Self::model_for(&child_path, child))
                    })
                    .collect::<ContentsResult<Vec<_>>>()?;
                Ok(Self::model_for(&path, node).with_content(ContentPayload::Listing(children)))
            }
            Some(node @ Node::File(f)) => {
                if want == Some(ContentKind::Directory) {
                    return Err(ContentsError::not_found(path.as_str()));
                }
                let payload = decode_content(f.kind, &f.content, path.as_str())?;
                Ok(Self::model_for(&path, node).with_content(payload))
            }
        }
    }

    async fn save(&self, path: &str, payload: SavePayload) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        match payload {
            SavePayload::Directory => self.create_directory(&path),
            other => self.save_file(&path, other),
        }
    }

    async fn delete(&self, path: &str, recursive: bool) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        if path.is_root() {
            return Err(ContentsError::invalid_path("cannot delete the root"));
        }
        let mut entries = self.write_entries()?;
        match entries.get(path.as_str()) {
            None => Err(ContentsError::not_found(path.as_str())),
            Some(Node::File(_)) => {
                entries.remove(path.as_str());
                Ok(())
            }
            Some(Node::Directory { .. }) => {
                let populated = entries.keys().any(|key| key_is_under(key, path.as_str()));
                if populated && !recursive {
                    return Err(ContentsError::directory_not_empty(path.as_str()));
                }
                entries
                    .retain(|key, _| key != path.as_str() && !key_is_under(key, path.as_str()));
                Ok(())
            }
        }
    }

    async fn rename(&self, src: &str, dst: &str) -> ContentsResult<ContentModel> {
        let src = CanonicalPath::parse(src)?;
        let dst = CanonicalPath::parse(dst)?;
        if src.is_root() {
            return Err(ContentsError::invalid_path("cannot rename the root"));
        }
        let mut entries = self.write_entries()?;
        if !entries.contains_key(src.as_str()) {
            return Err(ContentsError::not_found(src.as_str()));
        }
        if entries.contains_key(dst.as_str()) {
            return Err(ContentsError::already_exists(dst.as_str()));
        }
        if src.is_ancestor_of(&dst) {
            return Err(ContentsError::invalid_path(format!(
                "destination {dst} is inside source {src}"
            )));
        }
        // dst is not the root here: the root always exists, so it was
        // caught by the occupation check above.
        let parent = dst.parent().unwrap_or_else(CanonicalPath::root);
        match entries.get(parent.as_str()) {
            Some(Node::Directory { .. }) => {}
            _ => return Err(ContentsError::parent_not_found(dst.as_str())),
        }

        let moved: Vec<String> = entries
            .keys()
            .filter(|key| *key == src.as_str() || key_is_under(key, src.as_str()))
            .cloned()
            .collect();
        let now = now_millis();
        for key in moved {
            // Every collected key equals src or sits beneath it, so the
            // rewrite below cannot miss.
            let suffix = &key[src.as_str().len()..];
            let new_key = format!("{}{}", dst.as_str(), suffix);
            if let Some(mut node) = entries.remove(&key) {
                if key == src.as_str() {
                    match &mut node {
                        Node::Directory { modified_at, .. } => *modified_at = now,
                        Node::File(f) => f.modified_at = now,
                    }
                }
                entries.insert(new_key, node);
            }
        }

        entries
            .get(dst.as_str())
            .map(|node| Self::model_for(&dst, node))
            .ok_or_else(|| ContentsError::backend_unavailable("rename lost the destination"))
    }

    async fn create_checkpoint(&self, path: &str) -> ContentsResult<CheckpointStamp> {
        let path = CanonicalPath::parse(path)?;
        let mut entries = self.write_entries()?;
        let Some(Node::File(f)) = entries.get_mut(path.as_str()) else {
            return Err(ContentsError::not_found(path.as_str()));
        };
        let stamp = CheckpointStamp {
            id: f.next_checkpoint_id,
            created_at: now_millis(),
        };
        f.next_checkpoint_id += 1;
        f.checkpoints.push(MemCheckpoint {
            id: stamp.id,
            kind: f.kind,
            content: f.content.clone(),
            created_at: stamp.created_at,
        });
        while f.checkpoints.len() > self.max_checkpoints {
            f.checkpoints.remove(0);
        }
        Ok(stamp)
    }

    async fn list_checkpoints(&self, path: &str) -> ContentsResult<Vec<CheckpointStamp>> {
        let path = CanonicalPath::parse(path)?;
        let entries = self.read_entries()?;
        match entries.get(path.as_str()) {
            Some(Node::File(f)) => Ok(f
                .checkpoints
                .iter()
                .rev()
                .map(|cp| CheckpointStamp {
                    id: cp.id,
                    created_at: cp.created_at,
                })
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn restore_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        let mut entries = self.write_entries()?;
        let Some(Node::File(f)) = entries.get_mut(path.as_str()) else {
            return Err(ContentsError::not_found(path.as_str()));
        };
        let cp = f
            .checkpoints
            .iter()
            .find(|cp| cp.id == checkpoint_id)
            .cloned()
            .ok_or_else(|| ContentsError::checkpoint_not_found(path.as_str(), checkpoint_id))?;
        f.kind = cp.kind;
        f.content = cp.content;
        f.revision += 1;
        f.modified_at = now_millis();
        Ok(())
    }

    async fn delete_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        let mut entries = self.write_entries()?;
        let Some(Node::File(f)) = entries.get_mut(path.as_str()) else {
            return Err(ContentsError::checkpoint_not_found(path.as_str(), checkpoint_id));
        };
        let idx = f
            .checkpoints
            .iter()
            .position(|cp| cp.id == checkpoint_id)
            .ok_or_else(|| ContentsError::checkpoint_not_found(path.as_str(), checkpoint_id))?;
        f.checkpoints.remove(idx);
        Ok(())
    }
}

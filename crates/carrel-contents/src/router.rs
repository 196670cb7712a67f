//! Contents router with longest-prefix mount dispatch.
//!
//! Routes each path-addressed call to the backend owning the longest
//! matching mount prefix, re-roots the path, applies the mount's
//! validator, and re-prefixes every path in the result. Listing a
//! directory that is a mount boundary merges synthesized entries for
//! the mounts sitting immediately beneath it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use carrel_types::{
    now_millis, CanonicalPath, CheckpointStamp, ContentKind, ContentModel, ContentPayload,
    ContentsError, ContentsResult, SavePayload, NOTEBOOK_EXTENSION,
};

use crate::ops::ContentsOps;

/// Predicate over a mount-relative remainder path.
///
/// Evaluated before any backend call; `false` rejects the call with
/// `PathRejected`. The predicate sees the remainder, never the full
/// virtual path, so it composes with remounting.
pub type PathValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Validator restricting a mount to notebook documents.
///
/// Directory paths (the mount root, or a final segment without an
/// extension) pass so the mount stays listable and navigable.
pub fn notebooks_only_validator() -> PathValidator {
    Arc::new(|path: &str| {
        if path.is_empty() {
            return true;
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        !name.contains('.') || name.ends_with(NOTEBOOK_EXTENSION)
    })
}

/// One configured prefix → backend binding.
struct Mount {
    prefix: CanonicalPath,
    backend: Arc<dyn ContentsOps>,
    validator: Option<PathValidator>,
}

/// Information about a configured mount.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// The mount prefix (`""` for the fallback mount).
    pub prefix: String,
    /// Whether a validator is attached.
    pub validated: bool,
}

/// A mount resolved for one call: the owning backend plus the
/// re-rooted remainder. Owns its data so no lock is held across the
/// backend call.
struct Resolved {
    prefix: CanonicalPath,
    backend: Arc<dyn ContentsOps>,
    validator: Option<PathValidator>,
    remainder: CanonicalPath,
}

/// Routes contents operations to mounted backends.
///
/// Prefixes are matched by segments, longest first: with `""` and
/// `"shared"` mounted, `shared/nb.ipynb` goes to the `shared` backend
/// as `nb.ipynb` and `other/x` goes to the fallback as `other/x`.
/// The router implements [`ContentsOps`] itself, so routers compose
/// and hosts see one uniform surface.
pub struct ContentsRouter {
    /// Mounts keyed by canonical prefix.
    mounts: RwLock<BTreeMap<String, Mount>>,
}

impl fmt::Debug for ContentsRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefixes: Vec<String> = self.mounts.read().keys().cloned().collect();
        f.debug_struct("ContentsRouter")
            .field("mounts", &prefixes)
            .finish()
    }
}

impl Default for ContentsRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentsRouter {
    /// Create a router with no mounts.
    pub fn new() -> Self {
        Self {
            mounts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Mount a backend at the given prefix (`""` for the fallback).
    ///
    /// An existing mount at the same prefix is replaced.
    pub fn mount(
        &self,
        prefix: &str,
        backend: impl ContentsOps + 'static,
    ) -> ContentsResult<()> {
        self.mount_arc(prefix, Arc::new(backend), None)
    }

    /// Mount a backend with a validator over its remainder paths.
    pub fn mount_with_validator(
        &self,
        prefix: &str,
        backend: impl ContentsOps + 'static,
        validator: PathValidator,
    ) -> ContentsResult<()> {
        self.mount_arc(prefix, Arc::new(backend), Some(validator))
    }

    /// Mount an already shared backend.
    pub fn mount_arc(
        &self,
        prefix: &str,
        backend: Arc<dyn ContentsOps>,
        validator: Option<PathValidator>,
    ) -> ContentsResult<()> {
        let prefix = CanonicalPath::parse(prefix)?;
        let mut mounts = self.mounts.write();
        mounts.insert(
            prefix.as_str().to_owned(),
            Mount {
                prefix,
                backend,
                validator,
            },
        );
        Ok(())
    }

    /// Remove the mount at the given prefix.
    ///
    /// Returns `true` if a mount was removed.
    pub fn unmount(&self, prefix: &str) -> ContentsResult<bool> {
        let prefix = CanonicalPath::parse(prefix)?;
        Ok(self.mounts.write().remove(prefix.as_str()).is_some())
    }

    /// List all configured mounts.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.mounts
            .read()
            .values()
            .map(|m| MountInfo {
                prefix: m.prefix.as_str().to_owned(),
                validated: m.validator.is_some(),
            })
            .collect()
    }

    /// Find the longest mount prefix owning `path`.
    fn resolve(&self, path: &CanonicalPath) -> ContentsResult<Resolved> {
        let mounts = self.mounts.read();
        let mut best: Option<&Mount> = None;
        for mount in mounts.values() {
            let matches = mount.prefix == *path || mount.prefix.is_ancestor_of(path);
            if matches
                && best.is_none_or(|b| mount.prefix.as_str().len() > b.prefix.as_str().len())
            {
                best = Some(mount);
            }
        }
        match best {
            Some(mount) => {
                let remainder = mount
                    .prefix
                    .relativize(path)
                    .expect("prefix matched above");
                Ok(Resolved {
                    prefix: mount.prefix.clone(),
                    backend: Arc::clone(&mount.backend),
                    validator: mount.validator.clone(),
                    remainder,
                })
            }
            None => Err(ContentsError::no_backend(path.as_str())),
        }
    }

    /// Resolve and run the mount's validator against the remainder.
    fn resolve_checked(&self, path: &CanonicalPath) -> ContentsResult<Resolved> {
        let resolved = self.resolve(path)?;
        if let Some(validator) = &resolved.validator {
            if !validator(resolved.remainder.as_str()) {
                return Err(ContentsError::path_rejected(path.as_str()));
            }
        }
        debug!(
            path = path.as_str(),
            mount = resolved.prefix.as_str(),
            "dispatching contents call"
        );
        Ok(resolved)
    }

    /// Synthesize directory entries for mounts sitting immediately
    /// under `listed`, skipping names already present in the listing.
    fn mount_child_entries(
        &self,
        listed: &CanonicalPath,
        existing: &[ContentModel],
    ) -> ContentsResult<Vec<ContentModel>> {
        let mounts = self.mounts.read();
        let mut seen: HashSet<String> = existing.iter().map(|m| m.name.clone()).collect();
        let mut extra = Vec::new();
        for mount in mounts.values() {
            if mount.prefix.is_root() {
                continue;
            }
            let Some(rest) = listed.relativize(&mount.prefix) else {
                continue;
            };
            if rest.is_root() {
                continue;
            }
            let first = rest.as_str().split('/').next().unwrap_or("");
            if !seen.insert(first.to_owned()) {
                continue;
            }
            let child = listed.join(&CanonicalPath::parse(first)?);
            let now = now_millis();
            extra.push(ContentModel::directory(&child, now, now));
        }
        Ok(extra)
    }

    /// Root model built from mounts alone, for routers with no
    /// fallback mount. The root of the virtual tree always exists as
    /// long as anything is mounted.
    fn synthesized_root(&self, with_content: bool) -> ContentsResult<ContentModel> {
        if self.mounts.read().is_empty() {
            return Err(ContentsError::no_backend(""));
        }
        let now = now_millis();
        let mut model = ContentModel::directory(&CanonicalPath::root(), now, now);
        if with_content {
            let mut children = self.mount_child_entries(&CanonicalPath::root(), &[])?;
            children.sort_by(|a, b| a.name.cmp(&b.name));
            model = model.with_content(ContentPayload::Listing(children));
        }
        Ok(model)
    }
}

#[async_trait]
impl ContentsOps for ContentsRouter {
    async fn stat(&self, path: &str) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        match self.resolve_checked(&path) {
            Ok(r) => {
                let mut model = r.backend.stat(r.remainder.as_str()).await?;
                model.apply_prefix(&r.prefix);
                Ok(model)
            }
            Err(ContentsError::NoBackendConfigured(_)) if path.is_root() => {
                self.synthesized_root(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn get(&self, path: &str, want: Option<ContentKind>) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        match self.resolve_checked(&path) {
            Ok(r) => {
                let mut model = r.backend.get(r.remainder.as_str(), want).await?;
                model.apply_prefix(&r.prefix);
                if let Some(ContentPayload::Listing(children)) = &mut model.content {
                    let extra = self.mount_child_entries(&path, children)?;
                    children.extend(extra);
                    children.sort_by(|a, b| a.name.cmp(&b.name));
                }
                Ok(model)
            }
            Err(ContentsError::NoBackendConfigured(_)) if path.is_root() => {
                if want.is_some_and(|k| k.is_file()) {
                    return Err(ContentsError::not_found(path.as_str()));
                }
                self.synthesized_root(true)
            }
            Err(err) => Err(err),
        }
    }

    async fn save(&self, path: &str, payload: SavePayload) -> ContentsResult<ContentModel> {
        let path = CanonicalPath::parse(path)?;
        let r = self.resolve_checked(&path)?;
        let mut model = r.backend.save(r.remainder.as_str(), payload).await?;
        model.apply_prefix(&r.prefix);
        Ok(model)
    }

    async fn delete(&self, path: &str, recursive: bool) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        {
            let mounts = self.mounts.read();
            if mounts
                .values()
                .any(|m| !m.prefix.is_root() && m.prefix == path)
            {
                return Err(ContentsError::invalid_path(format!(
                    "cannot delete mount root: {path}"
                )));
            }
        }
        let r = self.resolve_checked(&path)?;
        r.backend.delete(r.remainder.as_str(), recursive).await
    }

    async fn rename(&self, src: &str, dst: &str) -> ContentsResult<ContentModel> {
        let src = CanonicalPath::parse(src)?;
        let dst = CanonicalPath::parse(dst)?;
        let from = self.resolve_checked(&src)?;
        let to = self.resolve_checked(&dst)?;
        if !Arc::ptr_eq(&from.backend, &to.backend) {
            return Err(ContentsError::path_rejected(format!(
                "cannot rename across backends: {src} -> {dst}"
            )));
        }
        let mut model = from
            .backend
            .rename(from.remainder.as_str(), to.remainder.as_str())
            .await?;
        model.apply_prefix(&to.prefix);
        Ok(model)
    }

    async fn create_checkpoint(&self, path: &str) -> ContentsResult<CheckpointStamp> {
        let path = CanonicalPath::parse(path)?;
        let r = self.resolve_checked(&path)?;
        r.backend.create_checkpoint(r.remainder.as_str()).await
    }

    async fn list_checkpoints(&self, path: &str) -> ContentsResult<Vec<CheckpointStamp>> {
        let path = CanonicalPath::parse(path)?;
        let r = self.resolve_checked(&path)?;
        r.backend.list_checkpoints(r.remainder.as_str()).await
    }

    async fn restore_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        let r = self.resolve_checked(&path)?;
        r.backend
            .restore_checkpoint(r.remainder.as_str(), checkpoint_id)
            .await
    }

    async fn delete_checkpoint(&self, path: &str, checkpoint_id: i64) -> ContentsResult<()> {
        let path = CanonicalPath::parse(path)?;
        let r = self.resolve_checked(&path)?;
        r.backend
            .delete_checkpoint(r.remainder.as_str(), checkpoint_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use serde_json::json;

    fn minimal_notebook() -> serde_json::Value {
        json!({
            "nbformat": 4,
            "nbformat_minor": 5,
            "metadata": {},
            "cells": []
        })
    }

    fn two_mount_router() -> (ContentsRouter, Arc<MemoryBackend>, Arc<MemoryBackend>) {
        let a = Arc::new(MemoryBackend::new());
        let b = Arc::new(MemoryBackend::new());
        let router = ContentsRouter::new();
        router.mount_arc("", a.clone(), None).unwrap();
        router.mount_arc("shared", b.clone(), None).unwrap();
        (router, a, b)
    }

    #[tokio::test]
    async fn dispatches_to_prefix_mount_and_reprefixes() {
        let (router, _a, b) = two_mount_router();

        let model = router
            .save("shared/nb.ipynb", SavePayload::Notebook(minimal_notebook()))
            .await
            .unwrap();
        assert_eq!(model.path, "shared/nb.ipynb");
        assert_eq!(model.name, "nb.ipynb");

        // The backend saw the re-rooted path.
        assert!(b.exists("nb.ipynb").await);
        assert!(!b.exists("shared/nb.ipynb").await);

        let fetched = router.get("shared/nb.ipynb", None).await.unwrap();
        assert_eq!(fetched.path, "shared/nb.ipynb");
        assert_eq!(fetched.kind, ContentKind::Notebook);
    }

    #[tokio::test]
    async fn falls_back_to_root_mount() {
        let (router, a, _b) = two_mount_router();

        router.save("other", SavePayload::Directory).await.unwrap();
        let model = router
            .save("other/x", SavePayload::Text("hi".into()))
            .await
            .unwrap();
        assert_eq!(model.path, "other/x");
        assert!(a.exists("other/x").await);
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let router = ContentsRouter::new();
        let shallow = Arc::new(MemoryBackend::new());
        let deep = Arc::new(MemoryBackend::new());
        router.mount_arc("mnt", shallow.clone(), None).unwrap();
        router.mount_arc("mnt/deep", deep.clone(), None).unwrap();

        router
            .save("mnt/deep/f.txt", SavePayload::Text("deep".into()))
            .await
            .unwrap();
        assert!(deep.exists("f.txt").await);
        assert!(!shallow.exists("deep/f.txt").await);
    }

    #[tokio::test]
    async fn unresolved_path_without_fallback() {
        let router = ContentsRouter::new();
        router.mount("shared", MemoryBackend::new()).unwrap();

        let err = router.get("other/x", None).await.unwrap_err();
        assert!(matches!(err, ContentsError::NoBackendConfigured(_)));
    }

    #[tokio::test]
    async fn empty_router_has_no_root() {
        let router = ContentsRouter::new();
        let err = router.get("", None).await.unwrap_err();
        assert!(matches!(err, ContentsError::NoBackendConfigured(_)));
    }

    #[tokio::test]
    async fn root_listing_merges_mount_entries() {
        let (router, _a, _b) = two_mount_router();

        router
            .save("notes.txt", SavePayload::Text("local".into()))
            .await
            .unwrap();

        let root = router.get("", None).await.unwrap();
        let Some(ContentPayload::Listing(children)) = root.content else {
            panic!("expected listing");
        };
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["notes.txt", "shared"]);

        let shared = children.iter().find(|c| c.name == "shared").unwrap();
        assert_eq!(shared.kind, ContentKind::Directory);
        assert_eq!(shared.path, "shared");
    }

    #[tokio::test]
    async fn root_listing_without_fallback_is_synthesized() {
        let router = ContentsRouter::new();
        router.mount("shared", MemoryBackend::new()).unwrap();
        router.mount("team/wiki", MemoryBackend::new()).unwrap();

        let root = router.get("", None).await.unwrap();
        let Some(ContentPayload::Listing(children)) = root.content else {
            panic!("expected listing");
        };
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        // "team/wiki" surfaces as its first segment.
        assert_eq!(names, vec!["shared", "team"]);

        assert!(router.stat("").await.unwrap().kind == ContentKind::Directory);
    }

    #[tokio::test]
    async fn merged_entries_deduplicate_real_children() {
        let (router, a, _b) = two_mount_router();

        // The fallback also has a real "shared" directory, written
        // behind the router's back.
        a.save("shared", SavePayload::Directory).await.unwrap();

        let root = router.get("", None).await.unwrap();
        let Some(ContentPayload::Listing(children)) = root.content else {
            panic!("expected listing");
        };
        let shared_count = children.iter().filter(|c| c.name == "shared").count();
        assert_eq!(shared_count, 1);
    }

    #[tokio::test]
    async fn nested_boundary_listing_synthesizes_child_mount() {
        let router = ContentsRouter::new();
        let a = Arc::new(MemoryBackend::new());
        router.mount_arc("", a.clone(), None).unwrap();
        router.mount("a/b", MemoryBackend::new()).unwrap();

        router.save("a", SavePayload::Directory).await.unwrap();

        let listing = router.get("a", None).await.unwrap();
        let Some(ContentPayload::Listing(children)) = listing.content else {
            panic!("expected listing");
        };
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b"]);
        assert_eq!(children[0].path, "a/b");
    }

    #[tokio::test]
    async fn validator_rejects_before_backend_call() {
        let router = ContentsRouter::new();
        let a = Arc::new(MemoryBackend::new());
        let b = Arc::new(MemoryBackend::new());
        router.mount_arc("", a, None).unwrap();
        router
            .mount_arc("shared", b.clone(), Some(notebooks_only_validator()))
            .unwrap();

        let err = router
            .save("shared/notes.txt", SavePayload::Text("no".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentsError::PathRejected(_)));
        assert!(!b.exists("notes.txt").await);

        // Notebooks and directory paths pass.
        router
            .save("shared/nb.ipynb", SavePayload::Notebook(minimal_notebook()))
            .await
            .unwrap();
        assert!(router.get("shared", None).await.is_ok());
    }

    #[tokio::test]
    async fn cross_backend_rename_rejected() {
        let (router, a, b) = two_mount_router();

        router
            .save("f.txt", SavePayload::Text("x".into()))
            .await
            .unwrap();

        let err = router.rename("f.txt", "shared/f.txt").await.unwrap_err();
        assert!(matches!(err, ContentsError::PathRejected(_)));
        assert!(a.exists("f.txt").await);
        assert!(!b.exists("f.txt").await);
    }

    #[tokio::test]
    async fn same_backend_rename_reprefixes() {
        let (router, _a, b) = two_mount_router();

        router
            .save("shared/old.ipynb", SavePayload::Notebook(minimal_notebook()))
            .await
            .unwrap();
        let model = router
            .rename("shared/old.ipynb", "shared/new.ipynb")
            .await
            .unwrap();
        assert_eq!(model.path, "shared/new.ipynb");
        assert!(b.exists("new.ipynb").await);
        assert!(!b.exists("old.ipynb").await);
    }

    #[tokio::test]
    async fn mount_root_delete_refused() {
        let (router, _a, b) = two_mount_router();

        let err = router.delete("shared", false).await.unwrap_err();
        assert!(matches!(err, ContentsError::InvalidPath(_)));
        assert!(b.exists("").await);
    }

    #[tokio::test]
    async fn checkpoints_route_to_owning_backend() {
        let (router, _a, b) = two_mount_router();

        router
            .save("shared/nb.ipynb", SavePayload::Notebook(minimal_notebook()))
            .await
            .unwrap();
        let stamp = router.create_checkpoint("shared/nb.ipynb").await.unwrap();

        let listed = router.list_checkpoints("shared/nb.ipynb").await.unwrap();
        assert_eq!(listed, vec![stamp]);
        assert_eq!(
            b.list_checkpoints("nb.ipynb").await.unwrap(),
            listed,
            "stamps should come straight from the owning backend"
        );

        router
            .restore_checkpoint("shared/nb.ipynb", stamp.id)
            .await
            .unwrap();
        router
            .delete_checkpoint("shared/nb.ipynb", stamp.id)
            .await
            .unwrap();
        assert!(router
            .list_checkpoints("shared/nb.ipynb")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unmount_removes_routing() {
        let (router, _a, _b) = two_mount_router();
        assert_eq!(router.list_mounts().len(), 2);

        assert!(router.unmount("shared").unwrap());
        assert!(!router.unmount("shared").unwrap());

        // Falls back to the root mount now.
        router
            .save("shared", SavePayload::Directory)
            .await
            .unwrap();
        router
            .save("shared/f.txt", SavePayload::Text("a".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_paths_rejected_at_the_router() {
        let (router, _a, _b) = two_mount_router();
        let err = router.get("shared/../etc", None).await.unwrap_err();
        assert!(matches!(err, ContentsError::InvalidPath(_)));
    }
}

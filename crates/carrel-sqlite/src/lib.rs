//! # carrel-sqlite
//!
//! Relational storage engine for carrel: the contents tree, bounded
//! checkpoint history, and the notebook-aware manager façade.
//!
//! Directories and files live as rows keyed by canonical path, with
//! subtree operations expressed as prefix rewrites inside single
//! transactions — atomic renames and deletes fall out of the
//! transaction rather than per-row bookkeeping. [`SqliteContents`]
//! layers document semantics on top and implements the shared
//! `ContentsOps` trait, so a store mounts directly into a
//! `ContentsRouter`.

pub mod contents;
pub mod db;

pub use contents::{SqliteContents, SqliteContentsConfig};
pub use db::{ContentsDb, DirectoryRow, FileRow};

//! Contents abstraction for carrel.
//!
//! This crate composes independent storage backends into one virtual
//! document tree. Key components:
//!
//! - [`ContentsOps`] - Capability trait every backend implements
//! - [`ContentsRouter`] - Longest-prefix mount dispatch with per-mount
//!   validators and boundary listing merge
//! - [`MemoryBackend`] - In-memory tree (for scratch mounts, testing)
//!
//! ## Design Decisions
//!
//! - **Path-based, no handles**: every operation is addressed by a
//!   canonical path; no open-file state lives between calls.
//! - **One call, one backend call**: the router performs no buffering
//!   or batching, so backpressure is whatever the chosen backend
//!   exhibits.
//! - **Errors pass through**: backends' failure kinds reach the caller
//!   unchanged; the router only rewrites paths in result models.

pub mod backends;
pub mod ops;
pub mod router;

pub use backends::MemoryBackend;
pub use ops::ContentsOps;
pub use router::{notebooks_only_validator, ContentsRouter, MountInfo, PathValidator};

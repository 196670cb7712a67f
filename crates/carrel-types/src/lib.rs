//! Shared path, model, and error types for carrel.
//!
//! This crate is the relational foundation: canonical paths, content
//! models, checkpoint stamps, notebook validation, and the error
//! taxonomy. It has **no internal carrel dependencies** — a pure leaf
//! crate that the contents abstraction and storage engines build on.
//!
//! # Key Types
//!
//! | Type               | Purpose                                       |
//! |--------------------|-----------------------------------------------|
//! | [`CanonicalPath`]  | Normalized `/`-separated tree address         |
//! | [`ContentModel`]   | Entry metadata + optional typed payload       |
//! | [`ContentPayload`] | What a `get` carries back                     |
//! | [`SavePayload`]    | What a `save` accepts                         |
//! | [`CheckpointStamp`]| Identity + creation time of one checkpoint    |
//! | [`ContentsError`]  | The shared failure taxonomy                   |

pub mod error;
pub mod model;
pub mod notebook;
pub mod path;

pub use error::{ContentsError, ContentsResult};
pub use model::{
    decode_content, encode_content, now_millis, CheckpointStamp, ContentKind, ContentModel,
    ContentPayload, SavePayload, DEFAULT_MAX_CHECKPOINTS,
};
pub use notebook::{is_notebook_path, validate_notebook, NOTEBOOK_EXTENSION};
pub use path::CanonicalPath;

//! Error types for tandem
//!
//! User-facing failures (lifecycle misuse, bad inputs, serialization problems) are
//! variants of [`Error`]. Violations of internal invariants are kept in their own
//! [`InternalError`] type: they indicate a bug in a backend adapter, not misuse by
//! the caller.

use std::path::PathBuf;

use thiserror::Error;

use crate::tensor::{DType, Shape};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{runner:35} | must be activated prior to {action}")]
    NotActive { runner: String, action: &'static str },

    #[error("feed_dict is missing keys: {missing:?}\nNote: expected keys: {expected:?}")]
    MissingKeys {
        missing: Vec<String>,
        expected: Vec<String>,
    },

    #[error("feed_dict has extra keys: {extra:?}\nNote: expected keys: {expected:?}")]
    ExtraKeys {
        extra: Vec<String>,
        expected: Vec<String>,
    },

    #[error("input tensor: {name} | received unexpected dtype: {received}\nNote: expected type: {expected}")]
    DTypeMismatch {
        name: String,
        received: DType,
        expected: DType,
    },

    #[error("input tensor: {name} | received incompatible shape: {received:?}\nNote: expected a shape compatible with: {expected}")]
    ShapeMismatch {
        name: String,
        received: Vec<usize>,
        expected: Shape,
    },

    #[error("duplicate serialization function for type: {tag}")]
    DuplicateRegistration { tag: String },

    #[error("cannot decode custom type {tag}: no decoder is registered for it\nNote: encoded object is: {fragment}")]
    CannotDecode { tag: String, fragment: String },

    #[error("no encoder is registered for type: {0}")]
    NoEncoder(String),

    #[error("provided document cannot be decoded into a {expected}\nNote: document was decoded into: {found}")]
    UnexpectedType { expected: String, found: String },

    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("{} looks like a legacy binary results file\nNote: {hint}", path.display())]
    LegacyFormat { path: PathBuf, hint: String },

    #[error("runner: {0} does not exist in this result store")]
    RunnerNotFound(String),

    #[error("runner: {0} already exists in this result store; use assign() to replace its results")]
    DuplicateRunner(String),

    #[error("index {index} is out of range for a result store holding {len} runners")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),

    #[error("array container: {0}")]
    Container(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{runner:35} | backend failure: {source}")]
    Backend {
        runner: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl Error {
    /// True when the error reports a broken internal invariant rather than caller misuse.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

/// Internal invariant violations, reported only while correctness checks are enabled.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("runner {runner} state was not reset after deactivation\nNote:\nold state: {old}\nnew state: {new}")]
    StateNotReset {
        runner: String,
        old: String,
        new: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

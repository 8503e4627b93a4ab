//! Backend driven by a closure

use std::fmt;

use anyhow::{bail, Result};

use crate::tensor::{FeedDict, OutputDict, TensorMetadata};

use super::Backend;

type InferFn = Box<dyn FnMut(&FeedDict) -> Result<OutputDict> + Send>;

/// In-process backend whose inference is a closure.
///
/// Useful for reference implementations written directly in Rust and as a test
/// double for runners.
pub struct FnBackend {
    prefix: String,
    metadata: TensorMetadata,
    infer: InferFn,
    session_open: bool,
}

impl FnBackend {
    pub fn new<F>(prefix: impl Into<String>, metadata: TensorMetadata, infer: F) -> Self
    where
        F: FnMut(&FeedDict) -> Result<OutputDict> + Send + 'static,
    {
        Self {
            prefix: prefix.into(),
            metadata,
            infer: Box::new(infer),
            session_open: false,
        }
    }

    /// Backend that returns its inputs unchanged
    pub fn identity(prefix: impl Into<String>, metadata: TensorMetadata) -> Self {
        Self::new(prefix, metadata, |feed| Ok(feed.clone()))
    }

    pub fn metadata(&self) -> &TensorMetadata {
        &self.metadata
    }
}

impl fmt::Debug for FnBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnBackend")
            .field("prefix", &self.prefix)
            .field("metadata", &self.metadata)
            .field("session_open", &self.session_open)
            .finish_non_exhaustive()
    }
}

impl Backend for FnBackend {
    fn name_prefix(&self) -> &str {
        &self.prefix
    }

    fn activate(&mut self) -> Result<()> {
        self.session_open = true;
        Ok(())
    }

    fn deactivate(&mut self) -> Result<()> {
        self.session_open = false;
        Ok(())
    }

    fn input_metadata(&mut self) -> Result<TensorMetadata> {
        Ok(self.metadata.clone())
    }

    fn infer(&mut self, feed: &FeedDict) -> Result<OutputDict> {
        if !self.session_open {
            bail!("inference requested without an open session");
        }
        (self.infer)(feed)
    }
}

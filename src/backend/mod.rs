//! Backend adapter interface
//!
//! A backend wraps one inference engine. The [`Runner`](crate::engine::Runner) owns the
//! activation lifecycle; backends only supply the hooks it calls.

mod closure;

pub use closure::FnBackend;

use std::fmt;

use anyhow::Result;

use crate::tensor::{FeedDict, OutputDict, TensorMetadata};

/// Hooks a backend adapter implements
///
/// Hooks are only called in a valid lifecycle state: `infer` and `input_metadata`
/// run between `activate` and `deactivate`. The `Debug` rendering is part of the
/// state compared by internal correctness checks, so anything created in `activate`
/// must be released in `deactivate`.
pub trait Backend: fmt::Debug + Send {
    /// Prefix of generated runner names
    fn name_prefix(&self) -> &str {
        "runner"
    }

    /// Acquire resources (sessions, device buffers, ...)
    fn activate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release everything acquired in `activate`
    fn deactivate(&mut self) -> Result<()> {
        Ok(())
    }

    /// Describe the inputs the backend expects
    fn input_metadata(&mut self) -> Result<TensorMetadata>;

    /// Run one inference
    fn infer(&mut self, feed: &FeedDict) -> Result<OutputDict>;
}

/// Boxed backend type held by runners
pub type BoxedBackend = Box<dyn Backend>;

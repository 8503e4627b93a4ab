//! Tandem - cross-backend inference validation harness
//!
//! Tandem runs the same model on interchangeable inference backends, captures their
//! outputs in a uniform structure and persists them so runs can be compared across
//! backends and processes.
//!
//! # Architecture
//!
//! - **engine**: runner activation lifecycle, scoped activation, the run driver
//! - **backend**: the hooks a backend adapter implements
//! - **results**: per-runner iteration results and disk-swappable output buffers
//! - **document**: type-tagged JSON encoding of results, including numeric buffers
//! - **loader**: feed dicts from random data or caller-provided inputs
//!
//! # Example
//!
//! ```no_run
//! use tandem::backend::FnBackend;
//! use tandem::document::Registry;
//! use tandem::engine::{Harness, Runner};
//! use tandem::loader::RandomLoader;
//! use tandem::tensor::{DType, Dim, Shape, TensorMetadata};
//! use tandem::HarnessConfig;
//!
//! # fn main() -> tandem::Result<()> {
//! let inputs = TensorMetadata::new()
//!     .add("x", Some(DType::Float32), Some(Shape::new(vec![Dim::Dynamic, Dim::Fixed(4)])));
//! let mut runners = vec![
//!     Runner::new(FnBackend::identity("reference", inputs.clone())),
//!     Runner::new(FnBackend::identity("candidate", inputs)),
//! ];
//!
//! let results = Harness::new().run(&mut runners, &mut RandomLoader::new().with_iterations(4))?;
//! let registry = Registry::standard(HarnessConfig::global())?;
//! results.save("results.json", &registry)?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod loader;
pub mod logging;
pub mod results;
pub mod tensor;

// Re-export key types
pub use backend::Backend;
pub use config::HarnessConfig;
pub use document::Registry;
pub use engine::{ActiveRunner, Harness, Runner};
pub use error::{Error, InternalError, Result};
pub use loader::{DataLoader, RandomLoader};
pub use results::{IterationResult, LazyBuffer, RunResults};
pub use tensor::{DType, FeedDict, NdBuffer, OutputDict, TensorMetadata};

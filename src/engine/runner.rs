//! Runner lifecycle
//!
//! A runner wraps one backend and enforces the activation contract: inference and
//! metadata queries are only valid between `activate` and `deactivate`, and every
//! deactivation returns the runner to its pre-activation state.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use crate::backend::{Backend, BoxedBackend};
use crate::config::HarnessConfig;
use crate::error::{Error, InternalError, Result};
use crate::tensor::{FeedDict, OutputDict, TensorMetadata};

use super::guard::ActiveRunner;
use super::{leak, validate};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Next value of the per-prefix name counter
fn next_count(prefix: &str) -> usize {
    static COUNTERS: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    let mut counters = COUNTERS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let count = counters.entry(prefix.to_string()).or_insert(0);
    let current = *count;
    *count += 1;
    current
}

/// Generated runner name, e.g. `onnxrt-runner-N0-10/19/26-14:03:12`
fn generate_name(prefix: &str) -> String {
    let now = chrono::Local::now();
    format!(
        "{}-N{}-{}",
        prefix,
        next_count(prefix),
        now.format("%m/%d/%y-%H:%M:%S")
    )
}

/// Lifecycle wrapper around a backend
pub struct Runner {
    id: u64,
    name: String,
    backend: BoxedBackend,
    active: bool,
    inference_time: Option<Duration>,
    metadata_cache: Option<TensorMetadata>,
    config: HarnessConfig,
    /// State rendering taken on activation when correctness checks are enabled
    pre_activation_state: Option<String>,
}

impl Runner {
    /// Create a runner with a generated name
    pub fn new(backend: impl Backend + 'static) -> Self {
        let name = generate_name(backend.name_prefix());
        Self::named(name, backend)
    }

    /// Create a runner with an explicit name
    pub fn named(name: impl Into<String>, backend: impl Backend + 'static) -> Self {
        Self::from_boxed(name, Box::new(backend))
    }

    pub fn from_boxed(name: impl Into<String>, backend: BoxedBackend) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            backend,
            active: false,
            inference_time: None,
            metadata_cache: None,
            config: HarnessConfig::global().clone(),
            pre_activation_state: None,
        }
    }

    /// Use `config` instead of the process configuration
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    fn backend_error(&self, source: anyhow::Error) -> Error {
        Error::Backend {
            runner: self.name.clone(),
            source,
        }
    }

    /// Rendering of every field that activation may touch
    fn state_snapshot(&self) -> String {
        format!(
            "name: {:?}, active: {}, inference_time: {:?}, metadata_cache: {:?}, backend: {:?}",
            self.name, self.active, self.inference_time, self.metadata_cache, self.backend
        )
    }

    /// Acquire backend resources. Activating an active runner only warns.
    pub fn activate(&mut self) -> Result<()> {
        if self.active {
            tracing::warn!(runner = %self.name, "runner is already active; skipping activation");
            return Ok(());
        }

        if self.config.internal_correctness_checks {
            self.pre_activation_state = Some(self.state_snapshot());
        }

        if let Err(source) = self.backend.activate() {
            self.pre_activation_state = None;
            return Err(self.backend_error(source));
        }

        self.active = true;
        leak::track(self.id, &self.name);
        tracing::debug!(runner = %self.name, "activated");
        Ok(())
    }

    /// Activate and return a guard that deactivates the runner when dropped
    pub fn activated(&mut self) -> Result<ActiveRunner<'_>> {
        self.activate()?;
        Ok(ActiveRunner::new(self))
    }

    /// Release backend resources. Deactivating an inactive runner only warns.
    ///
    /// The runner is inactive afterwards even if the teardown hook fails. With
    /// correctness checks enabled, a runner whose state differs from its
    /// pre-activation state is reported as an internal error.
    pub fn deactivate(&mut self) -> Result<()> {
        if !self.active {
            tracing::warn!(runner = %self.name, "runner is not active; skipping deactivation");
            return Ok(());
        }

        self.inference_time = None;
        self.active = false;
        self.metadata_cache = None;
        leak::untrack(self.id);

        let teardown = self.backend.deactivate();
        let old_state = self.pre_activation_state.take();
        teardown.map_err(|source| self.backend_error(source))?;

        if self.config.internal_correctness_checks {
            let new_state = self.state_snapshot();
            if let Some(old) = old_state {
                if old != new_state {
                    return Err(InternalError::StateNotReset {
                        runner: self.name.clone(),
                        old,
                        new: new_state,
                    }
                    .into());
                }
            }
        }

        tracing::debug!(runner = %self.name, "deactivated");
        Ok(())
    }

    /// Declared inputs of the backend, computed once per activation
    pub fn input_metadata(&mut self) -> Result<&TensorMetadata> {
        if !self.active {
            return Err(Error::NotActive {
                runner: self.name.clone(),
                action: "obtaining input metadata",
            });
        }

        let metadata = match self.metadata_cache.take() {
            Some(metadata) => metadata,
            None => self
                .backend
                .input_metadata()
                .map_err(|source| self.backend_error(source))?,
        };
        Ok(self.metadata_cache.insert(metadata))
    }

    /// Run one inference.
    ///
    /// With `check_inputs`, the feed dict is validated against the input metadata
    /// first. The backend call is timed; see [`last_inference_time`](Self::last_inference_time).
    pub fn infer(&mut self, feed: &FeedDict, check_inputs: bool) -> Result<OutputDict> {
        if !self.active {
            return Err(Error::NotActive {
                runner: self.name.clone(),
                action: "inference",
            });
        }

        if check_inputs {
            validate::check_feed(feed, self.input_metadata()?)?;
        }

        let start = Instant::now();
        let outputs = self
            .backend
            .infer(feed)
            .map_err(|source| self.backend_error(source))?;
        self.inference_time = Some(start.elapsed());
        Ok(outputs)
    }

    /// Duration of the most recent inference in this activation
    pub fn last_inference_time(&self) -> Option<Duration> {
        if self.inference_time.is_none() {
            tracing::warn!(
                runner = %self.name,
                "inference time was not recorded; was inference run in this activation?"
            );
        }
        self.inference_time
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("inference_time", &self.inference_time)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if self.active {
            tracing::warn!(
                runner = %self.name,
                "runner was dropped while still active; deactivate it or use Runner::activated() to release its resources"
            );
            leak::untrack(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FnBackend;
    use crate::engine::active_runners;
    use crate::tensor::{DType, Dim, NdBuffer, Shape};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn metadata() -> TensorMetadata {
        TensorMetadata::new().add(
            "x",
            Some(DType::Float32),
            Some(Shape::new(vec![Dim::Dynamic, Dim::Fixed(2)])),
        )
    }

    fn runner(name: &str) -> Runner {
        Runner::named(name, FnBackend::identity("echo", metadata()))
            .with_config(HarnessConfig::default().with_correctness_checks(true))
    }

    fn feed(shape: &[usize]) -> FeedDict {
        [("x", NdBuffer::zeros(DType::Float32, shape).unwrap())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_generated_names_count_per_prefix() {
        let first = Runner::new(FnBackend::identity("naming-test", metadata()));
        let second = Runner::new(FnBackend::identity("naming-test", metadata()));
        assert!(first.name().starts_with("naming-test-N0-"));
        assert!(second.name().starts_with("naming-test-N1-"));
    }

    #[test]
    fn test_inference_requires_activation() {
        let mut runner = runner("inactive-runner");
        let err = runner.infer(&feed(&[1, 2]), true).unwrap_err();
        assert!(matches!(err, Error::NotActive { action: "inference", .. }));
        assert!(err.to_string().contains("must be activated prior to inference"));
        assert!(matches!(
            runner.input_metadata(),
            Err(Error::NotActive { .. })
        ));
    }

    #[test]
    fn test_lifecycle() {
        let mut runner = runner("lifecycle-runner");
        runner.activate().unwrap();
        assert!(runner.is_active());

        let outputs = runner.infer(&feed(&[3, 2]), true).unwrap();
        assert_eq!(outputs.get("x").unwrap().shape(), &[3, 2]);
        assert!(runner.last_inference_time().is_some());

        runner.deactivate().unwrap();
        assert!(!runner.is_active());
        assert!(runner.last_inference_time().is_none());
    }

    #[test]
    fn test_double_activate_and_deactivate_only_warn() {
        let mut runner = runner("double-runner");
        runner.deactivate().unwrap();
        runner.activate().unwrap();
        runner.activate().unwrap();
        assert!(runner.is_active());
        runner.deactivate().unwrap();
        runner.deactivate().unwrap();
        assert!(!runner.is_active());
    }

    #[test]
    fn test_input_validation_runs_before_backend() {
        let mut runner = runner("validating-runner");
        runner.activate().unwrap();
        assert!(matches!(
            runner.infer(&feed(&[1, 3]), true),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(runner.infer(&feed(&[1, 3]), false).is_ok());
        runner.deactivate().unwrap();
    }

    #[test]
    fn test_metadata_is_cached_per_activation() {
        #[derive(Debug)]
        struct Counting {
            calls: Arc<AtomicUsize>,
        }

        impl Backend for Counting {
            fn input_metadata(&mut self) -> anyhow::Result<TensorMetadata> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(metadata())
            }

            fn infer(&mut self, feed: &FeedDict) -> anyhow::Result<OutputDict> {
                Ok(feed.clone())
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let mut runner = Runner::named(
            "caching-runner",
            Counting {
                calls: Arc::clone(&calls),
            },
        );

        runner.activate().unwrap();
        runner.input_metadata().unwrap();
        runner.infer(&feed(&[1, 2]), true).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        runner.deactivate().unwrap();

        runner.activate().unwrap();
        runner.input_metadata().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        runner.deactivate().unwrap();
    }

    #[derive(Debug, Default)]
    struct LeakyBackend {
        sessions: Vec<usize>,
    }

    impl Backend for LeakyBackend {
        fn activate(&mut self) -> anyhow::Result<()> {
            self.sessions.push(self.sessions.len());
            Ok(())
        }

        fn input_metadata(&mut self) -> anyhow::Result<TensorMetadata> {
            Ok(TensorMetadata::new())
        }

        fn infer(&mut self, _feed: &FeedDict) -> anyhow::Result<OutputDict> {
            Ok(OutputDict::new())
        }
    }

    #[test]
    fn test_state_leak_is_internal_error_under_checks() {
        let mut runner = Runner::named("leaky-runner", LeakyBackend::default())
            .with_config(HarnessConfig::default().with_correctness_checks(true));
        runner.activate().unwrap();
        let err = runner.deactivate().unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("was not reset"));
        assert!(!runner.is_active());
    }

    #[test]
    fn test_state_leak_is_ignored_without_checks() {
        let mut runner = Runner::named("quiet-leaky-runner", LeakyBackend::default())
            .with_config(HarnessConfig::default());
        runner.activate().unwrap();
        runner.deactivate().unwrap();
    }

    #[test]
    fn test_backend_failures_are_wrapped() {
        let backend = FnBackend::new("failing", metadata(), |_| anyhow::bail!("device lost"));
        let mut runner = Runner::named("failing-runner", backend);
        runner.activate().unwrap();
        let err = runner.infer(&feed(&[1, 2]), true).unwrap_err();
        assert!(matches!(err, Error::Backend { ref runner, .. } if runner == "failing-runner"));
        assert!(err.to_string().contains("device lost"));
        runner.deactivate().unwrap();
    }

    #[test]
    fn test_active_runners_are_tracked() {
        let mut runner = runner("tracked-runner");
        runner.activate().unwrap();
        assert!(active_runners().contains(&"tracked-runner".to_string()));
        drop(runner);
        assert!(!active_runners().contains(&"tracked-runner".to_string()));
    }
}

//! Run several runners over the same inputs

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::loader::DataLoader;
use crate::results::{IterationResult, RunResults};
use crate::tensor::FeedDict;

use super::Runner;

/// Drives runners over shared input data and collects their outputs
#[derive(Debug, Clone)]
pub struct Harness {
    warm_up_runs: usize,
    check_inputs: bool,
    config: HarnessConfig,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            warm_up_runs: 0,
            check_inputs: true,
            config: HarnessConfig::global().clone(),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Untimed inferences run on the first feed before the recorded iterations
    pub fn with_warm_up_runs(mut self, runs: usize) -> Self {
        self.warm_up_runs = runs;
        self
    }

    /// Validate every feed against the runner's input metadata
    pub fn with_check_inputs(mut self, check: bool) -> Self {
        self.check_inputs = check;
        self
    }

    /// Configuration used to capture outputs
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Run every runner over the loader's feeds.
    ///
    /// Feeds are produced once, from the first runner's input metadata, and reused
    /// for every later runner so all runners see identical inputs. Each runner is
    /// deactivated before the next one starts, even when it fails.
    pub fn run<L: DataLoader + ?Sized>(
        &self,
        runners: &mut [Runner],
        loader: &mut L,
    ) -> Result<RunResults> {
        let mut results = RunResults::new();
        let mut shared_feeds: Option<Vec<FeedDict>> = None;

        for runner in runners.iter_mut() {
            if results.contains(runner.name()) {
                return Err(Error::DuplicateRunner(runner.name().to_string()));
            }

            let name = runner.name().to_string();
            tracing::info!(runner = %name, "activating and starting inference");
            let mut active = runner.activated()?;

            if shared_feeds.is_none() {
                let metadata = active.input_metadata()?.clone();
                tracing::debug!(runner = %name, inputs = %metadata, "generating feeds");
                shared_feeds = Some(loader.feeds(&metadata)?);
            }
            let feeds: &[FeedDict] = shared_feeds.as_deref().unwrap_or_default();

            if let Some(first) = feeds.first() {
                for _ in 0..self.warm_up_runs {
                    active.infer(first, self.check_inputs)?;
                }
            }

            let mut iterations = Vec::with_capacity(feeds.len());
            for (index, feed) in feeds.iter().enumerate() {
                let outputs = active.infer(feed, self.check_inputs)?;
                let runtime = active.last_inference_time();
                tracing::debug!(runner = %name, iteration = index, ?runtime, "inference complete");
                iterations.push(IterationResult::with_config(
                    outputs,
                    &name,
                    runtime,
                    &self.config,
                )?);
            }
            active.finish()?;

            let total: f64 = iterations
                .iter()
                .filter_map(|it| it.runtime())
                .map(|d| d.as_secs_f64())
                .sum();
            let mean_ms = if iterations.is_empty() {
                0.0
            } else {
                total * 1000.0 / iterations.len() as f64
            };
            tracing::info!(
                runner = %name,
                iterations = iterations.len(),
                mean_ms,
                "completed inference"
            );
            results.append(name, iterations)?;
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FnBackend;
    use crate::loader::RandomLoader;
    use crate::tensor::{DType, Dim, NdBuffer, OutputDict, Shape, TensorMetadata};

    fn metadata() -> TensorMetadata {
        let shape = Shape::new(vec![Dim::Dynamic, Dim::Fixed(4)]);
        TensorMetadata::new().add("x", Some(DType::Float32), Some(shape))
    }

    fn doubling(prefix: &str) -> FnBackend {
        FnBackend::new(prefix, metadata(), |feed| {
            let x = feed
                .get("x")
                .ok_or_else(|| anyhow::anyhow!("missing input x"))?
                .to_vec::<f32>()?;
            let doubled: Vec<f32> = x.iter().map(|v| v * 2.0).collect();
            let shape = feed.get("x").map(|b| b.shape().to_vec()).unwrap_or_default();
            let out: OutputDict = [("y", NdBuffer::from_slice(&doubled, &shape)?)]
                .into_iter()
                .collect();
            Ok(out)
        })
    }

    fn config() -> HarnessConfig {
        HarnessConfig::default().with_correctness_checks(true)
    }

    #[test]
    fn test_runners_share_feeds() {
        let mut runners = vec![
            Runner::named("first", doubling("a")).with_config(config()),
            Runner::named("second", doubling("b")).with_config(config()),
        ];
        let mut loader = RandomLoader::new().with_iterations(3);
        let results = Harness::new()
            .with_config(config())
            .with_warm_up_runs(2)
            .run(&mut runners, &mut loader)
            .unwrap();

        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["first", "second"]);
        let first = results.get("first").unwrap();
        let second = results.get("second").unwrap();
        assert_eq!(first.len(), 3);
        for (a, b) in first.iter().zip(second) {
            assert_eq!(a.materialize_all().unwrap(), b.materialize_all().unwrap());
        }
        assert!(first.iter().all(|it| it.runner_name() == "first"));
        assert!(runners.iter().all(|r| !r.is_active()));
    }

    #[test]
    fn test_outputs_are_swapped_per_config() {
        let mut runners = vec![Runner::named("swapping", doubling("a"))];
        let results = Harness::new()
            .with_config(HarnessConfig::default().with_swap_threshold_mb(0.0))
            .run(&mut runners, &mut RandomLoader::new())
            .unwrap();
        let iteration = &results.get_index(0).unwrap().1[0];
        assert!(iteration.lazy_output("y").unwrap().is_swapped());
    }

    #[test]
    fn test_duplicate_runner_names_fail() {
        let mut runners = vec![
            Runner::named("same", doubling("a")),
            Runner::named("same", doubling("b")),
        ];
        let err = Harness::new()
            .run(&mut runners, &mut RandomLoader::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRunner(ref name) if name == "same"));
        assert!(runners.iter().all(|r| !r.is_active()));
    }

    #[test]
    fn test_failed_inference_deactivates_runner() {
        let bad_feed: FeedDict = [("x", NdBuffer::zeros(DType::Float32, &[1, 5]).unwrap())]
            .into_iter()
            .collect();
        let mut runners = vec![Runner::named("strict", doubling("a"))];
        let err = Harness::new()
            .run(&mut runners, &mut vec![bad_feed])
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
        assert!(!runners[0].is_active());
    }
}

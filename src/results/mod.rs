//! Captured inference outputs
//!
//! - `IterationResult`: the outputs of one inference call
//! - `RunResults`: ordered per-runner lists of iteration results
//! - `LazyBuffer`: output buffers that may be swapped to temporary files

mod lazy;

pub use lazy::LazyBuffer;

use std::borrow::Cow;
use std::path::Path;
use std::time::Duration;

use crate::config::HarnessConfig;
use crate::document::{self, Decode, Encode, Fragment, Registry, Serializable};
use crate::error::{Error, Result};
use crate::tensor::{NdBuffer, OutputDict, TensorDict};

/// Register every results type with `registry`.
///
/// Lazy buffers decoded through the registry are re-wrapped using the swap threshold
/// of `config`.
pub fn register_types(registry: &mut Registry, config: &HarnessConfig) -> Result<()> {
    let threshold = config.swap_threshold_bytes();
    registry.register_encoder::<LazyBuffer, _>(LazyBuffer::TYPE_NAME, LazyBuffer::to_fragment)?;
    registry.register_decoder::<LazyBuffer, _>(LazyBuffer::TYPE_NAME, move |fragment, registry| {
        LazyBuffer::from_fragment(fragment, registry, threshold)
    })?;
    registry.register::<IterationResult>()?;
    registry.register::<RunResults>()
}

/// Outputs of a single inference call
#[derive(Debug, PartialEq)]
pub struct IterationResult {
    outputs: TensorDict<LazyBuffer>,
    runner_name: String,
    runtime: Option<Duration>,
}

impl IterationResult {
    /// Capture outputs, swapping large buffers per the process configuration
    pub fn new(
        outputs: OutputDict,
        runner_name: impl Into<String>,
        runtime: Option<Duration>,
    ) -> Result<Self> {
        Self::with_config(outputs, runner_name, runtime, HarnessConfig::global())
    }

    /// Capture outputs, swapping large buffers per `config`
    pub fn with_config(
        outputs: OutputDict,
        runner_name: impl Into<String>,
        runtime: Option<Duration>,
        config: &HarnessConfig,
    ) -> Result<Self> {
        let threshold = config.swap_threshold_bytes();
        let outputs = outputs.try_map(|_, buffer| LazyBuffer::new(buffer, threshold))?;
        Ok(Self::from_lazy(outputs, runner_name, runtime))
    }

    /// Assemble from already-wrapped outputs
    pub fn from_lazy(
        outputs: TensorDict<LazyBuffer>,
        runner_name: impl Into<String>,
        runtime: Option<Duration>,
    ) -> Self {
        Self {
            outputs,
            runner_name: runner_name.into(),
            runtime,
        }
    }

    /// Materialized output `name`, if it exists
    pub fn output(&self, name: &str) -> Option<Result<Cow<'_, NdBuffer>>> {
        self.outputs.get(name).map(LazyBuffer::materialize)
    }

    pub fn lazy_output(&self, name: &str) -> Option<&LazyBuffer> {
        self.outputs.get(name)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &LazyBuffer)> {
        self.outputs.iter()
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys()
    }

    /// Every output read back into memory, in output order
    pub fn materialize_all(&self) -> Result<OutputDict> {
        let mut outputs = OutputDict::with_capacity(self.outputs.len());
        for (name, lazy) in self.outputs.iter() {
            outputs.insert(name, lazy.materialize()?.into_owned());
        }
        Ok(outputs)
    }

    pub fn runner_name(&self) -> &str {
        &self.runner_name
    }

    /// Duration of the inference call that produced these outputs
    pub fn runtime(&self) -> Option<Duration> {
        self.runtime
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

impl Serializable for IterationResult {
    const TYPE_NAME: &'static str = "IterationResult";

    fn to_fragment(&self, registry: &Registry) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        fragment.insert("outputs".to_string(), self.outputs.encode(registry)?);
        fragment.insert("runner_name".to_string(), self.runner_name.encode(registry)?);
        fragment.insert(
            "runtime".to_string(),
            self.runtime.map(|d| d.as_secs_f64()).encode(registry)?,
        );
        Ok(fragment)
    }

    fn from_fragment(mut fragment: Fragment, registry: &Registry) -> Result<Self> {
        let outputs = document::take_field(&mut fragment, "outputs")?;
        let outputs = TensorDict::decode(outputs, registry)?;
        let runner_name = document::take_field(&mut fragment, "runner_name")?;
        let runner_name = String::decode(runner_name, registry)?;
        let runtime = document::take_field(&mut fragment, "runtime")?;
        let runtime = Option::<f64>::decode(runtime, registry)?
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| Error::Malformed(format!("invalid runtime {secs}: {e}")))
            })
            .transpose()?;
        Ok(Self::from_lazy(outputs, runner_name, runtime))
    }
}

crate::registered_codec!(IterationResult);

/// Iteration results of several runners, in the order the runners were added.
///
/// A runner name appears at most once. Runners can be looked up by name or by
/// position; replacing a runner's results keeps its position.
#[derive(Debug, Default, PartialEq)]
pub struct RunResults {
    runs: Vec<(String, Vec<IterationResult>)>,
}

impl RunResults {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.runs.iter().position(|(runner, _)| runner == name)
    }

    /// Add results for a runner that is not yet present
    pub fn append(
        &mut self,
        name: impl Into<String>,
        iterations: Vec<IterationResult>,
    ) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(Error::DuplicateRunner(name));
        }
        self.runs.push((name, iterations));
        Ok(())
    }

    /// Set the results for `name`.
    ///
    /// A new name is added at the end; an existing name is replaced in place and its
    /// previous results are returned.
    pub fn assign(
        &mut self,
        name: impl Into<String>,
        iterations: Vec<IterationResult>,
    ) -> Option<Vec<IterationResult>> {
        let name = name.into();
        match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.runs[index].1, iterations)),
            None => {
                self.runs.push((name, iterations));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&[IterationResult]> {
        self.position(name)
            .map(|index| self.runs[index].1.as_slice())
            .ok_or_else(|| Error::RunnerNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Vec<IterationResult>> {
        match self.position(name) {
            Some(index) => Ok(&mut self.runs[index].1),
            None => Err(Error::RunnerNotFound(name.to_string())),
        }
    }

    /// Runner name and results at `index`
    pub fn get_index(&self, index: usize) -> Result<(&str, &[IterationResult])> {
        self.runs
            .get(index)
            .map(|(name, iterations)| (name.as_str(), iterations.as_slice()))
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.runs.len(),
            })
    }

    /// Replace the results at `index`, returning the previous ones
    pub fn set_index(
        &mut self,
        index: usize,
        iterations: Vec<IterationResult>,
    ) -> Result<Vec<IterationResult>> {
        let len = self.runs.len();
        self.runs
            .get_mut(index)
            .map(|(_, current)| std::mem::replace(current, iterations))
            .ok_or(Error::IndexOutOfRange { index, len })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &[IterationResult]> {
        self.runs.iter().map(|(_, iterations)| iterations.as_slice())
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &[IterationResult])> {
        self.runs
            .iter()
            .map(|(name, iterations)| (name.as_str(), iterations.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn to_json(&self, registry: &Registry) -> Result<String> {
        registry.to_json(self)
    }

    pub fn from_json(json: &str, registry: &Registry) -> Result<Self> {
        registry.from_json(json)
    }

    /// Write the results to `path` as a JSON document
    pub fn save(&self, path: impl AsRef<Path>, registry: &Registry) -> Result<()> {
        registry.save_json(self, path.as_ref())?;
        tracing::info!(
            path = %path.as_ref().display(),
            runners = self.len(),
            "saved inference results"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, registry: &Registry) -> Result<Self> {
        registry.load_json(path)
    }
}

impl Serializable for RunResults {
    const TYPE_NAME: &'static str = "RunResults";

    fn to_fragment(&self, registry: &Registry) -> Result<Fragment> {
        let runs = self
            .runs
            .iter()
            .map(|(name, iterations)| (name, iterations).encode(registry))
            .collect::<Result<Vec<_>>>()?;
        let mut fragment = Fragment::new();
        fragment.insert("runs".to_string(), runs.into());
        Ok(fragment)
    }

    fn from_fragment(mut fragment: Fragment, registry: &Registry) -> Result<Self> {
        let runs: Vec<(String, Vec<IterationResult>)> =
            Decode::decode(document::take_field(&mut fragment, "runs")?, registry)?;
        let mut results = RunResults::new();
        for (name, iterations) in runs {
            results.append(name, iterations)?;
        }
        Ok(results)
    }
}

crate::registered_codec!(RunResults);

//! Seeded random input generation

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::tensor::{element_count, DType, Dim, FeedDict, NdBuffer, Shape, TensorMetadata};

use super::DataLoader;

const DEFAULT_SEED: u64 = 1;
const DEFAULT_ITERATIONS: usize = 1;
const DEFAULT_DIM: usize = 1;

/// Generates random feed dicts matching the declared inputs.
///
/// Dynamic dimensions take `default_dim` unless the input has a shape override.
/// Inputs without a declared dtype are generated as float32.
#[derive(Debug, Clone)]
pub struct RandomLoader {
    seed: u64,
    iterations: usize,
    default_dim: usize,
    float_range: (f64, f64),
    int_range: (i64, i64),
    shape_overrides: HashMap<String, Vec<usize>>,
}

impl Default for RandomLoader {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            iterations: DEFAULT_ITERATIONS,
            default_dim: DEFAULT_DIM,
            float_range: (0.0, 1.0),
            int_range: (0, 25),
            shape_overrides: HashMap::new(),
        }
    }
}

impl RandomLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of feed dicts to generate
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Extent used for dynamic dimensions
    pub fn with_default_dim(mut self, dim: usize) -> Self {
        self.default_dim = dim;
        self
    }

    /// Half-open range of generated floating point values
    pub fn with_float_range(mut self, low: f64, high: f64) -> Self {
        self.float_range = (low, high);
        self
    }

    /// Half-open range of generated integer values
    pub fn with_int_range(mut self, low: i64, high: i64) -> Self {
        self.int_range = (low, high);
        self
    }

    /// Use `shape` for input `name` instead of its declared shape
    pub fn with_shape(mut self, name: impl Into<String>, shape: Vec<usize>) -> Self {
        self.shape_overrides.insert(name.into(), shape);
        self
    }

    fn resolve_shape(&self, name: &str, declared: Option<&Shape>) -> Vec<usize> {
        if let Some(shape) = self.shape_overrides.get(name) {
            if let Some(declared) = declared {
                if !declared.is_compatible(shape) {
                    tracing::warn!(
                        input = name,
                        declared = %declared,
                        requested = ?shape,
                        "shape override is incompatible with the declared shape"
                    );
                }
            }
            return shape.clone();
        }

        match declared {
            Some(declared) => declared
                .dims()
                .iter()
                .map(|dim| match dim {
                    Dim::Fixed(n) => *n,
                    Dim::Dynamic => self.default_dim,
                })
                .collect(),
            None => {
                tracing::warn!(input = name, "input shape is unknown; generating a scalar");
                Vec::new()
            }
        }
    }

    fn check_ranges(&self) -> Result<()> {
        let (low, high) = self.float_range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(Error::Config(format!(
                "float range [{low}, {high}) is empty or not finite"
            )));
        }
        let (low, high) = self.int_range;
        if low >= high {
            return Err(Error::Config(format!("integer range [{low}, {high}) is empty")));
        }
        Ok(())
    }
}

/// Random buffer of `shape` with values in the configured ranges
fn generate(
    rng: &mut StdRng,
    dtype: DType,
    shape: &[usize],
    float_range: (f64, f64),
    int_range: (i64, i64),
) -> Result<NdBuffer> {
    let count = element_count(shape)?;
    let (flow, fhigh) = float_range;
    let (ilow, ihigh) = int_range;

    macro_rules! ints {
        ($ty:ty) => {{
            let clamp = |value: i64| {
                <$ty>::try_from(value).unwrap_or(if value < 0 { <$ty>::MIN } else { <$ty>::MAX })
            };
            let (low, high) = (clamp(ilow), clamp(ihigh));
            if low >= high {
                return Err(Error::Config(format!(
                    "integer range [{ilow}, {ihigh}) does not fit {dtype}"
                )));
            }
            let values: Vec<$ty> = (0..count).map(|_| rng.gen_range(low..high)).collect();
            NdBuffer::from_slice(&values, shape)
        }};
    }

    match dtype {
        DType::Bool => {
            let values: Vec<bool> = (0..count).map(|_| rng.gen()).collect();
            NdBuffer::from_slice(&values, shape)
        }
        DType::Int8 => ints!(i8),
        DType::Int16 => ints!(i16),
        DType::Int32 => ints!(i32),
        DType::Int64 => ints!(i64),
        DType::Uint8 => ints!(u8),
        DType::Uint16 => ints!(u16),
        DType::Uint32 => ints!(u32),
        DType::Uint64 => ints!(u64),
        DType::Float16 => {
            let values: Vec<half::f16> = (0..count)
                .map(|_| half::f16::from_f64(rng.gen_range(flow..fhigh)))
                .collect();
            NdBuffer::from_slice(&values, shape)
        }
        DType::Float32 => {
            let (low, high) = (flow as f32, fhigh as f32);
            let values: Vec<f32> = (0..count).map(|_| rng.gen_range(low..high)).collect();
            NdBuffer::from_slice(&values, shape)
        }
        DType::Float64 => {
            let values: Vec<f64> = (0..count).map(|_| rng.gen_range(flow..fhigh)).collect();
            NdBuffer::from_slice(&values, shape)
        }
    }
}

impl DataLoader for RandomLoader {
    fn feeds(&mut self, metadata: &TensorMetadata) -> Result<Vec<FeedDict>> {
        self.check_ranges()?;
        for name in self.shape_overrides.keys() {
            if !metadata.contains(name) {
                tracing::warn!(input = %name, "shape override names an input that does not exist");
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut feeds = Vec::with_capacity(self.iterations);
        for iteration in 0..self.iterations {
            let mut feed = FeedDict::with_capacity(metadata.len());
            for (name, meta) in metadata.iter() {
                let dtype = meta.dtype.unwrap_or(DType::Float32);
                let shape = self.resolve_shape(name, meta.shape.as_ref());
                let buffer = generate(&mut rng, dtype, &shape, self.float_range, self.int_range)?;
                tracing::debug!(iteration, input = name, %dtype, shape = ?shape, "generated input");
                feed.insert(name, buffer);
            }
            feeds.push(feed);
        }
        Ok(feeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TensorMetadata {
        TensorMetadata::new()
            .add("image", Some(DType::Float32), Some(Shape::new(vec![Dim::Dynamic, Dim::Fixed(3)])))
            .add("ids", Some(DType::Int64), Some(Shape::fixed(&[4])))
            .add("mask", Some(DType::Bool), Some(Shape::fixed(&[2, 2])))
    }

    #[test]
    fn test_shapes_follow_metadata() {
        let feeds = RandomLoader::new().with_iterations(2).feeds(&metadata()).unwrap();
        assert_eq!(feeds.len(), 2);
        let feed = &feeds[0];
        assert_eq!(feed.keys().collect::<Vec<_>>(), vec!["image", "ids", "mask"]);
        assert_eq!(feed.get("image").unwrap().shape(), &[1, 3]);
        assert_eq!(feed.get("ids").unwrap().dtype(), DType::Int64);
        assert_eq!(feed.get("mask").unwrap().shape(), &[2, 2]);
    }

    #[test]
    fn test_values_stay_in_range() {
        let feeds = RandomLoader::new().with_default_dim(64).feeds(&metadata()).unwrap();
        let image = feeds[0].get("image").unwrap().to_vec::<f32>().unwrap();
        assert!(image.iter().all(|v| (0.0..1.0).contains(v)));
        let ids = feeds[0].get("ids").unwrap().to_vec::<i64>().unwrap();
        assert!(ids.iter().all(|v| (0..25).contains(v)));
    }

    #[test]
    fn test_same_seed_same_data() {
        let a = RandomLoader::new().with_seed(7).feeds(&metadata()).unwrap();
        let b = RandomLoader::new().with_seed(7).feeds(&metadata()).unwrap();
        let c = RandomLoader::new().with_seed(8).feeds(&metadata()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_shape_override() {
        let feeds = RandomLoader::new()
            .with_shape("image", vec![8, 3])
            .feeds(&metadata())
            .unwrap();
        assert_eq!(feeds[0].get("image").unwrap().shape(), &[8, 3]);
    }

    #[test]
    fn test_unknown_dtype_and_shape() {
        let metadata = TensorMetadata::new().add("x", None, None);
        let feeds = RandomLoader::new().feeds(&metadata).unwrap();
        let x = feeds[0].get("x").unwrap();
        assert_eq!(x.dtype(), DType::Float32);
        assert_eq!(x.ndim(), 0);
    }

    #[test]
    fn test_empty_ranges_are_rejected() {
        assert!(RandomLoader::new().with_int_range(3, 3).feeds(&metadata()).is_err());
        assert!(RandomLoader::new().with_float_range(1.0, 0.0).feeds(&metadata()).is_err());

        let unsigned = TensorMetadata::new().add("u", Some(DType::Uint8), Some(Shape::fixed(&[1])));
        assert!(RandomLoader::new().with_int_range(-10, -5).feeds(&unsigned).is_err());
    }
}

//! Declared input/output tensor metadata

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::{self, Fragment, Registry, Serializable};
use crate::error::Result;

use super::{DType, TensorDict};

/// One dimension of a declared shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<usize>", into = "Option<usize>")]
pub enum Dim {
    /// Exact extent
    Fixed(usize),
    /// Dynamic dimension, decided per call
    Dynamic,
}

impl From<Option<usize>> for Dim {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Dim::Dynamic, Dim::Fixed)
    }
}

impl From<Dim> for Option<usize> {
    fn from(dim: Dim) -> Self {
        match dim {
            Dim::Fixed(n) => Some(n),
            Dim::Dynamic => None,
        }
    }
}

impl From<usize> for Dim {
    fn from(value: usize) -> Self {
        Dim::Fixed(value)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{n}"),
            Dim::Dynamic => f.write_str("?"),
        }
    }
}

/// A declared shape whose dimensions may be dynamic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<Dim>);

impl Shape {
    pub fn new(dims: Vec<Dim>) -> Self {
        Self(dims)
    }

    /// Shape with only fixed dimensions
    pub fn fixed(dims: &[usize]) -> Self {
        Self(dims.iter().copied().map(Dim::Fixed).collect())
    }

    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Whether a concrete shape may be fed where this shape is declared.
    ///
    /// Ranks must match; every fixed dimension must match exactly while dynamic
    /// dimensions accept any extent.
    pub fn is_compatible(&self, actual: &[usize]) -> bool {
        self.0.len() == actual.len()
            && self.0.iter().zip(actual).all(|(expected, &got)| match expected {
                Dim::Fixed(n) => *n == got,
                Dim::Dynamic => true,
            })
    }
}

impl From<Vec<Dim>> for Shape {
    fn from(dims: Vec<Dim>) -> Self {
        Self(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

/// Declared dtype and shape of one tensor. `None` means unknown and is never checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMeta {
    pub dtype: Option<DType>,
    pub shape: Option<Shape>,
}

/// Ordered mapping of tensor names to their declared metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorMetadata {
    tensors: TensorDict<TensorMeta>,
}

impl TensorMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn add(
        mut self,
        name: impl Into<String>,
        dtype: Option<DType>,
        shape: Option<Shape>,
    ) -> Self {
        self.insert(name, dtype, shape);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, dtype: Option<DType>, shape: Option<Shape>) {
        self.tensors.insert(name, TensorMeta { dtype, shape });
    }

    pub fn get(&self, name: &str) -> Option<&TensorMeta> {
        self.tensors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorMeta)> {
        self.tensors.iter()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl fmt::Display for TensorMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, meta)) in self.tensors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let dtype = meta.dtype.map_or_else(|| "?".to_string(), |d| d.to_string());
            let shape = meta
                .shape
                .as_ref()
                .map_or_else(|| "?".to_string(), |s| s.to_string());
            write!(f, "{name} [dtype={dtype}, shape={shape}]")?;
        }
        Ok(())
    }
}

impl Serializable for TensorMetadata {
    const TYPE_NAME: &'static str = "TensorMetadata";

    fn to_fragment(&self, _registry: &Registry) -> Result<Fragment> {
        let mut tensors = Fragment::new();
        for (name, meta) in self.tensors.iter() {
            tensors.insert(name.to_string(), serde_json::to_value(meta)?);
        }
        let mut fragment = Fragment::new();
        fragment.insert("tensors".to_string(), tensors.into());
        Ok(fragment)
    }

    fn from_fragment(mut fragment: Fragment, _registry: &Registry) -> Result<Self> {
        let tensors = document::take_field(&mut fragment, "tensors")?;
        let tensors = document::expect_object(tensors, "tensors")?;
        let mut metadata = TensorMetadata::new();
        for (name, meta) in tensors {
            let meta: TensorMeta = serde_json::from_value(meta)?;
            metadata.tensors.insert(name, meta);
        }
        Ok(metadata)
    }
}

crate::registered_codec!(TensorMetadata);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_compatibility() {
        let declared = Shape::new(vec![Dim::Dynamic, Dim::Fixed(3), Dim::Fixed(224)]);
        assert!(declared.is_compatible(&[1, 3, 224]));
        assert!(declared.is_compatible(&[16, 3, 224]));
        assert!(!declared.is_compatible(&[1, 4, 224]));
        assert!(!declared.is_compatible(&[1, 3, 224, 1]));
        assert!(!declared.is_compatible(&[3, 224]));
    }

    #[test]
    fn test_scalar_shape() {
        assert!(Shape::fixed(&[]).is_compatible(&[]));
        assert!(!Shape::fixed(&[]).is_compatible(&[1]));
    }

    #[test]
    fn test_display() {
        let meta = TensorMetadata::new()
            .add("x", Some(DType::Float32), Some(Shape::new(vec![Dim::Dynamic, Dim::Fixed(4)])))
            .add("y", None, None);
        assert_eq!(meta.to_string(), "x [dtype=float32, shape=[?, 4]], y [dtype=?, shape=?]");
    }

    #[test]
    fn test_dim_serde_uses_null_for_dynamic() {
        let shape = Shape::new(vec![Dim::Dynamic, Dim::Fixed(2)]);
        let value = serde_json::to_value(&shape).unwrap();
        assert_eq!(value, serde_json::json!([null, 2]));
        let back: Shape = serde_json::from_value(value).unwrap();
        assert_eq!(back, shape);
    }

    #[test]
    fn test_metadata_document_roundtrip() {
        let mut registry = Registry::new();
        registry.register::<TensorMetadata>().unwrap();

        let meta = TensorMetadata::new()
            .add("input", Some(DType::Int64), Some(Shape::new(vec![Dim::Dynamic, Dim::Fixed(8)])))
            .add("mask", Some(DType::Bool), None);
        let json = registry.to_json(&meta).unwrap();
        let back: TensorMetadata = registry.from_json(&json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.names().collect::<Vec<_>>(), vec!["input", "mask"]);
    }
}

//! Numeric buffers exchanged with backends
//!
//! - `NdBuffer`: an owned, row-major, little-endian n-dimensional buffer
//! - `TensorDict`: insertion-ordered name -> value mapping (feed/output dicts)
//! - `TensorMetadata`: declared input dtypes and shapes, with dynamic dimensions

mod dict;
mod metadata;

pub use dict::TensorDict;
pub use metadata::{Dim, Shape, TensorMeta, TensorMetadata};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mapping of input names to buffers for one inference call.
pub type FeedDict = TensorDict<NdBuffer>;

/// Mapping of output names to buffers produced by one inference call.
pub type OutputDict = TensorDict<NdBuffer>;

/// Element data types understood by the harness.
///
/// Names follow NumPy conventions so documents stay readable next to other tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    Float32,
    Float64,
}

impl DType {
    /// Size of one element in bytes
    pub const fn item_size(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::Uint8 => 1,
            DType::Int16 | DType::Uint16 | DType::Float16 => 2,
            DType::Int32 | DType::Uint32 | DType::Float32 => 4,
            DType::Int64 | DType::Uint64 | DType::Float64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Uint8 => "uint8",
            DType::Uint16 => "uint16",
            DType::Uint32 => "uint32",
            DType::Uint64 => "uint64",
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    /// Parse a dtype name.
    ///
    /// Accepts the NumPy names ("float32") and the short forms ("f32", "i64", "u8").
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "bool" => Ok(DType::Bool),
            "int8" | "i8" => Ok(DType::Int8),
            "int16" | "i16" => Ok(DType::Int16),
            "int32" | "i32" => Ok(DType::Int32),
            "int64" | "i64" => Ok(DType::Int64),
            "uint8" | "u8" => Ok(DType::Uint8),
            "uint16" | "u16" => Ok(DType::Uint16),
            "uint32" | "u32" => Ok(DType::Uint32),
            "uint64" | "u64" => Ok(DType::Uint64),
            "float16" | "f16" => Ok(DType::Float16),
            "float32" | "f32" => Ok(DType::Float32),
            "float64" | "f64" => Ok(DType::Float64),
            other => Err(Error::InvalidBuffer(format!("unknown dtype: '{other}'"))),
        }
    }

    /// NPY descriptor string for this dtype (little-endian)
    pub const fn npy_descr(self) -> &'static str {
        match self {
            DType::Bool => "|b1",
            DType::Int8 => "|i1",
            DType::Int16 => "<i2",
            DType::Int32 => "<i4",
            DType::Int64 => "<i8",
            DType::Uint8 => "|u1",
            DType::Uint16 => "<u2",
            DType::Uint32 => "<u4",
            DType::Uint64 => "<u8",
            DType::Float16 => "<f2",
            DType::Float32 => "<f4",
            DType::Float64 => "<f8",
        }
    }

    pub fn from_npy_descr(descr: &str) -> Option<Self> {
        let dtype = match descr {
            "|b1" => DType::Bool,
            "|i1" => DType::Int8,
            "<i2" => DType::Int16,
            "<i4" => DType::Int32,
            "<i8" => DType::Int64,
            "|u1" => DType::Uint8,
            "<u2" => DType::Uint16,
            "<u4" => DType::Uint32,
            "<u8" => DType::Uint64,
            "<f2" => DType::Float16,
            "<f4" => DType::Float32,
            "<f8" => DType::Float64,
            _ => return None,
        };
        Some(dtype)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar type that can be stored in an `NdBuffer`.
pub trait Element: Copy + 'static {
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);

    /// Read one element from exactly `DTYPE.item_size()` bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_element! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    half::f16 => Float16,
    f32 => Float32,
    f64 => Float64,
}

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Number of elements described by `shape` (1 for scalars).
pub fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| Error::InvalidBuffer(format!("element count of shape {shape:?} overflows")))
}

/// Owned n-dimensional numeric buffer.
///
/// Data is stored row-major as little-endian bytes, which is also the layout of the
/// at-rest container, so persisting a buffer never reorders elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdBuffer {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl NdBuffer {
    /// Build a buffer from typed values
    pub fn from_slice<T: Element>(values: &[T], shape: &[usize]) -> Result<Self> {
        let expected = element_count(shape)?;
        if values.len() != expected {
            return Err(Error::InvalidBuffer(format!(
                "{} values cannot fill shape {:?} ({} elements)",
                values.len(),
                shape,
                expected
            )));
        }

        let mut data = Vec::with_capacity(values.len() * T::DTYPE.item_size());
        for &value in values {
            value.write_le(&mut data);
        }

        Ok(Self {
            dtype: T::DTYPE,
            shape: shape.to_vec(),
            data,
        })
    }

    /// Build a buffer from raw little-endian bytes
    pub fn from_bytes(dtype: DType, shape: &[usize], data: Vec<u8>) -> Result<Self> {
        let expected = element_count(shape)?
            .checked_mul(dtype.item_size())
            .ok_or_else(|| Error::InvalidBuffer("byte size overflows".to_string()))?;
        if data.len() != expected {
            return Err(Error::InvalidBuffer(format!(
                "{} bytes do not match {} buffer of shape {:?} ({} bytes expected)",
                data.len(),
                dtype,
                shape,
                expected
            )));
        }

        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            data,
        })
    }

    /// Zero-filled buffer
    pub fn zeros(dtype: DType, shape: &[usize]) -> Result<Self> {
        let nbytes = element_count(shape)?
            .checked_mul(dtype.item_size())
            .ok_or_else(|| Error::InvalidBuffer("byte size overflows".to_string()))?;
        Ok(Self {
            dtype,
            shape: shape.to_vec(),
            data: vec![0; nbytes],
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.item_size()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the element data in bytes
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the elements out as typed values
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::InvalidBuffer(format!(
                "cannot read {} buffer as {}",
                self.dtype,
                T::DTYPE
            )));
        }

        Ok(self
            .data
            .chunks_exact(self.dtype.item_size())
            .map(T::read_le)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_slice_roundtrip() {
        let buf = NdBuffer::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(buf.dtype(), DType::Float32);
        assert_eq!(buf.shape(), &[2, 3]);
        assert_eq!(buf.len(), 6);
        assert_eq!(buf.nbytes(), 24);
        assert_eq!(buf.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_from_slice_rejects_wrong_count() {
        assert!(NdBuffer::from_slice(&[1i32, 2, 3], &[2, 2]).is_err());
    }

    #[test]
    fn test_from_bytes_validates_length() {
        assert!(NdBuffer::from_bytes(DType::Int64, &[2], vec![0; 16]).is_ok());
        assert!(NdBuffer::from_bytes(DType::Int64, &[2], vec![0; 15]).is_err());
    }

    #[test]
    fn test_scalar_and_empty_shapes() {
        let scalar = NdBuffer::from_slice(&[7u8], &[]).unwrap();
        assert_eq!(scalar.len(), 1);
        assert_eq!(scalar.ndim(), 0);

        let empty = NdBuffer::zeros(DType::Float64, &[0, 4]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
    }

    #[test]
    fn test_to_vec_checks_dtype() {
        let buf = NdBuffer::from_slice(&[true, false], &[2]).unwrap();
        assert_eq!(buf.to_vec::<bool>().unwrap(), vec![true, false]);
        assert!(buf.to_vec::<u8>().is_err());
    }

    #[test]
    fn test_half_elements() {
        let values = [half::f16::from_f32(0.5), half::f16::from_f32(-2.0)];
        let buf = NdBuffer::from_slice(&values, &[2]).unwrap();
        assert_eq!(buf.dtype(), DType::Float16);
        assert_eq!(buf.nbytes(), 4);
        assert_eq!(buf.to_vec::<half::f16>().unwrap(), values.to_vec());
    }

    #[test]
    fn test_dtype_names() {
        assert_eq!(DType::parse("float32").unwrap(), DType::Float32);
        assert_eq!(DType::parse("f32").unwrap(), DType::Float32);
        assert!(DType::parse("F32").is_err());
        for dtype in [DType::Bool, DType::Uint16, DType::Float16, DType::Int64] {
            assert_eq!(DType::parse(dtype.name()).unwrap(), dtype);
            assert_eq!(DType::from_npy_descr(dtype.npy_descr()), Some(dtype));
        }
    }
}

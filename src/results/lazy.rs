//! Buffers that may live in a temporary file instead of memory

use std::borrow::Cow;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::config::HarnessConfig;
use crate::document::{self, npy, Decode, Encode, Fragment, Registry};
use crate::error::Result;
use crate::tensor::{DType, NdBuffer};

#[derive(Debug)]
enum Storage {
    Resident(NdBuffer),
    /// NPY container in a file owned by this buffer; removed on drop
    Swapped(NamedTempFile),
}

/// A numeric buffer that is moved to a temporary file when it is large.
///
/// The decision is made once, at construction: with a negative threshold the buffer
/// always stays in memory, otherwise any buffer of at least `threshold` bytes is
/// written out and dropped from memory. Materializing a swapped buffer reads the file
/// back and never rewrites it.
///
/// The backing file holds the NPY container the array codec is built on, without the
/// base64 text layer. It is private scratch storage, so swapping does not wait on the
/// registry's array codec; persisting a lazy buffer through a [`Registry`] does.
#[derive(Debug)]
pub struct LazyBuffer {
    storage: Storage,
    dtype: DType,
    shape: Vec<usize>,
    nbytes: usize,
}

impl LazyBuffer {
    /// Type name used when persisting lazy buffers
    pub const TYPE_NAME: &'static str = "LazyBuffer";

    /// Wrap `buffer`, swapping it out if it is at least `threshold_bytes` large
    pub fn new(buffer: NdBuffer, threshold_bytes: i64) -> Result<Self> {
        let dtype = buffer.dtype();
        let shape = buffer.shape().to_vec();
        let nbytes = buffer.nbytes();

        let swap = threshold_bytes >= 0 && nbytes as u64 >= threshold_bytes as u64;
        let storage = if swap {
            Storage::Swapped(Self::swap_out(&buffer)?)
        } else {
            Storage::Resident(buffer)
        };

        Ok(Self {
            storage,
            dtype,
            shape,
            nbytes,
        })
    }

    /// Wrap `buffer` using the configured swap threshold
    pub fn from_config(buffer: NdBuffer, config: &HarnessConfig) -> Result<Self> {
        Self::new(buffer, config.swap_threshold_bytes())
    }

    /// Buffer that is never swapped
    pub fn resident(buffer: NdBuffer) -> Self {
        Self {
            dtype: buffer.dtype(),
            shape: buffer.shape().to_vec(),
            nbytes: buffer.nbytes(),
            storage: Storage::Resident(buffer),
        }
    }

    fn swap_out(buffer: &NdBuffer) -> Result<NamedTempFile> {
        let file = NamedTempFile::new()?;
        {
            let mut writer = BufWriter::new(file.as_file());
            writer.write_all(&npy::write(buffer)?)?;
            writer.flush()?;
        }
        tracing::debug!(
            nbytes = buffer.nbytes(),
            path = %file.path().display(),
            "swapped buffer to disk"
        );
        Ok(file)
    }

    /// Whether the data currently lives in a temporary file
    pub fn is_swapped(&self) -> bool {
        matches!(self.storage, Storage::Swapped(_))
    }

    /// Backing file of a swapped buffer
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Swapped(file) => Some(file.path()),
            Storage::Resident(_) => None,
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of the wrapped data in bytes
    pub fn nbytes(&self) -> usize {
        self.nbytes
    }

    /// The wrapped buffer, read back from disk if it was swapped
    pub fn materialize(&self) -> Result<Cow<'_, NdBuffer>> {
        match &self.storage {
            Storage::Resident(buffer) => Ok(Cow::Borrowed(buffer)),
            Storage::Swapped(file) => Ok(Cow::Owned(npy::read(&fs::read(file.path())?)?)),
        }
    }

    /// Take the wrapped buffer, removing any backing file
    pub fn into_buffer(self) -> Result<NdBuffer> {
        match self.storage {
            Storage::Resident(buffer) => Ok(buffer),
            Storage::Swapped(ref file) => npy::read(&fs::read(file.path())?),
        }
    }

    pub(crate) fn to_fragment(&self, registry: &Registry) -> Result<Fragment> {
        let mut fragment = Fragment::new();
        fragment.insert("values".to_string(), self.materialize()?.encode(registry)?);
        Ok(fragment)
    }

    pub(crate) fn from_fragment(
        mut fragment: Fragment,
        registry: &Registry,
        threshold_bytes: i64,
    ) -> Result<Self> {
        let values = NdBuffer::decode(document::take_field(&mut fragment, "values")?, registry)?;
        Self::new(values, threshold_bytes)
    }
}

impl From<NdBuffer> for LazyBuffer {
    fn from(buffer: NdBuffer) -> Self {
        Self::resident(buffer)
    }
}

/// Equal when the materialized data is equal. A buffer that cannot be read back is
/// never equal to anything.
impl PartialEq for LazyBuffer {
    fn eq(&self, other: &Self) -> bool {
        if self.dtype != other.dtype || self.shape != other.shape {
            return false;
        }
        match (self.materialize(), other.materialize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

crate::registered_codec!(LazyBuffer);

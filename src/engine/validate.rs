//! Feed dict validation against declared input metadata

use crate::error::{Error, Result};
use crate::tensor::{FeedDict, TensorMetadata};

/// Check a feed dict against the declared inputs.
///
/// Missing names are reported before unexpected ones; dtypes and shapes are then
/// checked per input in declaration order. Unknown dtypes or shapes are not checked.
pub fn check_feed(feed: &FeedDict, metadata: &TensorMetadata) -> Result<()> {
    let expected = || metadata.names().map(str::to_string).collect::<Vec<_>>();

    let missing: Vec<String> = metadata
        .names()
        .filter(|name| !feed.contains_key(name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingKeys {
            missing,
            expected: expected(),
        });
    }

    let extra: Vec<String> = feed
        .keys()
        .filter(|name| !metadata.contains(name))
        .map(str::to_string)
        .collect();
    if !extra.is_empty() {
        return Err(Error::ExtraKeys {
            extra,
            expected: expected(),
        });
    }

    for (name, meta) in metadata.iter() {
        let Some(buffer) = feed.get(name) else {
            continue;
        };

        if let Some(dtype) = meta.dtype {
            if buffer.dtype() != dtype {
                return Err(Error::DTypeMismatch {
                    name: name.to_string(),
                    received: buffer.dtype(),
                    expected: dtype,
                });
            }
        }

        if let Some(shape) = &meta.shape {
            if !shape.is_compatible(buffer.shape()) {
                return Err(Error::ShapeMismatch {
                    name: name.to_string(),
                    received: buffer.shape().to_vec(),
                    expected: shape.clone(),
                });
            }
        }
    }

    Ok(())
}

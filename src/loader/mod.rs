//! Input data for inference runs
//!
//! A data loader turns a runner's declared inputs into the feed dicts of a run:
//! - `RandomLoader`: seeded random data shaped after the input metadata
//! - `Vec<FeedDict>`: caller-provided data, fed as is

mod random;

pub use random::RandomLoader;

use crate::error::Result;
use crate::tensor::{FeedDict, TensorMetadata};

/// Source of feed dicts, one per iteration
pub trait DataLoader {
    /// Produce the feed dicts for a run against inputs described by `metadata`
    fn feeds(&mut self, metadata: &TensorMetadata) -> Result<Vec<FeedDict>>;
}

impl DataLoader for Vec<FeedDict> {
    fn feeds(&mut self, _metadata: &TensorMetadata) -> Result<Vec<FeedDict>> {
        Ok(self.clone())
    }
}

impl<L: DataLoader + ?Sized> DataLoader for &mut L {
    fn feeds(&mut self, metadata: &TensorMetadata) -> Result<Vec<FeedDict>> {
        (**self).feeds(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::NdBuffer;

    #[test]
    fn test_provided_feeds_are_used_verbatim() {
        let feed: FeedDict = [("tokens", NdBuffer::from_slice(&[1i64, 2, 3], &[1, 3]).unwrap())]
            .into_iter()
            .collect();
        let mut loader = vec![feed.clone(), feed.clone()];
        let feeds = loader.feeds(&TensorMetadata::new()).unwrap();
        assert_eq!(feeds, vec![feed.clone(), feed]);
    }
}

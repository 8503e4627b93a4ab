//! Built-in document encoding for numeric buffers
//!
//! A buffer is written into an NPY container, and the container bytes are stored as
//! base64 text so the fragment stays valid JSON.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::tensor::NdBuffer;

use super::{npy, take_field, type_tag, Document, Fragment, TYPE_MARKER};

/// Type name under which numeric buffers are tagged
pub const ARRAY_TYPE_NAME: &str = "NdBuffer";

const ARRAY_FIELD: &str = "array";

/// Encode a buffer into a tagged fragment, without consulting a registry.
pub(crate) fn encode_fragment(buffer: &NdBuffer) -> Result<Fragment> {
    let container = npy::write(buffer)?;
    let mut fragment = Fragment::new();
    fragment.insert(ARRAY_FIELD.to_string(), Document::String(BASE64.encode(container)));
    fragment.insert(type_tag(ARRAY_TYPE_NAME), Document::String(TYPE_MARKER.to_string()));
    Ok(fragment)
}

/// Decode a fragment produced by `encode_fragment`. The marker key, if still present, is ignored.
pub(crate) fn decode_fragment(mut fragment: Fragment) -> Result<NdBuffer> {
    let encoded = match take_field(&mut fragment, ARRAY_FIELD)? {
        Document::String(encoded) => encoded,
        _ => return Err(Error::Malformed("array field must be a string".to_string())),
    };
    let container = BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| Error::Container(format!("base64 decode failed: {e}")))?;
    npy::read(&container)
}

crate::registered_codec!(NdBuffer);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Decode, Registry};

    #[test]
    fn test_array_fragment_is_byte_identical() {
        let buf =
            NdBuffer::from_slice(&[1.5f64, -2.25, 1e300, f64::MIN_POSITIVE], &[2, 2]).unwrap();
        let fragment = encode_fragment(&buf).unwrap();
        assert_eq!(fragment[&type_tag(ARRAY_TYPE_NAME)], TYPE_MARKER);
        let back = decode_fragment(fragment).unwrap();
        assert_eq!(back.as_bytes(), buf.as_bytes());
        assert_eq!(back, buf);
    }

    #[test]
    fn test_untagged_document_is_rejected() {
        let doc = serde_json::json!({ "array": "" });
        assert!(matches!(
            NdBuffer::decode(doc, &Registry::new()),
            Err(Error::UnexpectedType { .. })
        ));
    }

    #[test]
    fn test_corrupt_base64_is_rejected() {
        let mut fragment = Fragment::new();
        fragment.insert(ARRAY_FIELD.to_string(), Document::String("***".to_string()));
        assert!(matches!(decode_fragment(fragment), Err(Error::Container(_))));
    }
}

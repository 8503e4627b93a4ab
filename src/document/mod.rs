//! Portable document format
//!
//! Results are persisted as JSON documents. Plain mappings, sequences and scalars use
//! ordinary structural encoding; instances of registered types are encoded by their
//! registered encoder and tagged with a reserved key so they can be routed back to
//! the matching decoder:
//!
//! ```json
//! { "array": "k05VTVBZ...", "__tandem_encoded_NdBuffer": "tandem_registered_type" }
//! ```
//!
//! - `Registry`: the type-tagged encoder/decoder tables
//! - `Encode`/`Decode`: structural walk over values, delegating to the registry
//! - `npy`: the binary container used for numeric buffers

mod array;
pub mod npy;
mod registry;

pub use array::ARRAY_TYPE_NAME;
pub use registry::{Decoded, Registry, Serializable};

use crate::error::{Error, Result};
use crate::tensor::TensorDict;

/// A document value
pub type Document = serde_json::Value;

/// A document mapping; custom encoders produce one of these
pub type Fragment = serde_json::Map<String, Document>;

/// Prefix of the reserved key marking a custom-encoded fragment
pub const TYPE_TAG_PREFIX: &str = "__tandem_encoded_";

/// Value bound to the reserved key
pub const TYPE_MARKER: &str = "tandem_registered_type";

/// Reserved key for a registered type name
pub fn type_tag(type_name: &str) -> String {
    format!("{TYPE_TAG_PREFIX}{type_name}")
}

/// Values that can be written into a document
pub trait Encode {
    fn encode(&self, registry: &Registry) -> Result<Document>;
}

/// Values that can be rebuilt from a document
pub trait Decode: Sized {
    fn decode(document: Document, registry: &Registry) -> Result<Self>;
}

/// Implement `Encode` and `Decode` for a type by routing through the registry.
///
/// The type still has to be registered (see [`Registry::register`]) before it can be
/// encoded or decoded.
#[macro_export]
macro_rules! registered_codec {
    ($ty:ty) => {
        impl $crate::document::Encode for $ty {
            fn encode(
                &self,
                registry: &$crate::document::Registry,
            ) -> $crate::Result<$crate::document::Document> {
                registry.encode_custom(self)
            }
        }

        impl $crate::document::Decode for $ty {
            fn decode(
                document: $crate::document::Document,
                registry: &$crate::document::Registry,
            ) -> $crate::Result<Self> {
                registry.decode_as::<Self>(document)
            }
        }
    };
}

/// Short description of a document's kind, for error messages
pub(crate) fn describe(document: &Document) -> &'static str {
    match document {
        Document::Null => "null",
        Document::Bool(_) => "bool",
        Document::Number(_) => "number",
        Document::String(_) => "string",
        Document::Array(_) => "list",
        Document::Object(_) => "mapping",
    }
}

/// Remove a required field from a fragment
pub fn take_field(fragment: &mut Fragment, key: &str) -> Result<Document> {
    fragment
        .shift_remove(key)
        .ok_or_else(|| Error::Malformed(format!("missing field '{key}'")))
}

pub fn expect_object(document: Document, what: &str) -> Result<Fragment> {
    match document {
        Document::Object(fragment) => Ok(fragment),
        other => Err(Error::Malformed(format!(
            "expected {what} to be a mapping, found {}",
            describe(&other)
        ))),
    }
}

fn mismatch(expected: &str, found: &Document) -> Error {
    Error::Malformed(format!("expected {expected}, found {}", describe(found)))
}

impl Encode for bool {
    fn encode(&self, _registry: &Registry) -> Result<Document> {
        Ok(Document::Bool(*self))
    }
}

impl Encode for str {
    fn encode(&self, _registry: &Registry) -> Result<Document> {
        Ok(Document::String(self.to_string()))
    }
}

impl Encode for String {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        self.as_str().encode(registry)
    }
}

macro_rules! impl_integer_codec {
    ($($ty:ty => $getter:ident),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, _registry: &Registry) -> Result<Document> {
                    Ok(Document::from(*self))
                }
            }

            impl Decode for $ty {
                fn decode(document: Document, _registry: &Registry) -> Result<Self> {
                    document
                        .$getter()
                        .and_then(|value| <$ty>::try_from(value).ok())
                        .ok_or_else(|| mismatch(stringify!($ty), &document))
                }
            }
        )*
    };
}

impl_integer_codec! {
    i32 => as_i64,
    i64 => as_i64,
    u32 => as_u64,
    u64 => as_u64,
    usize => as_u64,
}

impl Encode for f64 {
    fn encode(&self, _registry: &Registry) -> Result<Document> {
        serde_json::Number::from_f64(*self)
            .map(Document::Number)
            .ok_or_else(|| Error::Malformed(format!("{self} cannot be stored in a document")))
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        (**self).encode(registry)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        match self {
            Some(value) => value.encode(registry),
            None => Ok(Document::Null),
        }
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        self.iter()
            .map(|item| item.encode(registry))
            .collect::<Result<Vec<_>>>()
            .map(Document::Array)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        self.as_slice().encode(registry)
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        Ok(Document::Array(vec![
            self.0.encode(registry)?,
            self.1.encode(registry)?,
        ]))
    }
}

impl<T: Encode> Encode for TensorDict<T> {
    fn encode(&self, registry: &Registry) -> Result<Document> {
        let mut fragment = Fragment::new();
        for (name, value) in self.iter() {
            fragment.insert(name.to_string(), value.encode(registry)?);
        }
        Ok(Document::Object(fragment))
    }
}

/// Raw documents are kept as they are, but every marked fragment inside must still
/// name a decodable type.
impl Decode for Document {
    fn decode(document: Document, registry: &Registry) -> Result<Self> {
        registry.check_decodable(&document)?;
        Ok(document)
    }
}

impl Decode for bool {
    fn decode(document: Document, _registry: &Registry) -> Result<Self> {
        document.as_bool().ok_or_else(|| mismatch("bool", &document))
    }
}

impl Decode for String {
    fn decode(document: Document, _registry: &Registry) -> Result<Self> {
        match document {
            Document::String(value) => Ok(value),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl Decode for f64 {
    fn decode(document: Document, _registry: &Registry) -> Result<Self> {
        document.as_f64().ok_or_else(|| mismatch("number", &document))
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(document: Document, registry: &Registry) -> Result<Self> {
        match document {
            Document::Null => Ok(None),
            other => T::decode(other, registry).map(Some),
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(document: Document, registry: &Registry) -> Result<Self> {
        match document {
            Document::Array(items) => items
                .into_iter()
                .map(|item| T::decode(item, registry))
                .collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(document: Document, registry: &Registry) -> Result<Self> {
        match document {
            Document::Array(items) if items.len() == 2 => {
                let mut items = items.into_iter();
                match (items.next(), items.next()) {
                    (Some(a), Some(b)) => Ok((A::decode(a, registry)?, B::decode(b, registry)?)),
                    _ => Err(Error::Malformed("expected a pair".to_string())),
                }
            }
            other => Err(mismatch("pair", &other)),
        }
    }
}

impl<T: Decode> Decode for TensorDict<T> {
    fn decode(document: Document, registry: &Registry) -> Result<Self> {
        let fragment = registry.expect_plain(expect_object(document, "tensor dictionary")?)?;
        let mut dict = TensorDict::with_capacity(fragment.len());
        for (name, value) in fragment {
            dict.insert(name, T::decode(value, registry)?);
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structural_roundtrip() {
        let registry = Registry::new();
        let value: Vec<(String, Option<u64>)> =
            vec![("a".to_string(), Some(3)), ("b".to_string(), None)];
        let doc = value.encode(&registry).unwrap();
        assert_eq!(doc, json!([["a", 3], ["b", null]]));
        let back: Vec<(String, Option<u64>)> = Decode::decode(doc, &registry).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_tensor_dict_keeps_order() {
        let registry = Registry::new();
        let dict: TensorDict<i64> = [("z", 1i64), ("a", 2), ("m", 3)].into_iter().collect();
        let json = registry.to_json(&dict).unwrap();
        let back: TensorDict<i64> = registry.from_json(&json).unwrap();
        assert_eq!(back.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_integer_range_is_checked() {
        let registry = Registry::new();
        assert!(<u32 as Decode>::decode(json!(-1), &registry).is_err());
        assert!(<u32 as Decode>::decode(json!("1"), &registry).is_err());
        assert_eq!(<usize as Decode>::decode(json!(7), &registry).unwrap(), 7);
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let registry = Registry::new();
        assert!(f64::NAN.encode(&registry).is_err());
    }

    #[test]
    fn test_type_tag() {
        assert_eq!(type_tag("RunResults"), "__tandem_encoded_RunResults");
    }
}

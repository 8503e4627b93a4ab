//! Encoder and decoder tables for registered types

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::tensor::{NdBuffer, TensorMetadata};

use super::array::{self, ARRAY_TYPE_NAME};
use super::{describe, type_tag, Decode, Document, Encode, Fragment, TYPE_MARKER, TYPE_TAG_PREFIX};

/// A type with a registered document encoding.
///
/// `to_fragment` produces the mapping stored for an instance; the registry adds the
/// type marker itself. `from_fragment` receives the mapping with the marker removed.
pub trait Serializable: Any + Send + Sized {
    /// Name used in the reserved type key; unique per registry
    const TYPE_NAME: &'static str;

    fn to_fragment(&self, registry: &Registry) -> Result<Fragment>;

    fn from_fragment(fragment: Fragment, registry: &Registry) -> Result<Self>;
}

type EncodeFn = Box<dyn Fn(&dyn Any, &Registry) -> Result<Fragment> + Send + Sync>;
type DecodeFn = Box<dyn Fn(Fragment, &Registry) -> Result<Box<dyn Any + Send>> + Send + Sync>;
type ArrayProbe = Box<dyn Fn() -> bool + Send + Sync>;

struct EncoderEntry {
    type_name: String,
    encode: EncodeFn,
}

/// Encoder/decoder tables for custom types.
///
/// Encoders are keyed by concrete type, decoders by type name. Both tables only ever
/// grow, and a type name can be claimed once.
pub struct Registry {
    encoders: HashMap<TypeId, EncoderEntry>,
    decoders: HashMap<String, DecodeFn>,
    array_probe: ArrayProbe,
    array_codec: OnceLock<()>,
}

impl Registry {
    /// Empty registry; the numeric array codec becomes available on first use.
    pub fn new() -> Self {
        Self::with_array_probe(|| true)
    }

    /// Empty registry whose array codec is bound once `probe` first reports true.
    ///
    /// The probe is consulted on every encode/decode call until it succeeds, and
    /// never again afterwards.
    pub fn with_array_probe(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            encoders: HashMap::new(),
            decoders: HashMap::new(),
            array_probe: Box::new(probe),
            array_codec: OnceLock::new(),
        }
    }

    /// Registry with every type this crate persists
    pub fn standard(config: &HarnessConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.register::<TensorMetadata>()?;
        crate::results::register_types(&mut registry, config)?;
        Ok(registry)
    }

    /// Bind the built-in array codec if its capability is available.
    ///
    /// Returns whether the codec is bound. Succeeds at most once; later calls are a
    /// single check.
    pub fn ensure_array_codec(&self) -> bool {
        if self.array_codec.get().is_some() {
            return true;
        }
        if !(self.array_probe)() {
            return false;
        }
        if self.array_codec.set(()).is_ok() {
            tracing::debug!(type_name = ARRAY_TYPE_NAME, "registered numeric array codec");
        }
        true
    }

    fn check_type_name_free(&self, type_name: &str) -> Result<()> {
        let claimed = type_name == ARRAY_TYPE_NAME
            || self.decoders.contains_key(type_name)
            || self.encoders.values().any(|entry| entry.type_name == type_name);
        if claimed {
            return Err(Error::DuplicateRegistration {
                tag: type_name.to_string(),
            });
        }
        Ok(())
    }

    fn check_encoder_free<T: Any>(&self, type_name: &str) -> Result<()> {
        let type_id = TypeId::of::<T>();
        if type_id == TypeId::of::<NdBuffer>() || self.encoders.contains_key(&type_id) {
            return Err(Error::DuplicateRegistration {
                tag: type_name.to_string(),
            });
        }
        if type_name == ARRAY_TYPE_NAME
            || self.encoders.values().any(|entry| entry.type_name == type_name)
        {
            return Err(Error::DuplicateRegistration {
                tag: type_name.to_string(),
            });
        }
        Ok(())
    }

    /// Register an encoder for `T`. The produced fragment is tagged with `type_name`.
    pub fn register_encoder<T, F>(&mut self, type_name: &str, encode: F) -> Result<()>
    where
        T: Any,
        F: Fn(&T, &Registry) -> Result<Fragment> + Send + Sync + 'static,
    {
        self.check_encoder_free::<T>(type_name)?;

        let tag = type_tag(type_name);
        let owned_name = type_name.to_string();
        let wrapped: EncodeFn = Box::new(move |value: &dyn Any, registry: &Registry| {
            let value = value
                .downcast_ref::<T>()
                .ok_or_else(|| Error::NoEncoder(owned_name.clone()))?;
            let mut fragment = encode(value, registry)?;
            fragment.insert(tag.clone(), Document::String(TYPE_MARKER.to_string()));
            Ok(fragment)
        });

        self.encoders.insert(
            TypeId::of::<T>(),
            EncoderEntry {
                type_name: type_name.to_string(),
                encode: wrapped,
            },
        );
        tracing::debug!(type_name, "registered encoder");
        Ok(())
    }

    /// Register a decoder for fragments tagged with `type_name`. The marker key is
    /// removed before `decode` sees the fragment.
    pub fn register_decoder<T, F>(&mut self, type_name: &str, decode: F) -> Result<()>
    where
        T: Any + Send,
        F: Fn(Fragment, &Registry) -> Result<T> + Send + Sync + 'static,
    {
        if type_name == ARRAY_TYPE_NAME || self.decoders.contains_key(type_name) {
            return Err(Error::DuplicateRegistration {
                tag: type_name.to_string(),
            });
        }

        let tag = type_tag(type_name);
        let wrapped: DecodeFn = Box::new(move |mut fragment: Fragment, registry: &Registry| {
            fragment.shift_remove(&tag);
            decode(fragment, registry).map(|value| Box::new(value) as Box<dyn Any + Send>)
        });

        self.decoders.insert(type_name.to_string(), wrapped);
        tracing::debug!(type_name, "registered decoder");
        Ok(())
    }

    /// Register both directions for a `Serializable` type
    pub fn register<T: Serializable>(&mut self) -> Result<()> {
        self.check_type_name_free(T::TYPE_NAME)?;
        self.check_encoder_free::<T>(T::TYPE_NAME)?;
        self.register_encoder::<T, _>(T::TYPE_NAME, T::to_fragment)?;
        self.register_decoder::<T, _>(T::TYPE_NAME, T::from_fragment)
    }

    /// Whether a decoder exists for `type_name` right now
    pub fn can_decode(&self, type_name: &str) -> bool {
        if type_name == ARRAY_TYPE_NAME {
            return self.ensure_array_codec();
        }
        self.decoders.contains_key(type_name)
    }

    /// Registered name of `T`, or its Rust name when unregistered
    fn name_of<T: Any>(&self) -> String {
        if TypeId::of::<T>() == TypeId::of::<NdBuffer>() {
            return ARRAY_TYPE_NAME.to_string();
        }
        self.encoders
            .get(&TypeId::of::<T>())
            .map(|entry| entry.type_name.clone())
            .unwrap_or_else(|| std::any::type_name::<T>().to_string())
    }

    /// Encode a value through its registered encoder
    pub fn encode_custom<T: Any>(&self, value: &T) -> Result<Document> {
        let value: &dyn Any = value;
        if let Some(buffer) = value.downcast_ref::<NdBuffer>() {
            if !self.ensure_array_codec() {
                return Err(Error::NoEncoder(ARRAY_TYPE_NAME.to_string()));
            }
            return array::encode_fragment(buffer).map(Document::Object);
        }

        self.ensure_array_codec();
        let entry = self
            .encoders
            .get(&TypeId::of::<T>())
            .ok_or_else(|| Error::NoEncoder(std::any::type_name::<T>().to_string()))?;
        (entry.encode)(value, self).map(Document::Object)
    }

    /// Route a marked fragment to its decoder
    fn decode_custom(&self, type_name: &str, fragment: Fragment) -> Result<Box<dyn Any + Send>> {
        if type_name == ARRAY_TYPE_NAME && self.ensure_array_codec() {
            let buffer = array::decode_fragment(fragment)?;
            return Ok(Box::new(buffer));
        }

        match self.decoders.get(type_name) {
            Some(decode) => decode(fragment, self),
            None => Err(Error::CannotDecode {
                tag: type_name.to_string(),
                fragment: Document::Object(fragment).to_string(),
            }),
        }
    }

    /// Decode a document that must hold a registered `T`
    pub fn decode_as<T: Any>(&self, document: Document) -> Result<T> {
        self.ensure_array_codec();
        let expected = self.name_of::<T>();
        let fragment = match document {
            Document::Object(fragment) => fragment,
            other => {
                return Err(Error::UnexpectedType {
                    expected,
                    found: describe(&other).to_string(),
                })
            }
        };

        let Some(type_name) = marked_type(&fragment) else {
            return Err(Error::UnexpectedType {
                expected,
                found: "mapping".to_string(),
            });
        };

        let value = self.decode_custom(&type_name, fragment)?;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| Error::UnexpectedType {
                expected,
                found: type_name,
            })
    }

    /// Check that a mapping is not a custom-encoded instance.
    ///
    /// Marked fragments with a known decoder are the wrong type here; marked fragments
    /// without one cannot be decoded at all.
    pub fn expect_plain(&self, fragment: Fragment) -> Result<Fragment> {
        match marked_type(&fragment) {
            None => Ok(fragment),
            Some(type_name) if self.can_decode(&type_name) => Err(Error::UnexpectedType {
                expected: "plain mapping".to_string(),
                found: type_name,
            }),
            Some(type_name) => Err(Error::CannotDecode {
                tag: type_name,
                fragment: Document::Object(fragment).to_string(),
            }),
        }
    }

    /// Fail on the first marked fragment in `document` that has no decoder
    pub fn check_decodable(&self, document: &Document) -> Result<()> {
        match document {
            Document::Array(items) => items.iter().try_for_each(|item| self.check_decodable(item)),
            Document::Object(fragment) => match marked_type(fragment) {
                Some(type_name) if !self.can_decode(&type_name) => Err(Error::CannotDecode {
                    tag: type_name,
                    fragment: document.to_string(),
                }),
                _ => fragment
                    .values()
                    .try_for_each(|value| self.check_decodable(value)),
            },
            _ => Ok(()),
        }
    }

    /// Decode an arbitrary document, routing every marked fragment to its decoder
    pub fn decode_any(&self, document: Document) -> Result<Decoded> {
        self.ensure_array_codec();
        self.walk(document)
    }

    fn walk(&self, document: Document) -> Result<Decoded> {
        let decoded = match document {
            Document::Null => Decoded::Null,
            Document::Bool(value) => Decoded::Bool(value),
            Document::Number(value) => Decoded::Number(value),
            Document::String(value) => Decoded::String(value),
            Document::Array(items) => Decoded::List(
                items
                    .into_iter()
                    .map(|item| self.walk(item))
                    .collect::<Result<_>>()?,
            ),
            Document::Object(fragment) => match marked_type(&fragment) {
                Some(type_name) => {
                    let value = self.decode_custom(&type_name, fragment)?;
                    Decoded::Custom { type_name, value }
                }
                None => Decoded::Map(
                    fragment
                        .into_iter()
                        .map(|(key, value)| self.walk(value).map(|decoded| (key, decoded)))
                        .collect::<Result<_>>()?,
                ),
            },
        };
        Ok(decoded)
    }

    /// Encode a value into pretty-printed JSON text
    pub fn to_json<T: Encode + ?Sized>(&self, value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(&value.encode(self)?)?)
    }

    pub fn from_json<T: Decode>(&self, json: &str) -> Result<T> {
        T::decode(serde_json::from_str(json)?, self)
    }

    pub fn save_json<T: Encode + ?Sized>(&self, value: &T, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json(value)?)?;
        tracing::debug!(path = %path.display(), "saved document");
        Ok(())
    }

    /// Load a document written by `save_json`.
    ///
    /// Files from the legacy binary format are refused with a hint instead of being
    /// parsed as JSON.
    pub fn load_json<T: Decode>(&self, path: impl AsRef<Path>) -> Result<T> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let legacy = || Error::LegacyFormat {
            path: path.to_path_buf(),
            hint: "results saved in the legacy binary format must be re-saved as JSON with \
                   the release that wrote them before they can be loaded"
                .to_string(),
        };

        if bytes.first() == Some(&LEGACY_MAGIC) {
            return Err(legacy());
        }
        let text = std::str::from_utf8(&bytes).map_err(|_| legacy())?;
        tracing::debug!(path = %path.display(), "loading document");
        self.from_json(text)
    }
}

/// First byte of a legacy binary results file
const LEGACY_MAGIC: u8 = 0x80;

/// Type name carried by a fragment's reserved key, if it has one
fn marked_type(fragment: &Fragment) -> Option<String> {
    fragment.iter().find_map(|(key, value)| {
        let type_name = key.strip_prefix(TYPE_TAG_PREFIX)?;
        (value.as_str() == Some(TYPE_MARKER)).then(|| type_name.to_string())
    })
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut encoders: Vec<_> = self.encoders.values().map(|e| e.type_name.as_str()).collect();
        encoders.sort_unstable();
        let mut decoders: Vec<_> = self.decoders.keys().map(String::as_str).collect();
        decoders.sort_unstable();
        f.debug_struct("Registry")
            .field("encoders", &encoders)
            .field("decoders", &decoders)
            .field("array_codec", &self.array_codec.get().is_some())
            .finish()
    }
}

/// A document decoded without a target type
pub enum Decoded {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Decoded>),
    Map(Vec<(String, Decoded)>),
    /// Instance produced by a registered decoder
    Custom {
        type_name: String,
        value: Box<dyn Any + Send>,
    },
}

impl Decoded {
    /// Short description of the value, for error messages
    pub fn kind(&self) -> &str {
        match self {
            Decoded::Null => "null",
            Decoded::Bool(_) => "bool",
            Decoded::Number(_) => "number",
            Decoded::String(_) => "string",
            Decoded::List(_) => "list",
            Decoded::Map(_) => "mapping",
            Decoded::Custom { type_name, .. } => type_name,
        }
    }

    /// Take the value out as a `T` if it is a custom instance of that type
    pub fn downcast<T: Any>(self) -> Result<T> {
        match self {
            Decoded::Custom { type_name, value } => {
                value
                    .downcast::<T>()
                    .map(|value| *value)
                    .map_err(|_| Error::UnexpectedType {
                        expected: std::any::type_name::<T>().to_string(),
                        found: type_name,
                    })
            }
            other => Err(Error::UnexpectedType {
                expected: std::any::type_name::<T>().to_string(),
                found: other.kind().to_string(),
            }),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Decoded::Custom { value, .. } => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoded::Null => f.write_str("Null"),
            Decoded::Bool(value) => f.debug_tuple("Bool").field(value).finish(),
            Decoded::Number(value) => f.debug_tuple("Number").field(value).finish(),
            Decoded::String(value) => f.debug_tuple("String").field(value).finish(),
            Decoded::List(items) => f.debug_tuple("List").field(items).finish(),
            Decoded::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Decoded::Custom { type_name, .. } => {
                f.debug_struct("Custom").field("type_name", type_name).finish_non_exhaustive()
            }
        }
    }
}

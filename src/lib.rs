//! # typed-bson
//!
//! A type-driven BSON serializer/deserializer.
//!
//! - Values are encoded by walking their runtime [`Type`] through an extensible dispatch table
//! - Byte-for-byte standard BSON framing (`int32 length | elements | 0x00`)
//! - `u64` is carried under the Timestamp tag (0x11) as its raw bit pattern, since BSON has no unsigned 64-bit type
//! - Custom derive macros for structs ([`Object`](macro@Object)) and unit enums ([`Enum`](macro@Enum))
//! - Host-defined types plug in by allocating a [`ClassId`] and registering handlers, or through named interpretations
//!
//! ## Attribute Macros
//!
//! - `#[bson(rename = "name")]` — Use the given key for a struct field, or the given string for an enum variant.
//! - `#[bson(type_selector = "path")]` — On an `Option<AnyValue>` field: `path` is a `fn(&Self) -> &'static Type` choosing the concrete type of the field from the rest of the object.
//! - `#[bson(repr = "string" | "i32" | "i64")]` — On an enum: the representation written to the wire (default `string`).
//! - `#[bson(not_null)]` — On an enum: a null value is a constraint violation instead of a BSON null.
//!
//! `Option<T>` struct fields are nullable; any other field keeps its `Default` value when
//! the document does not provide it.
//!
//! ## Feature Flags
//!
//! - `indexmap` — Enables `IndexMap<String, V>` as a map and `IndexSet<T>` as a set, preserving insertion order.
//! - `chrono` — Enables conversions between [`DateTime`] and `chrono::DateTime<Utc>`.
//! - `serde` — Makes [`SerializerConfig`] and [`DeserializerConfig`] (de)serializable.

pub mod config;
pub mod core;
pub mod de;
mod features;
pub mod mapper;
pub mod ser;
pub mod types;
pub mod values;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::OnceLock;
pub use typed_bson_derive::{Enum, Object};

pub use config::{DeserializerConfig, MismatchPolicy, SerializerConfig};
pub use de::{Deserializer, DeserializerMethod};
pub use mapper::ObjectMapper;
pub use ser::{Serializer, SerializerMethod};
pub use types::{
    resolve_type, ClassId, CollectionBuilder, CollectionInfo, EnumInfo, Field, Interpretation,
    MapBuilder, MapInfo, Object, ObjectInfo, Polymorph, Reflect, ReflectRef, Slot, Type,
    TypeKind, TypeSelector,
};
pub use values::{AnyValue, DateTime, InlineArray, InlineDocument, ObjectId, PairList, Primitive};

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum BsonError {
    /// The value could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),
    /// The buffer is not well-formed BSON.
    #[error("Decode error: {0}")]
    Decode(String),
    /// The buffer ended before the value did.
    #[error("Insufficient data in buffer")]
    InsufficientData,
    /// A value that is not a document was handed to the serializer without a key.
    #[error("Cannot serialize a {0} value without a key")]
    MissingKey(&'static str),
    /// A null value was handed to the serializer with no key to attach it to.
    #[error("Cannot serialize a null value as the document root")]
    NullRoot,
    /// A pre-encoded blob does not frame itself correctly.
    #[error("Invalid inline {kind}: {reason}")]
    InvalidInline { kind: &'static str, reason: String },
    /// Neither a handler nor an enabled interpretation exists for the type.
    #[error("No serializer method for class {class} (type {type_name})")]
    UnsupportedType {
        class: &'static str,
        type_name: &'static str,
    },
    /// An interpretation chain did not reach a handled type within the configured depth.
    #[error("Interpretation of {0} exceeded the maximum depth of {1}")]
    InterpretationDepth(&'static str, usize),
    /// The wire tag cannot be stored in the target type.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// A null reached a slot of a non-nullable type.
    #[error("Null value for non-nullable {0}")]
    NullValue(&'static str),
    /// A value was not of the Rust type its [`Type`] claimed.
    #[error("Expected value of type {expected}, found {found}")]
    Downcast {
        expected: &'static str,
        found: &'static str,
    },
    /// Enum interpretation error
    #[error(transparent)]
    Enum(#[from] EnumInterpreterError),
    /// Object-specific decode error
    #[error(transparent)]
    Object(#[from] ObjectDecodeError),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, BsonError>;

/// Errors raised by enum representation hooks.
#[derive(Debug, thiserror::Error)]
pub enum EnumInterpreterError {
    #[error("Enum {enum_name} is declared not-null but the value is null")]
    ConstraintNotNull { enum_name: &'static str },
    #[error("Expected enum {enum_name}, got {found}")]
    TypeMismatchEnum {
        enum_name: &'static str,
        found: &'static str,
    },
    #[error("Enum {enum_name} is represented as {expected}, got {found}")]
    TypeMismatchEnumValue {
        enum_name: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("No entry of enum {enum_name} matches {value}")]
    EntryNotFound {
        enum_name: &'static str,
        value: String,
    },
}

/// Errors raised while populating an object.
#[derive(Debug, thiserror::Error)]
pub enum ObjectDecodeError {
    #[error("Required field '{field}' not found for object {object}")]
    MissingRequiredField {
        field: &'static str,
        object: &'static str,
    },
    #[error("Unknown field '{field}' for object {object}")]
    UnknownField { field: String, object: &'static str },
    #[error("Type selector chose {selected}, but the value holds {held}")]
    TypeSelectorMismatch {
        selected: &'static str,
        held: &'static str,
    },
}

fn default_mapper() -> &'static ObjectMapper {
    static MAPPER: OnceLock<ObjectMapper> = OnceLock::new();
    MAPPER.get_or_init(ObjectMapper::new)
}

/// Convenience function to encode a value as a top-level BSON document
/// with the default configuration.
///
/// # Example
/// ```rust
/// use typed_bson::{from_bytes, to_bytes, Object};
///
/// #[derive(Object, Default, PartialEq, Debug)]
/// struct User {
///     id: i64,
///     name: String,
///     nickname: Option<String>,
/// }
///
/// let value = User { id: 42, name: "hello".to_string(), nickname: None };
/// let mut buf = to_bytes(&value).unwrap();
/// let decoded: User = from_bytes(&mut buf).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn to_bytes<T: Slot>(value: &T) -> Result<Bytes> {
    default_mapper().write_to_bytes(value)
}

/// Convenience function to decode a top-level BSON document with the
/// default configuration.
///
/// # Example
/// ```rust
/// use typed_bson::{from_bytes, to_bytes};
/// use std::collections::BTreeMap;
///
/// let mut value = BTreeMap::new();
/// value.insert("a".to_string(), 1i32);
/// value.insert("b".to_string(), 2i32);
///
/// let mut buf = to_bytes(&value).unwrap();
/// let decoded: BTreeMap<String, i32> = from_bytes(&mut buf).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn from_bytes<T: Slot>(reader: &mut Bytes) -> Result<T> {
    default_mapper().read(reader)
}

/// Like [`from_bytes`], reading from a borrowed slice.
pub fn from_slice<T: Slot>(data: &[u8]) -> Result<T> {
    default_mapper().read_from_slice(data)
}

use crate::core::*;
use crate::impl_slot;
use crate::types::{self, map_builder, seq_builder};
use crate::*;
use rand::RngCore;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Boilerplate shared by every `Reflect` impl whose `value_type` is its static type.
macro_rules! reflect_common {
    () => {
        fn value_type(&self) -> &'static Type {
            <Self as Reflect>::type_of()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }
    };
}

/// A scalar with a fixed-width wire encoding.
pub trait Primitive: Reflect + Copy {
    /// Tag used when encoding.
    const TAG: u8;

    fn write_wire(self, writer: &mut BytesMut);

    /// Lossless conversion from whatever scalar the wire carried.
    fn from_wire(scalar: WireScalar) -> Option<Self>;
}

macro_rules! scalar_reflect {
    ($ty:ty, $class:ident) => {
        impl Reflect for $ty {
            fn type_of() -> &'static Type {
                resolve_type::<Self>(|| Type::new::<Self>(ClassId::$class, TypeKind::Scalar))
            }

            reflect_common!();
        }

        impl_slot!($ty);
    };
}

macro_rules! integer_primitive {
    ($ty:ty, $class:ident, $tag:expr, $wire:ty, $write:ident) => {
        scalar_reflect!($ty, $class);

        impl Primitive for $ty {
            const TAG: u8 = $tag;

            fn write_wire(self, writer: &mut BytesMut) {
                $write(writer, <$wire>::from(self));
            }

            fn from_wire(scalar: WireScalar) -> Option<Self> {
                match scalar {
                    WireScalar::Int32(v) => <$ty>::try_from(v).ok(),
                    WireScalar::Int64(v) => <$ty>::try_from(v).ok(),
                    WireScalar::Timestamp(v) => <$ty>::try_from(v).ok(),
                    WireScalar::Double(_) | WireScalar::Boolean(_) => None,
                }
            }
        }
    };
}

integer_primitive!(i8, INT8, TAG_INT32, i32, write_i32_le);
integer_primitive!(u8, UINT8, TAG_INT32, i32, write_i32_le);
integer_primitive!(i16, INT16, TAG_INT32, i32, write_i32_le);
integer_primitive!(u16, UINT16, TAG_INT32, i32, write_i32_le);
integer_primitive!(i32, INT32, TAG_INT32, i32, write_i32_le);
integer_primitive!(u32, UINT32, TAG_INT64, i64, write_i64_le);
integer_primitive!(i64, INT64, TAG_INT64, i64, write_i64_le);
integer_primitive!(u64, UINT64, TAG_TIMESTAMP, u64, write_u64_le);

/// Largest integer magnitude a double holds exactly.
const F64_EXACT: i64 = 1 << 53;
const F32_EXACT: i32 = 1 << 24;

scalar_reflect!(f64, FLOAT64);

impl Primitive for f64 {
    const TAG: u8 = TAG_DOUBLE;

    fn write_wire(self, writer: &mut BytesMut) {
        writer.put_f64_le(self);
    }

    fn from_wire(scalar: WireScalar) -> Option<Self> {
        match scalar {
            WireScalar::Double(v) => Some(v),
            WireScalar::Int32(v) => Some(v as f64),
            WireScalar::Int64(v) if (-F64_EXACT..=F64_EXACT).contains(&v) => Some(v as f64),
            _ => None,
        }
    }
}

scalar_reflect!(f32, FLOAT32);

impl Primitive for f32 {
    const TAG: u8 = TAG_DOUBLE;

    fn write_wire(self, writer: &mut BytesMut) {
        writer.put_f64_le(self as f64);
    }

    fn from_wire(scalar: WireScalar) -> Option<Self> {
        match scalar {
            WireScalar::Double(v) => Some(v as f32),
            WireScalar::Int32(v) if (-F32_EXACT..=F32_EXACT).contains(&v) => Some(v as f32),
            _ => None,
        }
    }
}

scalar_reflect!(bool, BOOLEAN);

impl Primitive for bool {
    const TAG: u8 = TAG_BOOLEAN;

    fn write_wire(self, writer: &mut BytesMut) {
        writer.put_u8(self as u8);
    }

    fn from_wire(scalar: WireScalar) -> Option<Self> {
        match scalar {
            WireScalar::Boolean(v) => Some(v),
            _ => None,
        }
    }
}

scalar_reflect!(String, STRING);

// --- Collections ---

impl<T: Slot> Reflect for Vec<T> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::VECTOR,
                TypeKind::Collection(CollectionInfo {
                    item: T::slot_type,
                    item_nullable: T::NULLABLE,
                    builder: seq_builder::<Self, T>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Sequence(Box::new(self.iter().map(Slot::get)))
    }
}

impl_slot!([T: Slot] Vec<T>);

impl<T: Slot> Reflect for VecDeque<T> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::LIST,
                TypeKind::Collection(CollectionInfo {
                    item: T::slot_type,
                    item_nullable: T::NULLABLE,
                    builder: seq_builder::<Self, T>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Sequence(Box::new(self.iter().map(Slot::get)))
    }
}

impl_slot!([T: Slot] VecDeque<T>);

impl<T: Slot + Eq + Hash> Reflect for HashSet<T> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::UNORDERED_SET,
                TypeKind::Collection(CollectionInfo {
                    item: T::slot_type,
                    item_nullable: T::NULLABLE,
                    builder: seq_builder::<Self, T>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Sequence(Box::new(self.iter().map(Slot::get)))
    }
}

impl_slot!([T: Slot + Eq + Hash] HashSet<T>);

impl<T: Slot + Ord> Reflect for BTreeSet<T> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::UNORDERED_SET,
                TypeKind::Collection(CollectionInfo {
                    item: T::slot_type,
                    item_nullable: T::NULLABLE,
                    builder: seq_builder::<Self, T>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Sequence(Box::new(self.iter().map(Slot::get)))
    }
}

impl_slot!([T: Slot + Ord] BTreeSet<T>);

// --- Maps ---

impl<V: Slot> Reflect for HashMap<String, V> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::UNORDERED_MAP,
                TypeKind::Map(MapInfo {
                    value: V::slot_type,
                    value_nullable: V::NULLABLE,
                    builder: map_builder::<Self, V>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Mapping(Box::new(self.iter().map(|(k, v)| (k.as_str(), v.get()))))
    }
}

impl_slot!([V: Slot] HashMap<String, V>);

impl<V: Slot> Reflect for BTreeMap<String, V> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::UNORDERED_MAP,
                TypeKind::Map(MapInfo {
                    value: V::slot_type,
                    value_nullable: V::NULLABLE,
                    builder: map_builder::<Self, V>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Mapping(Box::new(self.iter().map(|(k, v)| (k.as_str(), v.get()))))
    }
}

impl_slot!([V: Slot] BTreeMap<String, V>);

/// An ordered list of key/value pairs. Duplicate keys are kept, and entries
/// are encoded in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct PairList<V>(pub Vec<(String, V)>);

impl<V> Default for PairList<V> {
    fn default() -> Self {
        PairList(Vec::new())
    }
}

impl<V> PairList<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: V) {
        self.0.push((key.into(), value));
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<V> Extend<(String, V)> for PairList<V> {
    fn extend<I: IntoIterator<Item = (String, V)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for PairList<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PairList(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<V: Slot> Reflect for PairList<V> {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| {
            Type::new::<Self>(
                ClassId::PAIR_LIST,
                TypeKind::Map(MapInfo {
                    value: V::slot_type,
                    value_nullable: V::NULLABLE,
                    builder: map_builder::<Self, V>,
                }),
            )
        })
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Mapping(Box::new(self.0.iter().map(|(k, v)| (k.as_str(), v.get()))))
    }
}

impl_slot!([V: Slot] PairList<V>);

// --- Any ---

/// A dynamically typed value. Encodes as whatever it holds; decodes into a
/// type inferred from the wire tag unless the enclosing field has a type
/// selector.
pub struct AnyValue {
    inner: Box<dyn Reflect>,
}

impl AnyValue {
    pub fn new<T: Reflect>(value: T) -> Self {
        AnyValue {
            inner: Box::new(value),
        }
    }

    pub fn from_boxed(inner: Box<dyn Reflect>) -> Self {
        AnyValue { inner }
    }

    pub fn inner_type(&self) -> &'static Type {
        self.inner.value_type()
    }

    pub fn inner(&self) -> &dyn Reflect {
        self.inner.as_ref()
    }

    pub fn downcast_ref<T: Reflect>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    pub fn into_inner<T: Reflect>(self) -> Result<T> {
        types::downcast(self.inner)
    }

    /// The held value, provided it is of type `ty`.
    pub fn retrieve(&self, ty: &'static Type) -> Result<&dyn Reflect> {
        let held = self.inner.value_type();
        if held != ty {
            return Err(ObjectDecodeError::TypeSelectorMismatch {
                selected: ty.name,
                held: held.name,
            }
            .into());
        }
        Ok(self.inner.as_ref())
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyValue")
            .field("type", &self.inner.value_type().name)
            .finish_non_exhaustive()
    }
}

impl Reflect for AnyValue {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| Type::new::<Self>(ClassId::ANY, TypeKind::Any))
    }

    reflect_common!();

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Any(self.inner.as_ref())
    }
}

impl_slot!(AnyValue);

/// Type the decoder materializes for an `AnyValue` target, by wire tag.
pub(crate) fn any_type_for_tag(tag: u8) -> Option<&'static Type> {
    let ty = match tag {
        TAG_STRING => String::type_of(),
        TAG_INT32 => i32::type_of(),
        TAG_INT64 => i64::type_of(),
        TAG_TIMESTAMP => u64::type_of(),
        TAG_DOUBLE => f64::type_of(),
        TAG_BOOLEAN => bool::type_of(),
        TAG_DATE_TIME => DateTime::type_of(),
        TAG_OBJECT_ID => ObjectId::type_of(),
        TAG_DOCUMENT | TAG_DOCUMENT_ROOT => PairList::<Option<AnyValue>>::type_of(),
        TAG_ARRAY => Vec::<Option<AnyValue>>::type_of(),
        _ => return None,
    };
    Some(ty)
}

// --- ObjectId ---

/// 12 opaque bytes: 4-byte big-endian seconds, 5 process-random bytes and a
/// 3-byte big-endian counter when generated by [`ObjectId::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId(pub [u8; 12]);

impl ObjectId {
    pub fn new() -> Self {
        static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
        static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

        let process = PROCESS_UNIQUE.get_or_init(|| {
            let mut bytes = [0u8; 5];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes
        });
        let counter = COUNTER
            .get_or_init(|| AtomicU32::new(rand::thread_rng().next_u32()))
            .fetch_add(1, Ordering::Relaxed);
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        ObjectId(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Seconds since the epoch encoded in the first four bytes.
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = BsonError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s)
            .map_err(|e| BsonError::Decode(format!("Invalid ObjectId hex {:?}: {}", s, e)))?;
        let bytes: [u8; 12] = raw.try_into().map_err(|raw: Vec<u8>| {
            BsonError::Decode(format!("ObjectId must be 12 bytes, got {}", raw.len()))
        })?;
        Ok(ObjectId(bytes))
    }
}

impl Reflect for ObjectId {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| Type::new::<Self>(ClassId::OBJECT_ID, TypeKind::Scalar))
    }

    reflect_common!();
}

impl_slot!(ObjectId);

// --- DateTime ---

/// UTC instant as signed milliseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DateTime(pub i64);

impl DateTime {
    pub const fn from_millis(millis: i64) -> Self {
        DateTime(millis)
    }

    pub fn now() -> Self {
        let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => -(e.duration().as_millis() as i64),
        };
        DateTime(millis)
    }

    pub const fn timestamp_millis(&self) -> i64 {
        self.0
    }
}

impl Reflect for DateTime {
    fn type_of() -> &'static Type {
        resolve_type::<Self>(|| Type::new::<Self>(ClassId::DATE_TIME, TypeKind::Scalar))
    }

    reflect_common!();
}

impl_slot!(DateTime);

// --- Inline blobs ---

/// A pre-encoded BSON document embedded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineDocument(pub Bytes);

/// A pre-encoded BSON array embedded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineArray(pub Bytes);

macro_rules! inline_blob {
    ($ty:ident, $class:ident) => {
        impl $ty {
            pub fn new(bytes: impl Into<Bytes>) -> Self {
                $ty(bytes.into())
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                $ty(Bytes::from_static(&[5, 0, 0, 0, 0]))
            }
        }

        impl Reflect for $ty {
            fn type_of() -> &'static Type {
                resolve_type::<Self>(|| Type::new::<Self>(ClassId::$class, TypeKind::Scalar))
            }

            reflect_common!();
        }

        impl_slot!($ty);
    };
}

inline_blob!(InlineDocument, INLINE_DOCUMENT);
inline_blob!(InlineArray, INLINE_ARRAY);

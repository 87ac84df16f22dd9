//! Runtime type descriptions and the reflection traits the serializer and
//! deserializer walk.
//!
//! Every host value implements [`Reflect`]; every position a value can be
//! stored in (a struct field, a collection element, a map value) is a
//! [`Slot`], either `T` or `Option<T>`. Each Rust type is described once by
//! an interned [`Type`], whose [`ClassId`] selects the handler in the
//! dispatch tables.

use crate::*;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Dense classification id used to index the dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId {
    pub id: u32,
    pub name: &'static str,
}

macro_rules! builtin_classes {
    ($($ident:ident = $id:expr, $name:expr;)*) => {
        impl ClassId {
            $(pub const $ident: ClassId = ClassId { id: $id, name: $name };)*
        }
        const BUILTIN_CLASS_COUNT: u32 = [$($id),*].len() as u32;
    };
}

builtin_classes! {
    STRING = 0, "String";
    INT8 = 1, "Int8";
    UINT8 = 2, "UInt8";
    INT16 = 3, "Int16";
    UINT16 = 4, "UInt16";
    INT32 = 5, "Int32";
    UINT32 = 6, "UInt32";
    INT64 = 7, "Int64";
    UINT64 = 8, "UInt64";
    FLOAT32 = 9, "Float32";
    FLOAT64 = 10, "Float64";
    BOOLEAN = 11, "Boolean";
    ANY = 12, "Any";
    ENUM = 13, "Enum";
    OBJECT = 14, "Object";
    VECTOR = 15, "Vector";
    LIST = 16, "List";
    UNORDERED_SET = 17, "UnorderedSet";
    PAIR_LIST = 18, "PairList";
    UNORDERED_MAP = 19, "UnorderedMap";
    INLINE_DOCUMENT = 20, "InlineDocument";
    INLINE_ARRAY = 21, "InlineArray";
    OBJECT_ID = 22, "ObjectId";
    DATE_TIME = 23, "DateTime";
}

static NEXT_CLASS_ID: AtomicU32 = AtomicU32::new(BUILTIN_CLASS_COUNT);

impl ClassId {
    /// Hands out a fresh id for a host-defined type family.
    pub fn allocate(name: &'static str) -> ClassId {
        let id = NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed);
        ClassId { id, name }
    }

    /// Number of ids handed out so far, builtins included.
    pub fn count() -> u32 {
        NEXT_CLASS_ID.load(Ordering::Relaxed)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Runtime description of one Rust type.
pub struct Type {
    pub class_id: ClassId,
    pub name: &'static str,
    rust_type: TypeId,
    pub kind: TypeKind,
    pub interpretations: Vec<Interpretation>,
}

impl Type {
    pub fn new<T: 'static>(class_id: ClassId, kind: TypeKind) -> Type {
        Type {
            class_id,
            name: std::any::type_name::<T>(),
            rust_type: TypeId::of::<T>(),
            kind,
            interpretations: Vec::new(),
        }
    }

    pub fn with_interpretation(mut self, interpretation: Interpretation) -> Type {
        self.interpretations.push(interpretation);
        self
    }

    /// First interpretation whose name appears in `enabled`, in the order of `enabled`.
    pub fn find_interpretation(&self, enabled: &[String]) -> Option<&Interpretation> {
        enabled.iter().find_map(|name| {
            self.interpretations
                .iter()
                .find(|interpretation| interpretation.name == name.as_str())
        })
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.rust_type == TypeId::of::<T>()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.rust_type == other.rust_type
    }
}

impl Eq for Type {}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Type")
            .field("class_id", &self.class_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Kind-specific metadata the handlers need beyond the class id.
pub enum TypeKind {
    Scalar,
    Any,
    Enum(EnumInfo),
    Object(ObjectInfo),
    Collection(CollectionInfo),
    Map(MapInfo),
}

/// Enum interpretation hook: conversion to and from the underlying representation.
pub struct EnumInfo {
    /// Null values are a constraint violation.
    pub not_null: bool,
    pub repr: fn() -> &'static Type,
    pub to_repr: fn(&dyn Reflect) -> Result<Box<dyn Reflect>>,
    pub from_repr: fn(Box<dyn Reflect>) -> Result<Box<dyn Reflect>>,
}

pub struct ObjectInfo {
    /// Declared fields, in encoding order.
    pub fields: Vec<Field>,
    /// Builds a default instance for the decoder to populate.
    pub create: fn() -> Box<dyn Reflect>,
}

/// Picks the concrete type of an `AnyValue` field from the enclosing object.
pub type TypeSelector = fn(&dyn Reflect) -> Result<&'static Type>;

pub struct Field {
    pub name: &'static str,
    pub ty: fn() -> &'static Type,
    pub nullable: bool,
    pub type_selector: Option<TypeSelector>,
}

impl Field {
    pub fn field_type(&self) -> &'static Type {
        (self.ty)()
    }
}

pub struct CollectionInfo {
    pub item: fn() -> &'static Type,
    pub item_nullable: bool,
    pub builder: fn() -> Box<dyn CollectionBuilder>,
}

/// Maps always have string keys.
pub struct MapInfo {
    pub value: fn() -> &'static Type,
    pub value_nullable: bool,
    pub builder: fn() -> Box<dyn MapBuilder>,
}

/// Alternate representation for a type without a handler of its own.
pub struct Interpretation {
    pub name: &'static str,
    pub target: fn() -> &'static Type,
    pub to: fn(&dyn Reflect) -> Result<Box<dyn Reflect>>,
    pub from: fn(Box<dyn Reflect>) -> Result<Box<dyn Reflect>>,
}

// --- Registry ---

static REGISTRY: OnceLock<RwLock<HashMap<TypeId, &'static Type>>> = OnceLock::new();

/// Returns the interned description of `T`, building it on first use.
///
/// `build` runs outside the registry lock, so it may not assume it runs only
/// once; the first description to be stored wins.
pub fn resolve_type<T: 'static>(build: impl FnOnce() -> Type) -> &'static Type {
    let registry = REGISTRY.get_or_init(Default::default);
    let key = TypeId::of::<T>();
    if let Some(ty) = registry.read().get(&key).copied() {
        return ty;
    }
    let ty = build();
    *registry
        .write()
        .entry(key)
        .or_insert_with(|| &*Box::leak(Box::new(ty)))
}

// --- Reflection traits ---

/// A host value the engine can introspect.
pub trait Reflect: Any {
    fn type_of() -> &'static Type
    where
        Self: Sized;

    /// The runtime type of this value.
    fn value_type(&self) -> &'static Type;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn reflect_ref(&self) -> ReflectRef<'_> {
        ReflectRef::Scalar
    }

    fn as_object_mut(&mut self) -> Option<&mut dyn Object> {
        None
    }
}

/// Structural view of a value, as seen by the encoder.
pub enum ReflectRef<'a> {
    Scalar,
    Any(&'a dyn Reflect),
    Sequence(Box<dyn Iterator<Item = Option<&'a dyn Reflect>> + 'a>),
    Mapping(Box<dyn Iterator<Item = (&'a str, Option<&'a dyn Reflect>)> + 'a>),
    Object(&'a dyn Object),
}

/// Indexed field access over [`ObjectInfo::fields`].
pub trait Object: Reflect {
    fn field(&self, index: usize) -> Option<&dyn Reflect>;

    fn set_field(&mut self, index: usize, value: Option<Box<dyn Reflect>>) -> Result<()>;
}

/// A storage position: `T` for required values, `Option<T>` for nullable ones.
pub trait Slot: Sized + 'static {
    const NULLABLE: bool;

    fn slot_type() -> &'static Type;

    fn get(&self) -> Option<&dyn Reflect>;

    fn from_reflect(value: Option<Box<dyn Reflect>>) -> Result<Self>;
}

impl<T: Reflect> Slot for Option<T> {
    const NULLABLE: bool = true;

    fn slot_type() -> &'static Type {
        T::type_of()
    }

    fn get(&self) -> Option<&dyn Reflect> {
        self.as_ref().map(|value| value as &dyn Reflect)
    }

    fn from_reflect(value: Option<Box<dyn Reflect>>) -> Result<Self> {
        value.map(downcast::<T>).transpose()
    }
}

/// Implements [`Slot`] for a non-nullable [`Reflect`] type.
///
/// Generic impls list their parameters in brackets:
/// `impl_slot!([T: Slot] Vec<T>)`.
#[macro_export]
macro_rules! impl_slot {
    ([$($generics:tt)*] $ty:ty) => {
        impl<$($generics)*> $crate::Slot for $ty {
            const NULLABLE: bool = false;

            fn slot_type() -> &'static $crate::Type {
                <Self as $crate::Reflect>::type_of()
            }

            fn get(&self) -> ::std::option::Option<&dyn $crate::Reflect> {
                ::std::option::Option::Some(self)
            }

            fn from_reflect(
                value: ::std::option::Option<::std::boxed::Box<dyn $crate::Reflect>>,
            ) -> $crate::Result<Self> {
                $crate::types::required::<Self>(value)
            }
        }
    };
    ($ty:ty) => {
        $crate::impl_slot!([] $ty);
    };
}

// --- Downcasting helpers ---

pub fn downcast<T: Reflect>(value: Box<dyn Reflect>) -> Result<T> {
    let found = value.value_type().name;
    value
        .into_any()
        .downcast::<T>()
        .map(|value| *value)
        .map_err(|_| BsonError::Downcast {
            expected: std::any::type_name::<T>(),
            found,
        })
}

pub fn downcast_ref<T: Reflect>(value: &dyn Reflect) -> Result<&T> {
    value
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| BsonError::Downcast {
            expected: std::any::type_name::<T>(),
            found: value.value_type().name,
        })
}

/// Unwraps a decoded value destined for a non-nullable slot.
pub fn required<T: Reflect>(value: Option<Box<dyn Reflect>>) -> Result<T> {
    match value {
        Some(value) => downcast(value),
        None => Err(BsonError::NullValue(std::any::type_name::<T>())),
    }
}

/// Enum hook helper: the value handed to `to_repr` must be the enum itself.
pub fn enum_value<T: Reflect>(value: &dyn Reflect) -> Result<&T> {
    value.as_any().downcast_ref::<T>().ok_or_else(|| {
        EnumInterpreterError::TypeMismatchEnum {
            enum_name: std::any::type_name::<T>(),
            found: value.value_type().name,
        }
        .into()
    })
}

/// Enum hook helper: the value handed to `from_repr` must be the representation type.
pub fn enum_repr<R: Reflect>(enum_name: &'static str, value: Box<dyn Reflect>) -> Result<R> {
    let found = value.value_type().name;
    value
        .into_any()
        .downcast::<R>()
        .map(|value| *value)
        .map_err(|_| {
            EnumInterpreterError::TypeMismatchEnumValue {
                enum_name,
                expected: std::any::type_name::<R>(),
                found,
            }
            .into()
        })
}

// --- Polymorph ---

/// A value paired with the type used to dispatch it. Null values keep their
/// type so they still reach the right handler.
#[derive(Clone, Copy)]
pub struct Polymorph<'a> {
    pub ty: &'static Type,
    pub value: Option<&'a dyn Reflect>,
}

impl<'a> Polymorph<'a> {
    pub fn new(ty: &'static Type, value: Option<&'a dyn Reflect>) -> Self {
        Polymorph { ty, value }
    }

    /// Dispatches on the runtime type of `value`.
    pub fn of(value: &'a dyn Reflect) -> Self {
        Polymorph {
            ty: value.value_type(),
            value: Some(value),
        }
    }

    pub fn null(ty: &'static Type) -> Self {
        Polymorph { ty, value: None }
    }

    pub fn from_slot<T: Slot>(slot: &'a T) -> Self {
        Polymorph {
            ty: T::slot_type(),
            value: slot.get(),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&'a dyn Reflect> {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

impl fmt::Debug for Polymorph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Polymorph")
            .field("ty", &self.ty.name)
            .field("null", &self.value.is_none())
            .finish()
    }
}

// --- Builders used by the decoder ---

pub trait CollectionBuilder {
    fn push(&mut self, item: Option<Box<dyn Reflect>>) -> Result<()>;

    fn finish(self: Box<Self>) -> Box<dyn Reflect>;
}

pub trait MapBuilder {
    fn insert(&mut self, key: String, value: Option<Box<dyn Reflect>>) -> Result<()>;

    fn finish(self: Box<Self>) -> Box<dyn Reflect>;
}

/// Collects items of slot type `T` into any extendable container `C`.
pub struct SeqBuilder<C, T> {
    items: C,
    _slot: std::marker::PhantomData<fn() -> T>,
}

impl<C, T> CollectionBuilder for SeqBuilder<C, T>
where
    C: Extend<T> + Reflect,
    T: Slot,
{
    fn push(&mut self, item: Option<Box<dyn Reflect>>) -> Result<()> {
        self.items.extend(Some(T::from_reflect(item)?));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Box<dyn Reflect> {
        Box::new(self.items)
    }
}

pub fn seq_builder<C, T>() -> Box<dyn CollectionBuilder>
where
    C: Extend<T> + Default + Reflect,
    T: Slot,
{
    Box::new(SeqBuilder::<C, T> {
        items: C::default(),
        _slot: std::marker::PhantomData,
    })
}

/// Collects `(String, V)` entries into any extendable container `C`.
pub struct MapCollector<C, V> {
    entries: C,
    _slot: std::marker::PhantomData<fn() -> V>,
}

impl<C, V> MapBuilder for MapCollector<C, V>
where
    C: Extend<(String, V)> + Reflect,
    V: Slot,
{
    fn insert(&mut self, key: String, value: Option<Box<dyn Reflect>>) -> Result<()> {
        self.entries.extend(Some((key, V::from_reflect(value)?)));
        Ok(())
    }

    fn finish(self: Box<Self>) -> Box<dyn Reflect> {
        Box::new(self.entries)
    }
}

pub fn map_builder<C, V>() -> Box<dyn MapBuilder>
where
    C: Extend<(String, V)> + Default + Reflect,
    V: Slot,
{
    Box::new(MapCollector::<C, V> {
        entries: C::default(),
        _slot: std::marker::PhantomData,
    })
}

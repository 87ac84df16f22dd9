#[cfg(any(feature = "indexmap", feature = "chrono"))]
use crate::*;

// --- indexmap ---
#[cfg(feature = "indexmap")]
mod indexmap_support {
    use crate::impl_slot;
    use crate::types::{map_builder, seq_builder};
    use crate::*;
    use indexmap::{IndexMap, IndexSet};
    use std::any::Any;
    use std::hash::Hash;

    /// Encoded in insertion order, like [`PairList`] but with unique keys.
    impl<V: Slot> Reflect for IndexMap<String, V> {
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

        fn value_type(&self) -> &'static Type {
            Self::type_of()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }

        fn reflect_ref(&self) -> ReflectRef<'_> {
            ReflectRef::Mapping(Box::new(self.iter().map(|(k, v)| (k.as_str(), v.get()))))
        }
    }

    impl_slot!([V: Slot] IndexMap<String, V>);

    impl<T: Slot + Eq + Hash> Reflect for IndexSet<T> {
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

        fn value_type(&self) -> &'static Type {
            Self::type_of()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn into_any(self: Box<Self>) -> Box<dyn Any> {
            self
        }

        fn reflect_ref(&self) -> ReflectRef<'_> {
            ReflectRef::Sequence(Box::new(self.iter().map(Slot::get)))
        }
    }

    impl_slot!([T: Slot + Eq + Hash] IndexSet<T>);
}

// --- chrono ---
#[cfg(feature = "chrono")]
impl From<chrono::DateTime<chrono::Utc>> for DateTime {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DateTime(value.timestamp_millis())
    }
}

/// Fails for instants outside chrono's representable range.
#[cfg(feature = "chrono")]
impl TryFrom<DateTime> for chrono::DateTime<chrono::Utc> {
    type Error = BsonError;

    fn try_from(value: DateTime) -> Result<Self> {
        chrono::DateTime::from_timestamp_millis(value.0).ok_or_else(|| {
            BsonError::Decode(format!("DateTime {} ms is out of range for chrono", value.0))
        })
    }
}

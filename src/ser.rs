//! The encoding half of the engine.
//!
//! [`Serializer`] owns a table of [`SerializerMethod`]s indexed by
//! [`ClassId::id`]. Every value is dispatched through that table; nested
//! documents and arrays are first written into a scratch buffer so that
//! their length prefix can be emitted ahead of the elements.

use crate::core::*;
use crate::values::Primitive;
use crate::*;
use tracing::debug;

/// Writes `value` under `key` (or as the document root when `key` is `None`).
pub type SerializerMethod =
    fn(&Serializer, &mut BytesMut, Option<&str>, Polymorph<'_>) -> Result<()>;

pub struct Serializer {
    config: SerializerConfig,
    methods: Vec<Option<SerializerMethod>>,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(SerializerConfig::default())
    }
}

impl Serializer {
    /// Creates a serializer with every builtin handler registered.
    pub fn new(config: SerializerConfig) -> Self {
        let mut serializer = Serializer {
            config,
            methods: Vec::with_capacity(ClassId::count() as usize),
        };

        serializer.set_serializer_method(ClassId::STRING, serialize_string);
        serializer.set_serializer_method(ClassId::ANY, serialize_any);

        serializer.set_serializer_method(ClassId::INT8, serialize_primitive::<i8>);
        serializer.set_serializer_method(ClassId::UINT8, serialize_primitive::<u8>);
        serializer.set_serializer_method(ClassId::INT16, serialize_primitive::<i16>);
        serializer.set_serializer_method(ClassId::UINT16, serialize_primitive::<u16>);
        serializer.set_serializer_method(ClassId::INT32, serialize_primitive::<i32>);
        serializer.set_serializer_method(ClassId::UINT32, serialize_primitive::<u32>);
        serializer.set_serializer_method(ClassId::INT64, serialize_primitive::<i64>);
        serializer.set_serializer_method(ClassId::UINT64, serialize_primitive::<u64>);
        serializer.set_serializer_method(ClassId::FLOAT32, serialize_primitive::<f32>);
        serializer.set_serializer_method(ClassId::FLOAT64, serialize_primitive::<f64>);
        serializer.set_serializer_method(ClassId::BOOLEAN, serialize_primitive::<bool>);

        serializer.set_serializer_method(ClassId::ENUM, serialize_enum);
        serializer.set_serializer_method(ClassId::OBJECT, serialize_object);

        serializer.set_serializer_method(ClassId::VECTOR, serialize_collection);
        serializer.set_serializer_method(ClassId::LIST, serialize_collection);
        serializer.set_serializer_method(ClassId::UNORDERED_SET, serialize_collection);

        serializer.set_serializer_method(ClassId::PAIR_LIST, serialize_map);
        serializer.set_serializer_method(ClassId::UNORDERED_MAP, serialize_map);

        serializer.set_serializer_method(ClassId::INLINE_DOCUMENT, serialize_inline_document);
        serializer.set_serializer_method(ClassId::INLINE_ARRAY, serialize_inline_array);
        serializer.set_serializer_method(ClassId::OBJECT_ID, serialize_object_id);
        serializer.set_serializer_method(ClassId::DATE_TIME, serialize_date_time);

        serializer
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Installs `method` for `class`, replacing any previous handler.
    pub fn set_serializer_method(&mut self, class: ClassId, method: SerializerMethod) {
        let index = class.id as usize;
        if index >= self.methods.len() {
            self.methods.resize(index + 1, None);
        }
        if self.methods[index].is_some() {
            debug!(class = %class, "replacing serializer method");
        }
        self.methods[index] = Some(method);
    }

    fn method(&self, class: ClassId) -> Option<SerializerMethod> {
        self.methods.get(class.id as usize).copied().flatten()
    }

    /// Encodes `value` as the document root: no tag and no key.
    pub fn serialize_to_stream(&self, out: &mut BytesMut, value: Polymorph<'_>) -> Result<()> {
        self.serialize(out, None, value)
    }

    /// Encodes one element, or the document root when `key` is `None`.
    pub fn serialize(&self, out: &mut BytesMut, key: Option<&str>, value: Polymorph<'_>) -> Result<()> {
        self.serialize_interpreted(out, key, value, 0)
    }

    fn serialize_interpreted(
        &self,
        out: &mut BytesMut,
        key: Option<&str>,
        value: Polymorph<'_>,
        hops: usize,
    ) -> Result<()> {
        if let Some(method) = self.method(value.ty.class_id) {
            return method(self, out, key, value);
        }

        let Some(interpretation) = value.ty.find_interpretation(&self.config.enable_interpretations)
        else {
            return Err(BsonError::UnsupportedType {
                class: value.ty.class_id.name,
                type_name: value.ty.name,
            });
        };
        if hops >= self.config.max_interpretation_depth {
            return Err(BsonError::InterpretationDepth(
                value.ty.name,
                self.config.max_interpretation_depth,
            ));
        }
        debug!(
            from = value.ty.name,
            interpretation = interpretation.name,
            "serializing through interpretation"
        );

        let target = (interpretation.target)();
        match value.get() {
            Some(v) => {
                let interpreted = (interpretation.to)(v)?;
                self.serialize_interpreted(
                    out,
                    key,
                    Polymorph::new(target, Some(interpreted.as_ref())),
                    hops + 1,
                )
            }
            None => self.serialize_interpreted(out, key, Polymorph::null(target), hops + 1),
        }
    }
}

// --- Handlers ---

/// A null value needs a key; a null document root cannot be represented.
fn serialize_null(out: &mut BytesMut, key: Option<&str>) -> Result<()> {
    match key {
        Some(_) => write_key(out, TAG_NULL, key),
        None => Err(BsonError::NullRoot),
    }
}

fn serialize_string(
    _: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let s = types::downcast_ref::<String>(v)?;
    write_key(out, TAG_STRING, key)?;
    write_string(out, s)
}

fn serialize_primitive<T: Primitive>(
    _: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let v = *types::downcast_ref::<T>(v)?;
    write_key(out, T::TAG, key)?;
    v.write_wire(out);
    Ok(())
}

fn serialize_any(
    serializer: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    match v.reflect_ref() {
        ReflectRef::Any(inner) => serializer.serialize(out, key, Polymorph::of(inner)),
        _ => Err(BsonError::Encode(format!(
            "{} is registered as Any but does not expose an inner value",
            value.ty.name
        ))),
    }
}

fn serialize_enum(
    serializer: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let TypeKind::Enum(info) = &value.ty.kind else {
        return Err(BsonError::Encode(format!(
            "{} is registered as Enum without enum metadata",
            value.ty.name
        )));
    };
    let Some(v) = value.get() else {
        if info.not_null {
            return Err(EnumInterpreterError::ConstraintNotNull {
                enum_name: value.ty.name,
            }
            .into());
        }
        return serialize_null(out, key);
    };
    let repr = (info.to_repr)(v)?;
    serializer.serialize(out, key, Polymorph::new((info.repr)(), Some(repr.as_ref())))
}

fn serialize_collection(
    serializer: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let (TypeKind::Collection(info), ReflectRef::Sequence(items)) = (&value.ty.kind, v.reflect_ref())
    else {
        return Err(BsonError::Encode(format!(
            "{} is registered as a collection but is not iterable",
            value.ty.name
        )));
    };
    let item_type = (info.item)();

    write_key(out, TAG_ARRAY, key)?;

    let mut scratch = BytesMut::new();
    let mut index = 0usize;
    for item in items {
        if item.is_some() || serializer.config.include_null_fields {
            let item_key = index.to_string();
            serializer.serialize(&mut scratch, Some(&item_key), Polymorph::new(item_type, item))?;
            index += 1;
        }
    }
    write_framed(out, &scratch)
}

fn serialize_map(
    serializer: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let (TypeKind::Map(info), ReflectRef::Mapping(entries)) = (&value.ty.kind, v.reflect_ref()) else {
        return Err(BsonError::Encode(format!(
            "{} is registered as a map but has no entries view",
            value.ty.name
        )));
    };
    let value_type = (info.value)();

    write_key(out, TAG_DOCUMENT, key)?;

    let mut scratch = BytesMut::new();
    for (entry_key, entry) in entries {
        if entry.is_some() || serializer.config.include_null_fields {
            serializer.serialize(&mut scratch, Some(entry_key), Polymorph::new(value_type, entry))?;
        }
    }
    write_framed(out, &scratch)
}

fn serialize_object(
    serializer: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let (TypeKind::Object(info), ReflectRef::Object(object)) = (&value.ty.kind, v.reflect_ref()) else {
        return Err(BsonError::Encode(format!(
            "{} is registered as an object but exposes no fields",
            value.ty.name
        )));
    };

    write_key(out, TAG_DOCUMENT, key)?;

    let mut scratch = BytesMut::new();
    for (index, field) in info.fields.iter().enumerate() {
        let field_type = field.field_type();
        let mut field_value = Polymorph::new(field_type, object.field(index));

        if let (Some(selector), Some(current)) = (field.type_selector, field_value.get()) {
            if field_type.class_id == ClassId::ANY {
                let selected = selector(v)?;
                let any = types::downcast_ref::<AnyValue>(current)?;
                field_value = Polymorph::new(selected, Some(any.retrieve(selected)?));
            }
        }

        if field_value.get().is_some() || serializer.config.include_null_fields {
            serializer.serialize(&mut scratch, Some(field.name), field_value)?;
        }
    }
    write_framed(out, &scratch)
}

fn serialize_object_id(
    _: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let id = types::downcast_ref::<ObjectId>(v)?;
    write_key(out, TAG_OBJECT_ID, key)?;
    out.put_slice(&id.0);
    Ok(())
}

fn serialize_date_time(
    _: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let date_time = types::downcast_ref::<DateTime>(v)?;
    write_key(out, TAG_DATE_TIME, key)?;
    write_i64_le(out, date_time.0);
    Ok(())
}

fn serialize_inline(out: &mut BytesMut, tag: u8, key: Option<&str>, raw: &[u8], kind: &'static str) -> Result<()> {
    validate_framed(raw, kind)?;
    write_key(out, tag, key)?;
    out.put_slice(raw);
    Ok(())
}

fn serialize_inline_document(
    _: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let document = types::downcast_ref::<InlineDocument>(v)?;
    serialize_inline(out, TAG_DOCUMENT, key, &document.0, "document")
}

fn serialize_inline_array(
    _: &Serializer,
    out: &mut BytesMut,
    key: Option<&str>,
    value: Polymorph<'_>,
) -> Result<()> {
    let Some(v) = value.get() else {
        return serialize_null(out, key);
    };
    let array = types::downcast_ref::<InlineArray>(v)?;
    serialize_inline(out, TAG_ARRAY, key, &array.0, "array")
}

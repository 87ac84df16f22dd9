//! The decoding half of the engine.
//!
//! [`Deserializer`] mirrors [`Serializer`](crate::Serializer): a table of
//! [`DeserializerMethod`]s indexed by [`ClassId::id`], driven by the target
//! [`Type`] and the wire tag of the element being read.

use crate::core::*;
use crate::values::{any_type_for_tag, Primitive};
use crate::*;
use tracing::{debug, trace};

/// Reads one value of type `ty` whose element tag is `tag`
/// (`TAG_DOCUMENT_ROOT` at the top of a buffer). `Ok(None)` is a null.
pub type DeserializerMethod =
    fn(&Deserializer, &mut Bytes, &'static Type, u8) -> Result<Option<Box<dyn Reflect>>>;

pub struct Deserializer {
    config: DeserializerConfig,
    methods: Vec<Option<DeserializerMethod>>,
}

impl Default for Deserializer {
    fn default() -> Self {
        Self::new(DeserializerConfig::default())
    }
}

impl Deserializer {
    /// Creates a deserializer with every builtin handler registered.
    pub fn new(config: DeserializerConfig) -> Self {
        let mut deserializer = Deserializer {
            config,
            methods: Vec::with_capacity(ClassId::count() as usize),
        };

        deserializer.set_deserializer_method(ClassId::STRING, deserialize_string);
        deserializer.set_deserializer_method(ClassId::ANY, deserialize_any);

        deserializer.set_deserializer_method(ClassId::INT8, deserialize_primitive::<i8>);
        deserializer.set_deserializer_method(ClassId::UINT8, deserialize_primitive::<u8>);
        deserializer.set_deserializer_method(ClassId::INT16, deserialize_primitive::<i16>);
        deserializer.set_deserializer_method(ClassId::UINT16, deserialize_primitive::<u16>);
        deserializer.set_deserializer_method(ClassId::INT32, deserialize_primitive::<i32>);
        deserializer.set_deserializer_method(ClassId::UINT32, deserialize_primitive::<u32>);
        deserializer.set_deserializer_method(ClassId::INT64, deserialize_primitive::<i64>);
        deserializer.set_deserializer_method(ClassId::UINT64, deserialize_primitive::<u64>);
        deserializer.set_deserializer_method(ClassId::FLOAT32, deserialize_primitive::<f32>);
        deserializer.set_deserializer_method(ClassId::FLOAT64, deserialize_primitive::<f64>);
        deserializer.set_deserializer_method(ClassId::BOOLEAN, deserialize_primitive::<bool>);

        deserializer.set_deserializer_method(ClassId::ENUM, deserialize_enum);
        deserializer.set_deserializer_method(ClassId::OBJECT, deserialize_object);

        deserializer.set_deserializer_method(ClassId::VECTOR, deserialize_collection);
        deserializer.set_deserializer_method(ClassId::LIST, deserialize_collection);
        deserializer.set_deserializer_method(ClassId::UNORDERED_SET, deserialize_collection);

        deserializer.set_deserializer_method(ClassId::PAIR_LIST, deserialize_map);
        deserializer.set_deserializer_method(ClassId::UNORDERED_MAP, deserialize_map);

        deserializer.set_deserializer_method(ClassId::INLINE_DOCUMENT, deserialize_inline_document);
        deserializer.set_deserializer_method(ClassId::INLINE_ARRAY, deserialize_inline_array);
        deserializer.set_deserializer_method(ClassId::OBJECT_ID, deserialize_object_id);
        deserializer.set_deserializer_method(ClassId::DATE_TIME, deserialize_date_time);

        deserializer
    }

    pub fn config(&self) -> &DeserializerConfig {
        &self.config
    }

    /// Installs `method` for `class`, replacing any previous handler.
    pub fn set_deserializer_method(&mut self, class: ClassId, method: DeserializerMethod) {
        let index = class.id as usize;
        if index >= self.methods.len() {
            self.methods.resize(index + 1, None);
        }
        if self.methods[index].is_some() {
            debug!(class = %class, "replacing deserializer method");
        }
        self.methods[index] = Some(method);
    }

    fn method(&self, class: ClassId) -> Option<DeserializerMethod> {
        self.methods.get(class.id as usize).copied().flatten()
    }

    /// Decodes one value of type `ty`. Null and undefined elements yield
    /// `Ok(None)`, except for enums declared `not_null`.
    pub fn deserialize(
        &self,
        reader: &mut Bytes,
        ty: &'static Type,
        tag: u8,
    ) -> Result<Option<Box<dyn Reflect>>> {
        self.deserialize_interpreted(reader, ty, tag, 0)
    }

    fn deserialize_interpreted(
        &self,
        reader: &mut Bytes,
        ty: &'static Type,
        tag: u8,
        hops: usize,
    ) -> Result<Option<Box<dyn Reflect>>> {
        if tag == TAG_NULL || tag == TAG_UNDEFINED {
            if let TypeKind::Enum(EnumInfo { not_null: true, .. }) = &ty.kind {
                return Err(EnumInterpreterError::ConstraintNotNull { enum_name: ty.name }.into());
            }
            return Ok(None);
        }
        if let Some(method) = self.method(ty.class_id) {
            return method(self, reader, ty, tag);
        }

        let Some(interpretation) = ty.find_interpretation(&self.config.enable_interpretations) else {
            return Err(BsonError::UnsupportedType {
                class: ty.class_id.name,
                type_name: ty.name,
            });
        };
        if hops >= self.config.max_interpretation_depth {
            return Err(BsonError::InterpretationDepth(
                ty.name,
                self.config.max_interpretation_depth,
            ));
        }
        debug!(
            to = ty.name,
            interpretation = interpretation.name,
            "deserializing through interpretation"
        );

        let target = (interpretation.target)();
        match self.deserialize_interpreted(reader, target, tag, hops + 1)? {
            Some(value) => (interpretation.from)(value).map(Some),
            None => Ok(None),
        }
    }

    /// Decodes a value destined for a slot, applying the mismatch policy.
    ///
    /// The outer `None` means the value was consumed and dropped under
    /// [`MismatchPolicy::Skip`].
    fn deserialize_slot(
        &self,
        reader: &mut Bytes,
        ty: &'static Type,
        tag: u8,
    ) -> Result<Option<Option<Box<dyn Reflect>>>> {
        let mut probe = reader.clone();
        match self.deserialize(&mut probe, ty, tag) {
            Ok(value) => {
                *reader = probe;
                Ok(Some(value))
            }
            Err(BsonError::TypeMismatch { expected, found })
                if self.config.on_type_mismatch == MismatchPolicy::Skip =>
            {
                trace!(expected, found, "skipping mismatched value");
                skip_value(reader, tag)?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Null in a non-nullable collection item or map value.
    fn null_item(&self, ty: &'static Type) -> Result<()> {
        match self.config.on_type_mismatch {
            MismatchPolicy::Skip => Ok(()),
            MismatchPolicy::Error => Err(BsonError::NullValue(ty.name)),
        }
    }
}

fn mismatch(ty: &'static Type, tag: u8) -> BsonError {
    BsonError::TypeMismatch {
        expected: ty.name,
        found: tag_name(tag),
    }
}

fn expect_tag(ty: &'static Type, tag: u8, expected: u8) -> Result<()> {
    if tag == expected {
        Ok(())
    } else {
        Err(mismatch(ty, tag))
    }
}

/// Like [`expect_tag`] for framed values, which may also stand at the document root.
fn expect_framed(ty: &'static Type, tag: u8, expected: u8) -> Result<()> {
    if tag == TAG_DOCUMENT_ROOT {
        Ok(())
    } else {
        expect_tag(ty, tag, expected)
    }
}

// --- Handlers ---

fn deserialize_string(
    _: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    expect_tag(ty, tag, TAG_STRING)?;
    Ok(Some(Box::new(read_string(reader)?)))
}

fn deserialize_primitive<T: Primitive>(
    _: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    match read_scalar(reader, tag)?.and_then(T::from_wire) {
        Some(value) => Ok(Some(Box::new(value))),
        None => Err(mismatch(ty, tag)),
    }
}

fn deserialize_any(
    deserializer: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    let inferred = any_type_for_tag(tag).ok_or_else(|| mismatch(ty, tag))?;
    Ok(deserializer
        .deserialize(reader, inferred, tag)?
        .map(|inner| Box::new(AnyValue::from_boxed(inner)) as Box<dyn Reflect>))
}

fn deserialize_enum(
    deserializer: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    let TypeKind::Enum(info) = &ty.kind else {
        return Err(BsonError::Decode(format!(
            "{} is registered as Enum without enum metadata",
            ty.name
        )));
    };
    match deserializer.deserialize(reader, (info.repr)(), tag) {
        Ok(Some(repr)) => (info.from_repr)(repr).map(Some),
        Ok(None) => Ok(None),
        Err(BsonError::TypeMismatch { found, .. }) => Err(BsonError::TypeMismatch {
            expected: ty.name,
            found,
        }),
        Err(e) => Err(e),
    }
}

fn deserialize_collection(
    deserializer: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    let TypeKind::Collection(info) = &ty.kind else {
        return Err(BsonError::Decode(format!(
            "{} is registered as a collection without item metadata",
            ty.name
        )));
    };
    expect_framed(ty, tag, TAG_ARRAY)?;

    let item_type = (info.item)();
    let document = read_document(reader)?;
    let mut elements = document_elements(&document);
    let mut builder = (info.builder)();

    // Array keys carry no information beyond position.
    while let Some((item_tag, _)) = next_element(&mut elements)? {
        let Some(item) = deserializer.deserialize_slot(&mut elements, item_type, item_tag)? else {
            continue;
        };
        if item.is_none() && !info.item_nullable {
            deserializer.null_item(item_type)?;
            continue;
        }
        builder.push(item)?;
    }
    Ok(Some(builder.finish()))
}

fn deserialize_map(
    deserializer: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    let TypeKind::Map(info) = &ty.kind else {
        return Err(BsonError::Decode(format!(
            "{} is registered as a map without value metadata",
            ty.name
        )));
    };
    expect_framed(ty, tag, TAG_DOCUMENT)?;

    let value_type = (info.value)();
    let document = read_document(reader)?;
    let mut elements = document_elements(&document);
    let mut builder = (info.builder)();

    while let Some((value_tag, key)) = next_element(&mut elements)? {
        let Some(value) = deserializer.deserialize_slot(&mut elements, value_type, value_tag)? else {
            continue;
        };
        if value.is_none() && !info.value_nullable {
            deserializer.null_item(value_type)?;
            continue;
        }
        builder.insert(key, value)?;
    }
    Ok(Some(builder.finish()))
}

fn deserialize_object(
    deserializer: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    let TypeKind::Object(info) = &ty.kind else {
        return Err(BsonError::Decode(format!(
            "{} is registered as an object without field metadata",
            ty.name
        )));
    };
    expect_framed(ty, tag, TAG_DOCUMENT)?;

    let document = read_document(reader)?;
    let mut elements = document_elements(&document);
    let mut object = (info.create)();
    let mut present = vec![false; info.fields.len()];
    let mut deferred = Vec::new();

    while let Some((field_tag, key)) = next_element(&mut elements)? {
        let Some(index) = info.fields.iter().position(|field| field.name == key) else {
            if !deserializer.config.allow_unknown_fields {
                return Err(ObjectDecodeError::UnknownField {
                    field: key,
                    object: ty.name,
                }
                .into());
            }
            trace!(object = ty.name, field = %key, "skipping unknown field");
            skip_value(&mut elements, field_tag)?;
            continue;
        };
        let field = &info.fields[index];
        let field_type = field.field_type();

        // Selected types may depend on fields that appear later in the document.
        if field.type_selector.is_some() && field_type.class_id == ClassId::ANY {
            deferred.push((index, field_tag, capture_value(&mut elements, field_tag)?));
            continue;
        }

        if let Some(value) = deserializer.deserialize_slot(&mut elements, field_type, field_tag)? {
            present[index] = assign_field(object.as_mut(), ty, field, index, value)?;
        }
    }

    for (index, field_tag, mut raw) in deferred {
        let field = &info.fields[index];
        let Some(selector) = field.type_selector else {
            continue;
        };
        let selected = selector(object.as_ref())?;
        if let Some(value) = deserializer.deserialize_slot(&mut raw, selected, field_tag)? {
            let value =
                value.map(|inner| Box::new(AnyValue::from_boxed(inner)) as Box<dyn Reflect>);
            present[index] = assign_field(object.as_mut(), ty, field, index, value)?;
        }
    }

    if deserializer.config.require_fields {
        if let Some(field) = info
            .fields
            .iter()
            .zip(&present)
            .find(|(field, present)| !field.nullable && !**present)
            .map(|(field, _)| field)
        {
            return Err(ObjectDecodeError::MissingRequiredField {
                field: field.name,
                object: ty.name,
            }
            .into());
        }
    }

    Ok(Some(object))
}

/// Stores a decoded value; nulls leave non-nullable fields at their default.
/// Returns whether the field now holds a value.
fn assign_field(
    object: &mut dyn Reflect,
    ty: &'static Type,
    field: &Field,
    index: usize,
    value: Option<Box<dyn Reflect>>,
) -> Result<bool> {
    if value.is_none() && !field.nullable {
        return Ok(false);
    }
    let holds_value = value.is_some();
    object
        .as_object_mut()
        .ok_or_else(|| BsonError::Decode(format!("{} does not expose mutable fields", ty.name)))?
        .set_field(index, value)?;
    Ok(holds_value)
}

fn deserialize_object_id(
    _: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    expect_tag(ty, tag, TAG_OBJECT_ID)?;
    let raw = read_bytes(reader, 12)?;
    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(&raw);
    Ok(Some(Box::new(ObjectId(bytes))))
}

fn deserialize_date_time(
    _: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    expect_tag(ty, tag, TAG_DATE_TIME)?;
    Ok(Some(Box::new(DateTime(read_i64_le(reader)?))))
}

fn deserialize_inline_document(
    _: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    expect_framed(ty, tag, TAG_DOCUMENT)?;
    Ok(Some(Box::new(InlineDocument(read_document(reader)?))))
}

fn deserialize_inline_array(
    _: &Deserializer,
    reader: &mut Bytes,
    ty: &'static Type,
    tag: u8,
) -> Result<Option<Box<dyn Reflect>>> {
    expect_framed(ty, tag, TAG_ARRAY)?;
    Ok(Some(Box::new(InlineArray(read_document(reader)?))))
}

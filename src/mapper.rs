use crate::core::TAG_DOCUMENT_ROOT;
use crate::*;
use std::sync::Arc;

/// Pairs a [`Serializer`] with a [`Deserializer`] behind a typed read/write API.
///
/// Both halves are shared through `Arc`, so a configured mapper can be
/// cloned cheaply and handed to several threads.
#[derive(Clone)]
pub struct ObjectMapper {
    serializer: Arc<Serializer>,
    deserializer: Arc<Deserializer>,
}

impl Default for ObjectMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectMapper {
    pub const MIME_TYPE: &'static str = "application";
    pub const MIME_SUBTYPE: &'static str = "bson";

    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default(), DeserializerConfig::default())
    }

    pub fn with_config(serializer: SerializerConfig, deserializer: DeserializerConfig) -> Self {
        Self::from_parts(
            Arc::new(Serializer::new(serializer)),
            Arc::new(Deserializer::new(deserializer)),
        )
    }

    /// Use this when custom handlers have been registered on either half.
    pub fn from_parts(serializer: Arc<Serializer>, deserializer: Arc<Deserializer>) -> Self {
        Self {
            serializer,
            deserializer,
        }
    }

    pub fn serializer(&self) -> &Arc<Serializer> {
        &self.serializer
    }

    pub fn deserializer(&self) -> &Arc<Deserializer> {
        &self.deserializer
    }

    /// `application/bson`
    pub fn mime(&self) -> String {
        format!("{}/{}", Self::MIME_TYPE, Self::MIME_SUBTYPE)
    }

    /// Appends `value` to `out` as a top-level document.
    ///
    /// On error `out` may hold a partial document and should be discarded.
    pub fn write<T: Slot>(&self, out: &mut BytesMut, value: &T) -> Result<()> {
        self.serializer
            .serialize_to_stream(out, Polymorph::from_slot(value))
    }

    pub fn write_to_bytes<T: Slot>(&self, value: &T) -> Result<Bytes> {
        let mut out = BytesMut::new();
        self.write(&mut out, value)?;
        Ok(out.freeze())
    }

    /// Reads one top-level document from `reader`, leaving any trailing bytes.
    pub fn read<T: Slot>(&self, reader: &mut Bytes) -> Result<T> {
        let value = self
            .deserializer
            .deserialize(reader, T::slot_type(), TAG_DOCUMENT_ROOT)?;
        T::from_reflect(value)
    }

    pub fn read_from_slice<T: Slot>(&self, data: &[u8]) -> Result<T> {
        let mut reader = Bytes::copy_from_slice(data);
        self.read(&mut reader)
    }
}

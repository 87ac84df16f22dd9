use bson::{doc, Bson};
use bytes::{Bytes, BytesMut};
use typed_bson::core::*;
use typed_bson::BsonError;

fn element_bytes(value: Bson) -> (u8, Bytes) {
    let mut raw = Vec::new();
    doc! { "v": value }.to_writer(&mut raw).unwrap();
    let document = Bytes::from(raw);
    let mut elements = document_elements(&document);
    let (tag, key) = next_element(&mut elements).unwrap().unwrap();
    assert_eq!(key, "v");
    (tag, elements)
}

#[test]
fn test_skip_value_for_every_tag() {
    let values = vec![
        (TAG_DOUBLE, Bson::Double(2.5)),
        (TAG_STRING, Bson::String("text".to_string())),
        (TAG_DOCUMENT, Bson::Document(doc! { "a": { "b": [1i32] } })),
        (TAG_ARRAY, Bson::Array(vec![Bson::Int32(1), Bson::Null])),
        (
            TAG_BINARY,
            Bson::Binary(bson::Binary {
                subtype: bson::spec::BinarySubtype::Generic,
                bytes: vec![0, 1, 2, 3, 4],
            }),
        ),
        (TAG_UNDEFINED, Bson::Undefined),
        (TAG_OBJECT_ID, Bson::ObjectId(bson::oid::ObjectId::from_bytes([1; 12]))),
        (TAG_BOOLEAN, Bson::Boolean(true)),
        (TAG_DATE_TIME, Bson::DateTime(bson::DateTime::from_millis(-1))),
        (TAG_NULL, Bson::Null),
        (
            TAG_REGEX,
            Bson::RegularExpression(bson::Regex {
                pattern: "x+".to_string(),
                options: "im".to_string(),
            }),
        ),
        (TAG_JAVASCRIPT, Bson::JavaScriptCode("f()".to_string())),
        (TAG_SYMBOL, Bson::Symbol("s".to_string())),
        (
            TAG_JAVASCRIPT_WITH_SCOPE,
            Bson::JavaScriptCodeWithScope(bson::JavaScriptCodeWithScope {
                code: "g()".to_string(),
                scope: doc! { "g": "h" },
            }),
        ),
        (TAG_INT32, Bson::Int32(-7)),
        (TAG_TIMESTAMP, Bson::Timestamp(bson::Timestamp { time: 2, increment: 3 })),
        (TAG_INT64, Bson::Int64(-8)),
        (TAG_DECIMAL128, Bson::Decimal128(bson::Decimal128::from_bytes([7; 16]))),
        (TAG_MIN_KEY, Bson::MinKey),
        (TAG_MAX_KEY, Bson::MaxKey),
    ];

    for (expected_tag, value) in values {
        let (tag, mut elements) = element_bytes(value);
        assert_eq!(tag, expected_tag, "tag of {}", tag_name(expected_tag));
        skip_value(&mut elements, tag).unwrap();
        // only the document terminator remains
        assert_eq!(&elements[..], &[0], "skipping {}", tag_name(tag));
    }
}

#[test]
fn test_capture_value_returns_exact_payload() {
    let (tag, mut elements) = element_bytes(Bson::String("abc".to_string()));
    let captured = capture_value(&mut elements, tag).unwrap();
    assert_eq!(&captured[..], &[4, 0, 0, 0, b'a', b'b', b'c', 0]);
    assert_eq!(&elements[..], &[0]);

    let mut captured = captured;
    assert_eq!(read_string(&mut captured).unwrap(), "abc");
}

#[test]
fn test_skip_unknown_tag_fails() {
    let mut reader = Bytes::from_static(&[1, 2, 3]);
    assert!(matches!(skip_value(&mut reader, 0x42), Err(BsonError::Decode(_))));
}

#[test]
fn test_read_scalar_leaves_non_scalars_alone() {
    let mut reader = Bytes::from_static(&[2, 0, 0, 0, b'a', 0]);
    assert_eq!(read_scalar(&mut reader, TAG_STRING).unwrap(), None);
    assert_eq!(reader.len(), 6);

    let mut reader = Bytes::from_static(&[1]);
    assert_eq!(
        read_scalar(&mut reader, TAG_BOOLEAN).unwrap(),
        Some(WireScalar::Boolean(true))
    );

    let mut reader = Bytes::from_static(&[2]);
    assert!(matches!(
        read_scalar(&mut reader, TAG_BOOLEAN),
        Err(BsonError::Decode(_))
    ));
}

#[test]
fn test_string_errors() {
    let mut reader = Bytes::from_static(&[0, 0, 0, 0]);
    assert!(matches!(read_string(&mut reader), Err(BsonError::Decode(_))));

    let mut reader = Bytes::from_static(&[3, 0, 0, 0, b'a', b'b', b'c']);
    assert!(matches!(read_string(&mut reader), Err(BsonError::Decode(_))));

    let mut reader = Bytes::from_static(&[9, 0, 0, 0, b'a', 0]);
    assert!(matches!(read_string(&mut reader), Err(BsonError::InsufficientData)));

    let mut reader = Bytes::from_static(&[3, 0, 0, 0, 0xFF, 0xFE, 0]);
    assert!(matches!(read_string(&mut reader), Err(BsonError::Decode(_))));
}

#[test]
fn test_keys_cannot_contain_nul() {
    let mut out = BytesMut::new();
    assert!(matches!(
        write_cstring(&mut out, "a\0b"),
        Err(BsonError::Encode(_))
    ));
    assert!(write_key(&mut out, TAG_INT32, Some("ok")).is_ok());
    assert_eq!(&out[..], &[TAG_INT32, b'o', b'k', 0]);

    // the root carries neither tag nor key
    let mut root = BytesMut::new();
    write_key(&mut root, TAG_DOCUMENT, None).unwrap();
    assert!(root.is_empty());
    assert!(matches!(
        write_key(&mut root, TAG_INT32, None),
        Err(BsonError::MissingKey("int32"))
    ));
}

#[test]
fn test_key_without_terminator() {
    let mut reader = Bytes::from_static(&[TAG_INT32, b'k', b'e', b'y']);
    assert!(matches!(
        next_element(&mut reader),
        Err(BsonError::InsufficientData)
    ));
}

#[test]
fn test_framing() {
    let mut out = BytesMut::new();
    write_framed(&mut out, &[TAG_NULL, b'n', 0]).unwrap();
    assert_eq!(&out[..], &[8, 0, 0, 0, TAG_NULL, b'n', 0, 0]);
    assert!(validate_framed(&out, "document").is_ok());

    let mut reader = out.freeze();
    let document = read_document(&mut reader).unwrap();
    assert_eq!(document.len(), 8);
    assert!(reader.is_empty());

    let mut elements = document_elements(&document);
    assert_eq!(
        next_element(&mut elements).unwrap(),
        Some((TAG_NULL, "n".to_string()))
    );
    assert_eq!(next_element(&mut elements).unwrap(), None);
}

#[test]
fn test_terminator_must_end_the_document() {
    let document = Bytes::from_static(&[10, 0, 0, 0, 0, TAG_NULL, b'n', 0, 0, 0]);
    let mut elements = document_elements(&document);
    assert!(matches!(next_element(&mut elements), Err(BsonError::Decode(_))));
}

#[test]
fn test_document_length_errors() {
    let mut reader = Bytes::from_static(&[4, 0, 0, 0, 0]);
    assert!(matches!(read_document(&mut reader), Err(BsonError::Decode(_))));

    let mut reader = Bytes::from_static(&[6, 0, 0, 0, 0]);
    assert!(matches!(read_document(&mut reader), Err(BsonError::InsufficientData)));

    let mut reader = Bytes::from_static(&[5, 0]);
    assert!(matches!(read_document(&mut reader), Err(BsonError::InsufficientData)));

    assert!(matches!(
        validate_framed(&[6, 0, 0, 0, 0], "array"),
        Err(BsonError::InvalidInline { kind: "array", .. })
    ));
}

#[test]
fn test_tag_names() {
    assert_eq!(tag_name(TAG_INT32), "int32");
    assert_eq!(tag_name(TAG_TIMESTAMP), "timestamp");
    assert_eq!(tag_name(TAG_MIN_KEY), "min key");
    assert_eq!(tag_name(0x42), "unknown");
}

use bson::{doc, Bson};
use bytes::Bytes;
use typed_bson::{from_bytes, to_bytes, Object};

// ========================================
// Signed 64-bit
// ========================================

#[derive(Object, Default, Debug, PartialEq)]
struct Int64s {
    f1: Option<i64>,
    f2: Option<i64>,
    f3: Option<i64>,
    f4: Option<i64>,
}

#[derive(Object, Default, Debug, PartialEq)]
struct Int64sWithoutF1 {
    f2: Option<i64>,
    f3: Option<i64>,
    f4: Option<i64>,
}

#[derive(Object, Default, Debug, PartialEq)]
struct Int64sWithoutF2 {
    f1: Option<i64>,
    f3: Option<i64>,
    f4: Option<i64>,
}

#[derive(Object, Default, Debug, PartialEq)]
struct Int64sWithoutF3 {
    f1: Option<i64>,
    f2: Option<i64>,
    f4: Option<i64>,
}

#[derive(Object, Default, Debug, PartialEq)]
struct Int64sWithoutF4 {
    f1: Option<i64>,
    f2: Option<i64>,
    f3: Option<i64>,
}

fn signed() -> Int64s {
    Int64s {
        f1: Some(i64::MAX),
        f2: Some(i64::MIN + 64),
        f3: None,
        f4: Some(i64::MIN),
    }
}

#[test]
fn test_signed_matches_reference_encoder() {
    let encoded = to_bytes(&signed()).unwrap();

    let reference = doc! {
        "f1": i64::MAX,
        "f2": i64::MIN + 64,
        "f3": Bson::Null,
        "f4": i64::MIN,
    };
    let mut expected = Vec::new();
    reference.to_writer(&mut expected).unwrap();

    assert_eq!(encoded.len(), 45);
    assert_eq!(&encoded[..], &expected[..]);
}

#[test]
fn test_signed_tag_sequence() {
    let encoded = to_bytes(&signed()).unwrap();
    assert_eq!(&encoded[0..4], &45i32.to_le_bytes());
    // tag positions: 4, 4+12, 4+24, 4+28
    assert_eq!(encoded[4], 0x12);
    assert_eq!(&encoded[5..8], b"f1\0");
    assert_eq!(encoded[16], 0x12);
    assert_eq!(&encoded[17..20], b"f2\0");
    assert_eq!(encoded[28], 0x0A);
    assert_eq!(&encoded[29..32], b"f3\0");
    assert_eq!(encoded[32], 0x12);
    assert_eq!(&encoded[33..36], b"f4\0");
    assert_eq!(encoded[44], 0x00);
}

#[test]
fn test_signed_round_trip() {
    let original = signed();
    let mut encoded = to_bytes(&original).unwrap();
    let decoded: Int64s = from_bytes(&mut encoded).unwrap();
    assert_eq!(decoded, original);
}

#[test]
fn test_signed_decode_into_subsets() {
    let encoded = to_bytes(&signed()).unwrap();

    let sub: Int64sWithoutF1 = from_bytes(&mut encoded.clone()).unwrap();
    assert_eq!(
        sub,
        Int64sWithoutF1 {
            f2: Some(i64::MIN + 64),
            f3: None,
            f4: Some(i64::MIN),
        }
    );

    let sub: Int64sWithoutF2 = from_bytes(&mut encoded.clone()).unwrap();
    assert_eq!(
        sub,
        Int64sWithoutF2 {
            f1: Some(i64::MAX),
            f3: None,
            f4: Some(i64::MIN),
        }
    );

    let sub: Int64sWithoutF3 = from_bytes(&mut encoded.clone()).unwrap();
    assert_eq!(
        sub,
        Int64sWithoutF3 {
            f1: Some(i64::MAX),
            f2: Some(i64::MIN + 64),
            f4: Some(i64::MIN),
        }
    );

    let sub: Int64sWithoutF4 = from_bytes(&mut encoded.clone()).unwrap();
    assert_eq!(
        sub,
        Int64sWithoutF4 {
            f1: Some(i64::MAX),
            f2: Some(i64::MIN + 64),
            f3: None,
        }
    );
}

#[test]
fn test_subset_decodes_into_superset() {
    let partial = Int64sWithoutF2 {
        f1: Some(7),
        f3: Some(8),
        f4: None,
    };
    let mut encoded = to_bytes(&partial).unwrap();
    let full: Int64s = from_bytes(&mut encoded).unwrap();
    assert_eq!(
        full,
        Int64s {
            f1: Some(7),
            f2: None,
            f3: Some(8),
            f4: None,
        }
    );
}

// ========================================
// Unsigned 64-bit (Timestamp tag)
// ========================================

#[derive(Object, Default, Debug, PartialEq)]
struct UInt64s {
    f1: Option<u64>,
    f2: Option<u64>,
    f3: Option<u64>,
    f4: Option<u64>,
}

#[derive(Object, Default, Debug, PartialEq)]
struct UInt64sWithoutF4 {
    f1: Option<u64>,
    f2: Option<u64>,
    f3: Option<u64>,
}

fn unsigned() -> UInt64s {
    UInt64s {
        f1: Some(u64::MAX),
        f2: Some(u64::MAX - 64),
        f3: None,
        f4: Some(u64::MAX - 10064),
    }
}

const UNSIGNED_BYTES: [u8; 45] = [
    45, 0, 0, 0, //
    0x11, b'f', b'1', 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0x11, b'f', b'2', 0, 0xBF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0x0A, b'f', b'3', 0, //
    0x11, b'f', b'4', 0, 0xAF, 0xD8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, //
    0x00,
];

#[test]
fn test_unsigned_exact_bytes() {
    let encoded = to_bytes(&unsigned()).unwrap();
    assert_eq!(&encoded[..], &UNSIGNED_BYTES[..]);
}

#[test]
fn test_unsigned_round_trip() {
    let mut reader = Bytes::from_static(&UNSIGNED_BYTES);
    let decoded: UInt64s = from_bytes(&mut reader).unwrap();
    assert_eq!(decoded, unsigned());
    assert!(reader.is_empty());
}

#[test]
fn test_unsigned_decode_into_subset() {
    let mut reader = Bytes::from_static(&UNSIGNED_BYTES);
    let decoded: UInt64sWithoutF4 = from_bytes(&mut reader).unwrap();
    assert_eq!(
        decoded,
        UInt64sWithoutF4 {
            f1: Some(u64::MAX),
            f2: Some(u64::MAX - 64),
            f3: None,
        }
    );
}

#[test]
fn test_unsigned_is_a_timestamp_to_standard_readers() {
    let document = bson::Document::from_reader(&UNSIGNED_BYTES[..]).unwrap();
    match document.get("f2") {
        Some(Bson::Timestamp(ts)) => {
            assert_eq!(ts.time, u32::MAX);
            assert_eq!(ts.increment, u32::MAX - 64);
        }
        other => panic!("expected timestamp, got {:?}", other),
    }
    assert_eq!(document.get("f3"), Some(&Bson::Null));
}

#[test]
fn test_u64_max_root_field() {
    #[derive(Object, Default, Debug, PartialEq)]
    struct Single {
        value: u64,
    }

    let encoded = to_bytes(&Single { value: u64::MAX }).unwrap();
    assert_eq!(encoded[4], 0x11);
    assert_eq!(&encoded[11..19], &[0xFF; 8]);

    let decoded: Single = from_bytes(&mut encoded.clone()).unwrap();
    assert_eq!(decoded.value, u64::MAX);
}

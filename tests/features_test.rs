#[cfg(any(feature = "indexmap", feature = "serde"))]
use bson::doc;
#[cfg(feature = "indexmap")]
use bson::Bson;
#[cfg(feature = "indexmap")]
use indexmap::{IndexMap, IndexSet};
#[cfg(any(feature = "indexmap", feature = "chrono"))]
use typed_bson::{from_slice, to_bytes, Object};
#[cfg(feature = "chrono")]
use typed_bson::{BsonError, DateTime};
#[cfg(feature = "serde")]
use typed_bson::{DeserializerConfig, MismatchPolicy, SerializerConfig};

#[cfg(feature = "indexmap")]
fn reference_bytes(document: &bson::Document) -> Vec<u8> {
    let mut out = Vec::new();
    document.to_writer(&mut out).unwrap();
    out
}

// ========================================
// indexmap
// ========================================

#[cfg(feature = "indexmap")]
#[derive(Object, Default, Debug, PartialEq)]
struct Tagged {
    tags: IndexSet<String>,
    attrs: IndexMap<String, Option<i64>>,
}

#[cfg(feature = "indexmap")]
#[test]
fn test_indexmap_keeps_insertion_order() {
    let mut value = Tagged::default();
    value.tags.insert("zeta".to_string());
    value.tags.insert("alpha".to_string());
    value.attrs.insert("z".to_string(), Some(1));
    value.attrs.insert("a".to_string(), None);
    value.attrs.insert("m".to_string(), Some(-3));

    let encoded = to_bytes(&value).unwrap();
    let reference = doc! {
        "tags": ["zeta", "alpha"],
        "attrs": { "z": 1i64, "a": Bson::Null, "m": -3i64 },
    };
    assert_eq!(&encoded[..], &reference_bytes(&reference)[..]);

    let decoded: Tagged = from_slice(&encoded).unwrap();
    assert_eq!(decoded, value);
    assert_eq!(
        decoded.attrs.keys().collect::<Vec<_>>(),
        vec!["z", "a", "m"]
    );
    assert_eq!(
        decoded.tags.iter().collect::<Vec<_>>(),
        vec!["zeta", "alpha"]
    );
}

#[cfg(feature = "indexmap")]
#[test]
fn test_indexmap_at_root() {
    let mut value: IndexMap<String, i32> = IndexMap::new();
    value.insert("second".to_string(), 2);
    value.insert("first".to_string(), 1);

    let encoded = to_bytes(&value).unwrap();
    assert_eq!(
        &encoded[..],
        &reference_bytes(&doc! { "second": 2i32, "first": 1i32 })[..]
    );
    let decoded: IndexMap<String, i32> = from_slice(&encoded).unwrap();
    assert_eq!(decoded, value);
}

#[cfg(feature = "indexmap")]
#[test]
fn test_indexset_drops_duplicate_items() {
    let bytes = reference_bytes(&doc! { "tags": ["a", "b", "a"], "attrs": {} });
    let decoded: Tagged = from_slice(&bytes).unwrap();
    assert_eq!(decoded.tags.len(), 2);
    assert!(decoded.tags.contains("a"));
    assert!(decoded.tags.contains("b"));
}

// ========================================
// chrono
// ========================================

#[cfg(feature = "chrono")]
#[test]
fn test_chrono_conversions() {
    let instant = chrono::DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
    let date_time = DateTime::from(instant);
    assert_eq!(date_time.timestamp_millis(), 1_700_000_000_123);

    let back = chrono::DateTime::<chrono::Utc>::try_from(date_time).unwrap();
    assert_eq!(back, instant);

    let before_epoch = chrono::DateTime::from_timestamp_millis(-86_400_000).unwrap();
    assert_eq!(DateTime::from(before_epoch).timestamp_millis(), -86_400_000);
}

#[cfg(feature = "chrono")]
#[test]
fn test_chrono_out_of_range() {
    let result = chrono::DateTime::<chrono::Utc>::try_from(DateTime::from_millis(i64::MAX));
    assert!(matches!(result, Err(BsonError::Decode(_))));
}

#[cfg(feature = "chrono")]
#[test]
fn test_chrono_through_the_codec() {
    #[derive(Object, Default, Debug, PartialEq)]
    struct Event {
        at: DateTime,
    }

    let instant = chrono::DateTime::from_timestamp_millis(1_234_567).unwrap();
    let encoded = to_bytes(&Event {
        at: instant.into(),
    })
    .unwrap();
    let decoded: Event = from_slice(&encoded).unwrap();
    assert_eq!(
        chrono::DateTime::<chrono::Utc>::try_from(decoded.at).unwrap(),
        instant
    );
}

// ========================================
// serde
// ========================================

#[cfg(feature = "serde")]
#[test]
fn test_config_serde_round_trip() {
    let serializer = SerializerConfig::default()
        .with_include_null_fields(false)
        .with_interpretation("xy")
        .with_max_interpretation_depth(8);
    let document = bson::to_document(&serializer).unwrap();
    let decoded: SerializerConfig = bson::from_document(document).unwrap();
    assert_eq!(decoded, serializer);

    let deserializer = DeserializerConfig::strict().with_mismatch_policy(MismatchPolicy::Skip);
    let document = bson::to_document(&deserializer).unwrap();
    assert_eq!(document.get_str("on_type_mismatch").unwrap(), "skip");
    let decoded: DeserializerConfig = bson::from_document(document).unwrap();
    assert_eq!(decoded, deserializer);
}

#[cfg(feature = "serde")]
#[test]
fn test_config_missing_keys_use_defaults() {
    let decoded: SerializerConfig = bson::from_document(doc! {}).unwrap();
    assert_eq!(decoded, SerializerConfig::default());

    let decoded: DeserializerConfig =
        bson::from_document(doc! { "require_fields": true, "on_type_mismatch": "skip" }).unwrap();
    assert_eq!(
        decoded,
        DeserializerConfig::default()
            .with_require_fields(true)
            .with_mismatch_policy(MismatchPolicy::Skip)
    );
}

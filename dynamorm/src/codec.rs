//! Bidirectional translation between application values and the store's
//! `AttributeValue` sum type.
//!
//! The source implementation resolves `dbType` and the conversion to use
//! at runtime from a reflected `Type`. Here the `#[derive(Entity)]` macro
//! resolves the same decision at compile time (see
//! `dynamorm-derive/src/lib.rs`) and emits a call to one of the free
//! functions below, so there is no sniffing of the wire value on decode —
//! only field metadata ever decides how a value is interpreted, exactly
//! as required.

use crate::error::{Error, ErrorKind, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

/// A value with a direct, lossless `AttributeValue` representation.
///
/// Implemented for the store's native scalar shapes (`String`, `bool`,
/// the integer and float families, and `Vec<u8>` for `Binary`). Anything
/// else takes the value-serialized text path via [`encode_value_serialized`].
pub trait Encodable: Sized {
    /// Encodes `self` as an `AttributeValue`.
    fn encode(&self) -> Result<AttributeValue>;
    /// Decodes an `AttributeValue` produced by `encode`.
    fn decode(value: &AttributeValue) -> Result<Self>;
}

macro_rules! impl_numeric {
    ($($t:ty),+ $(,)?) => {
        $(
            impl Encodable for $t {
                fn encode(&self) -> Result<AttributeValue> {
                    Ok(AttributeValue::N(self.to_string()))
                }
                fn decode(value: &AttributeValue) -> Result<Self> {
                    match value {
                        AttributeValue::N(s) => s.parse::<$t>().map_err(|e| {
                            ErrorKind::Encoding.with_context(format_args!(
                                "cannot parse number {s:?} as {}: {e}", stringify!($t)
                            ))
                        }),
                        AttributeValue::Null(true) => Ok(Default::default()),
                        other => Err(unexpected(other, "N")),
                    }
                }
            }
        )+
    };
}

impl_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Encodable for bool {
    fn encode(&self) -> Result<AttributeValue> {
        Ok(AttributeValue::Bool(*self))
    }
    fn decode(value: &AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::Bool(b) => Ok(*b),
            AttributeValue::Null(true) => Ok(false),
            other => Err(unexpected(other, "BOOL")),
        }
    }
}

impl Encodable for String {
    fn encode(&self) -> Result<AttributeValue> {
        Ok(AttributeValue::S(self.clone()))
    }
    fn decode(value: &AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::S(s) => Ok(s.clone()),
            AttributeValue::N(s) => Ok(s.clone()),
            AttributeValue::Null(true) => Ok(String::new()),
            other => Err(unexpected(other, "S")),
        }
    }
}

impl Encodable for Vec<u8> {
    fn encode(&self) -> Result<AttributeValue> {
        Ok(AttributeValue::B(aws_sdk_dynamodb::primitives::Blob::new(
            self.clone(),
        )))
    }
    fn decode(value: &AttributeValue) -> Result<Self> {
        match value {
            AttributeValue::B(b) => Ok(b.clone().into_inner()),
            AttributeValue::Null(true) => Ok(Vec::new()),
            other => Err(unexpected(other, "B")),
        }
    }
}

fn unexpected(value: &AttributeValue, expected: &str) -> Error {
    ErrorKind::Encoding.with_context(format_args!(
        "expected attribute variant {expected}, found {value:?}"
    ))
}

/// Encodes an `Option<T>`: `None` becomes the NULL marker, `Some(v)`
/// encodes `v` directly.
pub fn encode_option<T: Encodable>(value: &Option<T>) -> Result<AttributeValue> {
    match value {
        Some(v) => v.encode(),
        None => Ok(AttributeValue::Null(true)),
    }
}

/// Decodes an `Option<T>`. The NULL marker and an absent attribute both
/// decode to `None`.
pub fn decode_option<T: Encodable>(value: &AttributeValue) -> Result<Option<T>> {
    match value {
        AttributeValue::Null(true) => Ok(None),
        other => Ok(Some(T::decode(other)?)),
    }
}

/// Encodes an ordered collection as a `List` attribute, recursively
/// encoding each element.
pub fn encode_list<T: Encodable>(items: &[T]) -> Result<AttributeValue> {
    let encoded = items
        .iter()
        .map(Encodable::encode)
        .collect::<Result<Vec<_>>>()?;
    Ok(AttributeValue::L(encoded))
}

/// Decodes a `List` attribute into an ordered collection.
pub fn decode_list<T: Encodable>(value: &AttributeValue) -> Result<Vec<T>> {
    match value {
        AttributeValue::L(items) => items.iter().map(Encodable::decode).collect(),
        AttributeValue::Null(true) => Ok(Vec::new()),
        other => Err(unexpected(other, "L")),
    }
}

/// Encodes a key/value mapping as a `Map` attribute. Keys are stringified;
/// insertion order is not preserved (the wire format is itself unordered).
pub fn encode_map<V: Encodable>(items: &HashMap<String, V>) -> Result<AttributeValue> {
    let mut map = HashMap::with_capacity(items.len());
    for (k, v) in items {
        map.insert(k.clone(), v.encode()?);
    }
    Ok(AttributeValue::M(map))
}

/// Decodes a `Map` attribute into a key/value mapping.
pub fn decode_map<V: Encodable>(value: &AttributeValue) -> Result<HashMap<String, V>> {
    match value {
        AttributeValue::M(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), V::decode(v)?)))
            .collect(),
        AttributeValue::Null(true) => Ok(HashMap::new()),
        other => Err(unexpected(other, "M")),
    }
}

/// Encodes a collection of strings as a `StringSet` (`SS`) attribute.
///
/// The source conflates `StringSet` and `NumberSet`, emitting `NS` for
/// both; that is not reproduced here (see `SPEC_FULL.md` §4.2).
pub fn encode_string_set<I>(items: I) -> AttributeValue
where
    I: IntoIterator<Item = String>,
{
    AttributeValue::Ss(items.into_iter().collect())
}

/// Decodes a `StringSet` (`SS`) attribute.
pub fn decode_string_set(value: &AttributeValue) -> Result<Vec<String>> {
    match value {
        AttributeValue::Ss(items) => Ok(items.clone()),
        AttributeValue::Null(true) => Ok(Vec::new()),
        other => Err(unexpected(other, "SS")),
    }
}

/// Encodes a collection of numbers as a `NumberSet` (`NS`) attribute.
pub fn encode_number_set<N>(items: &[N]) -> AttributeValue
where
    N: ToString,
{
    AttributeValue::Ns(items.iter().map(ToString::to_string).collect())
}

/// Decodes a `NumberSet` (`NS`) attribute.
pub fn decode_number_set<N>(value: &AttributeValue) -> Result<Vec<N>>
where
    N: FromStr,
    N::Err: std::fmt::Display,
{
    match value {
        AttributeValue::Ns(items) => items
            .iter()
            .map(|s| {
                s.parse::<N>().map_err(|e| {
                    ErrorKind::Encoding.with_context(format_args!("cannot parse {s:?}: {e}"))
                })
            })
            .collect(),
        AttributeValue::Null(true) => Ok(Vec::new()),
        other => Err(unexpected(other, "NS")),
    }
}

/// Encodes a collection of byte sequences as a `BinarySet` (`BS`) attribute.
pub fn encode_binary_set<I>(items: I) -> AttributeValue
where
    I: IntoIterator<Item = Vec<u8>>,
{
    AttributeValue::Bs(
        items
            .into_iter()
            .map(aws_sdk_dynamodb::primitives::Blob::new)
            .collect(),
    )
}

/// Decodes a `BinarySet` (`BS`) attribute.
pub fn decode_binary_set(value: &AttributeValue) -> Result<Vec<Vec<u8>>> {
    match value {
        AttributeValue::Bs(items) => Ok(items.iter().map(|b| b.clone().into_inner()).collect()),
        AttributeValue::Null(true) => Ok(Vec::new()),
        other => Err(unexpected(other, "BS")),
    }
}

/// Encodes an arbitrary serializable value as a compact, self-describing
/// text form (a JSON-superset permitting unquoted keys and strings where
/// unambiguous is specified; this implementation uses plain compact JSON,
/// which is always a valid instance of that superset) stored as a string
/// attribute.
///
/// This is the fallback path taken whenever a field's type doesn't match
/// one of the scalar/collection/set shapes above.
pub fn encode_value_serialized<T: Serialize>(value: &T) -> Result<AttributeValue> {
    let text = serde_json::to_string(value)?;
    Ok(AttributeValue::S(text))
}

/// Decodes a value-serialized string attribute. The decision to call this
/// (as opposed to [`Encodable::decode`]) is made by field metadata at the
/// call site, never by inspecting the string.
pub fn decode_value_serialized<T: DeserializeOwned>(value: &AttributeValue) -> Result<T> {
    match value {
        AttributeValue::S(text) => Ok(serde_json::from_str(text)?),
        AttributeValue::Null(true) => {
            Err(ErrorKind::Encoding.with_message("cannot decode null into a non-optional field"))
        }
        other => Err(unexpected(other, "S")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        assert_eq!(i64::decode(&42i64.encode().unwrap()).unwrap(), 42);
        assert_eq!(
            String::decode(&"hi".to_string().encode().unwrap()).unwrap(),
            "hi"
        );
        assert!(bool::decode(&true.encode().unwrap()).unwrap());
        assert_eq!(
            Vec::<u8>::decode(&vec![1u8, 2, 3].encode().unwrap()).unwrap(),
            vec![1u8, 2, 3]
        );
    }

    #[test]
    fn option_round_trip() {
        let none: Option<i64> = None;
        assert_eq!(
            decode_option::<i64>(&encode_option(&none).unwrap()).unwrap(),
            None
        );
        let some = Some(7i64);
        assert_eq!(
            decode_option::<i64>(&encode_option(&some).unwrap()).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn list_round_trip() {
        let items = vec![1i64, 2, 3];
        let encoded = encode_list(&items).unwrap();
        assert_eq!(decode_list::<i64>(&encoded).unwrap(), items);
    }

    #[test]
    fn map_round_trip() {
        let mut items = HashMap::new();
        items.insert("a".to_string(), 1i64);
        items.insert("b".to_string(), 2i64);
        let encoded = encode_map(&items).unwrap();
        assert_eq!(decode_map::<i64>(&encoded).unwrap(), items);
    }

    #[test]
    fn string_set_uses_ss_not_ns() {
        let encoded = encode_string_set(vec!["a".to_string(), "b".to_string()]);
        assert!(matches!(encoded, AttributeValue::Ss(_)));
        assert_eq!(
            decode_string_set(&encoded).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn number_set_uses_ns() {
        let encoded = encode_number_set(&[1i64, 2, 3]);
        assert!(matches!(encoded, AttributeValue::Ns(_)));
        assert_eq!(decode_number_set::<i64>(&encoded).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn value_serialized_round_trip() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Custom {
            a: i32,
            b: String,
        }
        let value = Custom {
            a: 1,
            b: "x".into(),
        };
        let encoded = encode_value_serialized(&value).unwrap();
        assert!(matches!(encoded, AttributeValue::S(_)));
        let decoded: Custom = decode_value_serialized(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn null_decodes_to_default_for_scalars() {
        assert_eq!(i64::decode(&AttributeValue::Null(true)).unwrap(), 0);
        assert_eq!(String::decode(&AttributeValue::Null(true)).unwrap(), "");
    }
}

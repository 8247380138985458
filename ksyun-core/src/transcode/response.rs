//! Response mapper: vendor response payload -> schema-declared attributes

use std::collections::HashMap;

use crate::resource::Value;
use crate::schema::{AttributeType, ResourceSchema};

use super::{MappingError, Payload, RuleSet, vendor_key};

/// Write the fields present in `response` into `attributes`
///
/// Each schema field is looked up under its vendor name. Absent or null
/// response keys leave the held value untouched; vendor keys that no schema
/// field claims are ignored. Request-only settings of the rule set (`only`,
/// indexing) play no part here; targets, `ignore` and decoders do.
pub fn apply_response(
    schema: &ResourceSchema,
    response: &Payload,
    rules: &RuleSet,
    attributes: &mut HashMap<String, Value>,
) -> Result<(), MappingError> {
    for name in schema.attribute_names() {
        let Some(attr) = schema.get(name) else {
            continue;
        };
        let rule = rules.get(name);
        if rule.is_some_and(|r| r.ignore) {
            continue;
        }

        let key = vendor_key(name, attr, rule);
        let Some(raw) = response.get(&key) else {
            continue;
        };
        if raw.is_null() {
            continue;
        }

        let value = match rule.and_then(|r| r.decoder) {
            Some(decoder) => decoder(raw).map_err(|message| MappingError::Decoder {
                field: name.to_string(),
                key: key.clone(),
                message,
            })?,
            None => Some(coerce(name, &key, raw, &attr.attr_type)?),
        };

        if let Some(value) = value {
            attributes.insert(name.to_string(), value);
        }
    }
    Ok(())
}

/// A float holding a whole number inside the `i64` range
fn whole_i64(f: f64) -> Option<i64> {
    // i64::MIN is exact as f64; i64::MAX rounds up to 2^63
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Convert one response value into the schema type of `field`
///
/// Vendor responses are loose about scalars: numbers arrive as strings and
/// flags as numbers, so those are converted. Collections may arrive as a
/// JSON-encoded string.
pub fn coerce(
    field: &str,
    key: &str,
    raw: &serde_json::Value,
    attr_type: &AttributeType,
) -> Result<Value, MappingError> {
    use serde_json::Value as Json;

    let mismatch = |expected: &str| MappingError::Coercion {
        field: field.to_string(),
        key: key.to_string(),
        expected: expected.to_string(),
        found: describe(raw),
    };

    match attr_type.base() {
        AttributeType::String | AttributeType::Enum(_) => match raw {
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Number(n) => Ok(Value::String(n.to_string())),
            Json::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch("string")),
        },

        AttributeType::Int => match raw {
            Json::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(whole_i64))
                .map(Value::Int)
                .ok_or_else(|| mismatch("integer")),
            Json::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| mismatch("integer")),
            Json::Bool(b) => Ok(Value::Int(i64::from(*b))),
            _ => Err(mismatch("integer")),
        },

        AttributeType::Float => match raw {
            Json::Number(n) => n.as_f64().map(Value::Float).ok_or_else(|| mismatch("number")),
            Json::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch("number")),
            _ => Err(mismatch("number")),
        },

        AttributeType::Bool => match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(mismatch("bool")),
            },
            Json::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Json::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(mismatch("bool")),
        },

        AttributeType::List(inner) | AttributeType::Set(inner) => match raw {
            Json::Array(items) => coerce_items(field, key, items, inner),
            Json::String(s) => match serde_json::from_str::<Json>(s) {
                Ok(Json::Array(items)) => coerce_items(field, key, &items, inner),
                _ => Err(mismatch("list")),
            },
            _ => Err(mismatch("list")),
        },

        AttributeType::Map(inner) => match raw {
            Json::Object(obj) => {
                let mut map = HashMap::with_capacity(obj.len());
                for (k, v) in obj {
                    if v.is_null() {
                        continue;
                    }
                    map.insert(k.clone(), coerce(field, &format!("{}.{}", key, k), v, inner)?);
                }
                Ok(Value::Map(map))
            }
            _ => Err(mismatch("map")),
        },

        AttributeType::Block(block) => match raw {
            Json::Object(obj) => {
                let mut nested = HashMap::new();
                apply_response(block, obj, &RuleSet::new(), &mut nested)?;
                Ok(Value::Map(nested))
            }
            _ => Err(mismatch("object")),
        },

        AttributeType::Custom { base, .. } => coerce(field, key, raw, base),
    }
}

fn coerce_items(
    field: &str,
    key: &str,
    items: &[serde_json::Value],
    element: &AttributeType,
) -> Result<Value, MappingError> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.is_null())
        .map(|(i, item)| coerce(field, &format!("{}[{}]", key, i), item, element))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn describe(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => format!("bool {}", b),
        serde_json::Value::Number(n) => format!("number {}", n),
        serde_json::Value::String(s) => format!("string {:?}", s),
        serde_json::Value::Array(_) => "array".to_string(),
        serde_json::Value::Object(_) => "object".to_string(),
    }
}

/// Objects listed under a set key such as `KeySet`
///
/// A missing key or a non-array value is treated as an empty set.
pub fn items_in_set<'a>(response: &'a Payload, set_key: &str) -> Vec<&'a Payload> {
    response
        .get(set_key)
        .and_then(serde_json::Value::as_array)
        .map(|items| items.iter().filter_map(serde_json::Value::as_object).collect())
        .unwrap_or_default()
}

/// First object listed under a set key, if any
pub fn first_in_set<'a>(response: &'a Payload, set_key: &str) -> Option<&'a Payload> {
    items_in_set(response, set_key).into_iter().next()
}

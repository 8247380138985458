//! Transcoding between schema-declared attributes and vendor API payloads
//!
//! The vendor API speaks flat key/value payloads with CamelCase keys and
//! indexed collections (`Ip.1`, `Ip.2`). Resources describe their fields once
//! in a `ResourceSchema`; the request builder and the response mapper walk
//! that schema, consulting per-field `FieldRule` overrides where a field does
//! not follow the default conventions.

mod request;
mod response;

pub use request::{RequestMode, build_request, zero_fill};
pub use response::{apply_response, coerce, first_in_set, items_in_set};

use std::collections::HashMap;

use crate::case_convert::to_camel_case;
use crate::resource::Value;
use crate::schema::AttributeSchema;

/// Vendor request or response payload
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Everything a custom encoder gets to see
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    /// Schema field being encoded
    pub field: &'a str,
    /// Its value
    pub value: &'a Value,
    /// Target parameter name (or prefix) for the field
    pub key: &'a str,
    /// All attribute values of the resource, for encoders that combine fields
    pub values: &'a HashMap<String, Value>,
}

impl EncodeContext<'_> {
    /// Value of another attribute of the same resource
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// Custom request encoder; owns writing zero, one or many keys
pub type FieldEncoder = fn(&EncodeContext<'_>, &mut Payload) -> Result<(), String>;

/// Custom response decoder; `Ok(None)` leaves the held value untouched
pub type FieldDecoder = fn(&serde_json::Value) -> Result<Option<Value>, String>;

/// How a field's value is laid out in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indexing {
    /// Scalars as-is, collections as `Key.1..Key.n`
    #[default]
    Plain,
    /// Always indexed; a scalar becomes `Key.1`
    Indexed,
    /// Collections joined into one comma-separated string
    CommaJoined,
}

/// Per-field override of the default transcoding
#[derive(Debug, Clone, Default)]
pub struct FieldRule {
    /// Vendor parameter name, replacing the CamelCase default
    pub target: Option<String>,
    /// Never send this field
    pub ignore: bool,
    /// Send on update even when unchanged or force-new
    pub force_include: bool,
    pub indexing: Indexing,
    pub encoder: Option<FieldEncoder>,
    pub decoder: Option<FieldDecoder>,
}

impl FieldRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, name: impl Into<String>) -> Self {
        self.target = Some(name.into());
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn force_include(mut self) -> Self {
        self.force_include = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexing = Indexing::Indexed;
        self
    }

    pub fn comma_joined(mut self) -> Self {
        self.indexing = Indexing::CommaJoined;
        self
    }

    pub fn encode_with(mut self, encoder: FieldEncoder) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn decode_with(mut self, decoder: FieldDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }
}

/// Rules for one request or response, keyed by schema field name
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<String, FieldRule>,
    /// When set, requests carry only the fields that have a rule
    only: bool,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule set restricting requests to the fields it names
    pub fn only() -> Self {
        Self {
            rules: HashMap::new(),
            only: true,
        }
    }

    pub fn rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.rules.insert(field.into(), rule);
        self
    }

    /// Name a field with default handling (useful with `only`)
    pub fn field(self, field: impl Into<String>) -> Self {
        self.rule(field, FieldRule::default())
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.rules.get(field)
    }

    pub fn is_only(&self) -> bool {
        self.only
    }
}

/// Transcoding failure, in either direction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MappingError {
    #[error("required field '{field}' is missing")]
    MissingRequired { field: String },

    #[error("field '{field}': encoding '{key}' failed: {message}")]
    Encoder {
        field: String,
        key: String,
        message: String,
    },

    #[error("field '{field}': decoding '{key}' failed: {message}")]
    Decoder {
        field: String,
        key: String,
        message: String,
    },

    #[error("field '{field}': cannot read '{key}' as {expected}, got {found}")]
    Coercion {
        field: String,
        key: String,
        expected: String,
        found: String,
    },

    #[error("field '{field}': {message}")]
    Unsupported { field: String, message: String },
}

impl MappingError {
    /// Schema field the error is about
    pub fn field(&self) -> &str {
        match self {
            MappingError::MissingRequired { field }
            | MappingError::Encoder { field, .. }
            | MappingError::Decoder { field, .. }
            | MappingError::Coercion { field, .. }
            | MappingError::Unsupported { field, .. } => field,
        }
    }
}

/// Vendor parameter name of a field: rule override, schema override, then CamelCase
pub(crate) fn vendor_key(name: &str, attr: &AttributeSchema, rule: Option<&FieldRule>) -> String {
    rule.and_then(|r| r.target.clone())
        .or_else(|| attr.provider_name.clone())
        .unwrap_or_else(|| to_camel_case(name))
}

/// Look up a dotted path such as `ReturnSet.ScalingPolicyId`
pub fn get_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a serde_json::Value> {
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// String at a dotted path; numbers are rendered as strings
pub fn get_path_str(payload: &Payload, path: &str) -> Option<String> {
    match get_path(payload, path)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_walks_nested_objects() {
        let payload = json!({
            "ReturnSet": {"ScalingPolicyId": "policy-1"},
            "RequestId": "abc",
        });
        let payload = payload.as_object().unwrap();
        assert_eq!(
            get_path_str(payload, "ReturnSet.ScalingPolicyId").as_deref(),
            Some("policy-1")
        );
        assert!(get_path(payload, "ReturnSet.Missing").is_none());
        assert!(get_path(payload, "RequestId.Nested").is_none());
    }

    #[test]
    fn vendor_key_precedence() {
        let attr = AttributeSchema::new("data_guard_name", crate::schema::AttributeType::String);
        assert_eq!(vendor_key("data_guard_name", &attr, None), "DataGuardName");

        let attr = attr.with_provider_name("DataGuardGroupName");
        assert_eq!(
            vendor_key("data_guard_name", &attr, None),
            "DataGuardGroupName"
        );

        let rule = FieldRule::new().target("Name");
        assert_eq!(vendor_key("data_guard_name", &attr, Some(&rule)), "Name");
    }
}

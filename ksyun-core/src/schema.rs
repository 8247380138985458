//! Schema - Define type schemas for resources
//!
//! Every resource kind and data source declares its fields once through a
//! `ResourceSchema`. The schema drives validation before any vendor call and
//! is the descriptor table consulted by the request builder and the response
//! mapper.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered set; elements keep the order they were given in
    Set(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested block with its own fields (element type of list/set blocks)
    Block(Box<ResourceSchema>),
}

impl AttributeType {
    /// Shorthand for a list of nested blocks
    pub fn list_of_blocks(schema: ResourceSchema) -> Self {
        AttributeType::List(Box::new(AttributeType::Block(Box::new(schema))))
    }

    /// Shorthand for a set of nested blocks
    pub fn set_of_blocks(schema: ResourceSchema) -> Self {
        AttributeType::Set(Box::new(AttributeType::Block(Box::new(schema))))
    }

    /// Shorthand for a set of strings
    pub fn string_set() -> Self {
        AttributeType::Set(Box::new(AttributeType::String))
    }

    /// The type values are actually stored as, looking through `Custom`
    pub fn base(&self) -> &AttributeType {
        match self {
            AttributeType::Custom { base, .. } => base.base(),
            other => other,
        }
    }

    /// Element type for lists and sets
    pub fn element(&self) -> Option<&AttributeType> {
        match self.base() {
            AttributeType::List(inner) | AttributeType::Set(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.element().is_some()
    }

    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, validate, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(schema), Value::Map(map)) => {
                for (k, v) in map {
                    let attr = schema
                        .attributes
                        .get(k)
                        .ok_or_else(|| TypeError::UnknownAttribute { name: k.clone() })?;
                    attr.attr_type
                        .validate(v)
                        .map_err(|e| TypeError::MapValueError {
                            key: k.clone(),
                            inner: Box::new(e),
                        })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(schema) => format!("Block({})", schema.resource_type),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    NotSettable { name: String },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Settable by the user without being required
    pub optional: bool,
    /// Filled in by the vendor API
    pub computed: bool,
    /// Changing this attribute replaces the resource; it is never sent on update
    pub force_new: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Vendor-side parameter name when it does not follow the CamelCase convention
    pub provider_name: Option<String>,
}

impl AttributeSchema {
    /// New optional attribute
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            optional: true,
            computed: false,
            force_new: false,
            default: None,
            description: None,
            provider_name: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    /// Optional, but filled in by the vendor when not given
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Only ever filled in by the vendor
    pub fn read_only(mut self) -> Self {
        self.required = false;
        self.optional = false;
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// Whether the user may set this attribute
    pub fn is_settable(&self) -> bool {
        self.required || self.optional
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Attribute names in a stable order
    pub fn attribute_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.attributes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fill in schema defaults for attributes the user left out
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default
                && !attributes.contains_key(name)
            {
                attributes.insert(name.clone(), default.clone());
            }
        }
    }

    /// Validate user-supplied attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            match self.attributes.get(name) {
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
                Some(schema) if !schema.is_settable() => {
                    errors.push(TypeError::NotSettable { name: name.clone() })
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::AttributeError {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Enum over a fixed list of string values
    pub fn one_of(values: &[&str]) -> AttributeType {
        AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
    }

    /// Check that an integer lies in `min..=max`
    pub fn check_int_between(value: &Value, min: i64, max: i64) -> Result<(), String> {
        match value {
            Value::Int(n) if (min..=max).contains(n) => Ok(()),
            Value::Int(n) => Err(format!(
                "expected a value between {} and {}, got {}",
                min, max, n
            )),
            _ => Err("Expected integer".to_string()),
        }
    }

    /// Check that an integer is at least `min`
    pub fn check_int_at_least(value: &Value, min: i64) -> Result<(), String> {
        check_int_between(value, min, i64::MAX)
            .map_err(|_| format!("expected a value of at least {}", min))
    }

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| check_int_at_least(value, 1),
        }
    }

    /// 0/1 switch as used by the vendor's integer flags
    pub fn int_flag() -> AttributeType {
        AttributeType::Custom {
            name: "IntFlag".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| check_int_between(value, 0, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = types::one_of(&["avg", "min", "max"]);
        assert!(t.validate(&Value::String("avg".to_string())).is_ok());
        assert!(t.validate(&Value::String("sum".to_string())).is_err());
    }

    #[test]
    fn validate_int_flag() {
        let t = types::int_flag();
        assert!(t.validate(&Value::Int(0)).is_ok());
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(2)).is_err());
        assert!(t.validate(&Value::String("1".to_string())).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("ksyun_scaling_instance")
            .attribute(AttributeSchema::new("scaling_group_id", AttributeType::String).required())
            .attribute(AttributeSchema::new("protected_from_detach", types::int_flag()))
            .attribute(AttributeSchema::new("health_status", AttributeType::String).read_only());

        let mut attrs = HashMap::new();
        attrs.insert("scaling_group_id".to_string(), Value::from("541241314798505984"));
        attrs.insert("protected_from_detach".to_string(), Value::Int(1));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("health_status".to_string(), Value::from("Healthy"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::NotSettable { .. }));
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("ksyun_ssh_key")
            .attribute(AttributeSchema::new("key_name", AttributeType::String).required());

        let result = schema.validate(&HashMap::new());
        assert!(matches!(
            result.unwrap_err()[0],
            TypeError::MissingRequired { .. }
        ));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let schema = ResourceSchema::new("ksyun_ssh_key")
            .attribute(AttributeSchema::new("key_name", AttributeType::String));
        let attrs = HashMap::from([("colour".to_string(), Value::from("blue"))]);
        assert!(matches!(
            schema.validate(&attrs).unwrap_err()[0],
            TypeError::UnknownAttribute { .. }
        ));
    }

    #[test]
    fn nested_block_fields_are_checked() {
        let rule = ResourceSchema::new("rule")
            .attribute(AttributeSchema::new("cidr_block", AttributeType::String));
        let t = AttributeType::list_of_blocks(rule);

        let good = Value::List(vec![Value::Map(HashMap::from([(
            "cidr_block".to_string(),
            Value::from("10.0.0.0/16"),
        )]))]);
        assert!(t.validate(&good).is_ok());

        let bad = Value::List(vec![Value::Map(HashMap::from([(
            "cidr".to_string(),
            Value::from("10.0.0.0/16"),
        )]))]);
        assert!(t.validate(&bad).is_err());
    }

    #[test]
    fn defaults_fill_missing_attributes_only() {
        let schema = ResourceSchema::new("ksyun_scaling_policy")
            .attribute(AttributeSchema::new("threshold", AttributeType::Int).with_default(50))
            .attribute(AttributeSchema::new("period", AttributeType::Int).with_default(60));

        let mut attrs = HashMap::from([("threshold".to_string(), Value::Int(20))]);
        schema.apply_defaults(&mut attrs);
        assert_eq!(attrs.get("threshold"), Some(&Value::Int(20)));
        assert_eq!(attrs.get("period"), Some(&Value::Int(60)));
    }
}

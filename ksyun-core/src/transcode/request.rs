//! Request builder: schema + attribute values -> vendor request payload

use std::collections::HashMap;

use crate::case_convert::{indexed_key, nested_key, to_camel_case};
use crate::resource::Value;
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{EncodeContext, FieldRule, Indexing, MappingError, Payload, RuleSet, vendor_key};

/// Which lifecycle call the request is for
#[derive(Debug, Clone, Copy)]
pub enum RequestMode<'a> {
    Create,
    /// Only changed, updatable fields are sent
    Update { prior: &'a HashMap<String, Value> },
}

/// Build a vendor request payload from attribute values
///
/// Only user-settable schema fields are considered. In create mode missing
/// fields fall back to their schema default and a missing required field is
/// an error. In update mode force-new fields and fields equal to their prior
/// value are skipped unless their rule sets `force_include`.
pub fn build_request(
    schema: &ResourceSchema,
    values: &HashMap<String, Value>,
    mode: RequestMode<'_>,
    rules: &RuleSet,
) -> Result<Payload, MappingError> {
    let mut payload = Payload::new();
    let default_rule = FieldRule::default();

    for name in schema.attribute_names() {
        let Some(attr) = schema.get(name) else {
            continue;
        };
        if !attr.is_settable() {
            continue;
        }
        let rule = match rules.get(name) {
            Some(rule) => rule,
            None if rules.is_only() => continue,
            None => &default_rule,
        };
        if rule.ignore {
            continue;
        }

        let value = match (values.get(name), mode) {
            (Some(value), _) => value,
            (None, RequestMode::Create) => match &attr.default {
                Some(default) => default,
                None if attr.required => {
                    return Err(MappingError::MissingRequired {
                        field: name.to_string(),
                    });
                }
                None => continue,
            },
            (None, RequestMode::Update { .. }) => continue,
        };

        if let RequestMode::Update { prior } = mode
            && !rule.force_include
            && (attr.force_new || prior.get(name) == Some(value))
        {
            continue;
        }

        let key = vendor_key(name, attr, Some(rule));

        if let Some(encoder) = rule.encoder {
            let ctx = EncodeContext {
                field: name,
                value,
                key: &key,
                values,
            };
            encoder(&ctx, &mut payload).map_err(|message| MappingError::Encoder {
                field: name.to_string(),
                key: key.clone(),
                message,
            })?;
            continue;
        }

        write_value(&mut payload, name, attr, &key, value, rule.indexing)?;
    }

    Ok(payload)
}

/// Make sure the given keys are present, sending `0` for missing ones
///
/// Some vendor actions reject requests that omit these integer parameters,
/// even when the user never set them.
pub fn zero_fill(payload: &mut Payload, keys: &[&str]) {
    for key in keys {
        payload
            .entry(key.to_string())
            .or_insert_with(|| serde_json::Value::from(0));
    }
}

fn write_value(
    payload: &mut Payload,
    field: &str,
    attr: &AttributeSchema,
    key: &str,
    value: &Value,
    indexing: Indexing,
) -> Result<(), MappingError> {
    match value {
        Value::List(items) => match indexing {
            Indexing::CommaJoined => {
                let joined = items
                    .iter()
                    .map(|item| scalar_string(field, item))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(",");
                payload.insert(key.to_string(), serde_json::Value::String(joined));
            }
            Indexing::Plain | Indexing::Indexed => {
                let element = attr.attr_type.element();
                for (i, item) in items.iter().enumerate() {
                    write_element(payload, field, element, key, i + 1, item)?;
                }
            }
        },
        Value::Map(_) => {
            payload.insert(key.to_string(), value.to_json());
        }
        scalar => {
            let key = match indexing {
                Indexing::Indexed => indexed_key(key, 1),
                Indexing::Plain | Indexing::CommaJoined => key.to_string(),
            };
            payload.insert(key, scalar.to_json());
        }
    }
    Ok(())
}

fn write_element(
    payload: &mut Payload,
    field: &str,
    element: Option<&AttributeType>,
    key: &str,
    index: usize,
    item: &Value,
) -> Result<(), MappingError> {
    match item {
        Value::Map(block) => {
            let block_schema = match element.map(AttributeType::base) {
                Some(AttributeType::Block(schema)) => Some(schema.as_ref()),
                _ => None,
            };
            let mut names: Vec<&String> = block.keys().collect();
            names.sort_unstable();
            for name in names {
                let sub_key = block_schema
                    .and_then(|s| s.get(name))
                    .and_then(|a| a.provider_name.clone())
                    .unwrap_or_else(|| to_camel_case(name));
                let sub_value = &block[name];
                if matches!(sub_value, Value::List(_) | Value::Map(_)) {
                    return Err(MappingError::Unsupported {
                        field: field.to_string(),
                        message: format!("nested collection '{}' cannot be flattened", name),
                    });
                }
                payload.insert(nested_key(key, index, &sub_key), sub_value.to_json());
            }
        }
        Value::List(_) => {
            return Err(MappingError::Unsupported {
                field: field.to_string(),
                message: "nested lists cannot be flattened".to_string(),
            });
        }
        scalar => {
            payload.insert(indexed_key(key, index), scalar.to_json());
        }
    }
    Ok(())
}

fn scalar_string(field: &str, value: &Value) -> Result<String, MappingError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(f.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::List(_) | Value::Map(_) => Err(MappingError::Unsupported {
            field: field.to_string(),
            message: "only scalar values can be comma-joined".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types;
    use serde_json::json;

    fn scaling_instance_schema() -> ResourceSchema {
        ResourceSchema::new("ksyun_scaling_instance")
            .attribute(
                AttributeSchema::new("scaling_group_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("scaling_instance_id", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("protected_from_detach", types::int_flag()).required())
            .attribute(AttributeSchema::new("health_status", AttributeType::String).read_only())
    }

    fn values(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_writes_every_settable_field() {
        let values = values(&[
            ("scaling_group_id", Value::from("541241314798505984")),
            ("scaling_instance_id", Value::from("a4ef95c5")),
            ("protected_from_detach", Value::Int(1)),
        ]);
        let payload = build_request(
            &scaling_instance_schema(),
            &values,
            RequestMode::Create,
            &RuleSet::new(),
        )
        .unwrap();

        assert_eq!(payload.len(), 3);
        assert_eq!(payload["ScalingGroupId"], json!("541241314798505984"));
        assert_eq!(payload["ScalingInstanceId"], json!("a4ef95c5"));
        assert_eq!(payload["ProtectedFromDetach"], json!(1));
    }

    #[test]
    fn missing_required_field_fails_on_create() {
        let values = values(&[("scaling_group_id", Value::from("541241314798505984"))]);
        let err = build_request(
            &scaling_instance_schema(),
            &values,
            RequestMode::Create,
            &RuleSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, MappingError::MissingRequired { .. }));
    }

    #[test]
    fn only_rules_restrict_fields_and_index_scalars() {
        let values = values(&[
            ("scaling_group_id", Value::from("group-1")),
            ("scaling_instance_id", Value::from("instance-1")),
            ("protected_from_detach", Value::Int(1)),
        ]);
        let rules = RuleSet::only()
            .field("scaling_group_id")
            .rule("scaling_instance_id", FieldRule::new().indexed());
        let payload = build_request(
            &scaling_instance_schema(),
            &values,
            RequestMode::Create,
            &rules,
        )
        .unwrap();

        assert_eq!(payload.len(), 2);
        assert_eq!(payload["ScalingGroupId"], json!("group-1"));
        assert_eq!(payload["ScalingInstanceId.1"], json!("instance-1"));
    }

    #[test]
    fn update_skips_force_new_and_unchanged_fields() {
        let schema = scaling_instance_schema()
            .attribute(AttributeSchema::new("description", AttributeType::String));
        let prior = values(&[
            ("scaling_group_id", Value::from("group-1")),
            ("scaling_instance_id", Value::from("instance-1")),
            ("protected_from_detach", Value::Int(0)),
            ("description", Value::from("same")),
        ]);
        let desired = values(&[
            ("scaling_group_id", Value::from("group-2")),
            ("scaling_instance_id", Value::from("instance-1")),
            ("protected_from_detach", Value::Int(1)),
            ("description", Value::from("same")),
        ]);

        let payload = build_request(
            &schema,
            &desired,
            RequestMode::Update { prior: &prior },
            &RuleSet::new(),
        )
        .unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["ProtectedFromDetach"], json!(1));

        let rules = RuleSet::new()
            .rule("scaling_group_id", FieldRule::new().force_include())
            .rule(
                "scaling_instance_id",
                FieldRule::new().force_include().indexed(),
            );
        let payload = build_request(
            &schema,
            &desired,
            RequestMode::Update { prior: &prior },
            &rules,
        )
        .unwrap();
        assert_eq!(payload["ScalingGroupId"], json!("group-2"));
        assert_eq!(payload["ScalingInstanceId.1"], json!("instance-1"));
        assert!(!payload.contains_key("Description"));
    }

    #[test]
    fn ignored_fields_are_never_sent() {
        let values = values(&[
            ("scaling_group_id", Value::from("group-1")),
            ("scaling_instance_id", Value::from("instance-1")),
            ("protected_from_detach", Value::Int(1)),
        ]);
        let rules = RuleSet::new().rule("protected_from_detach", FieldRule::new().ignore());
        let payload = build_request(
            &scaling_instance_schema(),
            &values,
            RequestMode::Create,
            &rules,
        )
        .unwrap();
        assert!(!payload.contains_key("ProtectedFromDetach"));
    }

    #[test]
    fn lists_expand_into_indexed_keys_in_order() {
        let schema = ResourceSchema::new("ksyun_bare_metal")
            .attribute(AttributeSchema::new("security_group_ids", AttributeType::string_set()))
            .attribute(AttributeSchema::new(
                "data_disk_catalogue",
                AttributeType::List(Box::new(AttributeType::String)),
            ));
        let values = values(&[
            (
                "security_group_ids",
                Value::List(vec![Value::from("sg-b"), Value::from("sg-a")]),
            ),
            (
                "data_disk_catalogue",
                Value::List(vec![Value::from("/data"), Value::from("/logs")]),
            ),
        ]);
        let rules = RuleSet::new()
            .rule(
                "security_group_ids",
                FieldRule::new().target("SecurityGroupId"),
            )
            .rule("data_disk_catalogue", FieldRule::new().comma_joined());
        let payload = build_request(&schema, &values, RequestMode::Create, &rules).unwrap();

        assert_eq!(payload["SecurityGroupId.1"], json!("sg-b"));
        assert_eq!(payload["SecurityGroupId.2"], json!("sg-a"));
        assert_eq!(payload["DataDiskCatalogue"], json!("/data,/logs"));
    }

    #[test]
    fn blocks_expand_into_nested_keys() {
        let filter = ResourceSchema::new("filter")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(AttributeSchema::new("mode", AttributeType::String));
        let schema = ResourceSchema::new("test")
            .attribute(AttributeSchema::new("filters", AttributeType::list_of_blocks(filter)));
        let block = Value::Map(HashMap::from([
            ("name".to_string(), Value::from("vpc-id")),
            ("mode".to_string(), Value::from("exact")),
        ]));
        let values = values(&[("filters", Value::List(vec![block]))]);

        let payload =
            build_request(&schema, &values, RequestMode::Create, &RuleSet::new()).unwrap();
        assert_eq!(payload["Filters.1.Name"], json!("vpc-id"));
        assert_eq!(payload["Filters.1.Mode"], json!("exact"));
    }

    #[test]
    fn encoder_owns_its_keys_and_errors_carry_field() {
        fn notification_types(
            ctx: &EncodeContext<'_>,
            payload: &mut Payload,
        ) -> Result<(), String> {
            let items = ctx.value.as_list().ok_or("expected a set")?;
            for (i, item) in items.iter().enumerate() {
                payload.insert(format!("{}{}", ctx.key, i + 1), item.to_json());
            }
            Ok(())
        }
        fn failing(_: &EncodeContext<'_>, _: &mut Payload) -> Result<(), String> {
            Err("boom".to_string())
        }

        let schema = ResourceSchema::new("ksyun_scaling_notification").attribute(
            AttributeSchema::new("scaling_notification_types", AttributeType::string_set())
                .required(),
        );
        let values = values(&[(
            "scaling_notification_types",
            Value::List(vec![Value::from("1"), Value::from("3")]),
        )]);

        let rules = RuleSet::new().rule(
            "scaling_notification_types",
            FieldRule::new()
                .target("NotificationType.")
                .encode_with(notification_types),
        );
        let payload = build_request(&schema, &values, RequestMode::Create, &rules).unwrap();
        assert_eq!(payload["NotificationType.1"], json!("1"));
        assert_eq!(payload["NotificationType.2"], json!("3"));

        let rules = RuleSet::new().rule(
            "scaling_notification_types",
            FieldRule::new().encode_with(failing),
        );
        let err = build_request(&schema, &values, RequestMode::Create, &rules).unwrap_err();
        assert_eq!(err.field(), "scaling_notification_types");
    }

    #[test]
    fn zero_fill_keeps_existing_values() {
        let mut payload = Payload::new();
        payload.insert("ReadjustMaxSize".to_string(), json!(3));
        zero_fill(&mut payload, &["ReadjustMaxSize", "ReadjustMinSize"]);
        assert_eq!(payload["ReadjustMaxSize"], json!(3));
        assert_eq!(payload["ReadjustMinSize"], json!(0));
    }
}

//! Scaling policy of a scaling group
//!
//! The six alarm settings are separate attributes but travel to the vendor as
//! one JSON-encoded `Metric` parameter with lower-camel keys. Describe calls
//! return `Metric` as an object or as a JSON string.

use async_trait::async_trait;
use ksyun_core::identifier::CompositeId;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use ksyun_core::transcode::{
    EncodeContext, FieldRule, MappingError, Payload, RequestMode, RuleSet, apply_response,
    build_request, zero_fill,
};
use serde::Serialize;

use super::{
    Attributes, Created, ResourceHandler, describe_first, member_import, member_request,
    required_str, returned_id, set_member_ids,
};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_scaling_policy";

const DIMENSION_NAMES: &[&str] = &[
    "cpu_usage",
    "mem_usage",
    "net_outtraffic",
    "net_intraffic",
    "listener_outtraffic",
    "listener_intraffic",
];

const FUNCTIONS: &[&str] = &["avg", "min", "max"];

const COMPARISON_OPERATORS: &[&str] = &[
    "Greater",
    "EqualOrGreater",
    "Less",
    "EqualOrLess",
    "Equal",
    "NotEqual",
];

const ADJUSTMENT_TYPES: &[&str] = &[
    "TotalCapacity",
    "QuantityChangeInCapacity",
    "PercentChangeInCapacity",
];

/// Attributes folded into `Metric`, with their keys inside it
const METRIC_FIELDS: &[(&str, &str)] = &[
    ("comparison_operator", "comparisonOperator"),
    ("dimension_name", "dimensionName"),
    ("threshold", "threshold"),
    ("repeat_times", "repeatTimes"),
    ("function", "function"),
    ("period", "period"),
];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Alarm-driven scaling policy")
        .attribute(
            AttributeSchema::new("scaling_group_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("scaling_policy_name", AttributeType::String)
                .with_default("tf-scaling-policy"),
        )
        .attribute(
            AttributeSchema::new("dimension_name", types::one_of(DIMENSION_NAMES))
                .with_default("cpu_usage"),
        )
        .attribute(
            AttributeSchema::new("comparison_operator", types::one_of(COMPARISON_OPERATORS))
                .with_default("Greater"),
        )
        .attribute(AttributeSchema::new("threshold", AttributeType::Int).with_default(50))
        .attribute(
            AttributeSchema::new(
                "repeat_times",
                AttributeType::Custom {
                    name: "RepeatTimes".to_string(),
                    base: Box::new(AttributeType::Int),
                    validate: |value| types::check_int_between(value, 1, 10),
                },
            )
            .with_default(3),
        )
        .attribute(
            AttributeSchema::new(
                "period",
                AttributeType::Custom {
                    name: "Period".to_string(),
                    base: Box::new(AttributeType::Int),
                    validate: |value| types::check_int_between(value, 60, 999_999),
                },
            )
            .with_default(60)
            .with_description("Seconds, at least 60"),
        )
        .attribute(AttributeSchema::new("function", types::one_of(FUNCTIONS)).with_default("avg"))
        .attribute(
            AttributeSchema::new("adjustment_type", types::one_of(ADJUSTMENT_TYPES))
                .with_default("QuantityChangeInCapacity"),
        )
        .attribute(
            AttributeSchema::new("adjustment_value", AttributeType::Int)
                .with_default(1)
                .with_description("Between -100 and 100"),
        )
        .attribute(
            AttributeSchema::new(
                "cool_down",
                AttributeType::Custom {
                    name: "CoolDown".to_string(),
                    base: Box::new(AttributeType::Int),
                    validate: |value| types::check_int_at_least(value, 60),
                },
            )
            .with_default(60),
        )
        .attribute(AttributeSchema::new("create_time", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("scaling_policy_id", AttributeType::String).read_only())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Metric<'a> {
    comparison_operator: Option<&'a str>,
    dimension_name: Option<&'a str>,
    threshold: Option<i64>,
    repeat_times: Option<i64>,
    function: Option<&'a str>,
    period: Option<i64>,
}

impl<'a> Metric<'a> {
    fn from_values(values: &'a Attributes) -> Self {
        let text = move |field: &str| values.get(field).and_then(Value::as_str);
        let number = move |field: &str| values.get(field).and_then(Value::as_int);
        Self {
            comparison_operator: text("comparison_operator"),
            dimension_name: text("dimension_name"),
            threshold: number("threshold"),
            repeat_times: number("repeat_times"),
            function: text("function"),
            period: number("period"),
        }
    }
}

/// Writes `Metric` once, from all six alarm settings
fn encode_metric(ctx: &EncodeContext<'_>, payload: &mut Payload) -> Result<(), String> {
    if payload.contains_key(ctx.key) {
        return Ok(());
    }
    let encoded =
        serde_json::to_string(&Metric::from_values(ctx.values)).map_err(|e| e.to_string())?;
    payload.insert(ctx.key.to_string(), serde_json::Value::String(encoded));
    Ok(())
}

fn request_rules() -> RuleSet {
    METRIC_FIELDS.iter().fold(RuleSet::new(), |rules, (field, _)| {
        rules.rule(*field, FieldRule::new().target("Metric").encode_with(encode_metric))
    })
}

fn metric_rules() -> RuleSet {
    METRIC_FIELDS.iter().fold(RuleSet::new(), |rules, (field, key)| {
        rules.rule(*field, FieldRule::new().target(*key))
    })
}

/// `Metric` of a described policy, whichever way it was encoded
fn described_metric(item: &Payload) -> Result<Option<Payload>, MappingError> {
    match item.get("Metric") {
        Some(serde_json::Value::Object(metric)) => Ok(Some(metric.clone())),
        Some(serde_json::Value::String(encoded)) if !encoded.is_empty() => {
            serde_json::from_str(encoded)
                .map(Some)
                .map_err(|e| MappingError::Decoder {
                    field: "dimension_name".to_string(),
                    key: "Metric".to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}

pub struct ScalingPolicy;

#[async_trait]
impl ResourceHandler for ScalingPolicy {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let mut request = build_request(&schema(), values, RequestMode::Create, &request_rules())?;
        // Vendor-mandated: CreateScalingPolicy requires AdjustmentValue.
        zero_fill(&mut request, &["AdjustmentValue"]);

        let response = ctx
            .call(Service::Kec, "CreateScalingPolicy", &request)
            .await?;
        let policy_id = returned_id(
            &response,
            "ReturnSet.ScalingPolicyId",
            "CreateScalingPolicy",
        )?;
        let id = CompositeId::new(policy_id, required_str(values, "scaling_group_id")?);
        Ok(Created::new(id.to_string()))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingPolicyId.1");
        let Some(item) = describe_first(
            ctx,
            Service::Kec,
            "DescribeScalingPolicy",
            &request,
            "ScalingPolicySet",
        )
        .await?
        else {
            return Ok(None);
        };

        let schema = schema();
        let mut attributes = base.clone();
        apply_response(&schema, &item, &RuleSet::new(), &mut attributes)?;
        if let Some(metric) = described_metric(&item)? {
            apply_response(&schema, &metric, &metric_rules(), &mut attributes)?;
        }
        set_member_ids(&mut attributes, &id, "scaling_policy_id");
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> ProviderResult<()> {
        let id = CompositeId::parse(identifier)?;
        let mut request = build_request(
            &schema(),
            desired,
            RequestMode::Update { prior },
            &request_rules(),
        )?;
        if request.is_empty() {
            return Ok(());
        }
        request.extend(member_request(&id, "ScalingPolicyId"));
        ctx.call(Service::Kec, "ModifyScalingPolicy", &request)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingPolicyId");
        ctx.delete_with_retry(
            RetryPolicy::DEFAULT,
            Service::Kec,
            "DeleteScalingPolicy",
            &request,
        )
        .await?;
        Ok(())
    }

    fn import_identifier(&self, import_id: &str) -> ProviderResult<String> {
        member_import(import_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults_with(pairs: &[(&str, Value)]) -> Attributes {
        let mut values: Attributes = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        schema().apply_defaults(&mut values);
        values
    }

    #[test]
    fn metric_settings_collapse_into_one_json_parameter() {
        let values = defaults_with(&[
            ("scaling_group_id", Value::from("541241314798505984")),
            ("threshold", Value::Int(20)),
        ]);
        let request =
            build_request(&schema(), &values, RequestMode::Create, &request_rules()).unwrap();

        let metric: serde_json::Value =
            serde_json::from_str(request["Metric"].as_str().unwrap()).unwrap();
        assert_eq!(
            metric,
            json!({
                "comparisonOperator": "Greater",
                "dimensionName": "cpu_usage",
                "threshold": 20,
                "repeatTimes": 3,
                "function": "avg",
                "period": 60,
            })
        );
        assert!(!request.contains_key("Threshold"));
        assert_eq!(request["ScalingPolicyName"], json!("tf-scaling-policy"));
        assert_eq!(request["AdjustmentType"], json!("QuantityChangeInCapacity"));
    }

    #[test]
    fn changing_one_alarm_setting_resends_the_whole_metric() {
        let prior = defaults_with(&[("scaling_group_id", Value::from("g"))]);
        let mut desired = prior.clone();
        desired.insert("period".to_string(), Value::Int(120));

        let request = build_request(
            &schema(),
            &desired,
            RequestMode::Update { prior: &prior },
            &request_rules(),
        )
        .unwrap();
        assert_eq!(request.len(), 1);
        let metric: serde_json::Value =
            serde_json::from_str(request["Metric"].as_str().unwrap()).unwrap();
        assert_eq!(metric["period"], json!(120));
        assert_eq!(metric["threshold"], json!(50));
    }

    #[test]
    fn described_metric_accepts_object_or_string() {
        let object = json!({"Metric": {"threshold": 30}});
        let metric = described_metric(object.as_object().unwrap()).unwrap().unwrap();
        assert_eq!(metric["threshold"], json!(30));

        let string = json!({"Metric": "{\"repeatTimes\":5}"});
        let metric = described_metric(string.as_object().unwrap()).unwrap().unwrap();
        assert_eq!(metric["repeatTimes"], json!(5));

        let broken = json!({"Metric": "{not json"});
        assert!(described_metric(broken.as_object().unwrap()).is_err());

        let absent = json!({});
        assert!(described_metric(absent.as_object().unwrap()).unwrap().is_none());
    }

    #[test]
    fn metric_keys_map_back_onto_attributes() {
        let metric = json!({
            "comparisonOperator": "Less",
            "dimensionName": "mem_usage",
            "threshold": "35",
            "repeatTimes": 2,
            "function": "max",
            "period": 300,
        });
        let mut attributes = Attributes::new();
        apply_response(
            &schema(),
            metric.as_object().unwrap(),
            &metric_rules(),
            &mut attributes,
        )
        .unwrap();
        assert_eq!(attributes["comparison_operator"], Value::from("Less"));
        assert_eq!(attributes["dimension_name"], Value::from("mem_usage"));
        assert_eq!(attributes["threshold"], Value::Int(35));
        assert_eq!(attributes["repeat_times"], Value::Int(2));
        assert_eq!(attributes["function"], Value::from("max"));
        assert_eq!(attributes["period"], Value::Int(300));
    }

    #[test]
    fn alarm_ranges_are_validated() {
        let mut values = defaults_with(&[("scaling_group_id", Value::from("g"))]);
        assert!(schema().validate(&values).is_ok());

        values.insert("repeat_times".to_string(), Value::Int(11));
        assert!(schema().validate(&values).is_err());

        values.insert("repeat_times".to_string(), Value::Int(10));
        values.insert("cool_down".to_string(), Value::Int(59));
        assert!(schema().validate(&values).is_err());

        values.insert("cool_down".to_string(), Value::Int(60));
        values.insert("function".to_string(), Value::from("sum"));
        assert!(schema().validate(&values).is_err());
    }
}

//! `ksyun_krds_security_groups`: KRDS security groups with their members and rules

use async_trait::async_trait;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{Payload, RuleSet};

use super::{DataSourceHandler, Listing, common_attributes, map_items, objects_at};
use crate::client::{Context, Service};
use crate::resources::Attributes;

pub const DATA_SOURCE_TYPE: &str = "ksyun_krds_security_groups";

fn instance_schema() -> ResourceSchema {
    ResourceSchema::new("krds_instance")
        .attribute(
            AttributeSchema::new("db_instance_identifier", AttributeType::String)
                .read_only()
                .with_provider_name("DBInstanceIdentifier"),
        )
        .attribute(
            AttributeSchema::new("db_instance_name", AttributeType::String)
                .read_only()
                .with_provider_name("DBInstanceName"),
        )
        .attribute(
            AttributeSchema::new("db_instance_type", AttributeType::String)
                .read_only()
                .with_provider_name("DBInstanceType"),
        )
        .attribute(AttributeSchema::new("vip", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("created", AttributeType::String).read_only())
}

fn rule_schema() -> ResourceSchema {
    ResourceSchema::new("krds_security_group_rule")
        .attribute(
            AttributeSchema::new("security_group_rule_id", AttributeType::String).read_only(),
        )
        .attribute(
            AttributeSchema::new("security_group_rule_name", AttributeType::String).read_only(),
        )
        .attribute(
            AttributeSchema::new("security_group_rule_protocol", AttributeType::String)
                .read_only(),
        )
        .attribute(AttributeSchema::new("created", AttributeType::String).read_only())
}

fn item_schema() -> ResourceSchema {
    ResourceSchema::new("krds_security_group")
        .attribute(AttributeSchema::new("security_group_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("security_group_name", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("security_group_description", AttributeType::String).read_only(),
        )
        .attribute(AttributeSchema::new("created", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("instances", AttributeType::set_of_blocks(instance_schema()))
                .read_only(),
        )
        .attribute(
            AttributeSchema::new(
                "security_group_rules",
                AttributeType::set_of_blocks(rule_schema()),
            )
            .read_only(),
        )
}

pub fn schema() -> ResourceSchema {
    common_attributes(
        ResourceSchema::new(DATA_SOURCE_TYPE)
            .attribute(AttributeSchema::new("security_group_id", AttributeType::Int))
            .attribute(
                AttributeSchema::new(
                    "security_groups",
                    AttributeType::list_of_blocks(item_schema()),
                )
                .read_only(),
            ),
    )
    // Results are only reachable through the file here
    .attribute(AttributeSchema::new("output_file", AttributeType::String).required())
}

/// The filter is an integer in configuration and a string on the wire
fn request(filters: &Attributes) -> Payload {
    let mut request = Payload::new();
    if let Some(id) = filters.get("security_group_id").and_then(Value::as_int) {
        request.insert("SecurityGroupId".to_string(), id.to_string().into());
    }
    request
}

/// Map the `Data.SecurityGroups` list of a DescribeSecurityGroup response
fn map_response(response: &Payload) -> ProviderResult<Listing> {
    map_items(
        &item_schema(),
        &RuleSet::new(),
        &objects_at(response, "Data.SecurityGroups"),
        "SecurityGroupId",
    )
}

pub struct KrdsSecurityGroups;

#[async_trait]
impl DataSourceHandler for KrdsSecurityGroups {
    fn data_source_type(&self) -> &'static str {
        DATA_SOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn result_field(&self) -> &'static str {
        "security_groups"
    }

    async fn list(&self, ctx: Context<'_>, filters: &Attributes) -> ProviderResult<Listing> {
        let response = ctx
            .call_with_retry(
                RetryPolicy::READ,
                Service::Krds,
                "DescribeSecurityGroup",
                &request(filters),
            )
            .await?;
        map_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_id_goes_out_as_string() {
        let filters = Attributes::from([("security_group_id".to_string(), Value::Int(123))]);
        assert_eq!(request(&filters)["SecurityGroupId"], json!("123"));
        assert!(request(&Attributes::new()).is_empty());
    }

    #[test]
    fn output_file_is_required() {
        assert!(schema().validate(&Attributes::new()).is_err());
        let filters = Attributes::from([("output_file".to_string(), Value::from("groups.json"))]);
        assert!(schema().validate(&filters).is_ok());
    }

    #[test]
    fn nested_rules_and_instances_keep_order_and_values() {
        let response = json!({
            "Data": {
                "SecurityGroups": [{
                    "SecurityGroupId": "123",
                    "SecurityGroupName": "default",
                    "Instances": [{
                        "DBInstanceIdentifier": "db-1",
                        "DBInstanceName": "orders",
                        "Vip": "10.0.0.8"
                    }],
                    "SecurityGroupRules": [
                        {"SecurityGroupRuleId": "r-1", "SecurityGroupRuleName": "office"},
                        {"SecurityGroupRuleId": "r-2", "SecurityGroupRuleName": "vpn"}
                    ]
                }]
            }
        });
        let listing = map_response(response.as_object().unwrap()).unwrap();
        assert_eq!(listing.ids, vec!["123"]);

        let group = listing.items[0].as_map().unwrap();
        let rules = group["security_group_rules"].as_list().unwrap();
        assert_eq!(rules.len(), 2);
        let first = rules[0].as_map().unwrap();
        assert_eq!(first["security_group_rule_id"], Value::from("r-1"));
        assert_eq!(first["security_group_rule_name"], Value::from("office"));
        let second = rules[1].as_map().unwrap();
        assert_eq!(second["security_group_rule_id"], Value::from("r-2"));
        assert_eq!(second["security_group_rule_name"], Value::from("vpn"));

        let instance = group["instances"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(instance["db_instance_identifier"], Value::from("db-1"));
        assert_eq!(instance["vip"], Value::from("10.0.0.8"));
    }
}

//! `ksyun_knads`: KNAD instances of the account

use async_trait::async_trait;
use ksyun_core::provider::ProviderResult;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{FieldRule, RequestMode, RuleSet, build_request, items_in_set};

use super::{DataSourceHandler, Listing, common_attributes, map_items, name_filter, name_regex};
use crate::client::{Context, Service};
use crate::resources::Attributes;

pub const DATA_SOURCE_TYPE: &str = "ksyun_knads";

fn item_schema() -> ResourceSchema {
    ResourceSchema::new("knad")
        .attribute(AttributeSchema::new("id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("knad_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("knad_name", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("service_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("project_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("link_type", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("ip_count", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("band", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("max_band", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("idc_band", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("bill_type", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("state", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("expire_time", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("create_time", AttributeType::String).read_only())
}

pub fn schema() -> ResourceSchema {
    common_attributes(
        ResourceSchema::new(DATA_SOURCE_TYPE)
            .attribute(AttributeSchema::new("ids", AttributeType::string_set()))
            .attribute(AttributeSchema::new("project_ids", AttributeType::string_set()))
            .attribute(AttributeSchema::new("service_id", AttributeType::String))
            .attribute(AttributeSchema::new("name_regex", name_regex()))
            .attribute(
                AttributeSchema::new("knads", AttributeType::list_of_blocks(item_schema()))
                    .read_only(),
            ),
    )
}

fn request_rules() -> RuleSet {
    RuleSet::new()
        .rule("ids", FieldRule::new().target("KnadId"))
        .rule("project_ids", FieldRule::new().target("ProjectId"))
        .rule("name_regex", FieldRule::new().ignore())
        .rule("output_file", FieldRule::new().ignore())
}

pub struct Knads;

#[async_trait]
impl DataSourceHandler for Knads {
    fn data_source_type(&self) -> &'static str {
        DATA_SOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn result_field(&self) -> &'static str {
        "knads"
    }

    async fn list(&self, ctx: Context<'_>, filters: &Attributes) -> ProviderResult<Listing> {
        let request = build_request(&schema(), filters, RequestMode::Create, &request_rules())?;
        let response = ctx
            .call_with_retry(RetryPolicy::READ, Service::Knad, "DescribeKnad", &request)
            .await?;

        let item_rules = RuleSet::new().rule("id", FieldRule::new().target("KnadId"));
        let mut listing = map_items(
            &item_schema(),
            &item_rules,
            &items_in_set(&response, "KnadSet"),
            "KnadId",
        )?;
        if let Some(pattern) = name_filter(filters)? {
            listing.retain_matching(&pattern, "knad_name");
        }
        Ok(listing)
    }
}

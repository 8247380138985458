//! `ksyun_redis_security_groups`: Redis security groups of the region
//!
//! The list is paged with `Limit`/`Offset`; a page shorter than the limit is
//! the last one. Groups are listed per zone named in `available_zones`.
//! Without it a single region-wide listing is made, and the zones are not
//! discovered, so groups the vendor only returns for a named zone are missing.

use async_trait::async_trait;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{Payload, RuleSet};
use log::debug;

use super::{DataSourceHandler, Listing, common_attributes, map_items, objects_at};
use crate::client::{Context, Service};
use crate::resources::Attributes;

pub const DATA_SOURCE_TYPE: &str = "ksyun_redis_security_groups";

const PAGE_SIZE: usize = 100;

fn item_schema() -> ResourceSchema {
    ResourceSchema::new("redis_security_group")
        .attribute(
            AttributeSchema::new("security_group_id", AttributeType::String)
                .read_only()
                .with_provider_name("securityGroupId"),
        )
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .read_only()
                .with_provider_name("name"),
        )
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .read_only()
                .with_provider_name("description"),
        )
        .attribute(
            AttributeSchema::new("created", AttributeType::String)
                .read_only()
                .with_provider_name("created"),
        )
        .attribute(
            AttributeSchema::new("updated", AttributeType::String)
                .read_only()
                .with_provider_name("updated"),
        )
}

pub fn schema() -> ResourceSchema {
    common_attributes(
        ResourceSchema::new(DATA_SOURCE_TYPE)
            .attribute(
                AttributeSchema::new("available_zones", AttributeType::string_set())
                    .with_description("Zones to list; the region as a whole when unset"),
            )
            .attribute(
                AttributeSchema::new("instances", AttributeType::list_of_blocks(item_schema()))
                    .read_only(),
            ),
    )
}

/// Zones to page through; `None` stands for the region-wide listing
fn zones(filters: &Attributes) -> Vec<Option<String>> {
    let named: Vec<Option<String>> = filters
        .get("available_zones")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .map(|zone| Some(zone.to_string()))
        .collect();
    if named.is_empty() { vec![None] } else { named }
}

fn page_request(zone: Option<&str>, offset: usize) -> Payload {
    let mut request = Payload::new();
    if let Some(zone) = zone {
        request.insert("AvailableZone".to_string(), zone.into());
    }
    request.insert("Limit".to_string(), PAGE_SIZE.to_string().into());
    if offset > 0 {
        request.insert("Offset".to_string(), offset.to_string().into());
    }
    request
}

pub struct RedisSecurityGroups;

#[async_trait]
impl DataSourceHandler for RedisSecurityGroups {
    fn data_source_type(&self) -> &'static str {
        DATA_SOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn result_field(&self) -> &'static str {
        "instances"
    }

    async fn list(&self, ctx: Context<'_>, filters: &Attributes) -> ProviderResult<Listing> {
        let mut listing = Listing::default();
        for zone in zones(filters) {
            let zone = zone.as_deref();
            let mut offset = 0;
            loop {
                let response = ctx
                    .call_with_retry(
                        RetryPolicy::READ,
                        Service::Kcs,
                        "DescribeSecurityGroups",
                        &page_request(zone, offset),
                    )
                    .await?;
                let page = objects_at(&response, "Data.list");
                debug!(
                    "security group page in {} at offset {}: {} item(s)",
                    zone.unwrap_or("region"),
                    offset,
                    page.len()
                );

                let mapped = map_items(&item_schema(), &RuleSet::new(), &page, "securityGroupId")?;
                listing.items.extend(mapped.items);
                listing.ids.extend(mapped.ids);

                if page.len() < PAGE_SIZE {
                    break;
                }
                offset += PAGE_SIZE;
            }
        }
        Ok(listing)
    }
}

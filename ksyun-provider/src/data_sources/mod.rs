//! Data source definitions and handlers
//!
//! A data source turns its filter attributes into one describe call (or a
//! paginated series of them), maps every returned object through a block
//! schema and stores the result list together with `total_count`. The state
//! identifier is derived from the result ids so that it is stable across runs.

pub mod knads;
pub mod krds_security_groups;
pub mod redis_security_groups;
pub mod vpn_tunnels;

use std::path::Path;

use async_trait::async_trait;
use ksyun_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceType};
use ksyun_core::resource::Value;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{Payload, RuleSet, apply_response, get_path, get_path_str};
use log::{debug, info};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::client::Context;
use crate::resources::Attributes;

/// Mapped result of a data source query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    /// One block per returned object
    pub items: Vec<Value>,
    /// Vendor id of each item, empty when the object carries none
    pub ids: Vec<String>,
}

impl Listing {
    /// Keep only the items whose `name_field` matches `pattern`
    pub fn retain_matching(&mut self, pattern: &Regex, name_field: &str) {
        let keep: Vec<bool> = self
            .items
            .iter()
            .map(|item| {
                item.as_map()
                    .and_then(|block| block.get(name_field))
                    .and_then(Value::as_str)
                    .is_some_and(|name| pattern.is_match(name))
            })
            .collect();
        let mut flags = keep.iter();
        self.items.retain(|_| flags.next().copied().unwrap_or(false));
        let mut flags = keep.iter();
        self.ids.retain(|_| flags.next().copied().unwrap_or(false));
    }
}

#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn data_source_type(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Attribute receiving the result list
    fn result_field(&self) -> &'static str;

    /// Query the vendor with the given filters
    async fn list(&self, ctx: Context<'_>, filters: &Attributes) -> ProviderResult<Listing>;
}

macro_rules! define_data_source_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $module::DATA_SOURCE_TYPE
            }
            fn schema(&self) -> ResourceSchema {
                $module::schema()
            }
            fn is_data_source(&self) -> bool {
                true
            }
        }
    };
}

define_data_source_type!(KnadsType, knads);
define_data_source_type!(VpnTunnelsType, vpn_tunnels);
define_data_source_type!(KrdsSecurityGroupsType, krds_security_groups);
define_data_source_type!(RedisSecurityGroupsType, redis_security_groups);

/// Returns all data sources supported by this provider
pub fn data_source_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(KnadsType),
        Box::new(VpnTunnelsType),
        Box::new(KrdsSecurityGroupsType),
        Box::new(RedisSecurityGroupsType),
    ]
}

/// Handler for a data source name
pub fn handler(data_source_type: &str) -> Option<&'static dyn DataSourceHandler> {
    let handler: &'static dyn DataSourceHandler = match data_source_type {
        knads::DATA_SOURCE_TYPE => &knads::Knads,
        vpn_tunnels::DATA_SOURCE_TYPE => &vpn_tunnels::VpnTunnels,
        krds_security_groups::DATA_SOURCE_TYPE => &krds_security_groups::KrdsSecurityGroups,
        redis_security_groups::DATA_SOURCE_TYPE => &redis_security_groups::RedisSecurityGroups,
        _ => return None,
    };
    Some(handler)
}

/// Run a data source and assemble its state
///
/// Returns the state identifier and the attributes: the filters as given,
/// the result list and `total_count`. With `output_file` set the result list
/// is also written there as pretty-printed JSON.
pub async fn evaluate(
    handler: &dyn DataSourceHandler,
    ctx: Context<'_>,
    filters: &Attributes,
) -> ProviderResult<(String, Attributes)> {
    let listing = handler.list(ctx, filters).await?;
    info!(
        "{} returned {} item(s)",
        handler.data_source_type(),
        listing.items.len()
    );

    let identifier = listing_id(&listing.ids);
    let total = i64::try_from(listing.items.len()).unwrap_or(i64::MAX);

    if let Some(path) = filters.get("output_file").and_then(Value::as_str) {
        write_output(Path::new(path), &listing.items).await?;
    }

    let mut attributes = filters.clone();
    attributes.insert("total_count".to_string(), Value::Int(total));
    attributes.insert(handler.result_field().to_string(), Value::List(listing.items));
    Ok((identifier, attributes))
}

/// Hex SHA-256 over the sorted ids
pub fn listing_id(ids: &[String]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    hex::encode(Sha256::digest(sorted.join(",").as_bytes()))
}

async fn write_output(path: &Path, items: &[Value]) -> ProviderResult<()> {
    let json = serde_json::Value::Array(items.iter().map(Value::to_json).collect());
    let content = serde_json::to_string_pretty(&json).map_err(|e| {
        ProviderError::new(ErrorKind::Fatal, "Failed to serialize output_file").with_cause(e)
    })?;
    tokio::fs::write(path, content).await.map_err(|e| {
        ProviderError::new(
            ErrorKind::Fatal,
            format!("Failed to write output_file {}", path.display()),
        )
        .with_cause(e)
    })?;
    debug!("wrote {} item(s) to {}", items.len(), path.display());
    Ok(())
}

// =============================================================================
// Shared helpers
// =============================================================================

/// `output_file` and `total_count`, common to all data sources
pub(crate) fn common_attributes(schema: ResourceSchema) -> ResourceSchema {
    schema
        .attribute(
            AttributeSchema::new("output_file", AttributeType::String)
                .with_description("File to receive the result list as JSON"),
        )
        .attribute(AttributeSchema::new("total_count", AttributeType::Int).read_only())
}

/// String that must compile as a regular expression
pub(crate) fn name_regex() -> AttributeType {
    AttributeType::Custom {
        name: "Regex".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(pattern) => Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| format!("invalid regular expression: {}", e)),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// Compiled `name_regex` filter, if set
pub(crate) fn name_filter(filters: &Attributes) -> ProviderResult<Option<Regex>> {
    let Some(pattern) = filters.get("name_regex").and_then(Value::as_str) else {
        return Ok(None);
    };
    Regex::new(pattern).map(Some).map_err(|e| {
        ProviderError::new(ErrorKind::Validation, format!("Invalid name_regex: {}", e))
            .with_cause(e)
    })
}

/// Objects in the array at a dotted path such as `Data.SecurityGroups`
pub(crate) fn objects_at<'a>(response: &'a Payload, path: &str) -> Vec<&'a Payload> {
    get_path(response, path)
        .and_then(serde_json::Value::as_array)
        .map(|items| items.iter().filter_map(serde_json::Value::as_object).collect())
        .unwrap_or_default()
}

/// Map response objects through the item schema
pub(crate) fn map_items(
    item_schema: &ResourceSchema,
    rules: &RuleSet,
    objects: &[&Payload],
    id_key: &str,
) -> ProviderResult<Listing> {
    let mut listing = Listing::default();
    for object in objects {
        let mut block = Attributes::new();
        apply_response(item_schema, object, rules, &mut block)?;
        listing
            .ids
            .push(get_path_str(object, id_key).unwrap_or_default());
        listing.items.push(Value::Map(block));
    }
    Ok(listing)
}

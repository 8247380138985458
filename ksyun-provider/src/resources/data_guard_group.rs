//! KEC data guard group (anti-affinity placement)

use async_trait::async_trait;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{RequestMode, RuleSet, apply_response, build_request};
use log::info;
use serde_json::json;

use super::{Attributes, Created, ResourceHandler, describe_first, payload, returned_id};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_data_guard_group";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(AttributeSchema::new("data_guard_name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("data_guard_type", AttributeType::String)
                .computed()
                .force_new()
                .with_description("host or domain"),
        )
        .attribute(AttributeSchema::new("data_guard_id", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("data_guard_capacity", AttributeType::Int).read_only())
        .attribute(AttributeSchema::new("data_guard_used_size", AttributeType::Int).read_only())
}

pub struct DataGuardGroup;

#[async_trait]
impl ResourceHandler for DataGuardGroup {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let request = build_request(&schema(), values, RequestMode::Create, &RuleSet::new())?;
        let response = ctx
            .call(Service::Kec, "CreateDataGuardGroup", &request)
            .await?;
        Ok(Created::new(returned_id(
            &response,
            "DataGuardId",
            "CreateDataGuardGroup",
        )?))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let request = payload([("DataGuardId.1", json!(identifier))]);
        let Some(item) = describe_first(
            ctx,
            Service::Kec,
            "DescribeDataGuardGroup",
            &request,
            "DataGuardsSet",
        )
        .await?
        else {
            return Ok(None);
        };

        let mut attributes = base.clone();
        apply_response(&schema(), &item, &RuleSet::new(), &mut attributes)?;
        attributes.insert("data_guard_id".to_string(), Value::from(identifier));
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> ProviderResult<()> {
        let mut request = build_request(
            &schema(),
            desired,
            RequestMode::Update { prior },
            &RuleSet::only().field("data_guard_name"),
        )?;
        if request.is_empty() {
            return Ok(());
        }
        request.insert("DataGuardId".to_string(), json!(identifier));
        ctx.call(Service::Kec, "ModifyDataGuardGroups", &request)
            .await?;
        Ok(())
    }

    /// A group that still holds instances is left to the vendor
    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let request = payload([("DataGuardId.1", json!(identifier))]);
        match ctx
            .delete_with_retry(
                RetryPolicy::SHORT,
                Service::Kec,
                "DeleteDataGuardGroups",
                &request,
            )
            .await
        {
            Err(e) if e.last().is_in_use() => {
                info!("Data guard group {} still in use: {}", identifier, e);
                Ok(())
            }
            result => Ok(result?),
        }
    }
}

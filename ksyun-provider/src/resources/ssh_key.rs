//! SSH key pair
//!
//! Without a `public_key` the vendor generates the pair and hands out the
//! private key once, in the create response; it is kept from then on.

use async_trait::async_trait;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{RequestMode, RuleSet, apply_response, build_request};
use serde_json::json;

use super::{Attributes, Created, ResourceHandler, describe_first, payload, returned_id};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_ssh_key";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(AttributeSchema::new("key_name", AttributeType::String))
        .attribute(AttributeSchema::new("key_id", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("public_key", AttributeType::String)
                .computed()
                .force_new()
                .with_description("Import this public key instead of generating a pair"),
        )
        .attribute(AttributeSchema::new("private_key", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("create_time", AttributeType::String).read_only())
}

pub struct SshKey;

#[async_trait]
impl ResourceHandler for SshKey {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let request = build_request(&schema(), values, RequestMode::Create, &RuleSet::new())?;
        let action = if request.contains_key("PublicKey") {
            "ImportKey"
        } else {
            "CreateKey"
        };

        let response = ctx.call(Service::Sks, action, &request).await?;
        let mut created = Created::new(returned_id(&response, "Key.KeyId", action)?);
        if let Some(key) = response.get("Key").and_then(serde_json::Value::as_object) {
            apply_response(&schema(), key, &RuleSet::new(), &mut created.attributes)?;
        }
        Ok(created)
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let request = payload([("KeyId.1", json!(identifier))]);
        let Some(item) =
            describe_first(ctx, Service::Sks, "DescribeKeys", &request, "KeySet").await?
        else {
            return Ok(None);
        };

        let mut attributes = base.clone();
        apply_response(&schema(), &item, &RuleSet::new(), &mut attributes)?;
        attributes.insert("key_id".to_string(), Value::from(identifier));
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
            &RuleSet::only().field("key_name"),
        )?;
        if request.is_empty() {
            return Ok(());
        }
        request.insert("KeyId".to_string(), json!(identifier));
        ctx.call(Service::Sks, "ModifyKey", &request).await?;
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let request = payload([("KeyId", json!(identifier))]);
        ctx.delete_with_retry(RetryPolicy::KEY, Service::Sks, "DeleteKey", &request)
            .await?;
        Ok(())
    }
}

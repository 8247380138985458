//! Public IP protected by a KNAD instance

use async_trait::async_trait;
use ksyun_core::identifier::CompositeId;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{
    FieldRule, RequestMode, RuleSet, build_request, get_path_str, items_in_set,
};
use serde_json::json;

use super::{Attributes, Created, ResourceHandler, payload, required_str};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_knad_associate";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(
            AttributeSchema::new("knad_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("ip", AttributeType::String)
                .required()
                .force_new()
                .with_description("Public IP to put under protection"),
        )
}

pub struct KnadAssociate;

#[async_trait]
impl ResourceHandler for KnadAssociate {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let rules = RuleSet::new().rule("ip", FieldRule::new().indexed());
        let request = build_request(&schema(), values, RequestMode::Create, &rules)?;
        ctx.call(Service::Knad, "AssociateIp", &request).await?;

        // Identified as `knad:ip`; the IP may be IPv6
        let id = CompositeId::new(
            required_str(values, "knad_id")?,
            required_str(values, "ip")?,
        );
        Ok(Created::new(id.to_string()))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let CompositeId {
            child: knad_id,
            parent: ip,
        } = CompositeId::parse_open_parent(identifier)?;
        let request = payload([("KnadId", json!(knad_id))]);
        let response = match ctx
            .call_with_retry(RetryPolicy::READ, Service::Knad, "DescribeKnad", &request)
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let associated = items_in_set(&response, "EipSet")
            .into_iter()
            .any(|item| get_path_str(item, "Ip").as_deref() == Some(ip.as_str()));
        if !associated {
            return Ok(None);
        }

        let mut attributes = base.clone();
        attributes.insert("knad_id".to_string(), Value::from(knad_id));
        attributes.insert("ip".to_string(), Value::from(ip));
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        _ctx: Context<'_>,
        _identifier: &str,
        _prior: &Attributes,
        _desired: &Attributes,
    ) -> ProviderResult<()> {
        // Both fields are force-new.
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let CompositeId {
            child: knad_id,
            parent: ip,
        } = CompositeId::parse_open_parent(identifier)?;
        let request = payload([("KnadId", json!(knad_id)), ("Ip.1", json!(ip))]);
        ctx.delete_with_retry(
            RetryPolicy::DISASSOCIATE,
            Service::Knad,
            "DisassociateIp",
            &request,
        )
        .await?;
        Ok(())
    }
}

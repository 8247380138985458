//! KEC instance attached to a scaling group

use async_trait::async_trait;
use ksyun_core::identifier::CompositeId;
use ksyun_core::provider::ProviderResult;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use ksyun_core::transcode::{
    FieldRule, RequestMode, RuleSet, apply_response, build_request, zero_fill,
};

use super::{
    Attributes, Created, ResourceHandler, describe_first, member_import, member_request,
    required_str, set_member_ids,
};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_scaling_instance";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("KEC instance attached to a scaling group")
        .attribute(
            AttributeSchema::new("scaling_group_id", AttributeType::String)
                .required()
                .force_new()
                .with_description("Scaling group the instance belongs to"),
        )
        .attribute(
            AttributeSchema::new("scaling_instance_id", AttributeType::String)
                .required()
                .force_new()
                .with_description("KEC instance ID"),
        )
        .attribute(
            AttributeSchema::new("protected_from_detach", types::int_flag())
                .required()
                .with_description("Whether the group may detach the instance (0 or 1)"),
        )
        .attribute(AttributeSchema::new("scaling_instance_name", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("health_status", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("add_time", AttributeType::String)
                .read_only()
                .with_description("Attach time, RFC 3339"),
        )
        .attribute(AttributeSchema::new("creation_type", AttributeType::String).read_only())
}

pub struct ScalingInstance;

#[async_trait]
impl ResourceHandler for ScalingInstance {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let rules = RuleSet::only()
            .field("scaling_group_id")
            .rule("scaling_instance_id", FieldRule::new().indexed());
        let mut request = build_request(&schema(), values, RequestMode::Create, &rules)?;
        ctx.call(Service::Kec, "AttachInstance", &request).await?;

        let id = CompositeId::new(
            required_str(values, "scaling_instance_id")?,
            required_str(values, "scaling_group_id")?,
        );

        // Unprotected is the vendor default
        if let Some(protected) = values
            .get("protected_from_detach")
            .filter(|flag| flag.as_int() != Some(0))
        {
            request.insert("ProtectedFromDetach".to_string(), protected.to_json());
            ctx.call(Service::Kec, "SetKvmProtectedDetach", &request)
                .await?;
        }

        Ok(Created::new(id.to_string()))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingInstanceId.1");
        let Some(item) = describe_first(
            ctx,
            Service::Kec,
            "DescribeScalingInstance",
            &request,
            "ScalingInstanceSet",
        )
        .await?
        else {
            return Ok(None);
        };

        let mut attributes = base.clone();
        apply_response(&schema(), &item, &RuleSet::new(), &mut attributes)?;
        set_member_ids(&mut attributes, &id, "scaling_instance_id");
        Ok(Some(attributes))
    }

    async fn update(
        &self,
        ctx: Context<'_>,
        _identifier: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> ProviderResult<()> {
        let rules = RuleSet::only()
            .field("protected_from_detach")
            .rule("scaling_group_id", FieldRule::new().force_include())
            .rule(
                "scaling_instance_id",
                FieldRule::new().force_include().indexed(),
            );
        let mut request = build_request(&schema(), desired, RequestMode::Update { prior }, &rules)?;
        // Vendor-mandated: SetKvmProtectedDetach rejects requests without the flag.
        zero_fill(&mut request, &["ProtectedFromDetach"]);
        ctx.call(Service::Kec, "SetKvmProtectedDetach", &request)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingInstanceId.1");
        ctx.delete_with_retry(RetryPolicy::DEFAULT, Service::Kec, "DetachInstance", &request)
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
    use ksyun_core::resource::Value;

    #[test]
    fn protection_flag_must_be_zero_or_one() {
        let mut values = Attributes::from([
            ("scaling_group_id".to_string(), Value::from("541241314798505984")),
            (
                "scaling_instance_id".to_string(),
                Value::from("a4ef95c5-e8f1-43f8-912a-758f15064063"),
            ),
            ("protected_from_detach".to_string(), Value::Int(1)),
        ]);
        assert!(schema().validate(&values).is_ok());

        values.insert("protected_from_detach".to_string(), Value::Int(2));
        assert!(schema().validate(&values).is_err());
    }

    #[test]
    fn vendor_fields_are_not_settable() {
        let values = Attributes::from([
            ("scaling_group_id".to_string(), Value::from("g")),
            ("scaling_instance_id".to_string(), Value::from("i")),
            ("protected_from_detach".to_string(), Value::Int(0)),
            ("health_status".to_string(), Value::from("Healthy")),
        ]);
        assert!(schema().validate(&values).is_err());
    }
}

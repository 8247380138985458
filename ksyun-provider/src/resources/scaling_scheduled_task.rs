//! Scheduled resize of a scaling group

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
    required_str, returned_id, set_member_ids,
};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_scaling_scheduled_task";

const REPEAT_UNITS: &[&str] = &["Day", "Month", "Week"];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(AttributeSchema::new("scaling_group_id", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("scaling_scheduled_task_name", AttributeType::String)
                .with_default("tf-scaling-scheduled_task"),
        )
        .attribute(AttributeSchema::new("readjust_max_size", AttributeType::Int).with_default(1))
        .attribute(AttributeSchema::new("readjust_min_size", AttributeType::Int).with_default(1))
        .attribute(
            AttributeSchema::new("readjust_expect_size", AttributeType::Int).with_default(1),
        )
        .attribute(AttributeSchema::new("start_time", AttributeType::String).required())
        .attribute(AttributeSchema::new("end_time", AttributeType::String).computed())
        .attribute(AttributeSchema::new("recurrence", AttributeType::String).computed())
        .attribute(AttributeSchema::new("repeat_unit", types::one_of(REPEAT_UNITS)))
        .attribute(AttributeSchema::new("repeat_cycle", AttributeType::String))
        .attribute(AttributeSchema::new("create_time", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new("scaling_scheduled_task_id", AttributeType::String).read_only(),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String).read_only())
}

/// Describe calls spell the identifier without the `d`
fn response_rules() -> RuleSet {
    RuleSet::new().rule(
        "scaling_scheduled_task_id",
        FieldRule::new().target("ScalingScheduleTaskId"),
    )
}

pub struct ScalingScheduledTask;

#[async_trait]
impl ResourceHandler for ScalingScheduledTask {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let mut request = build_request(&schema(), values, RequestMode::Create, &RuleSet::new())?;
        // Vendor-mandated: all three sizes must be present.
        zero_fill(
            &mut request,
            &["ReadjustMaxSize", "ReadjustMinSize", "ReadjustExpectSize"],
        );

        let response = ctx
            .call(Service::Kec, "CreateScheduledTask", &request)
            .await?;
        let task_id = returned_id(
            &response,
            "ReturnSet.ScalingScheduleTaskId",
            "CreateScheduledTask",
        )?;
        let id = CompositeId::new(task_id, required_str(values, "scaling_group_id")?);
        Ok(Created::new(id.to_string()))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingScheduledTaskId.1");
        let Some(item) = describe_first(
            ctx,
            Service::Kec,
            "DescribeScheduledTask",
            &request,
            "ScalingScheduleTaskSet",
        )
        .await?
        else {
            return Ok(None);
        };

        let mut attributes = base.clone();
        apply_response(&schema(), &item, &response_rules(), &mut attributes)?;
        set_member_ids(&mut attributes, &id, "scaling_scheduled_task_id");
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
            &RuleSet::new(),
        )?;
        if request.is_empty() {
            return Ok(());
        }
        request.extend(member_request(&id, "ScalingScheduledTaskId"));
        ctx.call(Service::Kec, "ModifyScheduledTask", &request)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingScheduledTaskId");
        ctx.delete_with_retry(
            RetryPolicy::DEFAULT,
            Service::Kec,
            "DeleteScheduledTask",
            &request,
        )
        .await?;
        Ok(())
    }

    fn import_identifier(&self, import_id: &str) -> ProviderResult<String> {
        member_import(import_id)
    }
}

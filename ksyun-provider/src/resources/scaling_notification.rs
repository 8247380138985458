//! Notification settings of a scaling group
//!
//! A group carries at most one notification. Creating one where the group
//! already has it adopts the existing notification and modifies it instead.

use async_trait::async_trait;
use ksyun_core::identifier::CompositeId;
use ksyun_core::provider::ProviderResult;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{
    FieldRule, RequestMode, RuleSet, apply_response, build_request, first_in_set, get_path_str,
};
use log::info;

use super::{
    Attributes, Created, ResourceHandler, describe_first, member_import, member_request,
    required_str, returned_id, set_member_ids,
};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_scaling_notification";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .attribute(
            AttributeSchema::new("scaling_group_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("scaling_notification_types", AttributeType::string_set())
                .required()
                .with_description("Notification types, '1' to '6'"),
        )
        .attribute(
            AttributeSchema::new("scaling_notification_id", AttributeType::String).read_only(),
        )
}

/// Types go out as `NotificationType.1..n`
fn request_rules() -> RuleSet {
    RuleSet::new().rule(
        "scaling_notification_types",
        FieldRule::new().target("NotificationType"),
    )
}

pub struct ScalingNotification;

#[async_trait]
impl ResourceHandler for ScalingNotification {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let group_id = required_str(values, "scaling_group_id")?;
        let request = build_request(&schema(), values, RequestMode::Create, &request_rules())?;

        let existing = ctx
            .call(Service::Kec, "DescribeScalingNotification", &request)
            .await?;
        if let Some(found) = first_in_set(&existing, "ScalingNotificationSet")
            .and_then(|item| get_path_str(item, "ScalingNotificationId"))
        {
            info!(
                "Scaling group {} already has notification {}, updating it",
                group_id, found
            );
            let id = CompositeId::new(found, group_id);
            let mut modify = request;
            modify.extend(member_request(&id, "ScalingNotificationId"));
            ctx.call(Service::Kec, "ModifyScalingNotification", &modify)
                .await?;
            return Ok(Created::new(id.to_string()));
        }

        let response = ctx
            .call(Service::Kec, "CreateScalingNotification", &request)
            .await?;
        let notification_id = returned_id(
            &response,
            "ScalingNotificationId",
            "CreateScalingNotification",
        )?;
        let id = CompositeId::new(notification_id, group_id);
        Ok(Created::new(id.to_string()))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingNotificationId.1");
        let Some(item) = describe_first(
            ctx,
            Service::Kec,
            "DescribeScalingNotification",
            &request,
            "ScalingNotificationSet",
        )
        .await?
        else {
            return Ok(None);
        };

        let mut attributes = base.clone();
        apply_response(&schema(), &item, &RuleSet::new(), &mut attributes)?;
        set_member_ids(&mut attributes, &id, "scaling_notification_id");
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
        request.extend(member_request(&id, "ScalingNotificationId"));
        ctx.call(Service::Kec, "ModifyScalingNotification", &request)
            .await?;
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let id = CompositeId::parse(identifier)?;
        let request = member_request(&id, "ScalingNotificationId");
        ctx.delete_with_retry(
            RetryPolicy::DEFAULT,
            Service::Kec,
            "DeleteScalingNotification",
            &request,
        )
        .await?;
        Ok(())
    }

    fn import_identifier(&self, import_id: &str) -> ProviderResult<String> {
        member_import(import_id)
    }
}

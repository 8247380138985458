//! KNAD DDoS mitigation instance

use async_trait::async_trait;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::{Classify, ErrorClass, RetryPolicy, retry};
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use ksyun_core::transcode::{
    FieldRule, Payload, RequestMode, RuleSet, apply_response, build_request, first_in_set,
};
use log::warn;
use serde_json::json;

use super::{Attributes, Created, ResourceHandler, describe_first, payload, returned_id};
use crate::client::{ApiError, Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_knad";

const LINK_TYPES: &[&str] = &["DDoS_BGP"];
const BILL_TYPES: &[&str] = &["1", "2"];

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Advanced DDoS mitigation instance")
        .attribute(AttributeSchema::new("knad_name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("service_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("project_id", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("link_type", types::one_of(LINK_TYPES))
                .with_default("DDoS_BGP")
                .force_new(),
        )
        .attribute(AttributeSchema::new("ip_count", types::positive_int()).required())
        .attribute(
            AttributeSchema::new("band", types::positive_int())
                .required()
                .with_description("Guaranteed protection bandwidth, Gbps"),
        )
        .attribute(
            AttributeSchema::new("max_band", types::positive_int())
                .required()
                .with_description("Elastic protection bandwidth, Gbps"),
        )
        .attribute(AttributeSchema::new("idc_band", types::positive_int()).required())
        .attribute(
            AttributeSchema::new("bill_type", types::one_of(BILL_TYPES))
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("duration", AttributeType::Int).force_new())
        .attribute(AttributeSchema::new("knad_id", AttributeType::String).read_only())
}

/// Projects are moved separately, so ModifyKnad never carries `ProjectId`
fn update_rules() -> RuleSet {
    RuleSet::new().rule("project_id", FieldRule::new().ignore())
}

/// UpdateInstanceProjectId request when the project changed
fn project_move(identifier: &str, prior: &Attributes, desired: &Attributes) -> Option<Payload> {
    let project = desired.get("project_id")?;
    if prior.get("project_id") == Some(project) {
        return None;
    }
    Some(payload([
        ("InstanceId", json!(identifier)),
        ("ProjectId", project.to_json()),
    ]))
}

fn lookup(identifier: &str) -> Payload {
    payload([("KnadId.1", json!(identifier))])
}

pub struct Knad;

#[async_trait]
impl ResourceHandler for Knad {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        let request = build_request(&schema(), values, RequestMode::Create, &RuleSet::new())?;
        let response = ctx.call(Service::Knad, "CreateKnad", &request).await?;
        Ok(Created::new(returned_id(&response, "Kid", "CreateKnad")?))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let request = lookup(identifier);
        let Some(item) =
            describe_first(ctx, Service::Knad, "DescribeKnad", &request, "KnadSet").await?
        else {
            return Ok(None);
        };
        Ok(Some(merge(identifier, &item, base)?))
    }

    /// A fresh instance takes a while to show up in DescribeKnad
    async fn read_after_create(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let request = &lookup(identifier);
        let item = ctx
            .until_found(RetryPolicy::READ, move || async move {
                let response = ctx.call(Service::Knad, "DescribeKnad", request).await?;
                first_in_set(&response, "KnadSet")
                    .cloned()
                    .ok_or_else(|| ApiError::not_found(format!("knad {} not exist", identifier)))
            })
            .await?;
        Ok(Some(merge(identifier, &item, base)?))
    }

    async fn update(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> ProviderResult<()> {
        if let Some(request) = project_move(identifier, prior, desired) {
            ctx.call(Service::Iam, "UpdateInstanceProjectId", &request)
                .await?;
        }

        let mut request = build_request(
            &schema(),
            desired,
            RequestMode::Update { prior },
            &update_rules(),
        )?;
        if request.is_empty() {
            return Ok(());
        }
        request.insert("KnadId".to_string(), json!(identifier));
        ctx.call(Service::Knad, "ModifyKnad", &request).await?;
        Ok(())
    }

    /// A refused delete is retried until the instance is gone
    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let request = payload([("KnadId", json!(identifier))]);
        let refused = match ctx.call(Service::Knad, "DeleteKnad", &request).await {
            Ok(_) => return Ok(()),
            Err(e) if e.classify() == ErrorClass::NotFound => return Ok(()),
            Err(e) => e,
        };
        warn!("Knad {} not deleted yet: {}", identifier, refused);

        let (describe, request) = (&lookup(identifier), &request);
        retry(&ctx.policy(RetryPolicy::DISASSOCIATE), move || async move {
            match ctx.call(Service::Knad, "DescribeKnad", describe).await {
                Ok(response) if first_in_set(&response, "KnadSet").is_none() => return Ok(()),
                Ok(_) => {}
                Err(e) if e.classify() == ErrorClass::NotFound => return Ok(()),
                Err(e) => return Err(Teardown::Lookup(e)),
            }
            ctx.call(Service::Knad, "DeleteKnad", request)
                .await
                .map(|_| ())
                .map_err(Teardown::Delete)
        })
        .await?;
        Ok(())
    }
}

fn merge(identifier: &str, item: &Payload, base: &Attributes) -> ProviderResult<Attributes> {
    let mut attributes = base.clone();
    apply_response(&schema(), item, &RuleSet::new(), &mut attributes)?;
    attributes.insert("knad_id".to_string(), Value::from(identifier));
    Ok(attributes)
}

/// Failure inside the delete loop
#[derive(Debug, thiserror::Error)]
enum Teardown {
    #[error("reading knad before delete: {0}")]
    Lookup(ApiError),
    #[error("{0}")]
    Delete(ApiError),
}

impl Classify for Teardown {
    fn classify(&self) -> ErrorClass {
        match self {
            Teardown::Lookup(_) => ErrorClass::Fatal,
            Teardown::Delete(_) => ErrorClass::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn described_knad_fills_numbers_from_strings() {
        let item = json!({
            "KnadId": "knad-1",
            "KnadName": "edge",
            "ServiceId": "KNAD_30G",
            "IpCount": "10",
            "Band": 30,
            "MaxBand": "50",
            "IdcBand": 100,
            "ProjectId": "0",
            "ExpireTime": "2027-01-01"
        });
        let attributes = merge("knad-1", item.as_object().unwrap(), &Attributes::new()).unwrap();
        assert_eq!(attributes["knad_name"], Value::from("edge"));
        assert_eq!(attributes["ip_count"], Value::Int(10));
        assert_eq!(attributes["max_band"], Value::Int(50));
        assert_eq!(attributes["project_id"], Value::from("0"));
        assert!(!attributes.contains_key("expire_time"));
    }

    #[test]
    fn project_move_is_split_from_modify() {
        let prior = Attributes::from([
            ("knad_name".to_string(), Value::from("edge")),
            ("project_id".to_string(), Value::from("0")),
            ("band".to_string(), Value::Int(30)),
        ]);
        let desired = Attributes::from([
            ("knad_name".to_string(), Value::from("edge")),
            ("project_id".to_string(), Value::from("7")),
            ("band".to_string(), Value::Int(40)),
        ]);
        let request = build_request(
            &schema(),
            &desired,
            RequestMode::Update { prior: &prior },
            &update_rules(),
        )
        .unwrap();
        assert_eq!(request.len(), 1);
        assert_eq!(request["Band"], json!(40));

        let moved = project_move("knad-1", &prior, &desired).unwrap();
        assert_eq!(moved["InstanceId"], json!("knad-1"));
        assert_eq!(moved["ProjectId"], json!("7"));
        assert!(project_move("knad-1", &prior, &prior).is_none());
        assert!(project_move("knad-1", &prior, &Attributes::new()).is_none());
    }

    #[test]
    fn refused_delete_is_retried_but_failed_lookup_is_not() {
        let refused = Teardown::Delete(ApiError::new("InvalidAction", "busy"));
        assert_eq!(refused.classify(), ErrorClass::Transient);
        let lookup = Teardown::Lookup(ApiError::new("Forbidden", "denied").with_status(403));
        assert_eq!(lookup.classify(), ErrorClass::Fatal);
    }
}

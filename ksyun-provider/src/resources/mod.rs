//! Resource type definitions and handlers
//!
//! Every resource type is a schema plus a `ResourceHandler` wiring the vendor
//! actions for its lifecycle. Request and response payloads are produced by
//! the generic transcoder; handlers only add what the conventions cannot
//! express (extra identifiers, zero-filled parameters, follow-up calls).

pub mod bare_metal;
pub mod data_guard_group;
pub mod knad;
pub mod knad_associate;
pub mod scaling_instance;
pub mod scaling_notification;
pub mod scaling_policy;
pub mod scaling_scheduled_task;
pub mod ssh_key;

use std::collections::HashMap;

use async_trait::async_trait;
use ksyun_core::identifier::CompositeId;
use ksyun_core::provider::{ProviderError, ProviderResult, ResourceType};
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::ResourceSchema;
use ksyun_core::transcode::{MappingError, Payload, first_in_set, get_path_str};

use crate::client::{Context, Service};

/// Attribute values of one resource
pub type Attributes = HashMap<String, Value>;

/// Outcome of a create call
#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub identifier: String,
    /// Values only the create response carries, such as a generated private key
    pub attributes: Attributes,
}

impl Created {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Lifecycle of one resource type against the vendor API
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn resource_type(&self) -> &'static str;

    fn schema(&self) -> ResourceSchema;

    /// Create the resource and return its identifier
    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created>;

    /// Current attributes, starting from `base`; `None` when the resource is gone
    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>>;

    /// First read after a create
    async fn read_after_create(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        self.read(ctx, identifier, base).await
    }

    async fn update(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> ProviderResult<()>;

    /// Delete the resource; a resource that is already gone counts as deleted
    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()>;

    /// Identifier to store for an import string
    fn import_identifier(&self, import_id: &str) -> ProviderResult<String> {
        Ok(import_id.to_string())
    }
}

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $module::RESOURCE_TYPE
            }
            fn schema(&self) -> ResourceSchema {
                $module::schema()
            }
        }
    };
}

define_resource_type!(ScalingInstanceType, scaling_instance);
define_resource_type!(ScalingPolicyType, scaling_policy);
define_resource_type!(ScalingNotificationType, scaling_notification);
define_resource_type!(ScalingScheduledTaskType, scaling_scheduled_task);
define_resource_type!(SshKeyType, ssh_key);
define_resource_type!(KnadType, knad);
define_resource_type!(KnadAssociateType, knad_associate);
define_resource_type!(BareMetalType, bare_metal);
define_resource_type!(DataGuardGroupType, data_guard_group);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(ScalingInstanceType),
        Box::new(ScalingPolicyType),
        Box::new(ScalingNotificationType),
        Box::new(ScalingScheduledTaskType),
        Box::new(SshKeyType),
        Box::new(KnadType),
        Box::new(KnadAssociateType),
        Box::new(BareMetalType),
        Box::new(DataGuardGroupType),
    ]
}

/// Handler for a resource type name
pub fn handler(resource_type: &str) -> Option<&'static dyn ResourceHandler> {
    let handler: &'static dyn ResourceHandler = match resource_type {
        scaling_instance::RESOURCE_TYPE => &scaling_instance::ScalingInstance,
        scaling_policy::RESOURCE_TYPE => &scaling_policy::ScalingPolicy,
        scaling_notification::RESOURCE_TYPE => &scaling_notification::ScalingNotification,
        scaling_scheduled_task::RESOURCE_TYPE => &scaling_scheduled_task::ScalingScheduledTask,
        ssh_key::RESOURCE_TYPE => &ssh_key::SshKey,
        knad::RESOURCE_TYPE => &knad::Knad,
        knad_associate::RESOURCE_TYPE => &knad_associate::KnadAssociate,
        bare_metal::RESOURCE_TYPE => &bare_metal::BareMetal,
        data_guard_group::RESOURCE_TYPE => &data_guard_group::DataGuardGroup,
        _ => return None,
    };
    Some(handler)
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Request payload from literal key/value pairs
pub(crate) fn payload<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Payload {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// String attribute that validation guarantees to be present
pub(crate) fn required_str<'a>(values: &'a Attributes, field: &str) -> ProviderResult<&'a str> {
    values.get(field).and_then(Value::as_str).ok_or_else(|| {
        MappingError::MissingRequired {
            field: field.to_string(),
        }
        .into()
    })
}

/// Identifier returned by a create call
pub(crate) fn returned_id(response: &Payload, path: &str, action: &str) -> ProviderResult<String> {
    get_path_str(response, path)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::fatal(format!("{} response carries no {}", action, path)))
}

/// First entry of a describe call's result set
///
/// A not-found answer and an empty set both mean the resource is gone.
pub(crate) async fn describe_first(
    ctx: Context<'_>,
    service: Service,
    action: &str,
    request: &Payload,
    set_key: &str,
) -> ProviderResult<Option<Payload>> {
    let response = match ctx
        .call_with_retry(RetryPolicy::READ, service, action, request)
        .await
    {
        Ok(response) => response,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(first_in_set(&response, set_key).cloned())
}

// -----------------------------------------------------------------------------
// Scaling group members
//
// Policies, notifications, scheduled tasks and attached instances live inside
// a scaling group and are identified as `member:group`.
// -----------------------------------------------------------------------------

/// Request naming a scaling group member
pub(crate) fn member_request(id: &CompositeId, member_key: &str) -> Payload {
    payload([
        ("ScalingGroupId", serde_json::Value::from(id.parent.as_str())),
        (member_key, serde_json::Value::from(id.child.as_str())),
    ])
}

/// Keep the identifying fields in the attributes in step with the identifier
pub(crate) fn set_member_ids(attributes: &mut Attributes, id: &CompositeId, member_field: &str) {
    attributes.insert("scaling_group_id".to_string(), Value::from(id.parent.as_str()));
    attributes.insert(member_field.to_string(), Value::from(id.child.as_str()));
}

/// Import strings name the group first
pub(crate) fn member_import(import_id: &str) -> ProviderResult<String> {
    Ok(CompositeId::parse_import(import_id)?.to_string())
}

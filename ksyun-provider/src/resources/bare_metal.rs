//! EPC bare-metal host
//!
//! Network settings come back per interface in `NetworkInterfaceAttributeSet`:
//! the `primary` interface feeds the plain fields, the `extension` interface
//! (dual mode only) the `extension_*` ones.

use async_trait::async_trait;
use ksyun_core::case_convert::indexed_key;
use ksyun_core::provider::{ErrorKind, ProviderError, ProviderResult};
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use ksyun_core::transcode::{
    EncodeContext, FieldRule, Payload, RequestMode, RuleSet, apply_response, build_request,
    get_path_str, items_in_set,
};
use log::warn;
use serde_json::json;

use super::{Attributes, Created, ResourceHandler, describe_first, payload, returned_id};
use crate::client::{Context, Service};

pub const RESOURCE_TYPE: &str = "ksyun_bare_metal";

const HYPER_THREADING: &[&str] = &["Open", "Close", "NoChange"];
const RAID_TYPES: &[&str] = &["Raid0", "Raid1", "Raid5", "Raid10", "Raid50", "SRaid0"];
const INTERFACE_MODES: &[&str] = &["bond4", "single", "dual"];
const BOND_ATTRIBUTES: &[&str] = &["bond0", "bond1"];
const AGENTS: &[&str] = &["classic", "no"];
const FILE_TYPES: &[&str] = &["EXT4", "XFS"];
const CATALOGUES: &[&str] = &["/DATA/disk", "/data"];
const CATALOGUE_SUFFIXES: &[&str] = &["NoSuffix", "NaturalNumber", "NaturalNumberFromZero"];
const CONTAINER_AGENTS: &[&str] = &["supported", "unsupported"];

/// Settings applied by a reinstall
const REINSTALL_FIELDS: &[&str] = &[
    "image_id",
    "key_id",
    "password",
    "raid",
    "raid_id",
    "hyper_threading",
    "network_interface_mode",
    "bond_attribute",
    "security_agent",
    "cloud_monitor_agent",
    "system_file_type",
    "data_file_type",
    "data_disk_catalogue",
    "data_disk_catalogue_suffix",
    "nvme_data_file_type",
    "nvme_data_disk_catalogue",
    "nvme_data_disk_catalogue_suffix",
    "container_agent",
    "computer_name",
    "server_ip",
    "path",
];

fn check_group_count(value: &Value, min: usize) -> Result<(), String> {
    let count = value.as_list().map_or(0, <[Value]>::len);
    if (min..=3).contains(&count) {
        Ok(())
    } else {
        Err(format!("expected {} to 3 security groups, got {}", min, count))
    }
}

fn security_groups(min: usize) -> AttributeType {
    let validate: fn(&Value) -> Result<(), String> = if min == 0 {
        |value| check_group_count(value, 0)
    } else {
        |value| check_group_count(value, 1)
    };
    AttributeType::Custom {
        name: "SecurityGroupIds".to_string(),
        base: Box::new(AttributeType::string_set()),
        validate,
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Bare-metal host")
        .attribute(
            AttributeSchema::new("availability_zone", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("host_type", AttributeType::String)
                .required()
                .force_new()
                .with_description("Host type, e.g. CAL-III"),
        )
        .attribute(
            AttributeSchema::new("hyper_threading", types::one_of(HYPER_THREADING))
                .with_default("NoChange"),
        )
        .attribute(
            AttributeSchema::new("raid", types::one_of(RAID_TYPES))
                .with_description("RAID level; exactly one of raid and raid_id is set"),
        )
        .attribute(AttributeSchema::new("raid_id", AttributeType::String))
        .attribute(AttributeSchema::new("image_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("project_id", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("network_interface_mode", types::one_of(INTERFACE_MODES))
                .with_default("bond4"),
        )
        .attribute(
            AttributeSchema::new("bond_attribute", types::one_of(BOND_ATTRIBUTES))
                .with_default("bond1")
                .with_description("Only sent in bond4 mode"),
        )
        .attribute(
            AttributeSchema::new("subnet_id", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("private_ip_address", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("security_group_ids", security_groups(1))
                .required()
                .with_provider_name("SecurityGroupId"),
        )
        .attribute(
            AttributeSchema::new("dns1", AttributeType::String)
                .computed()
                .with_provider_name("DNS1"),
        )
        .attribute(
            AttributeSchema::new("dns2", AttributeType::String)
                .computed()
                .with_provider_name("DNS2"),
        )
        .attribute(AttributeSchema::new("key_id", AttributeType::String).required())
        .attribute(AttributeSchema::new("host_name", AttributeType::String).with_default("ksc_epc"))
        .attribute(AttributeSchema::new("password", AttributeType::String))
        .attribute(AttributeSchema::new("security_agent", types::one_of(AGENTS)).with_default("no"))
        .attribute(
            AttributeSchema::new("cloud_monitor_agent", types::one_of(AGENTS)).with_default("no"),
        )
        .attribute(
            AttributeSchema::new("extension_subnet_id", AttributeType::String)
                .computed()
                .force_new()
                .with_description("Required in dual mode"),
        )
        .attribute(
            AttributeSchema::new("extension_private_ip_address", AttributeType::String)
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("extension_security_group_ids", security_groups(0))
                .computed()
                .with_provider_name("ExtensionSecurityGroupId"),
        )
        .attribute(
            AttributeSchema::new("extension_dns1", AttributeType::String)
                .computed()
                .with_provider_name("ExtensionDNS1"),
        )
        .attribute(
            AttributeSchema::new("extension_dns2", AttributeType::String)
                .computed()
                .with_provider_name("ExtensionDNS2"),
        )
        .attribute(
            AttributeSchema::new("system_file_type", types::one_of(FILE_TYPES))
                .with_default("EXT4"),
        )
        .attribute(
            AttributeSchema::new("data_file_type", types::one_of(FILE_TYPES)).with_default("XFS"),
        )
        .attribute(
            AttributeSchema::new("data_disk_catalogue", types::one_of(CATALOGUES))
                .with_default("/DATA/disk"),
        )
        .attribute(
            AttributeSchema::new("data_disk_catalogue_suffix", types::one_of(CATALOGUE_SUFFIXES))
                .with_default("NaturalNumber"),
        )
        .attribute(AttributeSchema::new("nvme_data_file_type", types::one_of(FILE_TYPES)))
        .attribute(AttributeSchema::new("nvme_data_disk_catalogue", types::one_of(CATALOGUES)))
        .attribute(AttributeSchema::new(
            "nvme_data_disk_catalogue_suffix",
            types::one_of(CATALOGUE_SUFFIXES),
        ))
        .attribute(
            AttributeSchema::new("container_agent", types::one_of(CONTAINER_AGENTS))
                .with_default("unsupported"),
        )
        .attribute(AttributeSchema::new("computer_name", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("server_ip", AttributeType::String)
                .with_description("PXE server of COLO hosts, used on reinstall"),
        )
        .attribute(AttributeSchema::new("path", AttributeType::String))
        .attribute(
            AttributeSchema::new("force_re_install", AttributeType::Bool)
                .with_default(false)
                .with_description("Reinstall the system when the reinstall settings change"),
        )
        .attribute(
            AttributeSchema::new("extension_network_interface_id", AttributeType::String)
                .read_only(),
        )
        .attribute(AttributeSchema::new("network_interface_id", AttributeType::String).read_only())
}

/// Writes the field only when the host's interface mode is `mode`
fn only_in_mode(ctx: &EncodeContext<'_>, mode: &str, request: &mut Payload) {
    let current = ctx
        .get("network_interface_mode")
        .and_then(Value::as_str)
        .unwrap_or("bond4");
    if current != mode {
        return;
    }
    match ctx.value {
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                request.insert(indexed_key(ctx.key, i + 1), item.to_json());
            }
        }
        scalar => {
            request.insert(ctx.key.to_string(), scalar.to_json());
        }
    }
}

fn bond4_only(ctx: &EncodeContext<'_>, request: &mut Payload) -> Result<(), String> {
    only_in_mode(ctx, "bond4", request);
    Ok(())
}

fn dual_only(ctx: &EncodeContext<'_>, request: &mut Payload) -> Result<(), String> {
    only_in_mode(ctx, "dual", request);
    Ok(())
}

fn create_rules() -> RuleSet {
    RuleSet::new()
        .rule("bond_attribute", FieldRule::new().encode_with(bond4_only))
        .rule("extension_subnet_id", FieldRule::new().encode_with(dual_only))
        .rule(
            "extension_private_ip_address",
            FieldRule::new().encode_with(dual_only),
        )
        .rule(
            "extension_security_group_ids",
            FieldRule::new().encode_with(dual_only),
        )
        .rule("extension_dns1", FieldRule::new().encode_with(dual_only))
        .rule("extension_dns2", FieldRule::new().encode_with(dual_only))
        .rule("server_ip", FieldRule::new().ignore())
        .rule("path", FieldRule::new().ignore())
        .rule("force_re_install", FieldRule::new().ignore())
}

fn reinstall_rules() -> RuleSet {
    REINSTALL_FIELDS
        .iter()
        .fold(RuleSet::only(), |rules, field| match *field {
            "bond_attribute" => rules.rule(*field, FieldRule::new().encode_with(bond4_only)),
            _ => rules.field(*field),
        })
}

/// Interface settings live outside the host object
fn response_rules() -> RuleSet {
    [
        "subnet_id",
        "private_ip_address",
        "security_group_ids",
        "dns1",
        "dns2",
        "extension_subnet_id",
        "extension_private_ip_address",
        "extension_security_group_ids",
        "extension_dns1",
        "extension_dns2",
        "network_interface_id",
        "extension_network_interface_id",
        "password",
    ]
    .into_iter()
    .fold(RuleSet::new(), |rules, field| {
        rules.rule(field, FieldRule::new().ignore())
    })
}

fn check_raid(values: &Attributes) -> ProviderResult<()> {
    match (values.contains_key("raid"), values.contains_key("raid_id")) {
        (true, false) | (false, true) => Ok(()),
        (true, true) => Err(ProviderError::new(
            ErrorKind::Validation,
            "raid conflicts with raid_id",
        )),
        (false, false) => Err(ProviderError::new(
            ErrorKind::Validation,
            "one of raid and raid_id is required",
        )),
    }
}

/// Copy one network interface into the attributes under `prefix`
fn set_interface(attributes: &mut Attributes, interface: &Payload, prefix: &str) {
    let fields = [
        ("NetworkInterfaceId", "network_interface_id"),
        ("SubnetId", "subnet_id"),
        ("PrivateIpAddress", "private_ip_address"),
        ("DNS1", "dns1"),
        ("DNS2", "dns2"),
    ];
    for (key, field) in fields {
        if let Some(value) = get_path_str(interface, key) {
            attributes.insert(format!("{}{}", prefix, field), Value::from(value));
        }
    }

    let groups: Vec<Value> = items_in_set(interface, "SecurityGroupSet")
        .into_iter()
        .filter_map(|group| get_path_str(group, "SecurityGroupId"))
        .map(Value::from)
        .collect();
    attributes.insert(format!("{}security_group_ids", prefix), Value::List(groups));
}

fn map_host(host: &Payload, base: &Attributes) -> ProviderResult<Attributes> {
    let mut attributes = base.clone();
    apply_response(&schema(), host, &response_rules(), &mut attributes)?;
    for interface in items_in_set(host, "NetworkInterfaceAttributeSet") {
        match get_path_str(interface, "NetworkInterfaceType").as_deref() {
            Some("primary") => set_interface(&mut attributes, interface, ""),
            Some("extension") => set_interface(&mut attributes, interface, "extension_"),
            _ => {}
        }
    }
    Ok(attributes)
}

pub struct BareMetal;

#[async_trait]
impl ResourceHandler for BareMetal {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    async fn create(&self, ctx: Context<'_>, values: &Attributes) -> ProviderResult<Created> {
        check_raid(values)?;
        let request = build_request(&schema(), values, RequestMode::Create, &create_rules())?;
        let response = ctx.call(Service::Epc, "CreateEpc", &request).await?;
        Ok(Created::new(returned_id(&response, "Host.HostId", "CreateEpc")?))
    }

    async fn read(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        base: &Attributes,
    ) -> ProviderResult<Option<Attributes>> {
        let request = payload([("HostId.1", json!(identifier))]);
        let Some(host) =
            describe_first(ctx, Service::Epc, "DescribeEpcs", &request, "HostSet").await?
        else {
            return Ok(None);
        };
        Ok(Some(map_host(&host, base)?))
    }

    async fn update(
        &self,
        ctx: Context<'_>,
        identifier: &str,
        prior: &Attributes,
        desired: &Attributes,
    ) -> ProviderResult<()> {
        let host_id = json!(identifier);

        let mut rename = build_request(
            &schema(),
            desired,
            RequestMode::Update { prior },
            &RuleSet::only().field("host_name"),
        )?;
        if !rename.is_empty() {
            rename.insert("HostId".to_string(), host_id.clone());
            ctx.call(Service::Epc, "ModifyEpc", &rename).await?;
        }

        let regroup = build_request(
            &schema(),
            desired,
            RequestMode::Update { prior },
            &RuleSet::only().field("security_group_ids"),
        )?;
        if !regroup.is_empty() {
            let mut request = regroup;
            request.insert("HostId".to_string(), host_id.clone());
            if let Some(interface) = prior.get("network_interface_id").and_then(Value::as_str) {
                request.insert("NetworkInterfaceId".to_string(), json!(interface));
            }
            ctx.call(Service::Epc, "ModifySecurityGroup", &request)
                .await?;
        }

        let changed = build_request(
            &schema(),
            desired,
            RequestMode::Update { prior },
            &reinstall_rules(),
        )?;
        if changed.is_empty() {
            return Ok(());
        }
        let reinstall = desired
            .get("force_re_install")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !reinstall {
            warn!(
                "Bare metal {}: {:?} only change with force_re_install",
                identifier,
                changed.keys().collect::<Vec<_>>()
            );
            return Ok(());
        }

        check_raid(desired)?;
        let mut request =
            build_request(&schema(), desired, RequestMode::Create, &reinstall_rules())?;
        request.insert("HostId".to_string(), host_id);
        ctx.call(Service::Epc, "ReinstallEpc", &request).await?;
        Ok(())
    }

    async fn delete(&self, ctx: Context<'_>, identifier: &str) -> ProviderResult<()> {
        let request = payload([("HostId", json!(identifier))]);
        ctx.delete_with_retry(RetryPolicy::INSTANCE, Service::Epc, "DeleteEpc", &request)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_values(mode: &str) -> Attributes {
        Attributes::from([
            ("availability_zone".to_string(), Value::from("cn-beijing-6b")),
            ("host_type".to_string(), Value::from("MI-I2")),
            ("image_id".to_string(), Value::from("img-1")),
            ("key_id".to_string(), Value::from("key-1")),
            ("raid".to_string(), Value::from("Raid1")),
            ("subnet_id".to_string(), Value::from("subnet-1")),
            ("network_interface_mode".to_string(), Value::from(mode)),
            (
                "security_group_ids".to_string(),
                Value::List(vec![Value::from("sg-1"), Value::from("sg-2")]),
            ),
            ("extension_subnet_id".to_string(), Value::from("subnet-2")),
            (
                "extension_security_group_ids".to_string(),
                Value::List(vec![Value::from("sg-3")]),
            ),
        ])
    }

    #[test]
    fn create_request_follows_interface_mode() {
        let request = build_request(
            &schema(),
            &host_values("bond4"),
            RequestMode::Create,
            &create_rules(),
        )
        .unwrap();
        assert_eq!(request["SecurityGroupId.1"], json!("sg-1"));
        assert_eq!(request["SecurityGroupId.2"], json!("sg-2"));
        assert_eq!(request["BondAttribute"], json!("bond1"));
        assert_eq!(request["HostName"], json!("ksc_epc"));
        assert!(!request.contains_key("ExtensionSubnetId"));
        assert!(!request.contains_key("ForceReInstall"));

        let request = build_request(
            &schema(),
            &host_values("dual"),
            RequestMode::Create,
            &create_rules(),
        )
        .unwrap();
        assert_eq!(request["ExtensionSubnetId"], json!("subnet-2"));
        assert_eq!(request["ExtensionSecurityGroupId.1"], json!("sg-3"));
        assert!(!request.contains_key("BondAttribute"));
    }

    #[test]
    fn raid_and_raid_id_are_exclusive() {
        let mut values = host_values("bond4");
        assert!(check_raid(&values).is_ok());
        values.insert("raid_id".to_string(), Value::from("tpl-1"));
        assert!(check_raid(&values).is_err());
        values.remove("raid");
        values.remove("raid_id");
        assert_eq!(check_raid(&values).unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn security_group_count_is_bounded() {
        let mut values = host_values("bond4");
        assert!(schema().validate(&values).is_ok());
        values.insert("security_group_ids".to_string(), Value::List(vec![]));
        assert!(schema().validate(&values).is_err());
    }

    #[test]
    fn interfaces_feed_primary_and_extension_fields() {
        let host = json!({
            "HostId": "host-1",
            "HostName": "db-01",
            "Raid": "Raid1",
            "NetworkInterfaceMode": "dual",
            "NetworkInterfaceAttributeSet": [
                {
                    "NetworkInterfaceType": "primary",
                    "NetworkInterfaceId": "eni-1",
                    "SubnetId": "subnet-1",
                    "PrivateIpAddress": "10.0.0.5",
                    "DNS1": "198.18.254.40",
                    "SecurityGroupSet": [{"SecurityGroupId": "sg-1"}]
                },
                {
                    "NetworkInterfaceType": "extension",
                    "NetworkInterfaceId": "eni-2",
                    "SubnetId": "subnet-2",
                    "SecurityGroupSet": [{"SecurityGroupId": "sg-3"}, {"SecurityGroupId": "sg-4"}]
                }
            ]
        });
        let attributes = map_host(host.as_object().unwrap(), &Attributes::new()).unwrap();
        assert_eq!(attributes["host_name"], Value::from("db-01"));
        assert_eq!(attributes["network_interface_id"], Value::from("eni-1"));
        assert_eq!(attributes["private_ip_address"], Value::from("10.0.0.5"));
        assert_eq!(attributes["dns1"], Value::from("198.18.254.40"));
        assert_eq!(
            attributes["security_group_ids"],
            Value::List(vec![Value::from("sg-1")])
        );
        assert_eq!(attributes["extension_network_interface_id"], Value::from("eni-2"));
        assert_eq!(attributes["extension_subnet_id"], Value::from("subnet-2"));
        assert_eq!(
            attributes["extension_security_group_ids"],
            Value::List(vec![Value::from("sg-3"), Value::from("sg-4")])
        );
    }
}

//! `ksyun_vpn_tunnels`: IPsec/GRE tunnels of the region

use async_trait::async_trait;
use ksyun_core::case_convert::indexed_key;
use ksyun_core::provider::ProviderResult;
use ksyun_core::resource::Value;
use ksyun_core::retry::RetryPolicy;
use ksyun_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use ksyun_core::transcode::{
    EncodeContext, FieldRule, Payload, RequestMode, RuleSet, build_request, items_in_set,
};

use super::{DataSourceHandler, Listing, common_attributes, map_items, name_filter, name_regex};
use crate::client::{Context, Service};
use crate::resources::Attributes;

pub const DATA_SOURCE_TYPE: &str = "ksyun_vpn_tunnels";

fn item_schema() -> ResourceSchema {
    let cidr = ResourceSchema::new("extra_cidr")
        .attribute(AttributeSchema::new("cidr_block", AttributeType::String).read_only());

    [
        "id",
        "vpn_tunnel_id",
        "state",
        "type",
        "vpn_gre_ip",
        "customer_gre_ip",
        "ha_vpn_gre_ip",
        "ha_customer_gre_ip",
        "vpn_gateway_id",
        "customer_gateway_id",
        "name",
        "vpn_tunnel_name",
        "pre_shared_key",
        "ike_authen_algorithm",
        "ike_encry_algorithm",
        "ipsec_encry_algorithm",
        "ipsec_authen_algorithm",
        "create_time",
    ]
    .into_iter()
    .fold(ResourceSchema::new("vpn_tunnel"), |schema, name| {
        schema.attribute(AttributeSchema::new(name, AttributeType::String).read_only())
    })
    .attribute(
        AttributeSchema::new("ike_dh_group", AttributeType::Int)
            .read_only()
            .with_provider_name("IkeDHGroup"),
    )
    .attribute(AttributeSchema::new("ipsec_life_time_traffic", AttributeType::Int).read_only())
    .attribute(AttributeSchema::new("ipsec_life_time_second", AttributeType::Int).read_only())
    .attribute(
        AttributeSchema::new("extra_cidr_set", AttributeType::list_of_blocks(cidr)).read_only(),
    )
}

pub fn schema() -> ResourceSchema {
    common_attributes(
        ResourceSchema::new(DATA_SOURCE_TYPE)
            .attribute(AttributeSchema::new("ids", AttributeType::string_set()))
            .attribute(AttributeSchema::new("vpn_gateway_ids", AttributeType::string_set()))
            .attribute(AttributeSchema::new("name_regex", name_regex()))
            .attribute(
                AttributeSchema::new("vpn_tunnels", AttributeType::list_of_blocks(item_schema()))
                    .read_only(),
            ),
    )
}

/// Gateways are matched through the generic filter syntax
fn encode_gateway_filter(ctx: &EncodeContext<'_>, request: &mut Payload) -> Result<(), String> {
    let gateways = ctx
        .value
        .as_list()
        .ok_or_else(|| "expected a set of gateway ids".to_string())?;
    if gateways.is_empty() {
        return Ok(());
    }
    request.insert("Filter.1.Name".to_string(), "vpn-gateway-id".into());
    for (i, gateway) in gateways.iter().enumerate() {
        request.insert(indexed_key("Filter.1.Value", i + 1), gateway.to_json());
    }
    Ok(())
}

fn request_rules() -> RuleSet {
    RuleSet::new()
        .rule("ids", FieldRule::new().target("VpnTunnelId"))
        .rule(
            "vpn_gateway_ids",
            FieldRule::new().encode_with(encode_gateway_filter),
        )
        .rule("name_regex", FieldRule::new().ignore())
        .rule("output_file", FieldRule::new().ignore())
}

fn item_rules() -> RuleSet {
    RuleSet::new()
        .rule("id", FieldRule::new().target("VpnTunnelId"))
        .rule("name", FieldRule::new().target("VpnTunnelName"))
}

pub struct VpnTunnels;

#[async_trait]
impl DataSourceHandler for VpnTunnels {
    fn data_source_type(&self) -> &'static str {
        DATA_SOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn result_field(&self) -> &'static str {
        "vpn_tunnels"
    }

    async fn list(&self, ctx: Context<'_>, filters: &Attributes) -> ProviderResult<Listing> {
        let request = build_request(&schema(), filters, RequestMode::Create, &request_rules())?;
        let response = ctx
            .call_with_retry(
                RetryPolicy::READ,
                Service::Vpc,
                "DescribeVpnTunnels",
                &request,
            )
            .await?;

        let mut listing = map_items(
            &item_schema(),
            &item_rules(),
            &items_in_set(&response, "VpnTunnelSet"),
            "VpnTunnelId",
        )?;
        if let Some(pattern) = name_filter(filters)? {
            listing.retain_matching(&pattern, "vpn_tunnel_name");
        }
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn gateway_ids_become_a_filter() {
        let filters = Attributes::from([
            ("ids".to_string(), Value::List(vec![Value::from("tun-1")])),
            (
                "vpn_gateway_ids".to_string(),
                Value::List(vec![Value::from("gw-1"), Value::from("gw-2")]),
            ),
        ]);
        let request =
            build_request(&schema(), &filters, RequestMode::Create, &request_rules()).unwrap();
        assert_eq!(request["VpnTunnelId.1"], json!("tun-1"));
        assert_eq!(request["Filter.1.Name"], json!("vpn-gateway-id"));
        assert_eq!(request["Filter.1.Value.1"], json!("gw-1"));
        assert_eq!(request["Filter.1.Value.2"], json!("gw-2"));
        assert!(!request.contains_key("VpnGatewayIds"));
    }

    #[test]
    fn tunnels_keep_nested_cidrs() {
        let response = json!({
            "VpnTunnelSet": [{
                "VpnTunnelId": "tun-1",
                "VpnTunnelName": "office",
                "State": "available",
                "IkeDHGroup": 2,
                "IpsecLifeTimeSecond": "7200",
                "ExtraCidrSet": [{"CidrBlock": "10.1.0.0/16"}, {"CidrBlock": "10.2.0.0/16"}]
            }]
        });
        let listing = map_items(
            &item_schema(),
            &item_rules(),
            &items_in_set(response.as_object().unwrap(), "VpnTunnelSet"),
            "VpnTunnelId",
        )
        .unwrap();
        assert_eq!(listing.ids, vec!["tun-1"]);

        let tunnel = listing.items[0].as_map().unwrap();
        assert_eq!(tunnel["id"], Value::from("tun-1"));
        assert_eq!(tunnel["name"], Value::from("office"));
        assert_eq!(tunnel["ike_dh_group"], Value::Int(2));
        assert_eq!(tunnel["ipsec_life_time_second"], Value::Int(7200));
        let cidrs = tunnel["extra_cidr_set"].as_list().unwrap();
        assert_eq!(cidrs.len(), 2);
        assert_eq!(
            cidrs[1].as_map().unwrap()["cidr_block"],
            Value::from("10.2.0.0/16")
        );
    }
}

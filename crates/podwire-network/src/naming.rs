//! Deterministic resource names and addresses.
//!
//! Every function here is pure. Detach relies on this: it has no record of
//! the attach that preceded it and re-derives the same names from the
//! request alone.

use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use podwire_common::ContainerId;

use crate::config::FabricConfig;
use crate::error::{NetworkError, NetworkResult};
use crate::model::AttachmentRequest;

/// Maximum length of a Linux interface name (`IFNAMSIZ - 1`).
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Names derived for one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentNames {
    /// Link end inside the container namespace.
    pub namespace_link: String,
    /// Link end in the host namespace.
    pub host_link: String,
    /// Switch port bound to the host link end.
    pub switch_port: String,
}

/// Name of the host-side link end for a container.
///
/// Prefix truncation to [`MAX_INTERFACE_NAME_LEN`]: two IDs sharing their
/// first 15 characters map to the same name.
#[must_use]
pub fn host_link_name(container_id: &ContainerId) -> String {
    container_id.prefix(MAX_INTERFACE_NAME_LEN).to_string()
}

/// Name of the switch port terminating `host_link`.
#[must_use]
pub fn switch_port_name(config: &FabricConfig, host_link: &str) -> String {
    format!("{}{}", config.port_prefix, host_link)
}

/// Name of the namespace-side link end.
///
/// The caller's interface name wins; without one the name is derived from
/// the attachment counter.
#[must_use]
pub fn namespace_link_name(config: &FabricConfig, interface_name: &str, counter: u32) -> String {
    if interface_name.is_empty() {
        format!("{}{}", config.interface_prefix, counter)
    } else {
        interface_name.to_string()
    }
}

/// Names for an attach performed at `counter`.
#[must_use]
pub fn attachment_names(
    config: &FabricConfig,
    request: &AttachmentRequest,
    counter: u32,
) -> AttachmentNames {
    let host_link = host_link_name(&request.container_id);
    AttachmentNames {
        namespace_link: namespace_link_name(config, &request.interface_name, counter),
        switch_port: switch_port_name(config, &host_link),
        host_link,
    }
}

/// Names for a detach. The counter is unknown at this point, so the
/// namespace link name is only known when the caller supplied one.
#[must_use]
pub fn detachment_names(config: &FabricConfig, request: &AttachmentRequest) -> AttachmentNames {
    let host_link = host_link_name(&request.container_id);
    AttachmentNames {
        namespace_link: request.interface_name.clone(),
        switch_port: switch_port_name(config, &host_link),
        host_link,
    }
}

/// Address allocated to the attachment numbered `counter`.
///
/// # Errors
///
/// Returns [`NetworkError::Naming`] when the counter runs past the subnet
/// or lands on the gateway address. Counters are never reused, so neither
/// case can be resolved by retrying.
pub fn container_address(config: &FabricConfig, counter: u32) -> NetworkResult<Ipv4Network> {
    if counter == 0 || counter > config.host_capacity() {
        return Err(NetworkError::Naming {
            message: format!(
                "attachment {counter} does not fit in {}/{}",
                config.subnet, config.prefix_len
            ),
        });
    }
    if counter == config.gateway_host {
        return Err(NetworkError::Naming {
            message: format!("attachment {counter} collides with the gateway address"),
        });
    }
    host_address(config, counter)
}

/// Address of the gateway interface.
///
/// # Errors
///
/// Returns [`NetworkError::Naming`] if the configured mask is invalid.
pub fn gateway_address(config: &FabricConfig) -> NetworkResult<Ipv4Network> {
    host_address(config, config.gateway_host)
}

/// Locally administered MAC derived from an IPv4 address (`02:fe:` + octets).
#[must_use]
pub fn mac_for_address(address: Ipv4Addr) -> String {
    let [a, b, c, d] = address.octets();
    format!("02:fe:{a:02x}:{b:02x}:{c:02x}:{d:02x}")
}

fn host_address(config: &FabricConfig, host: u32) -> NetworkResult<Ipv4Network> {
    let ip = Ipv4Addr::from(u32::from(config.subnet).wrapping_add(host));
    Ipv4Network::new(ip, config.prefix_len).map_err(|e| NetworkError::Naming {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(id: &str, ifname: &str) -> AttachmentRequest {
        AttachmentRequest::new(
            ContainerId::new(id).unwrap(),
            ifname,
            "/var/run/2345243",
            "0.2.3",
        )
    }

    #[test]
    fn namespace_link_uses_requested_name() {
        let config = FabricConfig::default();
        let names = attachment_names(&config, &request("sadfja813227wdhfjkh2319784dgh", "eth0"), 1);
        assert_eq!(names.namespace_link, "eth0");
    }

    #[test]
    fn namespace_link_falls_back_to_counter() {
        let config = FabricConfig::default();
        assert_eq!(namespace_link_name(&config, "", 7), "eth7");
    }

    #[test]
    fn host_link_is_truncated_container_id() {
        let config = FabricConfig::default();
        let names = attachment_names(&config, &request("sadfja813227wdhfjkh2319784dgh", "eth0"), 1);
        assert_eq!(names.host_link, "sadfja813227wdh");
        assert_eq!(names.switch_port, "afpacketsadfja813227wdh");
    }

    #[test]
    fn short_container_id_is_kept() {
        let config = FabricConfig::default();
        let names = attachment_names(&config, &request("c1", "eth0"), 1);
        assert_eq!(names.host_link, "c1");
        assert_eq!(names.switch_port, "afpacketc1");
    }

    #[test]
    fn detach_names_match_attach_names() {
        let config = FabricConfig::default();
        let req = request("0123456789abcdef0123", "eth0");
        let attach = attachment_names(&config, &req, 42);
        let detach = detachment_names(&config, &req);
        assert_eq!(attach, detach);
    }

    #[test]
    fn addresses_follow_counter() {
        let config = FabricConfig::default();
        assert_eq!(container_address(&config, 1).unwrap().to_string(), "10.0.0.1/24");
        assert_eq!(container_address(&config, 2).unwrap().to_string(), "10.0.0.2/24");
        assert_eq!(gateway_address(&config).unwrap().to_string(), "10.0.0.254/24");
    }

    #[test]
    fn address_exhaustion_is_an_error() {
        let config = FabricConfig::default();
        assert!(matches!(
            container_address(&config, 254),
            Err(NetworkError::Naming { .. })
        ));
        assert!(matches!(
            container_address(&config, 255),
            Err(NetworkError::Naming { .. })
        ));
        assert!(container_address(&config, 0).is_err());
        assert!(container_address(&config, 253).is_ok());
    }

    #[test]
    fn mac_is_derived_from_address() {
        assert_eq!(mac_for_address(Ipv4Addr::new(10, 0, 0, 1)), "02:fe:0a:00:00:01");
    }

    proptest! {
        #[test]
        fn naming_is_idempotent(id in "[a-z0-9]{1,64}", ifname in "[a-z0-9]{0,10}") {
            let config = FabricConfig::default();
            let req = request(&id, &ifname);
            let first = detachment_names(&config, &req);
            let second = detachment_names(&config, &req);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.host_link.chars().count() <= MAX_INTERFACE_NAME_LEN);
            prop_assert!(first.switch_port.ends_with(&first.host_link));
        }

        #[test]
        fn distinct_counters_give_distinct_addresses(a in 1u32..254, b in 1u32..254) {
            let config = FabricConfig::default();
            prop_assume!(a != b);
            prop_assert_ne!(
                container_address(&config, a).unwrap(),
                container_address(&config, b).unwrap()
            );
        }
    }
}

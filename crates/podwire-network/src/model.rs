//! Descriptions of the resources making up a container attachment.
//!
//! These are plain values: building them has no side effects, and the
//! backends are the only place where they turn into real interfaces.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use podwire_common::ContainerId;
use serde::{Deserialize, Serialize};

/// One container network-namespace attach or detach request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRequest {
    /// Container the namespace belongs to.
    pub container_id: ContainerId,
    /// Interface name requested inside the namespace. May be empty.
    pub interface_name: String,
    /// Path to the container's network namespace.
    pub network_namespace: String,
    /// CNI protocol version spoken by the caller.
    pub version: String,
    /// Extra runtime arguments (e.g. `K8S_POD_NAME`).
    pub extra_args: HashMap<String, String>,
}

impl AttachmentRequest {
    /// Create a request without extra arguments.
    pub fn new(
        container_id: ContainerId,
        interface_name: impl Into<String>,
        network_namespace: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            container_id,
            interface_name: interface_name.into(),
            network_namespace: network_namespace.into(),
            version: version.into(),
            extra_args: HashMap::new(),
        }
    }
}

/// One end of a virtual point-to-point link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEnd {
    /// Interface name.
    pub name: String,
    /// Whether the interface is brought up.
    pub enabled: bool,
    /// Name of the other end.
    pub peer: String,
    /// Namespace the end lives in; `None` for the host namespace.
    pub namespace: Option<String>,
    /// Addresses assigned to the end.
    pub addresses: Vec<Ipv4Network>,
    /// Hardware address, if fixed.
    pub mac: Option<String>,
    /// Next hop of the default route installed through this end.
    pub gateway: Option<Ipv4Addr>,
}

/// Both ends of a virtual link between a container and the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPair {
    /// End inside the container namespace, carrying the container address.
    pub namespace_end: LinkEnd,
    /// End in the host namespace, bridged into the switch.
    pub host_end: LinkEnd,
}

impl LinkPair {
    /// Both ends, namespace end first.
    #[must_use]
    pub fn ends(&self) -> [&LinkEnd; 2] {
        [&self.namespace_end, &self.host_end]
    }
}

/// The host-side link end's termination inside the switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchPort {
    /// Port name.
    pub name: String,
    /// Host interface the port captures packets from.
    pub host_interface: String,
}

/// A member of the bridging domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMember {
    /// Interface name of the member.
    pub name: String,
    /// Whether the member is the domain's bridged virtual interface.
    pub bvi: bool,
}

/// The shared L2 domain joining every switch port and the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgingDomain {
    /// Domain name.
    pub name: String,
    /// Flood broadcast traffic.
    pub flood: bool,
    /// Flood unknown unicast traffic.
    pub unknown_unicast_flood: bool,
    /// Forward between members.
    pub forward: bool,
    /// Learn source MAC addresses.
    pub learn: bool,
    /// Full member list. The gateway, when listed, comes first.
    pub members: Vec<BridgeMember>,
}

impl BridgingDomain {
    /// Create a domain with every flooding and learning flag enabled.
    pub fn new(name: impl Into<String>, members: Vec<BridgeMember>) -> Self {
        Self {
            name: name.into(),
            flood: true,
            unknown_unicast_flood: true,
            forward: true,
            learn: true,
            members,
        }
    }

    /// Names of all members, in order.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.name.as_str())
    }

    /// Whether `name` is a member.
    #[must_use]
    pub fn has_member(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

/// The loopback-style interface acting as default gateway for the domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayInterface {
    /// Interface name.
    pub name: String,
    /// Gateway address with the subnet mask.
    pub address: Ipv4Network,
    /// Hardware address.
    pub mac: String,
    /// Whether the interface is brought up.
    pub enabled: bool,
}

/// Address family of an assigned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

/// An address assigned to a container interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpResult {
    /// Address with mask, e.g. `10.0.0.1/24`.
    pub address: String,
    /// Gateway address with mask, e.g. `10.0.0.254/24`.
    pub gateway: String,
    /// Address family.
    pub family: IpFamily,
}

/// An interface created inside the container namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceResult {
    /// Interface name.
    pub name: String,
    /// Hardware address.
    pub mac: String,
    /// Namespace the interface lives in.
    pub sandbox: String,
    /// Assigned addresses.
    pub ip_addresses: Vec<IpResult>,
}

/// A route installed inside the container namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Destination with mask.
    pub dst: String,
    /// Next hop.
    pub gw: String,
}

/// Connectivity description returned by a successful attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachResult {
    /// Interfaces created for the container.
    pub interfaces: Vec<InterfaceResult>,
    /// Routes installed for the container.
    pub routes: Vec<RouteResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_domain_enables_all_flags() {
        let bd = BridgingDomain::new("bd1", Vec::new());
        assert!(bd.flood && bd.unknown_unicast_flood && bd.forward && bd.learn);
        assert!(bd.members.is_empty());
    }

    #[test]
    fn domain_membership_lookup() {
        let bd = BridgingDomain::new(
            "bd1",
            vec![
                BridgeMember {
                    name: "loop1".to_string(),
                    bvi: true,
                },
                BridgeMember {
                    name: "afpacketc1".to_string(),
                    bvi: false,
                },
            ],
        );
        assert!(bd.has_member("afpacketc1"));
        assert!(!bd.has_member("afpacketc2"));
        assert_eq!(bd.member_names().collect::<Vec<_>>(), ["loop1", "afpacketc1"]);
    }
}

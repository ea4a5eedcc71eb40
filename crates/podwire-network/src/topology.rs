//! Assembly of the resource descriptions for one attach or detach.

use crate::config::FabricConfig;
use crate::error::NetworkResult;
use crate::model::{
    AttachmentRequest, BridgeMember, BridgingDomain, GatewayInterface, LinkEnd, LinkPair,
    SwitchPort,
};
use crate::naming::{self, AttachmentNames};
use crate::state::EngineState;

/// Everything one attach installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentTopology {
    /// Link between the container namespace and the host.
    pub link_pair: LinkPair,
    /// Switch port bound to the host end.
    pub switch_port: SwitchPort,
    /// Gateway interface, only on the first attachment.
    pub gateway: Option<GatewayInterface>,
    /// Full desired membership of the bridging domain.
    pub bridging_domain: BridgingDomain,
}

/// Everything one detach removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachmentTopology {
    /// Link to delete. The namespace end name is empty when unknown.
    pub link_pair: LinkPair,
    /// Switch port to delete.
    pub switch_port: SwitchPort,
    /// Domain update dropping the port; `None` when the port was never a member.
    pub bridging_domain: Option<BridgingDomain>,
    /// Membership before the removal, used to restore the switch if the
    /// link pair cannot be deleted. `None` when the port was never a member.
    pub previous_domain: Option<BridgingDomain>,
}

/// Builds resource descriptions from a request and the engine state.
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    config: FabricConfig,
}

impl TopologyBuilder {
    /// Create a builder for the given fabric.
    #[must_use]
    pub fn new(config: FabricConfig) -> Self {
        Self { config }
    }

    /// Fabric parameters in use.
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    /// Resources for attaching `request` as attachment number `state.counter`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetworkError::Naming`] if no address can be
    /// allocated for the counter.
    pub fn build_attachment(
        &self,
        request: &AttachmentRequest,
        state: &EngineState,
    ) -> NetworkResult<AttachmentTopology> {
        let names = naming::attachment_names(&self.config, request, state.counter);
        let address = naming::container_address(&self.config, state.counter)?;

        let link_pair = LinkPair {
            namespace_end: LinkEnd {
                name: names.namespace_link.clone(),
                enabled: true,
                peer: names.host_link.clone(),
                namespace: Some(request.network_namespace.clone()),
                addresses: vec![address],
                mac: Some(naming::mac_for_address(address.ip())),
                gateway: Some(naming::gateway_address(&self.config)?.ip()),
            },
            host_end: LinkEnd {
                name: names.host_link.clone(),
                enabled: true,
                peer: names.namespace_link.clone(),
                namespace: None,
                addresses: Vec::new(),
                mac: None,
                gateway: None,
            },
        };

        let gateway = if state.gateway_initialized {
            None
        } else {
            Some(self.gateway()?)
        };

        let bridging_domain = self.domain(
            state
                .active_ports
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(names.switch_port.as_str())),
        );

        Ok(AttachmentTopology {
            switch_port: self.switch_port(&names),
            link_pair,
            gateway,
            bridging_domain,
        })
    }

    /// Resources for detaching `request`.
    #[must_use]
    pub fn build_detachment(
        &self,
        request: &AttachmentRequest,
        state: &EngineState,
    ) -> DetachmentTopology {
        let names = naming::detachment_names(&self.config, request);

        let active = state.active_ports.contains(&names.switch_port);
        let ports = || state.active_ports.iter().map(String::as_str);
        let bridging_domain =
            active.then(|| self.domain(ports().filter(|port| *port != names.switch_port)));
        let previous_domain = active.then(|| self.domain(ports()));

        let link_pair = LinkPair {
            namespace_end: LinkEnd {
                name: names.namespace_link.clone(),
                enabled: false,
                peer: names.host_link.clone(),
                namespace: Some(request.network_namespace.clone()),
                addresses: Vec::new(),
                mac: None,
                gateway: None,
            },
            host_end: LinkEnd {
                name: names.host_link.clone(),
                enabled: false,
                peer: names.namespace_link.clone(),
                namespace: None,
                addresses: Vec::new(),
                mac: None,
                gateway: None,
            },
        };

        DetachmentTopology {
            switch_port: self.switch_port(&names),
            link_pair,
            bridging_domain,
            previous_domain,
        }
    }

    /// Description of the gateway interface.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetworkError::Naming`] if the gateway address is invalid.
    pub fn gateway(&self) -> NetworkResult<GatewayInterface> {
        Ok(GatewayInterface {
            name: self.config.gateway_interface.clone(),
            address: naming::gateway_address(&self.config)?,
            mac: self.config.gateway_mac.clone(),
            enabled: true,
        })
    }

    fn switch_port(&self, names: &AttachmentNames) -> SwitchPort {
        SwitchPort {
            name: names.switch_port.clone(),
            host_interface: names.host_link.clone(),
        }
    }

    // Gateway first, then ports in sorted order without duplicates.
    fn domain<'a>(&self, ports: impl Iterator<Item = &'a str>) -> BridgingDomain {
        let ports: std::collections::BTreeSet<&str> = ports.collect();
        let members = std::iter::once(BridgeMember {
            name: self.config.gateway_interface.clone(),
            bvi: true,
        })
        .chain(ports.into_iter().map(|name| BridgeMember {
            name: name.to_string(),
            bvi: false,
        }))
        .collect();
        BridgingDomain::new(self.config.bridging_domain.clone(), members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use podwire_common::ContainerId;

    fn request(id: &str) -> AttachmentRequest {
        AttachmentRequest::new(ContainerId::new(id).unwrap(), "eth0", "/proc/123/ns/net", "0.3.1")
    }

    fn state(counter: u32, ports: &[&str]) -> EngineState {
        EngineState {
            counter,
            gateway_initialized: !ports.is_empty(),
            active_ports: ports.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[test]
    fn first_attachment_creates_gateway() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        let topo = builder.build_attachment(&request("c1"), &state(1, &[])).unwrap();

        let gateway = topo.gateway.expect("gateway on first attach");
        assert_eq!(gateway.name, "loop1");
        assert_eq!(gateway.address.to_string(), "10.0.0.254/24");
        assert_eq!(
            topo.bridging_domain.member_names().collect::<Vec<_>>(),
            ["loop1", "afpacketc1"]
        );
        assert!(topo.bridging_domain.members[0].bvi);
    }

    #[test]
    fn later_attachment_reuses_gateway() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        let topo = builder
            .build_attachment(&request("c2"), &state(2, &["afpacketc1"]))
            .unwrap();

        assert!(topo.gateway.is_none());
        assert_eq!(
            topo.bridging_domain.member_names().collect::<Vec<_>>(),
            ["loop1", "afpacketc1", "afpacketc2"]
        );
    }

    #[test]
    fn link_pair_ends_reference_each_other() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        let topo = builder.build_attachment(&request("c1"), &state(1, &[])).unwrap();
        let pair = &topo.link_pair;

        assert_eq!(pair.namespace_end.name, "eth0");
        assert_eq!(pair.namespace_end.peer, "c1");
        assert_eq!(pair.host_end.peer, "eth0");
        assert_eq!(pair.namespace_end.namespace.as_deref(), Some("/proc/123/ns/net"));
        assert!(pair.host_end.namespace.is_none());
        assert!(pair.host_end.addresses.is_empty());
        assert_eq!(pair.namespace_end.addresses[0].to_string(), "10.0.0.1/24");
        assert_eq!(topo.switch_port.host_interface, "c1");
        assert_eq!(
            pair.namespace_end.gateway,
            Some(std::net::Ipv4Addr::new(10, 0, 0, 254))
        );
    }

    #[test]
    fn repeated_port_is_listed_once() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        let topo = builder
            .build_attachment(&request("c1"), &state(2, &["afpacketc1"]))
            .unwrap();
        assert_eq!(topo.bridging_domain.members.len(), 2);
    }

    #[test]
    fn detachment_drops_port_from_domain() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        let topo = builder.build_detachment(&request("c1"), &state(2, &["afpacketc1", "afpacketc2"]));

        let domain = topo.bridging_domain.expect("domain update");
        assert_eq!(domain.member_names().collect::<Vec<_>>(), ["loop1", "afpacketc2"]);
        assert_eq!(topo.switch_port.name, "afpacketc1");
        assert_eq!(topo.link_pair.host_end.name, "c1");

        let previous = topo.previous_domain.expect("previous membership");
        assert_eq!(
            previous.member_names().collect::<Vec<_>>(),
            ["loop1", "afpacketc1", "afpacketc2"]
        );
    }

    #[test]
    fn detachment_of_unknown_port_leaves_domain_alone() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        let topo = builder.build_detachment(&request("unknown-container"), &state(2, &["afpacketc1"]));
        assert!(topo.bridging_domain.is_none());
        assert!(topo.previous_domain.is_none());
    }

    #[test]
    fn exhausted_subnet_fails_to_build() {
        let builder = TopologyBuilder::new(FabricConfig::default());
        assert!(builder.build_attachment(&request("c1"), &state(300, &[])).is_err());
    }
}

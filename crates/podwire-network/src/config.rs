//! Fabric parameters shared by the naming scheme and the topology builder.

use std::net::Ipv4Addr;

use podwire_common::{PodwireError, PodwireResult};
use serde::{Deserialize, Serialize};

/// Parameters of the node-local switching fabric.
///
/// These are fixed for the lifetime of an engine: changing them while
/// containers are attached would orphan the names derived earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FabricConfig {
    /// Network address of the container subnet.
    pub subnet: Ipv4Addr,
    /// Mask length of the container subnet.
    pub prefix_len: u8,
    /// Host part of the gateway address within the subnet.
    pub gateway_host: u32,
    /// Name of the shared bridging domain.
    pub bridging_domain: String,
    /// Name of the gateway (BVI) interface.
    pub gateway_interface: String,
    /// Hardware address of the gateway interface.
    pub gateway_mac: String,
    /// Prefix prepended to the host link name to form a switch port name.
    pub port_prefix: String,
    /// Prefix of namespace-side link names when the caller supplies none.
    pub interface_prefix: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            subnet: Ipv4Addr::new(10, 0, 0, 0),
            prefix_len: 24,
            gateway_host: 254,
            bridging_domain: "bd1".to_string(),
            gateway_interface: "loop1".to_string(),
            gateway_mac: "8a:f1:be:90:00:00".to_string(),
            port_prefix: "afpacket".to_string(),
            interface_prefix: "eth".to_string(),
        }
    }
}

impl FabricConfig {
    /// Set the container subnet.
    #[must_use]
    pub fn with_subnet(mut self, subnet: Ipv4Addr, prefix_len: u8) -> Self {
        self.subnet = subnet;
        self.prefix_len = prefix_len;
        self
    }

    /// Set the host part of the gateway address.
    #[must_use]
    pub fn with_gateway_host(mut self, host: u32) -> Self {
        self.gateway_host = host;
        self
    }

    /// Set the bridging domain name.
    #[must_use]
    pub fn with_bridging_domain(mut self, name: impl Into<String>) -> Self {
        self.bridging_domain = name.into();
        self
    }

    /// Set the gateway interface name.
    #[must_use]
    pub fn with_gateway_interface(mut self, name: impl Into<String>) -> Self {
        self.gateway_interface = name.into();
        self
    }

    /// Number of host addresses in the subnet, excluding network and broadcast.
    #[must_use]
    pub fn host_capacity(&self) -> u32 {
        match self.prefix_len {
            0 => u32::MAX - 1,
            len if len >= 31 => 0,
            len => (1u32 << (32 - u32::from(len))) - 2,
        }
    }

    /// Check that the parameters describe a usable fabric.
    ///
    /// # Errors
    ///
    /// Returns [`PodwireError::Config`] describing the first inconsistency found.
    pub fn validate(&self) -> PodwireResult<()> {
        if self.prefix_len > 30 {
            return Err(invalid(format!(
                "prefix length /{} leaves no room for containers",
                self.prefix_len
            )));
        }
        let host_mask = u32::MAX >> u32::from(self.prefix_len);
        if u32::from(self.subnet) & host_mask != 0 {
            return Err(invalid(format!(
                "{}/{} is not a network address",
                self.subnet, self.prefix_len
            )));
        }
        if self.gateway_host == 0 || self.gateway_host > self.host_capacity() {
            return Err(invalid(format!(
                "gateway host {} is outside the subnet",
                self.gateway_host
            )));
        }
        if self.bridging_domain.is_empty() || self.gateway_interface.is_empty() {
            return Err(invalid(
                "bridging domain and gateway interface need names".to_string(),
            ));
        }
        Ok(())
    }
}

fn invalid(message: String) -> PodwireError {
    PodwireError::Config { message }
}

//! Linux bridge management.
//!
//! [`LinuxBridgeSwitch`] realises the switch dataplane with a kernel
//! bridge: the bridging domain is the bridge, the gateway interface is the
//! bridge's own address, and each switch port enslaves its host link end.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{SwitchChanges, SwitchConfigurator};
use crate::error::{NetworkError, NetworkResult};
use crate::model::{BridgingDomain, GatewayInterface};
use crate::netns::{self, ip_command};

/// Bridge manager for container networking.
#[derive(Debug, Clone)]
pub struct BridgeManager {
    name: String,
}

impl BridgeManager {
    /// Create a bridge, or adopt it if it already exists, and bring it up.
    pub async fn create(name: &str) -> NetworkResult<Self> {
        tracing::debug!(name, "Creating bridge");

        if !Self::exists(name).await {
            netns::run(
                ip_command(None).args(["link", "add", "name", name, "type", "bridge"]),
                "create bridge",
            )
            .await?;
        }

        let bridge = Self {
            name: name.to_string(),
        };
        bridge.up().await?;

        tracing::info!(name, "Bridge ready");
        Ok(bridge)
    }

    /// Get an existing bridge.
    pub async fn get(name: &str) -> NetworkResult<Self> {
        if !Self::exists(name).await {
            return Err(NetworkError::InterfaceLookup {
                name: name.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Check if a link exists in the host namespace.
    pub async fn exists(name: &str) -> bool {
        ip_command(None)
            .args(["link", "show", name])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Get the bridge name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bring the bridge interface up.
    pub async fn up(&self) -> NetworkResult<()> {
        netns::run(
            ip_command(None).args(["link", "set", &self.name, "up"]),
            "bring bridge up",
        )
        .await
        .map(|_| ())
    }

    /// Set the bridge hardware address.
    pub async fn set_mac(&self, mac: &str) -> NetworkResult<()> {
        netns::run(
            ip_command(None).args(["link", "set", &self.name, "address", mac]),
            "set bridge mac",
        )
        .await
        .map(|_| ())
    }

    /// Assign an address to the bridge. An already-assigned address is kept.
    pub async fn set_ip(&self, ip_cidr: &str) -> NetworkResult<()> {
        tracing::debug!(bridge = %self.name, ip = ip_cidr, "Setting IP address");

        netns::run(
            ip_command(None).args(["addr", "replace", ip_cidr, "dev", &self.name]),
            "assign gateway address",
        )
        .await
        .map(|_| ())
    }

    /// Add an interface to the bridge with the domain's forwarding flags.
    pub async fn add_interface(&self, interface: &str, domain: &BridgingDomain) -> NetworkResult<()> {
        tracing::debug!(bridge = %self.name, interface, "Adding interface to bridge");

        if !Self::exists(interface).await {
            return Err(NetworkError::InterfaceLookup {
                name: interface.to_string(),
            });
        }

        netns::run(
            ip_command(None).args(["link", "set", interface, "master", &self.name]),
            "add interface to bridge",
        )
        .await?;

        netns::run(
            ip_command(None).args([
                "link",
                "set",
                "dev",
                interface,
                "type",
                "bridge_slave",
                "learning",
                on_off(domain.learn),
                "flood",
                on_off(domain.unknown_unicast_flood),
                "bcast_flood",
                on_off(domain.flood),
            ]),
            "set bridge port flags",
        )
        .await
        .map(|_| ())
    }

    /// Remove an interface from whatever bridge it belongs to.
    pub async fn remove_interface(interface: &str) -> NetworkResult<()> {
        netns::run_if_present(
            ip_command(None).args(["link", "set", interface, "nomaster"]),
            "remove interface from bridge",
        )
        .await
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

/// [`SwitchConfigurator`] backed by a Linux bridge.
#[derive(Debug, Default)]
pub struct LinuxBridgeSwitch {
    // switch port name -> host interface
    ports: Mutex<HashMap<String, String>>,
    gateway: Mutex<Option<GatewayInterface>>,
}

impl LinuxBridgeSwitch {
    /// Create a switch with no known ports.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the switch ports currently bound to a host interface.
    #[must_use]
    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.ports.lock().keys().cloned().collect();
        ports.sort();
        ports
    }

    /// The gateway configured on the bridge, if any.
    #[must_use]
    pub fn gateway(&self) -> Option<GatewayInterface> {
        self.gateway.lock().clone()
    }

    // Re-running for the same gateway adopts what an earlier, failed batch
    // left on the bridge.
    async fn create_gateway(&self, gateway: &GatewayInterface, domain: &str) -> NetworkResult<()> {
        let existing = self.gateway.lock().as_ref().map(|g| g.name.clone());
        if let Some(existing) = existing.filter(|name| *name != gateway.name) {
            return Err(NetworkError::backend(
                "create gateway",
                format!("gateway {existing} already configured"),
            ));
        }

        let bridge = BridgeManager::create(domain).await?;
        bridge.set_mac(&gateway.mac).await?;
        bridge.set_ip(&gateway.address.to_string()).await?;
        tracing::info!(bridge = %domain, address = %gateway.address, "Gateway configured on bridge");
        Ok(())
    }

    async fn update_domain(
        &self,
        domain: &BridgingDomain,
        known: &HashMap<String, String>,
    ) -> NetworkResult<()> {
        let bridge = BridgeManager::get(&domain.name).await?;

        let mut wanted = Vec::new();
        for member in domain.members.iter().filter(|m| !m.bvi) {
            let host = known.get(&member.name).ok_or_else(|| NetworkError::InterfaceLookup {
                name: member.name.clone(),
            })?;
            wanted.push(host.clone());
        }

        for host in &wanted {
            bridge.add_interface(host, domain).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SwitchConfigurator for LinuxBridgeSwitch {
    /// Apply one batch. The port table and gateway are only recorded once
    /// every step of the batch has succeeded.
    async fn apply_switch_changes(&self, changes: &SwitchChanges) -> NetworkResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut ports = self.ports.lock().clone();

        for port in &changes.delete_ports {
            BridgeManager::remove_interface(&port.host_interface).await?;
            ports.remove(&port.name);
        }

        for port in &changes.create_ports {
            if !BridgeManager::exists(&port.host_interface).await {
                return Err(NetworkError::InterfaceLookup {
                    name: port.host_interface.clone(),
                });
            }
            ports.insert(port.name.clone(), port.host_interface.clone());
        }

        if let Some(gateway) = &changes.create_gateway {
            let domain = changes
                .bridging_domain
                .as_ref()
                .map(|d| d.name.as_str())
                .ok_or_else(|| {
                    NetworkError::backend("create gateway", "no bridging domain given")
                })?;
            self.create_gateway(gateway, domain).await?;
        }

        if let Some(domain) = &changes.bridging_domain {
            self.update_domain(domain, &ports).await?;
        }

        *self.ports.lock() = ports;
        if let Some(gateway) = &changes.create_gateway {
            *self.gateway.lock() = Some(gateway.clone());
        }
        Ok(())
    }
}

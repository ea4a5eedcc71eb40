//! Virtual ethernet pairs between container namespaces and the host.

use async_trait::async_trait;

use crate::backend::LinkManager;
use crate::error::{NetworkError, NetworkResult};
use crate::model::LinkEnd;
use crate::netns::{self, ip_command};

/// Virtual ethernet pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPair {
    /// Host-side interface name.
    pub host: String,
    /// Container-side interface name.
    pub container: String,
    /// Namespace holding the container side.
    pub netns: String,
}

impl VethPair {
    /// Create a veth pair inside `netns` and move the host side to the
    /// host namespace (the namespace of PID 1).
    pub async fn create(netns: &str, container_name: &str, host_name: &str) -> NetworkResult<Self> {
        tracing::debug!(netns, container_name, host_name, "Creating veth pair");

        if !netns::netns_exists(netns) {
            return Err(NetworkError::backend(
                "create veth pair",
                format!("network namespace {netns} does not exist"),
            ));
        }

        netns::run(
            ip_command(Some(netns)).args([
                "link",
                "add",
                container_name,
                "type",
                "veth",
                "peer",
                "name",
                host_name,
                "netns",
                "1",
            ]),
            "create veth pair",
        )
        .await?;

        Ok(Self {
            host: host_name.to_string(),
            container: container_name.to_string(),
            netns: netns.to_string(),
        })
    }

    /// Configure the container side from its description.
    pub async fn configure_container(&self, end: &LinkEnd) -> NetworkResult<()> {
        let ns = Some(self.netns.as_str());

        if let Some(mac) = &end.mac {
            netns::run(
                ip_command(ns).args(["link", "set", &self.container, "address", mac]),
                "set container mac",
            )
            .await?;
        }

        for address in &end.addresses {
            netns::run(
                ip_command(ns).args(["addr", "add", &address.to_string(), "dev", &self.container]),
                "assign container address",
            )
            .await?;
        }

        if end.enabled {
            netns::run(
                ip_command(ns).args(["link", "set", &self.container, "up"]),
                "bring container link up",
            )
            .await?;
        }

        if let Some(gateway) = end.gateway {
            netns::run(
                ip_command(ns).args([
                    "route",
                    "replace",
                    "default",
                    "via",
                    &gateway.to_string(),
                    "dev",
                    &self.container,
                ]),
                "install default route",
            )
            .await?;
        }

        Ok(())
    }

    /// Delete the veth pair. Missing interfaces are not an error.
    pub async fn delete(&self) -> NetworkResult<()> {
        tracing::debug!(host = %self.host, "Deleting veth pair");
        delete_host_link(&self.host).await
    }
}

async fn delete_host_link(name: &str) -> NetworkResult<()> {
    netns::run_if_present(ip_command(None).args(["link", "delete", name]), "delete link").await
}

async fn set_host_link_up(name: &str) -> NetworkResult<()> {
    netns::run(
        ip_command(None).args(["link", "set", name, "up"]),
        "bring host link up",
    )
    .await
    .map(|_| ())
}

/// [`LinkManager`] driving the kernel through `ip` and `nsenter`.
#[derive(Debug, Default, Clone)]
pub struct IpLinkManager;

impl IpLinkManager {
    /// Create a link manager.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn create_pair(&self, end: &LinkEnd, netns: &str) -> NetworkResult<()> {
        let pair = VethPair::create(netns, &end.name, &end.peer).await?;

        if let Err(e) = pair.configure_container(end).await {
            if let Err(cleanup) = pair.delete().await {
                tracing::warn!(host = %pair.host, error = %cleanup, "Failed to remove half-configured veth pair");
            }
            return Err(e);
        }

        Ok(())
    }
}

#[async_trait]
impl LinkManager for IpLinkManager {
    async fn apply_link_changes(
        &self,
        create: &[LinkEnd],
        delete: &[LinkEnd],
    ) -> NetworkResult<()> {
        for end in delete {
            match &end.namespace {
                None => delete_host_link(&end.name).await?,
                Some(ns) if netns::netns_exists(ns) => {
                    netns::run_if_present(
                        ip_command(Some(ns)).args(["link", "delete", &end.name]),
                        "delete container link",
                    )
                    .await?;
                }
                Some(ns) => {
                    tracing::debug!(netns = %ns, link = %end.name, "Namespace gone; nothing to delete");
                }
            }
        }

        for end in create {
            if let Some(ns) = &end.namespace {
                self.create_pair(end, ns).await?;
            }
        }

        for end in create.iter().filter(|e| e.namespace.is_none() && e.enabled) {
            set_host_link_up(&end.name).await?;
        }

        Ok(())
    }
}

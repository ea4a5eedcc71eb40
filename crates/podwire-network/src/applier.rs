//! Transactional application of topologies to the backends.

use std::sync::Arc;

use crate::backend::{LinkManager, SwitchChanges, SwitchConfigurator};
use crate::error::NetworkResult;
use crate::model::LinkEnd;
use crate::topology::{AttachmentTopology, DetachmentTopology};

/// Sends each topology to both backends as one logical transaction.
#[derive(Clone)]
pub struct TransactionApplier {
    links: Arc<dyn LinkManager>,
    switch: Arc<dyn SwitchConfigurator>,
}

impl TransactionApplier {
    /// Create an applier over the two backends.
    pub fn new(links: Arc<dyn LinkManager>, switch: Arc<dyn SwitchConfigurator>) -> Self {
        Self { links, switch }
    }

    /// Install an attachment.
    ///
    /// Links go first since the switch port binds to the host end. If the
    /// switch rejects its half, the link pair is deleted again before the
    /// switch error is returned.
    ///
    /// # Errors
    ///
    /// Returns the first backend error, wrapped with the failed step.
    pub async fn apply(&self, topology: &AttachmentTopology) -> NetworkResult<()> {
        let ends = [
            topology.link_pair.namespace_end.clone(),
            topology.link_pair.host_end.clone(),
        ];

        self.links
            .apply_link_changes(&ends, &[])
            .await
            .map_err(|e| e.within("create link pair"))?;

        let changes = SwitchChanges {
            create_ports: vec![topology.switch_port.clone()],
            delete_ports: Vec::new(),
            create_gateway: topology.gateway.clone(),
            bridging_domain: Some(topology.bridging_domain.clone()),
        };

        if let Err(e) = self.switch.apply_switch_changes(&changes).await {
            if let Err(cleanup) = self.links.apply_link_changes(&[], &ends).await {
                tracing::warn!(
                    link = %topology.link_pair.host_end.name,
                    error = %cleanup,
                    "Failed to remove link pair after switch rejection"
                );
            }
            return Err(e.within("configure switch"));
        }

        Ok(())
    }

    /// Remove an attachment. The gateway is never removed.
    ///
    /// The switch port is released before its host link is deleted. If the
    /// link deletion then fails, the port and the previous domain membership
    /// are put back so the switch still matches the active port set.
    ///
    /// # Errors
    ///
    /// Returns the first backend error, wrapped with the failed step.
    pub async fn revert(&self, topology: &DetachmentTopology) -> NetworkResult<()> {
        let changes = SwitchChanges {
            create_ports: Vec::new(),
            delete_ports: vec![topology.switch_port.clone()],
            create_gateway: None,
            bridging_domain: topology.bridging_domain.clone(),
        };

        self.switch
            .apply_switch_changes(&changes)
            .await
            .map_err(|e| e.within("configure switch"))?;

        let ends: Vec<LinkEnd> = topology
            .link_pair
            .ends()
            .into_iter()
            .filter(|end| !end.name.is_empty())
            .cloned()
            .collect();

        if let Err(e) = self.links.apply_link_changes(&[], &ends).await {
            self.restore_port(topology).await;
            return Err(e.within("delete link pair"));
        }

        Ok(())
    }

    async fn restore_port(&self, topology: &DetachmentTopology) {
        let Some(previous) = &topology.previous_domain else {
            return;
        };

        let changes = SwitchChanges {
            create_ports: vec![topology.switch_port.clone()],
            delete_ports: Vec::new(),
            create_gateway: None,
            bridging_domain: Some(previous.clone()),
        };

        if let Err(restore) = self.switch.apply_switch_changes(&changes).await {
            tracing::warn!(
                port = %topology.switch_port.name,
                error = %restore,
                "Failed to restore switch port after link deletion failure"
            );
        }
    }
}

impl std::fmt::Debug for TransactionApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionApplier").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FabricConfig;
    use crate::memory::{MemoryLinkManager, MemorySwitch};
    use crate::model::AttachmentRequest;
    use crate::state::EngineState;
    use crate::topology::TopologyBuilder;
    use podwire_common::ContainerId;

    fn setup() -> (Arc<MemoryLinkManager>, Arc<MemorySwitch>, TransactionApplier) {
        let links = Arc::new(MemoryLinkManager::new());
        let switch = Arc::new(MemorySwitch::new());
        let applier = TransactionApplier::new(links.clone(), switch.clone());
        (links, switch, applier)
    }

    fn attachment(id: &str) -> AttachmentTopology {
        let request =
            AttachmentRequest::new(ContainerId::new(id).unwrap(), "eth0", "/proc/1/ns/net", "0.3.1");
        let state = EngineState {
            counter: 1,
            ..EngineState::default()
        };
        TopologyBuilder::new(FabricConfig::default())
            .build_attachment(&request, &state)
            .unwrap()
    }

    #[tokio::test]
    async fn apply_installs_links_and_switch_state() {
        let (links, switch, applier) = setup();
        applier.apply(&attachment("c1")).await.unwrap();

        assert!(links.has_host_link("c1"));
        assert_eq!(switch.ports(), ["afpacketc1"]);
        assert!(switch.gateway().is_some());
        assert!(switch.domain().unwrap().has_member("afpacketc1"));
    }

    #[tokio::test]
    async fn switch_failure_removes_created_links() {
        let (links, switch, applier) = setup();
        switch.fail_next("dataplane down");

        let err = applier.apply(&attachment("c1")).await.unwrap_err();
        assert!(err.to_string().contains("configure switch"));
        assert!(err.to_string().contains("dataplane down"));
        assert!(links.links().is_empty());
    }

    #[tokio::test]
    async fn link_delete_failure_restores_switch_port() {
        let (links, switch, applier) = setup();
        applier.apply(&attachment("c1")).await.unwrap();

        let request =
            AttachmentRequest::new(ContainerId::new("c1").unwrap(), "eth0", "/proc/1/ns/net", "0.3.1");
        let state = EngineState {
            counter: 1,
            gateway_initialized: true,
            active_ports: ["afpacketc1".to_string()].into(),
        };
        let detachment = TopologyBuilder::new(FabricConfig::default()).build_detachment(&request, &state);

        links.fail_next("netlink busy");
        let err = applier.revert(&detachment).await.unwrap_err();
        assert!(err.to_string().contains("delete link pair"));

        assert_eq!(switch.ports(), ["afpacketc1"]);
        assert!(switch.domain().unwrap().has_member("afpacketc1"));
        assert!(links.has_host_link("c1"));
    }

    #[tokio::test]
    async fn link_failure_skips_switch() {
        let (links, switch, applier) = setup();
        links.fail_next("netlink busy");

        let err = applier.apply(&attachment("c1")).await.unwrap_err();
        assert!(err.to_string().contains("create link pair"));
        assert!(switch.history().is_empty());
    }
}

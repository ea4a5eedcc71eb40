//! The attachment engine.
//!
//! One engine exists per node. It owns the [`EngineState`] behind a single
//! async mutex held for the whole of every attach and detach, backend I/O
//! included, so bridging domain membership is always read and rewritten
//! atomically with respect to other calls.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::applier::TransactionApplier;
use crate::backend::{LinkManager, SwitchConfigurator};
use crate::config::FabricConfig;
use crate::error::NetworkResult;
use crate::mirror::PersistenceMirror;
use crate::model::{
    AttachResult, AttachmentRequest, InterfaceResult, IpFamily, IpResult, RouteResult,
};
use crate::naming;
use crate::state::EngineState;
use crate::topology::{AttachmentTopology, TopologyBuilder};

/// Serializes attach and detach calls against the fabric.
#[derive(Debug)]
pub struct AttachmentEngine {
    state: Mutex<EngineState>,
    builder: TopologyBuilder,
    applier: TransactionApplier,
    mirror: Option<PersistenceMirror>,
}

impl AttachmentEngine {
    /// Create an engine with no attachments.
    pub fn new(
        config: FabricConfig,
        links: Arc<dyn LinkManager>,
        switch: Arc<dyn SwitchConfigurator>,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            builder: TopologyBuilder::new(config),
            applier: TransactionApplier::new(links, switch),
            mirror: None,
        }
    }

    /// Publish every applied change through `mirror`.
    #[must_use]
    pub fn with_mirror(mut self, mirror: PersistenceMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Fabric parameters in use.
    #[must_use]
    pub fn config(&self) -> &FabricConfig {
        self.builder.config()
    }

    /// Copy of the current bookkeeping.
    pub async fn snapshot(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Connect a container namespace to the fabric.
    ///
    /// The attachment counter is consumed even when the call fails, so an
    /// address is never handed out twice.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetworkError::Naming`] if the subnet or the counter is exhausted
    /// and [`crate::NetworkError::BackendApply`] if a backend rejected the
    /// transaction. Neither leaves a trace in the active port set.
    #[tracing::instrument(
        skip(self, request),
        fields(container = %request.container_id, ifname = %request.interface_name)
    )]
    pub async fn attach(&self, request: &AttachmentRequest) -> NetworkResult<AttachResult> {
        let mut state = self.state.lock().await;

        state.advance()?;
        let topology = self.builder.build_attachment(request, &state)?;
        let port = &topology.switch_port.name;

        if state.active_ports.contains(port) {
            tracing::warn!(
                port = %port,
                "Switch port already active; container ID prefix collides with a live attachment"
            );
        }

        let desired = state.with_port(port);

        if let Err(e) = self.applier.apply(&topology).await {
            tracing::error!(counter = state.counter, error = %e, "Attach failed");
            return Err(e.within(&format!("attach {}", request.container_id)));
        }

        if topology.gateway.is_some() {
            tracing::info!(
                gateway = %self.config().gateway_interface,
                domain = %self.config().bridging_domain,
                "Gateway interface initialized"
            );
        }
        *state = desired;

        if let Some(mirror) = &self.mirror {
            mirror.publish_attachment(&topology).await;
        }

        tracing::info!(
            counter = state.counter,
            port = %port,
            members = state.active_ports.len(),
            "Container attached"
        );

        self.attach_result(&topology)
    }

    /// Disconnect a container namespace from the fabric.
    ///
    /// Detaching a container that was never attached issues delete-if-present
    /// transactions and succeeds without touching the bookkeeping.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NetworkError::BackendApply`] if a backend rejected
    /// the removal; the active port set is then left as it was.
    #[tracing::instrument(
        skip(self, request),
        fields(container = %request.container_id, ifname = %request.interface_name)
    )]
    pub async fn detach(&self, request: &AttachmentRequest) -> NetworkResult<()> {
        let mut state = self.state.lock().await;

        let topology = self.builder.build_detachment(request, &state);
        let port = &topology.switch_port.name;
        let desired = state.without_port(port);

        if topology.bridging_domain.is_none() {
            tracing::debug!(port = %port, "Port not active; removal is delete-if-present");
        }

        if let Err(e) = self.applier.revert(&topology).await {
            tracing::error!(error = %e, "Detach failed");
            return Err(e.within(&format!("detach {}", request.container_id)));
        }

        *state = desired;

        if let Some(mirror) = &self.mirror {
            mirror.publish_detachment(&topology).await;
        }

        tracing::info!(
            port = %port,
            members = state.active_ports.len(),
            "Container detached"
        );

        Ok(())
    }

    fn attach_result(&self, topology: &AttachmentTopology) -> NetworkResult<AttachResult> {
        let end = &topology.link_pair.namespace_end;
        let gateway = naming::gateway_address(self.config())?;

        let ip_addresses = end
            .addresses
            .iter()
            .map(|address| IpResult {
                address: address.to_string(),
                gateway: gateway.to_string(),
                family: IpFamily::V4,
            })
            .collect();

        Ok(AttachResult {
            interfaces: vec![InterfaceResult {
                name: end.name.clone(),
                mac: end.mac.clone().unwrap_or_default(),
                sandbox: end.namespace.clone().unwrap_or_default(),
                ip_addresses,
            }],
            routes: vec![RouteResult {
                dst: "0.0.0.0/0".to_string(),
                gw: gateway.ip().to_string(),
            }],
        })
    }
}

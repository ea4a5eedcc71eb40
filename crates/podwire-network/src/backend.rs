//! Interfaces of the two configuration backends.
//!
//! Each call is one transaction from the engine's point of view: the
//! backend either applies the whole batch or reports an error. Deletes
//! are delete-if-present so that detaching an unknown container is a
//! no-op rather than a failure.

use async_trait::async_trait;

use crate::error::NetworkResult;
use crate::model::{BridgingDomain, GatewayInterface, LinkEnd, SwitchPort};

/// Manages link pairs in the host and container namespaces.
#[async_trait]
pub trait LinkManager: Send + Sync {
    /// Create the ends in `create` and delete the ends in `delete`.
    ///
    /// Ends are given namespace end first; a pair is created from its
    /// namespace end and peer name.
    async fn apply_link_changes(&self, create: &[LinkEnd], delete: &[LinkEnd])
    -> NetworkResult<()>;
}

/// One batch of switch configuration changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchChanges {
    /// Switch ports to create.
    pub create_ports: Vec<SwitchPort>,
    /// Switch ports to delete.
    pub delete_ports: Vec<SwitchPort>,
    /// Gateway interface to create.
    pub create_gateway: Option<GatewayInterface>,
    /// Full desired bridging domain; `None` leaves the domain untouched.
    pub bridging_domain: Option<BridgingDomain>,
}

impl SwitchChanges {
    /// Whether the batch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.create_ports.is_empty()
            && self.delete_ports.is_empty()
            && self.create_gateway.is_none()
            && self.bridging_domain.is_none()
    }
}

/// Configures the switch dataplane.
#[async_trait]
pub trait SwitchConfigurator: Send + Sync {
    /// Apply one batch of switch changes.
    async fn apply_switch_changes(&self, changes: &SwitchChanges) -> NetworkResult<()>;
}

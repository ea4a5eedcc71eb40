//! In-process backends.
//!
//! [`MemorySwitch`] models the switch dataplane well enough to check the
//! invariants the engine relies on (single gateway, domain members must
//! exist, idempotent deletes). [`MemoryLinkManager`] does the same for
//! link pairs. Both can be told to fail their next transaction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{LinkManager, SwitchChanges, SwitchConfigurator};
use crate::error::{NetworkError, NetworkResult};
use crate::model::{BridgingDomain, GatewayInterface, LinkEnd, SwitchPort};

/// Link table keyed by (namespace, name).
#[derive(Debug, Default)]
pub struct MemoryLinkManager {
    links: Mutex<BTreeMap<(Option<String>, String), LinkEnd>>,
    fail_next: Mutex<Option<String>>,
}

impl MemoryLinkManager {
    /// Create an empty link table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// All link ends currently present.
    #[must_use]
    pub fn links(&self) -> Vec<LinkEnd> {
        self.links.lock().values().cloned().collect()
    }

    /// Whether a host-namespace link named `name` exists.
    #[must_use]
    pub fn has_host_link(&self, name: &str) -> bool {
        self.links.lock().contains_key(&(None, name.to_string()))
    }
}

#[async_trait]
impl LinkManager for MemoryLinkManager {
    async fn apply_link_changes(
        &self,
        create: &[LinkEnd],
        delete: &[LinkEnd],
    ) -> NetworkResult<()> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(NetworkError::backend("apply link changes", message));
        }

        let mut links = self.links.lock();

        for end in create {
            let key = (end.namespace.clone(), end.name.clone());
            if links.contains_key(&key) {
                return Err(NetworkError::backend(
                    "create link",
                    format!("link {} already exists", end.name),
                ));
            }
        }

        for end in delete {
            links.remove(&(end.namespace.clone(), end.name.clone()));
            // Deleting one end of a pair takes its peer with it.
            links.retain(|_, other| other.peer != end.name || other.name != end.peer);
        }

        for end in create {
            links.insert((end.namespace.clone(), end.name.clone()), end.clone());
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct SwitchTables {
    ports: BTreeMap<String, SwitchPort>,
    gateway: Option<GatewayInterface>,
    domain: Option<BridgingDomain>,
    history: Vec<SwitchChanges>,
}

/// In-process model of the switch dataplane.
#[derive(Debug, Default)]
pub struct MemorySwitch {
    tables: Mutex<SwitchTables>,
    fail_next: Mutex<Option<String>>,
}

impl MemorySwitch {
    /// Create an empty switch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next transaction fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// Names of all configured switch ports.
    #[must_use]
    pub fn ports(&self) -> Vec<String> {
        self.tables.lock().ports.keys().cloned().collect()
    }

    /// The gateway interface, if created.
    #[must_use]
    pub fn gateway(&self) -> Option<GatewayInterface> {
        self.tables.lock().gateway.clone()
    }

    /// The bridging domain, if created.
    #[must_use]
    pub fn domain(&self) -> Option<BridgingDomain> {
        self.tables.lock().domain.clone()
    }

    /// Every successfully applied batch, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<SwitchChanges> {
        self.tables.lock().history.clone()
    }

    /// Number of applied batches that created the gateway.
    #[must_use]
    pub fn gateway_creations(&self) -> usize {
        self.tables
            .lock()
            .history
            .iter()
            .filter(|c| c.create_gateway.is_some())
            .count()
    }

    fn check(tables: &SwitchTables, changes: &SwitchChanges) -> Result<(), String> {
        if changes.create_gateway.is_some() && tables.gateway.is_some() {
            return Err("gateway interface already exists".to_string());
        }
        for port in &changes.create_ports {
            if tables.ports.contains_key(&port.name) {
                return Err(format!("switch port {} already exists", port.name));
            }
        }

        let Some(domain) = &changes.bridging_domain else {
            return Ok(());
        };
        let gateway = changes.create_gateway.as_ref().or(tables.gateway.as_ref());
        for member in &domain.members {
            let known = if member.bvi {
                gateway.is_some_and(|g| g.name == member.name)
            } else {
                let deleted = changes.delete_ports.iter().any(|p| p.name == member.name);
                let created = changes.create_ports.iter().any(|p| p.name == member.name);
                created || (!deleted && tables.ports.contains_key(&member.name))
            };
            if !known {
                return Err(format!(
                    "bridging domain {} references unknown interface {}",
                    domain.name, member.name
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SwitchConfigurator for MemorySwitch {
    async fn apply_switch_changes(&self, changes: &SwitchChanges) -> NetworkResult<()> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(NetworkError::backend("apply switch changes", message));
        }

        let mut tables = self.tables.lock();
        Self::check(&tables, changes)
            .map_err(|message| NetworkError::backend("apply switch changes", message))?;

        for port in &changes.delete_ports {
            tables.ports.remove(&port.name);
        }
        for port in &changes.create_ports {
            tables.ports.insert(port.name.clone(), port.clone());
        }
        if let Some(gateway) = &changes.create_gateway {
            tables.gateway = Some(gateway.clone());
        }
        if let Some(domain) = &changes.bridging_domain {
            tables.domain = Some(domain.clone());
        }
        tables.history.push(changes.clone());

        Ok(())
    }
}

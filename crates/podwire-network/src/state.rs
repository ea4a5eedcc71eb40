//! Engine bookkeeping.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::{NetworkError, NetworkResult};

/// Lifecycle phase of the fabric as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnginePhase {
    /// No gateway and no members yet.
    Uninitialized,
    /// Gateway created; the domain holds zero or more switch ports.
    Active,
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Authoritative in-memory bookkeeping of the attachment engine.
///
/// Updates are value based: an operation derives the desired state from
/// the current one and assigns it back only after the backends accepted
/// the transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineState {
    /// Number of attachments ever started. Never decreases.
    pub counter: u32,
    /// Whether the gateway interface and bridging domain exist.
    pub gateway_initialized: bool,
    /// Switch ports currently members of the bridging domain.
    pub active_ports: BTreeSet<String>,
}

impl EngineState {
    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> EnginePhase {
        if self.gateway_initialized {
            EnginePhase::Active
        } else {
            EnginePhase::Uninitialized
        }
    }

    /// Consume the next attachment number.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::Naming`] once the counter cannot grow.
    pub fn advance(&mut self) -> NetworkResult<u32> {
        self.counter = self.counter.checked_add(1).ok_or_else(|| NetworkError::Naming {
            message: "attachment counter exhausted".to_string(),
        })?;
        Ok(self.counter)
    }

    /// State after a successful attach of `port`.
    #[must_use]
    pub fn with_port(&self, port: &str) -> Self {
        let mut next = self.clone();
        next.active_ports.insert(port.to_string());
        next.gateway_initialized = true;
        next
    }

    /// State after a successful detach of `port`.
    #[must_use]
    pub fn without_port(&self, port: &str) -> Self {
        let mut next = self.clone();
        next.active_ports.remove(port);
        next
    }
}

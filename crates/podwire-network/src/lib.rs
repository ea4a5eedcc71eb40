//! # podwire-network
//!
//! Attachment engine for the podwire switch fabric.
//!
//! A container is attached by creating a link pair between its network
//! namespace and the host, terminating the host end in a switch port, and
//! adding that port to the node's single bridging domain. The first
//! attachment also creates the domain's gateway interface.
//!
//! The engine talks to the outside world through two backend traits,
//! [`LinkManager`] and [`SwitchConfigurator`], and optionally publishes what
//! it applied through a [`PersistenceMirror`].

#![warn(missing_docs)]

pub mod applier;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod mirror;
pub mod model;
pub mod naming;
pub mod netns;
pub mod state;
pub mod topology;
pub mod veth;

pub use applier::TransactionApplier;
pub use backend::{LinkManager, SwitchChanges, SwitchConfigurator};
pub use bridge::{BridgeManager, LinuxBridgeSwitch};
pub use config::FabricConfig;
pub use engine::AttachmentEngine;
pub use error::{NetworkError, NetworkResult};
pub use memory::{MemoryLinkManager, MemorySwitch};
pub use mirror::{FileStore, MemoryStore, MirrorStore, PersistenceMirror};
pub use model::{
    AttachResult, AttachmentRequest, BridgeMember, BridgingDomain, GatewayInterface,
    InterfaceResult, IpFamily, IpResult, LinkEnd, LinkPair, RouteResult, SwitchPort,
};
pub use state::{EnginePhase, EngineState};
pub use topology::{AttachmentTopology, DetachmentTopology, TopologyBuilder};
pub use veth::{IpLinkManager, VethPair};

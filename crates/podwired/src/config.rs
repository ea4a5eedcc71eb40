//! Daemon configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! command-line flags. Both backends default to their in-process models;
//! `--link-backend ip --switch-backend linux-bridge` wires real interfaces.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use podwire_common::{PodwireError, PodwirePaths, PodwireResult};
use podwire_network::{
    AttachmentEngine, FabricConfig, FileStore, IpLinkManager, LinkManager, LinuxBridgeSwitch,
    MemoryLinkManager, MemoryStore, MemorySwitch, PersistenceMirror, SwitchConfigurator,
};
use serde::{Deserialize, Serialize};

/// Which switch configurator drives the dataplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SwitchBackend {
    /// In-process switch model.
    #[default]
    Memory,
    /// Kernel bridge.
    LinuxBridge,
}

/// Which link manager creates link pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LinkBackend {
    /// In-process link table.
    #[default]
    Memory,
    /// `ip` and `nsenter` commands.
    Ip,
}

/// Where applied resources are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorKind {
    /// No mirror.
    None,
    /// In-process store.
    Memory,
    /// JSON files under the store directory.
    #[default]
    File,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// Address the CNI gRPC service listens on.
    pub grpc_addr: SocketAddr,
    /// Port of the HTTP status API; 0 disables it.
    pub http_port: u16,
    /// Root directory for daemon data.
    pub root: PathBuf,
    /// Switch backend.
    pub switch_backend: SwitchBackend,
    /// Link backend.
    pub link_backend: LinkBackend,
    /// Persistence mirror.
    pub mirror: MirrorKind,
    /// Log output format.
    pub log_format: LogFormat,
    /// Fabric parameters.
    pub fabric: FabricConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            grpc_addr: SocketAddr::from(([127, 0, 0, 1], 9111)),
            http_port: 9999,
            root: PodwirePaths::default().root,
            switch_backend: SwitchBackend::default(),
            link_backend: LinkBackend::default(),
            mirror: MirrorKind::default(),
            log_format: LogFormat::default(),
            fabric: FabricConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PodwireError::Config`] if the TOML is malformed.
    pub fn from_toml(content: &str) -> PodwireResult<Self> {
        toml::from_str(content).map_err(|e| PodwireError::Config {
            message: format!("Failed to parse configuration: {e}"),
        })
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> PodwireResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Resolve the configuration for a daemon start.
    ///
    /// An explicit `path` is always loaded. Otherwise `podwired.toml` under
    /// `root` is used when present, and the defaults when it is not.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be read or parsed.
    pub fn discover(path: Option<&Path>, root: &Path) -> PodwireResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let fallback = PodwirePaths::with_root(root).config_file();
        if fallback.is_file() {
            tracing::debug!(path = %fallback.display(), "Using configuration under root");
            Self::load(&fallback)
        } else {
            Ok(Self {
                root: root.to_path_buf(),
                ..Self::default()
            })
        }
    }

    /// Paths derived from the configured root.
    #[must_use]
    pub fn paths(&self) -> PodwirePaths {
        PodwirePaths::with_root(&self.root)
    }

    /// Check the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`PodwireError::Config`] describing the problem.
    pub fn validate(&self) -> PodwireResult<()> {
        self.fabric.validate()
    }

    /// Build the attachment engine with the configured backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store
    /// directory cannot be created.
    pub fn build_engine(&self) -> PodwireResult<AttachmentEngine> {
        self.validate()?;

        let links: Arc<dyn LinkManager> = match self.link_backend {
            LinkBackend::Memory => Arc::new(MemoryLinkManager::new()),
            LinkBackend::Ip => Arc::new(IpLinkManager::new()),
        };
        let switch: Arc<dyn SwitchConfigurator> = match self.switch_backend {
            SwitchBackend::Memory => Arc::new(MemorySwitch::new()),
            SwitchBackend::LinuxBridge => Arc::new(LinuxBridgeSwitch::new()),
        };

        if self.link_backend == LinkBackend::Ip && self.switch_backend == SwitchBackend::Memory {
            tracing::warn!("Real links with the in-process switch: host ends stay unbridged");
        }

        let engine = AttachmentEngine::new(self.fabric.clone(), links, switch);

        let engine = match self.mirror {
            MirrorKind::None => engine,
            MirrorKind::Memory => engine.with_mirror(PersistenceMirror::new(MemoryStore::new())),
            MirrorKind::File => {
                let dir = self.paths().store();
                std::fs::create_dir_all(&dir)?;
                engine.with_mirror(PersistenceMirror::new(FileStore::new(dir)))
            }
        };

        tracing::debug!(
            links = ?self.link_backend,
            switch = ?self.switch_backend,
            mirror = ?self.mirror,
            "Attachment engine built"
        );
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.grpc_addr.port(), 9111);
        assert_eq!(config.link_backend, LinkBackend::Memory);
        assert_eq!(config.switch_backend, SwitchBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_toml() {
        let config = DaemonConfig::from_toml(
            r#"
grpc-addr = "127.0.0.1:7000"
switch-backend = "linux-bridge"
mirror = "none"

[fabric]
subnet = "172.30.0.0"
prefix-len = 16
gateway-host = 1
bridging-domain = "pods"
"#,
        )
        .unwrap();

        assert_eq!(config.grpc_addr.port(), 7000);
        assert_eq!(config.switch_backend, SwitchBackend::LinuxBridge);
        assert_eq!(config.mirror, MirrorKind::None);
        assert_eq!(config.fabric.prefix_len, 16);
        assert_eq!(config.fabric.bridging_domain, "pods");
        assert_eq!(config.fabric.port_prefix, "afpacket");
        assert_eq!(config.http_port, 9999);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = DaemonConfig::from_toml("grpc-addr = 5").unwrap_err();
        assert!(matches!(err, PodwireError::Config { .. }));
    }

    #[test]
    fn invalid_fabric_is_rejected() {
        let mut config = DaemonConfig::default();
        config.fabric.gateway_host = 0;
        assert!(matches!(
            config.validate(),
            Err(PodwireError::Config { .. })
        ));
    }

    #[test]
    fn discover_prefers_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("podwired.toml"), "http-port = 1").unwrap();
        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "http-port = 2").unwrap();

        let config = DaemonConfig::discover(Some(&explicit), dir.path()).unwrap();
        assert_eq!(config.http_port, 2);
    }

    #[test]
    fn discover_falls_back_to_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("podwired.toml"), "http-port = 1").unwrap();

        let config = DaemonConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.http_port, 1);
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::discover(None, dir.path()).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.http_port, 9999);
    }

    #[tokio::test]
    async fn file_mirror_creates_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig {
            root: dir.path().to_path_buf(),
            ..DaemonConfig::default()
        };
        let engine = config.build_engine().unwrap();
        assert!(config.paths().store().is_dir());
        assert_eq!(engine.snapshot().await.counter, 0);
    }
}

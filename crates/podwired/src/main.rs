//! podwired - podwire node daemon.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use podwire_common::PodwirePaths;
use podwired::{DaemonConfig, LinkBackend, LogFormat, MirrorKind, SwitchBackend, api, grpc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, env = "PODWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Address the CNI gRPC service listens on
    #[arg(long, env = "PODWIRE_GRPC_ADDR")]
    grpc_addr: Option<SocketAddr>,

    /// HTTP status port (0 disables)
    #[arg(long)]
    http_port: Option<u16>,

    /// Root directory for daemon data
    #[arg(long, env = "PODWIRE_ROOT")]
    root: Option<PathBuf>,

    /// Switch backend
    #[arg(long, value_enum)]
    switch_backend: Option<SwitchBackend>,

    /// Link backend
    #[arg(long, value_enum)]
    link_backend: Option<LinkBackend>,

    /// Persistence mirror
    #[arg(long, value_enum)]
    mirror: Option<MirrorKind>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<DaemonConfig> {
        let root = self
            .root
            .clone()
            .unwrap_or_else(|| PodwirePaths::default().root);
        let mut config = DaemonConfig::discover(self.config.as_deref(), &root)
            .context("loading configuration")?;

        if let Some(addr) = self.grpc_addr {
            config.grpc_addr = addr;
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(backend) = self.switch_backend {
            config.switch_backend = backend;
        }
        if let Some(backend) = self.link_backend {
            config.link_backend = backend;
        }
        if let Some(mirror) = self.mirror {
            config.mirror = mirror;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    init_tracing(config.log_format);

    let engine = Arc::new(
        config
            .build_engine()
            .context("failed to build attachment engine")?,
    );

    let paths = config.paths();
    if let Err(e) = paths
        .create_dirs()
        .and_then(|()| std::fs::write(paths.pid_file(), std::process::id().to_string()))
    {
        tracing::warn!(error = %e, "Failed to write pid file");
    }

    let grpc_addr = config.grpc_addr;
    let grpc_engine = Arc::clone(&engine);
    let grpc_handle = tokio::spawn(async move {
        tracing::info!("gRPC server listening on {}", grpc_addr);
        tonic::transport::Server::builder()
            .add_service(grpc::grpc_server(grpc_engine))
            .serve(grpc_addr)
            .await
            .context("gRPC server failed")
    });

    let http_handle = if config.http_port == 0 {
        None
    } else {
        let http_addr = SocketAddr::from(([127, 0, 0, 1], config.http_port));
        let app = api::server::app(Arc::clone(&engine));
        Some(tokio::spawn(async move {
            tracing::info!("HTTP server listening on {}", http_addr);
            let listener = tokio::net::TcpListener::bind(http_addr)
                .await
                .context("binding HTTP listener")?;
            axum::serve(listener, app).await.context("HTTP server failed")
        }))
    };

    tracing::info!(
        grpc = %config.grpc_addr,
        http = config.http_port,
        subnet = %config.fabric.subnet,
        "podwired started"
    );

    let http_wait = async {
        match http_handle {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        res = grpc_handle => {
            tracing::error!(result = ?res, "gRPC server exited unexpectedly");
        }
        res = http_wait => {
            tracing::error!(result = ?res, "HTTP server exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    let _ = std::fs::remove_file(paths.pid_file());
    Ok(())
}

//! gRPC front end for the CNI plugin.
//!
//! Translates `Add`/`Delete` calls into engine operations. Engine failures
//! are reported inside the reply (`result != 0`), the way the plugin
//! expects; transport errors are reserved for malformed requests.

use std::sync::Arc;

use podwire_common::ContainerId;
use podwire_network::{AttachResult, AttachmentEngine, AttachmentRequest, IpFamily, NetworkError};
use tonic::{Request, Response, Status};

// Include generated protobuf code
#[allow(missing_docs)]
pub mod cni_proto {
    tonic::include_proto!("cni");
}

use cni_proto::cni_reply::interface::Ip;
use cni_proto::cni_reply::interface::ip::Version;
use cni_proto::cni_reply::{Interface, Route};
use cni_proto::remote_cni_server::{RemoteCni, RemoteCniServer};
use cni_proto::{CniReply, CniRequest};

/// Result code of a failed operation.
pub const RESULT_ERROR: u32 = 1;

/// Remote CNI service backed by the attachment engine.
pub struct RemoteCniService {
    engine: Arc<AttachmentEngine>,
}

impl RemoteCniService {
    /// Create a service driving `engine`.
    pub fn new(engine: Arc<AttachmentEngine>) -> Self {
        Self { engine }
    }
}

/// Convert a wire request into an engine request.
///
/// # Errors
///
/// Returns `invalid_argument` if the container ID is unusable.
pub fn attachment_request(req: CniRequest) -> Result<AttachmentRequest, Status> {
    let container_id = ContainerId::new(req.container_id)
        .map_err(|e| Status::invalid_argument(e.to_string()))?;

    Ok(AttachmentRequest {
        container_id,
        interface_name: req.interface_name,
        network_namespace: req.network_namespace,
        version: req.version,
        extra_args: req.extra_arguments,
    })
}

/// Build the reply for a successful attach.
#[must_use]
pub fn success_reply(result: AttachResult) -> CniReply {
    let interfaces = result
        .interfaces
        .into_iter()
        .map(|iface| Interface {
            name: iface.name,
            mac: iface.mac,
            sandbox: iface.sandbox,
            ip_addresses: iface
                .ip_addresses
                .into_iter()
                .map(|ip| Ip {
                    version: match ip.family {
                        IpFamily::V4 => Version::Ipv4,
                        IpFamily::V6 => Version::Ipv6,
                    }
                    .into(),
                    address: ip.address,
                    gateway: ip.gateway,
                })
                .collect(),
        })
        .collect();

    let routes = result
        .routes
        .into_iter()
        .map(|route| Route {
            dst: route.dst,
            gw: route.gw,
        })
        .collect();

    CniReply {
        interfaces,
        routes,
        ..CniReply::default()
    }
}

/// Build the reply for a failed operation.
#[must_use]
pub fn error_reply(err: &NetworkError) -> CniReply {
    CniReply {
        result: RESULT_ERROR,
        error: err.to_string(),
        ..CniReply::default()
    }
}

fn log_extra_args(request: &AttachmentRequest) {
    for (key, value) in &request.extra_args {
        tracing::debug!(container = %request.container_id, key = %key, value = %value, "Extra CNI argument");
    }
}

#[tonic::async_trait]
impl RemoteCni for RemoteCniService {
    async fn add(&self, request: Request<CniRequest>) -> Result<Response<CniReply>, Status> {
        let req = attachment_request(request.into_inner())?;
        tracing::info!(
            container = %req.container_id,
            ifname = %req.interface_name,
            netns = %req.network_namespace,
            version = %req.version,
            "Add request received"
        );
        log_extra_args(&req);

        // Detached: a dropped call must not cancel a half-applied change.
        let engine = Arc::clone(&self.engine);
        let outcome = tokio::spawn(async move { engine.attach(&req).await })
            .await
            .map_err(|e| Status::internal(format!("attach task failed: {e}")))?;

        match outcome {
            Ok(result) => Ok(Response::new(success_reply(result))),
            Err(e) => {
                tracing::warn!(error = %e, "Add request failed");
                Ok(Response::new(error_reply(&e)))
            }
        }
    }

    async fn delete(&self, request: Request<CniRequest>) -> Result<Response<CniReply>, Status> {
        let req = attachment_request(request.into_inner())?;
        tracing::info!(
            container = %req.container_id,
            ifname = %req.interface_name,
            netns = %req.network_namespace,
            "Delete request received"
        );
        log_extra_args(&req);

        let engine = Arc::clone(&self.engine);
        let outcome = tokio::spawn(async move { engine.detach(&req).await })
            .await
            .map_err(|e| Status::internal(format!("detach task failed: {e}")))?;

        match outcome {
            Ok(()) => Ok(Response::new(CniReply::default())),
            Err(e) => {
                tracing::warn!(error = %e, "Delete request failed");
                Ok(Response::new(error_reply(&e)))
            }
        }
    }
}

/// Create the gRPC server around an engine.
pub fn grpc_server(engine: Arc<AttachmentEngine>) -> RemoteCniServer<RemoteCniService> {
    RemoteCniServer::new(RemoteCniService::new(engine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use podwire_network::{InterfaceResult, IpResult, RouteResult};

    fn wire_request(id: &str) -> CniRequest {
        CniRequest {
            version: "0.2.3".to_string(),
            container_id: id.to_string(),
            interface_name: "eth0".to_string(),
            network_namespace: "/var/run/2345243".to_string(),
            ..CniRequest::default()
        }
    }

    #[test]
    fn converts_request() {
        let mut wire = wire_request("sadfja813227wdhfjkh2319784dgh");
        wire.extra_arguments
            .insert("K8S_POD_NAME".to_string(), "web-0".to_string());

        let req = attachment_request(wire).unwrap();
        assert_eq!(req.container_id.as_str(), "sadfja813227wdhfjkh2319784dgh");
        assert_eq!(req.interface_name, "eth0");
        assert_eq!(req.network_namespace, "/var/run/2345243");
        assert_eq!(req.extra_args["K8S_POD_NAME"], "web-0");
    }

    #[test]
    fn empty_container_id_is_invalid_argument() {
        let status = attachment_request(wire_request("")).unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn success_reply_carries_interfaces_and_routes() {
        let reply = success_reply(AttachResult {
            interfaces: vec![InterfaceResult {
                name: "eth0".to_string(),
                mac: "02:fe:0a:00:00:01".to_string(),
                sandbox: "/var/run/2345243".to_string(),
                ip_addresses: vec![IpResult {
                    address: "10.0.0.1/24".to_string(),
                    gateway: "10.0.0.254/24".to_string(),
                    family: IpFamily::V4,
                }],
            }],
            routes: vec![RouteResult {
                dst: "0.0.0.0/0".to_string(),
                gw: "10.0.0.254".to_string(),
            }],
        });

        assert_eq!(reply.result, 0);
        assert!(reply.error.is_empty());
        let ip = &reply.interfaces[0].ip_addresses[0];
        assert_eq!(ip.version(), Version::Ipv4);
        assert_eq!(ip.address, "10.0.0.1/24");
        assert_eq!(reply.routes[0].gw, "10.0.0.254");
    }

    #[test]
    fn error_reply_sets_result_code() {
        let reply = error_reply(&NetworkError::backend("configure switch", "down"));
        assert_eq!(reply.result, RESULT_ERROR);
        assert_eq!(reply.error, "Failed to configure switch: down");
        assert!(reply.interfaces.is_empty());
    }
}

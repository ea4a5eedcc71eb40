//! Running `ip` inside network namespaces.
//!
//! Namespaces are addressed by path (e.g. `/proc/<pid>/ns/net` or
//! `/var/run/netns/<name>`), as handed over by the container runtime.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;

use crate::error::{NetworkError, NetworkResult};

/// Check whether a network namespace path exists.
#[must_use]
pub fn netns_exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// An `ip` command, run inside `netns` when given, in the host namespace otherwise.
#[must_use]
pub fn ip_command(netns: Option<&str>) -> Command {
    match netns {
        Some(path) => {
            let mut cmd = Command::new("nsenter");
            cmd.arg(format!("--net={path}")).arg("ip");
            cmd
        }
        None => Command::new("ip"),
    }
}

/// Run `cmd`, turning a spawn failure or non-zero exit into a backend error.
pub(crate) async fn run(cmd: &mut Command, operation: &str) -> NetworkResult<Output> {
    let output = cmd
        .output()
        .await
        .map_err(|e| NetworkError::backend(operation, format!("failed to execute: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(NetworkError::backend(operation, stderr.trim()));
    }

    Ok(output)
}

/// Like [`run`], but a missing device counts as success.
pub(crate) async fn run_if_present(cmd: &mut Command, operation: &str) -> NetworkResult<()> {
    match run(cmd, operation).await {
        Ok(_) => Ok(()),
        Err(NetworkError::BackendApply { message, .. }) if is_missing_device(&message) => {
            tracing::debug!(operation, "Device already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Whether `ip` reported that the device does not exist.
#[must_use]
pub fn is_missing_device(stderr: &str) -> bool {
    stderr.contains("Cannot find device") || stderr.contains("does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_netns_path() {
        assert!(!netns_exists("/nonexistent/ns/net_12345"));
    }

    #[test]
    fn recognizes_missing_device() {
        assert!(is_missing_device("Cannot find device \"c1\""));
        assert!(is_missing_device("Device \"c1\" does not exist."));
        assert!(!is_missing_device("RTNETLINK answers: File exists"));
    }

    #[test]
    fn namespaced_command_uses_nsenter() {
        let cmd = ip_command(Some("/proc/1/ns/net"));
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "nsenter");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["--net=/proc/1/ns/net", "ip"]);
    }

    #[tokio::test]
    async fn spawn_failure_is_backend_error() {
        let mut cmd = Command::new("/nonexistent/podwire-test-binary");
        let err = run(&mut cmd, "probe").await.unwrap_err();
        assert!(matches!(err, NetworkError::BackendApply { .. }));
    }
}

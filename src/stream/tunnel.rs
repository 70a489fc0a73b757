use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};
use crate::kube::portforward::{PortForwardOption, PortForwarder};
use crate::tunnel::Tunnel;
use crate::types::PodKey;

/// How long a forwarder may take to return after `stop` fires.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// Hold one tunnel open until `stop` fires or forwarding fails.
///
/// The pod-side port is the tunnel's local port: envoy listens there.
/// Errors that arrive after `stop` fired are part of shutdown and are
/// not reported.
pub async fn forward<F>(
    forwarder: &F,
    tunnel: &Tunnel,
    pod: &PodKey,
    stop: CancellationToken,
) -> AppResult<()>
where
    F: PortForwarder + ?Sized,
{
    let option = PortForwardOption {
        source_host: tunnel.local_host,
        source_port: tunnel.local_port,
        target_namespace: pod.namespace.clone(),
        target_pod_name: pod.name.clone(),
        target_container_port: tunnel.local_port,
    };

    let (ready_tx, mut ready_rx) = oneshot::channel();
    let run = forwarder.run(option, Some(ready_tx), stop.clone());
    tokio::pin!(run);

    let mut ready_seen = false;
    let result = loop {
        tokio::select! {
            res = &mut run => break res,
            ready = &mut ready_rx, if !ready_seen => {
                ready_seen = true;
                if let Ok(addr) = ready {
                    tracing::info!(
                        local = %addr,
                        remote = %tunnel.remote_endpoint(),
                        pod = %pod.name,
                        "tunnel started"
                    );
                }
            }
            _ = stop.cancelled() => {
                match tokio::time::timeout(STOP_GRACE, &mut run).await {
                    Ok(res) => break res,
                    Err(_) => {
                        tracing::warn!(tunnel = %tunnel, "port forwarder did not stop in time, abandoning it");
                        break Ok(());
                    }
                }
            }
        }
    };

    match result {
        Ok(()) => {
            tracing::info!(tunnel = %tunnel, "tunnel stopped");
            Ok(())
        }
        Err(e) if stop.is_cancelled() => {
            tracing::debug!(tunnel = %tunnel, error = %e, "port forwarder failed during shutdown");
            Ok(())
        }
        Err(e) => Err(AppError::Forward {
            tunnel: tunnel.to_string(),
            message: e.to_string(),
        }),
    }
}

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::DevFault;
use crate::errors::AppResult;
use crate::kube::portforward::{PortForwardOption, PortForwarder};

/// Holds tunnels "open" without touching the network.
pub struct DevForwarder {
    fault: DevFault,
    fail_after: Duration,
}

impl DevForwarder {
    pub fn new(fault: DevFault) -> Self {
        Self {
            fault,
            fail_after: Duration::from_millis(50),
        }
    }
}

#[async_trait]
impl PortForwarder for DevForwarder {
    async fn run(
        &self,
        option: PortForwardOption,
        ready: Option<oneshot::Sender<SocketAddr>>,
        stop: CancellationToken,
    ) -> AppResult<()> {
        if let Some(ready) = ready {
            let _ = ready.send(SocketAddr::new(option.source_host, option.source_port));
        }

        if self.fault == DevFault::Forward {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.fail_after) => {}
            }
            return Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!(
                    "dev: simulated failure forwarding to {}:{}",
                    option.target_pod_name, option.target_container_port
                ),
            )
            .into());
        }

        stop.cancelled().await;
        Ok(())
    }
}

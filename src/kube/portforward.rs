use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};

/// Pause after a failed accept so an exhausted fd table can drain.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Where a port forwarder listens and which pod port it feeds.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortForwardOption {
    pub source_host: IpAddr,
    pub source_port: u16,
    pub target_namespace: String,
    pub target_pod_name: String,
    pub target_container_port: u16,
}

/// Relays local TCP connections to a container port.
///
/// `run` blocks until `stop` fires or forwarding fails. When the local
/// listener is bound, the bound address is sent on `ready` if given.
#[async_trait]
pub trait PortForwarder: Send + Sync {
    async fn run(
        &self,
        option: PortForwardOption,
        ready: Option<oneshot::Sender<SocketAddr>>,
        stop: CancellationToken,
    ) -> AppResult<()>;
}

/// [`PortForwarder`] over the Kubernetes port-forward subresource.
#[derive(Clone)]
pub struct KubePortForwarder {
    client: Client,
}

impl KubePortForwarder {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PortForwarder for KubePortForwarder {
    async fn run(
        &self,
        option: PortForwardOption,
        ready: Option<oneshot::Sender<SocketAddr>>,
        stop: CancellationToken,
    ) -> AppResult<()> {
        let listener = TcpListener::bind((option.source_host, option.source_port)).await?;
        let local_addr = listener.local_addr()?;
        if let Some(ready) = ready {
            let _ = ready.send(local_addr);
        }

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &option.target_namespace);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) if is_transient_accept_error(&e) => {
                            tracing::warn!(local = %local_addr, error = %e, "accept failed, retrying");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    tracing::debug!(%peer, local = %local_addr, "accepted connection");
                    let pods = pods.clone();
                    let pod_name = option.target_pod_name.clone();
                    let port = option.target_container_port;
                    connections.spawn(async move {
                        if let Err(e) = forward_connection(&pods, &pod_name, port, socket).await {
                            tracing::warn!(%peer, pod = %pod_name, port, error = %e, "connection failed");
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        connections.shutdown().await;
        Ok(())
    }
}

/// Accept failures the listener survives: the peer gave up before we took
/// the connection, or the process ran out of file descriptors for a moment.
fn is_transient_accept_error(err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        #[cfg(unix)]
        _ if matches!(err.raw_os_error(), Some(EMFILE | ENFILE)) => true,
        _ => false,
    }
}

// Same values on Linux and the BSDs.
#[cfg(unix)]
const ENFILE: i32 = 23;
#[cfg(unix)]
const EMFILE: i32 = 24;

async fn forward_connection(
    pods: &Api<Pod>,
    pod_name: &str,
    port: u16,
    mut socket: TcpStream,
) -> AppResult<()> {
    let mut forwarder = pods.portforward(pod_name, &[port]).await?;
    let mut upstream = forwarder
        .take_stream(port)
        .ok_or_else(|| AppError::Other(format!("port {port} missing from port-forward")))?;

    tokio::io::copy_bidirectional(&mut socket, &mut upstream).await?;
    drop(upstream);

    forwarder
        .join()
        .await
        .map_err(|e| AppError::Other(format!("port-forward to {pod_name}:{port} ended: {e}")))?;
    Ok(())
}

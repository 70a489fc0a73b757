#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube_external_forward::errors::{AppResult, GatewayError};
use kube_external_forward::kube::gateway::{ClusterGateway, LogStream};
use kube_external_forward::kube::portforward::{PortForwardOption, PortForwarder};
use kube_external_forward::retry::RetryPolicy;
use kube_external_forward::session::SessionOption;
use kube_external_forward::tunnel::Tunnel;
use kube_external_forward::types::{PodPhase, PodStatusSummary};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub const POD_NAME: &str = "kubectl-external-forward-x7k2q";
pub const NAMESPACE: &str = "staging";

pub fn fast_policy(max_elapsed: Duration) -> RetryPolicy {
    RetryPolicy {
        initial_interval: Duration::from_millis(5),
        multiplier: 1.5,
        max_interval: Duration::from_millis(25),
        randomization_factor: 0.0,
        max_elapsed,
    }
}

pub fn option(tunnels: Vec<Tunnel>) -> SessionOption {
    SessionOption {
        ready_policy: fast_policy(Duration::from_secs(2)),
        delete_policy: fast_policy(Duration::from_secs(2)),
        ..SessionOption::new(NAMESPACE, tunnels, "envoyproxy/envoy:test")
    }
}

#[derive(Clone, Copy, Debug)]
pub enum LogScript {
    /// Stay open until the session stops.
    Pending,
    /// Emit two lines, then close cleanly.
    Eof,
    /// Fail after the delay.
    FailAfter(Duration),
}

/// Records calls and enforces that nothing streams before the pod ran.
pub struct MockGateway {
    pub fail_create: bool,
    /// `None`: the pod never runs.
    pub running_after_polls: Option<u32>,
    pub fail_delete: bool,
    pub logs: LogScript,

    pub running_seen: Arc<AtomicBool>,
    pub gate_violations: Arc<AtomicU32>,
    pub creates: AtomicU32,
    pub polls: AtomicU32,
    pub deletes: AtomicU32,
    pub log_streams: AtomicU32,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            fail_create: false,
            running_after_polls: Some(2),
            fail_delete: false,
            logs: LogScript::Pending,
            running_seen: Arc::new(AtomicBool::new(false)),
            gate_violations: Arc::new(AtomicU32::new(0)),
            creates: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            deletes: AtomicU32::new(0),
            log_streams: AtomicU32::new(0),
        }
    }
}

impl MockGateway {
    pub fn forwarder(&self) -> MockForwarder {
        MockForwarder {
            running_seen: Arc::clone(&self.running_seen),
            gate_violations: Arc::clone(&self.gate_violations),
            ..MockForwarder::default()
        }
    }
}

#[async_trait]
impl ClusterGateway for MockGateway {
    async fn create_pod(&self, namespace: &str, mut pod: Pod) -> Result<Pod, GatewayError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(GatewayError::Api {
                code: 422,
                message: "pods \"kubectl-external-forward-\" is invalid".to_string(),
            });
        }
        pod.metadata.name = Some(POD_NAME.to_string());
        pod.metadata.namespace = Some(namespace.to_string());
        pod.metadata.uid = Some("3f1c0d0e-uid".to_string());
        Ok(pod)
    }

    async fn get_pod(&self, _namespace: &str, _name: &str) -> Result<PodStatusSummary, GatewayError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.running_after_polls {
            Some(n) if polls >= n => {
                self.running_seen.store(true, Ordering::SeqCst);
                Ok(PodStatusSummary {
                    phase: PodPhase::Running,
                    message: None,
                })
            }
            _ => Ok(PodStatusSummary {
                phase: PodPhase::Pending,
                message: Some("ContainerCreating".to_string()),
            }),
        }
    }

    async fn delete_pod(&self, _namespace: &str, _name: &str) -> Result<(), GatewayError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(GatewayError::Api {
                code: 500,
                message: "etcdserver: request timed out".to_string(),
            });
        }
        Ok(())
    }

    async fn stream_logs(
        &self,
        _namespace: &str,
        _name: &str,
        _container: &str,
    ) -> Result<LogStream, GatewayError> {
        self.log_streams.fetch_add(1, Ordering::SeqCst);
        if !self.running_seen.load(Ordering::SeqCst) {
            self.gate_violations.fetch_add(1, Ordering::SeqCst);
        }

        let reader: LogStream = match self.logs {
            LogScript::Pending => {
                Box::pin(futures::stream::pending::<io::Result<Vec<u8>>>().into_async_read())
            }
            LogScript::Eof => Box::pin(
                futures::stream::iter(vec![
                    Ok::<_, io::Error>(b"[info] starting envoy\n".to_vec()),
                    Ok(b"[info] all clusters initialized\n".to_vec()),
                ])
                .into_async_read(),
            ),
            LogScript::FailAfter(delay) => {
                let failing = futures::stream::once(async move {
                    tokio::time::sleep(delay).await;
                    Err::<Vec<u8>, _>(io::Error::new(io::ErrorKind::ConnectionReset, "stream reset"))
                });
                Box::pin(Box::pin(failing).into_async_read())
            }
        };
        Ok(reader)
    }
}

/// Holds tunnels open until stopped, or fails the listed ports.
#[derive(Default)]
pub struct MockForwarder {
    pub running_seen: Arc<AtomicBool>,
    pub gate_violations: Arc<AtomicU32>,
    /// source port -> (delay, message)
    pub failures: HashMap<u16, (Duration, String)>,
    /// Fail with this message once stopped instead of returning cleanly.
    pub fail_on_stop: Option<String>,
    pub runs: AtomicU32,
    pub seen: std::sync::Mutex<Vec<PortForwardOption>>,
}

impl MockForwarder {
    pub fn failing(mut self, port: u16, after: Duration, message: &str) -> Self {
        self.failures.insert(port, (after, message.to_string()));
        self
    }
}

#[async_trait]
impl PortForwarder for MockForwarder {
    async fn run(
        &self,
        option: PortForwardOption,
        ready: Option<oneshot::Sender<SocketAddr>>,
        stop: CancellationToken,
    ) -> AppResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.running_seen.load(Ordering::SeqCst) {
            self.gate_violations.fetch_add(1, Ordering::SeqCst);
        }
        self.seen
            .lock()
            .unwrap()
            .push(option.clone());
        if let Some(ready) = ready {
            let _ = ready.send(SocketAddr::new(option.source_host, option.source_port));
        }

        if let Some((after, message)) = self.failures.get(&option.source_port) {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = tokio::time::sleep(*after) => {}
            }
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, message.clone()).into());
        }

        stop.cancelled().await;
        match &self.fail_on_stop {
            Some(message) => Err(io::Error::new(io::ErrorKind::Other, message.clone()).into()),
            None => Ok(()),
        }
    }
}

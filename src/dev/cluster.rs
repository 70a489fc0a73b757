use std::io;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use tokio::time::sleep;

use super::DevFault;
use crate::errors::GatewayError;
use crate::kube::gateway::{ClusterGateway, LogStream};
use crate::types::{PodPhase, PodStatusSummary};

/// In-memory [`ClusterGateway`]. Pods stay `Pending` for a few polls, then run.
pub struct DevCluster {
    fault: DevFault,
    pending_polls: u32,
    rate: Duration,
    lines: u64,
    next_id: AtomicU64,
    polls: AtomicU32,
}

impl DevCluster {
    pub fn new(fault: DevFault, rate_ms: u64, lines: u64) -> Self {
        Self {
            fault,
            pending_polls: 2,
            rate: Duration::from_millis(rate_ms),
            lines,
            next_id: AtomicU64::new(1),
            polls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ClusterGateway for DevCluster {
    async fn create_pod(&self, namespace: &str, mut pod: Pod) -> Result<Pod, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let prefix = pod.metadata.generate_name.clone().unwrap_or_default();
        pod.metadata.name = Some(format!("{prefix}dev{id}"));
        pod.metadata.namespace = Some(namespace.to_string());
        pod.metadata.uid = Some(format!("dev-uid-{id}"));
        tracing::info!(namespace = %namespace, "dev: simulated pod admitted");
        Ok(pod)
    }

    async fn get_pod(&self, _namespace: &str, _name: &str) -> Result<PodStatusSummary, GatewayError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fault == DevFault::NotReady || polls <= self.pending_polls {
            return Ok(PodStatusSummary {
                phase: PodPhase::Pending,
                message: Some("dev: pulling image".to_string()),
            });
        }
        Ok(PodStatusSummary {
            phase: PodPhase::Running,
            message: None,
        })
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<(), GatewayError> {
        if self.fault == DevFault::Delete {
            return Err(GatewayError::Api {
                code: 503,
                message: format!("dev: simulated failure deleting {name}"),
            });
        }
        Ok(())
    }

    async fn stream_logs(
        &self,
        _namespace: &str,
        _name: &str,
        container: &str,
    ) -> Result<LogStream, GatewayError> {
        let container = container.to_string();
        let rate = self.rate;
        let max_lines = self.lines;

        let lines = futures::stream::unfold(0u64, move |counter| {
            let container = container.clone();
            async move {
                if counter >= max_lines {
                    return None;
                }
                if counter > 0 {
                    sleep(rate).await;
                }
                let line = format!("[{container}] log line {}\n", counter + 1);
                Some((Ok::<_, io::Error>(line.into_bytes()), counter + 1))
            }
        });

        Ok(Box::pin(Box::pin(lines).into_async_read()))
    }
}

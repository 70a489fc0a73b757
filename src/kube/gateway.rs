use std::pin::Pin;

use async_trait::async_trait;
use futures::AsyncBufRead;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::Client;

use crate::errors::GatewayError;
use crate::types::{PodPhase, PodStatusSummary};

/// Line-delimited log bytes of one container, read until the remote side closes.
pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// The subset of the cluster API a session needs.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Create a pod and return it as stored by the cluster, name included.
    async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, GatewayError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodStatusSummary, GatewayError>;

    /// Delete a pod immediately (zero grace period).
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), GatewayError>;

    /// Follow the logs of one container.
    async fn stream_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> Result<LogStream, GatewayError>;
}

/// [`ClusterGateway`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn not_found_or(name: &str, err: kube::Error) -> GatewayError {
    match err {
        kube::Error::Api(ref resp) if resp.code == 404 => GatewayError::PodNotFound {
            name: name.to_string(),
        },
        other => other.into(),
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, GatewayError> {
        let pod = self.pods(namespace).create(&PostParams::default(), &pod).await?;
        Ok(pod)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodStatusSummary, GatewayError> {
        let pod = self
            .pods(namespace)
            .get(name)
            .await
            .map_err(|e| not_found_or(name, e))?;
        let status = pod.status.unwrap_or_default();
        Ok(PodStatusSummary {
            phase: PodPhase::parse(status.phase.as_deref()),
            message: status.message,
        })
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), GatewayError> {
        let dp = DeleteParams {
            grace_period_seconds: Some(0),
            ..Default::default()
        };
        self.pods(namespace)
            .delete(name, &dp)
            .await
            .map_err(|e| not_found_or(name, e))?;
        Ok(())
    }

    async fn stream_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
    ) -> Result<LogStream, GatewayError> {
        let lp = LogParams {
            follow: true,
            timestamps: false,
            container: Some(container.to_string()),
            ..Default::default()
        };
        let reader = self
            .pods(namespace)
            .log_stream(name, &lp)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref resp) if resp.code == 404 => GatewayError::PodNotFound {
                    name: name.to_string(),
                },
                other => GatewayError::Stream {
                    message: other.to_string(),
                },
            })?;
        Ok(Box::pin(reader))
    }
}

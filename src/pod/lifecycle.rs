//! Create the proxy pod, wait for it to run, and remove it again.

use k8s_openapi::api::core::v1::Pod;

use crate::errors::{AppError, AppResult, GatewayError};
use crate::kube::gateway::ClusterGateway;
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{PodHandle, PodKey, PodPhase};

/// Create `pod` in `namespace`. Not retried: admission failures do not heal.
pub async fn create<G>(gateway: &G, namespace: &str, pod: Pod) -> AppResult<PodHandle>
where
    G: ClusterGateway + ?Sized,
{
    tracing::info!(namespace = %namespace, "creating pod");
    let created = gateway
        .create_pod(namespace, pod)
        .await
        .map_err(|source| AppError::PodCreate {
            namespace: namespace.to_string(),
            source,
        })?;

    let name = created
        .metadata
        .name
        .clone()
        .ok_or_else(|| AppError::Other("cluster returned a pod without a name".to_string()))?;
    let key = PodKey {
        namespace: created
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| namespace.to_string()),
        name,
        uid: created.metadata.uid.clone().unwrap_or_default(),
    };
    let containers = created
        .spec
        .as_ref()
        .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default();

    tracing::info!(namespace = %key.namespace, pod = %key.name, uid = %key.uid, "created pod");
    Ok(PodHandle { key, containers })
}

/// Poll until the pod reports `Running`.
///
/// Every other phase counts as "not yet". A permanent get error or an
/// exhausted budget is reported as [`AppError::PodNotReady`].
pub async fn await_running<G>(gateway: &G, pod: &PodKey, policy: &RetryPolicy) -> AppResult<()>
where
    G: ClusterGateway + ?Sized,
{
    policy
        .retry("waiting for pod", move || async move {
            match gateway.get_pod(&pod.namespace, &pod.name).await {
                Ok(status) if status.phase == PodPhase::Running => Ok(()),
                Ok(status) => {
                    let mut reason = format!("pod {pod} is still {}", status.phase);
                    if let Some(message) = status.message.filter(|m| !m.is_empty()) {
                        reason = format!("{reason}: {message}");
                    }
                    Err(RetryError::transient(reason))
                }
                Err(e) if e.is_transient() => Err(RetryError::transient(e.to_string())),
                Err(e) => Err(RetryError::permanent(e.to_string())),
            }
        })
        .await
        .map_err(|reason| AppError::PodNotReady {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            reason,
        })?;

    tracing::info!(namespace = %pod.namespace, pod = %pod.name, "pod is running");
    Ok(())
}

/// Delete the pod, retrying until the budget runs out.
///
/// A pod that is already gone counts as deleted. On exhaustion the error
/// names the pod so the operator can remove it by hand.
pub async fn delete<G>(gateway: &G, pod: &PodKey, policy: &RetryPolicy) -> AppResult<()>
where
    G: ClusterGateway + ?Sized,
{
    tracing::info!(namespace = %pod.namespace, pod = %pod.name, "deleting pod");
    policy
        .retry("deleting pod", move || async move {
            match gateway.delete_pod(&pod.namespace, &pod.name).await {
                Ok(()) => Ok(()),
                Err(GatewayError::PodNotFound { .. }) => {
                    tracing::debug!(namespace = %pod.namespace, pod = %pod.name, "pod already gone");
                    Ok(())
                }
                Err(e) => Err(RetryError::transient(e.to_string())),
            }
        })
        .await
        .map_err(|reason| AppError::ManualCleanupRequired {
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
            reason,
        })?;

    tracing::info!(namespace = %pod.namespace, pod = %pod.name, "deleted pod");
    Ok(())
}

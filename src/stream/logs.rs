use futures::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};
use crate::kube::gateway::ClusterGateway;
use crate::types::PodKey;

/// Follow the logs of one container until the stream ends or `cancel` fires.
///
/// A clean end of stream (the proxy exited) is not an error. The stream is
/// not reopened.
pub async fn tail<G>(
    gateway: &G,
    pod: &PodKey,
    container: &str,
    cancel: CancellationToken,
) -> AppResult<()>
where
    G: ClusterGateway + ?Sized,
{
    let stream_error = |message: String| AppError::LogStream {
        namespace: pod.namespace.clone(),
        pod: pod.name.clone(),
        container: container.to_string(),
        message,
    };

    let opened = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        r = gateway.stream_logs(&pod.namespace, &pod.name, container) => r,
    };
    let mut reader = opened.map_err(|e| stream_error(e.to_string()))?;

    let mut buf: Vec<u8> = Vec::with_capacity(8 * 1024);

    loop {
        buf.clear();

        let res = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = reader.read_until(b'\n', &mut buf) => r,
        };

        match res {
            Ok(0) => {
                tracing::debug!(
                    namespace = %pod.namespace,
                    pod = %pod.name,
                    container = %container,
                    "log stream closed"
                );
                return Ok(());
            }
            Ok(_n) => {
                let line = trim_newline(&buf);
                if line.is_empty() {
                    continue;
                }
                tracing::info!(
                    "{}/{}/{}: {}",
                    pod.namespace,
                    pod.name,
                    container,
                    String::from_utf8_lossy(line)
                );
            }
            Err(e) => return Err(stream_error(e.to_string())),
        }
    }
}

fn trim_newline(bytes: &[u8]) -> &[u8] {
    let mut end = bytes.len();
    while end > 0 && (bytes[end - 1] == b'\n' || bytes[end - 1] == b'\r') {
        end -= 1;
    }
    &bytes[..end]
}

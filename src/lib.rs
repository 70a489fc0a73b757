pub mod cli;
pub mod config;
pub mod dev;
pub mod envoy;
pub mod errors;
pub mod kube;
pub mod logging;
pub mod pod;
pub mod retry;
pub mod session;
pub mod shutdown;
pub mod stream;
pub mod tunnel;
pub mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::errors::AppResult;

/// Run one session until `shutdown` fires or it fails.
pub async fn run(config: Config, shutdown: CancellationToken) -> AppResult<()> {
    // Start the appropriate cluster backend depending on mode.
    if let Some(dev) = config.dev {
        tracing::info!(fault = ?dev.fault, "starting dev-mode cluster");
        let namespace = config
            .kube
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let gateway = Arc::new(crate::dev::DevCluster::new(dev.fault, dev.rate_ms, dev.lines));
        let forwarder = Arc::new(crate::dev::DevForwarder::new(dev.fault));
        return crate::session::run_session(
            gateway,
            forwarder,
            config.session_option(&namespace),
            shutdown,
        )
        .await;
    }

    let client = crate::kube::client::make_client(&config.kube).await?;
    let namespace = client.default_namespace().to_string();
    let gateway = Arc::new(crate::kube::gateway::KubeGateway::new(client.clone()));
    let forwarder = Arc::new(crate::kube::portforward::KubePortForwarder::new(client));

    crate::session::run_session(gateway, forwarder, config.session_option(&namespace), shutdown)
        .await
}

use std::collections::HashSet;
use std::time::Duration;

use crate::cli::Cli;
use crate::dev::DevFault;
use crate::errors::{AppError, AppResult};
use crate::kube::client::KubeOptions;
use crate::retry::RetryPolicy;
use crate::session::SessionOption;
use crate::tunnel::Tunnel;

/// Settings for the simulated cluster.
#[derive(Clone, Copy, Debug)]
pub struct DevConfig {
    pub fault: DevFault,
    pub rate_ms: u64,
    pub lines: u64,
    pub duration: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub tunnels: Vec<Tunnel>,
    pub kube: KubeOptions,
    pub pod_image: String,
    pub pod_ready_timeout: Duration,
    pub pod_delete_timeout: Duration,

    pub dev: Option<DevConfig>,
}

impl Config {
    /// The immutable per-session settings, once the namespace is known.
    pub fn session_option(&self, namespace: &str) -> SessionOption {
        SessionOption {
            namespace: namespace.to_string(),
            tunnels: self.tunnels.clone(),
            pod_image: self.pod_image.clone(),
            ready_policy: RetryPolicy::with_timeout(self.pod_ready_timeout),
            delete_policy: RetryPolicy::with_timeout(self.pod_delete_timeout),
        }
    }
}

impl TryFrom<Cli> for Config {
    type Error = AppError;

    fn try_from(cli: Cli) -> AppResult<Self> {
        if cli.tunnels.is_empty() {
            return Err(AppError::Cli("at least one tunnel is required".to_string()));
        }

        let tunnels = cli
            .tunnels
            .iter()
            .map(|t| t.parse::<Tunnel>())
            .collect::<AppResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for tunnel in &tunnels {
            if !seen.insert(tunnel.local_port) {
                return Err(AppError::Cli(format!(
                    "local port {} is used by more than one tunnel",
                    tunnel.local_port
                )));
            }
        }

        if cli.pod_ready_timeout_secs == 0 || cli.pod_delete_timeout_secs == 0 {
            return Err(AppError::Cli("timeouts must be at least one second".to_string()));
        }

        if cli.image.trim().is_empty() {
            return Err(AppError::Cli("--image must not be empty".to_string()));
        }

        let dev = cli.dev.then(|| DevConfig {
            fault: cli.dev_fault.into(),
            rate_ms: cli.dev_rate_ms,
            lines: cli.dev_lines,
            duration: cli.dev_duration_ms.map(Duration::from_millis),
        });

        Ok(Self {
            tunnels,
            kube: KubeOptions {
                kubeconfig: cli.kubeconfig,
                context: cli.context,
                cluster: cli.cluster,
                user: cli.user,
                namespace: cli.namespace,
            },
            pod_image: cli.image,
            pod_ready_timeout: Duration::from_secs(cli.pod_ready_timeout_secs),
            pod_delete_timeout: Duration::from_secs(cli.pod_delete_timeout_secs),
            dev,
        })
    }
}

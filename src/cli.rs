use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::dev::DevFault;

#[derive(Debug, Parser)]
#[command(
    name = "kube-external-forward",
    version,
    about = "Forward local ports to hosts reachable only from inside a Kubernetes cluster"
)]
pub struct Cli {
    /// Tunnels as [LOCAL_HOST:]LOCAL_PORT:REMOTE_HOST:REMOTE_PORT
    #[arg(value_name = "TUNNEL", required = true)]
    pub tunnels: Vec<String>,

    /// Namespace for the proxy pod (default: from kubeconfig context)
    #[arg(short = 'n', long = "namespace", env = "KUBE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Kubeconfig file, or a path list merged like KUBECONFIG (default: KUBECONFIG, then ~/.kube/config)
    #[arg(long = "kubeconfig")]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long = "context")]
    pub context: Option<String>,

    /// Kubeconfig cluster to use
    #[arg(long = "cluster")]
    pub cluster: Option<String>,

    /// Kubeconfig user to use
    #[arg(long = "user")]
    pub user: Option<String>,

    /// Envoy image for the proxy pod
    #[arg(
        long = "image",
        env = "EXTERNAL_FORWARD_IMAGE",
        default_value = crate::session::DEFAULT_POD_IMAGE
    )]
    pub image: String,

    /// Seconds to wait for the proxy pod to run
    #[arg(long = "pod-ready-timeout-secs", default_value_t = 30)]
    pub pod_ready_timeout_secs: u64,

    /// Seconds to keep retrying the proxy pod deletion
    #[arg(long = "pod-delete-timeout-secs", default_value_t = 30)]
    pub pod_delete_timeout_secs: u64,

    /// Dev mode: simulate the cluster
    #[arg(long = "dev", default_value_t = false)]
    pub dev: bool,

    /// Dev: milliseconds between simulated log lines
    #[arg(long = "dev-rate-ms", default_value_t = 500)]
    pub dev_rate_ms: u64,

    /// Dev: simulated log lines per container
    #[arg(long = "dev-lines", default_value_t = 10)]
    pub dev_lines: u64,

    /// Dev: simulate an interrupt after this many milliseconds
    #[arg(long = "dev-duration-ms")]
    pub dev_duration_ms: Option<u64>,

    /// Dev: failure to inject
    #[arg(long = "dev-fault", value_enum, default_value_t = DevFaultArg::None)]
    pub dev_fault: DevFaultArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum DevFaultArg {
    None,
    NotReady,
    Forward,
    Delete,
}

impl From<DevFaultArg> for DevFault {
    fn from(v: DevFaultArg) -> Self {
        match v {
            DevFaultArg::None => DevFault::None,
            DevFaultArg::NotReady => DevFault::NotReady,
            DevFaultArg::Forward => DevFault::Forward,
            DevFaultArg::Delete => DevFault::Delete,
        }
    }
}

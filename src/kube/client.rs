use std::ffi::OsStr;
use std::path::PathBuf;

use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::errors::{AppError, AppResult};

/// Flags selecting which cluster to talk to.
#[derive(Clone, Debug, Default)]
pub struct KubeOptions {
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub cluster: Option<String>,
    pub user: Option<String>,
    pub namespace: Option<String>,
}

impl KubeOptions {
    fn config_options(&self) -> KubeConfigOptions {
        KubeConfigOptions {
            context: self.context.clone(),
            cluster: self.cluster.clone(),
            user: self.user.clone(),
        }
    }

    fn is_default(&self) -> bool {
        self.kubeconfig.is_none()
            && self.context.is_none()
            && self.cluster.is_none()
            && self.user.is_none()
    }
}

/// Read every file of a `KUBECONFIG`-style path list and merge them in order.
/// Earlier files win on conflicting entries.
pub fn load_kubeconfig(paths: &OsStr) -> AppResult<Kubeconfig> {
    let mut merged: Option<Kubeconfig> = None;
    for path in std::env::split_paths(paths).filter(|p| !p.as_os_str().is_empty()) {
        let next = Kubeconfig::read_from(&path)?;
        merged = Some(match merged {
            Some(current) => current.merge(next)?,
            None => next,
        });
    }
    merged.ok_or_else(|| AppError::Cli("--kubeconfig names no files".to_string()))
}

/// Resolve the cluster config and build a client. The client's default
/// namespace is the `--namespace` override, else the context's namespace.
pub async fn make_client(opts: &KubeOptions) -> AppResult<kube::Client> {
    let mut config = if let Some(path) = &opts.kubeconfig {
        let kubeconfig = load_kubeconfig(path.as_os_str())?;
        kube::Config::from_custom_kubeconfig(kubeconfig, &opts.config_options()).await?
    } else if opts.is_default() {
        kube::Config::infer().await?
    } else {
        kube::Config::from_kubeconfig(&opts.config_options()).await?
    };

    if let Some(namespace) = &opts.namespace {
        config.default_namespace = namespace.clone();
    }

    tracing::debug!(
        cluster_url = %config.cluster_url,
        namespace = %config.default_namespace,
        "cluster config resolved"
    );
    let client = kube::Client::try_from(config)?;
    Ok(client)
}

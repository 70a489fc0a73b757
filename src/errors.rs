use std::fmt;
use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Cli(String),

    #[error("kubeconfig error: {0}")]
    KubeConfig(#[from] kube::config::KubeconfigError),

    #[error("could not infer cluster config: {0}")]
    InferConfig(#[from] kube::config::InferConfigError),

    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Rendering the proxy configuration failed. This is a bug, not an operator error.
    #[error("could not generate proxy config: {0}")]
    ConfigGeneration(#[from] handlebars::RenderError),

    #[error("could not create pod in namespace {namespace}")]
    PodCreate {
        namespace: String,
        #[source]
        source: GatewayError,
    },

    #[error("pod {namespace}/{name} is not ready: {reason}")]
    PodNotReady {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("log stream of {namespace}/{pod}/{container} failed: {message}")]
    LogStream {
        namespace: String,
        pod: String,
        container: String,
        message: String,
    },

    #[error("tunnel {tunnel} failed: {message}")]
    Forward { tunnel: String, message: String },

    /// Teardown gave up. The pod may still exist and must be removed by hand.
    #[error("could not delete pod {namespace}/{name}, delete it manually: {reason}")]
    ManualCleanupRequired {
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors reported by a [`ClusterGateway`](crate::kube::gateway::ClusterGateway).
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("pod not found: {name}")]
    PodNotFound { name: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("log stream error: {message}")]
    Stream { message: String },
}

impl GatewayError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Api { code, .. } => *code == 429 || *code >= 500,
            GatewayError::Transport { .. } => true,
            GatewayError::PodNotFound { .. } | GatewayError::Stream { .. } => false,
        }
    }
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => GatewayError::Api {
                code: resp.code,
                message: resp.message,
            },
            other => GatewayError::Transport {
                message: other.to_string(),
            },
        }
    }
}

/// Displays an error followed by its chain of causes.
pub struct DisplayCauses<'a>(pub &'a (dyn std::error::Error + 'static));

impl fmt::Display for DisplayCauses<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.0)?;
        let mut source = self.0.source();
        while let Some(next) = source {
            writeln!(f, "  caused by: {}", next)?;
            source = next.source();
        }
        Ok(())
    }
}

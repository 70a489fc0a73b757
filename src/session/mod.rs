//! One session: one ephemeral proxy pod, its tunnels and its log streams,
//! from creation to guaranteed teardown.

mod group;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};
use crate::kube::gateway::ClusterGateway;
use crate::kube::portforward::PortForwarder;
use crate::pod::lifecycle;
use crate::retry::RetryPolicy;
use crate::tunnel::Tunnel;
use crate::types::{PodHandle, SessionState};

pub use group::TaskGroup;

pub const DEFAULT_POD_IMAGE: &str = "envoyproxy/envoy:v1.31.2";

/// Everything a session needs, fixed at start.
#[derive(Clone, Debug)]
pub struct SessionOption {
    pub namespace: String,
    pub tunnels: Vec<Tunnel>,
    pub pod_image: String,
    pub ready_policy: RetryPolicy,
    pub delete_policy: RetryPolicy,
}

impl SessionOption {
    pub fn new(
        namespace: impl Into<String>,
        tunnels: Vec<Tunnel>,
        pod_image: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            tunnels,
            pod_image: pod_image.into(),
            ready_policy: RetryPolicy::default(),
            delete_policy: RetryPolicy::default(),
        }
    }
}

/// Drives a session through its states. Owns the cancellation domain.
pub struct Session<G: ?Sized, F: ?Sized> {
    gateway: Arc<G>,
    forwarder: Arc<F>,
    option: SessionOption,
    state: Arc<watch::Sender<SessionState>>,
}

impl<G, F> Session<G, F>
where
    G: ClusterGateway + ?Sized + 'static,
    F: PortForwarder + ?Sized + 'static,
{
    pub fn new(gateway: Arc<G>, forwarder: Arc<F>, option: SessionOption) -> Self {
        let (state, _) = watch::channel(SessionState::Created);
        Self {
            gateway,
            forwarder,
            option,
            state: Arc::new(state),
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run until `shutdown` fires or a task fails, then tear down.
    ///
    /// Returns the first failure. An interrupt with no failure is `Ok`.
    pub async fn run(self, shutdown: CancellationToken) -> AppResult<()> {
        let Self {
            gateway,
            forwarder,
            option,
            state,
        } = self;

        let pod = match crate::pod::spec::build(&option) {
            Ok(pod) => pod,
            Err(e) => {
                set_state(&state, SessionState::Closed);
                return Err(e);
            }
        };

        set_state(&state, SessionState::PodCreating);
        let pod = match lifecycle::create(gateway.as_ref(), &option.namespace, pod).await {
            Ok(pod) => Arc::new(pod),
            Err(e) => {
                set_state(&state, SessionState::Closed);
                return Err(e);
            }
        };

        // Interrupts reach the session through the parent token; failures
        // cancel only this session.
        let mut group = TaskGroup::new(shutdown.child_token());
        let cancel = group.token();

        {
            let gateway = Arc::clone(&gateway);
            let pod = Arc::clone(&pod);
            let state = Arc::clone(&state);
            let cancel = cancel.clone();
            let policy = option.delete_policy;
            group.spawn("teardown", async move {
                cancel.cancelled().await;
                set_state(&state, SessionState::Cancelling);
                set_state(&state, SessionState::PodDeleting);
                match lifecycle::delete(gateway.as_ref(), &pod.key, &policy).await {
                    Ok(()) => {
                        set_state(&state, SessionState::Closed);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!(
                            namespace = %pod.key.namespace,
                            pod = %pod.key.name,
                            error = %e,
                            "pod was not deleted, clean it up manually"
                        );
                        set_state(&state, SessionState::ClosedWithWarning);
                        Err(e)
                    }
                }
            });
        }

        let ready = tokio::select! {
            _ = cancel.cancelled() => None,
            r = lifecycle::await_running(gateway.as_ref(), &pod.key, &option.ready_policy) => Some(r),
        };

        match ready {
            Some(Ok(())) => {
                set_state(&state, SessionState::PodReady);
                start_streams(&mut group, &gateway, &forwarder, &pod, &option.tunnels);
                set_state(&state, SessionState::Active);
            }
            Some(Err(e)) => group.fail("await-running", e),
            None => tracing::info!("cancelled before the pod was running"),
        }

        match group.join().await {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn start_streams<G, F>(
    group: &mut TaskGroup,
    gateway: &Arc<G>,
    forwarder: &Arc<F>,
    pod: &Arc<PodHandle>,
    tunnels: &[Tunnel],
) where
    G: ClusterGateway + ?Sized + 'static,
    F: PortForwarder + ?Sized + 'static,
{
    for container in &pod.containers {
        let gateway = Arc::clone(gateway);
        let pod = Arc::clone(pod);
        let container = container.clone();
        let cancel = group.token();
        group.spawn(format!("logs/{container}"), async move {
            crate::stream::logs::tail(gateway.as_ref(), &pod.key, &container, cancel).await
        });
    }

    for tunnel in tunnels {
        let forwarder = Arc::clone(forwarder);
        let pod = Arc::clone(pod);
        let tunnel = tunnel.clone();
        let stop = group.token();
        group.spawn(format!("tunnel/{}", tunnel.local_endpoint()), async move {
            crate::stream::tunnel::forward(forwarder.as_ref(), &tunnel, &pod.key, stop).await
        });
    }
}

/// Move the session forward. States never go backwards, so a late
/// `Active` cannot overwrite a teardown that already started.
fn set_state(state: &watch::Sender<SessionState>, next: SessionState) {
    state.send_if_modified(|current| {
        if next > *current {
            tracing::debug!(from = ?*current, to = ?next, "session state");
            *current = next;
            true
        } else {
            false
        }
    });
}

/// Convenience wrapper: build a [`Session`] and run it.
pub async fn run_session<G, F>(
    gateway: Arc<G>,
    forwarder: Arc<F>,
    option: SessionOption,
    shutdown: CancellationToken,
) -> AppResult<()>
where
    G: ClusterGateway + ?Sized + 'static,
    F: PortForwarder + ?Sized + 'static,
{
    if option.tunnels.is_empty() {
        return Err(AppError::Cli("at least one tunnel is required".to_string()));
    }
    Session::new(gateway, forwarder, option).run(shutdown).await
}

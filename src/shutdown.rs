//! Interrupt sources for a session: SIGINT, SIGTERM and the dev-mode timer.
//! Whichever fires first cancels the shared token; the session then tears
//! its pod down before the process exits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    CtrlC,
    Sigterm,
    /// `--dev-duration-ms` elapsed.
    DevTimer,
}

/// Owns the root cancellation token of the process.
#[derive(Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the session. Sessions derive child tokens from it.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the first interrupt, cancel the token and report why.
    ///
    /// With `timer` set the session is also interrupted once it elapses.
    pub async fn interrupted(&self, timer: Option<Duration>) -> ShutdownReason {
        let reason = tokio::select! {
            _ = ctrl_c() => ShutdownReason::CtrlC,
            _ = sigterm() => ShutdownReason::Sigterm,
            _ = elapsed(timer) => ShutdownReason::DevTimer,
        };
        self.token.cancel();
        reason
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}

async fn elapsed(timer: Option<Duration>) {
    match timer {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

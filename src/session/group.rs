use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult};

/// Tasks sharing one cancellation domain.
///
/// The first failure is kept and cancels the domain. Later failures are
/// logged and dropped. [`TaskGroup::join`] waits for every task.
pub struct TaskGroup {
    tasks: JoinSet<()>,
    first_error: Arc<Mutex<Option<AppError>>>,
    cancel: CancellationToken,
}

impl TaskGroup {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            first_error: Arc::new(Mutex::new(None)),
            cancel,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<Fut>(&mut self, name: impl Into<String>, task: Fut)
    where
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        let name = name.into();
        let first_error = Arc::clone(&self.first_error);
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            if let Err(err) = task.await {
                record(&first_error, &cancel, &name, err);
            }
        });
    }

    /// Record a failure that happened outside a spawned task.
    pub fn fail(&self, name: &str, err: AppError) {
        record(&self.first_error, &self.cancel, name, err);
    }

    /// Wait for every task, then return the first failure, if any.
    pub async fn join(mut self) -> Option<AppError> {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(join_err) = res {
                let err = AppError::Other(format!("task panicked: {join_err}"));
                record(&self.first_error, &self.cancel, "task", err);
            }
        }
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.take()
    }
}

fn record(
    first_error: &Mutex<Option<AppError>>,
    cancel: &CancellationToken,
    name: &str,
    err: AppError,
) {
    {
        let mut slot = first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            tracing::error!(task = %name, error = %err, "task failed, cancelling session");
            *slot = Some(err);
        } else {
            tracing::warn!(task = %name, error = %err, "task failed after session was already failing");
        }
    }
    cancel.cancel();
}

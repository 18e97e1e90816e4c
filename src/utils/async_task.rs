use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::error;
use tracing::warn;

use crate::Result;

/// Spawns a named background task; a returned error is logged, never propagated.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    })
}

/// Waits for a background task to finish, giving up after `grace`.
pub(crate) async fn join_with_grace<T>(
    name: &str,
    handle: JoinHandle<T>,
    grace: Duration,
) -> Option<T> {
    match timeout(grace, handle).await {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e)) => {
            error!("task {name} panicked or was cancelled: {:?}", e);
            None
        }
        Err(_) => {
            warn!("task {name} did not finish within {:?}", grace);
            None
        }
    }
}

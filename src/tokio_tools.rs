use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns a background task inside a `task` span carrying `name`, so its logs
/// stay attributable after the spawning scope is gone.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let task_name = name.into();
    let span = tracing::info_span!("task", %task_name);
    tokio::spawn(future.instrument(span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn named_tasks_run_to_completion() {
        let handle = spawn_named_task("answer", async { 6 * 7 });
        assert_eq!(handle.await.unwrap(), 42);
    }
}

pub mod backup;
pub mod provisioning_worker;
pub mod seed;

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns every long-running background task and the token that stops them.
pub struct BackgroundCoordinator {
    cancel: CancellationToken,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl BackgroundCoordinator {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Token a task should watch to know when to stop.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        tracing::info!("Background: {} started", name);
        self.tasks.push((name, tokio::spawn(task)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel, then wait for every task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.tasks {
            match handle.await {
                Ok(()) => tracing::info!("Background: {} stopped", name),
                Err(e) => tracing::error!("Background: {} ended abnormally: {}", name, e),
            }
        }
    }
}

impl Default for BackgroundCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

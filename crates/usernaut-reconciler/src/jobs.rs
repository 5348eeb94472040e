//! Periodic background tasks.
//!
//! Each registered task runs on its own interval until shutdown. A
//! failing run is logged; the next tick still fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Error from one periodic task run.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct JobError(pub String);

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A task executed at a fixed interval.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn run(&self) -> Result<(), JobError>;
}

/// Registry and runner for periodic tasks.
#[derive(Default)]
pub struct PeriodicTaskManager {
    tasks: Vec<Arc<dyn PeriodicTask>>,
}

impl PeriodicTaskManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, task: Arc<dyn PeriodicTask>) {
        self.tasks.push(task);
    }

    /// Spawn one loop per task, each honoring the shutdown signal.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.tasks
            .into_iter()
            .map(|task| {
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(task.interval());
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    // Swallow the immediate first tick; the first real run
                    // happens one interval after startup.
                    ticker.tick().await;

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {}
                            _ = shutdown.changed() => {
                                info!(job = task.name(), "periodic task stopping");
                                return;
                            }
                        }

                        info!(job = task.name(), "running periodic task");
                        if let Err(err) = task.run().await {
                            error!(job = task.name(), error = %err, "periodic task failed");
                        }
                    }
                })
            })
            .collect()
    }
}

//! Reconcile-request dispatch.
//!
//! The watch side of the orchestrator is external; its contract with the
//! engine is an mpsc channel of [`ReconcileRequest`]s served by a small
//! worker pool. A failed reconcile is re-enqueued after a short delay,
//! and a periodic resync loop re-enqueues every Group in the watched
//! namespace so drift converges even without resource events.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::reconciler::GroupReconciler;
use crate::resource::{GroupResourceClient, ReconcileRequest};

/// Delay before a failed request is handed back to the queue.
const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Sending half of the reconcile queue.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<ReconcileRequest>,
}

impl Dispatcher {
    /// Create the queue, returning the dispatcher and the receiver for
    /// [`spawn_workers`].
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ReconcileRequest>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub async fn enqueue(&self, request: ReconcileRequest) {
        if self.tx.send(request).await.is_err() {
            warn!("reconcile queue closed, dropping request");
        }
    }
}

/// Spawn `workers` tasks draining the queue until shutdown.
pub fn spawn_workers(
    workers: usize,
    rx: mpsc::Receiver<ReconcileRequest>,
    reconciler: Arc<GroupReconciler>,
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    let handles: Vec<JoinHandle<()>> = (0..workers.max(1))
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let reconciler = Arc::clone(&reconciler);
            let dispatcher = dispatcher.clone();
            let mut shutdown = shutdown.clone();

            tokio::spawn(async move {
                loop {
                    let request = tokio::select! {
                        request = async { rx.lock().await.recv().await } => request,
                        _ = shutdown.changed() => None,
                    };
                    let Some(request) = request else {
                        debug!(worker = worker, "reconcile worker stopping");
                        return;
                    };

                    match reconciler.reconcile(&request).await {
                        Ok(()) => {
                            debug!(worker = worker, request = %request, "reconcile succeeded");
                        }
                        Err(err) => {
                            error!(worker = worker, request = %request, error = %err, "reconcile failed, re-queueing");
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(REQUEUE_DELAY).await;
                                dispatcher.enqueue(request).await;
                            });
                        }
                    }
                }
            })
        })
        .collect();

    handles
}

/// Periodically list every Group in the namespace and enqueue it.
pub fn spawn_resync_loop(
    resources: Arc<dyn GroupResourceClient>,
    dispatcher: Dispatcher,
    namespace: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {
                    info!("resync loop stopping");
                    return;
                }
            }

            match resources.list(&namespace).await {
                Ok(groups) => {
                    debug!(count = groups.len(), "resync: enqueueing all groups");
                    for group in groups {
                        dispatcher
                            .enqueue(ReconcileRequest::new(
                                group.metadata.namespace.clone(),
                                group.metadata.name.clone(),
                            ))
                            .await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "resync: error listing groups");
                }
            }
        }
    })
}

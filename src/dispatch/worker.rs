// Dispatch worker - async task between the pipeline and the sink
//
// The pipeline hands results over through a watch slot, so only the latest
// undelivered result is kept. If a newer result lands while a request is in
// flight, the request future is dropped and counted as a failure before the
// newer result is sent. Dropping the submitter lets an in-flight request
// finish and then ends the task.

use super::health::{ConnectionHealth, HealthPolicy, HealthTracker, HealthTransition};
use super::{DispatchFailure, DispatchOutcome, Dispatcher};
use crate::analysis::ClassificationResult;
use crate::engine::clock::TimeSource;
use crate::telemetry::TelemetryHub;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Counters kept by the dispatch task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub attempts: u64,
    pub acks: u64,
    pub failures: u64,
    /// Failures caused by a newer result replacing an in-flight one
    pub superseded: u64,
}

/// Pipeline side of the result slot
#[derive(Debug)]
pub struct DispatchSubmitter {
    slot: watch::Sender<Option<ClassificationResult>>,
}

impl DispatchSubmitter {
    /// Replace whatever result is waiting with `result`
    ///
    /// # Returns
    /// false once the worker has gone away
    pub fn submit(&self, result: ClassificationResult) -> bool {
        self.slot.send(Some(result)).is_ok()
    }
}

/// Observer side of a running dispatch task
#[derive(Debug)]
pub struct DispatchHandle {
    health: watch::Receiver<ConnectionHealth>,
    task: JoinHandle<DispatchStats>,
}

impl DispatchHandle {
    pub fn health(&self) -> ConnectionHealth {
        *self.health.borrow()
    }

    /// Receiver notified on every health transition
    pub fn subscribe_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end (after the submitter is dropped)
    pub async fn join(self) -> Option<DispatchStats> {
        match self.task.await {
            Ok(stats) => Some(stats),
            Err(err) => {
                tracing::error!("[Dispatch] Worker task failed: {}", err);
                None
            }
        }
    }
}

struct DispatchWorker {
    dispatcher: Dispatcher,
    health: HealthTracker,
    clock: Arc<dyn TimeSource>,
    health_tx: watch::Sender<ConnectionHealth>,
    telemetry: Arc<TelemetryHub>,
    stats: DispatchStats,
}

impl DispatchWorker {
    async fn run(mut self, mut slot: watch::Receiver<Option<ClassificationResult>>) -> DispatchStats {
        tracing::info!(
            "[Dispatch] Worker started (timeout {:?})",
            self.dispatcher.timeout()
        );
        let mut next: Option<ClassificationResult> = None;

        loop {
            let result = match next.take() {
                Some(result) => result,
                None => {
                    if slot.changed().await.is_err() {
                        break;
                    }
                    let latest = slot.borrow_and_update().clone();
                    match latest {
                        Some(result) => result,
                        None => continue,
                    }
                }
            };

            let started = Instant::now();
            let mut attempt = self.dispatcher.attempt(&result);
            let outcome = tokio::select! {
                biased;
                outcome = &mut attempt => outcome,
                changed = slot.changed() => {
                    if changed.is_err() {
                        attempt.await
                    } else {
                        next = slot.borrow_and_update().clone();
                        DispatchOutcome::Fail(DispatchFailure::Superseded)
                    }
                }
            };
            self.record(&outcome, started);
        }

        tracing::info!(
            "[Dispatch] Worker exiting ({} attempts, {} acks, {} failures)",
            self.stats.attempts,
            self.stats.acks,
            self.stats.failures
        );
        self.stats
    }

    fn record(&mut self, outcome: &DispatchOutcome, started: Instant) {
        let now = self.clock.now();
        self.stats.attempts += 1;
        let transition = match outcome {
            DispatchOutcome::Ack { .. } => {
                self.stats.acks += 1;
                self.health.record_ack(now)
            }
            DispatchOutcome::Fail(DispatchFailure::Superseded) => {
                // no response was received
                self.stats.failures += 1;
                self.stats.superseded += 1;
                tracing::debug!("[Dispatch] In-flight attempt superseded by a newer result");
                None
            }
            DispatchOutcome::Fail(failure) => {
                self.stats.failures += 1;
                tracing::debug!(
                    "[Dispatch] Attempt failed ({}), {} consecutive",
                    failure,
                    self.health.consecutive_failures() + 1
                );
                self.health.record_failure(now)
            }
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }
        self.telemetry.record_dispatch(outcome, started.elapsed());
    }

    fn announce(&self, transition: HealthTransition) {
        let HealthTransition {
            from,
            to,
            consecutive_failures,
        } = transition;
        match to {
            ConnectionHealth::Connected => {
                tracing::info!("[Dispatch] Sink health {} -> {}", from, to)
            }
            _ => tracing::warn!(
                "[Dispatch] Sink health {} -> {} after {} consecutive failures",
                from,
                to,
                consecutive_failures
            ),
        }
        self.telemetry.record_health(from, to, consecutive_failures);
        self.health_tx.send_replace(to);
    }
}

/// Start the dispatch task on `runtime`
///
/// # Arguments
/// * `dispatcher` - sink plus per-attempt timeout
/// * `policy` - health thresholds
/// * `clock` - time source for the health tracker
/// * `telemetry` - hub receiving dispatch and health events
/// * `runtime` - runtime the task is spawned on
pub fn spawn_dispatch_worker(
    dispatcher: Dispatcher,
    policy: HealthPolicy,
    clock: Arc<dyn TimeSource>,
    telemetry: Arc<TelemetryHub>,
    runtime: &tokio::runtime::Handle,
) -> (DispatchSubmitter, DispatchHandle) {
    let (slot_tx, slot_rx) = watch::channel(None);
    let (health_tx, health_rx) = watch::channel(ConnectionHealth::Connected);

    let worker = DispatchWorker {
        dispatcher,
        health: HealthTracker::new(policy, clock.now()),
        clock,
        health_tx,
        telemetry,
        stats: DispatchStats::default(),
    };
    let task = runtime.spawn(worker.run(slot_rx));

    (
        DispatchSubmitter { slot: slot_tx },
        DispatchHandle {
            health: health_rx,
            task,
        },
    )
}

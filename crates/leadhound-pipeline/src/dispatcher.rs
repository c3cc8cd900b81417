//! Bounded background execution of runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::orchestrator::Orchestrator;

const DEFAULT_CAPACITY_RETRY: Duration = Duration::from_secs(15);

/// Spawns run executions onto the Tokio runtime.
///
/// At most `max_concurrent` runs execute at once and a run is never executed
/// twice concurrently by the same dispatcher. Across processes the store's
/// execution claims enforce the bound; a run refused for capacity waits
/// `capacity_retry` without holding a local permit and tries again.
#[derive(Clone)]
pub struct RunDispatcher {
    orchestrator: Arc<Orchestrator>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    capacity_retry: Duration,
}

struct InFlightGuard {
    id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl RunDispatcher {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            capacity_retry: DEFAULT_CAPACITY_RETRY,
        }
    }

    #[must_use]
    pub fn with_capacity_retry(mut self, delay: Duration) -> Self {
        self.capacity_retry = delay;
        self
    }

    /// Queues `public_id` for execution. Returns `false` when the run is
    /// already queued or executing here.
    pub fn dispatch(&self, public_id: Uuid) -> bool {
        let newly_added = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(public_id);
        if !newly_added {
            tracing::debug!(run_id = %public_id, "run already in flight");
            return false;
        }

        let guard = InFlightGuard {
            id: public_id,
            in_flight: Arc::clone(&self.in_flight),
        };
        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.semaphore);
        let capacity_retry = self.capacity_retry;

        tokio::spawn(async move {
            let _guard = guard;
            loop {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return;
                };
                let result = orchestrator.execute(public_id).await;
                drop(permit);

                match result {
                    Ok(outcome) => tracing::info!(
                        run_id = %public_id,
                        status = %outcome.status,
                        lead_count = outcome.lead_count,
                        "run execution finished"
                    ),
                    Err(PipelineError::AtCapacity { .. }) => {
                        tracing::debug!(
                            run_id = %public_id,
                            retry_in_ms = u64::try_from(capacity_retry.as_millis()).unwrap_or(u64::MAX),
                            "no free execution slot, waiting"
                        );
                        tokio::time::sleep(capacity_retry).await;
                        continue;
                    }
                    Err(PipelineError::AlreadyRunning { .. }) => tracing::info!(
                        run_id = %public_id,
                        "run is executing in another process, skipping"
                    ),
                    Err(e) => tracing::error!(
                        run_id = %public_id,
                        error = %e,
                        "run execution failed"
                    ),
                }
                return;
            }
        });

        true
    }

    #[must_use]
    pub fn is_in_flight(&self, public_id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&public_id)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

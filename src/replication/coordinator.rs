//! Fire-and-forget replication fan-out.
//!
//! # Responsibilities
//! - Turn one committed write into one push task per backup region
//! - Run pushes on a fixed worker pool behind a bounded queue
//! - Time every push and append its outcome to the replication log
//!
//! # Design Decisions
//! - `replicate` never awaits: it only enqueues
//! - No retries and no rollback; partial replication is a final state
//! - A full queue fails the task immediately instead of blocking the writer
//! - Every push has its own timeout; nothing cancels a task early
//! - No ordering between tasks, even for the same target

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use uuid::Uuid;

use crate::config::ReplicationConfig;
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, Stats};
use crate::region::{Region, RegionRegistry};
use crate::replication::ingress::IngressClient;
use crate::replication::log::ReplicationLog;
use crate::replication::types::{
    Operation, ReplicationEnvelope, ReplicationLogEntry, ReplicationStatus, TaskState,
};
use crate::replication::ReplicationError;
use crate::store::{Clock, Record};

/// One push of one record to one backup region.
#[derive(Debug)]
pub struct ReplicationTask {
    pub id: Uuid,
    pub target: Region,
    pub envelope: Arc<ReplicationEnvelope>,
    state: TaskState,
}

impl ReplicationTask {
    fn new(target: Region, envelope: Arc<ReplicationEnvelope>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            envelope,
            state: TaskState::Created,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal replication task transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(task = %self.id, from = ?self.state, to = ?next, "Replication task transition");
        self.state = next;
    }

    fn log_entry(&self, status: ReplicationStatus, latency_ms: u64, error: Option<String>, clock: &dyn Clock) -> ReplicationLogEntry {
        ReplicationLogEntry {
            id: self.id,
            source_region: self.envelope.source_region.clone(),
            target_region: self.target.id.clone(),
            operation: self.envelope.operation,
            table: self.envelope.record.table.clone(),
            record_id: self.envelope.record.id.clone(),
            timestamp: clock.now(),
            status,
            latency_ms,
            error,
        }
    }
}

/// Counts scheduled-but-unfinished tasks and wakes drainers at zero.
#[derive(Debug, Default)]
struct InFlight {
    pending: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            // Registered before the check so a concurrent `end` cannot be missed.
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// State shared by every worker.
struct WorkerContext {
    ingress: Arc<dyn IngressClient>,
    log: Arc<dyn ReplicationLog>,
    clock: Arc<dyn Clock>,
    stats: Arc<Stats>,
    timeout: Duration,
    in_flight: InFlight,
}

impl WorkerContext {
    async fn execute(&self, mut task: ReplicationTask) {
        task.transition(TaskState::InFlight);
        let started = Instant::now();

        let push = self.ingress.push(&task.target, &task.envelope);
        let outcome = match time::timeout(self.timeout, push).await {
            Ok(result) => result,
            Err(_) => Err(ReplicationError::Timeout(self.timeout)),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let entry = match outcome {
            Ok(()) => {
                task.transition(TaskState::Succeeded);
                self.stats.replication_succeeded();
                tracing::info!(
                    source = %task.envelope.source_region,
                    target = %task.target.id,
                    record_id = %task.envelope.record.id,
                    operation = %task.envelope.operation,
                    latency_ms,
                    "Replication succeeded"
                );
                task.log_entry(ReplicationStatus::Success, latency_ms, None, self.clock.as_ref())
            }
            Err(e) => {
                task.transition(TaskState::Failed);
                self.stats.replication_failed();
                tracing::warn!(
                    source = %task.envelope.source_region,
                    target = %task.target.id,
                    record_id = %task.envelope.record.id,
                    operation = %task.envelope.operation,
                    latency_ms,
                    error = %e,
                    "Replication failed"
                );
                task.log_entry(ReplicationStatus::Failed, latency_ms, Some(e.to_string()), self.clock.as_ref())
            }
        };

        metrics::record_replication(&entry.target_region, entry.status.as_str(), latency_ms);
        self.append(entry).await;
    }

    /// Log a task that was never pushed as failed with zero latency.
    async fn fail_unsent(&self, mut task: ReplicationTask, error: ReplicationError) {
        task.transition(TaskState::Failed);
        self.stats.replication_dropped();
        tracing::warn!(
            source = %task.envelope.source_region,
            target = %task.target.id,
            record_id = %task.envelope.record.id,
            error = %error,
            "Replication task rejected"
        );
        metrics::record_replication(&task.target.id, ReplicationStatus::Failed.as_str(), 0);

        let entry = task.log_entry(ReplicationStatus::Failed, 0, Some(error.to_string()), self.clock.as_ref());
        self.append(entry).await;
    }

    async fn append(&self, entry: ReplicationLogEntry) {
        if let Err(e) = self.log.append(entry).await {
            tracing::error!(error = %e, "Failed to append replication log entry");
        }
    }
}

/// Schedules cross-region pushes for committed writes.
pub struct ReplicationCoordinator {
    registry: Arc<RegionRegistry>,
    queue: mpsc::Sender<ReplicationTask>,
    capacity: usize,
    ctx: Arc<WorkerContext>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl ReplicationCoordinator {
    /// Create the coordinator and spawn its worker pool on the current runtime.
    ///
    /// Workers exit when `shutdown` fires. Pushes already running finish; tasks
    /// still queued are logged as failed. Call [`drain`](Self::drain) first to
    /// let queued pushes run.
    pub fn start(
        registry: Arc<RegionRegistry>,
        ingress: Arc<dyn IngressClient>,
        log: Arc<dyn ReplicationLog>,
        clock: Arc<dyn Clock>,
        stats: Arc<Stats>,
        config: &ReplicationConfig,
        shutdown: &Shutdown,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(Mutex::new(rx));

        let ctx = Arc::new(WorkerContext {
            ingress,
            log,
            clock,
            stats,
            timeout: config.timeout(),
            in_flight: InFlight::default(),
        });

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let rx = rx.clone();
                let ctx = ctx.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(run_worker(id, rx, ctx, shutdown))
            })
            .collect();

        tracing::info!(
            workers = config.workers.max(1),
            queue_capacity = capacity,
            timeout_ms = config.timeout_ms,
            "Replication coordinator started"
        );

        Self {
            registry,
            queue: tx,
            capacity,
            ctx,
            workers: StdMutex::new(workers),
        }
    }

    /// Schedule one push per backup region of `source_region`.
    ///
    /// Returns immediately with the number of tasks created. Call only after
    /// the local write has committed.
    pub fn replicate(&self, record: &Record, operation: Operation, source_region: &str) -> Result<usize, ReplicationError> {
        let targets = self
            .registry
            .backups_of(source_region)
            .ok_or_else(|| ReplicationError::UnknownRegion(source_region.to_string()))?;

        if targets.is_empty() {
            tracing::debug!(source = %source_region, "No backup regions, nothing to replicate");
            return Ok(0);
        }

        let envelope = Arc::new(ReplicationEnvelope {
            source_region: source_region.to_string(),
            operation,
            record: record.clone(),
            sent_at: self.ctx.clock.now(),
        });

        for target in &targets {
            let task = ReplicationTask::new((*target).clone(), envelope.clone());
            self.ctx.in_flight.begin();
            self.ctx.stats.replication_scheduled();

            match self.queue.try_send(task) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(task))
                | Err(mpsc::error::TrySendError::Closed(task)) => self.reject(task),
            }
        }

        metrics::record_queue_depth(self.queue_depth());
        Ok(targets.len())
    }

    /// Fail a task that never made it onto the queue.
    fn reject(&self, task: ReplicationTask) {
        let error = if self.queue.is_closed() {
            ReplicationError::QueueClosed
        } else {
            ReplicationError::QueueFull
        };
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            ctx.fail_unsent(task, error).await;
            ctx.in_flight.end();
        });
    }

    /// Wait until every scheduled task has reached a terminal state and been logged.
    pub async fn drain(&self) {
        self.ctx.in_flight.wait_idle().await;
    }

    /// Tasks scheduled but not yet logged.
    pub fn pending(&self) -> usize {
        self.ctx.in_flight.count()
    }

    /// Tasks waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.capacity - self.queue.capacity()
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for every worker to exit after shutdown has been signalled.
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
            workers.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Replication worker panicked");
            }
        }
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ReplicationTask>>>,
    ctx: Arc<WorkerContext>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::debug!(worker = id, "Replication worker started");
    loop {
        let next = tokio::select! {
            biased;
            task = async { rx.lock().await.recv().await } => task,
            _ = shutdown.recv() => None,
        };

        let Some(task) = next else { break };
        ctx.execute(task).await;
        ctx.in_flight.end();
    }

    // Later sends are rejected; whatever is still buffered is failed here.
    let mut rx = rx.lock().await;
    rx.close();
    let mut abandoned = 0;
    while let Ok(task) = rx.try_recv() {
        ctx.fail_unsent(task, ReplicationError::QueueClosed).await;
        ctx.in_flight.end();
        abandoned += 1;
    }
    tracing::debug!(worker = id, abandoned, "Replication worker stopped");
}

//! In-process job queue with a bounded worker pool.
//!
//! Ordered FIFO delivery with per-event dedup keys: at most one live job
//! per provider event ID. Failed deliveries are retried with exponential
//! backoff up to a bounded attempt count, then parked in a failed set
//! that is retained longer than completed jobs.
//!
//! ## Lifecycle
//!
//! The queue is explicitly constructed and injected; `start` spins up the
//! worker pool and `close` signals shutdown, drains pending work, and
//! joins the workers. Tests construct an isolated queue per case.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `concurrency` | 5 | Simultaneous in-flight jobs |
//! | `max_attempts` | 3 | Delivery attempts before parking |
//! | `backoff_base` | 500ms | First retry delay, doubled per attempt |
//! | `keep_completed` | 100 | Completed jobs retained for audit |
//! | `completed_ttl` | 1h | Age bound on completed jobs |
//! | `failed_ttl` | 24h | Age bound on parked failed jobs |

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::ports::{EnqueueOutcome, EventJob, JobHandler, JobQueue, QueueError};

/// Configuration for the in-process queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of worker tasks pulling jobs.
    pub concurrency: usize,

    /// Delivery attempts before a job is parked in the failed set.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each subsequent attempt.
    pub backoff_base: Duration,

    /// Count bound on the completed set.
    pub keep_completed: usize,

    /// Age bound on the completed set.
    pub completed_ttl: Duration,

    /// Age bound on the failed set. Longer than `completed_ttl` so
    /// operators can inspect failures before they are garbage collected.
    pub failed_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            keep_completed: 100,
            completed_ttl: Duration::from_secs(3600),
            failed_ttl: Duration::from_secs(86_400),
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }
}

/// A delivery waiting in the pending queue.
#[derive(Debug)]
struct Delivery {
    job_id: Uuid,
    job: EventJob,
    /// Attempt number of the next delivery, starting at 1.
    attempt: u32,
}

/// Completed job retained for audit.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job_id: Uuid,
    pub dedup_key: String,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

/// Job that exhausted its attempts, parked for inspection.
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job_id: Uuid,
    pub dedup_key: String,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Delivery>,
    /// Dedup keys with a live job: pending, in-flight, or awaiting retry.
    live: HashSet<String>,
    completed: VecDeque<CompletedJob>,
    failed: VecDeque<FailedJob>,
    closed: bool,
}

/// Queue counters, exposed for observability and tests.
#[derive(Default)]
struct QueueCounters {
    enqueued: AtomicU64,
    duplicates: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub duplicates: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
}

/// In-process implementation of the `JobQueue` port.
pub struct InProcessJobQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    counters: Arc<QueueCounters>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: QueueConfig,
}

impl InProcessJobQueue {
    pub fn new(config: QueueConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            counters: Arc::new(QueueCounters::default()),
            shutdown,
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Starts the worker pool delivering jobs to `handler`.
    pub fn start(&self, handler: Arc<dyn JobHandler>) {
        let mut workers = self.workers.lock().expect("queue worker lock poisoned");
        for worker_id in 0..self.config.concurrency {
            let ctx = WorkerContext {
                state: Arc::clone(&self.state),
                notify: Arc::clone(&self.notify),
                counters: Arc::clone(&self.counters),
                shutdown: self.shutdown.subscribe(),
                handler: Arc::clone(&handler),
                config: self.config.clone(),
            };
            workers.push(tokio::spawn(run_worker(worker_id, ctx)));
        }
    }

    /// Snapshot of the queue counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Jobs currently parked in the failed set.
    pub fn failed_jobs(&self) -> Vec<FailedJob> {
        let state = self.state.lock().expect("queue state lock poisoned");
        state.failed.iter().cloned().collect()
    }

    /// Jobs in the completed set.
    pub fn completed_jobs(&self) -> Vec<CompletedJob> {
        let state = self.state.lock().expect("queue state lock poisoned");
        state.completed.iter().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for InProcessJobQueue {
    async fn enqueue(&self, job: EventJob) -> Result<EnqueueOutcome, QueueError> {
        {
            let mut state = self.state.lock().expect("queue state lock poisoned");
            if state.closed {
                return Err(QueueError::Closed);
            }
            if state.live.contains(job.dedup_key()) {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                return Ok(EnqueueOutcome::Duplicate);
            }

            let job_id = Uuid::new_v4();
            state.live.insert(job.dedup_key().to_string());
            state.pending.push_back(Delivery {
                job_id,
                job,
                attempt: 1,
            });
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            self.notify.notify_one();
            Ok(EnqueueOutcome::Enqueued(job_id))
        }
    }

    async fn exists(&self, dedup_key: &str) -> bool {
        let state = self.state.lock().expect("queue state lock poisoned");
        state.live.contains(dedup_key)
    }

    async fn close(&self) {
        {
            let mut state = self.state.lock().expect("queue state lock poisoned");
            state.closed = true;
        }
        let _ = self.shutdown.send(true);
        self.notify.notify_waiters();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("queue worker lock poisoned");
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

struct WorkerContext {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    counters: Arc<QueueCounters>,
    shutdown: watch::Receiver<bool>,
    handler: Arc<dyn JobHandler>,
    config: QueueConfig,
}

async fn run_worker(worker_id: usize, mut ctx: WorkerContext) {
    loop {
        let next = {
            let mut state = ctx.state.lock().expect("queue state lock poisoned");
            let delivery = state.pending.pop_front();
            // Pass the baton so idle siblings pick up remaining work.
            if delivery.is_some() && !state.pending.is_empty() {
                ctx.notify.notify_one();
            }
            delivery
        };

        match next {
            Some(delivery) => {
                deliver(worker_id, &ctx, delivery).await;
            }
            None => {
                if *ctx.shutdown.borrow() {
                    return;
                }
                tokio::select! {
                    _ = ctx.notify.notified() => {}
                    _ = ctx.shutdown.changed() => {}
                }
            }
        }
    }
}

async fn deliver(worker_id: usize, ctx: &WorkerContext, delivery: Delivery) {
    let attempt = delivery.attempt;
    tracing::debug!(
        worker_id,
        job_id = %delivery.job_id,
        provider_event_id = %delivery.job.provider_event_id,
        attempt,
        "delivering job"
    );

    match ctx.handler.process(&delivery.job, attempt).await {
        Ok(()) => {
            let mut state = ctx.state.lock().expect("queue state lock poisoned");
            state.live.remove(delivery.job.dedup_key());
            state.completed.push_back(CompletedJob {
                job_id: delivery.job_id,
                dedup_key: delivery.job.provider_event_id.clone(),
                attempts: attempt,
                finished_at: Utc::now(),
            });
            prune_completed(&mut state, &ctx.config);
            ctx.counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) if attempt >= ctx.config.max_attempts => {
            tracing::error!(
                job_id = %delivery.job_id,
                provider_event_id = %delivery.job.provider_event_id,
                attempts = attempt,
                error = %err,
                "job exhausted attempts, parking in failed set"
            );
            let mut state = ctx.state.lock().expect("queue state lock poisoned");
            state.live.remove(delivery.job.dedup_key());
            state.failed.push_back(FailedJob {
                job_id: delivery.job_id,
                dedup_key: delivery.job.provider_event_id.clone(),
                attempts: attempt,
                last_error: err.to_string(),
                failed_at: Utc::now(),
            });
            prune_failed(&mut state, &ctx.config);
            ctx.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            let delay = ctx.config.backoff_base * 2u32.saturating_pow(attempt - 1);
            tracing::warn!(
                job_id = %delivery.job_id,
                provider_event_id = %delivery.job.provider_event_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "job failed, scheduling retry"
            );
            ctx.counters.retried.fetch_add(1, Ordering::Relaxed);

            // The dedup key stays live while the retry is pending, so a
            // second enqueue for the same event remains a no-op.
            let state = Arc::clone(&ctx.state);
            let notify = Arc::clone(&ctx.notify);
            let mut delivery = delivery;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                delivery.attempt += 1;
                let mut state = state.lock().expect("queue state lock poisoned");
                state.pending.push_back(delivery);
                drop(state);
                notify.notify_one();
            });
        }
    }
}

fn prune_completed(state: &mut QueueState, config: &QueueConfig) {
    while state.completed.len() > config.keep_completed {
        state.completed.pop_front();
    }
    let cutoff = Utc::now()
        - chrono::Duration::from_std(config.completed_ttl).unwrap_or(chrono::Duration::zero());
    while state
        .completed
        .front()
        .is_some_and(|job| job.finished_at < cutoff)
    {
        state.completed.pop_front();
    }
}

fn prune_failed(state: &mut QueueState, config: &QueueConfig) {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(config.failed_ttl).unwrap_or(chrono::Duration::zero());
    while state
        .failed
        .front()
        .is_some_and(|job| job.failed_at < cutoff)
    {
        state.failed.pop_front();
    }
}

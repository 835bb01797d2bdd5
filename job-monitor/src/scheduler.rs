use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use common::storage::job_store::JobRecordStore;
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    key_codec::canonicalize,
    reconciler::{ProgressReconciler, ProgressSnapshot},
    session::Session,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("No user is logged in; monitoring was not started")]
    NotAuthenticated,
    #[error("Malformed job identifier: {0}")]
    MalformedIdentifier(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress(ProgressSnapshot),
    /// Emitted once per monitored job, after its final progress event, on success only.
    Completed { job_id: String },
}

/// Receives reconciled progress. Called while the scheduler holds its state lock, so
/// implementations must not call back into the scheduler.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
    fn on_completed(&self, job_id: &str);
}

/// Forwards progress as [`ProgressEvent`]s over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        if self
            .tx
            .send(ProgressEvent::Progress(snapshot.clone()))
            .is_err()
        {
            debug!(job_id = %snapshot.job_id, "progress receiver dropped");
        }
    }

    fn on_completed(&self, job_id: &str) {
        if self
            .tx
            .send(ProgressEvent::Completed {
                job_id: job_id.to_string(),
            })
            .is_err()
        {
            debug!(job_id, "progress receiver dropped");
        }
    }
}

struct Slot {
    state: MonitorState,
    target: Option<String>,
    /// Bumped on every start; fetch results carry the generation they were issued under.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Slot {
    fn is_current(&self, job_id: &str, generation: u64) -> bool {
        self.state == MonitorState::Polling
            && self.generation == generation
            && self.target.as_deref() == Some(job_id)
    }

    fn cancel_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

struct Shared {
    records: Arc<dyn JobRecordStore>,
    reconciler: ProgressReconciler,
    sink: Arc<dyn ProgressSink>,
    slot: Mutex<Slot>,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_once(&self, job_id: &str, generation: u64) {
        debug!(job_id, "fetching job record");
        let record = match self.records.get(job_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(job_id, "job record not visible yet, skipping tick");
                return;
            }
            Err(err) => {
                warn!(job_id, error = %err, "failed to fetch job record, polling continues");
                return;
            }
        };
        let snapshot = self.reconciler.reconcile(&record);

        let mut slot = self.slot();
        if !slot.is_current(job_id, generation) {
            debug!(job_id, "discarding stale job record response");
            return;
        }
        self.sink.on_progress(&snapshot);
        if snapshot.terminal {
            slot.state = MonitorState::Stopped;
            slot.cancel_timer();
            info!(job_id, status = %snapshot.status, "job reached terminal status, monitoring stopped");
            if snapshot.succeeded {
                self.sink.on_completed(job_id);
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.slot
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_timer();
    }
}

/// Polls one job record at a fixed cadence until it turns terminal or monitoring is stopped.
///
/// At most one target is monitored at a time. Starting a new target cancels the previous
/// timer before the new one is armed. In-flight fetches are never cancelled; their results
/// are dropped unless the scheduler is still polling the same target under the same start.
#[derive(Clone)]
pub struct PollingScheduler {
    shared: Arc<Shared>,
    session: Arc<dyn Session>,
    interval: Duration,
}

impl PollingScheduler {
    pub fn new(
        records: Arc<dyn JobRecordStore>,
        reconciler: ProgressReconciler,
        sink: Arc<dyn ProgressSink>,
        session: Arc<dyn Session>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                records,
                reconciler,
                sink,
                slot: Mutex::new(Slot {
                    state: MonitorState::Idle,
                    target: None,
                    generation: 0,
                    timer: None,
                }),
            }),
            session,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> MonitorState {
        self.shared.slot().state
    }

    pub fn current_target(&self) -> Option<String> {
        self.shared.slot().target.clone()
    }

    /// Begins polling `job_id`, replacing any current target. The first fetch happens one
    /// interval after this call. Must be called from within a tokio runtime.
    pub fn start_monitoring(&self, job_id: &str) -> Result<(), MonitorError> {
        if !self.session.is_logged_in() {
            return Err(MonitorError::NotAuthenticated);
        }
        if canonicalize(job_id).is_none() {
            return Err(MonitorError::MalformedIdentifier(job_id.to_string()));
        }

        let mut slot = self.shared.slot();
        if slot.cancel_timer() {
            debug!(previous = ?slot.target, "replacing monitored job");
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.target = Some(job_id.to_string());
        slot.state = MonitorState::Polling;
        slot.timer = Some(tokio::spawn(run_timer(
            Arc::downgrade(&self.shared),
            job_id.to_string(),
            slot.generation,
            self.interval,
        )));
        info!(job_id, interval_ms = self.interval.as_millis(), "monitoring started");
        Ok(())
    }

    /// Cancels the timer. Returns `true` only for the call that actually stopped polling;
    /// calls while idle or already stopped do nothing.
    pub fn stop_monitoring(&self) -> bool {
        let mut slot = self.shared.slot();
        if slot.state != MonitorState::Polling {
            return false;
        }
        slot.state = MonitorState::Stopped;
        slot.cancel_timer();
        info!(job_id = ?slot.target, "monitoring stopped");
        true
    }
}

async fn run_timer(shared: Weak<Shared>, job_id: String, generation: u64, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(scheduler) = shared.upgrade() else {
            break;
        };
        if !scheduler.slot().is_current(&job_id, generation) {
            break;
        }
        let job_id = job_id.clone();
        // Reads are idempotent, so a tick does not wait for the previous fetch.
        tokio::spawn(async move {
            scheduler.poll_once(&job_id, generation).await;
        });
    }
}

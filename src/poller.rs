//! Keeps one batch's status fresh until it reaches a terminal state.
//!
//! The poller is a small state machine: `Idle` before the first answer, `Polling(interval)` while the
//! batch runs, `Stopped` once the batch is terminal or the owner cancels. Every observation picks the
//! next sleep from the reported status. Failed polls never stop the loop and never back off.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::batch::BatchApi;
use crate::config::PollIntervals;
use crate::registry::JobRegistry;
use crate::types::{BatchJob, BatchStatus};

/// Delay before the next poll for a batch reporting `status`.
pub fn interval_for(status: &BatchStatus, intervals: &PollIntervals) -> Duration {
    let millis = match status {
        BatchStatus::Queued => intervals.queued_ms,
        BatchStatus::Processing => intervals.processing_ms,
        BatchStatus::Paused | BatchStatus::Error => intervals.idle_ms,
        _ => intervals.default_ms,
    };
    Duration::from_millis(millis)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling(Duration),
    Stopped,
}

impl PollerState {
    pub fn observe(self, status: &BatchStatus, intervals: &PollIntervals) -> Self {
        match self {
            PollerState::Stopped => PollerState::Stopped,
            _ if status.is_terminal() => PollerState::Stopped,
            _ => PollerState::Polling(interval_for(status, intervals)),
        }
    }

    /// A failed poll keeps the current cadence.
    pub fn after_failure(self, intervals: &PollIntervals) -> Self {
        match self {
            PollerState::Idle => PollerState::Polling(Duration::from_millis(intervals.default_ms)),
            other => other,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == PollerState::Stopped
    }
}

/// What a poller last saw, published after every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSnapshot {
    pub state: PollerState,
    pub job: Option<BatchJob>,
    /// Latest error shown to the user; suppressed while the batch is queued.
    pub error: Option<String>,
    pub polls: u64,
}

impl PollSnapshot {
    fn initial() -> Self {
        Self {
            state: PollerState::Idle,
            job: None,
            error: None,
            polls: 0,
        }
    }
}

/// Owner's handle on a running poller. Dropping it cancels the poller.
#[derive(Debug)]
pub struct PollerHandle {
    batch_id: String,
    cancel: CancellationToken,
    updates: watch::Receiver<PollSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn updates(&self) -> watch::Receiver<PollSnapshot> {
        self.updates.clone()
    }

    pub fn latest(&self) -> PollSnapshot {
        self.updates.borrow().clone()
    }

    /// Waits for the poller to stop on its own or through cancellation.
    pub async fn join(mut self) -> PollSnapshot {
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(batch_id = %self.batch_id, error = %err, "poller task failed");
            }
        }
        self.latest()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct StatusPoller {
    api: Arc<dyn BatchApi>,
    registry: Arc<JobRegistry>,
    intervals: PollIntervals,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn BatchApi>, registry: Arc<JobRegistry>, intervals: PollIntervals) -> Self {
        Self {
            api,
            registry,
            intervals,
        }
    }

    /// Starts polling `batch_id` immediately. `cancel` ends the poller; it is also cancelled by the
    /// poller itself when the batch reaches a terminal state.
    pub fn spawn(self, batch_id: impl Into<String>, cancel: CancellationToken) -> PollerHandle {
        let batch_id = batch_id.into();
        let (tx, rx) = watch::channel(PollSnapshot::initial());
        let task = tokio::spawn(self.run(batch_id.clone(), cancel.clone(), tx));
        PollerHandle {
            batch_id,
            cancel,
            updates: rx,
            task: Some(task),
        }
    }

    #[tracing::instrument(name = "batch_poller", skip_all, fields(batch_id = %batch_id))]
    async fn run(self, batch_id: String, cancel: CancellationToken, tx: watch::Sender<PollSnapshot>) {
        let mut snapshot = PollSnapshot::initial();

        loop {
            let ticket = self.registry.issue_ticket().await;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcome = self.api.status(&batch_id) => outcome,
            };
            snapshot.polls += 1;

            match outcome {
                Ok(job) => {
                    self.registry.apply(ticket, job).await;
                    let entry = self.registry.get(&batch_id).await.unwrap_or_default();
                    if let Some(status) = entry.status() {
                        snapshot.state = snapshot.state.observe(status, &self.intervals);
                    }
                    snapshot.job = entry.job;
                    snapshot.error = entry.error;
                }
                Err(err) => {
                    let message = err.display_message();
                    let last_status = self.registry.status(&batch_id).await;
                    if last_status == Some(BatchStatus::Queued) {
                        tracing::debug!(error = %message, "status poll failed while queued");
                    } else {
                        tracing::warn!(error = %message, "status poll failed");
                        if self
                            .registry
                            .record_error(&batch_id, ticket, message.clone())
                            .await
                        {
                            snapshot.error = Some(message);
                        }
                    }
                    snapshot.state = snapshot.state.after_failure(&self.intervals);
                }
            }

            let state = snapshot.state;
            tx.send_replace(snapshot.clone());

            let PollerState::Polling(interval) = state else {
                break;
            };
            tracing::trace!(interval_ms = interval.as_millis() as u64, "next poll scheduled");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        if let Some(job) = &snapshot.job {
            tracing::info!(status = %job.status, polls = snapshot.polls, "stopped polling");
        }
        snapshot.state = PollerState::Stopped;
        tx.send_replace(snapshot);
        cancel.cancel();
    }
}

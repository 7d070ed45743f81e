//! Last-known state of every batch this client has seen.
//!
//! Entries change only through API responses. Each request that may update a batch takes a [`Ticket`]
//! before it is sent; a response is applied only if its ticket is newer than the one that produced the
//! current state, so a slow poll can never overwrite a later pause/stop/refresh result, and two racing
//! control calls settle on the one issued last.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::types::{BatchJob, BatchStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobEntry {
    pub job: Option<BatchJob>,
    /// Message to show the user, cleared by the next successful response.
    pub error: Option<String>,
    applied: Option<Ticket>,
}

impl JobEntry {
    pub fn status(&self) -> Option<&BatchStatus> {
        self.job.as_ref().map(|job| &job.status)
    }

    fn accepts(&self, ticket: Ticket) -> bool {
        self.applied.is_none_or(|applied| ticket > applied)
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_ticket: u64,
    jobs: HashMap<String, JobEntry>,
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    state: Mutex<RegistryState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn issue_ticket(&self) -> Ticket {
        let mut state = self.state.lock().await;
        state.next_ticket += 1;
        Ticket(state.next_ticket)
    }

    /// Stores `job` unless a newer response for the same batch is already applied.
    pub async fn apply(&self, ticket: Ticket, job: BatchJob) -> bool {
        let mut state = self.state.lock().await;
        let entry = state.jobs.entry(job.batch_id.clone()).or_default();
        if !entry.accepts(ticket) {
            tracing::debug!(
                batch_id = %job.batch_id,
                status = %job.status,
                "dropping stale batch response"
            );
            return false;
        }
        entry.applied = Some(ticket);
        entry.job = Some(job);
        entry.error = None;
        true
    }

    /// Records a failure for the user. Ignored when a newer response already landed.
    pub async fn record_error(&self, batch_id: &str, ticket: Ticket, message: String) -> bool {
        let mut state = self.state.lock().await;
        let entry = state.jobs.entry(batch_id.to_string()).or_default();
        if !entry.accepts(ticket) {
            return false;
        }
        entry.error = Some(message);
        true
    }

    pub async fn clear_error(&self, batch_id: &str) {
        if let Some(entry) = self.state.lock().await.jobs.get_mut(batch_id) {
            entry.error = None;
        }
    }

    pub async fn get(&self, batch_id: &str) -> Option<JobEntry> {
        self.state.lock().await.jobs.get(batch_id).cloned()
    }

    pub async fn status(&self, batch_id: &str) -> Option<BatchStatus> {
        self.state
            .lock()
            .await
            .jobs
            .get(batch_id)
            .and_then(|entry| entry.status().cloned())
    }

    /// All known batches, ordered by id.
    pub async fn snapshot(&self) -> Vec<(String, JobEntry)> {
        let state = self.state.lock().await;
        let mut out: Vec<_> = state
            .jobs
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn remove(&self, batch_id: &str) -> Option<JobEntry> {
        self.state.lock().await.jobs.remove(batch_id)
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::batch::{BatchAction, BatchApi, generate_batch_id, require_files};
use crate::config::PollIntervals;
use crate::poller::{PollSnapshot, PollerHandle, StatusPoller};
use crate::registry::{JobRegistry, Ticket};
use crate::types::{BatchJob, BatchSettings, FileDescriptor};

/// Starts and steers batches, keeping one poller per running batch.
pub struct BatchController {
    api: Arc<dyn BatchApi>,
    registry: Arc<JobRegistry>,
    intervals: PollIntervals,
    shutdown: CancellationToken,
    pollers: Mutex<HashMap<String, PollerHandle>>,
}

impl BatchController {
    pub fn new(api: Arc<dyn BatchApi>, intervals: PollIntervals) -> Self {
        Self {
            api,
            registry: Arc::new(JobRegistry::new()),
            intervals,
            shutdown: CancellationToken::new(),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<JobRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Submits `files` under a fresh batch id and starts polling it.
    pub async fn start(
        &self,
        files: &[FileDescriptor],
        settings: &BatchSettings,
    ) -> Result<BatchJob> {
        require_files(files)?;
        let batch_id = generate_batch_id();
        let ticket = self.registry.issue_ticket().await;

        let job = match self.api.start(&batch_id, files, settings).await {
            Ok(job) => job,
            Err(err) => {
                tracing::warn!(%batch_id, error = %err, "failed to start batch");
                return Err(err);
            }
        };
        tracing::info!(
            %batch_id,
            status = %job.status,
            files = files.len(),
            "batch started"
        );

        self.registry.apply(ticket, job.clone()).await;
        if !job.status.is_terminal() {
            self.watch(&job.batch_id).await;
        }
        Ok(job)
    }

    /// Subscribes to poll updates for `batch_id`, starting a poller if none is running.
    pub async fn watch(&self, batch_id: &str) -> watch::Receiver<PollSnapshot> {
        let mut pollers = self.pollers.lock().await;
        pollers.retain(|_, handle| !handle.is_finished());
        if let Some(handle) = pollers.get(batch_id) {
            return handle.updates();
        }
        let handle = StatusPoller::new(self.api.clone(), self.registry.clone(), self.intervals)
            .spawn(batch_id, self.shutdown.child_token());
        let updates = handle.updates();
        pollers.insert(batch_id.to_string(), handle);
        updates
    }

    pub async fn is_polling(&self, batch_id: &str) -> bool {
        self.pollers
            .lock()
            .await
            .get(batch_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn pause(&self, batch_id: &str) -> Result<BatchJob> {
        self.control(BatchAction::Pause, batch_id).await
    }

    pub async fn resume(&self, batch_id: &str) -> Result<BatchJob> {
        let job = self.control(BatchAction::Resume, batch_id).await?;
        if !job.status.is_terminal() {
            self.watch(batch_id).await;
        }
        Ok(job)
    }

    /// Stops the batch; on success its poller is cancelled as well.
    ///
    /// Polls sent while the stop was in flight hold newer tickets than the stop itself, so the poller is
    /// shut down first and the stop result is applied under a ticket issued after it.
    pub async fn stop(&self, batch_id: &str) -> Result<BatchJob> {
        let (ticket, result) = self.send_command(BatchAction::Stop, batch_id).await;
        if result.is_err() {
            return self.settle(batch_id, ticket, result).await;
        }
        let handle = self.pollers.lock().await.remove(batch_id);
        if let Some(handle) = handle {
            handle.cancel();
            handle.join().await;
        }
        let ticket = self.registry.issue_ticket().await;
        self.settle(batch_id, ticket, result).await
    }

    /// One status fetch outside the poll cadence.
    pub async fn refresh(&self, batch_id: &str) -> Result<BatchJob> {
        let ticket = self.registry.issue_ticket().await;
        let result = self.api.status(batch_id).await;
        self.settle(batch_id, ticket, result).await
    }

    /// Every batch the backend knows, merged into the registry.
    pub async fn list(&self) -> Result<Vec<BatchJob>> {
        let ticket = self.registry.issue_ticket().await;
        let list = self.api.list().await?;
        let mut jobs = Vec::with_capacity(list.jobs.len());
        for (batch_id, mut job) in list.jobs {
            if job.batch_id.is_empty() {
                job.batch_id = batch_id;
            }
            self.registry.apply(ticket, job.clone()).await;
            jobs.push(job);
        }
        Ok(jobs)
    }

    /// Cancels every poller and waits for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handles: Vec<PollerHandle> = self.pollers.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.join().await;
        }
    }

    async fn control(&self, action: BatchAction, batch_id: &str) -> Result<BatchJob> {
        let (ticket, result) = self.send_command(action, batch_id).await;
        self.settle(batch_id, ticket, result).await
    }

    async fn send_command(&self, action: BatchAction, batch_id: &str) -> (Ticket, Result<BatchJob>) {
        let ticket = self.registry.issue_ticket().await;
        tracing::info!(%batch_id, action = action.as_str(), "sending batch command");
        (ticket, self.api.control(action, batch_id).await)
    }

    async fn settle(
        &self,
        batch_id: &str,
        ticket: Ticket,
        result: Result<BatchJob>,
    ) -> Result<BatchJob> {
        match result {
            Ok(mut job) => {
                if job.batch_id.is_empty() {
                    job.batch_id = batch_id.to_string();
                }
                self.registry.apply(ticket, job.clone()).await;
                Ok(job)
            }
            Err(err) => {
                self.registry
                    .record_error(batch_id, ticket, err.display_message())
                    .await;
                Err(err)
            }
        }
    }
}

impl Drop for BatchController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

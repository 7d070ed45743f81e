use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::api::ApiClient;
use crate::types::{BatchJob, BatchList, BatchSettings, FileDescriptor, StartBatchRequest};
use crate::utils::http::send_checked_json;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchAction {
    Pause,
    Resume,
    Stop,
}

impl BatchAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchAction::Pause => "pause",
            BatchAction::Resume => "resume",
            BatchAction::Stop => "stop",
        }
    }
}

/// Batch endpoints of the OCR backend.
#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn start(
        &self,
        batch_id: &str,
        files: &[FileDescriptor],
        settings: &BatchSettings,
    ) -> Result<BatchJob>;
    async fn status(&self, batch_id: &str) -> Result<BatchJob>;
    async fn control(&self, action: BatchAction, batch_id: &str) -> Result<BatchJob>;
    async fn list(&self) -> Result<BatchList>;
}

#[derive(Debug, Clone)]
pub struct HttpBatchApi {
    api: ApiClient,
}

impl HttpBatchApi {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl BatchApi for HttpBatchApi {
    async fn start(
        &self,
        batch_id: &str,
        files: &[FileDescriptor],
        settings: &BatchSettings,
    ) -> Result<BatchJob> {
        let body = StartBatchRequest {
            batch_id,
            files,
            settings,
        };
        let req = self.api.post(&["ocr", "batch", "start"])?.json(&body);
        Ok(with_batch_id(send_checked_json(req).await?, batch_id))
    }

    async fn status(&self, batch_id: &str) -> Result<BatchJob> {
        let req = self.api.get(&["ocr", "batch", "status", batch_id])?;
        Ok(with_batch_id(send_checked_json(req).await?, batch_id))
    }

    async fn control(&self, action: BatchAction, batch_id: &str) -> Result<BatchJob> {
        let req = self.api.post(&["ocr", "batch", action.as_str(), batch_id])?;
        Ok(with_batch_id(send_checked_json(req).await?, batch_id))
    }

    async fn list(&self) -> Result<BatchList> {
        let req = self.api.get(&["ocr", "batch", "list"])?;
        send_checked_json(req).await
    }
}

/// Some backend versions omit the id from status payloads.
fn with_batch_id(mut job: BatchJob, batch_id: &str) -> BatchJob {
    if job.batch_id.is_empty() {
        job.batch_id = batch_id.to_string();
    }
    job
}

static BATCH_ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// `batch_<unix_ms>_<random>`; ids generated in the same millisecond differ by their suffix.
pub fn generate_batch_id() -> String {
    let ts_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    let mut bytes = [0u8; 6];
    if getrandom::fill(&mut bytes).is_err() {
        let seq = BATCH_ID_SEQ.fetch_add(1, Ordering::Relaxed);
        return format!("batch_{ts_ms}_s{seq}");
    }
    format!("batch_{ts_ms}_{}", base36(&bytes))
}

fn base36(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut value = bytes
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    let mut out = Vec::new();
    loop {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) fn require_files(files: &[FileDescriptor]) -> Result<()> {
    if files.is_empty() {
        return Err(Error::InvalidRequest(
            "at least one file is required to start a batch".to_string(),
        ));
    }
    Ok(())
}

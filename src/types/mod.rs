use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BatchStatus {
    Queued,
    Processing,
    Paused,
    Completed,
    Error,
    Cancelled,
    /// Any status string this client does not know about.
    Other(String),
}

impl BatchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            BatchStatus::Queued => "queued",
            BatchStatus::Processing => "processing",
            BatchStatus::Paused => "paused",
            BatchStatus::Completed => "completed",
            BatchStatus::Error => "error",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Other(raw) => raw.as_str(),
        }
    }

    /// Terminal states end polling for the batch.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Error | BatchStatus::Cancelled
        )
    }
}

impl From<String> for BatchStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => BatchStatus::Queued,
            "processing" => BatchStatus::Processing,
            "paused" => BatchStatus::Paused,
            "completed" => BatchStatus::Completed,
            "error" => BatchStatus::Error,
            "cancelled" | "canceled" => BatchStatus::Cancelled,
            _ => BatchStatus::Other(raw),
        }
    }
}

impl From<BatchStatus> for String {
    fn from(status: BatchStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentFile {
    pub name: String,
    #[serde(default)]
    pub index: Option<u64>,
}

/// Server-side view of one OCR batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    #[serde(default)]
    pub batch_id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub processed_count: u64,
    #[serde(default)]
    pub failed_count: u64,
    #[serde(default)]
    pub skipped_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<CurrentFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_start_time: Option<String>,
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<Value>,
    #[serde(default)]
    pub logs: Vec<Value>,
}

impl BatchJob {
    pub fn settled_count(&self) -> u64 {
        self.processed_count
            .saturating_add(self.failed_count)
            .saturating_add(self.skipped_count)
    }

    /// Whether `processed + failed + skipped <= total` holds for this snapshot.
    pub fn counts_consistent(&self) -> bool {
        self.settled_count() <= self.total_files
    }

    /// Queue position and estimated start, only while the batch waits in the queue.
    pub fn queue_info(&self) -> Option<(Option<u64>, Option<&str>)> {
        (self.status == BatchStatus::Queued)
            .then(|| (self.queue_position, self.estimated_start_time.as_deref()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchList {
    #[serde(default)]
    pub jobs: BTreeMap<String, BatchJob>,
}

/// OCR options forwarded untouched to the batch backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    #[serde(default)]
    pub force_reprocess: bool,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartBatchRequest<'a> {
    pub batch_id: &'a str,
    pub files: &'a [FileDescriptor],
    pub settings: &'a BatchSettings,
}

/// A file ready to be submitted for OCR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub name: String,
    pub drive_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<String>,
}

/// Something the user picked in the explorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "itemType", rename_all = "lowercase")]
pub enum SelectionItem {
    File {
        id: String,
        name: String,
        drive_id: String,
    },
    Folder {
        id: String,
        name: String,
        drive_id: String,
    },
}

impl SelectionItem {
    pub fn file(
        drive_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        SelectionItem::File {
            id: id.into(),
            name: name.into(),
            drive_id: drive_id.into(),
        }
    }

    pub fn folder(
        drive_id: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        SelectionItem::Folder {
            id: id.into(),
            name: name.into(),
            drive_id: drive_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SelectionItem::File { id, .. } | SelectionItem::Folder { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SelectionItem::File { name, .. } | SelectionItem::Folder { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub drive_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct RecursiveListing {
    #[serde(default)]
    pub files: Vec<DriveFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrFileStatus {
    pub file_id: String,
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrText {
    pub file_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub page_count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendCacheStats {
    #[serde(default)]
    pub entries: Option<u64>,
    #[serde(default)]
    pub hits: Option<u64>,
    #[serde(default)]
    pub misses: Option<u64>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Value,
}

mod error;

pub mod admin;
pub mod api;
pub mod batch;
pub mod cache;
mod client;
pub mod config;
pub mod controller;
pub mod expansion;
pub mod ocr;
pub mod poller;
pub mod preferences;
pub mod progress;
pub mod registry;
pub mod sharepoint;
pub mod types;
pub mod utils;

pub use error::{Error, Result};

pub use admin::AdminClient;
pub use api::ApiClient;
pub use batch::{BatchAction, BatchApi, HttpBatchApi, generate_batch_id};
pub use cache::{
    CacheKey, Clock, ManualClock, SharedCache, SweeperGuard, SystemClock, TtlCache, shared,
    spawn_sweeper,
};
pub use client::Client;
pub use config::{CacheConfig, ClientConfig, Env, PollIntervals};
pub use controller::BatchController;
pub use expansion::{Expansion, RecursiveLister, expand_selection};
pub use ocr::OcrClient;
pub use poller::{PollSnapshot, PollerHandle, PollerState, StatusPoller, interval_for};
pub use preferences::{Preferences, Theme};
pub use progress::BatchProgress;
pub use registry::{JobEntry, JobRegistry, Ticket};
pub use sharepoint::{ContentMode, SharePointClient};
pub use types::{
    BackendCacheStats, BatchJob, BatchList, BatchSettings, BatchStatus, Block, CurrentFile,
    DriveFile, FileDescriptor, Folder, Library, OcrFileStatus, OcrText, SelectionItem, Setting,
};

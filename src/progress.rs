use std::fmt;

use crate::types::{BatchJob, BatchStatus};

/// Display-ready summary of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub batch_id: String,
    pub status: BatchStatus,
    pub total: u64,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// 0.0 ..= 100.0, clamped even when the server's counters overshoot.
    pub percent: f64,
    pub current_file: Option<String>,
    pub queue_position: Option<u64>,
    pub estimated_start_time: Option<String>,
    pub error_count: usize,
    pub log_count: usize,
}

impl BatchProgress {
    pub fn from_job(job: &BatchJob) -> Self {
        let settled = job.settled_count();
        let percent = if job.total_files == 0 {
            if job.status == BatchStatus::Completed { 100.0 } else { 0.0 }
        } else {
            (settled as f64 / job.total_files as f64 * 100.0).clamp(0.0, 100.0)
        };
        let (queue_position, estimated_start_time) = match job.queue_info() {
            Some((position, eta)) => (position, eta.map(str::to_string)),
            None => (None, None),
        };

        Self {
            batch_id: job.batch_id.clone(),
            status: job.status.clone(),
            total: job.total_files,
            processed: job.processed_count,
            failed: job.failed_count,
            skipped: job.skipped_count,
            percent,
            current_file: job.current_file.as_ref().map(|file| match file.index {
                Some(index) => format!("{} (#{})", file.name, index.saturating_add(1)),
                None => file.name.clone(),
            }),
            queue_position,
            estimated_start_time,
            error_count: job.errors.len(),
            log_count: job.logs.len(),
        }
    }

    pub fn remaining(&self) -> u64 {
        let settled = self
            .processed
            .saturating_add(self.failed)
            .saturating_add(self.skipped);
        self.total.saturating_sub(settled)
    }

    /// Text progress bar of `width` cells.
    pub fn bar(&self, width: usize) -> String {
        let filled = ((self.percent / 100.0) * width as f64).round() as usize;
        let filled = filled.min(width);
        format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
    }
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:>5.1}% processed={} failed={} skipped={} total={}",
            self.batch_id,
            self.status,
            self.bar(20),
            self.percent,
            self.processed,
            self.failed,
            self.skipped,
            self.total
        )?;
        if let Some(position) = self.queue_position {
            write!(f, " queue_position={position}")?;
        }
        if let Some(eta) = &self.estimated_start_time {
            write!(f, " eta={eta}")?;
        }
        if let Some(file) = &self.current_file {
            write!(f, " current={file}")?;
        }
        Ok(())
    }
}

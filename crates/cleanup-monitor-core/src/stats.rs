use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::types::PipelineResult;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Point-in-time copy of the running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub files_processed: u64,
    pub images_extracted: u64,
    pub duplicates_removed: u64,
    /// Megabytes freed by duplicate removal
    pub space_saved: f64,
}

/// Process-wide counters. Only `fold` changes them, and they never decrease.
#[derive(Debug, Default)]
pub struct Statistics {
    inner: Mutex<StatsSnapshot>,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one completed pipeline run, atomically
    pub fn fold(&self, result: &PipelineResult) -> StatsSnapshot {
        let mut stats = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        stats.files_processed += 1;
        stats.images_extracted += result.images_extracted;
        stats.duplicates_removed += result.duplicates_removed;
        stats.space_saved += result.bytes_reclaimed as f64 / BYTES_PER_MB;

        *stats
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Core functionality for the download cleanup monitor.
//!
//! This library watches a folder for new web assets (HTML/CSS/JS) and runs
//! each one through two external tools:
//! - An image extractor that writes images into a `<stem>_images` folder
//! - A duplicate remover that cleans up that folder
//!
//! Running totals are kept in [`Statistics`] and every step is reported
//! through an [`ActivityLog`].

// -- External Dependencies --
use rayon::ThreadPool;

// -- Standard Library --
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use logging::{ActivityLog, LogCallback};
pub use pipeline::ProcessingPipeline;
pub use processor::{ProcessOutput, ProcessorSpec};
pub use registry::DedupeRegistry;
pub use scanner::{BatchScanner, ScanControl};
pub use stats::{Statistics, StatsSnapshot};
pub use types::*;
pub use watcher::{DirectoryWatcher, Dispatcher};

// -- Public Modules --
pub mod config;
pub mod discovery;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod scanner;
pub mod stats;
pub mod types;
pub mod watcher;

// -- Test Modules --
#[cfg(test)]
pub mod test_utils;

/// Main entry point for a display: start/stop monitoring, manual scans,
/// statistics and status.
pub struct CleanupMonitor {
    settings: Settings,
    settings_path: Option<PathBuf>,
    log: ActivityLog,
    statistics: Arc<Statistics>,
    pool: Arc<ThreadPool>,
    watcher: Option<DirectoryWatcher>,
    scans: ScanControl,
}

impl CleanupMonitor {
    /// Create a new monitor with the provided settings
    pub fn new(settings: Settings, log: ActivityLog) -> Result<Self> {
        let pool = watcher::build_worker_pool(settings.threads)?;

        Ok(Self {
            settings,
            settings_path: None,
            log,
            statistics: Arc::new(Statistics::new()),
            pool: Arc::new(pool),
            watcher: None,
            scans: ScanControl::new(),
        })
    }

    /// Persist settings to `path` whenever monitoring starts
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings; only allowed while idle
    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        if self.status() == MonitorStatus::Active {
            return Err(Error::Configuration(
                "Stop monitoring before changing settings".to_string(),
            ));
        }
        self.settings = settings;
        Ok(())
    }

    pub fn status(&self) -> MonitorStatus {
        self.watcher
            .as_ref()
            .map(|w| MonitorStatus::from(w.state()))
            .unwrap_or(MonitorStatus::Idle)
    }

    pub fn statistics(&self) -> StatsSnapshot {
        self.statistics.snapshot()
    }

    /// Begin watching the configured folder
    pub fn start(&mut self) -> Result<()> {
        if self.status() == MonitorStatus::Active {
            return Err(Error::Configuration(
                "Monitoring is already active".to_string(),
            ));
        }

        if let Err(e) = self.settings.validate() {
            self.log.error(format!("Cannot start monitoring: {}", e));
            return Err(e);
        }

        if !self.settings.image_extractor_spec().is_present() {
            self.log
                .warn("Image extractor script not found. Image extraction will be skipped.");
        }
        if !self.settings.duplicate_remover_spec().is_present() {
            self.log
                .warn("Duplicate remover script not found. Deduplication will be skipped.");
        }

        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save_to_file(path) {
                self.log.warn(format!("Could not save settings: {}", e));
            }
        }

        let dispatcher = Dispatcher::new(
            self.pipeline(),
            self.statistics.clone(),
            self.pool.clone(),
            self.log.clone(),
        );
        let mut watcher = DirectoryWatcher::new(self.settings.watch_config());
        if let Err(e) = watcher.start(dispatcher) {
            self.log.error(format!("Cannot start monitoring: {}", e));
            return Err(e);
        }

        self.watcher = Some(watcher);
        self.log.info(format!(
            "Started monitoring: {}",
            self.settings.watch_folder.display()
        ));
        Ok(())
    }

    /// Stop watching and cancel manual scans. Files already dispatched
    /// finish in the background.
    pub fn stop(&mut self) {
        self.scans.cancel_all();
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
            self.log.info("Monitoring stopped");
        }
    }

    /// Run a manual batch scan of `directory` on the calling thread
    pub fn manual_scan(&self, directory: &Path) -> Result<usize> {
        let flag = self.scans.begin();
        let result = self.scanner().scan(directory, &flag);
        if let Err(e) = &result {
            self.log.error(format!("Manual cleanup failed: {}", e));
        }
        result
    }

    /// Run a manual batch scan on its own thread
    pub fn spawn_manual_scan(&self, directory: PathBuf) -> Result<JoinHandle<Result<usize>>> {
        let scanner = self.scanner();
        let flag = self.scans.begin();
        let log = self.log.clone();

        let handle = thread::Builder::new()
            .name("manual-scan".to_string())
            .spawn(move || {
                let result = scanner.scan(&directory, &flag);
                if let Err(e) = &result {
                    log.error(format!("Manual cleanup failed: {}", e));
                }
                result
            })?;
        Ok(handle)
    }

    /// Ask running manual scans to stop before their next file.
    /// Scans started afterwards are not affected.
    pub fn cancel_scans(&self) {
        self.scans.cancel_all();
    }

    /// Handle for cancelling manual scans from another thread (e.g. a signal handler)
    pub fn scan_control(&self) -> ScanControl {
        self.scans.clone()
    }

    fn pipeline(&self) -> Arc<ProcessingPipeline> {
        Arc::new(ProcessingPipeline::from_settings(
            &self.settings,
            self.log.clone(),
        ))
    }

    fn scanner(&self) -> BatchScanner {
        BatchScanner::new(
            self.pipeline(),
            self.statistics.clone(),
            self.settings.watch_config().extensions,
            self.log.clone(),
        )
    }
}

impl Drop for CleanupMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
